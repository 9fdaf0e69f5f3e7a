// src/channel.rs

use std::fmt;

/// One of the four fixed sound-chip channels.
///
/// The channel decides which synthesis method and which bus a note uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Channel {
    PulseA,
    PulseB,
    Triangle,
    Noise,
}

impl Channel {
    pub const ALL: [Channel; 4] = [
        Channel::PulseA,
        Channel::PulseB,
        Channel::Triangle,
        Channel::Noise,
    ];

    /// Stable bus index (0..4).
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Channel::PulseA => 0,
            Channel::PulseB => 1,
            Channel::Triangle => 2,
            Channel::Noise => 3,
        }
    }

    /// Inverse of [`Channel::index`], used by the FFI/wasm surfaces.
    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            Channel::PulseA => "pulse1",
            Channel::PulseB => "pulse2",
            Channel::Triangle => "triangle",
            Channel::Noise => "noise",
        }
    }

    /// The pulse sub-channel, if this is a pulse channel.
    pub fn as_pulse(self) -> Option<PulseChannel> {
        match self {
            Channel::PulseA => Some(PulseChannel::A),
            Channel::PulseB => Some(PulseChannel::B),
            _ => None,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The two pulse channels, the only valid targets for pulse voices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PulseChannel {
    A,
    B,
}

impl From<PulseChannel> for Channel {
    fn from(pulse: PulseChannel) -> Self {
        match pulse {
            PulseChannel::A => Channel::PulseA,
            PulseChannel::B => Channel::PulseB,
        }
    }
}
