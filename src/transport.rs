// src/transport.rs
//
// Transport state, tempo and loop region.

use std::fmt;

pub const MIN_BPM: f64 = 30.0;
pub const MAX_BPM: f64 = 300.0;
pub const DEFAULT_BPM: f64 = 150.0;

/// Ticks per quarter note.
pub const DEFAULT_RESOLUTION: u32 = 96;

/// Four bars of 4/4 at the default resolution.
pub const DEFAULT_SONG_LENGTH: u32 = 1536;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TransportState {
    #[default]
    Stopped,
    Playing,
    Recording,
    /// Look-ahead halted, tick retained.
    Paused,
}

impl TransportState {
    /// Whether the tick counter advances in this state.
    #[inline]
    pub fn is_advancing(self) -> bool {
        matches!(self, TransportState::Playing | TransportState::Recording)
    }

    /// Stable numeric code for readback and the FFI/wasm surfaces.
    pub fn code(self) -> u8 {
        match self {
            TransportState::Stopped => 0,
            TransportState::Playing => 1,
            TransportState::Recording => 2,
            TransportState::Paused => 3,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(TransportState::Stopped),
            1 => Some(TransportState::Playing),
            2 => Some(TransportState::Recording),
            3 => Some(TransportState::Paused),
            _ => None,
        }
    }
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransportState::Stopped => "stopped",
            TransportState::Playing => "playing",
            TransportState::Recording => "recording",
            TransportState::Paused => "paused",
        })
    }
}

//
// ===============================
// MARK: Tempo
// ===============================
//

/// Tempo and tick resolution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tempo {
    bpm: f64,
    ticks_per_quarter: u32,
}

impl Tempo {
    pub fn new(bpm: f64, ticks_per_quarter: u32) -> Self {
        Self {
            bpm: clamp_bpm(bpm),
            ticks_per_quarter: ticks_per_quarter.max(1),
        }
    }

    #[inline]
    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    #[inline]
    pub fn ticks_per_quarter(&self) -> u32 {
        self.ticks_per_quarter
    }

    pub fn set_bpm(&mut self, bpm: f64) {
        self.bpm = clamp_bpm(bpm);
    }

    pub fn set_ticks_per_quarter(&mut self, ticks: u32) {
        self.ticks_per_quarter = ticks.max(1);
    }

    /// Length of one tick in seconds at this tempo.
    #[inline]
    pub fn seconds_per_tick(&self) -> f64 {
        (60.0 / self.bpm) / self.ticks_per_quarter as f64
    }

    #[inline]
    pub fn ticks_to_seconds(&self, ticks: u32) -> f64 {
        ticks as f64 * self.seconds_per_tick()
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Self::new(DEFAULT_BPM, DEFAULT_RESOLUTION)
    }
}

/// Clamp a tempo into the supported range. NaN falls back to the default.
#[inline]
pub fn clamp_bpm(bpm: f64) -> f64 {
    if bpm.is_nan() {
        return DEFAULT_BPM;
    }
    bpm.clamp(MIN_BPM, MAX_BPM)
}

//
// ===============================
// MARK: Loop region
// ===============================
//

/// Loop bounds in ticks, `start` inclusive and `end` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LoopRegion {
    pub enabled: bool,
    start: u32,
    end: u32,
}

impl LoopRegion {
    /// Build a region; `end` is pushed past `start` if needed.
    pub fn new(enabled: bool, start: u32, end: u32) -> Self {
        let end = end.max(start.saturating_add(1));
        Self {
            enabled,
            start,
            end,
        }
    }

    #[inline]
    pub fn start(&self) -> u32 {
        self.start
    }

    #[inline]
    pub fn end(&self) -> u32 {
        self.end
    }

    #[inline]
    pub fn contains(&self, tick: u32) -> bool {
        tick >= self.start && tick < self.end
    }
}

impl Default for LoopRegion {
    fn default() -> Self {
        Self::new(false, 0, DEFAULT_SONG_LENGTH)
    }
}
