// src/voice.rs

use std::fmt;

use crate::channel::Channel;
use crate::host::NodeId;

/// Opaque handle to one sounding voice.
///
/// Ids start at 1 and increase for the life of the engine; a retired id is
/// never handed out again. `0` is reserved as the raw invalid-id sentinel on
/// the FFI and wasm surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoiceId(u32);

impl VoiceId {
    pub const FIRST: VoiceId = VoiceId(1);
    pub const SENTINEL: u32 = 0;

    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    /// Rebuild an id from its raw form. `0` is not a valid id.
    #[inline]
    pub fn from_raw(raw: u32) -> Option<Self> {
        (raw != Self::SENTINEL).then_some(VoiceId(raw))
    }

    /// The following id, or `None` once the id space is used up.
    #[inline]
    pub(crate) fn next(self) -> Option<Self> {
        self.0.checked_add(1).map(VoiceId)
    }

    /// Raw form of an optional id, mapping `None` to the sentinel.
    #[inline]
    pub fn raw_or_sentinel(id: Option<VoiceId>) -> u32 {
        id.map_or(Self::SENTINEL, VoiceId::raw)
    }
}

impl fmt::Display for VoiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "voice#{}", self.0)
    }
}

/// Host nodes owned by one voice.
#[derive(Debug, Clone)]
pub struct ActiveVoice {
    pub id: VoiceId,
    pub channel: Channel,

    /// Oscillator or noise buffer source.
    pub source: NodeId,

    /// Band-pass stage (noise voices only).
    pub filter: Option<NodeId>,

    /// Per-voice envelope gain.
    pub gain: NodeId,

    pub started_at: f64,

    /// Set once `stop` has scheduled the fade.
    pub stopping: bool,
}

impl ActiveVoice {
    /// Every node this voice owns, source first.
    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::once(self.source)
            .chain(self.filter)
            .chain(std::iter::once(self.gain))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_is_not_an_id() {
        assert_eq!(VoiceId::from_raw(0), None);
        assert_eq!(VoiceId::from_raw(5).map(VoiceId::raw), Some(5));
        assert_eq!(VoiceId::raw_or_sentinel(None), 0);
        assert_eq!(VoiceId::FIRST.raw(), 1);
    }

    #[test]
    fn test_next_increases() {
        let a = VoiceId::FIRST;
        let b = a.next().unwrap();
        assert!(b > a);
        assert_eq!(b.raw(), 2);
    }

    #[test]
    fn test_next_never_wraps() {
        let last = VoiceId::from_raw(u32::MAX).unwrap();
        assert_eq!(last.next(), None);
    }
}
