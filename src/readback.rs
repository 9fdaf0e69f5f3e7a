// src/readback.rs
//
// Lock-free readback for polling surfaces.
//
// The sequencer thread publishes after every driver tick; UI threads read
// without taking the sequencer lock.

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU8, AtomicU32, AtomicU64, Ordering},
};

use crate::host::AudioHost;
use crate::sequencer::Sequencer;
use crate::transport::TransportState;

/// Point-in-time copy of the readback values.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Readback {
    pub tick: u32,
    pub transport: TransportState,
    pub position_seconds: f64,
    pub active_voices: u32,
    pub notes_scheduled: u64,
    pub ready: bool,
}

#[derive(Debug)]
pub struct SharedReadback {
    tick: AtomicU32,
    transport: AtomicU8,
    /// Position stored as f64 bits (no AtomicF64 in std)
    position_bits: AtomicU64,
    active_voices: AtomicU32,
    notes_scheduled: AtomicU64,
    ready: AtomicBool,
}

impl SharedReadback {
    pub fn new() -> Self {
        Self {
            tick: AtomicU32::new(0),
            transport: AtomicU8::new(TransportState::Stopped.code()),
            position_bits: AtomicU64::new(0.0_f64.to_bits()),
            active_voices: AtomicU32::new(0),
            notes_scheduled: AtomicU64::new(0),
            ready: AtomicBool::new(false),
        }
    }

    pub fn set_tick(&self, tick: u32) {
        self.tick.store(tick, Ordering::Release);
    }

    pub fn set_transport(&self, state: TransportState) {
        self.transport.store(state.code(), Ordering::Release);
    }

    /// Copy the sequencer's current state.
    pub fn publish<H: AudioHost>(&self, sequencer: &Sequencer<H>) {
        self.set_tick(sequencer.current_tick());
        self.set_transport(sequencer.transport_state());
        self.position_bits
            .store(sequencer.position_seconds().to_bits(), Ordering::Release);
        self.active_voices.store(
            sequencer.active_voice_count().min(u32::MAX as usize) as u32,
            Ordering::Release,
        );
        self.notes_scheduled
            .store(sequencer.notes_scheduled(), Ordering::Release);
        self.ready.store(sequencer.is_ready(), Ordering::Release);
    }

    pub fn load(&self) -> Readback {
        Readback {
            tick: self.tick.load(Ordering::Acquire),
            transport: TransportState::from_code(self.transport.load(Ordering::Acquire))
                .unwrap_or_default(),
            position_seconds: f64::from_bits(self.position_bits.load(Ordering::Acquire)),
            active_voices: self.active_voices.load(Ordering::Acquire),
            notes_scheduled: self.notes_scheduled.load(Ordering::Acquire),
            ready: self.ready.load(Ordering::Acquire),
        }
    }
}

impl Default for SharedReadback {
    fn default() -> Self {
        Self::new()
    }
}

/// Route tick and transport notifications straight into `readback`.
///
/// This takes the sequencer's tick and transport observer slots.
pub fn attach<H: AudioHost>(sequencer: &mut Sequencer<H>, readback: &Arc<SharedReadback>) {
    let tick_target = Arc::clone(readback);
    sequencer.on_tick(move |tick| tick_target.set_tick(tick));

    let transport_target = Arc::clone(readback);
    sequencer.on_transport_changed(move |state| transport_target.set_transport(state));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::offline::OfflineHost;

    #[test]
    fn test_defaults() {
        let readback = SharedReadback::new().load();
        assert_eq!(readback, Readback::default());
    }

    #[test]
    fn test_attach_tracks_transport() {
        let config = EngineConfig::new().with_sample_rate(8_000.0);
        let mut seq = Sequencer::new(config);
        seq.init(OfflineHost::from_config(&config)).unwrap();

        let shared = Arc::new(SharedReadback::new());
        attach(&mut seq, &shared);

        seq.play();
        assert_eq!(shared.load().transport, TransportState::Playing);

        seq.pump();
        assert!(shared.load().tick > 0);

        seq.stop();
        let snapshot = shared.load();
        assert_eq!(snapshot.transport, TransportState::Stopped);
        assert_eq!(snapshot.tick, 0);
    }

    #[test]
    fn test_publish_copies_state() {
        let config = EngineConfig::new().with_sample_rate(8_000.0);
        let mut seq = Sequencer::new(config);
        seq.init(OfflineHost::from_config(&config)).unwrap();
        seq.seek_to(96);

        let shared = SharedReadback::new();
        shared.publish(&seq);
        let snapshot = shared.load();

        assert!(snapshot.ready);
        assert_eq!(snapshot.tick, 96);
        assert!((snapshot.position_seconds - 0.4).abs() < 1e-9);
    }
}
