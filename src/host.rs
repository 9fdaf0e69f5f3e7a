// src/host.rs
//
// The host audio subsystem as seen by the core.
//
// The core never renders samples itself in the signal path. It creates
// nodes, wires them, and pushes future parameter changes onto the host's
// automation queue, all against the host's own monotonic clock. A browser
// AudioContext, an AudioWorklet-side renderer, or the software
// `OfflineHost` can sit behind this trait.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use crate::error::HostResult;
use crate::waveform::PeriodicWave;

/// Opaque handle to a host node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

/// Opaque handle to a host sample buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub u32);

/// Opaque handle to a registered periodic wave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WaveId(pub u32);

/// Which automatable parameter of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKind {
    Gain,
    Frequency,
    Q,
}

/// A node parameter handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Param {
    pub node: NodeId,
    pub kind: ParamKind,
}

impl Param {
    #[inline]
    pub fn gain(node: NodeId) -> Self {
        Self {
            node,
            kind: ParamKind::Gain,
        }
    }

    #[inline]
    pub fn frequency(node: NodeId) -> Self {
        Self {
            node,
            kind: ParamKind::Frequency,
        }
    }

    #[inline]
    pub fn q(node: NodeId) -> Self {
        Self {
            node,
            kind: ParamKind::Q,
        }
    }
}

/// Fixed waveforms offered by the host's built-in oscillator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OscillatorShape {
    Sine,
    Triangle,
}

//
// ===============================
// MARK: Audio clock
// ===============================
//

/// A monotonic audio clock reading in seconds.
pub trait AudioClock: Send {
    fn current_time(&self) -> f64;
}

/// Clock shared between the host that advances it and the scheduler that reads it.
///
/// Seconds are stored as f64 bits (no AtomicF64 in std).
#[derive(Debug, Clone, Default)]
pub struct SharedClock {
    seconds_bits: Arc<AtomicU64>,
}

impl SharedClock {
    pub fn new() -> Self {
        Self {
            seconds_bits: Arc::new(AtomicU64::new(0.0_f64.to_bits())),
        }
    }

    /// Move the clock to `seconds`. Earlier values are ignored.
    pub fn set(&self, seconds: f64) {
        let mut current = self.seconds_bits.load(Ordering::Acquire);
        loop {
            if seconds <= f64::from_bits(current) {
                return;
            }
            match self.seconds_bits.compare_exchange_weak(
                current,
                seconds.to_bits(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }

    pub fn advance(&self, seconds: f64) {
        self.set(self.current_time() + seconds.max(0.0));
    }
}

impl AudioClock for SharedClock {
    #[inline]
    fn current_time(&self) -> f64 {
        f64::from_bits(self.seconds_bits.load(Ordering::Acquire))
    }
}

//
// ===============================
// MARK: Host capability
// ===============================
//

/// Signal-graph capabilities the voice engine consumes.
///
/// Every call is non-blocking. Automation calls schedule future changes on
/// the host's own queue and return immediately.
pub trait AudioHost: Send {
    /// Handle to the host's audio clock.
    fn clock(&self) -> SharedClock;

    /// Current audio-clock time in seconds.
    fn current_time(&self) -> f64;

    fn sample_rate(&self) -> f64;

    /// The hardware output node.
    fn destination(&self) -> NodeId;

    fn create_gain(&mut self) -> HostResult<NodeId>;

    /// Register a periodic wave for use by custom oscillators.
    fn create_periodic_wave(&mut self, wave: &PeriodicWave) -> HostResult<WaveId>;

    fn create_periodic_oscillator(&mut self, wave: WaveId) -> HostResult<NodeId>;

    fn create_oscillator(&mut self, shape: OscillatorShape) -> HostResult<NodeId>;

    fn create_buffer(&mut self, samples: Vec<f32>) -> HostResult<BufferId>;

    fn create_buffer_source(&mut self, buffer: BufferId, looping: bool) -> HostResult<NodeId>;

    fn create_bandpass(&mut self) -> HostResult<NodeId>;

    /// Unregister a periodic wave. Oscillators already built keep playing.
    fn release_periodic_wave(&mut self, wave: WaveId);

    /// Unregister a sample buffer. Sources already built keep playing.
    fn release_buffer(&mut self, buffer: BufferId);

    fn connect(&mut self, from: NodeId, to: NodeId);

    /// Disconnect and release a node. Unknown ids are ignored.
    fn destroy(&mut self, node: NodeId);

    /// Start a source node at `when`.
    fn start(&mut self, node: NodeId, when: f64);

    /// Terminate a source node at `when`.
    fn stop(&mut self, node: NodeId, when: f64);

    /// The parameter's value at the current audio-clock time.
    fn param_value(&self, param: Param) -> f32;

    fn set_value_at_time(&mut self, param: Param, value: f32, when: f64);

    fn linear_ramp_to_value_at_time(&mut self, param: Param, value: f32, end_time: f64);

    /// Exponential approach towards `target` starting at `start`.
    fn set_target_at_time(&mut self, param: Param, target: f32, start: f64, time_constant: f64);

    /// Drop every automation event at or after `from`.
    fn cancel_scheduled_values(&mut self, param: Param, from: f64);

    /// Source nodes whose playback ended since the last call.
    fn take_ended(&mut self) -> Vec<NodeId>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_clock_is_monotonic() {
        let clock = SharedClock::new();
        assert_eq!(clock.current_time(), 0.0);

        clock.set(1.5);
        clock.set(1.0);
        assert_eq!(clock.current_time(), 1.5);

        clock.advance(0.25);
        assert_eq!(clock.current_time(), 1.75);
    }

    #[test]
    fn test_shared_clock_handles_share_state() {
        let clock = SharedClock::new();
        let reader = clock.clone();
        clock.set(2.0);
        assert_eq!(reader.current_time(), 2.0);
    }
}
