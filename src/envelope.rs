// src/envelope.rs
//
// Envelope descriptor and the fixed gain-automation contract.
//
// Every voice follows the same shape: a 5 ms anti-click rise to peak, a
// linear decay to the sustain level, a hold until stopped, then a 5 ms fade
// with the source torn down 10 ms after the stop request. `attack` and
// `release` are carried for presets but do not change these timings.

use crate::host::{AudioHost, Param};

/// Linear rise from silence to peak at note start (seconds).
pub const ANTI_CLICK_RAMP: f64 = 0.005;

/// Fade from the current gain to silence on stop (seconds).
pub const STOP_RAMP: f64 = 0.005;

/// Delay from the stop request to hard source termination (seconds).
pub const STOP_TAIL: f64 = 0.010;

/// Time constant for master and bus volume changes (seconds).
pub const SMOOTHING: f64 = 0.01;

/// Fixed peak gain of triangle voices.
pub const TRIANGLE_PEAK: f32 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Envelope {
    pub attack: f64,
    pub decay: f64,
    pub sustain: f32,
    pub release: f64,
}

impl Envelope {
    pub fn new(attack: f64, decay: f64, sustain: f32, release: f64) -> Self {
        Self {
            attack: attack.max(0.0),
            decay: decay.max(0.0),
            sustain: sustain.clamp(0.0, 1.0),
            release: release.max(0.0),
        }
    }

    /// Decay to `sustain` over `decay` seconds, no attack or release.
    pub fn decay_sustain(decay: f64, sustain: f32) -> Self {
        Self::new(0.0, decay, sustain, 0.0)
    }
}

impl Default for Envelope {
    fn default() -> Self {
        Self::decay_sustain(0.1, 0.5)
    }
}

/// Peak gain for a MIDI velocity.
#[inline]
pub fn peak_gain(velocity: u8) -> f32 {
    f32::from(velocity.min(127)) / 127.0
}

/// Schedule the start-of-note shape on `gain`, beginning at `start`.
pub fn apply_envelope<H: AudioHost + ?Sized>(
    host: &mut H,
    gain: Param,
    peak: f32,
    start: f64,
    envelope: &Envelope,
) {
    let peak_at = start + ANTI_CLICK_RAMP;
    let sustain_at = peak_at + envelope.decay.max(0.0);

    host.set_value_at_time(gain, 0.0, start);
    host.linear_ramp_to_value_at_time(gain, peak, peak_at);
    host.linear_ramp_to_value_at_time(gain, peak * envelope.sustain, sustain_at);
}

/// Schedule the stop fade on `gain` from its value at `now`.
///
/// Returns the time at which the source should be terminated.
pub fn apply_release<H: AudioHost + ?Sized>(host: &mut H, gain: Param, now: f64) -> f64 {
    let current = host.param_value(gain);

    host.cancel_scheduled_values(gain, now);
    host.set_value_at_time(gain, current, now);
    host.linear_ramp_to_value_at_time(gain, 0.0, now + STOP_RAMP);

    now + STOP_TAIL
}

/// Cancel an envelope that has not begun yet and hold `gain` at 0.
///
/// Before its start anchor the gain node still reads its default, so a
/// release fade here would ramp down from full level.
pub fn silence_before_start<H: AudioHost + ?Sized>(host: &mut H, gain: Param, now: f64) {
    host.cancel_scheduled_values(gain, now);
    host.set_value_at_time(gain, 0.0, now);
}
