// src/frequency.rs
//
// Note-to-frequency conversion and MIDI range clamping.

/// Highest valid MIDI pitch / velocity.
pub const MIDI_MAX: u8 = 127;

/// Reference pitch (A4) and its frequency.
const A4_NOTE: f64 = 69.0;
const A4_HZ: f64 = 440.0;

/// Convert a MIDI note number to Hz using 12-TET around A4 = 440 Hz.
///
/// Out-of-range pitches are clamped to 127.
#[inline]
pub fn midi_to_frequency(pitch: u8) -> f64 {
    let pitch = clamp_midi(pitch) as f64;
    A4_HZ * 2.0_f64.powf((pitch - A4_NOTE) / 12.0)
}

/// Clamp a pitch or velocity into 0..=127.
#[inline]
pub fn clamp_midi(value: u8) -> u8 {
    value.min(MIDI_MAX)
}

/// Clamp a wide integer (as received from JS or C) into 0..=127.
#[inline]
pub fn clamp_midi_wide(value: i32) -> u8 {
    value.clamp(0, MIDI_MAX as i32) as u8
}
