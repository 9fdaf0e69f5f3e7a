// src/offline/nodes.rs
//
// Per-sample node processors for the offline host.

use std::f32::consts::TAU;
use std::sync::Arc;

use crate::host::{OscillatorShape, ParamKind};

use super::automation::ParamTimeline;

/// Length of the single-cycle tables rendered from periodic waves.
pub const WAVETABLE_SIZE: usize = 2048;

// ═══════════════════════════════════════════════════════════════════
// Wavetables
// ═══════════════════════════════════════════════════════════════════

/// Render one cycle from Fourier coefficients, normalized to peak 1.
pub fn render_wavetable(real: &[f32], imag: &[f32]) -> Arc<[f32]> {
    let harmonics = real.len().min(imag.len());
    let mut table = vec![0.0_f32; WAVETABLE_SIZE];

    for (i, sample) in table.iter_mut().enumerate() {
        let x = i as f64 / WAVETABLE_SIZE as f64 * std::f64::consts::TAU;
        let mut acc = 0.0_f64;
        for n in 1..harmonics {
            let angle = x * n as f64;
            acc += real[n] as f64 * angle.cos() + imag[n] as f64 * angle.sin();
        }
        *sample = acc as f32;
    }

    let peak = table.iter().fold(0.0_f32, |m, s| m.max(s.abs()));
    if peak > 0.0 {
        for sample in &mut table {
            *sample /= peak;
        }
    }

    table.into()
}

// ═══════════════════════════════════════════════════════════════════
// State Variable Filter (bandpass)
// ═══════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct BandpassState {
    ic1eq: f32,
    ic2eq: f32,
    a1: f32,
    a2: f32,
    a3: f32,
    last_cutoff: f32,
    last_q: f32,
}

impl BandpassState {
    pub fn new() -> Self {
        Self {
            ic1eq: 0.0,
            ic2eq: 0.0,
            a1: 0.0,
            a2: 0.0,
            a3: 0.0,
            last_cutoff: -1.0,
            last_q: -1.0,
        }
    }

    fn update(&mut self, cutoff: f32, q: f32, sample_rate: f32) {
        if (cutoff - self.last_cutoff).abs() < 1e-3 && (q - self.last_q).abs() < 1e-6 {
            return;
        }
        self.last_cutoff = cutoff;
        self.last_q = q;

        let cutoff = cutoff.clamp(20.0, (sample_rate * 0.49).max(20.0));
        let g = (std::f32::consts::PI * cutoff / sample_rate).tan();
        let k = 1.0 / q.max(0.01);
        self.a1 = 1.0 / (1.0 + g * (g + k));
        self.a2 = g * self.a1;
        self.a3 = g * self.a2;
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let v3 = input - self.ic2eq;
        let v1 = self.a1 * self.ic1eq + self.a2 * v3;
        let v2 = self.ic2eq + self.a2 * self.ic1eq + self.a3 * v3;

        self.ic1eq = 2.0 * v1 - self.ic1eq;
        self.ic2eq = 2.0 * v2 - self.ic2eq;

        v1
    }
}

impl Default for BandpassState {
    fn default() -> Self {
        Self::new()
    }
}

// ═══════════════════════════════════════════════════════════════════
// Node kinds
// ═══════════════════════════════════════════════════════════════════

pub enum NodeKind {
    Destination,
    Gain {
        gain: ParamTimeline,
    },
    PeriodicOscillator {
        table: Arc<[f32]>,
        frequency: ParamTimeline,
        phase: f32,
    },
    Oscillator {
        shape: OscillatorShape,
        frequency: ParamTimeline,
        phase: f32,
    },
    BufferSource {
        buffer: Arc<[f32]>,
        looping: bool,
        position: usize,
    },
    Bandpass {
        frequency: ParamTimeline,
        q: ParamTimeline,
        state: BandpassState,
    },
}

impl NodeKind {
    pub fn label(&self) -> &'static str {
        match self {
            NodeKind::Destination => "destination",
            NodeKind::Gain { .. } => "gain",
            NodeKind::PeriodicOscillator { .. } => "periodic oscillator",
            NodeKind::Oscillator { .. } => "oscillator",
            NodeKind::BufferSource { .. } => "buffer source",
            NodeKind::Bandpass { .. } => "bandpass",
        }
    }

    pub fn is_source(&self) -> bool {
        matches!(
            self,
            NodeKind::PeriodicOscillator { .. }
                | NodeKind::Oscillator { .. }
                | NodeKind::BufferSource { .. }
        )
    }

    pub fn param(&self, kind: ParamKind) -> Option<&ParamTimeline> {
        match (self, kind) {
            (NodeKind::Gain { gain }, ParamKind::Gain) => Some(gain),
            (NodeKind::PeriodicOscillator { frequency, .. }, ParamKind::Frequency)
            | (NodeKind::Oscillator { frequency, .. }, ParamKind::Frequency)
            | (NodeKind::Bandpass { frequency, .. }, ParamKind::Frequency) => Some(frequency),
            (NodeKind::Bandpass { q, .. }, ParamKind::Q) => Some(q),
            _ => None,
        }
    }

    pub fn param_mut(&mut self, kind: ParamKind) -> Option<&mut ParamTimeline> {
        match (self, kind) {
            (NodeKind::Gain { gain }, ParamKind::Gain) => Some(gain),
            (NodeKind::PeriodicOscillator { frequency, .. }, ParamKind::Frequency)
            | (NodeKind::Oscillator { frequency, .. }, ParamKind::Frequency)
            | (NodeKind::Bandpass { frequency, .. }, ParamKind::Frequency) => Some(frequency),
            (NodeKind::Bandpass { q, .. }, ParamKind::Q) => Some(q),
            _ => None,
        }
    }
}

/// A node plus its wiring and lifetime.
pub struct HostNode {
    pub kind: NodeKind,
    pub inputs: Vec<u32>,
    pub start: Option<f64>,
    pub stop: Option<f64>,
    pub ended: bool,
}

impl HostNode {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            inputs: Vec::new(),
            start: None,
            stop: None,
            ended: false,
        }
    }

    /// Whether a source is sounding at time `t`.
    #[inline]
    fn is_playing(&self, t: f64) -> bool {
        if self.ended {
            return false;
        }
        let started = self.start.is_some_and(|s| t >= s);
        let stopped = self.stop.is_some_and(|s| t >= s);
        started && !stopped
    }

    /// Whether a source has finished by time `t`.
    pub fn has_finished(&self, t: f64) -> bool {
        if !self.kind.is_source() {
            return false;
        }
        if self.stop.is_some_and(|s| t >= s) {
            return true;
        }
        match &self.kind {
            NodeKind::BufferSource {
                buffer,
                looping: false,
                position,
            } => self.start.is_some() && *position >= buffer.len(),
            _ => false,
        }
    }

    /// Produce one output sample at time `t` from the summed inputs.
    #[inline]
    pub fn process(&mut self, t: f64, input: f32, sample_rate: f32) -> f32 {
        let playing = self.is_playing(t);

        match &mut self.kind {
            NodeKind::Destination => input,

            NodeKind::Gain { gain } => input * gain.value_at(t),

            NodeKind::PeriodicOscillator {
                table,
                frequency,
                phase,
            } => {
                if !playing {
                    return 0.0;
                }
                let pos = *phase * table.len() as f32;
                let i0 = pos as usize % table.len();
                let i1 = (i0 + 1) % table.len();
                let frac = pos - pos.floor();
                let out = table[i0] + (table[i1] - table[i0]) * frac;

                let inc = frequency.value_at(t) / sample_rate;
                *phase = (*phase + inc).fract();
                out
            }

            NodeKind::Oscillator {
                shape,
                frequency,
                phase,
            } => {
                if !playing {
                    return 0.0;
                }
                let out = match shape {
                    OscillatorShape::Sine => (*phase * TAU).sin(),
                    OscillatorShape::Triangle => {
                        if *phase < 0.5 {
                            4.0 * *phase - 1.0
                        } else {
                            3.0 - 4.0 * *phase
                        }
                    }
                };
                let inc = frequency.value_at(t) / sample_rate;
                *phase = (*phase + inc).fract();
                out
            }

            NodeKind::BufferSource {
                buffer,
                looping,
                position,
            } => {
                if !playing || buffer.is_empty() {
                    return 0.0;
                }
                if *position >= buffer.len() {
                    if !*looping {
                        return 0.0;
                    }
                    *position = 0;
                }
                let out = buffer[*position];
                *position += 1;
                out
            }

            NodeKind::Bandpass {
                frequency,
                q,
                state,
            } => {
                state.update(frequency.value_at(t), q.value_at(t), sample_rate);
                state.process(input)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::waveform::{DutyCycle, PeriodicWave};

    #[test]
    fn test_wavetable_is_normalized() {
        let wave = PeriodicWave::pulse(DutyCycle::Quarter);
        let table = render_wavetable(wave.real(), wave.imag());
        let peak = table.iter().fold(0.0_f32, |m, s| m.max(s.abs()));
        assert_eq!(table.len(), WAVETABLE_SIZE);
        assert!((peak - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_source_silent_before_start() {
        let mut node = HostNode::new(NodeKind::Oscillator {
            shape: OscillatorShape::Triangle,
            frequency: ParamTimeline::new(440.0),
            phase: 0.25,
        });
        assert_eq!(node.process(0.0, 0.0, 48_000.0), 0.0);

        node.start = Some(0.0);
        assert!(node.process(0.0, 0.0, 48_000.0).abs() > 0.0);
    }

    #[test]
    fn test_one_shot_buffer_finishes() {
        let mut node = HostNode::new(NodeKind::BufferSource {
            buffer: vec![0.5, 0.5].into(),
            looping: false,
            position: 0,
        });
        node.start = Some(0.0);
        assert_eq!(node.process(0.0, 0.0, 48_000.0), 0.5);
        assert_eq!(node.process(0.0, 0.0, 48_000.0), 0.5);
        assert_eq!(node.process(0.0, 0.0, 48_000.0), 0.0);
        assert!(node.has_finished(0.0));
    }

    #[test]
    fn test_looping_buffer_wraps() {
        let mut node = HostNode::new(NodeKind::BufferSource {
            buffer: vec![1.0, -1.0].into(),
            looping: true,
            position: 0,
        });
        node.start = Some(0.0);
        let samples: Vec<f32> = (0..4).map(|_| node.process(0.0, 0.0, 48_000.0)).collect();
        assert_eq!(samples, vec![1.0, -1.0, 1.0, -1.0]);
        assert!(!node.has_finished(10.0));
    }

    #[test]
    fn test_bandpass_rejects_dc() {
        let mut state = BandpassState::new();
        state.update(1000.0, 1.0, 48_000.0);
        let mut last = 0.0;
        for _ in 0..48_000 {
            last = state.process(1.0);
        }
        assert!(last.abs() < 1e-3);
    }
}
