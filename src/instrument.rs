// src/instrument.rs
//
// Instrument presets.
//
// Presets are immutable once built and looked up by id when a note fires.
// Duty sequences, vibrato and arpeggio fields describe per-frame modulation
// that synthesis does not apply; they round-trip with the preset data only.

use std::collections::HashMap;
use std::sync::Arc;

use crate::channel::Channel;
use crate::envelope::Envelope;
use crate::waveform::DutyCycle;

/// Noise channel timbre selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum NoiseMode {
    #[default]
    Long,
    Short,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Instrument {
    pub id: Arc<str>,
    pub name: String,
    pub channel: Channel,

    /// Pulse channels only.
    pub duty_cycle: Option<DutyCycle>,

    /// Noise channel only.
    pub noise_mode: Option<NoiseMode>,

    pub envelope: Envelope,

    /// Duty steps for a chirp, switched every `duty_switch_frames` frames.
    pub duty_sequence: Vec<DutyCycle>,
    pub duty_switch_frames: u32,

    pub vibrato_speed: f32,
    pub vibrato_depth: f32,

    /// Semitone offsets stepped every `arpeggio_speed` frames.
    pub arpeggio: Vec<i8>,
    pub arpeggio_speed: u32,
}

impl Instrument {
    pub fn new(id: &str, name: &str, channel: Channel) -> Self {
        let (duty_cycle, noise_mode) = match channel {
            Channel::PulseA | Channel::PulseB => (Some(DutyCycle::Half), None),
            Channel::Triangle => (None, None),
            Channel::Noise => (None, Some(NoiseMode::Long)),
        };

        Self {
            id: Arc::from(id),
            name: name.to_string(),
            channel,
            duty_cycle,
            noise_mode,
            envelope: Envelope::default(),
            duty_sequence: Vec::new(),
            duty_switch_frames: 0,
            vibrato_speed: 0.0,
            vibrato_depth: 0.0,
            arpeggio: Vec::new(),
            arpeggio_speed: 0,
        }
    }

    pub fn with_duty(mut self, duty: DutyCycle) -> Self {
        self.duty_cycle = Some(duty);
        self
    }

    pub fn with_noise_mode(mut self, mode: NoiseMode) -> Self {
        self.noise_mode = Some(mode);
        self
    }

    pub fn with_envelope(mut self, decay: f64, sustain: f32, release: f64) -> Self {
        self.envelope = Envelope::new(0.0, decay, sustain, release);
        self
    }

    pub fn with_chirp(mut self, sequence: &[DutyCycle], switch_frames: u32) -> Self {
        self.duty_sequence = sequence.to_vec();
        self.duty_switch_frames = switch_frames;
        self
    }

    pub fn with_arpeggio(mut self, offsets: &[i8], speed: u32) -> Self {
        self.arpeggio = offsets.to_vec();
        self.arpeggio_speed = speed;
        self
    }

    pub fn with_vibrato(mut self, speed: f32, depth: f32) -> Self {
        self.vibrato_speed = speed;
        self.vibrato_depth = depth;
        self
    }

    /// Duty cycle used for pulse voices.
    #[inline]
    pub fn duty(&self) -> DutyCycle {
        self.duty_cycle.unwrap_or_default()
    }

    /// Noise mode used for noise voices.
    #[inline]
    pub fn noise(&self) -> NoiseMode {
        self.noise_mode.unwrap_or_default()
    }
}

//
// ===============================
// MARK: Preset bank
// ===============================
//

/// Instruments keyed by id.
#[derive(Debug, Clone, Default)]
pub struct InstrumentBank {
    instruments: HashMap<Arc<str>, Arc<Instrument>>,
}

impl InstrumentBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in chip presets.
    pub fn standard() -> Self {
        use DutyCycle::*;

        let presets = [
            Instrument::new("mm-lead", "MM Lead (Chirp)", Channel::PulseA)
                .with_duty(Quarter)
                .with_envelope(0.3, 0.6, 0.01)
                .with_chirp(&[Eighth, Quarter], 2),
            Instrument::new("mm-echo", "MM Echo", Channel::PulseB)
                .with_duty(Quarter)
                .with_envelope(0.5, 0.3, 0.01),
            Instrument::new("pulse-50", "Square 50%", Channel::PulseA)
                .with_duty(Half)
                .with_envelope(0.8, 0.7, 0.05),
            Instrument::new("pulse-25", "Pulse 25%", Channel::PulseA)
                .with_duty(Quarter)
                .with_envelope(0.6, 0.5, 0.02),
            Instrument::new("pulse-125", "Pulse 12.5%", Channel::PulseA)
                .with_duty(Eighth)
                .with_envelope(0.4, 0.4, 0.01),
            Instrument::new("mm-arp", "MM Arpeggio", Channel::PulseA)
                .with_duty(Half)
                .with_envelope(1.0, 0.8, 0.02)
                .with_arpeggio(&[0, 4, 7], 3),
            Instrument::new("mm-bass", "MM Bass", Channel::Triangle).with_envelope(0.2, 0.0, 0.0),
            Instrument::new("triangle-sustain", "Triangle Sustain", Channel::Triangle)
                .with_envelope(0.0, 1.0, 0.05),
            Instrument::new("mm-kick", "MM Kick", Channel::Noise)
                .with_noise_mode(NoiseMode::Long)
                .with_envelope(0.08, 0.0, 0.0),
            Instrument::new("mm-snare", "MM Snare", Channel::Noise)
                .with_noise_mode(NoiseMode::Long)
                .with_envelope(0.15, 0.0, 0.0),
            Instrument::new("mm-hihat", "MM Hi-Hat", Channel::Noise)
                .with_noise_mode(NoiseMode::Short)
                .with_envelope(0.05, 0.0, 0.0),
            Instrument::new("mm-cymbal", "MM Cymbal", Channel::Noise)
                .with_noise_mode(NoiseMode::Short)
                .with_envelope(0.4, 0.1, 0.1),
        ];

        let mut bank = Self::new();
        for preset in presets {
            bank.insert(preset);
        }
        bank
    }

    pub fn insert(&mut self, instrument: Instrument) {
        self.instruments
            .insert(instrument.id.clone(), Arc::new(instrument));
    }

    pub fn get(&self, id: &str) -> Option<Arc<Instrument>> {
        self.instruments.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }

    /// Presets with affinity for `channel`, sorted by id.
    pub fn by_channel(&self, channel: Channel) -> Vec<Arc<Instrument>> {
        let mut matches: Vec<_> = self
            .instruments
            .values()
            .filter(|i| i.channel == channel)
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.id.cmp(&b.id));
        matches
    }

    /// Id of the preset a fresh track on `channel` starts with.
    pub fn default_id(channel: Channel) -> &'static str {
        match channel {
            Channel::PulseA => "mm-lead",
            Channel::PulseB => "mm-echo",
            Channel::Triangle => "mm-bass",
            Channel::Noise => "mm-kick",
        }
    }

    /// The default preset for `channel`, if the bank holds it.
    pub fn default_for(&self, channel: Channel) -> Option<Arc<Instrument>> {
        self.get(Self::default_id(channel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_bank_contents() {
        let bank = InstrumentBank::standard();
        assert_eq!(bank.len(), 12);

        let lead = bank.get("mm-lead").unwrap();
        assert_eq!(lead.channel, Channel::PulseA);
        assert_eq!(lead.duty(), DutyCycle::Quarter);
        assert_eq!(lead.envelope.decay, 0.3);
        assert_eq!(lead.envelope.sustain, 0.6);
        assert_eq!(lead.duty_sequence, vec![DutyCycle::Eighth, DutyCycle::Quarter]);

        let hihat = bank.get("mm-hihat").unwrap();
        assert_eq!(hihat.noise(), NoiseMode::Short);
    }

    #[test]
    fn test_defaults_per_channel() {
        let bank = InstrumentBank::standard();
        for channel in Channel::ALL {
            let preset = bank.default_for(channel).unwrap();
            assert_eq!(preset.channel, channel);
        }
    }

    #[test]
    fn test_by_channel_filters() {
        let bank = InstrumentBank::standard();
        let noise = bank.by_channel(Channel::Noise);
        assert_eq!(noise.len(), 4);
        assert!(noise.iter().all(|i| i.channel == Channel::Noise));
        assert_eq!(bank.by_channel(Channel::Triangle).len(), 2);
    }

    #[test]
    fn test_unknown_id() {
        assert!(InstrumentBank::standard().get("nope").is_none());
    }

    #[test]
    fn test_fallback_selectors() {
        let bass = Instrument::new("b", "B", Channel::Triangle);
        assert_eq!(bass.duty(), DutyCycle::Half);
        assert_eq!(bass.noise(), NoiseMode::Long);
    }
}
