//! WebAssembly bindings via wasm-bindgen for browser integration.
//!
//! This module is only compiled when the `web` feature is enabled.
//!
//! # Usage
//!
//! Build with wasm-pack:
//! ```bash
//! wasm-pack build --target web --features web
//! ```
//!
//! # JavaScript Example
//!
//! ```javascript
//! import init, { nesdaw_init, NesdawEngine } from './nesdaw.js';
//!
//! await init();
//! nesdaw_init();
//!
//! const engine = new NesdawEngine(48000);
//! engine.begin_notes();
//! engine.push_note(0, 60, 100, 0, 96, "mm-lead");
//! engine.commit_notes();
//! engine.play();
//!
//! // In the AudioWorklet: render a block, then let the look-ahead catch up.
//! engine.render(outputBuffer);
//! engine.pump();
//! ```

use std::sync::Arc;

use wasm_bindgen::prelude::*;

use crate::channel::{Channel, PulseChannel};
use crate::config::EngineConfig;
use crate::envelope::Envelope;
use crate::instrument::NoiseMode;
use crate::note_source::{NoteSnapshot, ScheduledNote};
use crate::offline::OfflineHost;
use crate::readback::{self, Readback, SharedReadback};
use crate::sequencer::Sequencer;
use crate::voice::VoiceId;
use crate::waveform::DutyCycle;

// ═══════════════════════════════════════════════════════════════════════════
// Initialization
// ═══════════════════════════════════════════════════════════════════════════

/// Initialize the wasm module. Call this once before using any other functions.
/// Sets up panic hooks and console logging.
#[wasm_bindgen]
pub fn nesdaw_init() {
    console_error_panic_hook::set_once();
    console_log::init_with_level(log::Level::Debug).ok();
}

// ═══════════════════════════════════════════════════════════════════════════
// Readback Data
// ═══════════════════════════════════════════════════════════════════════════

/// Readback data from the engine (for the transport display).
#[wasm_bindgen]
#[derive(Clone, Copy, Default)]
pub struct NesdawReadback {
    /// Current tick.
    pub tick: u32,
    /// 0 = stopped, 1 = playing, 2 = recording, 3 = paused.
    pub transport: u8,
    /// Transport position in seconds.
    pub position_seconds: f64,
    /// Voices currently sounding.
    pub active_voices: u32,
    /// Notes committed since the engine was created.
    pub notes_scheduled: f64,
    /// Whether the audio graph is live.
    pub ready: bool,
}

impl From<Readback> for NesdawReadback {
    fn from(r: Readback) -> Self {
        Self {
            tick: r.tick,
            transport: r.transport.code(),
            position_seconds: r.position_seconds,
            active_voices: r.active_voices,
            // JS numbers are f64
            notes_scheduled: r.notes_scheduled as f64,
            ready: r.ready,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Engine
// ═══════════════════════════════════════════════════════════════════════════

/// Sequencer plus a software audio host, driven from an AudioWorklet.
#[wasm_bindgen]
pub struct NesdawEngine {
    sequencer: Sequencer<OfflineHost>,
    readback: Arc<SharedReadback>,
    staged: Vec<ScheduledNote>,
}

#[wasm_bindgen]
impl NesdawEngine {
    /// Create an engine rendering at `sample_rate`.
    ///
    /// The engine starts silent but usable if the audio graph cannot be built.
    #[wasm_bindgen(constructor)]
    pub fn new(sample_rate: f64) -> NesdawEngine {
        let config = EngineConfig::new().with_sample_rate(sample_rate);
        let mut sequencer = Sequencer::new(config);
        if let Err(e) = sequencer.init(OfflineHost::from_config(&config)) {
            log::error!("audio init failed: {}", e);
        }

        let readback = Arc::new(SharedReadback::new());
        readback::attach(&mut sequencer, &readback);
        readback.publish(&sequencer);

        NesdawEngine {
            sequencer,
            readback,
            staged: Vec::new(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.sequencer.is_ready()
    }

    // ───────────────────────────────────────────────────────────────────────
    // Audio
    // ───────────────────────────────────────────────────────────────────────

    /// Render one block of mono output, advancing the audio clock.
    pub fn render(&mut self, output: &mut [f32]) {
        self.sequencer.render(output);
    }

    /// Commit everything due inside the look-ahead window.
    pub fn pump(&mut self) -> u32 {
        let committed = self.sequencer.pump();
        self.readback.publish(&self.sequencer);
        committed as u32
    }

    // ───────────────────────────────────────────────────────────────────────
    // Notes
    // ───────────────────────────────────────────────────────────────────────

    /// Start building a new note list.
    pub fn begin_notes(&mut self) {
        self.staged.clear();
    }

    /// Add a note to the list being built. Unknown channels are ignored.
    pub fn push_note(
        &mut self,
        channel: u8,
        pitch: u8,
        velocity: u8,
        start_tick: u32,
        duration_ticks: u32,
        instrument_id: &str,
    ) {
        let Some(channel) = Channel::from_index(channel) else {
            log::warn!("push_note: unknown channel {}", channel);
            return;
        };
        self.staged.push(ScheduledNote::new(
            channel,
            pitch,
            velocity,
            start_tick,
            duration_ticks,
            instrument_id,
        ));
    }

    /// Stage the built list. It takes effect at the next play or record.
    pub fn commit_notes(&mut self) {
        let notes = std::mem::take(&mut self.staged);
        self.sequencer.load_notes(NoteSnapshot::new(notes));
    }

    // ───────────────────────────────────────────────────────────────────────
    // Transport
    // ───────────────────────────────────────────────────────────────────────

    pub fn play(&mut self) {
        self.sequencer.play();
    }

    pub fn record(&mut self) {
        self.sequencer.record();
    }

    pub fn pause(&mut self) {
        self.sequencer.pause();
    }

    pub fn stop(&mut self) {
        self.sequencer.stop();
    }

    /// Jump to `tick`. Negative values clamp to 0.
    pub fn seek(&mut self, tick: f64) {
        self.sequencer.seek_to(tick as i64);
    }

    pub fn set_tempo(&mut self, bpm: f64) {
        self.sequencer.set_tempo(bpm);
    }

    pub fn set_resolution(&mut self, ticks_per_quarter: u32) {
        self.sequencer.set_resolution(ticks_per_quarter);
    }

    pub fn set_loop(&mut self, enabled: bool, start: u32, end: u32) {
        self.sequencer.set_loop(enabled, start, end);
    }

    pub fn set_loop_enabled(&mut self, enabled: bool) {
        self.sequencer.set_loop_enabled(enabled);
    }

    pub fn set_song_length(&mut self, ticks: u32) {
        self.sequencer.set_song_length(ticks);
    }

    pub fn get_tempo(&self) -> f64 {
        self.sequencer.bpm()
    }

    pub fn get_tick(&self) -> u32 {
        self.sequencer.current_tick()
    }

    pub fn get_readback(&self) -> NesdawReadback {
        self.readback.load().into()
    }

    // ───────────────────────────────────────────────────────────────────────
    // Live Playing
    // ───────────────────────────────────────────────────────────────────────

    /// Start a held note with an instrument preset. Returns 0 on failure.
    pub fn note_on(&mut self, channel: u8, pitch: u8, velocity: u8, instrument_id: &str) -> u32 {
        let voice = Channel::from_index(channel).and_then(|channel| {
            let id = (!instrument_id.is_empty()).then_some(instrument_id);
            self.sequencer.note_on(channel, pitch, velocity, id)
        });
        VoiceId::raw_or_sentinel(voice)
    }

    pub fn note_off(&mut self, voice: u32) {
        if let Some(voice) = VoiceId::from_raw(voice) {
            self.sequencer.note_off(voice);
        }
    }

    /// Start a raw pulse voice. `channel` 0 = A, 1 = B. Returns 0 on failure.
    pub fn start_pulse(
        &mut self,
        channel: u8,
        pitch: u8,
        velocity: u8,
        duty: f64,
        decay: f64,
        sustain: f32,
    ) -> u32 {
        let channel = if channel == 0 { PulseChannel::A } else { PulseChannel::B };
        let envelope = Envelope::decay_sustain(decay, sustain);
        let voice = self.sequencer.start_pulse(
            channel,
            pitch,
            velocity,
            DutyCycle::from_fraction(duty),
            &envelope,
        );
        VoiceId::raw_or_sentinel(voice)
    }

    pub fn start_triangle(&mut self, pitch: u8, decay: f64, sustain: f32) -> u32 {
        let envelope = Envelope::decay_sustain(decay, sustain);
        VoiceId::raw_or_sentinel(self.sequencer.start_triangle(pitch, &envelope))
    }

    /// Start a raw noise voice. `short_mode` selects the metallic mode.
    pub fn start_noise(
        &mut self,
        frequency: f64,
        velocity: u8,
        short_mode: bool,
        decay: f64,
        sustain: f32,
    ) -> u32 {
        let mode = if short_mode { NoiseMode::Short } else { NoiseMode::Long };
        let envelope = Envelope::decay_sustain(decay, sustain);
        VoiceId::raw_or_sentinel(self.sequencer.start_noise(mode, frequency, velocity, &envelope))
    }

    pub fn stop_all_voices(&mut self) {
        self.sequencer.stop_all_voices();
    }

    // ───────────────────────────────────────────────────────────────────────
    // Mixer
    // ───────────────────────────────────────────────────────────────────────

    pub fn set_master_volume(&mut self, level: f32) {
        self.sequencer.set_master_volume(level);
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.sequencer.set_muted(muted);
    }

    pub fn set_channel_volume(&mut self, channel: u8, level: f32) {
        if let Some(channel) = Channel::from_index(channel) {
            self.sequencer.set_channel_volume(channel, level);
        }
    }

    /// Tear down the audio graph. The engine is inert afterwards.
    pub fn dispose(&mut self) {
        self.sequencer.dispose();
        self.readback.publish(&self.sequencer);
    }
}
