// src/sequencer.rs
//
// The engine context.
//
// One `Sequencer` per session owns the Voice Engine, the Tick Scheduler and
// the instrument bank. It turns scheduled notes into voices started at their
// exact due time, queues their releases, and forwards notifications to the
// UI through single-subscriber observer slots.

use std::sync::Arc;

use crate::channel::{Channel, PulseChannel};
use crate::config::EngineConfig;
use crate::envelope::Envelope;
use crate::error::EngineError;
use crate::frequency::midi_to_frequency;
use crate::host::{AudioClock, AudioHost};
use crate::instrument::{Instrument, InstrumentBank, NoiseMode};
use crate::note_source::{NoteSnapshot, ScheduledNote};
use crate::offline::OfflineHost;
use crate::scheduler::{Scheduler, SchedulerEvent};
use crate::state::Song;
use crate::transport::{LoopRegion, TransportState};
use crate::voice::VoiceId;
use crate::voice_engine::VoiceEngine;
use crate::waveform::DutyCycle;

pub type TickObserver = Box<dyn FnMut(u32) + Send>;
pub type NoteObserver = Box<dyn FnMut(&ScheduledNote, f64, f64) + Send>;
pub type TransportObserver = Box<dyn FnMut(TransportState) + Send>;

/// A voice to be stopped once the audio clock reaches `at`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct PendingRelease {
    at: f64,
    voice: VoiceId,
}

pub struct Sequencer<H: AudioHost> {
    voices: VoiceEngine<H>,
    scheduler: Scheduler,
    instruments: InstrumentBank,

    pending_releases: Vec<PendingRelease>,
    notes_scheduled: u64,

    on_tick: Option<TickObserver>,
    on_note_scheduled: Option<NoteObserver>,
    on_transport_changed: Option<TransportObserver>,
}

impl<H: AudioHost> Sequencer<H> {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            voices: VoiceEngine::new(config),
            scheduler: Scheduler::from_config(&config),
            instruments: InstrumentBank::standard(),
            pending_releases: Vec::new(),
            notes_scheduled: 0,
            on_tick: None,
            on_note_scheduled: None,
            on_transport_changed: None,
        }
    }

    pub fn with_instruments(mut self, instruments: InstrumentBank) -> Self {
        self.instruments = instruments;
        self
    }

    /// Bring up the voice engine and attach the host clock to the scheduler.
    pub fn init(&mut self, host: H) -> Result<(), EngineError> {
        let clock = host.clock();
        self.voices.init(host)?;
        self.scheduler.set_audio_clock_source(clock);
        Ok(())
    }

    /// Attach a clock without a voice engine (scheduling only).
    ///
    /// Ignored once a host failure has retired the voice engine.
    pub fn set_audio_clock_source<C: AudioClock + 'static>(&mut self, clock: C) {
        if self.voices.has_failed() {
            log::warn!("clock attach ignored: voice engine unavailable");
            return;
        }
        self.scheduler.set_audio_clock_source(clock);
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        self.voices.is_ready() && self.scheduler.is_attached()
    }

    //
    // ===============================
    // MARK: Transport
    // ===============================
    //

    pub fn set_tempo(&mut self, bpm: f64) {
        self.scheduler.set_tempo(bpm);
    }

    pub fn set_resolution(&mut self, ticks_per_quarter: u32) {
        self.scheduler.set_resolution(ticks_per_quarter);
    }

    pub fn set_loop(&mut self, enabled: bool, start: u32, end: u32) {
        self.scheduler.set_loop(enabled, start, end);
    }

    /// Toggle looping, keeping the region bounds.
    pub fn set_loop_enabled(&mut self, enabled: bool) {
        self.scheduler.set_loop_enabled(enabled);
    }

    pub fn set_song_length(&mut self, ticks: u32) {
        self.scheduler.set_song_length(ticks);
    }

    pub fn load_notes(&mut self, snapshot: NoteSnapshot) {
        self.scheduler.load_notes(snapshot);
    }

    /// Take tempo, length, notes and track levels from a song.
    pub fn load_song(&mut self, song: &Song) {
        self.scheduler.set_tempo(song.bpm);
        self.scheduler.set_resolution(song.ppqn);
        self.scheduler.set_song_length(song.length_ticks());
        self.scheduler.load_notes(NoteSnapshot::from_song(song));
        self.apply_track_volumes(song);
    }

    /// Push each track's volume to its channel bus.
    pub fn apply_track_volumes(&mut self, song: &Song) {
        for track in &song.tracks {
            self.voices.set_channel_volume(track.channel, track.volume);
        }
    }

    pub fn play(&mut self) {
        self.scheduler.play();
        self.dispatch_events();
    }

    pub fn record(&mut self) {
        self.scheduler.record();
        self.dispatch_events();
    }

    /// Rebuild the snapshot from `song`, then play.
    pub fn play_song(&mut self, song: &Song) {
        self.load_song(song);
        self.play();
    }

    pub fn record_song(&mut self, song: &Song) {
        self.load_song(song);
        self.record();
    }

    pub fn pause(&mut self) {
        self.scheduler.pause();
        self.dispatch_events();
    }

    /// Stop the transport. Voices already committed play out their envelopes.
    pub fn stop(&mut self) {
        self.scheduler.stop();
        self.dispatch_events();
    }

    pub fn seek_to(&mut self, tick: i64) {
        self.scheduler.seek_to(tick);
        self.dispatch_events();
    }

    pub fn transport_state(&self) -> TransportState {
        self.scheduler.state()
    }

    pub fn current_tick(&self) -> u32 {
        self.scheduler.current_tick()
    }

    pub fn position_seconds(&self) -> f64 {
        self.scheduler.position_seconds()
    }

    pub fn bpm(&self) -> f64 {
        self.scheduler.bpm()
    }

    pub fn loop_region(&self) -> LoopRegion {
        self.scheduler.loop_region()
    }

    //
    // ===============================
    // MARK: Driver tick
    // ===============================
    //

    /// One driver period: retire ended voices, fire due releases, look ahead.
    ///
    /// Returns the number of ticks committed.
    pub fn pump(&mut self) -> usize {
        let retired = self.voices.collect_ended();
        if !retired.is_empty() {
            self.pending_releases.retain(|r| !retired.contains(&r.voice));
        }

        if let Some(now) = self.voices.current_time() {
            let mut due = Vec::new();
            self.pending_releases.retain(|r| {
                if r.at <= now {
                    due.push(r.voice);
                    false
                } else {
                    true
                }
            });
            for voice in due {
                self.voices.stop(voice);
            }
        }

        let committed = self.scheduler.pump();
        self.dispatch_events();
        committed
    }

    fn dispatch_events(&mut self) {
        loop {
            let events = self.scheduler.drain_events();
            if events.is_empty() {
                break;
            }
            for event in events {
                self.dispatch(event);
            }
            if self.voices.has_failed() && self.scheduler.is_attached() {
                self.retire_transport();
            }
        }
    }

    fn dispatch(&mut self, event: SchedulerEvent) {
        match event {
            SchedulerEvent::Tick(tick) => {
                if let Some(observer) = self.on_tick.as_mut() {
                    observer(tick);
                }
            }
            SchedulerEvent::NoteScheduled {
                note,
                due_time,
                duration,
            } => {
                self.notes_scheduled += 1;
                if let Some(voice) = self.render_note(&note, due_time) {
                    self.pending_releases.push(PendingRelease {
                        at: due_time + duration,
                        voice,
                    });
                }
                if let Some(observer) = self.on_note_scheduled.as_mut() {
                    observer(&note, due_time, duration);
                }
            }
            SchedulerEvent::TransportChanged(state) => {
                if let Some(observer) = self.on_transport_changed.as_mut() {
                    observer(state);
                }
            }
        }
    }

    /// The voice engine is gone for good: halt and detach the scheduler so
    /// later transport calls are no-ops.
    fn retire_transport(&mut self) {
        log::error!("voice engine failed, transport disabled");
        self.scheduler.dispose();
        self.pending_releases.clear();
    }

    /// Resolve a note's instrument, falling back to the channel default.
    fn instrument_for(&self, channel: Channel, id: Option<&str>) -> Option<Arc<Instrument>> {
        if let Some(id) = id {
            if let Some(instrument) = self.instruments.get(id) {
                return Some(instrument);
            }
            log::warn!("unknown instrument '{id}', using {channel} default");
        }
        self.instruments.default_for(channel)
    }

    fn render_note(&mut self, note: &ScheduledNote, when: f64) -> Option<VoiceId> {
        let Some(instrument) = self.instrument_for(note.channel, Some(&*note.instrument_id)) else {
            log::warn!("no instrument for {} note, skipped", note.channel);
            return None;
        };
        self.start_with(instrument.as_ref(), note.channel, note.pitch, note.velocity, when)
    }

    fn start_with(
        &mut self,
        instrument: &Instrument,
        channel: Channel,
        pitch: u8,
        velocity: u8,
        when: f64,
    ) -> Option<VoiceId> {
        let envelope = instrument.envelope;
        match channel {
            Channel::PulseA | Channel::PulseB => {
                let pulse = channel.as_pulse()?;
                self.voices
                    .start_pulse_at(pulse, pitch, velocity, instrument.duty(), &envelope, when)
            }
            Channel::Triangle => self.voices.start_triangle_at(pitch, &envelope, when),
            Channel::Noise => self.voices.start_noise_at(
                instrument.noise(),
                midi_to_frequency(pitch),
                velocity,
                &envelope,
                when,
            ),
        }
    }

    //
    // ===============================
    // MARK: Live playing
    // ===============================
    //

    /// Start a held note now. It sounds until `note_off`.
    pub fn note_on(
        &mut self,
        channel: Channel,
        pitch: u8,
        velocity: u8,
        instrument_id: Option<&str>,
    ) -> Option<VoiceId> {
        let now = self.voices.current_time()?;
        let instrument = self.instrument_for(channel, instrument_id)?;
        self.start_with(instrument.as_ref(), channel, pitch, velocity, now)
    }

    pub fn note_off(&mut self, voice: VoiceId) {
        self.voices.stop(voice);
    }

    pub fn start_pulse(
        &mut self,
        channel: PulseChannel,
        pitch: u8,
        velocity: u8,
        duty: DutyCycle,
        envelope: &Envelope,
    ) -> Option<VoiceId> {
        self.voices.start_pulse(channel, pitch, velocity, duty, envelope)
    }

    pub fn start_triangle(&mut self, pitch: u8, envelope: &Envelope) -> Option<VoiceId> {
        self.voices.start_triangle(pitch, envelope)
    }

    pub fn start_noise(
        &mut self,
        mode: NoiseMode,
        frequency: f64,
        velocity: u8,
        envelope: &Envelope,
    ) -> Option<VoiceId> {
        self.voices.start_noise(mode, frequency, velocity, envelope)
    }

    pub fn stop_voice(&mut self, voice: VoiceId) {
        self.voices.stop(voice);
    }

    /// Fade every sounding voice and forget queued releases.
    pub fn stop_all_voices(&mut self) {
        self.voices.stop_all();
        self.pending_releases.clear();
    }

    pub fn set_master_volume(&mut self, level: f32) {
        self.voices.set_master_volume(level);
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.voices.set_muted(muted);
    }

    pub fn set_channel_volume(&mut self, channel: Channel, level: f32) {
        self.voices.set_channel_volume(channel, level);
    }

    //
    // ===============================
    // MARK: Observers
    // ===============================
    //

    pub fn on_tick<F: FnMut(u32) + Send + 'static>(&mut self, observer: F) {
        self.on_tick = Some(Box::new(observer));
    }

    pub fn on_note_scheduled<F: FnMut(&ScheduledNote, f64, f64) + Send + 'static>(
        &mut self,
        observer: F,
    ) {
        self.on_note_scheduled = Some(Box::new(observer));
    }

    pub fn on_transport_changed<F: FnMut(TransportState) + Send + 'static>(
        &mut self,
        observer: F,
    ) {
        self.on_transport_changed = Some(Box::new(observer));
    }

    pub fn clear_observers(&mut self) {
        self.on_tick = None;
        self.on_note_scheduled = None;
        self.on_transport_changed = None;
    }

    //
    // ===============================
    // MARK: Inspection
    // ===============================
    //

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn voice_engine(&self) -> &VoiceEngine<H> {
        &self.voices
    }

    pub fn instruments(&self) -> &InstrumentBank {
        &self.instruments
    }

    pub fn insert_instrument(&mut self, instrument: Instrument) {
        self.instruments.insert(instrument);
    }

    pub fn host(&self) -> Option<&H> {
        self.voices.host()
    }

    pub fn host_mut(&mut self) -> Option<&mut H> {
        self.voices.host_mut()
    }

    pub fn active_voice_count(&self) -> usize {
        self.voices.active_voice_count()
    }

    pub fn pending_release_count(&self) -> usize {
        self.pending_releases.len()
    }

    /// Note events dispatched since this sequencer was created.
    ///
    /// Not reset by stop or play.
    pub fn notes_scheduled(&self) -> u64 {
        self.notes_scheduled
    }

    /// Stop everything, detach the clock and hand back the host.
    pub fn dispose(&mut self) -> Option<H> {
        self.scheduler.dispose();
        self.dispatch_events();
        self.pending_releases.clear();
        self.voices.dispose()
    }
}

impl Sequencer<OfflineHost> {
    /// Render host output into `out`, advancing the audio clock.
    pub fn render(&mut self, out: &mut [f32]) {
        match self.voices.host_mut() {
            Some(host) => host.render(out),
            None => out.fill(0.0),
        }
    }
}
