// src/scheduler.rs
//
// Tick Scheduler: the look-ahead timing core.
//
// A periodic driver calls `pump`. Each call commits every tick whose due
// time falls inside `now + look_ahead`, queuing tick and note events stamped
// with their exact audio-clock time. The next tick's time is recomputed from
// the tempo as each tick is committed, so a tempo change reaches only ticks
// not yet inside the window.
//
// This struct never touches audio. Consumers drain its events.

use std::sync::Arc;

use crate::config::{DEFAULT_LOOK_AHEAD, EngineConfig};
use crate::host::AudioClock;
use crate::note_source::{NoteSnapshot, ScheduledNote};
use crate::transport::{DEFAULT_SONG_LENGTH, LoopRegion, Tempo, TransportState};

/// Notification produced by the scheduler, in emission order.
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerEvent {
    /// A tick was committed (or re-published by seek/stop).
    Tick(u32),

    /// A note falls due at `due_time`; `duration` is in seconds at the
    /// tempo in force when it was committed.
    NoteScheduled {
        note: ScheduledNote,
        due_time: f64,
        duration: f64,
    },

    TransportChanged(TransportState),
}

pub struct Scheduler {
    clock: Option<Box<dyn AudioClock>>,

    state: TransportState,
    current_tick: u32,
    tempo: Tempo,
    loop_region: LoopRegion,
    song_length: u32,

    /// Audio-clock time at which `current_tick` is due.
    next_tick_time: f64,
    look_ahead: f64,

    /// Notes for the running session.
    snapshot: Arc<NoteSnapshot>,

    /// Notes loaded since the session started; promoted by play/record.
    staged: Option<Arc<NoteSnapshot>>,

    events: Vec<SchedulerEvent>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            clock: None,
            state: TransportState::Stopped,
            current_tick: 0,
            tempo: Tempo::default(),
            loop_region: LoopRegion::default(),
            song_length: DEFAULT_SONG_LENGTH,
            next_tick_time: 0.0,
            look_ahead: DEFAULT_LOOK_AHEAD,
            snapshot: Arc::new(NoteSnapshot::empty()),
            staged: None,
            events: Vec::with_capacity(64),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        let mut scheduler = Self::new();
        scheduler.set_look_ahead(config.look_ahead);
        scheduler
    }

    //
    // ===============================
    // MARK: Configuration
    // ===============================
    //

    /// Attach the audio clock. Until this is called transport calls are ignored.
    pub fn set_audio_clock_source<C: AudioClock + 'static>(&mut self, clock: C) {
        self.clock = Some(Box::new(clock));
        log::debug!("scheduler clock attached");
    }

    #[inline]
    pub fn is_attached(&self) -> bool {
        self.clock.is_some()
    }

    pub fn set_tempo(&mut self, bpm: f64) {
        self.tempo.set_bpm(bpm);
    }

    pub fn set_resolution(&mut self, ticks_per_quarter: u32) {
        self.tempo.set_ticks_per_quarter(ticks_per_quarter);
    }

    pub fn set_loop(&mut self, enabled: bool, start: u32, end: u32) {
        self.loop_region = LoopRegion::new(enabled, start, end);
    }

    pub fn set_loop_enabled(&mut self, enabled: bool) {
        self.loop_region.enabled = enabled;
    }

    pub fn set_song_length(&mut self, ticks: u32) {
        self.song_length = ticks.max(1);
    }

    pub fn set_look_ahead(&mut self, seconds: f64) {
        self.look_ahead = seconds.max(0.0);
    }

    /// Stage notes for the next play/record. A running session keeps its notes.
    pub fn load_notes(&mut self, snapshot: NoteSnapshot) {
        log::debug!("staged {} notes", snapshot.len());
        self.staged = Some(Arc::new(snapshot));
    }

    //
    // ===============================
    // MARK: Accessors
    // ===============================
    //

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn current_tick(&self) -> u32 {
        self.current_tick
    }

    pub fn tempo(&self) -> Tempo {
        self.tempo
    }

    pub fn bpm(&self) -> f64 {
        self.tempo.bpm()
    }

    pub fn resolution(&self) -> u32 {
        self.tempo.ticks_per_quarter()
    }

    pub fn loop_region(&self) -> LoopRegion {
        self.loop_region
    }

    pub fn song_length(&self) -> u32 {
        self.song_length
    }

    pub fn look_ahead(&self) -> f64 {
        self.look_ahead
    }

    pub fn next_tick_time(&self) -> f64 {
        self.next_tick_time
    }

    /// Transport position in seconds at the current tempo.
    pub fn position_seconds(&self) -> f64 {
        self.tempo.ticks_to_seconds(self.current_tick)
    }

    /// Notes of the running (or last) session.
    pub fn snapshot(&self) -> &Arc<NoteSnapshot> {
        &self.snapshot
    }

    //
    // ===============================
    // MARK: Transport
    // ===============================
    //

    fn now(&self) -> Option<f64> {
        self.clock.as_ref().map(|c| c.current_time())
    }

    pub fn play(&mut self) {
        self.start(TransportState::Playing);
    }

    /// Same scheduling as `play`; only the published state differs.
    pub fn record(&mut self) {
        self.start(TransportState::Recording);
    }

    fn start(&mut self, state: TransportState) {
        let Some(now) = self.now() else {
            log::debug!("{state} ignored: no audio clock");
            return;
        };
        if self.state == state {
            return;
        }

        if let Some(staged) = self.staged.take() {
            self.snapshot = staged;
        }

        self.state = state;
        self.next_tick_time = now;
        log::debug!("transport {state} from tick {}", self.current_tick);
        self.events.push(SchedulerEvent::TransportChanged(state));
    }

    /// Halt look-ahead and keep the tick. Only valid while advancing.
    pub fn pause(&mut self) {
        if self.clock.is_none() || !self.state.is_advancing() {
            return;
        }
        self.state = TransportState::Paused;
        log::debug!("transport paused at tick {}", self.current_tick);
        self.events
            .push(SchedulerEvent::TransportChanged(TransportState::Paused));
    }

    /// Stop and rewind to tick 0. Already-committed notes still play out.
    pub fn stop(&mut self) {
        if self.clock.is_none() {
            return;
        }
        if self.state == TransportState::Stopped && self.current_tick == 0 {
            return;
        }
        self.halt();
    }

    fn halt(&mut self) {
        self.state = TransportState::Stopped;
        self.current_tick = 0;
        log::debug!("transport stopped");
        self.events
            .push(SchedulerEvent::TransportChanged(TransportState::Stopped));
        self.events.push(SchedulerEvent::Tick(0));
    }

    /// Jump to `tick` (clamped to >= 0). While advancing, timing re-anchors to now.
    pub fn seek_to(&mut self, tick: i64) {
        let Some(now) = self.now() else {
            return;
        };
        self.current_tick = tick.clamp(0, u32::MAX as i64) as u32;
        self.events.push(SchedulerEvent::Tick(self.current_tick));

        if self.state.is_advancing() {
            self.next_tick_time = now;
        }
    }

    //
    // ===============================
    // MARK: Look-ahead
    // ===============================
    //

    /// Commit every tick due before `now + look_ahead`.
    ///
    /// Returns the number of ticks committed.
    pub fn pump(&mut self) -> usize {
        if !self.state.is_advancing() {
            return 0;
        }
        let Some(now) = self.now() else {
            return 0;
        };

        let horizon = now + self.look_ahead;
        let mut committed = 0;

        while self.next_tick_time < horizon {
            self.commit_tick();
            committed += 1;
            self.advance_tick();

            if !self.state.is_advancing() {
                break;
            }
        }
        committed
    }

    fn commit_tick(&mut self) {
        let tick = self.current_tick;
        let due_time = self.next_tick_time;
        self.events.push(SchedulerEvent::Tick(tick));

        for note in self.snapshot.notes_at(tick) {
            self.events.push(SchedulerEvent::NoteScheduled {
                note: note.clone(),
                due_time,
                duration: self.tempo.ticks_to_seconds(note.duration_ticks),
            });
        }
    }

    fn advance_tick(&mut self) {
        self.next_tick_time += self.tempo.seconds_per_tick();
        self.current_tick = self.current_tick.saturating_add(1);

        if self.loop_region.enabled {
            if self.current_tick >= self.loop_region.end() {
                self.current_tick = self.loop_region.start();
            }
        } else if self.current_tick >= self.song_length {
            self.halt();
        }
    }

    /// Take queued events in emission order.
    pub fn drain_events(&mut self) -> Vec<SchedulerEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn has_events(&self) -> bool {
        !self.events.is_empty()
    }

    /// Stop, drop notes and detach the clock.
    pub fn dispose(&mut self) {
        self.stop();
        self.snapshot = Arc::new(NoteSnapshot::empty());
        self.staged = None;
        self.clock = None;
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::Channel;
    use crate::host::SharedClock;

    fn attached(bpm: f64) -> (Scheduler, SharedClock) {
        let clock = SharedClock::new();
        let mut scheduler = Scheduler::new();
        scheduler.set_audio_clock_source(clock.clone());
        scheduler.set_tempo(bpm);
        scheduler.set_resolution(96);
        (scheduler, clock)
    }

    fn lead(start_tick: u32, duration_ticks: u32) -> ScheduledNote {
        ScheduledNote::new(Channel::PulseA, 60, 100, start_tick, duration_ticks, "lead")
    }

    fn notes(events: &[SchedulerEvent]) -> Vec<(u32, f64, f64)> {
        events
            .iter()
            .filter_map(|e| match e {
                SchedulerEvent::NoteScheduled {
                    note,
                    due_time,
                    duration,
                } => Some((note.start_tick, *due_time, *duration)),
                _ => None,
            })
            .collect()
    }

    fn ticks(events: &[SchedulerEvent]) -> Vec<u32> {
        events
            .iter()
            .filter_map(|e| match e {
                SchedulerEvent::Tick(t) => Some(*t),
                _ => None,
            })
            .collect()
    }

    /// Run the driver every 25 ms of audio time for `seconds`.
    fn drive(scheduler: &mut Scheduler, clock: &SharedClock, seconds: f64) -> Vec<SchedulerEvent> {
        let mut events = Vec::new();
        let steps = (seconds / 0.025).round() as usize;
        for _ in 0..steps {
            clock.advance(0.025);
            scheduler.pump();
            events.extend(scheduler.drain_events());
        }
        events
    }

    #[test]
    fn test_unattached_is_inert() {
        let mut scheduler = Scheduler::new();
        scheduler.play();
        scheduler.seek_to(10);
        scheduler.stop();
        assert_eq!(scheduler.state(), TransportState::Stopped);
        assert_eq!(scheduler.pump(), 0);
        assert!(!scheduler.has_events());

        scheduler.set_tempo(500.0);
        assert_eq!(scheduler.bpm(), 300.0);
    }

    #[test]
    fn test_look_ahead_window() {
        let (mut scheduler, _clock) = attached(120.0);
        scheduler.play();
        let committed = scheduler.pump();

        // ticks 0..=19 fall before 0.1 s at 120 bpm / 96 ppqn
        assert_eq!(committed, 20);
        assert_eq!(scheduler.current_tick(), 20);
        assert!(scheduler.next_tick_time() >= 0.1);

        assert_eq!(scheduler.pump(), 0);
    }

    #[test]
    fn test_shorter_window_commits_less() {
        let (mut scheduler, _clock) = attached(120.0);
        scheduler.set_look_ahead(0.05);
        scheduler.play();
        assert_eq!(scheduler.pump(), 10);

        scheduler.set_look_ahead(-1.0);
        assert_eq!(scheduler.look_ahead(), 0.0);

        let config = EngineConfig::new().with_look_ahead(0.2);
        assert_eq!(Scheduler::from_config(&config).look_ahead(), 0.2);
    }

    #[test]
    fn test_tempo_change_affects_future_ticks_only() {
        let (mut scheduler, clock) = attached(120.0);
        scheduler.load_notes(NoteSnapshot::new([lead(20, 96), lead(21, 96)]));
        scheduler.play();
        scheduler.pump();
        scheduler.drain_events();

        let tick_20_due = 20.0 * (0.5 / 96.0);
        assert!((scheduler.next_tick_time() - tick_20_due).abs() < 1e-12);

        scheduler.set_tempo(60.0);
        clock.set(0.05);
        scheduler.pump();
        let scheduled = notes(&scheduler.drain_events());

        assert_eq!(scheduled.len(), 2);
        let (t20, due20, dur20) = scheduled[0];
        let (t21, due21, _) = scheduled[1];
        assert_eq!((t20, t21), (20, 21));
        assert!((due20 - tick_20_due).abs() < 1e-12);
        assert!((due21 - (tick_20_due + 1.0 / 96.0)).abs() < 1e-12);
        assert!((dur20 - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_loop_never_reaches_loop_end() {
        let (mut scheduler, clock) = attached(150.0);
        scheduler.set_loop(true, 0, 384);
        scheduler.play();

        let events = drive(&mut scheduler, &clock, 10.0);
        let ticks = ticks(&events);

        assert!(ticks.iter().all(|&t| t < 384));
        assert!(ticks.iter().filter(|&&t| t == 0).count() >= 5);
        assert!(ticks.windows(2).any(|w| w == [383, 0]));
        assert_eq!(scheduler.state(), TransportState::Playing);
    }

    #[test]
    fn test_song_end_stops_once() {
        let (mut scheduler, clock) = attached(300.0);
        scheduler.set_song_length(1536);
        scheduler.play();

        let events = drive(&mut scheduler, &clock, 5.0);
        let stops = events
            .iter()
            .filter(|e| **e == SchedulerEvent::TransportChanged(TransportState::Stopped))
            .count();

        assert_eq!(stops, 1);
        assert_eq!(scheduler.state(), TransportState::Stopped);
        assert_eq!(scheduler.current_tick(), 0);
        assert!(ticks(&events).iter().all(|&t| t < 1536));
    }

    #[test]
    fn test_single_note_scenario() {
        let (mut scheduler, clock) = attached(120.0);
        scheduler.load_notes(NoteSnapshot::new([lead(0, 96)]));
        scheduler.play();

        let mut events = Vec::new();
        scheduler.pump();
        events.extend(scheduler.drain_events());
        clock.set(scheduler.look_ahead());
        scheduler.pump();
        events.extend(scheduler.drain_events());

        let scheduled = notes(&events);
        assert_eq!(scheduled.len(), 1);
        let (_, due, duration) = scheduled[0];
        assert!(due.abs() < 1e-9);
        assert!((duration - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let (mut scheduler, _clock) = attached(120.0);
        scheduler.play();
        scheduler.pump();
        scheduler.drain_events();

        scheduler.stop();
        assert_eq!(
            scheduler.drain_events(),
            vec![
                SchedulerEvent::TransportChanged(TransportState::Stopped),
                SchedulerEvent::Tick(0)
            ]
        );

        scheduler.stop();
        assert!(scheduler.drain_events().is_empty());
    }

    #[test]
    fn test_seek_clamps_and_reanchors() {
        let (mut scheduler, clock) = attached(120.0);
        scheduler.seek_to(-5);
        assert_eq!(scheduler.drain_events(), vec![SchedulerEvent::Tick(0)]);

        scheduler.play();
        scheduler.pump();
        clock.set(1.0);
        scheduler.seek_to(100);

        assert_eq!(scheduler.current_tick(), 100);
        assert_eq!(scheduler.next_tick_time(), 1.0);
        assert_eq!(scheduler.drain_events().last(), Some(&SchedulerEvent::Tick(100)));
    }

    #[test]
    fn test_seek_while_stopped_moves_start() {
        let (mut scheduler, _clock) = attached(120.0);
        scheduler.load_notes(NoteSnapshot::new([lead(0, 96), lead(200, 96)]));
        scheduler.seek_to(200);
        scheduler.play();
        scheduler.pump();

        let scheduled = notes(&scheduler.drain_events());
        assert_eq!(scheduled.len(), 1);
        assert_eq!(scheduled[0].0, 200);
    }

    #[test]
    fn test_pause_keeps_tick() {
        let (mut scheduler, clock) = attached(120.0);
        scheduler.pause();
        assert!(!scheduler.has_events());

        scheduler.play();
        scheduler.pump();
        scheduler.pause();
        let paused_at = scheduler.current_tick();

        clock.set(2.0);
        assert_eq!(scheduler.pump(), 0);
        assert_eq!(scheduler.state(), TransportState::Paused);

        scheduler.play();
        assert_eq!(scheduler.current_tick(), paused_at);
        assert_eq!(scheduler.next_tick_time(), 2.0);
    }

    #[test]
    fn test_notes_loaded_mid_session_wait_for_next_start() {
        let (mut scheduler, clock) = attached(120.0);
        scheduler.play();
        scheduler.pump();
        scheduler.load_notes(NoteSnapshot::new([lead(30, 10)]));

        clock.set(0.1);
        scheduler.pump();
        assert!(notes(&scheduler.drain_events()).is_empty());

        scheduler.stop();
        scheduler.play();
        assert_eq!(scheduler.snapshot().len(), 1);
    }

    #[test]
    fn test_record_publishes_its_own_state() {
        let (mut scheduler, _clock) = attached(120.0);
        scheduler.record();
        assert_eq!(scheduler.state(), TransportState::Recording);
        assert_eq!(
            scheduler.drain_events(),
            vec![SchedulerEvent::TransportChanged(TransportState::Recording)]
        );
        scheduler.record();
        assert!(!scheduler.has_events());
    }
}
