// C-compatible FFI bindings for Swift/iOS integration.
//
// Safety requirements:
// - All pointers must be non-null unless documented otherwise
// - All handles must be created by this module and not fabricated
// - String parameters must be valid UTF-8 (Swift strings are always valid)
// - Caller must call nesdaw_engine_destroy for each nesdaw_engine_create

use std::ffi::{CStr, c_char};
use std::sync::Arc;

use crate::channel::Channel;
use crate::config::{DEFAULT_MASTER_VOLUME, DEFAULT_SAMPLE_RATE, EngineConfig};
use crate::note_source::{NoteSnapshot, ScheduledNote};
use crate::offline::OfflineHost;
use crate::readback::{self, Readback, SharedReadback};
use crate::sequencer::Sequencer;
use crate::voice::VoiceId;

use log::{LevelFilter, error, info, warn};
use oslog::OsLogger;

// Logger subsystem identifier
const LOG_SUBSYSTEM: &str = "com.nesdaw.engine";

// ═══════════════════════════════════════════════════════════════════════════
// Logger Initialization
// ═══════════════════════════════════════════════════════════════════════════

/// Initialize the oslog logger.
///
/// Call once at application startup. Output appears in Console.app and
/// Xcode's debug console.
#[unsafe(no_mangle)]
pub extern "C" fn nesdaw_init_logger() {
    OsLogger::new(LOG_SUBSYSTEM)
        .level_filter(LevelFilter::Debug)
        .init()
        .ok();
}

// ═══════════════════════════════════════════════════════════════════════════
// Opaque Handle Types
// ═══════════════════════════════════════════════════════════════════════════

/// Opaque handle to a sequencer with its software audio host.
pub struct NesdawEngine {
    sequencer: Sequencer<OfflineHost>,
    readback: Arc<SharedReadback>,
    staged: Vec<ScheduledNote>,
}

// ═══════════════════════════════════════════════════════════════════════════
// FFI Result Types
// ═══════════════════════════════════════════════════════════════════════════

/// Readback data for the transport display.
#[repr(C)]
pub struct NesdawReadback {
    pub tick: u32,
    /// 0 = stopped, 1 = playing, 2 = recording, 3 = paused.
    pub transport: u8,
    pub position_seconds: f64,
    pub active_voices: u32,
    pub notes_scheduled: u64,
    pub ready: bool,
}

impl From<Readback> for NesdawReadback {
    fn from(r: Readback) -> Self {
        Self {
            tick: r.tick,
            transport: r.transport.code(),
            position_seconds: r.position_seconds,
            active_voices: r.active_voices,
            notes_scheduled: r.notes_scheduled,
            ready: r.ready,
        }
    }
}

/// Engine configuration.
#[repr(C)]
pub struct NesdawConfig {
    /// Sample rate in Hz (e.g., 44100.0, 48000.0).
    pub sample_rate: f64,
    /// Initial master volume, 0.0 - 1.0.
    pub master_volume: f32,
}

impl Default for NesdawConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            master_volume: DEFAULT_MASTER_VOLUME,
        }
    }
}

/// Get the default configuration values.
#[unsafe(no_mangle)]
pub extern "C" fn nesdaw_default_config() -> NesdawConfig {
    NesdawConfig::default()
}

// ═══════════════════════════════════════════════════════════════════════════
// Engine Lifecycle
// ═══════════════════════════════════════════════════════════════════════════

/// Create an engine.
///
/// The engine is returned even if audio init fails; check
/// `nesdaw_engine_is_ready`.
///
/// # Safety
/// `config` must be a valid pointer to a NesdawConfig or NULL for defaults.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn nesdaw_engine_create(config: *const NesdawConfig) -> *mut NesdawEngine {
    let cfg = if config.is_null() {
        NesdawConfig::default()
    } else {
        unsafe { std::ptr::read(config) }
    };

    let config = EngineConfig::new()
        .with_sample_rate(cfg.sample_rate)
        .with_master_volume(cfg.master_volume);
    let mut sequencer = Sequencer::new(config);
    match sequencer.init(OfflineHost::from_config(&config)) {
        Ok(()) => info!("engine created at {} Hz", cfg.sample_rate),
        Err(e) => error!("engine audio init failed: {}", e),
    }

    let readback = Arc::new(SharedReadback::new());
    readback::attach(&mut sequencer, &readback);
    readback.publish(&sequencer);

    Box::into_raw(Box::new(NesdawEngine {
        sequencer,
        readback,
        staged: Vec::new(),
    }))
}

/// Destroy an engine.
///
/// # Safety
/// `engine` must be a valid pointer returned by `nesdaw_engine_create`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn nesdaw_engine_destroy(engine: *mut NesdawEngine) {
    if !engine.is_null() {
        let mut engine = unsafe { Box::from_raw(engine) };
        engine.sequencer.dispose();
    }
}

/// # Safety
/// `engine` must be a valid pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn nesdaw_engine_is_ready(engine: *const NesdawEngine) -> bool {
    if engine.is_null() {
        return false;
    }
    unsafe { (*engine).sequencer.is_ready() }
}

// ═══════════════════════════════════════════════════════════════════════════
// Audio
// ═══════════════════════════════════════════════════════════════════════════

/// Render `frames` mono samples into `output`, advancing the audio clock.
///
/// # Safety
/// - `engine` must be a valid pointer
/// - `output` must point to at least `frames` writable floats
#[unsafe(no_mangle)]
pub unsafe extern "C" fn nesdaw_engine_render(
    engine: *mut NesdawEngine,
    output: *mut f32,
    frames: u32,
) {
    if engine.is_null() || output.is_null() {
        return;
    }
    unsafe {
        let out = std::slice::from_raw_parts_mut(output, frames as usize);
        (*engine).sequencer.render(out);
    }
}

/// Commit everything due inside the look-ahead window.
///
/// Returns the number of ticks committed.
///
/// # Safety
/// `engine` must be a valid pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn nesdaw_engine_pump(engine: *mut NesdawEngine) -> u32 {
    if engine.is_null() {
        return 0;
    }
    let engine = unsafe { &mut *engine };
    let committed = engine.sequencer.pump();
    engine.readback.publish(&engine.sequencer);
    committed as u32
}

// ═══════════════════════════════════════════════════════════════════════════
// Notes
// ═══════════════════════════════════════════════════════════════════════════

/// Start building a new note list.
///
/// # Safety
/// `engine` must be a valid pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn nesdaw_notes_begin(engine: *mut NesdawEngine) {
    if engine.is_null() {
        return;
    }
    unsafe { (*engine).staged.clear() };
}

/// Add a note to the list being built.
///
/// # Safety
/// - `engine` must be a valid pointer
/// - `instrument_id` must be a valid null-terminated UTF-8 string or NULL
#[unsafe(no_mangle)]
pub unsafe extern "C" fn nesdaw_notes_push(
    engine: *mut NesdawEngine,
    channel: u8,
    pitch: u8,
    velocity: u8,
    start_tick: u32,
    duration_ticks: u32,
    instrument_id: *const c_char,
) {
    if engine.is_null() {
        return;
    }
    let Some(channel) = Channel::from_index(channel) else {
        warn!("nesdaw_notes_push: unknown channel {}", channel);
        return;
    };
    let id = unsafe { str_or(instrument_id, "") };
    let note = ScheduledNote::new(channel, pitch, velocity, start_tick, duration_ticks, id);
    unsafe { (*engine).staged.push(note) };
}

/// Stage the built list. It takes effect at the next play or record.
///
/// # Safety
/// `engine` must be a valid pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn nesdaw_notes_commit(engine: *mut NesdawEngine) {
    if engine.is_null() {
        return;
    }
    let engine = unsafe { &mut *engine };
    let notes = std::mem::take(&mut engine.staged);
    engine.sequencer.load_notes(NoteSnapshot::new(notes));
}

// ═══════════════════════════════════════════════════════════════════════════
// Transport
// ═══════════════════════════════════════════════════════════════════════════

/// # Safety
/// `engine` must be a valid pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn nesdaw_transport_play(engine: *mut NesdawEngine) {
    if engine.is_null() {
        return;
    }
    unsafe { (*engine).sequencer.play() };
}

/// # Safety
/// `engine` must be a valid pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn nesdaw_transport_record(engine: *mut NesdawEngine) {
    if engine.is_null() {
        return;
    }
    unsafe { (*engine).sequencer.record() };
}

/// # Safety
/// `engine` must be a valid pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn nesdaw_transport_pause(engine: *mut NesdawEngine) {
    if engine.is_null() {
        return;
    }
    unsafe { (*engine).sequencer.pause() };
}

/// # Safety
/// `engine` must be a valid pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn nesdaw_transport_stop(engine: *mut NesdawEngine) {
    if engine.is_null() {
        return;
    }
    unsafe { (*engine).sequencer.stop() };
}

/// Jump to `tick`. Negative values clamp to 0.
///
/// # Safety
/// `engine` must be a valid pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn nesdaw_transport_seek(engine: *mut NesdawEngine, tick: i64) {
    if engine.is_null() {
        return;
    }
    unsafe { (*engine).sequencer.seek_to(tick) };
}

/// # Safety
/// `engine` must be a valid pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn nesdaw_transport_set_tempo(engine: *mut NesdawEngine, bpm: f64) {
    if engine.is_null() {
        return;
    }
    unsafe { (*engine).sequencer.set_tempo(bpm) };
}

/// # Safety
/// `engine` must be a valid pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn nesdaw_transport_set_resolution(engine: *mut NesdawEngine, ppqn: u32) {
    if engine.is_null() {
        return;
    }
    unsafe { (*engine).sequencer.set_resolution(ppqn) };
}

/// # Safety
/// `engine` must be a valid pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn nesdaw_transport_set_loop(
    engine: *mut NesdawEngine,
    enabled: bool,
    start: u32,
    end: u32,
) {
    if engine.is_null() {
        return;
    }
    unsafe { (*engine).sequencer.set_loop(enabled, start, end) };
}

/// # Safety
/// `engine` must be a valid pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn nesdaw_transport_set_song_length(engine: *mut NesdawEngine, ticks: u32) {
    if engine.is_null() {
        return;
    }
    unsafe { (*engine).sequencer.set_song_length(ticks) };
}

/// Get the latest published readback.
///
/// # Safety
/// `engine` must be a valid pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn nesdaw_engine_readback(engine: *const NesdawEngine) -> NesdawReadback {
    if engine.is_null() {
        return Readback::default().into();
    }
    unsafe { (*engine).readback.load().into() }
}

// ═══════════════════════════════════════════════════════════════════════════
// Live Playing
// ═══════════════════════════════════════════════════════════════════════════

/// Start a held note. Returns a voice id, or 0 on failure.
///
/// # Safety
/// - `engine` must be a valid pointer
/// - `instrument_id` must be a valid null-terminated UTF-8 string or NULL
///   (NULL selects the channel default)
#[unsafe(no_mangle)]
pub unsafe extern "C" fn nesdaw_note_on(
    engine: *mut NesdawEngine,
    channel: u8,
    pitch: u8,
    velocity: u8,
    instrument_id: *const c_char,
) -> u32 {
    if engine.is_null() {
        return VoiceId::SENTINEL;
    }
    let Some(channel) = Channel::from_index(channel) else {
        return VoiceId::SENTINEL;
    };
    let id = if instrument_id.is_null() {
        None
    } else {
        Some(unsafe { str_or(instrument_id, "") })
    };
    let voice = unsafe { (*engine).sequencer.note_on(channel, pitch, velocity, id) };
    VoiceId::raw_or_sentinel(voice)
}

/// Release a voice. Unknown or zero ids are ignored.
///
/// # Safety
/// `engine` must be a valid pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn nesdaw_note_off(engine: *mut NesdawEngine, voice: u32) {
    if engine.is_null() {
        return;
    }
    if let Some(voice) = VoiceId::from_raw(voice) {
        unsafe { (*engine).sequencer.note_off(voice) };
    }
}

/// # Safety
/// `engine` must be a valid pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn nesdaw_stop_all_voices(engine: *mut NesdawEngine) {
    if engine.is_null() {
        return;
    }
    unsafe { (*engine).sequencer.stop_all_voices() };
}

// ═══════════════════════════════════════════════════════════════════════════
// Mixer
// ═══════════════════════════════════════════════════════════════════════════

/// # Safety
/// `engine` must be a valid pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn nesdaw_set_master_volume(engine: *mut NesdawEngine, level: f32) {
    if engine.is_null() {
        return;
    }
    unsafe { (*engine).sequencer.set_master_volume(level) };
}

/// # Safety
/// `engine` must be a valid pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn nesdaw_set_muted(engine: *mut NesdawEngine, muted: bool) {
    if engine.is_null() {
        return;
    }
    unsafe { (*engine).sequencer.set_muted(muted) };
}

/// # Safety
/// `engine` must be a valid pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn nesdaw_set_channel_volume(
    engine: *mut NesdawEngine,
    channel: u8,
    level: f32,
) {
    if engine.is_null() {
        return;
    }
    if let Some(channel) = Channel::from_index(channel) {
        unsafe { (*engine).sequencer.set_channel_volume(channel, level) };
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Helpers
// ═══════════════════════════════════════════════════════════════════════════

/// # Safety
/// `ptr` must be NULL or a valid null-terminated string that outlives `'a`.
unsafe fn str_or<'a>(ptr: *const c_char, fallback: &'a str) -> &'a str {
    if ptr.is_null() {
        return fallback;
    }
    unsafe { CStr::from_ptr(ptr).to_str().unwrap_or(fallback) }
}
