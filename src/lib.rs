// src/lib.rs
//
// Library entry point for Rust, FFI (iOS/Swift) and wasm consumers.

pub mod channel;
pub mod config;
pub mod driver;
pub mod envelope;
pub mod error;
pub mod frequency;
pub mod host;
pub mod instrument;
pub mod note_source;
pub mod offline;
pub mod readback;
pub mod scheduler;
pub mod sequencer;
pub mod state;
pub mod transport;
pub mod voice;
pub mod voice_engine;
pub mod waveform;

#[cfg(feature = "ios")]
pub mod ffi;

#[cfg(feature = "web")]
pub mod wasm;

// Re-export key types for Rust consumers
pub use channel::{Channel, PulseChannel};
pub use config::EngineConfig;
pub use driver::{Driver, Pump};
pub use envelope::Envelope;
pub use error::{EngineError, HostError};
pub use host::{AudioClock, AudioHost, SharedClock};
pub use instrument::{Instrument, InstrumentBank, NoiseMode};
pub use note_source::{NoteSnapshot, ScheduledNote};
pub use offline::OfflineHost;
pub use readback::{Readback, SharedReadback};
pub use scheduler::{Scheduler, SchedulerEvent};
pub use sequencer::Sequencer;
pub use state::{Note, Pattern, Song, Track};
pub use transport::{LoopRegion, Tempo, TransportState};
pub use voice::VoiceId;
pub use voice_engine::VoiceEngine;
pub use waveform::{DutyCycle, PeriodicWave, PulseWaveSet};
