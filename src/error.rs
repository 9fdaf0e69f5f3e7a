// src/error.rs
//
// Error types for the host boundary and engine initialization.
//
// Nothing in the per-note signal path returns these to callers: a failed
// node creation during playback is logged and retires the engine instead.

use thiserror::Error;

/// Failure reported by an [`AudioHost`](crate::host::AudioHost).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    /// The host refused to create a node of the given kind.
    #[error("audio host could not create a {kind} node")]
    NodeCreation { kind: &'static str },

    /// The host has reached its node budget.
    #[error("audio host node limit of {limit} reached")]
    NodeLimit { limit: usize },

    /// A handle passed to the host does not refer to a live object.
    #[error("audio host has no {kind} with id {id}")]
    UnknownHandle { kind: &'static str, id: u32 },
}

/// Failure to bring the voice engine into the ready state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Building the bus graph, wave tables or noise buffer failed.
    #[error("voice engine initialization failed: {0}")]
    Init(#[from] HostError),

    /// A previous initialization (or a fatal playback failure) left the
    /// engine permanently not-ready for this session.
    #[error("voice engine is unavailable for this session")]
    Unavailable,
}

pub type HostResult<T> = Result<T, HostError>;
