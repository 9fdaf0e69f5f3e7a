// src/state/mod.rs
//
// Declarative song state owned by the UI.
//
// The core never mutates these structures. It reads them when a playback
// session starts and when track levels change.

mod song;

pub use song::*;
