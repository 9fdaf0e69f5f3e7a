// src/state/song.rs
//
// Song document.
//
// The UI edits this freely. The core only reads it when a playback session
// starts, flattening it into a `NoteSnapshot`.

use std::sync::Arc;

use crate::channel::Channel;
use crate::instrument::InstrumentBank;
use crate::transport::{DEFAULT_BPM, DEFAULT_RESOLUTION, DEFAULT_SONG_LENGTH};

/// A note placed in a pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Note {
    pub pitch: u8,
    pub velocity: u8,
    pub start_tick: u32,
    pub duration_ticks: u32,
}

impl Note {
    pub fn new(pitch: u8, velocity: u8, start_tick: u32, duration_ticks: u32) -> Self {
        Self {
            pitch,
            velocity,
            start_tick,
            duration_ticks,
        }
    }

    /// First tick after the note.
    #[inline]
    pub fn end_tick(&self) -> u32 {
        self.start_tick.saturating_add(self.duration_ticks)
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Pattern {
    pub name: String,
    pub length_ticks: u32,
    pub notes: Vec<Note>,
}

impl Pattern {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            length_ticks: DEFAULT_SONG_LENGTH,
            notes: Vec::new(),
        }
    }

    pub fn with_notes(mut self, notes: impl IntoIterator<Item = Note>) -> Self {
        self.notes.extend(notes);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Track {
    pub name: String,
    pub channel: Channel,
    pub instrument_id: Arc<str>,
    pub patterns: Vec<Pattern>,
    pub active_pattern_index: usize,

    /// Channel bus level, 0.0 to 1.0.
    pub volume: f32,

    pub muted: bool,
    pub solo: bool,
}

impl Track {
    pub fn new(name: impl Into<String>, channel: Channel, instrument_id: &str) -> Self {
        Self {
            name: name.into(),
            channel,
            instrument_id: Arc::from(instrument_id),
            patterns: vec![Pattern::new("Pattern 1")],
            active_pattern_index: 0,
            volume: 1.0,
            muted: false,
            solo: false,
        }
    }

    /// The pattern currently selected for playback, if the index is valid.
    pub fn active_pattern(&self) -> Option<&Pattern> {
        self.patterns.get(self.active_pattern_index)
    }

    pub fn active_pattern_mut(&mut self) -> Option<&mut Pattern> {
        self.patterns.get_mut(self.active_pattern_index)
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Song {
    pub name: String,
    pub bpm: f64,
    pub ppqn: u32,
    pub tracks: Vec<Track>,
}

impl Song {
    /// An empty song with one track per channel and its default preset.
    pub fn new(name: impl Into<String>) -> Self {
        let tracks = [
            ("Pulse 1", Channel::PulseA),
            ("Pulse 2", Channel::PulseB),
            ("Triangle", Channel::Triangle),
            ("Noise", Channel::Noise),
        ]
        .into_iter()
        .map(|(name, channel)| Track::new(name, channel, InstrumentBank::default_id(channel)))
        .collect();

        Self {
            name: name.into(),
            bpm: DEFAULT_BPM,
            ppqn: DEFAULT_RESOLUTION,
            tracks,
        }
    }

    pub fn any_solo(&self) -> bool {
        self.tracks.iter().any(|t| t.solo)
    }

    /// A muted track never sounds; while any track is soloed only soloed tracks do.
    pub fn is_track_audible(&self, index: usize) -> bool {
        let Some(track) = self.tracks.get(index) else {
            return false;
        };
        if track.muted {
            return false;
        }
        !self.any_solo() || track.solo
    }

    /// Playback length: the longest active pattern.
    pub fn length_ticks(&self) -> u32 {
        self.tracks
            .iter()
            .filter_map(Track::active_pattern)
            .map(|p| p.length_ticks)
            .max()
            .unwrap_or(DEFAULT_SONG_LENGTH)
    }

    pub fn track_for(&self, channel: Channel) -> Option<&Track> {
        self.tracks.iter().find(|t| t.channel == channel)
    }

    pub fn track_for_mut(&mut self, channel: Channel) -> Option<&mut Track> {
        self.tracks.iter_mut().find(|t| t.channel == channel)
    }
}

impl Default for Song {
    fn default() -> Self {
        Self::new("New Song")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_song_layout() {
        let song = Song::default();
        assert_eq!(song.tracks.len(), 4);
        assert_eq!(song.bpm, 150.0);
        assert_eq!(song.ppqn, 96);
        assert_eq!(&*song.tracks[0].instrument_id, "mm-lead");
        assert_eq!(&*song.tracks[3].instrument_id, "mm-kick");
        assert_eq!(song.length_ticks(), 1536);
    }

    #[test]
    fn test_mute_and_solo() {
        let mut song = Song::default();
        assert!(song.is_track_audible(0));

        song.tracks[0].muted = true;
        assert!(!song.is_track_audible(0));

        song.tracks[2].solo = true;
        assert!(!song.is_track_audible(1));
        assert!(song.is_track_audible(2));

        // a muted solo track stays silent
        song.tracks[2].muted = true;
        assert!(!song.is_track_audible(2));
        assert!(!song.is_track_audible(9));
    }

    #[test]
    fn test_length_follows_longest_pattern() {
        let mut song = Song::default();
        if let Some(p) = song.tracks[1].active_pattern_mut() {
            p.length_ticks = 3072;
        }
        assert_eq!(song.length_ticks(), 3072);
    }
}
