// src/note_source.rs
//
// Note Source: the per-session, time-ordered note snapshot.
//
// A snapshot is built once when play or record starts and is never mutated
// while the session runs. Edits made during playback show up at the next
// start.

use std::sync::Arc;

use crate::channel::Channel;
use crate::frequency::clamp_midi;
use crate::state::Song;

/// A note ready for scheduling.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScheduledNote {
    pub channel: Channel,
    pub pitch: u8,
    pub velocity: u8,
    pub start_tick: u32,
    pub duration_ticks: u32,
    pub instrument_id: Arc<str>,
}

impl ScheduledNote {
    pub fn new(
        channel: Channel,
        pitch: u8,
        velocity: u8,
        start_tick: u32,
        duration_ticks: u32,
        instrument_id: &str,
    ) -> Self {
        Self {
            channel,
            pitch: clamp_midi(pitch),
            velocity: clamp_midi(velocity),
            start_tick,
            duration_ticks,
            instrument_id: Arc::from(instrument_id),
        }
    }

    #[inline]
    fn sort_key(&self) -> (u32, Channel, u8) {
        (self.start_tick, self.channel, self.pitch)
    }
}

/// Immutable, ordered set of notes keyed by (start tick, channel, pitch).
///
/// Notes with identical keys are all kept, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteSnapshot {
    notes: Vec<ScheduledNote>,
}

impl NoteSnapshot {
    pub fn new(notes: impl IntoIterator<Item = ScheduledNote>) -> Self {
        let mut notes: Vec<ScheduledNote> = notes
            .into_iter()
            .map(|mut n| {
                n.pitch = clamp_midi(n.pitch);
                n.velocity = clamp_midi(n.velocity);
                n
            })
            .collect();
        notes.sort_by_key(ScheduledNote::sort_key);
        Self { notes }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Flatten the active pattern of every audible track.
    pub fn from_song(song: &Song) -> Self {
        let notes = song
            .tracks
            .iter()
            .enumerate()
            .filter(|(index, _)| song.is_track_audible(*index))
            .filter_map(|(_, track)| track.active_pattern().map(|p| (track, p)))
            .flat_map(|(track, pattern)| {
                pattern.notes.iter().map(move |note| ScheduledNote {
                    channel: track.channel,
                    pitch: note.pitch,
                    velocity: note.velocity,
                    start_tick: note.start_tick,
                    duration_ticks: note.duration_ticks,
                    instrument_id: track.instrument_id.clone(),
                })
            });
        Self::new(notes)
    }

    /// Notes starting exactly at `tick`.
    pub fn notes_at(&self, tick: u32) -> &[ScheduledNote] {
        let lo = self.notes.partition_point(|n| n.start_tick < tick);
        let hi = self.notes.partition_point(|n| n.start_tick <= tick);
        &self.notes[lo..hi]
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScheduledNote> {
        self.notes.iter()
    }

    /// Last tick touched by any note.
    pub fn end_tick(&self) -> u32 {
        self.notes
            .iter()
            .map(|n| n.start_tick.saturating_add(n.duration_ticks))
            .max()
            .unwrap_or(0)
    }
}

impl FromIterator<ScheduledNote> for NoteSnapshot {
    fn from_iter<I: IntoIterator<Item = ScheduledNote>>(iter: I) -> Self {
        Self::new(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Note;

    fn note(channel: Channel, pitch: u8, start: u32) -> ScheduledNote {
        ScheduledNote::new(channel, pitch, 100, start, 24, "mm-lead")
    }

    #[test]
    fn test_ordering() {
        let snapshot = NoteSnapshot::new([
            note(Channel::Noise, 40, 96),
            note(Channel::PulseB, 62, 0),
            note(Channel::PulseA, 64, 0),
            note(Channel::PulseA, 60, 0),
        ]);

        let keys: Vec<_> = snapshot
            .iter()
            .map(|n| (n.start_tick, n.channel, n.pitch))
            .collect();
        assert_eq!(
            keys,
            vec![
                (0, Channel::PulseA, 60),
                (0, Channel::PulseA, 64),
                (0, Channel::PulseB, 62),
                (96, Channel::Noise, 40),
            ]
        );
    }

    #[test]
    fn test_notes_at_tick() {
        let snapshot = NoteSnapshot::new([
            note(Channel::PulseA, 60, 0),
            note(Channel::PulseA, 60, 0),
            note(Channel::Triangle, 36, 48),
        ]);
        assert_eq!(snapshot.notes_at(0).len(), 2);
        assert_eq!(snapshot.notes_at(48).len(), 1);
        assert!(snapshot.notes_at(47).is_empty());
        assert!(snapshot.notes_at(1000).is_empty());
    }

    #[test]
    fn test_out_of_range_pitch_clamps() {
        let mut raw = note(Channel::PulseA, 60, 0);
        raw.pitch = 200;
        let snapshot = NoteSnapshot::new([raw]);
        assert_eq!(snapshot.iter().next().map(|n| n.pitch), Some(127));
    }

    #[test]
    fn test_from_song_honours_mute_and_solo() {
        let mut song = Song::default();
        for track in &mut song.tracks {
            if let Some(p) = track.active_pattern_mut() {
                p.notes.push(Note::new(60, 100, 0, 96));
            }
        }
        assert_eq!(NoteSnapshot::from_song(&song).len(), 4);

        song.tracks[3].muted = true;
        assert_eq!(NoteSnapshot::from_song(&song).len(), 3);

        song.tracks[1].solo = true;
        let snapshot = NoteSnapshot::from_song(&song);
        assert_eq!(snapshot.len(), 1);
        let only = snapshot.iter().next().unwrap();
        assert_eq!(only.channel, Channel::PulseB);
        assert_eq!(&*only.instrument_id, "mm-echo");
    }

    #[test]
    fn test_end_tick() {
        let snapshot = NoteSnapshot::new([note(Channel::PulseA, 60, 100)]);
        assert_eq!(snapshot.end_tick(), 124);
        assert_eq!(NoteSnapshot::empty().end_tick(), 0);
    }
}
