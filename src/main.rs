// src/main.rs
//
// Sanity run: play a short song through the software host in real time.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use nesdaw::{
    Channel, Driver, EngineConfig, Note, OfflineHost, ScheduledNote, Sequencer, Song,
    TransportState,
};

const BLOCK_FRAMES: usize = 256;
const RUN_SECONDS: f64 = 2.0;

fn demo_song() -> Song {
    let mut song = Song::new("Sanity");
    song.bpm = 300.0;

    let melody = [60, 64, 67, 72];
    if let Some(track) = song.track_for_mut(Channel::PulseA) {
        if let Some(pattern) = track.active_pattern_mut() {
            pattern.length_ticks = 384;
            pattern.notes = melody
                .iter()
                .enumerate()
                .map(|(i, &pitch)| Note::new(pitch, 100, i as u32 * 96, 48))
                .collect();
        }
    }
    if let Some(track) = song.track_for_mut(Channel::Triangle) {
        if let Some(pattern) = track.active_pattern_mut() {
            pattern.length_ticks = 384;
            pattern.notes = vec![Note::new(36, 100, 0, 192), Note::new(43, 100, 192, 192)];
        }
    }
    if let Some(track) = song.track_for_mut(Channel::Noise) {
        if let Some(pattern) = track.active_pattern_mut() {
            pattern.length_ticks = 384;
            pattern.notes = (0..4).map(|i| Note::new(40, 90, i * 96, 12)).collect();
        }
    }
    // PulseB track is left empty

    song
}

fn main() {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .init();

    let config = EngineConfig::default();
    let mut sequencer = Sequencer::new(config);
    if let Err(e) = sequencer.init(OfflineHost::from_config(&config)) {
        log::error!("audio init failed: {}", e);
        return;
    }

    // --------------------------------
    // Observers
    // --------------------------------

    sequencer.on_note_scheduled(|note: &ScheduledNote, due, duration| {
        log::debug!(
            "{} pitch {} at {:.3}s for {:.3}s",
            note.channel,
            note.pitch,
            due,
            duration
        );
    });
    sequencer.on_transport_changed(|state: TransportState| {
        log::info!("transport: {}", state);
    });

    let song = demo_song();
    sequencer.set_loop(true, 0, 384);
    sequencer.play_song(&song);

    // --------------------------------
    // Driver + render loop
    // --------------------------------

    let sequencer = Arc::new(Mutex::new(sequencer));
    let driver = match Driver::spawn(Arc::clone(&sequencer), config.driver_interval) {
        Ok(driver) => driver,
        Err(e) => {
            log::error!("failed to spawn driver: {}", e);
            return;
        }
    };

    println!("Rendering {RUN_SECONDS}s at {} Hz…", config.sample_rate);

    let block_duration = Duration::from_secs_f64(BLOCK_FRAMES as f64 / config.sample_rate);
    let total_blocks = (RUN_SECONDS * config.sample_rate / BLOCK_FRAMES as f64) as usize;
    let mut block = vec![0.0_f32; BLOCK_FRAMES];
    let mut peak = 0.0_f32;
    let started = Instant::now();

    for index in 0..total_blocks {
        if let Ok(mut seq) = sequencer.lock() {
            seq.render(&mut block);
        }
        peak = block.iter().fold(peak, |acc, s| acc.max(s.abs()));

        // Keep the render loop at roughly real-time pace
        let target = block_duration * (index as u32 + 1);
        if let Some(wait) = target.checked_sub(started.elapsed()) {
            thread::sleep(wait);
        }
    }

    drop(driver);

    if let Ok(mut seq) = sequencer.lock() {
        println!(
            "Done: tick {}, {} notes scheduled, {} voices sounding, peak {:.3}",
            seq.current_tick(),
            seq.notes_scheduled(),
            seq.active_voice_count(),
            peak
        );
        seq.stop();
        seq.dispose();
    }
}
