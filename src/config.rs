// src/config.rs

use std::time::Duration;

pub const DEFAULT_SAMPLE_RATE: f64 = 48_000.0;
pub const DEFAULT_LOOK_AHEAD: f64 = 0.1;
pub const DEFAULT_DRIVER_INTERVAL: Duration = Duration::from_millis(25);
pub const DEFAULT_NOISE_SECONDS: f64 = 2.0;
pub const DEFAULT_MASTER_VOLUME: f32 = 0.5;

/// Session-wide engine configuration.
///
/// The look-ahead window must stay well above the driver interval so a late
/// driver tick still finds its notes already committed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    /// Sample rate in Hz, used by hosts created from this config.
    pub sample_rate: f64,

    /// How far ahead of the audio clock the scheduler commits ticks (seconds).
    pub look_ahead: f64,

    /// Period of the cooperative driver.
    pub driver_interval: Duration,

    /// Length of the shared looping noise buffer (seconds).
    pub noise_seconds: f64,

    /// Master volume applied at initialization.
    pub master_volume: f32,

    /// Seed for the noise buffer; `None` draws from the thread-local RNG.
    pub noise_seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            look_ahead: DEFAULT_LOOK_AHEAD,
            driver_interval: DEFAULT_DRIVER_INTERVAL,
            noise_seconds: DEFAULT_NOISE_SECONDS,
            master_volume: DEFAULT_MASTER_VOLUME,
            noise_seed: None,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sample_rate(mut self, sample_rate: f64) -> Self {
        self.sample_rate = sample_rate.max(1.0);
        self
    }

    pub fn with_look_ahead(mut self, seconds: f64) -> Self {
        self.look_ahead = seconds.max(0.0);
        self
    }

    pub fn with_driver_interval(mut self, interval: Duration) -> Self {
        self.driver_interval = interval;
        self
    }

    pub fn with_noise_seconds(mut self, seconds: f64) -> Self {
        self.noise_seconds = seconds.max(0.0);
        self
    }

    pub fn with_master_volume(mut self, volume: f32) -> Self {
        self.master_volume = volume.clamp(0.0, 1.0);
        self
    }

    pub fn with_noise_seed(mut self, seed: u64) -> Self {
        self.noise_seed = Some(seed);
        self
    }
}
