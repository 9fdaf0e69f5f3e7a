// src/waveform.rs
//
// Band-limited pulse waves from closed-form Fourier coefficients.
//
// A pulse of duty d has sine-term amplitude (2 / (n*pi)) * sin(n*pi*d) at
// harmonic n and no cosine or DC terms. Tables are built once per engine and
// handed to the host as periodic-wave coefficients.

use std::f64::consts::PI;

/// Number of coefficient slots per table (index 0 is DC).
pub const HARMONICS: usize = 256;

/// The four duty cycles of the pulse channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DutyCycle {
    /// 12.5%
    Eighth,
    /// 25%
    Quarter,
    /// 50%
    #[default]
    Half,
    /// 75%
    ThreeQuarters,
}

impl DutyCycle {
    pub const ALL: [DutyCycle; 4] = [
        DutyCycle::Eighth,
        DutyCycle::Quarter,
        DutyCycle::Half,
        DutyCycle::ThreeQuarters,
    ];

    #[inline]
    pub fn fraction(self) -> f64 {
        match self {
            DutyCycle::Eighth => 0.125,
            DutyCycle::Quarter => 0.25,
            DutyCycle::Half => 0.5,
            DutyCycle::ThreeQuarters => 0.75,
        }
    }

    #[inline]
    pub fn index(self) -> usize {
        match self {
            DutyCycle::Eighth => 0,
            DutyCycle::Quarter => 1,
            DutyCycle::Half => 2,
            DutyCycle::ThreeQuarters => 3,
        }
    }

    /// Match a fraction to the nearest supported duty cycle.
    pub fn from_fraction(fraction: f64) -> Self {
        Self::ALL
            .into_iter()
            .min_by(|a, b| {
                let da = (a.fraction() - fraction).abs();
                let db = (b.fraction() - fraction).abs();
                da.total_cmp(&db)
            })
            .unwrap_or(DutyCycle::Half)
    }
}

/// Fourier coefficients of one period (cosine terms in `real`, sine terms in `imag`).
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodicWave {
    real: Vec<f32>,
    imag: Vec<f32>,
}

impl PeriodicWave {
    /// Build the pulse wave for a duty cycle.
    pub fn pulse(duty: DutyCycle) -> Self {
        let d = duty.fraction();
        let real = vec![0.0; HARMONICS];
        let mut imag = vec![0.0; HARMONICS];

        for (n, slot) in imag.iter_mut().enumerate().skip(1) {
            let n = n as f64;
            *slot = ((2.0 / (n * PI)) * (n * PI * d).sin()) as f32;
        }

        Self { real, imag }
    }

    #[inline]
    pub fn real(&self) -> &[f32] {
        &self.real
    }

    #[inline]
    pub fn imag(&self) -> &[f32] {
        &self.imag
    }

    /// Sine-term amplitude at harmonic `n` (0 outside the table).
    #[inline]
    pub fn harmonic(&self, n: usize) -> f32 {
        self.imag.get(n).copied().unwrap_or(0.0)
    }
}

/// The cached set of pulse waves, one per duty cycle.
#[derive(Debug, Clone)]
pub struct PulseWaveSet {
    waves: [PeriodicWave; 4],
}

impl PulseWaveSet {
    pub fn new() -> Self {
        Self {
            waves: DutyCycle::ALL.map(PeriodicWave::pulse),
        }
    }

    #[inline]
    pub fn get(&self, duty: DutyCycle) -> &PeriodicWave {
        &self.waves[duty.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (DutyCycle, &PeriodicWave)> {
        DutyCycle::ALL.into_iter().zip(self.waves.iter())
    }
}

impl Default for PulseWaveSet {
    fn default() -> Self {
        Self::new()
    }
}
