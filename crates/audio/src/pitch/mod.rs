//! Pitch detection. Bowed and sung instruments go through a single-pitch
//! tracker on the waveform; keyboards go through spectral peak picking.

mod mono;
mod poly;

use std::fmt;
use std::str::FromStr;

use encore_domain::DetectedNote;
use serde::{Deserialize, Serialize};

pub use mono::{MonoPitch, MonoPitchDetector};
pub use poly::PolyPitchDetector;

/// One analysis hop: the raw waveform window plus its magnitude spectrum.
#[derive(Debug, Clone, Copy)]
pub struct AnalysisFrame<'a> {
    pub samples: &'a [f32],
    pub spectrum: &'a [f32],
    pub timestamp: f64,
}

pub trait PitchDetector: Send {
    fn detect(&mut self, frame: &AnalysisFrame<'_>) -> Vec<DetectedNote>;

    fn is_polyphonic(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct PitchConfig {
    pub min_clarity: f32,
    pub min_frequency: f32,
    pub max_frequency: f32,
    /// Peaks weaker than this share of the strongest peak are dropped.
    pub min_peak_ratio: f32,
    pub max_peaks: usize,
}

impl Default for PitchConfig {
    fn default() -> Self {
        Self {
            min_clarity: 0.9,
            min_frequency: 20.0,
            max_frequency: 5000.0,
            min_peak_ratio: 0.3,
            max_peaks: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Instrument {
    Cello,
    Piano,
}

impl Instrument {
    pub fn is_polyphonic(&self) -> bool {
        matches!(self, Instrument::Piano)
    }

    /// Analysis window in samples. The piano needs a longer window to
    /// separate neighbouring bass partials.
    pub fn frame_size(&self) -> usize {
        match self {
            Instrument::Cello => 4096,
            Instrument::Piano => 8192,
        }
    }

    pub fn detector(
        &self,
        sample_rate: f32,
        fft_size: usize,
        config: &PitchConfig,
    ) -> Box<dyn PitchDetector> {
        match self {
            Instrument::Cello => Box::new(MonoPitchDetector::new(sample_rate, config)),
            Instrument::Piano => Box::new(PolyPitchDetector::new(sample_rate, fft_size, config)),
        }
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instrument::Cello => f.write_str("cello"),
            Instrument::Piano => f.write_str("piano"),
        }
    }
}

impl FromStr for Instrument {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cello" => Ok(Instrument::Cello),
            "piano" => Ok(Instrument::Piano),
            other => Err(format!("unknown instrument `{other}`")),
        }
    }
}

/// Vertex offset of the parabola through three neighbouring values, in
/// `(-0.5, 0.5)` when the middle one is a strict peak.
pub(crate) fn parabolic_offset(left: f32, center: f32, right: f32) -> f32 {
    let denom = left - 2.0 * center + right;
    if denom.abs() < f32::EPSILON {
        return 0.0;
    }
    (0.5 * (left - right) / denom).clamp(-0.5, 0.5)
}
