use serde::{Deserialize, Serialize};

use crate::dsp::rms;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OnsetEvent {
    pub timestamp: f64,
    pub strength: f32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct OnsetConfig {
    /// Normalized flux above which a frame counts as an attack.
    pub flux_threshold: f32,
    /// Spectra with less total magnitude than this never trigger.
    pub energy_floor: f32,
    /// RMS jump used when no spectrum is available.
    pub energy_rise: f32,
    pub cooldown_seconds: f64,
}

impl Default for OnsetConfig {
    fn default() -> Self {
        Self {
            flux_threshold: 0.3,
            energy_floor: 0.01,
            energy_rise: 0.05,
            cooldown_seconds: 0.05,
        }
    }
}

/// Spectral-flux onset detector with a fallback on raw energy rise.
#[derive(Debug, Clone, Default)]
pub struct OnsetDetector {
    config: OnsetConfig,
    previous_spectrum: Option<Vec<f32>>,
    previous_rms: f32,
    last_onset: Option<f64>,
}

impl OnsetDetector {
    pub fn new(config: OnsetConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Compares against the previous spectrum. The stream is taken to start
    /// from silence, so a note sounding in the very first frame fires.
    pub fn detect(&mut self, spectrum: &[f32], timestamp: f64) -> Option<OnsetEvent> {
        let mut previous = match self.previous_spectrum.take() {
            Some(previous) if previous.len() == spectrum.len() => previous,
            _ => vec![0.0; spectrum.len()],
        };

        let total: f32 = spectrum.iter().sum();
        let rise: f32 = spectrum
            .iter()
            .zip(&previous)
            .map(|(now, before)| (now - before).max(0.0))
            .sum();
        previous.copy_from_slice(spectrum);
        self.previous_spectrum = Some(previous);

        if total < self.config.energy_floor {
            return None;
        }
        let flux = rise / total;
        if flux > self.config.flux_threshold {
            self.fire(timestamp, flux)
        } else {
            None
        }
    }

    pub fn detect_from_energy(&mut self, buffer: &[f32], timestamp: f64) -> Option<OnsetEvent> {
        let level = rms(buffer);
        let rise = level - self.previous_rms;
        self.previous_rms = level;
        if rise > self.config.energy_rise {
            self.fire(timestamp, rise)
        } else {
            None
        }
    }

    pub fn reset(&mut self) {
        self.previous_spectrum = None;
        self.previous_rms = 0.0;
        self.last_onset = None;
    }

    fn fire(&mut self, timestamp: f64, strength: f32) -> Option<OnsetEvent> {
        if let Some(last) = self.last_onset {
            if timestamp - last < self.config.cooldown_seconds {
                return None;
            }
        }
        self.last_onset = Some(timestamp);
        Some(OnsetEvent {
            timestamp,
            strength,
        })
    }
}
