//! Spectral noise suppression and automatic gain control.

use crate::dsp::rms;

pub const DEFAULT_SUBTRACTION_FACTOR: f32 = 1.5;
pub const DEFAULT_GATE_THRESHOLD: f32 = 0.01;

/// Learns a noise floor from frames captured while nobody plays and subtracts
/// it from later spectra.
#[derive(Debug, Clone)]
pub struct NoiseFilter {
    floor: Option<Vec<f32>>,
    frames: usize,
    subtraction_factor: f32,
    gate_threshold: f32,
}

impl Default for NoiseFilter {
    fn default() -> Self {
        Self::new(DEFAULT_SUBTRACTION_FACTOR, DEFAULT_GATE_THRESHOLD)
    }
}

impl NoiseFilter {
    pub fn new(subtraction_factor: f32, gate_threshold: f32) -> Self {
        Self {
            floor: None,
            frames: 0,
            subtraction_factor,
            gate_threshold,
        }
    }

    /// Replaces any previous floor with this single spectrum.
    pub fn calibrate(&mut self, spectrum: &[f32]) {
        self.reset();
        self.observe_noise(spectrum);
    }

    /// Folds one more noise spectrum into the running average floor.
    pub fn observe_noise(&mut self, spectrum: &[f32]) {
        self.frames += 1;
        let weight = 1.0 / self.frames as f32;
        match &mut self.floor {
            Some(floor) if floor.len() == spectrum.len() => {
                for (avg, value) in floor.iter_mut().zip(spectrum) {
                    *avg += (value - *avg) * weight;
                }
            }
            _ => {
                self.frames = 1;
                self.floor = Some(spectrum.to_vec());
            }
        }
    }

    pub fn is_calibrated(&self) -> bool {
        self.floor.is_some()
    }

    pub fn calibration_frames(&self) -> usize {
        self.frames
    }

    /// Subtracts the scaled floor, clamping at zero. Uncalibrated filters and
    /// spectra of a different length pass through untouched.
    pub fn apply(&self, spectrum: &mut [f32]) {
        let Some(floor) = &self.floor else {
            return;
        };
        if floor.len() != spectrum.len() {
            return;
        }
        for (value, noise) in spectrum.iter_mut().zip(floor) {
            *value = (*value - noise * self.subtraction_factor).max(0.0);
        }
    }

    pub fn passes_gate(&self, level: f32) -> bool {
        level >= self.gate_threshold
    }

    pub fn set_gate_threshold(&mut self, threshold: f32) {
        self.gate_threshold = threshold.max(0.0);
    }

    pub fn gate_threshold(&self) -> f32 {
        self.gate_threshold
    }

    pub fn reset(&mut self) {
        self.floor = None;
        self.frames = 0;
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AutoGain {
    pub target_rms: f32,
    pub max_gain: f32,
    pub silence_rms: f32,
}

impl Default for AutoGain {
    fn default() -> Self {
        Self {
            target_rms: 0.1,
            max_gain: 5.0,
            silence_rms: 0.001,
        }
    }
}

impl AutoGain {
    /// Scales the buffer toward the target level and returns the gain used.
    /// Near-silent buffers are left alone so the noise is not amplified.
    pub fn apply(&self, buffer: &mut [f32]) -> f32 {
        let level = rms(buffer);
        if level < self.silence_rms {
            return 1.0;
        }
        let gain = (self.target_rms / level).min(self.max_gain);
        for sample in buffer.iter_mut() {
            *sample = (*sample * gain).clamp(-1.0, 1.0);
        }
        gain
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn subtracts_scaled_floor() {
        let mut filter = NoiseFilter::default();
        filter.calibrate(&[0.1, 0.2, 0.0]);
        let mut spectrum = [0.5, 0.2, 0.3];
        filter.apply(&mut spectrum);
        assert_abs_diff_eq!(spectrum[0], 0.35, epsilon = 1e-6);
        assert_eq!(spectrum[1], 0.0);
        assert_abs_diff_eq!(spectrum[2], 0.3);
    }

    #[test]
    fn floor_is_running_average() {
        let mut filter = NoiseFilter::default();
        filter.observe_noise(&[0.2]);
        filter.observe_noise(&[0.4]);
        assert_eq!(filter.calibration_frames(), 2);
        let mut spectrum = [1.0];
        filter.apply(&mut spectrum);
        assert_abs_diff_eq!(spectrum[0], 1.0 - 0.3 * 1.5, epsilon = 1e-6);
    }

    #[test]
    fn uncalibrated_passes_through() {
        let filter = NoiseFilter::default();
        let mut spectrum = [0.5, 0.1];
        filter.apply(&mut spectrum);
        assert_eq!(spectrum, [0.5, 0.1]);
        assert!(!filter.passes_gate(0.005));
        assert!(filter.passes_gate(0.02));
    }

    #[test]
    fn agc_boosts_quiet_input_up_to_cap() {
        let agc = AutoGain::default();
        let mut quiet = vec![0.01, -0.01, 0.01, -0.01];
        let gain = agc.apply(&mut quiet);
        assert_abs_diff_eq!(gain, 5.0);
        assert_abs_diff_eq!(quiet[0], 0.05, epsilon = 1e-6);

        let mut silent = vec![0.0005; 4];
        assert_eq!(agc.apply(&mut silent), 1.0);
        assert_eq!(silent[0], 0.0005);
    }

    #[test]
    fn agc_clamps_to_unit_range() {
        let agc = AutoGain {
            target_rms: 2.0,
            ..AutoGain::default()
        };
        let mut loud = vec![0.9, -0.9];
        agc.apply(&mut loud);
        assert_eq!(loud, vec![1.0, -1.0]);
    }
}
