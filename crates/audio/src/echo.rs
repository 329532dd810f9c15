//! Normalized LMS echo cancellation for a known playback reference.

use crate::error::AudioError;

pub const DEFAULT_FILTER_LENGTH: usize = 512;
pub const DEFAULT_STEP_SIZE: f32 = 0.01;

const POWER_EPSILON: f32 = 1e-10;

#[derive(Debug, Clone)]
pub struct EchoCanceller {
    weights: Vec<f32>,
    history: Vec<f32>,
    newest: usize,
    power: f32,
    step_size: f32,
}

impl Default for EchoCanceller {
    fn default() -> Self {
        Self {
            weights: vec![0.0; DEFAULT_FILTER_LENGTH],
            history: vec![0.0; DEFAULT_FILTER_LENGTH],
            newest: DEFAULT_FILTER_LENGTH - 1,
            power: 0.0,
            step_size: DEFAULT_STEP_SIZE,
        }
    }
}

impl EchoCanceller {
    pub fn new(filter_length: usize, step_size: f32) -> Result<Self, AudioError> {
        if filter_length == 0 {
            return Err(AudioError::config("echo filter length must be positive"));
        }
        if !(step_size > 0.0 && step_size <= 2.0) {
            return Err(AudioError::config(format!(
                "echo step size must be in (0, 2], got {step_size}"
            )));
        }
        Ok(Self {
            weights: vec![0.0; filter_length],
            history: vec![0.0; filter_length],
            newest: filter_length - 1,
            power: 0.0,
            step_size,
        })
    }

    pub fn filter_length(&self) -> usize {
        self.weights.len()
    }

    /// Returns the microphone sample with the estimated echo removed.
    pub fn process_sample(&mut self, mic: f32, reference: f32) -> f32 {
        let len = self.history.len();
        self.newest = (self.newest + 1) % len;
        let evicted = std::mem::replace(&mut self.history[self.newest], reference);
        if self.newest == 0 {
            // Resync the running sum once per wrap to keep rounding from drifting.
            self.power = self.history.iter().map(|x| x * x).sum();
        } else {
            self.power = (self.power + reference * reference - evicted * evicted).max(0.0);
        }

        let estimate: f32 = self
            .weights
            .iter()
            .enumerate()
            .map(|(tap, w)| w * self.tap(tap))
            .sum();
        let error = mic - estimate;

        if self.power > POWER_EPSILON {
            let rate = self.step_size * error / (self.power + POWER_EPSILON);
            for tap in 0..len {
                let x = self.tap(tap);
                self.weights[tap] += rate * x;
            }
        }
        error
    }

    pub fn process_buffer(&mut self, mic: &[f32], reference: &[f32], out: &mut Vec<f32>) {
        out.clear();
        out.extend(
            mic.iter()
                .enumerate()
                .map(|(i, m)| self.process_sample(*m, reference.get(i).copied().unwrap_or(0.0))),
        );
    }

    pub fn reset(&mut self) {
        self.weights.iter_mut().for_each(|w| *w = 0.0);
        self.history.iter_mut().for_each(|x| *x = 0.0);
        self.newest = self.history.len() - 1;
        self.power = 0.0;
    }

    /// Reference sample `delay` steps in the past.
    fn tap(&self, delay: usize) -> f32 {
        let len = self.history.len();
        self.history[(self.newest + len - delay) % len]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::rms;

    fn noise(len: usize) -> Vec<f32> {
        let mut state: u32 = 0x1234_5678;
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                (state as f32 / u32::MAX as f32) * 2.0 - 1.0
            })
            .collect()
    }

    #[test]
    fn converges_on_delayed_echo() {
        let reference = noise(8_000);
        let mic: Vec<f32> = (0..reference.len())
            .map(|i| if i >= 5 { 0.6 * reference[i - 5] } else { 0.0 })
            .collect();
        let mut canceller = EchoCanceller::new(32, 0.5).unwrap();
        let mut residual = Vec::new();
        canceller.process_buffer(&mic, &reference, &mut residual);

        let before = rms(&mic[7_000..]);
        let after = rms(&residual[7_000..]);
        assert!(after < before * 0.05, "residual {after} vs echo {before}");
    }

    #[test]
    fn silent_reference_passes_mic_through() {
        let mut canceller = EchoCanceller::new(16, 0.1).unwrap();
        let out = canceller.process_sample(0.25, 0.0);
        assert_eq!(out, 0.25);
    }

    #[test]
    fn rejects_bad_parameters() {
        assert!(EchoCanceller::new(0, 0.1).is_err());
        assert!(EchoCanceller::new(16, 0.0).is_err());
        assert_eq!(EchoCanceller::default().filter_length(), DEFAULT_FILTER_LENGTH);
    }
}
