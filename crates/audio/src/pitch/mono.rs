use std::sync::Arc;

use encore_domain::DetectedNote;
use realfft::num_complex::Complex;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use tracing::warn;

use super::{parabolic_offset, AnalysisFrame, PitchConfig, PitchDetector};

/// Picks the first key maximum within this share of the highest one.
const KEY_MAXIMUM_RATIO: f32 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonoPitch {
    pub frequency: f32,
    pub clarity: f32,
}

struct Plan {
    len: usize,
    forward: Arc<dyn RealToComplex<f32>>,
    inverse: Arc<dyn ComplexToReal<f32>>,
    padded: Vec<f32>,
    spectrum: Vec<Complex<f32>>,
    acf: Vec<f32>,
}

/// McLeod pitch method: normalized square difference computed from an
/// FFT autocorrelation, then peak picking over key maxima.
pub struct MonoPitchDetector {
    sample_rate: f32,
    min_clarity: f32,
    min_frequency: f32,
    max_frequency: f32,
    plan: Option<Plan>,
    nsdf: Vec<f32>,
}

impl MonoPitchDetector {
    pub fn new(sample_rate: f32, config: &PitchConfig) -> Self {
        Self {
            sample_rate,
            min_clarity: config.min_clarity,
            min_frequency: config.min_frequency,
            max_frequency: config.max_frequency,
            plan: None,
            nsdf: Vec::new(),
        }
    }

    pub fn find_pitch(&mut self, samples: &[f32]) -> Option<MonoPitch> {
        let n = samples.len();
        if n < 8 {
            return None;
        }
        let energy: f32 = samples.iter().map(|x| x * x).sum();
        if energy <= f32::EPSILON {
            return None;
        }

        self.autocorrelate(samples)?;
        let max_lag = (n / 2).min((self.sample_rate / self.min_frequency) as usize + 2);
        self.normalize(samples, energy, max_lag);

        let lag = self.best_lag(max_lag)?;
        let offset = parabolic_offset(self.nsdf[lag - 1], self.nsdf[lag], self.nsdf[lag + 1]);
        let clarity = self.nsdf[lag]
            - 0.25 * (self.nsdf[lag - 1] - self.nsdf[lag + 1]) * offset;
        let frequency = self.sample_rate / (lag as f32 + offset);

        if clarity < self.min_clarity
            || !(self.min_frequency..=self.max_frequency).contains(&frequency)
        {
            return None;
        }
        Some(MonoPitch {
            frequency,
            clarity: clarity.min(1.0),
        })
    }

    fn autocorrelate(&mut self, samples: &[f32]) -> Option<()> {
        let len = (2 * samples.len()).next_power_of_two();
        if self.plan.as_ref().map(|p| p.len) != Some(len) {
            let mut planner = RealFftPlanner::<f32>::new();
            let forward = planner.plan_fft_forward(len);
            let inverse = planner.plan_fft_inverse(len);
            self.plan = Some(Plan {
                len,
                padded: forward.make_input_vec(),
                spectrum: forward.make_output_vec(),
                acf: inverse.make_output_vec(),
                forward,
                inverse,
            });
        }
        let plan = self.plan.as_mut()?;

        plan.padded.iter_mut().for_each(|x| *x = 0.0);
        plan.padded[..samples.len()].copy_from_slice(samples);
        if let Err(err) = plan.forward.process(&mut plan.padded, &mut plan.spectrum) {
            warn!(%err, "forward fft failed");
            return None;
        }
        for bin in plan.spectrum.iter_mut() {
            *bin = Complex::new(bin.norm_sqr(), 0.0);
        }
        if let Err(err) = plan.inverse.process(&mut plan.spectrum, &mut plan.acf) {
            warn!(%err, "inverse fft failed");
            return None;
        }
        let scale = 1.0 / len as f32;
        plan.acf.iter_mut().for_each(|x| *x *= scale);
        Some(())
    }

    fn normalize(&mut self, samples: &[f32], energy: f32, max_lag: usize) {
        let Some(plan) = &self.plan else {
            return;
        };
        let n = samples.len();
        self.nsdf.clear();
        let mut m = 2.0 * energy;
        for lag in 0..max_lag {
            self.nsdf
                .push(if m > 0.0 { 2.0 * plan.acf[lag] / m } else { 0.0 });
            m -= samples[lag] * samples[lag] + samples[n - 1 - lag] * samples[n - 1 - lag];
        }
    }

    /// First key maximum (highest point between positive zero crossings)
    /// that reaches the ratio of the overall best.
    fn best_lag(&self, max_lag: usize) -> Option<usize> {
        let nsdf = &self.nsdf;
        let end = max_lag.min(nsdf.len()).saturating_sub(1);
        let min_lag = ((self.sample_rate / self.max_frequency) as usize).max(1);

        let mut pos = 0;
        while pos < end && nsdf[pos] > 0.0 {
            pos += 1;
        }
        while pos < end && nsdf[pos] <= 0.0 {
            pos += 1;
        }
        pos = pos.max(1);

        let mut maxima = Vec::new();
        let mut current: Option<usize> = None;
        while pos < end {
            if nsdf[pos] > nsdf[pos - 1]
                && nsdf[pos] >= nsdf[pos + 1]
                && current.map_or(true, |c| nsdf[pos] > nsdf[c])
            {
                current = Some(pos);
            }
            pos += 1;
            if pos < end && nsdf[pos] <= 0.0 {
                if let Some(lag) = current.take() {
                    maxima.push(lag);
                }
                while pos < end && nsdf[pos] <= 0.0 {
                    pos += 1;
                }
            }
        }
        if let Some(lag) = current {
            maxima.push(lag);
        }

        maxima.retain(|lag| *lag >= min_lag);
        let highest = maxima.iter().map(|lag| nsdf[*lag]).fold(f32::MIN, f32::max);
        let threshold = KEY_MAXIMUM_RATIO * highest;
        maxima.into_iter().find(|lag| nsdf[*lag] >= threshold)
    }
}

impl PitchDetector for MonoPitchDetector {
    fn detect(&mut self, frame: &AnalysisFrame<'_>) -> Vec<DetectedNote> {
        self.find_pitch(frame.samples)
            .and_then(|pitch| {
                DetectedNote::from_frequency(pitch.frequency, pitch.clarity, frame.timestamp)
            })
            .into_iter()
            .collect()
    }
}
