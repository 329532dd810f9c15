use std::sync::Arc;

use realfft::num_complex::Complex;
use realfft::{RealFftPlanner, RealToComplex};

use crate::error::AudioError;

pub fn rms(buffer: &[f32]) -> f32 {
    if buffer.is_empty() {
        return 0.0;
    }
    let energy: f32 = buffer.iter().map(|s| s * s).sum();
    (energy / buffer.len() as f32).sqrt()
}

pub fn hann_window(size: usize) -> Vec<f32> {
    if size < 2 {
        return vec![1.0; size];
    }
    let denom = (size - 1) as f32;
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / denom).cos()))
        .collect()
}

/// Averages interleaved frames into a mono buffer.
pub fn downmix(interleaved: &[f32], channels: usize, out: &mut Vec<f32>) {
    out.clear();
    let channels = channels.max(1);
    out.extend(
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32),
    );
}

/// Hann-windowed magnitude spectrum of fixed size, with buffers allocated
/// once up front. Magnitudes are scaled by `2 / size`.
pub struct SpectrumAnalyzer {
    fft: Arc<dyn RealToComplex<f32>>,
    window: Vec<f32>,
    input: Vec<f32>,
    output: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    magnitude: Vec<f32>,
}

impl SpectrumAnalyzer {
    pub fn new(size: usize) -> Result<Self, AudioError> {
        if size < 2 || size % 2 != 0 {
            return Err(AudioError::config(format!(
                "fft size must be even and at least 2, got {size}"
            )));
        }
        let fft = RealFftPlanner::<f32>::new().plan_fft_forward(size);
        let input = fft.make_input_vec();
        let output = fft.make_output_vec();
        let scratch = fft.make_scratch_vec();
        Ok(Self {
            window: hann_window(size),
            magnitude: vec![0.0; output.len()],
            fft,
            input,
            output,
            scratch,
        })
    }

    pub fn size(&self) -> usize {
        self.window.len()
    }

    pub fn bins(&self) -> usize {
        self.magnitude.len()
    }

    pub fn bin_width(&self, sample_rate: f32) -> f32 {
        sample_rate / self.size() as f32
    }

    /// Spectrum of the most recent `size` samples of `frame`; shorter frames
    /// are zero-padded at the end.
    pub fn magnitude(&mut self, frame: &[f32]) -> Result<&[f32], AudioError> {
        let size = self.size();
        let recent = &frame[frame.len().saturating_sub(size)..];
        for (i, slot) in self.input.iter_mut().enumerate() {
            *slot = recent.get(i).copied().unwrap_or(0.0) * self.window[i];
        }
        self.fft
            .process_with_scratch(&mut self.input, &mut self.output, &mut self.scratch)?;
        let scale = 2.0 / size as f32;
        for (mag, bin) in self.magnitude.iter_mut().zip(&self.output) {
            *mag = bin.norm() * scale;
        }
        Ok(&self.magnitude)
    }
}
