use encore_domain::notes::{cents_from_nearest, nearest_midi};
use encore_domain::DetectedNote;

use super::{parabolic_offset, AnalysisFrame, PitchConfig, PitchDetector};
use crate::chroma::{MAX_CHROMA_HZ, MIN_CHROMA_HZ};

const PIANO_LOWEST: u8 = 21;
const PIANO_HIGHEST: u8 = 108;
/// Bins searched on each side of a peak for the trough it must clear.
const PROMINENCE_SPAN: usize = 3;
/// A peak must be at least this many times the higher of its two troughs.
const MIN_PROMINENCE: f32 = 2.0;

/// Spectral peak picking for keyboard input. Each prominent local maximum
/// strong enough relative to the loudest peak becomes one note. Prominence
/// keeps ripple left behind by noise subtraction from passing as notes.
pub struct PolyPitchDetector {
    bin_width: f32,
    min_peak_ratio: f32,
    max_peaks: usize,
}

impl PolyPitchDetector {
    pub fn new(sample_rate: f32, fft_size: usize, config: &PitchConfig) -> Self {
        Self {
            bin_width: sample_rate / fft_size.max(1) as f32,
            min_peak_ratio: config.min_peak_ratio,
            max_peaks: config.max_peaks,
        }
    }

    pub fn find_notes(&self, spectrum: &[f32], timestamp: f64) -> Vec<DetectedNote> {
        if spectrum.len() < 3 {
            return Vec::new();
        }
        let first = ((MIN_CHROMA_HZ / self.bin_width).ceil() as usize).max(1);
        let last = ((MAX_CHROMA_HZ / self.bin_width) as usize).min(spectrum.len() - 2);

        let mut peaks: Vec<(usize, f32)> = (first..=last)
            .filter(|&bin| {
                spectrum[bin] > 0.0
                    && spectrum[bin] > spectrum[bin - 1]
                    && spectrum[bin] >= spectrum[bin + 1]
                    && is_prominent(spectrum, bin)
            })
            .map(|bin| (bin, spectrum[bin]))
            .collect();
        peaks.sort_by(|a, b| b.1.total_cmp(&a.1));
        peaks.truncate(self.max_peaks);

        let Some(&(_, loudest)) = peaks.first() else {
            return Vec::new();
        };

        let mut notes: Vec<DetectedNote> = Vec::with_capacity(peaks.len());
        for (bin, magnitude) in peaks {
            let confidence = magnitude / loudest;
            if confidence < self.min_peak_ratio {
                break;
            }
            let offset = parabolic_offset(spectrum[bin - 1], magnitude, spectrum[bin + 1]);
            let frequency = (bin as f32 + offset) * self.bin_width;
            let Some(midi) = nearest_midi(frequency) else {
                continue;
            };
            if !(PIANO_LOWEST..=PIANO_HIGHEST).contains(&midi)
                || notes.iter().any(|n| n.midi == midi)
            {
                continue;
            }
            notes.push(DetectedNote {
                midi,
                frequency,
                cents: cents_from_nearest(frequency),
                confidence,
                timestamp,
            });
        }
        notes.sort_by_key(|n| n.midi);
        notes
    }
}

fn is_prominent(spectrum: &[f32], bin: usize) -> bool {
    let left = spectrum[bin.saturating_sub(PROMINENCE_SPAN)..bin]
        .iter()
        .copied()
        .fold(f32::INFINITY, f32::min);
    let right = spectrum[bin + 1..(bin + 1 + PROMINENCE_SPAN).min(spectrum.len())]
        .iter()
        .copied()
        .fold(f32::INFINITY, f32::min);
    spectrum[bin] >= MIN_PROMINENCE * left.max(right)
}

impl PitchDetector for PolyPitchDetector {
    fn detect(&mut self, frame: &AnalysisFrame<'_>) -> Vec<DetectedNote> {
        self.find_notes(frame.spectrum, frame.timestamp)
    }

    fn is_polyphonic(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::tests::sine;
    use crate::dsp::SpectrumAnalyzer;
    use crate::noise::NoiseFilter;

    const RATE: f32 = 44_100.0;

    #[test]
    fn resolves_c_major_triad() {
        let len = 8192;
        let mut signal = vec![0.0; len];
        for (freq, amp) in [(261.63, 0.3), (329.63, 0.25), (392.0, 0.2)] {
            for (s, v) in signal.iter_mut().zip(sine(freq, RATE, len, amp)) {
                *s += v;
            }
        }
        let mut analyzer = SpectrumAnalyzer::new(len).unwrap();
        let detector = PolyPitchDetector::new(RATE, len, &PitchConfig::default());
        let notes = detector.find_notes(analyzer.magnitude(&signal).unwrap(), 0.25);
        let midis: Vec<u8> = notes.iter().map(|n| n.midi).collect();
        assert_eq!(midis, vec![60, 64, 67]);
        assert!(notes.iter().all(|n| n.cents.abs() < 20.0));
        assert_eq!(notes.iter().map(|n| n.confidence).fold(0.0, f32::max), 1.0);
    }

    #[test]
    fn weak_peaks_are_dropped() {
        let detector = PolyPitchDetector::new(RATE, 8192, &PitchConfig::default());
        let mut spectrum = vec![0.0; 4097];
        let bin_a4 = (440.0 / detector.bin_width).round() as usize;
        let bin_a5 = (880.0 / detector.bin_width).round() as usize;
        spectrum[bin_a4] = 1.0;
        spectrum[bin_a5] = 0.1;
        let notes = detector.find_notes(&spectrum, 0.0);
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].midi, 69);
    }

    #[test]
    fn ripple_is_not_a_note() {
        let detector = PolyPitchDetector::new(RATE, 8192, &PitchConfig::default());
        let mut spectrum = vec![0.0; 4097];
        let bin_c4 = (261.63 / detector.bin_width).round() as usize;
        spectrum[bin_c4 - 1] = 0.5;
        spectrum[bin_c4] = 1.0;
        spectrum[bin_c4 + 1] = 0.5;
        // Uneven residue around F#3, its bumps all above the peak ratio.
        let bin_fs3 = (185.0 / detector.bin_width).round() as usize;
        let residue = [
            0.1, 0.2, 0.3, 0.4, 0.55, 0.45, 0.6, 0.5, 0.62, 0.48, 0.58, 0.4, 0.3, 0.2, 0.1,
        ];
        for (offset, value) in residue.into_iter().enumerate() {
            spectrum[bin_fs3 - 7 + offset] = value;
        }
        let midis: Vec<u8> = detector
            .find_notes(&spectrum, 0.0)
            .iter()
            .map(|n| n.midi)
            .collect();
        assert_eq!(midis, vec![60]);
    }

    /// Deterministic uniform noise in `[-amplitude, amplitude]`.
    fn noise(len: usize, amplitude: f32, seed: u32) -> Vec<f32> {
        let mut state = seed;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                amplitude * ((state >> 8) as f32 / (1u32 << 24) as f32 * 2.0 - 1.0)
            })
            .collect()
    }

    #[test]
    fn note_under_room_noise_after_subtraction() {
        let len = 8192;
        let mut analyzer = SpectrumAnalyzer::new(len).unwrap();
        let mut filter = NoiseFilter::default();
        for seed in 1..=8 {
            filter.observe_noise(analyzer.magnitude(&noise(len, 0.01, seed)).unwrap());
        }

        let signal: Vec<f32> = sine(261.63, RATE, len, 0.3)
            .into_iter()
            .zip(noise(len, 0.01, 99))
            .map(|(tone, hiss)| tone + hiss)
            .collect();
        let mut spectrum = analyzer.magnitude(&signal).unwrap().to_vec();
        filter.apply(&mut spectrum);

        let detector = PolyPitchDetector::new(RATE, len, &PitchConfig::default());
        let midis: Vec<u8> = detector
            .find_notes(&spectrum, 0.0)
            .iter()
            .map(|n| n.midi)
            .collect();
        assert_eq!(midis, vec![60]);
    }

    #[test]
    fn empty_spectrum_yields_nothing() {
        let detector = PolyPitchDetector::new(RATE, 8192, &PitchConfig::default());
        assert!(detector.find_notes(&vec![0.0; 4097], 0.0).is_empty());
    }
}
