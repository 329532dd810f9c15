use encore_domain::notes::{frequency_to_midi, pitch_class};

pub const CHROMA_BINS: usize = 12;

pub type Chroma = [f32; CHROMA_BINS];

pub const MIN_CHROMA_HZ: f32 = 27.5;
pub const MAX_CHROMA_HZ: f32 = 4200.0;

/// Folds a magnitude spectrum onto the twelve pitch classes. The bin to class
/// map is computed once for the analyzer's fft size.
#[derive(Debug, Clone)]
pub struct ChromaExtractor {
    classes: Vec<Option<usize>>,
}

impl ChromaExtractor {
    pub fn new(sample_rate: f32, fft_size: usize) -> Self {
        let bin_width = sample_rate / fft_size as f32;
        let classes = (0..fft_size / 2 + 1)
            .map(|bin| {
                let frequency = bin as f32 * bin_width;
                if !(MIN_CHROMA_HZ..=MAX_CHROMA_HZ).contains(&frequency) {
                    return None;
                }
                let midi = frequency_to_midi(frequency).round();
                (midi >= 0.0).then(|| pitch_class(midi as u8))
            })
            .collect();
        Self { classes }
    }

    /// Spectrum bins beyond the analyzer's size are ignored. The result is
    /// scaled so its largest class is 1, or all zeros for silence.
    pub fn extract(&self, magnitude: &[f32]) -> Chroma {
        let mut chroma = [0.0; CHROMA_BINS];
        for (mag, class) in magnitude.iter().zip(&self.classes) {
            if let Some(class) = class {
                chroma[*class] += mag;
            }
        }
        let peak = chroma.iter().copied().fold(0.0f32, f32::max);
        if peak > 0.0 {
            for value in &mut chroma {
                *value /= peak;
            }
        }
        chroma
    }
}

pub fn chroma_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

/// Unit chroma for a set of sounding MIDI notes.
pub fn chroma_for_notes(notes: impl IntoIterator<Item = u8>) -> Chroma {
    let mut chroma = [0.0; CHROMA_BINS];
    for midi in notes {
        chroma[pitch_class(midi)] = 1.0;
    }
    chroma
}
