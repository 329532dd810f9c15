use serde::{Deserialize, Serialize};

const A4_MIDI: f32 = 69.0;
const A4_FREQUENCY: f32 = 440.0;
const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// A pitch observed in the live stream.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct DetectedNote {
    pub midi: u8,
    pub frequency: f32,
    /// Deviation from `midi` in cents, within (-50, 50].
    pub cents: f32,
    pub confidence: f32,
    /// Seconds since session start.
    pub timestamp: f64,
}

impl DetectedNote {
    /// Builds a detection from a raw frequency, or `None` when the frequency
    /// falls outside the MIDI range.
    pub fn from_frequency(frequency: f32, confidence: f32, timestamp: f64) -> Option<Self> {
        let midi = nearest_midi(frequency)?;
        Some(Self {
            midi,
            frequency,
            cents: cents_from_nearest(frequency),
            confidence,
            timestamp,
        })
    }

    pub fn name(&self) -> String {
        midi_to_name(self.midi)
    }
}

pub fn midi_to_frequency(midi: f32) -> f32 {
    A4_FREQUENCY * 2f32.powf((midi - A4_MIDI) / 12.0)
}

/// Fractional MIDI number for a frequency.
pub fn frequency_to_midi(frequency: f32) -> f32 {
    A4_MIDI + 12.0 * (frequency / A4_FREQUENCY).log2()
}

pub fn nearest_midi(frequency: f32) -> Option<u8> {
    if !(frequency.is_finite() && frequency > 0.0) {
        return None;
    }
    let midi = frequency_to_midi(frequency).round();
    (0.0..=127.0).contains(&midi).then_some(midi as u8)
}

pub fn cents_from_nearest(frequency: f32) -> f32 {
    let midi = frequency_to_midi(frequency);
    (midi - midi.round()) * 100.0
}

/// Scientific pitch name, e.g. `C4` for 60.
pub fn midi_to_name(midi: u8) -> String {
    let octave = i32::from(midi) / 12 - 1;
    format!("{}{}", NOTE_NAMES[usize::from(midi % 12)], octave)
}

pub fn pitch_class(midi: u8) -> usize {
    usize::from(midi % 12)
}
