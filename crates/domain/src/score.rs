use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct ScoreNote {
    pub midi: u8,
    /// Offset from the start of the measure, in quarter-note beats.
    pub start_beat: f64,
    pub duration_beats: f64,
    pub voice: u8,
    pub staff: u8,
    pub tied: bool,
}

impl ScoreNote {
    pub fn new(midi: u8, start_beat: f64, duration_beats: f64) -> Self {
        Self {
            midi,
            start_beat,
            duration_beats,
            voice: 1,
            staff: 1,
            tied: false,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Measure {
    /// 1-based.
    pub number: u32,
    /// Seconds from the start of the piece. Zero until timed.
    pub start_time: f64,
    pub end_time: f64,
    pub notes: Vec<ScoreNote>,
}

impl Measure {
    pub fn new(number: u32, notes: Vec<ScoreNote>) -> Self {
        Self {
            number,
            start_time: 0.0,
            end_time: 0.0,
            notes,
        }
    }

    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Part {
    pub id: String,
    pub name: String,
    pub measures: Vec<Measure>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeSignature {
    pub beats: u8,
    pub beat_type: u8,
    pub measure: u32,
}

impl TimeSignature {
    /// Measure length in quarter-note beats.
    pub fn quarter_beats(&self) -> f64 {
        f64::from(self.beats) * 4.0 / f64::from(self.beat_type.max(1))
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum KeyMode {
    #[default]
    Major,
    Minor,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeySignature {
    /// Sharps (positive) or flats (negative).
    pub fifths: i8,
    pub mode: KeyMode,
    pub measure: u32,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct TempoMark {
    pub bpm: f32,
    pub measure: u32,
    pub beat: f64,
}

/// A score document reduced to what grading needs. Immutable once built;
/// [`ParsedScore::timed`](crate::ParsedScore::timed) returns a timed copy.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ParsedScore {
    pub title: String,
    pub composer: String,
    pub parts: Vec<Part>,
    pub time_signatures: Vec<TimeSignature>,
    pub key_signatures: Vec<KeySignature>,
    pub tempos: Vec<TempoMark>,
    pub total_measures: u32,
}

impl ParsedScore {
    pub fn note_count(&self) -> usize {
        self.parts
            .iter()
            .flat_map(|part| &part.measures)
            .map(|measure| measure.notes.len())
            .sum()
    }

    pub fn notes(&self) -> impl Iterator<Item = &ScoreNote> {
        self.parts
            .iter()
            .flat_map(|part| &part.measures)
            .flat_map(|measure| &measure.notes)
    }

    /// Measures of every part merged by number, so a multi-part score grades as
    /// one timeline. Times come from the first part that has the measure.
    pub fn merged_measures(&self) -> Vec<Measure> {
        let mut merged: Vec<Measure> = Vec::new();
        for part in &self.parts {
            for measure in &part.measures {
                match merged.iter_mut().find(|m| m.number == measure.number) {
                    Some(existing) => existing.notes.extend(measure.notes.iter().copied()),
                    None => merged.push(measure.clone()),
                }
            }
        }
        merged.sort_by_key(|m| m.number);
        for measure in &mut merged {
            measure
                .notes
                .sort_by(|a, b| a.start_beat.total_cmp(&b.start_beat));
        }
        merged
    }

    /// Time signature in force at `measure`, defaulting to 4/4.
    pub fn time_signature_at(&self, measure: u32) -> TimeSignature {
        self.time_signatures
            .iter()
            .filter(|sig| sig.measure <= measure)
            .last()
            .copied()
            .unwrap_or(TimeSignature {
                beats: 4,
                beat_type: 4,
                measure: 1,
            })
    }

    pub fn initial_tempo(&self) -> Option<f32> {
        self.tempos.first().map(|mark| mark.bpm)
    }

    pub fn duration(&self) -> f64 {
        self.parts
            .iter()
            .filter_map(|part| part.measures.last())
            .map(|m| m.end_time)
            .fold(0.0, f64::max)
    }
}
