use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::score::ParsedScore;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DifficultyLevel {
    Beginner,
    Intermediate,
    Advanced,
}

impl DifficultyLevel {
    pub fn from_score(score: u8) -> Self {
        match score {
            0..=3 => DifficultyLevel::Beginner,
            4..=6 => DifficultyLevel::Intermediate,
            _ => DifficultyLevel::Advanced,
        }
    }
}

/// Bucketed 1-10 sub-scores.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct DifficultyFactors {
    pub note_density: u8,
    pub pitch_range: u8,
    pub rhythm_complexity: u8,
    pub tempo: u8,
    pub polyphony: u8,
}

impl DifficultyFactors {
    fn weighted(&self) -> f64 {
        f64::from(self.note_density) * 0.25
            + f64::from(self.pitch_range) * 0.2
            + f64::from(self.rhythm_complexity) * 0.25
            + f64::from(self.tempo) * 0.15
            + f64::from(self.polyphony) * 0.15
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct Difficulty {
    pub level: DifficultyLevel,
    pub score: u8,
    pub factors: DifficultyFactors,
}

/// Heuristic difficulty rating for catalog metadata.
pub fn estimate_difficulty(score: &ParsedScore) -> Difficulty {
    let measures = score.total_measures.max(1);
    let midis: Vec<u8> = score.notes().map(|n| n.midi).collect();

    let factors = DifficultyFactors {
        note_density: density_bucket(midis.len() as f64 / f64::from(measures)),
        pitch_range: range_bucket(&midis),
        rhythm_complexity: rhythm_bucket(score),
        tempo: tempo_bucket(score),
        polyphony: polyphony_bucket(score),
    };
    let value = factors.weighted().round().clamp(1.0, 10.0) as u8;
    Difficulty {
        level: DifficultyLevel::from_score(value),
        score: value,
        factors,
    }
}

fn density_bucket(notes_per_measure: f64) -> u8 {
    match notes_per_measure {
        n if n <= 4.0 => 2,
        n if n <= 8.0 => 4,
        n if n <= 16.0 => 6,
        n if n <= 24.0 => 8,
        _ => 10,
    }
}

fn range_bucket(midis: &[u8]) -> u8 {
    let (Some(low), Some(high)) = (midis.iter().min(), midis.iter().max()) else {
        return 1;
    };
    match high - low {
        0..=12 => 2,
        13..=24 => 4,
        25..=36 => 6,
        37..=48 => 8,
        _ => 10,
    }
}

fn rhythm_bucket(score: &ParsedScore) -> u8 {
    let distinct: HashSet<i64> = score
        .notes()
        .map(|n| (n.duration_beats * 100.0).round() as i64)
        .collect();
    match distinct.len() {
        0 => 1,
        1..=2 => 2,
        3..=4 => 5,
        5..=6 => 7,
        _ => 9,
    }
}

fn tempo_bucket(score: &ParsedScore) -> u8 {
    let Some(peak) = score.tempos.iter().map(|t| t.bpm).reduce(f32::max) else {
        return 3;
    };
    match peak {
        b if b <= 72.0 => 2,
        b if b <= 108.0 => 4,
        b if b <= 132.0 => 6,
        b if b <= 160.0 => 8,
        _ => 10,
    }
}

fn polyphony_bucket(score: &ParsedScore) -> u8 {
    let max_voices = score
        .parts
        .iter()
        .flat_map(|part| &part.measures)
        .map(|m| m.notes.iter().map(|n| n.voice).collect::<HashSet<_>>().len())
        .max()
        .unwrap_or(1);
    match max_voices {
        0..=1 => 1,
        2 => 5,
        _ => 9,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::score::{Measure, Part, ScoreNote, TempoMark};

    fn score_with(measures: Vec<Measure>, tempo: Option<f32>) -> ParsedScore {
        ParsedScore {
            total_measures: measures.len() as u32,
            parts: vec![Part {
                id: "P1".into(),
                name: "P1".into(),
                measures,
            }],
            tempos: tempo
                .map(|bpm| vec![TempoMark { bpm, measure: 1, beat: 0.0 }])
                .unwrap_or_default(),
            ..Default::default()
        }
    }

    #[test]
    fn empty_score_is_beginner() {
        let result = estimate_difficulty(&ParsedScore::default());
        assert_eq!(result.level, DifficultyLevel::Beginner);
        assert!((1..=3).contains(&result.score));
        assert_eq!(result.factors.pitch_range, 1);
        assert_eq!(result.factors.tempo, 3);
    }

    #[test]
    fn simple_melody_is_beginner() {
        let notes = (0..4).map(|i| ScoreNote::new(60 + i, f64::from(i), 1.0)).collect();
        let result = estimate_difficulty(&score_with(vec![Measure::new(1, notes)], Some(80.0)));
        assert_eq!(result.factors.note_density, 2);
        assert_eq!(result.factors.rhythm_complexity, 2);
        assert_eq!(result.factors.tempo, 4);
        assert_eq!(result.level, DifficultyLevel::Beginner);
    }

    #[test]
    fn dense_wide_fast_score_is_advanced() {
        let durations = [0.25, 0.5, 0.75, 1.0, 1.5, 2.0, 0.125];
        let mut notes = Vec::new();
        for i in 0..30u8 {
            let mut note = ScoreNote::new(30 + i * 2, f64::from(i) * 0.125, durations[i as usize % 7]);
            note.voice = 1 + i % 3;
            notes.push(note);
        }
        let result = estimate_difficulty(&score_with(vec![Measure::new(1, notes)], Some(176.0)));
        assert_eq!(result.factors.note_density, 10);
        assert_eq!(result.factors.pitch_range, 10);
        assert_eq!(result.factors.rhythm_complexity, 9);
        assert_eq!(result.factors.tempo, 10);
        assert_eq!(result.factors.polyphony, 9);
        assert_eq!(result.score, 10);
        assert_eq!(result.level, DifficultyLevel::Advanced);
    }
}
