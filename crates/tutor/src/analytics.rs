use std::collections::BTreeMap;

use encore_domain::{AlignedNote, DimensionScore, ScoringDimension, ScoringResult, ToleranceConfig};
use serde::{Deserialize, Serialize};

use crate::aligner::MeasureAlignment;
use crate::scoring::score_intonation;

/// Dimensions at or above this need no practice advice.
const SUGGESTION_THRESHOLD: u8 = 18;
const LOW_SCORE: u8 = 12;
const RIGHT_HAND_STAFF: u8 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PracticeSuggestion {
    pub dimension: ScoringDimension,
    pub score: u8,
    pub priority: u8,
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Hand {
    Left,
    Right,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HandScore {
    pub hand: Hand,
    pub note_count: usize,
    pub correct_count: usize,
    pub intonation: DimensionScore,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HandBreakdown {
    pub left: HandScore,
    pub right: HandScore,
    /// Share of chords whose every note was played, 1.0 when there are none.
    pub chord_completeness: f64,
}

/// Follow-up views over a graded session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionAnalytics {
    pub result: ScoringResult,
}

impl SessionAnalytics {
    pub fn new(result: ScoringResult) -> Self {
        Self { result }
    }

    /// One suggestion per weak dimension, most urgent first.
    pub fn suggestions(&self) -> Vec<PracticeSuggestion> {
        let mut suggestions: Vec<PracticeSuggestion> = self
            .result
            .dimensions
            .iter()
            .filter(|d| d.score < SUGGESTION_THRESHOLD)
            .map(|d| {
                let (title, description) = suggestion_text(d.dimension, d.score < LOW_SCORE);
                PracticeSuggestion {
                    dimension: d.dimension,
                    score: d.score,
                    priority: 20 - d.score,
                    title: title.to_string(),
                    description: description.to_string(),
                }
            })
            .collect();
        suggestions.sort_by(|a, b| b.priority.cmp(&a.priority));
        suggestions
    }

    /// Per-hand view of a keyboard take. Staff 1 is the right hand.
    pub fn hand_breakdown(
        alignment: &[MeasureAlignment],
        tolerance: &ToleranceConfig,
    ) -> HandBreakdown {
        let (right, left): (Vec<&AlignedNote>, Vec<&AlignedNote>) = alignment
            .iter()
            .flat_map(|m| &m.aligned)
            .partition(|a| a.score_note.staff == RIGHT_HAND_STAFF);
        HandBreakdown {
            left: hand_score(Hand::Left, &left, tolerance),
            right: hand_score(Hand::Right, &right, tolerance),
            chord_completeness: chord_completeness(alignment),
        }
    }
}

fn pitch_played(aligned: &AlignedNote) -> bool {
    aligned
        .detected
        .is_some_and(|d| d.midi == aligned.score_note.midi)
}

fn hand_score(hand: Hand, notes: &[&AlignedNote], tolerance: &ToleranceConfig) -> HandScore {
    HandScore {
        hand,
        note_count: notes.len(),
        correct_count: notes.iter().filter(|a| pitch_played(a)).count(),
        intonation: score_intonation(notes, true, tolerance),
    }
}

fn chord_completeness(alignment: &[MeasureAlignment]) -> f64 {
    let mut chords = 0usize;
    let mut complete = 0usize;
    for measure in alignment {
        let mut groups: BTreeMap<i64, Vec<&AlignedNote>> = BTreeMap::new();
        for aligned in &measure.aligned {
            let key = (aligned.score_note.start_beat * 100.0).round() as i64;
            groups.entry(key).or_default().push(aligned);
        }
        for group in groups.values().filter(|g| g.len() >= 2) {
            chords += 1;
            if group.iter().all(|a| pitch_played(a)) {
                complete += 1;
            }
        }
    }
    if chords == 0 {
        1.0
    } else {
        complete as f64 / chords as f64
    }
}

fn suggestion_text(dimension: ScoringDimension, low: bool) -> (&'static str, &'static str) {
    match (dimension, low) {
        (ScoringDimension::Speed, true) => (
            "Slow down the tempo",
            "Practice at 50% speed with a metronome, then raise it gradually.",
        ),
        (ScoringDimension::Speed, false) => (
            "Stabilize your tempo",
            "Use a metronome to hold a steady BPM throughout.",
        ),
        (ScoringDimension::Rhythm, true) => (
            "Focus on rhythm patterns",
            "Clap the rhythm before playing and practice difficult measures separately.",
        ),
        (ScoringDimension::Rhythm, false) => (
            "Refine note durations",
            "Pay attention to dotted notes and syncopation.",
        ),
        (ScoringDimension::Intonation, true) => (
            "Check your tuning",
            "Tune the instrument with a tuner and practice scales slowly.",
        ),
        (ScoringDimension::Intonation, false) => (
            "Improve pitch accuracy",
            "Listen carefully, adjust, and practice intervals.",
        ),
        (ScoringDimension::Smoothness, true) => (
            "Practice legato passages",
            "Focus on smooth transitions between notes and practice hands separately.",
        ),
        (ScoringDimension::Smoothness, false) => (
            "Reduce hesitations",
            "Find where you pause and practice those transitions.",
        ),
        (ScoringDimension::Completeness, true) => (
            "Learn the full piece",
            "Break the piece into sections and learn each one.",
        ),
        (ScoringDimension::Completeness, false) => (
            "Fill in missing sections",
            "Find the skipped measures and practice them.",
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use encore_domain::{AlignStatus, DetectedNote, ScoreNote, SkillLevel};

    fn result(scores: [u8; 5]) -> ScoringResult {
        let dimensions = ScoringDimension::ALL
            .iter()
            .zip(scores)
            .map(|(d, s)| DimensionScore::new(*d, f64::from(s), ""))
            .collect();
        ScoringResult::new(dimensions, Vec::new(), Vec::new())
    }

    fn aligned(midi: u8, start_beat: f64, staff: u8, played: Option<u8>) -> AlignedNote {
        let score_note = ScoreNote {
            staff,
            ..ScoreNote::new(midi, start_beat, 1.0)
        };
        let detected = played.map(|m| DetectedNote {
            midi: m,
            frequency: 0.0,
            cents: 0.0,
            confidence: 1.0,
            timestamp: 0.0,
        });
        let status = match played {
            Some(m) if m == midi => AlignStatus::Correct,
            Some(_) => AlignStatus::WrongPitch,
            None => AlignStatus::Missed,
        };
        AlignedNote {
            measure: 1,
            score_note,
            detected,
            status,
            pitch_deviation: 0.0,
            time_deviation: 0.0,
        }
    }

    #[test]
    fn suggestions_skip_strong_dimensions_and_rank_by_priority() {
        let analytics = SessionAnalytics::new(result([20, 8, 15, 18, 17]));
        let suggestions = analytics.suggestions();
        let order: Vec<ScoringDimension> = suggestions.iter().map(|s| s.dimension).collect();
        assert_eq!(
            order,
            vec![
                ScoringDimension::Rhythm,
                ScoringDimension::Intonation,
                ScoringDimension::Completeness
            ]
        );
        assert_eq!(suggestions[0].priority, 12);
        assert_eq!(suggestions[0].title, "Focus on rhythm patterns");
        assert_eq!(suggestions[1].title, "Improve pitch accuracy");
    }

    #[test]
    fn splits_hands_by_staff() {
        let alignment = vec![MeasureAlignment {
            number: 1,
            start_time: 0.0,
            aligned: vec![
                aligned(72, 0.0, 1, Some(72)),
                aligned(76, 0.0, 1, Some(76)),
                aligned(48, 0.0, 2, None),
                aligned(43, 2.0, 2, Some(43)),
                aligned(55, 2.0, 2, Some(57)),
            ],
            extra: Vec::new(),
            played: true,
        }];
        let tolerance = ToleranceConfig::for_level(SkillLevel::Intermediate);
        let breakdown = SessionAnalytics::hand_breakdown(&alignment, &tolerance);
        assert_eq!(breakdown.right.note_count, 2);
        assert_eq!(breakdown.right.correct_count, 2);
        assert_eq!(breakdown.right.intonation.score, 20);
        assert_eq!(breakdown.left.note_count, 3);
        assert_eq!(breakdown.left.correct_count, 1);
        // Beat 0 chord misses the bass, beat 2 chord has a wrong note.
        assert_eq!(breakdown.chord_completeness, 0.0);
    }

    #[test]
    fn no_chords_is_complete() {
        let alignment = vec![MeasureAlignment {
            number: 1,
            start_time: 0.0,
            aligned: vec![aligned(60, 0.0, 1, Some(60)), aligned(62, 1.0, 1, None)],
            extra: Vec::new(),
            played: true,
        }];
        let tolerance = ToleranceConfig::for_level(SkillLevel::Beginner);
        let breakdown = SessionAnalytics::hand_breakdown(&alignment, &tolerance);
        assert_eq!(breakdown.chord_completeness, 1.0);
        assert_eq!(breakdown.left.intonation.score, 0);
    }
}
