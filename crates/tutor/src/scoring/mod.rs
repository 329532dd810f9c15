//! Five-dimension grading of an aligned performance.

mod completeness;
mod diagnostics;
mod intonation;
mod rhythm;
mod smoothness;
mod speed;

use encore_domain::notes::midi_to_name;
use encore_domain::{
    AlignStatus, AlignedNote, DetectedNote, ErrorType, Measure, ScoringError, ScoringResult,
    Severity, ToleranceConfig,
};
use tracing::{debug, instrument};

use crate::aligner::{MeasureAlignment, NoteAligner};

pub use completeness::score_completeness;
pub use diagnostics::{diagnose, solution_for, GOOD_ENOUGH};
pub use intonation::score_intonation;
pub use rhythm::score_rhythm;
pub use smoothness::score_smoothness;
pub use speed::score_speed;

/// Everything gathered over a session that grading needs.
#[derive(Debug, Clone)]
pub struct ScoringInput<'a> {
    /// Timed measures, merged across parts.
    pub measures: &'a [Measure],
    pub detected: &'a [DetectedNote],
    pub bpm_samples: &'a [f32],
    pub target_bpm: f32,
    pub tolerance: ToleranceConfig,
    pub polyphonic: bool,
}

/// Scores plus the alignment they were computed from.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub result: ScoringResult,
    pub alignment: Vec<MeasureAlignment>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ScoringEngine;

impl ScoringEngine {
    pub fn score(&self, input: &ScoringInput<'_>) -> ScoringResult {
        self.evaluate(input).result
    }

    #[instrument(skip_all, fields(measures = input.measures.len(), detected = input.detected.len()))]
    pub fn evaluate(&self, input: &ScoringInput<'_>) -> Evaluation {
        let aligner = NoteAligner::new(&input.tolerance);
        let alignment = aligner.align(input.measures, input.detected, input.target_bpm);
        let aligned: Vec<&AlignedNote> = alignment.iter().flat_map(|m| &m.aligned).collect();
        let played: Vec<&AlignedNote> = aligned
            .iter()
            .copied()
            .filter(|a| a.detected.is_some())
            .collect();

        let deviations: Vec<f64> = played.iter().map(|a| a.time_deviation).collect();
        let onsets: Vec<f64> = input.detected.iter().map(|n| n.timestamp).collect();
        let piece_length = match (input.measures.first(), input.measures.last()) {
            (Some(first), Some(last)) => last.end_time - first.start_time,
            _ => 0.0,
        };
        let matched = aligned
            .iter()
            .filter(|a| a.status != AlignStatus::Missed)
            .count();
        let played_measures = alignment.iter().filter(|m| m.played).count();

        let dimensions = vec![
            score_speed(input.target_bpm, input.bpm_samples, &input.tolerance),
            score_rhythm(&deviations, &input.tolerance),
            score_intonation(&played, input.polyphonic, &input.tolerance),
            score_smoothness(&onsets, piece_length),
            score_completeness(matched, aligned.len(), played_measures, alignment.len()),
        ];
        let errors = collect_errors(&alignment, input);
        let numbers: Vec<u32> = input.measures.iter().map(|m| m.number).collect();
        let diagnostics = diagnose(&dimensions, &errors, &numbers);
        let result = ScoringResult::new(dimensions, errors, diagnostics);
        debug!(total = result.total, errors = result.errors.len(), "scored session");
        Evaluation { result, alignment }
    }
}

fn collect_errors(alignment: &[MeasureAlignment], input: &ScoringInput<'_>) -> Vec<ScoringError> {
    let tolerance = &input.tolerance;
    let seconds_per_beat = 60.0 / f64::from(input.target_bpm);
    let ms_per_beat = seconds_per_beat * 1000.0;
    let rhythm_limit = tolerance.rhythm_beats();
    let mut errors = Vec::new();

    for measure in alignment {
        for note in &measure.aligned {
            let expected = Some(midi_to_name(note.score_note.midi));
            let Some(hit) = note.detected else {
                errors.push(ScoringError {
                    measure: measure.number,
                    beat: note.score_note.start_beat,
                    error_type: ErrorType::Missed,
                    expected,
                    actual: None,
                    deviation_cents: None,
                    deviation_ms: None,
                    severity: Severity::Severe,
                });
                continue;
            };
            if note.status == AlignStatus::Correct {
                continue;
            }
            let pitch_off = hit.midi != note.score_note.midi
                || hit.cents.abs() > tolerance.pitch_cents;
            let (error_type, severity) = if pitch_off {
                (ErrorType::Pitch, pitch_severity(note.pitch_deviation))
            } else {
                (
                    ErrorType::Rhythm,
                    rhythm_severity(note.time_deviation, rhythm_limit),
                )
            };
            errors.push(ScoringError {
                measure: measure.number,
                beat: note.score_note.start_beat,
                error_type,
                expected,
                actual: Some(hit.name()),
                deviation_cents: Some(note.pitch_deviation),
                deviation_ms: Some(note.time_deviation * ms_per_beat),
                severity,
            });
        }
        for extra in &measure.extra {
            errors.push(ScoringError {
                measure: measure.number,
                beat: ((extra.timestamp - measure.start_time) / seconds_per_beat).max(0.0),
                error_type: ErrorType::Extra,
                expected: None,
                actual: Some(extra.name()),
                deviation_cents: None,
                deviation_ms: None,
                severity: Severity::Minor,
            });
        }
    }
    errors
}

fn pitch_severity(cents: f32) -> Severity {
    match cents.abs() {
        c if c > 100.0 => Severity::Severe,
        c if c > 50.0 => Severity::Moderate,
        _ => Severity::Minor,
    }
}

fn rhythm_severity(beats: f64, limit: f64) -> Severity {
    let multiple = if limit > 0.0 { beats.abs() / limit } else { f64::INFINITY };
    if multiple >= 3.0 {
        Severity::Severe
    } else if multiple >= 2.0 {
        Severity::Moderate
    } else {
        Severity::Minor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use encore_domain::{ScoreNote, ScoringDimension};

    fn measures() -> Vec<Measure> {
        (0..2)
            .map(|i| {
                let mut m = Measure::new(
                    i + 1,
                    vec![
                        ScoreNote::new(60, 0.0, 1.0),
                        ScoreNote::new(62, 1.0, 1.0),
                        ScoreNote::new(64, 2.0, 1.0),
                        ScoreNote::new(65, 3.0, 1.0),
                    ],
                );
                m.start_time = f64::from(i) * 2.0;
                m.end_time = m.start_time + 2.0;
                m
            })
            .collect()
    }

    fn note(midi: u8, timestamp: f64, cents: f32) -> DetectedNote {
        DetectedNote {
            midi,
            frequency: 0.0,
            cents,
            confidence: 1.0,
            timestamp,
        }
    }

    fn perfect_take() -> Vec<DetectedNote> {
        [60, 62, 64, 65, 60, 62, 64, 65]
            .iter()
            .enumerate()
            .map(|(i, midi)| note(*midi, i as f64 * 0.5, 0.0))
            .collect()
    }

    fn input<'a>(measures: &'a [Measure], detected: &'a [DetectedNote]) -> ScoringInput<'a> {
        ScoringInput {
            measures,
            detected,
            bpm_samples: &[120.0, 120.0, 120.0],
            target_bpm: 120.0,
            tolerance: ToleranceConfig::default(),
            polyphonic: false,
        }
    }

    #[test]
    fn perfect_take_scores_full_marks() {
        let measures = measures();
        let detected = perfect_take();
        let result = ScoringEngine.score(&input(&measures, &detected));
        assert_eq!(result.total, 100);
        assert!(result.errors.is_empty());
        assert!(result.diagnostics.is_empty());
    }

    #[test]
    fn silence_is_all_missed() {
        let measures = measures();
        let evaluation = ScoringEngine.evaluate(&ScoringInput {
            bpm_samples: &[],
            ..input(&measures, &[])
        });
        let result = &evaluation.result;
        assert_eq!(result.errors.len(), 8);
        assert!(result
            .errors
            .iter()
            .all(|e| e.error_type == ErrorType::Missed && e.severity == Severity::Severe));
        assert_eq!(result.dimension(ScoringDimension::Speed).unwrap().score, 0);
        assert_eq!(result.dimension(ScoringDimension::Completeness).unwrap().score, 0);
        assert_eq!(result.dimension(ScoringDimension::Smoothness).unwrap().score, 20);
        assert_eq!(result.total, 20);
        assert_eq!(result.diagnostics[0].severity_rank, 20);
        for measure in &evaluation.alignment {
            assert_eq!(measure.aligned.len(), 4);
        }
    }

    #[test]
    fn classifies_pitch_rhythm_and_extra_errors() {
        let measures = measures();
        let mut detected = perfect_take();
        // Sharp by a tone, late by 0.7 beat, and a stray note.
        detected[1].midi = 64;
        detected[2].timestamp += 0.35;
        detected.push(note(72, 3.9, 0.0));
        let result = ScoringEngine.score(&input(&measures, &detected));
        let kinds: Vec<ErrorType> = result.errors.iter().map(|e| e.error_type).collect();
        assert!(kinds.contains(&ErrorType::Pitch));
        assert!(kinds.contains(&ErrorType::Rhythm));
        assert!(kinds.contains(&ErrorType::Extra));
        let pitch = result
            .errors
            .iter()
            .find(|e| e.error_type == ErrorType::Pitch)
            .unwrap();
        assert_eq!(pitch.severity, Severity::Severe);
        assert_eq!(pitch.expected.as_deref(), Some("D4"));
        let rhythm = result
            .errors
            .iter()
            .find(|e| e.error_type == ErrorType::Rhythm)
            .unwrap();
        assert_eq!(rhythm.severity, Severity::Moderate);
        assert!((rhythm.deviation_ms.unwrap() - 350.0).abs() < 1e-6);
    }

    #[test]
    fn empty_score_does_not_divide_by_zero() {
        let result = ScoringEngine.score(&input(&[], &[]));
        assert_eq!(result.dimension(ScoringDimension::Completeness).unwrap().score, 20);
        assert!(result.total <= 100);
        assert!(result.dimensions.iter().all(|d| d.score <= 20));
    }

    #[test]
    fn severity_bands() {
        assert_eq!(pitch_severity(-150.0), Severity::Severe);
        assert_eq!(pitch_severity(60.0), Severity::Moderate);
        assert_eq!(pitch_severity(30.0), Severity::Minor);
        assert_eq!(rhythm_severity(0.95, 0.3), Severity::Severe);
        assert_eq!(rhythm_severity(0.4, 0.3), Severity::Minor);
    }
}
