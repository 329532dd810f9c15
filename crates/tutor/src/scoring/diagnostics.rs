use std::collections::BTreeMap;

use encore_domain::report::DIMENSION_MAX;
use encore_domain::{Diagnostic, DimensionScore, ErrorType, ScoringDimension, ScoringError};

/// Dimensions at or above this score get no diagnostic.
pub const GOOD_ENOUGH: u8 = 16;

pub fn solution_for(dimension: ScoringDimension) -> &'static str {
    match dimension {
        ScoringDimension::Speed => {
            "Practice with a metronome at a slower tempo, then raise it gradually"
        }
        ScoringDimension::Rhythm => "Count the beats aloud and keep a metronome running",
        ScoringDimension::Intonation => "Practice scales and intervals slowly against a tuner",
        ScoringDimension::Smoothness => {
            "Drill the transitions between notes until they need no pause"
        }
        ScoringDimension::Completeness => {
            "Learn the difficult sections separately before playing straight through"
        }
    }
}

fn implicates(dimension: ScoringDimension, error: &ScoringError) -> bool {
    match dimension {
        ScoringDimension::Intonation => error.error_type == ErrorType::Pitch,
        ScoringDimension::Rhythm => error.error_type == ErrorType::Rhythm,
        ScoringDimension::Completeness => error.error_type == ErrorType::Missed,
        ScoringDimension::Speed | ScoringDimension::Smoothness => true,
    }
}

/// One diagnostic per weak dimension, worst first.
pub fn diagnose(
    dimensions: &[DimensionScore],
    errors: &[ScoringError],
    measure_numbers: &[u32],
) -> Vec<Diagnostic> {
    let mut diagnostics: Vec<Diagnostic> = dimensions
        .iter()
        .filter(|d| d.score < GOOD_ENOUGH)
        .map(|d| {
            let implicated: Vec<&ScoringError> =
                errors.iter().filter(|e| implicates(d.dimension, e)).collect();
            let (measure_start, measure_end) = worst_range(&implicated, measure_numbers);
            Diagnostic {
                dimension: d.dimension,
                problem: format!("{} score is {}/{}", d.dimension.label(), d.score, DIMENSION_MAX),
                cause: d.detail.clone(),
                solution: solution_for(d.dimension).to_string(),
                measure_start,
                measure_end,
                severity_rank: DIMENSION_MAX.saturating_sub(d.score),
            }
        })
        .collect();
    diagnostics.sort_by(|a, b| b.severity_rank.cmp(&a.severity_rank));
    diagnostics
}

/// Contiguous run of error-bearing measures around the measure with the most
/// errors. Without errors the whole piece is implicated.
fn worst_range(errors: &[&ScoringError], measure_numbers: &[u32]) -> (u32, u32) {
    let whole = (
        measure_numbers.iter().copied().min().unwrap_or(1),
        measure_numbers.iter().copied().max().unwrap_or(1),
    );
    let mut counts: BTreeMap<u32, usize> = BTreeMap::new();
    for error in errors {
        *counts.entry(error.measure).or_default() += 1;
    }
    // Highest count wins; ties go to the earliest measure.
    let Some((&worst, _)) = counts
        .iter()
        .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
    else {
        return whole;
    };
    let mut start = worst;
    while start > 1 && counts.contains_key(&(start - 1)) {
        start -= 1;
    }
    let mut end = worst;
    while counts.contains_key(&(end + 1)) {
        end += 1;
    }
    (start, end)
}
