use serde::{Deserialize, Serialize};

use crate::notes::DetectedNote;
use crate::score::ScoreNote;

/// Highest score a single dimension can award.
pub const DIMENSION_MAX: u8 = 20;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum AlignStatus {
    Correct,
    WrongPitch,
    Missed,
}

/// One expected note and what, if anything, was played for it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AlignedNote {
    pub measure: u32,
    pub score_note: ScoreNote,
    pub detected: Option<DetectedNote>,
    pub status: AlignStatus,
    /// Semitone offset × 100 plus residual cents; zero when missed.
    pub pitch_deviation: f32,
    /// Positive when late; zero when missed.
    pub time_deviation: f64,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ScoringDimension {
    Speed,
    Rhythm,
    Intonation,
    Smoothness,
    Completeness,
}

impl ScoringDimension {
    pub const ALL: [ScoringDimension; 5] = [
        ScoringDimension::Speed,
        ScoringDimension::Rhythm,
        ScoringDimension::Intonation,
        ScoringDimension::Smoothness,
        ScoringDimension::Completeness,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            ScoringDimension::Speed => "speed",
            ScoringDimension::Rhythm => "rhythm",
            ScoringDimension::Intonation => "intonation",
            ScoringDimension::Smoothness => "smoothness",
            ScoringDimension::Completeness => "completeness",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DimensionScore {
    pub dimension: ScoringDimension,
    /// 0..=20.
    pub score: u8,
    pub detail: String,
}

impl DimensionScore {
    /// Rounds `points` and clamps into the dimension range.
    pub fn new(dimension: ScoringDimension, points: f64, detail: impl Into<String>) -> Self {
        let score = if points.is_finite() {
            points.round().clamp(0.0, f64::from(DIMENSION_MAX)) as u8
        } else {
            0
        };
        Self {
            dimension,
            score,
            detail: detail.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ErrorType {
    Pitch,
    Rhythm,
    Missed,
    Extra,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Minor,
    Moderate,
    Severe,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ScoringError {
    pub measure: u32,
    pub beat: f64,
    pub error_type: ErrorType,
    /// Note name such as `C4`.
    pub expected: Option<String>,
    pub actual: Option<String>,
    pub deviation_cents: Option<f32>,
    pub deviation_ms: Option<f64>,
    pub severity: Severity,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Diagnostic {
    pub dimension: ScoringDimension,
    pub problem: String,
    pub cause: String,
    pub solution: String,
    pub measure_start: u32,
    pub measure_end: u32,
    /// `20 - score`; higher is worse.
    pub severity_rank: u8,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ScoringResult {
    /// Sum of the dimension scores, 0..=100.
    pub total: u8,
    pub dimensions: Vec<DimensionScore>,
    pub errors: Vec<ScoringError>,
    pub diagnostics: Vec<Diagnostic>,
}

impl ScoringResult {
    pub fn new(
        dimensions: Vec<DimensionScore>,
        errors: Vec<ScoringError>,
        diagnostics: Vec<Diagnostic>,
    ) -> Self {
        let total = dimensions
            .iter()
            .map(|d| u32::from(d.score.min(DIMENSION_MAX)))
            .sum::<u32>()
            .min(100) as u8;
        Self {
            total,
            dimensions,
            errors,
            diagnostics,
        }
    }

    pub fn dimension(&self, dimension: ScoringDimension) -> Option<&DimensionScore> {
        self.dimensions.iter().find(|d| d.dimension == dimension)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimension_score_is_clamped() {
        let high = DimensionScore::new(ScoringDimension::Speed, 25.4, "");
        let low = DimensionScore::new(ScoringDimension::Speed, -3.0, "");
        let nan = DimensionScore::new(ScoringDimension::Speed, f64::NAN, "");
        assert_eq!(high.score, 20);
        assert_eq!(low.score, 0);
        assert_eq!(nan.score, 0);
        assert_eq!(DimensionScore::new(ScoringDimension::Speed, 12.5, "").score, 13);
    }

    #[test]
    fn total_is_sum_of_dimensions() {
        let dims: Vec<_> = ScoringDimension::ALL
            .iter()
            .map(|d| DimensionScore::new(*d, 15.0, ""))
            .collect();
        let result = ScoringResult::new(dims, Vec::new(), Vec::new());
        assert_eq!(result.total, 75);
        assert_eq!(
            result.dimension(ScoringDimension::Rhythm).map(|d| d.score),
            Some(15)
        );
    }

    #[test]
    fn serializes_with_kebab_status() {
        let json = serde_json::to_string(&AlignStatus::WrongPitch).unwrap();
        assert_eq!(json, "\"wrong-pitch\"");
    }
}
