use anyhow::Result;
use serde::Serialize;

use encore_domain::{SessionReport, ToleranceConfig};
use encore_tutor::{HandBreakdown, PracticeSuggestion, SessionAnalytics, SessionOutcome};

use crate::pipeline::GradeJob;

/// The graded session plus practice advice. Keyboard takes also carry the
/// per-hand breakdown.
#[derive(Debug, Clone, Serialize)]
pub struct GradeReport {
    #[serde(flatten)]
    pub session: SessionReport,
    pub suggestions: Vec<PracticeSuggestion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hands: Option<HandBreakdown>,
}

impl GradeReport {
    pub fn new(job: &GradeJob, outcome: &SessionOutcome) -> Self {
        let analytics = SessionAnalytics::new(outcome.result().clone());
        let hands = job.instrument.is_polyphonic().then(|| {
            SessionAnalytics::hand_breakdown(
                &outcome.evaluation.alignment,
                &ToleranceConfig::for_level(job.level),
            )
        });
        Self {
            session: outcome.report(),
            suggestions: analytics.suggestions(),
            hands,
        }
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use encore_audio::Instrument;
    use encore_domain::{DimensionScore, ScoringDimension, ScoringResult, SkillLevel};
    use encore_tutor::{Evaluation, PipelineOutput};
    use time::OffsetDateTime;

    fn outcome(scores: [u8; 5]) -> SessionOutcome {
        let dimensions = ScoringDimension::ALL
            .iter()
            .zip(scores)
            .map(|(d, s)| DimensionScore::new(*d, f64::from(s), ""))
            .collect();
        let now = OffsetDateTime::now_utc();
        SessionOutcome {
            score_id: "etude".into(),
            target_bpm: 90.0,
            started_at: now,
            finished_at: now,
            evaluation: Evaluation {
                result: ScoringResult::new(dimensions, Vec::new(), Vec::new()),
                alignment: Vec::new(),
            },
            output: PipelineOutput::default(),
            dropped_samples: 0,
        }
    }

    fn job(instrument: Instrument) -> GradeJob {
        GradeJob {
            score_path: "etude.musicxml".into(),
            audio_path: "take.wav".into(),
            target_bpm: 90.0,
            level: SkillLevel::Intermediate,
            instrument,
        }
    }

    #[test]
    fn cello_report_carries_suggestions_without_hands() {
        let report = GradeReport::new(&job(Instrument::Cello), &outcome([20, 9, 20, 16, 20]));
        assert_eq!(report.suggestions.len(), 2);
        assert_eq!(report.suggestions[0].dimension, ScoringDimension::Rhythm);

        let json: serde_json::Value =
            serde_json::from_str(&report.to_json_pretty().unwrap()).unwrap();
        assert_eq!(json["score_id"], "etude");
        assert_eq!(json["result"]["total"], 85);
        assert_eq!(json["suggestions"].as_array().unwrap().len(), 2);
        assert!(json.get("hands").is_none());
    }

    #[test]
    fn piano_report_includes_hand_breakdown() {
        let report = GradeReport::new(&job(Instrument::Piano), &outcome([20; 5]));
        assert!(report.suggestions.is_empty());
        let hands = report.hands.as_ref().unwrap();
        assert_eq!(hands.left.note_count, 0);
        assert_eq!(hands.chord_completeness, 1.0);

        let json: serde_json::Value =
            serde_json::from_str(&report.to_json_pretty().unwrap()).unwrap();
        assert!(json["hands"]["left"].is_object());
    }
}
