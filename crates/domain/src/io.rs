use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{error::DomainError, report::ScoringResult};

/// What a finished session hands to the persistence collaborator.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SessionReport {
    pub score_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub finished_at: OffsetDateTime,
    pub target_bpm: f32,
    pub result: ScoringResult,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    JsonPretty,
}

pub trait ResultExporter {
    fn export(&self, report: &SessionReport, format: ExportFormat)
        -> Result<Vec<u8>, DomainError>;
}

pub struct JsonExporter;

impl ResultExporter for JsonExporter {
    fn export(
        &self,
        report: &SessionReport,
        format: ExportFormat,
    ) -> Result<Vec<u8>, DomainError> {
        let bytes = match format {
            ExportFormat::Json => serde_json::to_vec(report),
            ExportFormat::JsonPretty => serde_json::to_vec_pretty(report),
        };
        bytes.map_err(|err| DomainError::Serialization(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{DimensionScore, ScoringDimension};

    #[test]
    fn exports_json() {
        let result = ScoringResult::new(
            vec![DimensionScore::new(ScoringDimension::Speed, 18.0, "steady")],
            Vec::new(),
            Vec::new(),
        );
        let report = SessionReport {
            score_id: "minuet".into(),
            started_at: OffsetDateTime::UNIX_EPOCH,
            finished_at: OffsetDateTime::UNIX_EPOCH,
            target_bpm: 96.0,
            result,
        };

        let exporter = JsonExporter;
        let bytes = exporter.export(&report, ExportFormat::JsonPretty).unwrap();
        let output = String::from_utf8(bytes).unwrap();
        assert!(output.contains("\"score_id\": \"minuet\""));
        assert!(output.contains("\"dimension\": \"speed\""));
        assert!(output.contains("1970-01-01T00:00:00Z"));
    }
}
