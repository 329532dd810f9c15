pub mod difficulty;
pub mod error;
pub mod io;
pub mod musicxml;
pub mod notes;
pub mod report;
pub mod score;
pub mod tempo;
pub mod tolerance;

pub use crate::difficulty::{estimate_difficulty, Difficulty, DifficultyFactors, DifficultyLevel};
pub use crate::error::{DomainError, ParseError};
pub use crate::io::{ExportFormat, JsonExporter, ResultExporter, SessionReport};
pub use crate::musicxml::{midi_from_pitch, parse_musicxml};
pub use crate::notes::DetectedNote;
pub use crate::report::{
    AlignStatus, AlignedNote, Diagnostic, DimensionScore, ErrorType, ScoringDimension,
    ScoringError, ScoringResult, Severity,
};
pub use crate::score::{
    KeyMode, KeySignature, Measure, ParsedScore, Part, ScoreNote, TempoMark, TimeSignature,
};
pub use crate::tempo::{TempoEvent, TempoMap};
pub use crate::tolerance::{SkillLevel, ToleranceConfig};
