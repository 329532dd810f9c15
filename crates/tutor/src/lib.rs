pub mod aligner;
pub mod analytics;
pub mod config;
pub mod cursor;
pub mod error;
pub mod follower;
pub mod library;
pub mod pipeline;
pub mod scoring;
pub mod session;
mod worker;

pub use aligner::{MeasureAlignment, NoteAligner};
pub use analytics::{Hand, HandBreakdown, HandScore, PracticeSuggestion, SessionAnalytics};
pub use config::EngineConfig;
pub use cursor::{CursorEvent, CursorState, CursorUpdate, ScoreCursor};
pub use error::SessionError;
pub use follower::{measure_at_time, score_chroma, ScoreFollower};
pub use library::{InMemoryLibrary, ScoreLibrary};
pub use pipeline::{CaptureSample, FeaturePipeline, FollowerEvent, NoteTracker, PipelineOutput};
pub use scoring::{Evaluation, ScoringEngine, ScoringInput};
pub use session::{Session, SessionOptions, SessionOutcome};
