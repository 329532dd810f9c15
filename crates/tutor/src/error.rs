use encore_audio::AudioError;
use encore_domain::{DomainError, ParseError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("score `{0}` not found")]
    UnknownScore(String),
    #[error("target bpm must lie within 10..=400, got {0}")]
    InvalidTargetBpm(f32),
    #[error("invalid engine configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Audio(#[from] AudioError),
    #[error("audio input is owned by a live capture stream")]
    InputOwnedByDevice,
    #[error("analysis worker failed: {0}")]
    Worker(String),
}

impl SessionError {
    pub(crate) fn config<T: Into<String>>(message: T) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Only device acquisition failures are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SessionError::Audio(err) if err.is_retryable())
    }
}
