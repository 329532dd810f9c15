use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl DomainError {
    pub fn validation<T: Into<String>>(message: T) -> Self {
        Self::Validation(message.into())
    }
}

/// Failure to turn a score document into a [`crate::ParsedScore`].
///
/// Parsing is all-or-nothing: no partial score accompanies an error.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed score markup at byte {position}: {message}")]
    Markup { position: usize, message: String },
    #[error("invalid value {value:?} in <{element}>")]
    InvalidValue { element: String, value: String },
    #[error("pitch {step}{octave} (alter {alter}) is outside the MIDI range")]
    PitchOutOfRange { step: char, alter: i32, octave: i32 },
    #[error("unsupported root element <{0}>, expected <score-partwise>")]
    UnsupportedRoot(String),
}

impl ParseError {
    pub(crate) fn markup(position: usize, message: impl ToString) -> Self {
        Self::Markup {
            position,
            message: message.to_string(),
        }
    }

    pub(crate) fn invalid(element: &str, value: impl Into<String>) -> Self {
        Self::InvalidValue {
            element: element.to_string(),
            value: value.into(),
        }
    }
}
