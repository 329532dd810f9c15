use thiserror::Error;

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("no audio input device is available")]
    DeviceUnavailable,
    #[error("permission to open the audio input was denied")]
    PermissionDenied,
    #[error("audio stream failed: {0}")]
    Stream(String),
    #[error("fft failed: {0}")]
    Fft(String),
    #[error("invalid audio configuration: {0}")]
    Config(String),
}

impl AudioError {
    /// Device and stream failures are retryable, configuration errors are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AudioError::DeviceUnavailable | AudioError::PermissionDenied | AudioError::Stream(_)
        )
    }

    pub fn config<T: Into<String>>(message: T) -> Self {
        Self::Config(message.into())
    }
}

impl From<realfft::FftError> for AudioError {
    fn from(err: realfft::FftError) -> Self {
        AudioError::Fft(err.to_string())
    }
}
