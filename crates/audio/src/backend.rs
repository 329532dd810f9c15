use std::any::Any;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::AudioError;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct StreamConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub buffer_size: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            channels: 1,
            buffer_size: 512,
        }
    }
}

/// Receives mono capture buffers on the audio thread. Must not block.
pub type SampleCallback = Box<dyn FnMut(&[f32]) + Send + 'static>;

/// An open input stream. Dropping the handle stops capture and releases the
/// device.
pub struct StreamHandle {
    config: StreamConfig,
    _stream: Option<Box<dyn Any>>,
}

impl StreamHandle {
    pub fn config(&self) -> StreamConfig {
        self.config
    }
}

impl std::fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandle")
            .field("config", &self.config)
            .field("live", &self._stream.is_some())
            .finish()
    }
}

pub trait AudioBackend: Send + Sync {
    fn open_stream(
        &self,
        config: &StreamConfig,
        on_samples: SampleCallback,
    ) -> Result<StreamHandle, AudioError>;

    fn measure_latency(&self, _handle: &StreamHandle) -> Result<Duration, AudioError> {
        Ok(Duration::from_millis(5))
    }
}

/// Opens nothing and never delivers samples. Frames reach the session through
/// explicit pushes instead.
pub struct NullBackend;

impl AudioBackend for NullBackend {
    fn open_stream(
        &self,
        config: &StreamConfig,
        _on_samples: SampleCallback,
    ) -> Result<StreamHandle, AudioError> {
        debug!(?config, "opening null audio stream");
        Ok(StreamHandle {
            config: *config,
            _stream: None,
        })
    }
}

#[cfg(feature = "device")]
pub use device::CpalBackend;

#[cfg(feature = "device")]
mod device {
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use tracing::{info, warn};

    use super::{AudioBackend, SampleCallback, StreamConfig, StreamHandle};
    use crate::dsp::downmix;
    use crate::error::AudioError;

    /// Microphone capture through the host's default audio API.
    #[derive(Debug, Default, Clone)]
    pub struct CpalBackend {
        pub device_name: Option<String>,
    }

    impl CpalBackend {
        fn device(&self) -> Result<cpal::Device, AudioError> {
            let host = cpal::default_host();
            let device = match &self.device_name {
                Some(wanted) => host
                    .input_devices()
                    .map_err(|err| AudioError::Stream(err.to_string()))?
                    .find(|d| d.name().map(|n| &n == wanted).unwrap_or(false)),
                None => host.default_input_device(),
            };
            device.ok_or(AudioError::DeviceUnavailable)
        }
    }

    impl AudioBackend for CpalBackend {
        fn open_stream(
            &self,
            config: &StreamConfig,
            mut on_samples: SampleCallback,
        ) -> Result<StreamHandle, AudioError> {
            let device = self.device()?;
            info!(device = ?device.name().ok(), ?config, "opening input stream");
            let stream_config = cpal::StreamConfig {
                channels: config.channels,
                sample_rate: cpal::SampleRate(config.sample_rate),
                buffer_size: cpal::BufferSize::Fixed(config.buffer_size),
            };
            let channels = usize::from(config.channels.max(1));
            let mut mono = Vec::with_capacity(config.buffer_size as usize);
            let stream = device
                .build_input_stream(
                    &stream_config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        downmix(data, channels, &mut mono);
                        on_samples(&mono);
                    },
                    |err| warn!(%err, "input stream error"),
                    None,
                )
                .map_err(map_build_error)?;
            stream
                .play()
                .map_err(|err| AudioError::Stream(err.to_string()))?;
            Ok(StreamHandle {
                config: *config,
                _stream: Some(Box::new(stream)),
            })
        }
    }

    fn map_build_error(err: cpal::BuildStreamError) -> AudioError {
        match err {
            cpal::BuildStreamError::DeviceNotAvailable => AudioError::DeviceUnavailable,
            other => {
                let message = other.to_string();
                if message.to_ascii_lowercase().contains("permission") {
                    AudioError::PermissionDenied
                } else {
                    AudioError::Stream(message)
                }
            }
        }
    }
}
