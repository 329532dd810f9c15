pub mod backend;
pub mod bpm;
pub mod chroma;
pub mod dsp;
pub mod echo;
pub mod error;
pub mod io;
pub mod noise;
pub mod onset;
pub mod pitch;

pub use backend::{AudioBackend, NullBackend, SampleCallback, StreamConfig, StreamHandle};
#[cfg(feature = "device")]
pub use backend::CpalBackend;
pub use bpm::BpmTracker;
pub use chroma::{chroma_distance, Chroma, ChromaExtractor, CHROMA_BINS};
pub use dsp::{rms, SpectrumAnalyzer};
pub use echo::EchoCanceller;
pub use error::AudioError;
pub use io::{AudioDecoder, AudioReader};
pub use noise::{AutoGain, NoiseFilter};
pub use onset::{OnsetConfig, OnsetDetector, OnsetEvent};
pub use pitch::{AnalysisFrame, Instrument, PitchConfig, PitchDetector};
