use encore_audio::noise::{DEFAULT_GATE_THRESHOLD, DEFAULT_SUBTRACTION_FACTOR};
use encore_audio::{Instrument, OnsetConfig, PitchConfig};
use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// Every tunable of the analysis engine. Missing fields in a config file fall
/// back to these defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub sample_rate: u32,
    pub hop_size: usize,
    pub mono_frame_size: usize,
    pub poly_frame_size: usize,
    /// Samples handed to the monophonic detector, taken from the end of the
    /// analysis window.
    pub pitch_window: usize,
    /// Half-width of the follower's search window in template frames.
    pub follower_window: usize,
    pub follower_rows: usize,
    pub onset: OnsetConfig,
    pub pitch: PitchConfig,
    pub noise_gate: f32,
    pub agc_target_rms: f32,
    pub agc_max_gain: f32,
    pub subtraction_factor: f32,
    pub calibration_seconds: f64,
    pub echo_filter_length: usize,
    pub echo_step_size: f32,
    pub bpm_window: usize,
    pub bpm_smoothing: f32,
    /// Frames a new pitch must persist before it counts without an onset.
    pub stable_frames: usize,
    /// Capture ring capacity in samples.
    pub ring_capacity: usize,
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            hop_size: 1024,
            mono_frame_size: Instrument::Cello.frame_size(),
            poly_frame_size: Instrument::Piano.frame_size(),
            pitch_window: 2048,
            follower_window: 50,
            follower_rows: 150,
            onset: OnsetConfig::default(),
            pitch: PitchConfig::default(),
            noise_gate: DEFAULT_GATE_THRESHOLD,
            agc_target_rms: 0.1,
            agc_max_gain: 5.0,
            subtraction_factor: DEFAULT_SUBTRACTION_FACTOR,
            calibration_seconds: 0.25,
            echo_filter_length: 512,
            echo_step_size: 0.01,
            bpm_window: 50,
            bpm_smoothing: 0.3,
            stable_frames: 2,
            ring_capacity: 44_100 * 4,
            event_capacity: 256,
        }
    }
}

impl EngineConfig {
    pub fn frame_size(&self, instrument: Instrument) -> usize {
        if instrument.is_polyphonic() {
            self.poly_frame_size
        } else {
            self.mono_frame_size
        }
    }

    pub fn hop_seconds(&self) -> f64 {
        self.hop_size as f64 / f64::from(self.sample_rate)
    }

    pub fn validate(&self) -> Result<(), SessionError> {
        let sizes = [
            ("sample_rate", self.sample_rate as usize),
            ("hop_size", self.hop_size),
            ("mono_frame_size", self.mono_frame_size),
            ("poly_frame_size", self.poly_frame_size),
            ("pitch_window", self.pitch_window),
            ("follower_window", self.follower_window),
            ("follower_rows", self.follower_rows),
            ("echo_filter_length", self.echo_filter_length),
            ("bpm_window", self.bpm_window),
            ("stable_frames", self.stable_frames),
            ("ring_capacity", self.ring_capacity),
            ("event_capacity", self.event_capacity),
        ];
        if let Some((name, _)) = sizes.iter().find(|(_, value)| *value == 0) {
            return Err(SessionError::config(format!("{name} must be positive")));
        }
        for (name, size) in [
            ("mono_frame_size", self.mono_frame_size),
            ("poly_frame_size", self.poly_frame_size),
        ] {
            if size % 2 != 0 || size < self.hop_size {
                return Err(SessionError::config(format!(
                    "{name} must be even and at least hop_size"
                )));
            }
        }
        if self.pitch_window > self.mono_frame_size {
            return Err(SessionError::config(
                "pitch_window cannot exceed mono_frame_size",
            ));
        }
        if !(self.pitch.min_clarity > 0.0 && self.pitch.min_clarity <= 1.0) {
            return Err(SessionError::config("pitch.min_clarity must lie in (0, 1]"));
        }
        if !(self.pitch.min_frequency > 0.0 && self.pitch.min_frequency < self.pitch.max_frequency)
        {
            return Err(SessionError::config("pitch frequency window is empty"));
        }
        if !(0.0..=1.0).contains(&self.pitch.min_peak_ratio) || self.pitch.max_peaks == 0 {
            return Err(SessionError::config("poly peak settings out of range"));
        }
        if !(self.echo_step_size > 0.0 && self.echo_step_size <= 2.0) {
            return Err(SessionError::config("echo_step_size must lie in (0, 2]"));
        }
        if !(0.0..=1.0).contains(&self.bpm_smoothing) {
            return Err(SessionError::config("bpm_smoothing must lie in [0, 1]"));
        }
        let non_negative = [
            self.noise_gate,
            self.subtraction_factor,
            self.onset.flux_threshold,
            self.onset.energy_floor,
            self.onset.energy_rise,
        ];
        if non_negative.iter().any(|v| !v.is_finite() || *v < 0.0)
            || !(self.calibration_seconds >= 0.0 && self.onset.cooldown_seconds >= 0.0)
        {
            return Err(SessionError::config("thresholds must be non-negative"));
        }
        if !(self.agc_target_rms > 0.0 && self.agc_max_gain >= 1.0) {
            return Err(SessionError::config("agc target must be positive and gain cap at least 1"));
        }
        Ok(())
    }
}
