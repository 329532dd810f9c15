//! Per-session feature extraction: one hop of captured audio in, follower
//! positions and note detections out.

use encore_audio::dsp::rms;
use encore_audio::{
    AnalysisFrame, AutoGain, BpmTracker, ChromaExtractor, EchoCanceller, Instrument, NoiseFilter,
    OnsetDetector, PitchDetector, SpectrumAnalyzer,
};
use encore_domain::DetectedNote;
use tracing::{debug, trace, warn};

use crate::config::EngineConfig;
use crate::error::SessionError;
use crate::follower::ScoreFollower;

/// One captured sample with the matching playback sample, when the caller
/// supplies a reference stream for echo cancellation.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CaptureSample {
    pub mic: f32,
    pub reference: Option<f32>,
}

impl CaptureSample {
    pub fn mic(mic: f32) -> Self {
        Self {
            mic,
            reference: None,
        }
    }
}

/// The follower advanced to template `frame` while analysing the hop that
/// starts at `timestamp`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FollowerEvent {
    pub frame: usize,
    pub timestamp: f64,
}

/// Everything the pipeline accumulated over a session.
#[derive(Debug, Clone, Default)]
pub struct PipelineOutput {
    pub detected: Vec<DetectedNote>,
    pub onsets: Vec<f64>,
    pub bpm_samples: Vec<f32>,
    pub hops: u64,
    pub final_position: usize,
}

/// Turns per-hop pitch detections into note events. A note is reported once
/// when it starts: right away if an onset armed the tracker, otherwise after
/// it has persisted for `stable_frames` hops.
#[derive(Debug, Clone)]
pub struct NoteTracker {
    stable_frames: usize,
    /// Reported pitches with the number of hops each has been missing.
    sounding: Vec<(u8, usize)>,
    pending: Vec<(DetectedNote, usize)>,
    armed: Option<(f64, usize)>,
}

impl NoteTracker {
    pub fn new(stable_frames: usize) -> Self {
        Self {
            stable_frames: stable_frames.max(1),
            sounding: Vec::new(),
            pending: Vec::new(),
            armed: None,
        }
    }

    pub fn update(&mut self, detections: &[DetectedNote], onset: Option<f64>) -> Vec<DetectedNote> {
        if let Some(at) = onset {
            self.armed = Some((at, 0));
        }
        if detections.is_empty() {
            self.sounding.clear();
            self.pending.clear();
            self.age_onset();
            return Vec::new();
        }

        let present = |midi: u8| detections.iter().any(|d| d.midi == midi);
        let stable = self.stable_frames;
        for (midi, missing) in self.sounding.iter_mut() {
            *missing = if present(*midi) { 0 } else { *missing + 1 };
        }
        self.sounding.retain(|(_, missing)| *missing < stable);
        self.pending.retain(|(note, _)| present(note.midi));
        let fresh: Vec<DetectedNote> = detections
            .iter()
            .filter(|d| !self.sounding.iter().any(|(m, _)| *m == d.midi))
            .copied()
            .collect();

        if let Some((at, waited)) = self.armed {
            if !fresh.is_empty() {
                self.armed = None;
                self.pending.clear();
                self.sounding.extend(fresh.iter().map(|d| (d.midi, 0)));
                return fresh
                    .into_iter()
                    .map(|d| DetectedNote { timestamp: at, ..d })
                    .collect();
            }
            if waited + 1 >= self.stable_frames {
                // Same pitches struck again.
                self.armed = None;
                return detections
                    .iter()
                    .map(|d| DetectedNote { timestamp: at, ..*d })
                    .collect();
            }
            self.armed = Some((at, waited + 1));
            return Vec::new();
        }

        for note in fresh {
            match self.pending.iter_mut().find(|(p, _)| p.midi == note.midi) {
                Some((_, seen)) => *seen += 1,
                None => self.pending.push((note, 1)),
            }
        }
        let mut emitted = Vec::new();
        self.pending.retain(|(note, seen)| {
            if *seen >= stable {
                emitted.push(*note);
                false
            } else {
                true
            }
        });
        self.sounding.extend(emitted.iter().map(|d| (d.midi, 0)));
        emitted
    }

    pub fn silence(&mut self) {
        self.update(&[], None);
    }

    fn age_onset(&mut self) {
        if let Some((at, waited)) = self.armed {
            self.armed = (waited + 1 < 2 * self.stable_frames).then_some((at, waited + 1));
        }
    }
}

pub struct FeaturePipeline {
    sample_rate: f32,
    hop_size: usize,
    pitch_window: usize,
    calibration_hops: u64,
    echo_filter_length: usize,
    echo_step_size: f32,
    window: Vec<f32>,
    scratch: Vec<f32>,
    spectrum: Vec<f32>,
    pending: Vec<f32>,
    analyzer: SpectrumAnalyzer,
    chroma: ChromaExtractor,
    noise: NoiseFilter,
    agc: AutoGain,
    echo: Option<EchoCanceller>,
    onset: OnsetDetector,
    bpm: BpmTracker,
    detector: Box<dyn PitchDetector>,
    tracker: NoteTracker,
    follower: ScoreFollower,
    hops: u64,
    output: PipelineOutput,
}

impl FeaturePipeline {
    pub fn new(
        config: &EngineConfig,
        instrument: Instrument,
        mut follower: ScoreFollower,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        let frame_size = config.frame_size(instrument);
        let sample_rate = config.sample_rate as f32;
        let analyzer = SpectrumAnalyzer::new(frame_size)?;
        let bins = analyzer.bins();
        follower.start();
        Ok(Self {
            sample_rate,
            hop_size: config.hop_size,
            pitch_window: config.pitch_window.min(frame_size),
            calibration_hops: (config.calibration_seconds / config.hop_seconds()).ceil() as u64,
            echo_filter_length: config.echo_filter_length,
            echo_step_size: config.echo_step_size,
            window: vec![0.0; frame_size],
            scratch: vec![0.0; frame_size],
            spectrum: vec![0.0; bins],
            pending: Vec::with_capacity(config.hop_size * 2),
            analyzer,
            chroma: ChromaExtractor::new(sample_rate, frame_size),
            noise: NoiseFilter::new(config.subtraction_factor, config.noise_gate),
            agc: AutoGain {
                target_rms: config.agc_target_rms,
                max_gain: config.agc_max_gain,
                ..AutoGain::default()
            },
            echo: None,
            onset: OnsetDetector::new(config.onset),
            bpm: BpmTracker::new(config.bpm_window, config.bpm_smoothing),
            detector: instrument.detector(sample_rate, frame_size, &config.pitch),
            tracker: NoteTracker::new(config.stable_frames),
            follower,
            hops: 0,
            output: PipelineOutput::default(),
        })
    }

    pub fn follower(&self) -> &ScoreFollower {
        &self.follower
    }

    pub fn detected(&self) -> &[DetectedNote] {
        &self.output.detected
    }

    /// Buffers samples and analyses every completed hop. `on_event` sees each
    /// forward move of the follower.
    pub fn push_samples(
        &mut self,
        samples: &[CaptureSample],
        mut on_event: impl FnMut(FollowerEvent),
    ) {
        for sample in samples {
            let cleaned = if let Some(reference) = sample.reference {
                self.cancel_echo(sample.mic, reference)
            } else if let Some(echo) = self.echo.as_mut() {
                echo.process_sample(sample.mic, 0.0)
            } else {
                sample.mic
            };
            self.pending.push(cleaned);
            if self.pending.len() == self.hop_size {
                if let Some(event) = self.process_hop() {
                    on_event(event);
                }
                self.pending.clear();
            }
        }
    }

    fn cancel_echo(&mut self, mic: f32, reference: f32) -> f32 {
        if self.echo.is_none() {
            match EchoCanceller::new(self.echo_filter_length, self.echo_step_size) {
                Ok(echo) => {
                    debug!("reference stream present, enabling echo cancellation");
                    self.echo = Some(echo);
                }
                Err(err) => {
                    warn!(%err, "echo canceller unavailable");
                    return mic;
                }
            }
        }
        self.echo
            .as_mut()
            .map_or(mic, |echo| echo.process_sample(mic, reference))
    }

    fn process_hop(&mut self) -> Option<FollowerEvent> {
        let hop = self.hop_size;
        let len = self.window.len();
        self.window.copy_within(hop.., 0);
        self.window[len - hop..].copy_from_slice(&self.pending);

        let timestamp = self.hops as f64 * hop as f64 / f64::from(self.sample_rate);
        self.hops += 1;
        let level = rms(&self.pending);

        self.scratch.copy_from_slice(&self.window);
        self.agc.apply(&mut self.scratch);
        match self.analyzer.magnitude(&self.scratch) {
            Ok(magnitude) => self.spectrum.copy_from_slice(magnitude),
            Err(err) => {
                warn!(%err, "spectrum failed, skipping hop");
                return None;
            }
        }

        // Only gated, onset-free hops inside the calibration span feed the
        // noise floor. A take that starts playing at once is never learned.
        let calibrating = self.hops <= self.calibration_hops;
        if calibrating && !self.noise.passes_gate(level) {
            if self.onset.detect(&self.spectrum, timestamp).is_none() {
                self.noise.observe_noise(&self.spectrum);
            }
            self.tracker.silence();
            return None;
        }
        self.noise.apply(&mut self.spectrum);

        let onset = self.onset.detect(&self.spectrum, timestamp);
        if let Some(event) = onset {
            self.output.onsets.push(event.timestamp);
            self.bpm.add_onset(event.timestamp);
            if let Some(bpm) = self.bpm.bpm() {
                self.output.bpm_samples.push(bpm);
            }
        }

        if !self.noise.passes_gate(level) {
            self.tracker.silence();
            return None;
        }

        let chroma = self.chroma.extract(&self.spectrum);
        let moved = self.follower.push_frame(&chroma);

        let frame = AnalysisFrame {
            samples: &self.scratch[len - self.pitch_window..],
            spectrum: &self.spectrum,
            timestamp,
        };
        let detections = self.detector.detect(&frame);
        let notes = self
            .tracker
            .update(&detections, onset.map(|event| event.timestamp));
        for note in &notes {
            trace!(midi = note.midi, timestamp = note.timestamp, "note detected");
        }
        self.output.detected.extend(notes);

        moved.map(|frame| FollowerEvent { frame, timestamp })
    }

    /// Stops following and hands back what was gathered. A trailing partial
    /// hop is discarded.
    pub fn finish(mut self) -> PipelineOutput {
        self.follower.stop();
        let mut output = std::mem::take(&mut self.output);
        output.hops = self.hops;
        output.final_position = self.follower.position();
        debug!(
            hops = output.hops,
            notes = output.detected.len(),
            onsets = output.onsets.len(),
            "pipeline finished"
        );
        output
    }
}
