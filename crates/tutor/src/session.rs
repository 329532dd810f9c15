//! A practice session: score in, live audio through the worker, grade out.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use encore_audio::{AudioBackend, Instrument, StreamConfig, StreamHandle};
use encore_domain::{Measure, ScoringResult, SessionReport, ToleranceConfig};
use ringbuf::{HeapConsumer, HeapProducer, HeapRb};
use time::OffsetDateTime;
use tracing::{debug, info, instrument, warn};

use crate::config::EngineConfig;
use crate::cursor::{CursorEvent, CursorUpdate, ScoreCursor};
use crate::error::SessionError;
use crate::follower::{measure_at_time, score_chroma, ScoreFollower};
use crate::library::ScoreLibrary;
use crate::pipeline::{CaptureSample, FeaturePipeline, FollowerEvent, PipelineOutput};
use crate::scoring::{Evaluation, ScoringEngine, ScoringInput};
use crate::worker::AnalysisWorker;

const MIN_TARGET_BPM: f32 = 10.0;
const MAX_TARGET_BPM: f32 = 400.0;
const CAPTURE_BUFFER: u32 = 512;

pub struct SessionOptions {
    pub instrument: Instrument,
    pub engine: EngineConfig,
    /// Capture backend that feeds the session directly. Without one the
    /// caller pushes audio with [`Session::push_audio_frame`].
    pub input: Option<Box<dyn AudioBackend>>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            instrument: Instrument::Cello,
            engine: EngineConfig::default(),
            input: None,
        }
    }
}

impl SessionOptions {
    pub fn new(instrument: Instrument) -> Self {
        Self {
            instrument,
            ..Self::default()
        }
    }

    pub fn with_engine(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_input(mut self, backend: Box<dyn AudioBackend>) -> Self {
        self.input = Some(backend);
        self
    }
}

/// Everything a finished session produced.
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub score_id: String,
    pub target_bpm: f32,
    pub started_at: OffsetDateTime,
    pub finished_at: OffsetDateTime,
    pub evaluation: Evaluation,
    pub output: PipelineOutput,
    pub dropped_samples: u64,
}

impl SessionOutcome {
    pub fn result(&self) -> &ScoringResult {
        &self.evaluation.result
    }

    pub fn report(&self) -> SessionReport {
        SessionReport {
            score_id: self.score_id.clone(),
            started_at: self.started_at,
            finished_at: self.finished_at,
            target_bpm: self.target_bpm,
            result: self.evaluation.result.clone(),
        }
    }
}

/// One live session. Owns its pipeline worker and, optionally, a capture
/// stream; both are released when the session is stopped, cancelled or
/// dropped.
pub struct Session {
    score_id: String,
    target_bpm: f32,
    tolerance: ToleranceConfig,
    instrument: Instrument,
    hop_seconds: f64,
    measures: Vec<Measure>,
    producer: Option<HeapProducer<CaptureSample>>,
    events: HeapConsumer<FollowerEvent>,
    cursor: ScoreCursor,
    dropped: Arc<AtomicU64>,
    stream: Option<StreamHandle>,
    worker: Option<AnalysisWorker>,
    started_at: OffsetDateTime,
}

impl Session {
    #[instrument(skip(library, tolerance, options), fields(instrument = %options.instrument))]
    pub fn start(
        library: &dyn ScoreLibrary,
        score_id: &str,
        target_bpm: f32,
        tolerance: ToleranceConfig,
        options: SessionOptions,
    ) -> Result<Session, SessionError> {
        if !(MIN_TARGET_BPM..=MAX_TARGET_BPM).contains(&target_bpm) {
            return Err(SessionError::InvalidTargetBpm(target_bpm));
        }
        tolerance.validate()?;
        let SessionOptions {
            instrument,
            engine,
            input,
        } = options;
        engine.validate()?;

        let score = library.load(score_id)?.timed(target_bpm)?;
        let measures = score.merged_measures();
        let hop_seconds = engine.hop_seconds();
        let template = score_chroma(&score, hop_seconds);
        debug!(frames = template.nrows(), measures = measures.len(), "score template ready");
        let follower = ScoreFollower::new(template, engine.follower_window, engine.follower_rows);
        let pipeline = FeaturePipeline::new(&engine, instrument, follower)?;

        let (mut producer, consumer) = HeapRb::<CaptureSample>::new(engine.ring_capacity).split();
        let (event_tx, events) = HeapRb::<FollowerEvent>::new(engine.event_capacity).split();
        let worker = AnalysisWorker::spawn(pipeline, consumer, event_tx, engine.hop_size)?;

        let dropped = Arc::new(AtomicU64::new(0));
        let (producer, stream) = match input {
            Some(backend) => {
                let config = StreamConfig {
                    sample_rate: engine.sample_rate,
                    channels: 1,
                    buffer_size: CAPTURE_BUFFER,
                };
                let counter = Arc::clone(&dropped);
                let callback = Box::new(move |samples: &[f32]| {
                    let mut iter = samples.iter().copied().map(CaptureSample::mic);
                    let accepted = producer.push_iter(&mut iter);
                    let rejected = samples.len() - accepted;
                    if rejected > 0 {
                        counter.fetch_add(rejected as u64, Ordering::Relaxed);
                    }
                });
                // A failed open drops `worker`, joining the thread.
                (None, Some(backend.open_stream(&config, callback)?))
            }
            None => (Some(producer), None),
        };

        let mut cursor = ScoreCursor::new();
        cursor.handle(CursorEvent::Start);
        info!(score_id, target_bpm, live = stream.is_some(), "session started");

        Ok(Session {
            score_id: score_id.to_string(),
            target_bpm,
            tolerance,
            instrument,
            hop_seconds,
            measures,
            producer,
            events,
            cursor,
            dropped,
            stream,
            worker: Some(worker),
            started_at: OffsetDateTime::now_utc(),
        })
    }

    pub fn score_id(&self) -> &str {
        &self.score_id
    }

    pub fn started_at(&self) -> OffsetDateTime {
        self.started_at
    }

    pub fn cursor(&self) -> &ScoreCursor {
        &self.cursor
    }

    pub fn dropped_samples(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Queues mono samples for analysis and returns how many were accepted.
    /// Never blocks: whatever does not fit in the ring is dropped and counted.
    pub fn push_audio_frame(&mut self, samples: &[f32]) -> Result<usize, SessionError> {
        let mut iter = samples.iter().copied().map(CaptureSample::mic);
        self.push(&mut iter, samples.len())
    }

    /// Like [`Session::push_audio_frame`] with the matching playback samples,
    /// which enables echo cancellation. Extra samples on either side are
    /// ignored.
    pub fn push_audio_frame_with_reference(
        &mut self,
        mic: &[f32],
        reference: &[f32],
    ) -> Result<usize, SessionError> {
        let len = mic.len().min(reference.len());
        let mut iter = mic.iter().zip(reference).map(|(&mic, &reference)| CaptureSample {
            mic,
            reference: Some(reference),
        });
        self.push(&mut iter, len)
    }

    fn push(
        &mut self,
        iter: &mut impl Iterator<Item = CaptureSample>,
        len: usize,
    ) -> Result<usize, SessionError> {
        let producer = self
            .producer
            .as_mut()
            .ok_or(SessionError::InputOwnedByDevice)?;
        let accepted = producer.push_iter(iter);
        if accepted < len {
            self.dropped
                .fetch_add((len - accepted) as u64, Ordering::Relaxed);
        }
        Ok(accepted)
    }

    /// Drains the follower's position events and returns the measure changes
    /// the cursor made.
    pub fn poll_cursor(&mut self) -> Vec<CursorUpdate> {
        let mut updates = Vec::new();
        while let Some(event) = self.events.pop() {
            let time = event.frame as f64 * self.hop_seconds;
            let Some(measure) = measure_at_time(&self.measures, time) else {
                continue;
            };
            if let Some(update) = self.cursor.handle(CursorEvent::Position {
                frame: event.frame,
                measure,
            }) {
                debug!(measure = update.measure, at = event.timestamp, "cursor moved");
                updates.push(update);
            }
        }
        updates
    }

    /// Stops capture, waits for the worker to drain and grades the take.
    pub fn stop(self) -> Result<ScoringResult, SessionError> {
        Ok(self.finish()?.evaluation.result)
    }

    #[instrument(skip(self), fields(score_id = %self.score_id))]
    pub fn finish(mut self) -> Result<SessionOutcome, SessionError> {
        self.stream.take();
        self.producer.take();
        let worker = self
            .worker
            .take()
            .ok_or_else(|| SessionError::Worker("session already finished".into()))?;
        let output = worker.finish()?;
        self.poll_cursor();
        self.cursor.handle(CursorEvent::Stop);

        let input = ScoringInput {
            measures: &self.measures,
            detected: &output.detected,
            bpm_samples: &output.bpm_samples,
            target_bpm: self.target_bpm,
            tolerance: self.tolerance,
            polyphonic: self.instrument.is_polyphonic(),
        };
        let evaluation = ScoringEngine.evaluate(&input);
        let dropped_samples = self.dropped_samples();
        if dropped_samples > 0 {
            warn!(dropped_samples, "capture overran the analysis ring");
        }
        info!(
            total = evaluation.result.total,
            notes = output.detected.len(),
            "session graded"
        );

        Ok(SessionOutcome {
            score_id: std::mem::take(&mut self.score_id),
            target_bpm: self.target_bpm,
            started_at: self.started_at,
            finished_at: OffsetDateTime::now_utc(),
            evaluation,
            output,
            dropped_samples,
        })
    }

    /// Releases the device and worker without grading.
    pub fn cancel(mut self) {
        self.teardown();
        self.cursor.handle(CursorEvent::Stop);
        info!(score_id = %self.score_id, "session cancelled");
    }

    fn teardown(&mut self) {
        // The stream goes first so the callback stops feeding the ring.
        self.stream.take();
        self.producer.take();
        self.worker.take();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.teardown();
    }
}
