use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use ringbuf::{HeapConsumer, HeapProducer};
use tracing::{debug, warn};

use crate::error::SessionError;
use crate::pipeline::{CaptureSample, FeaturePipeline, FollowerEvent, PipelineOutput};

const IDLE_SLEEP: Duration = Duration::from_millis(2);

/// Analysis thread draining the capture ring. Dropping the handle stops and
/// joins the thread.
pub(crate) struct AnalysisWorker {
    stop: Arc<AtomicBool>,
    dropped_events: Arc<AtomicU64>,
    thread: Option<JoinHandle<PipelineOutput>>,
}

impl AnalysisWorker {
    pub(crate) fn spawn(
        mut pipeline: FeaturePipeline,
        mut samples: HeapConsumer<CaptureSample>,
        mut events: HeapProducer<FollowerEvent>,
        chunk: usize,
    ) -> Result<Self, SessionError> {
        let stop = Arc::new(AtomicBool::new(false));
        let dropped_events = Arc::new(AtomicU64::new(0));
        let thread_stop = Arc::clone(&stop);
        let thread_dropped = Arc::clone(&dropped_events);

        let thread = thread::Builder::new()
            .name("encore-analysis".into())
            .spawn(move || {
                let mut buffer = vec![CaptureSample::default(); chunk.max(1)];
                loop {
                    let read = samples.pop_slice(&mut buffer);
                    if read > 0 {
                        pipeline.push_samples(&buffer[..read], |event| {
                            if events.push(event).is_err() {
                                thread_dropped.fetch_add(1, Ordering::Relaxed);
                            }
                        });
                        continue;
                    }
                    if thread_stop.load(Ordering::Acquire) {
                        if samples.is_empty() {
                            break;
                        }
                        continue;
                    }
                    thread::sleep(IDLE_SLEEP);
                }
                pipeline.finish()
            })
            .map_err(|err| SessionError::Worker(err.to_string()))?;

        debug!("analysis worker started");
        Ok(Self {
            stop,
            dropped_events,
            thread: Some(thread),
        })
    }

    /// Lets the worker drain what is queued, then collects its output.
    pub(crate) fn finish(mut self) -> Result<PipelineOutput, SessionError> {
        self.stop.store(true, Ordering::Release);
        let thread = self
            .thread
            .take()
            .ok_or_else(|| SessionError::Worker("worker already joined".into()))?;
        let output = thread
            .join()
            .map_err(|_| SessionError::Worker("analysis thread panicked".into()))?;
        let dropped = self.dropped_events.load(Ordering::Relaxed);
        if dropped > 0 {
            warn!(dropped, "follower events were dropped");
        }
        Ok(output)
    }
}

impl Drop for AnalysisWorker {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("analysis thread panicked during teardown");
            }
        }
    }
}
