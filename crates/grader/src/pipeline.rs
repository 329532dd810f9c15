use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use encore_audio::io::AudioDecoder;
use encore_audio::Instrument;
use encore_domain::{SkillLevel, ToleranceConfig};
use encore_tutor::{EngineConfig, InMemoryLibrary, Session, SessionOptions, SessionOutcome};

/// Samples handed to the session per push, matching a capture buffer.
const CHUNK: usize = 512;
const RING_FULL_BACKOFF: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradeJob {
    pub score_path: String,
    pub audio_path: String,
    pub target_bpm: f32,
    pub level: SkillLevel,
    pub instrument: Instrument,
}

impl GradeJob {
    /// Score id reported for the job: the score file's stem.
    pub fn score_id(&self) -> String {
        Path::new(&self.score_path)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("score")
            .to_string()
    }
}

/// Streams a decoded recording through a session as if it were live input.
pub struct GradingPipeline {
    engine: EngineConfig,
}

impl GradingPipeline {
    pub fn new(engine: EngineConfig) -> Self {
        Self { engine }
    }

    #[instrument(skip(self), fields(score = %job.score_path, audio = %job.audio_path))]
    pub fn grade(&self, job: &GradeJob) -> Result<SessionOutcome> {
        let document = fs::read_to_string(&job.score_path)
            .with_context(|| format!("failed to read score {}", job.score_path))?;
        let score_id = job.score_id();
        let mut library = InMemoryLibrary::new();
        library.insert(score_id.clone(), document);

        info!("loading audio path={}", job.audio_path);
        let audio = AudioDecoder::open(&job.audio_path)?;
        let mut engine = self.engine.clone();
        if audio.sample_rate != engine.sample_rate {
            warn!(
                recording = audio.sample_rate,
                configured = engine.sample_rate,
                "analysing at the recording's sample rate"
            );
            engine.sample_rate = audio.sample_rate;
        }

        let options = SessionOptions::new(job.instrument).with_engine(engine);
        let tolerance = ToleranceConfig::for_level(job.level);
        let mut session = Session::start(&library, &score_id, job.target_bpm, tolerance, options)
            .with_context(|| format!("failed to start session for {score_id}"))?;

        for chunk in audio.samples.chunks(CHUNK) {
            let mut offset = 0;
            while offset < chunk.len() {
                let accepted = session.push_audio_frame(&chunk[offset..])?;
                if accepted == 0 {
                    thread::sleep(RING_FULL_BACKOFF);
                }
                offset += accepted;
            }
            session.poll_cursor();
        }

        let outcome = session.finish()?;
        info!(
            total = outcome.result().total,
            seconds = audio.duration_seconds(),
            "recording graded"
        );
        Ok(outcome)
    }
}

impl Default for GradingPipeline {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(score_path: &str, audio_path: &str) -> GradeJob {
        GradeJob {
            score_path: score_path.to_string(),
            audio_path: audio_path.to_string(),
            target_bpm: 100.0,
            level: SkillLevel::Beginner,
            instrument: Instrument::Cello,
        }
    }

    #[test]
    fn missing_score_is_an_error() {
        let pipeline = GradingPipeline::default();
        assert!(pipeline.grade(&job("missing.musicxml", "missing.wav")).is_err());
    }

    #[test]
    fn missing_audio_is_an_error() {
        let path = std::env::temp_dir().join(format!("encore-{}-etude.musicxml", std::process::id()));
        fs::write(
            &path,
            r#"<score-partwise><part id="P1"><measure>
                <note><pitch><step>C</step><octave>3</octave></pitch><duration>1</duration></note>
            </measure></part></score-partwise>"#,
        )
        .unwrap();
        let pipeline = GradingPipeline::default();
        let result = pipeline.grade(&job(path.to_str().unwrap(), "missing.wav"));
        assert!(result.is_err());
        fs::remove_file(path).ok();
    }

    #[test]
    fn score_id_is_the_file_stem() {
        assert_eq!(job("scores/bach-prelude.musicxml", "a.wav").score_id(), "bach-prelude");
    }
}
