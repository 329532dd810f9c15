use std::path::PathBuf;

use clap::Parser;
use encore_audio::Instrument;
use encore_domain::SkillLevel;
use encore_grader::{load_engine_config, GradeJob, GradeReport, GradingPipeline};
use encore_tutor::EngineConfig;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Grade a recorded performance against a MusicXML score", long_about = None)]
struct Cli {
    /// Path to the MusicXML score
    score: String,
    /// Path to the recording (wav, flac, mp3, ogg, aac)
    recording: String,
    /// Target tempo in beats per minute
    #[arg(long, default_value_t = 100.0)]
    bpm: f32,
    /// Skill level used for tolerances: beginner, intermediate or advanced
    #[arg(long, default_value = "intermediate")]
    level: SkillLevel,
    /// Instrument played in the recording: cello or piano
    #[arg(long, default_value = "cello")]
    instrument: Instrument,
    /// Optional engine config (.yaml, .yml or .json)
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let engine = match &cli.config {
        Some(path) => load_engine_config(path)?,
        None => EngineConfig::default(),
    };
    let pipeline = GradingPipeline::new(engine);
    let job = GradeJob {
        score_path: cli.score,
        audio_path: cli.recording,
        target_bpm: cli.bpm,
        level: cli.level,
        instrument: cli.instrument,
    };
    let outcome = pipeline.grade(&job)?;
    println!("{}", GradeReport::new(&job, &outcome).to_json_pretty()?);
    Ok(())
}
