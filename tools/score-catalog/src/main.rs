use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use encore_domain::{estimate_difficulty, parse_musicxml, DifficultyFactors, DifficultyLevel};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Print catalog metadata for a directory of MusicXML scores"
)]
struct Args {
    /// Directory holding .xml or .musicxml files
    dir: PathBuf,
    /// Pretty-print each record
    #[arg(long)]
    pretty: bool,
}

#[derive(Debug, Serialize)]
struct CatalogRecord {
    file: String,
    title: String,
    composer: String,
    measures: u32,
    parts: usize,
    notes: usize,
    difficulty: u8,
    level: DifficultyLevel,
    factors: DifficultyFactors,
}

fn is_score(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| matches!(ext.to_ascii_lowercase().as_str(), "xml" | "musicxml"))
}

fn catalog(path: &Path) -> Result<CatalogRecord> {
    let text =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let score = parse_musicxml(&text).with_context(|| format!("failed to parse {}", path.display()))?;
    let difficulty = estimate_difficulty(&score);
    Ok(CatalogRecord {
        file: path.display().to_string(),
        title: score.title.clone(),
        composer: score.composer.clone(),
        measures: score.total_measures,
        parts: score.parts.len(),
        notes: score.note_count(),
        difficulty: difficulty.score,
        level: difficulty.level,
        factors: difficulty.factors,
    })
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let mut paths: Vec<PathBuf> = fs::read_dir(&args.dir)
        .with_context(|| format!("failed to list {}", args.dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && is_score(path))
        .collect();
    paths.sort();

    let mut cataloged = 0;
    for path in &paths {
        match catalog(path) {
            Ok(record) => {
                let line = if args.pretty {
                    serde_json::to_string_pretty(&record)?
                } else {
                    serde_json::to_string(&record)?
                };
                println!("{line}");
                cataloged += 1;
            }
            Err(err) => warn!(path = %path.display(), error = %format!("{err:#}"), "skipping score"),
        }
    }
    info!(cataloged, skipped = paths.len() - cataloged, "catalog complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_score_extensions() {
        assert!(is_score(Path::new("a/prelude.musicxml")));
        assert!(is_score(Path::new("minuet.XML")));
        assert!(!is_score(Path::new("notes.txt")));
        assert!(!is_score(Path::new("README")));
    }

    #[test]
    fn catalogs_a_score_file() {
        let path = std::env::temp_dir().join(format!("catalog-{}.musicxml", std::process::id()));
        fs::write(
            &path,
            r#"<score-partwise>
                <work><work-title>Minuet</work-title></work>
                <part id="P1"><measure>
                    <attributes><divisions>1</divisions></attributes>
                    <note><pitch><step>G</step><octave>4</octave></pitch><duration>1</duration></note>
                </measure></part>
            </score-partwise>"#,
        )
        .unwrap();
        let record = catalog(&path).unwrap();
        assert_eq!(record.title, "Minuet");
        assert_eq!(record.measures, 1);
        assert_eq!(record.notes, 1);
        assert!((1..=10).contains(&record.difficulty));
        fs::remove_file(path).ok();
    }
}
