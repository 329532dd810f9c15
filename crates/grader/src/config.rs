use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use encore_tutor::EngineConfig;
use tracing::debug;

/// Reads an engine configuration from YAML (`.yaml`/`.yml`) or JSON. Missing
/// fields keep their defaults.
pub fn load_engine_config(path: &Path) -> Result<EngineConfig> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    let config: EngineConfig = match extension.as_deref() {
        Some("yaml") | Some("yml") => serde_yaml::from_str(&text)
            .with_context(|| format!("invalid YAML in {}", path.display()))?,
        Some("json") => serde_json::from_str(&text)
            .with_context(|| format!("invalid JSON in {}", path.display()))?,
        _ => bail!("unsupported config format: {}", path.display()),
    };
    config.validate()?;
    debug!(path = %path.display(), "engine config loaded");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_temp(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("encore-{}-{name}", std::process::id()));
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn yaml_overrides_defaults() {
        let path = write_temp("engine.yaml", "hop_size: 512\nfollower_window: 80\n");
        let config = load_engine_config(&path).unwrap();
        assert_eq!(config.hop_size, 512);
        assert_eq!(config.follower_window, 80);
        assert_eq!(config.sample_rate, EngineConfig::default().sample_rate);
        fs::remove_file(path).ok();
    }

    #[test]
    fn json_is_validated() {
        let path = write_temp("engine.json", r#"{"hop_size": 0}"#);
        assert!(load_engine_config(&path).is_err());
        fs::remove_file(path).ok();
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let path = write_temp("engine.toml", "hop_size = 512");
        assert!(load_engine_config(&path).is_err());
        fs::remove_file(path).ok();
    }
}
