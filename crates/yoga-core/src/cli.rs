//! Shared CLI helpers for workspace tools.

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::{Error, Result};

pub fn setup_cli_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .try_init()
        .map_err(|e| Error::Config(format!("Failed to initialize logger: {e}")))?;

    Ok(())
}

pub fn load_toml_config<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned,
{
    let content = fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read config {}: {e}", path.display())))?;

    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse config {}: {e}", path.display())))
}

/// Writes a pretty-printed JSON report, creating parent directories as needed
pub fn write_json_report<T>(path: &Path, report: &T) -> Result<()>
where
    T: Serialize,
{
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(report)?)?;
    debug!("Wrote report {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PipelineConfig;
    use tempfile::TempDir;

    #[test]
    fn test_load_toml_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pipeline.toml");
        fs::write(&path, "split_root = \"out/split\"\n[balance]\ntarget_per_class = 2000\n").unwrap();

        let config: PipelineConfig = load_toml_config(&path).unwrap();
        assert_eq!(config.split_root, Path::new("out/split"));
        assert_eq!(config.balance.target_per_class, Some(2000));
    }

    #[test]
    fn test_load_toml_config_missing_file() {
        let dir = TempDir::new().unwrap();
        let result: Result<PipelineConfig> = load_toml_config(&dir.path().join("absent.toml"));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_write_json_report_creates_parents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("reports").join("split.json");
        write_json_report(&path, &serde_json::json!({ "train": 8 })).unwrap();

        let written = fs::read_to_string(&path).unwrap();
        assert!(written.contains("\"train\": 8"));
    }
}
