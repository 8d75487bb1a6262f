//! Worker Configuration
//!
//! Engine, worker thread and model store settings stored in TOML format.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Top-level settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Recognition engine settings
    pub engine: EngineSettings,
    /// Worker thread settings
    pub worker: WorkerSettings,
    /// Model cache settings
    pub models: ModelSettings,
}

/// Recognition engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Smallest progress increase worth reporting (0.0 - 1.0)
    pub progress_step: f32,
    /// Recognizer variables applied when the worker starts
    pub variables: BTreeMap<String, String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            progress_step: 0.01,
            variables: BTreeMap::new(),
        }
    }
}

/// Worker thread settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    /// Name given to the engine thread
    pub thread_name: String,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            thread_name: "ocr-engine".to_string(),
        }
    }
}

/// Model cache settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// Override for the model cache directory
    pub dir: Option<PathBuf>,
    /// Refuse network downloads
    pub offline: bool,
    /// Download timeout in seconds
    pub download_timeout_secs: u64,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            dir: None,
            offline: false,
            download_timeout_secs: 300,
        }
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<WorkerConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {:?}", path))?;
    let config: WorkerConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config {:?}", path))?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &WorkerConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = WorkerConfig::default();

        assert!(config.engine.variables.is_empty());
        assert!((config.engine.progress_step - 0.01).abs() < f32::EPSILON);
        assert_eq!(config.worker.thread_name, "ocr-engine");
        assert!(config.models.dir.is_none());
        assert!(!config.models.offline);
        assert_eq!(config.models.download_timeout_secs, 300);
    }

    #[test]
    fn test_config_with_custom_values() {
        let mut config = WorkerConfig::default();
        config
            .engine
            .variables
            .insert("tessedit_char_whitelist".to_string(), "0123456789".to_string());
        config.models.dir = Some(PathBuf::from("/tmp/models"));
        config.models.offline = true;

        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: WorkerConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(parsed, config);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let parsed: WorkerConfig = toml::from_str(
            r#"
            [engine.variables]
            user_defined_dpi = "300"

            [models]
            offline = true
            "#,
        )
        .unwrap();

        assert_eq!(parsed.engine.variables.get("user_defined_dpi").map(String::as_str), Some("300"));
        assert!((parsed.engine.progress_step - 0.01).abs() < f32::EPSILON);
        assert!(parsed.models.offline);
        assert_eq!(parsed.models.download_timeout_secs, 300);
        assert_eq!(parsed.worker.thread_name, "ocr-engine");
    }

    #[test]
    fn test_save_and_load_config() {
        let config = WorkerConfig::default();
        let temp_file = NamedTempFile::new().unwrap();

        save_config(&config, temp_file.path()).unwrap();
        let loaded = load_config(temp_file.path()).unwrap();

        assert_eq!(config, loaded);
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/path/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "this is not valid toml {{{{").unwrap();

        let result = load_config(temp_file.path());
        assert!(result.is_err());
    }
}
