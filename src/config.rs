//! Runtime configuration
//!
//! Every timing knob the orchestration layer uses, loaded from YAML. Missing
//! sections and fields take their defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Transaction queue retry policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Retries after the first attempt when a nonce conflict is detected.
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            retry_backoff_ms: 1000,
        }
    }
}

impl QueueConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CreationConfig {
    /// Pause between consecutive submissions of one batch.
    pub submission_spacing_ms: u64,
    pub max_batch_size: usize,
}

impl Default for CreationConfig {
    fn default() -> Self {
        Self {
            submission_spacing_ms: 1000,
            max_batch_size: 10,
        }
    }
}

impl CreationConfig {
    pub fn submission_spacing(&self) -> Duration {
        Duration::from_millis(self.submission_spacing_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateConfig {
    /// Delay between a content update and the split node's creation.
    pub split_settle_ms: u64,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            split_settle_ms: 3000,
        }
    }
}

impl UpdateConfig {
    pub fn split_settle(&self) -> Duration {
        Duration::from_millis(self.split_settle_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    pub submission_spacing_ms: u64,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            submission_spacing_ms: 1000,
        }
    }
}

impl ImportConfig {
    pub fn submission_spacing(&self) -> Duration {
        Duration::from_millis(self.submission_spacing_ms)
    }
}

/// Sampling defaults applied when a request leaves them unset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationDefaults {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoomConfig {
    pub queue: QueueConfig,
    pub creation: CreationConfig,
    pub update: UpdateConfig,
    pub import: ImportConfig,
    pub generation: GenerationDefaults,
}

impl LoomConfig {
    /// Parse from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from an explicit file. A missing file is an error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&yaml)
    }

    /// Load from `path`, or from the default location when none is given.
    /// A missing default file yields the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => Self::load(p),
            None => match default_config_path() {
                Some(p) if p.exists() => Self::load(&p),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.creation.max_batch_size == 0 {
            return Err(ConfigError::Invalid(
                "creation.max_batch_size must be at least 1".into(),
            ));
        }
        if let Some(t) = self.generation.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(ConfigError::Invalid(format!(
                    "generation.temperature {} outside 0.0..=2.0",
                    t
                )));
            }
        }
        Ok(())
    }
}

/// `<config_dir>/loomchain/config.yaml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("loomchain").join("config.yaml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_documented_timings() {
        let config = LoomConfig::default();
        assert_eq!(config.queue.max_retries, 2);
        assert_eq!(config.queue.retry_backoff(), Duration::from_secs(1));
        assert_eq!(config.creation.submission_spacing(), Duration::from_secs(1));
        assert_eq!(config.update.split_settle(), Duration::from_secs(3));
        assert_eq!(config.import.submission_spacing(), Duration::from_secs(1));
    }

    #[test]
    fn partial_yaml_keeps_other_defaults() {
        let config = LoomConfig::from_yaml("creation:\n  submission_spacing_ms: 0\n").unwrap();
        assert_eq!(config.creation.submission_spacing_ms, 0);
        assert_eq!(config.creation.max_batch_size, 10);
        assert_eq!(config.queue, QueueConfig::default());
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(LoomConfig::from_yaml("creation:\n  max_batch_size: 0\n").is_err());
        assert!(LoomConfig::from_yaml("generation:\n  temperature: 9.5\n").is_err());
        assert!(LoomConfig::from_yaml("queue: [1, 2]").is_err());
    }

    #[test]
    fn loads_from_file_and_round_trips_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "queue:\n  max_retries: 4\nupdate:\n  split_settle_ms: 10").unwrap();

        let config = LoomConfig::load(file.path()).unwrap();
        assert_eq!(config.queue.max_retries, 4);
        assert_eq!(config.update.split_settle_ms, 10);

        let reparsed = LoomConfig::from_yaml(&config.to_yaml().unwrap()).unwrap();
        assert_eq!(reparsed, config);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let err = LoomConfig::load(Path::new("/nonexistent/loomchain.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
