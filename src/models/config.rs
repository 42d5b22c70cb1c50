//! Configuration models for lectio.
//!
//! Every storage location and retention knob is parameterized here and
//! resolved at runtime from a TOML file, falling back to defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration for lectio.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Storage settings for checkpoints, backups and metrics
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Where documents live and how backups are kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding `{session_id}.checkpoint.json` documents and their backups
    #[serde(default = "default_checkpoint_dir")]
    pub checkpoint_dir: PathBuf,

    /// Directory holding `{session_id}_metrics.json` documents
    #[serde(default = "default_metrics_dir")]
    pub metrics_dir: PathBuf,

    /// Copy the previous document aside before every checkpoint write
    #[serde(default = "default_true")]
    pub backup_on_save: bool,

    /// Age in days after which backup documents are removed by cleanup
    #[serde(default = "default_backup_retention_days")]
    pub backup_retention_days: u64,
}

fn default_checkpoint_dir() -> PathBuf {
    PathBuf::from(".cache/pipeline/checkpoints")
}

fn default_metrics_dir() -> PathBuf {
    PathBuf::from(".cache/metrics")
}

fn default_true() -> bool {
    true
}

fn default_backup_retention_days() -> u64 {
    7
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            checkpoint_dir: default_checkpoint_dir(),
            metrics_dir: default_metrics_dir(),
            backup_on_save: default_true(),
            backup_retention_days: default_backup_retention_days(),
        }
    }
}

impl StorageConfig {
    /// Checkpoint directory with `${VAR}` placeholders expanded.
    pub fn resolved_checkpoint_dir(&self) -> PathBuf {
        expand_path(&self.checkpoint_dir)
    }

    /// Metrics directory with `${VAR}` placeholders expanded.
    pub fn resolved_metrics_dir(&self) -> PathBuf {
        expand_path(&self.metrics_dir)
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_owned(),
            source: e,
        })?;

        Self::from_toml_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_owned(),
            source: e,
        })
    }

    /// Parse configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Load from `path` when given, otherwise use defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }
}

/// Expand environment variables in a string.
///
/// Supports ${VAR_NAME} syntax.
/// If the variable is not set, the placeholder is left unchanged.
pub fn expand_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    let re = match regex::Regex::new(r"\$\{([^}]+)\}") {
        Ok(re) => re,
        Err(_) => return result,
    };

    for cap in re.captures_iter(s) {
        let var_name = &cap[1];
        if let Ok(value) = std::env::var(var_name) {
            result = result.replace(&cap[0], &value);
        }
    }

    result
}

fn expand_path(path: &Path) -> PathBuf {
    PathBuf::from(expand_env_vars(&path.to_string_lossy()))
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_when_section_missing() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(
            config.storage.checkpoint_dir,
            PathBuf::from(".cache/pipeline/checkpoints")
        );
        assert_eq!(config.storage.metrics_dir, PathBuf::from(".cache/metrics"));
        assert!(config.storage.backup_on_save);
        assert_eq!(config.storage.backup_retention_days, 7);
    }

    #[test]
    fn test_partial_storage_section() {
        let config = Config::from_toml_str(
            r#"
[storage]
checkpoint_dir = "/var/lib/lectio/checkpoints"
backup_on_save = false
"#,
        )
        .unwrap();
        assert_eq!(
            config.storage.checkpoint_dir,
            PathBuf::from("/var/lib/lectio/checkpoints")
        );
        assert!(!config.storage.backup_on_save);
        assert_eq!(config.storage.metrics_dir, PathBuf::from(".cache/metrics"));
    }

    #[test]
    fn test_from_file_reports_parse_errors() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("lectio.toml");
        std::fs::write(&path, "[storage\ncheckpoint_dir = 3").unwrap();

        let err = Config::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));

        let missing = Config::from_file(&temp_dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(missing, ConfigError::FileRead { .. }));
    }

    #[test]
    fn test_load_or_default_without_path() {
        let config = Config::load_or_default(None).unwrap();
        assert_eq!(config.storage.backup_retention_days, 7);
    }

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("LECTIO_TEST_ROOT", "/srv/lectio");
        assert_eq!(
            expand_env_vars("${LECTIO_TEST_ROOT}/checkpoints"),
            "/srv/lectio/checkpoints"
        );
        assert_eq!(
            expand_env_vars("${LECTIO_TEST_UNSET_VAR}/x"),
            "${LECTIO_TEST_UNSET_VAR}/x"
        );
    }
}
