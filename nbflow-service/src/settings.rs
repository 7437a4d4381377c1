// Settings
// User configuration loaded from ~/.nbflow/config.yaml

use crate::error::{ServiceError, ServiceResult};
use crate::notebook::METADATA_KEY;

use nbflow_rpc::envelope::DEFAULT_ENTRY_MODULE;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Client settings
///
/// Every field is optional in the file; missing ones take the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Seconds between run status polls
    pub run_poll_interval: f64,
    /// Seconds between tuning experiment polls
    pub experiment_poll_interval: f64,
    /// Seconds between snapshot task polls
    pub snapshot_poll_interval: f64,
    /// Python module exposing the RPC dispatcher
    pub entry_module: String,
    /// Interpreter for the subprocess kernel; discovered on PATH when unset
    pub python: Option<PathBuf>,
    /// Notebook metadata key holding the deployment configuration
    pub metadata_key: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            run_poll_interval: 2.0,
            experiment_poll_interval: 5.0,
            snapshot_poll_interval: 1.0,
            entry_module: DEFAULT_ENTRY_MODULE.to_string(),
            python: None,
            metadata_key: METADATA_KEY.to_string(),
        }
    }
}

impl Settings {
    /// Default location of the settings file (~/.nbflow/config.yaml)
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".nbflow")
            .join("config.yaml")
    }

    /// Load from the default location, using defaults if the file is absent
    pub fn load() -> ServiceResult<Self> {
        let path = Self::default_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: impl AsRef<Path>) -> ServiceResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let settings = Self::from_yaml(&content)
            .map_err(|e| ServiceError::Config(format!("{}: {}", path.display(), e)))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn parse(content: &str) -> ServiceResult<Self> {
        let settings =
            Self::from_yaml(content).map_err(|e| ServiceError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }

    fn validate(&self) -> ServiceResult<()> {
        for (name, value) in [
            ("run_poll_interval", self.run_poll_interval),
            ("experiment_poll_interval", self.experiment_poll_interval),
            ("snapshot_poll_interval", self.snapshot_poll_interval),
        ] {
            if value < 0.0 || Duration::try_from_secs_f64(value).is_err() {
                return Err(ServiceError::Config(format!(
                    "{} must be a non-negative number of seconds that fits a duration",
                    name
                )));
            }
        }
        if self.entry_module.trim().is_empty() {
            return Err(ServiceError::Config(
                "entry_module must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn run_interval(&self) -> Duration {
        interval(self.run_poll_interval)
    }

    pub fn experiment_interval(&self) -> Duration {
        interval(self.experiment_poll_interval)
    }

    pub fn snapshot_interval(&self) -> Duration {
        interval(self.snapshot_poll_interval)
    }
}

/// Seconds as a duration; out-of-range values saturate instead of panicking
fn interval(seconds: f64) -> Duration {
    if seconds.is_nan() || seconds <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.run_interval(), Duration::from_secs(2));
        assert_eq!(settings.experiment_interval(), Duration::from_secs(5));
        assert_eq!(settings.snapshot_interval(), Duration::from_secs(1));
        assert_eq!(settings.metadata_key, "kubeflow_notebook");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let settings =
            Settings::parse("run_poll_interval: 0.5\npython: /usr/bin/python3\n").unwrap();
        assert_eq!(settings.run_interval(), Duration::from_millis(500));
        assert_eq!(settings.experiment_interval(), Duration::from_secs(5));
        assert_eq!(settings.python, Some(PathBuf::from("/usr/bin/python3")));
    }

    #[test]
    fn test_rejects_negative_interval() {
        let err = Settings::parse("snapshot_poll_interval: -1").unwrap_err();
        assert!(matches!(err, ServiceError::Config(_)));
    }

    #[test]
    fn test_rejects_interval_too_large_for_a_duration() {
        let err = Settings::parse("run_poll_interval: 1.0e30").unwrap_err();
        assert!(err.to_string().contains("run_poll_interval"));

        let settings = Settings {
            run_poll_interval: 1.0e30,
            experiment_poll_interval: f64::NAN,
            ..Default::default()
        };
        assert_eq!(settings.run_interval(), Duration::MAX);
        assert_eq!(settings.experiment_interval(), Duration::ZERO);
    }

    #[test]
    fn test_validation_error_is_not_wrapped_twice() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "snapshot_poll_interval: -1\n").unwrap();

        let message = Settings::load_from(&path).unwrap_err().to_string();
        assert_eq!(message.matches("Configuration error").count(), 1);
        assert!(message.starts_with("Configuration error: snapshot_poll_interval"));
    }

    #[test]
    fn test_broken_file_names_its_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "run_poll_interval: [1, 2\n").unwrap();

        let message = Settings::load_from(&path).unwrap_err().to_string();
        assert!(message.contains("config.yaml"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "entry_module: custom.rpc\n").unwrap();

        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.entry_module, "custom.rpc");
    }
}
