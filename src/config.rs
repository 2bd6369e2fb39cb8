//! Processor configuration, loadable from a JSON file.
//! Missing fields fall back to the defaults below.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Samples per window row.
    pub window_size: usize,
    /// Rows stacked in the persistence window.
    pub persistence_size: usize,
    /// Samples per acquisition buffer.
    pub buffer_len: usize,
    /// Buffers pre-allocated in the pool arena.
    pub pool_capacity: usize,
    /// Idle sleep when the queue is empty or copying is gated off.
    pub backoff_us: u64,
    /// CSV destination for completed windows.
    pub sink_path: PathBuf,
    /// Fallback tracing filter when RUST_LOG is unset.
    pub log_filter: String,
    /// Emit logs as JSON lines instead of the human-readable format.
    pub log_json: bool,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            window_size: 1024,
            persistence_size: 32,
            buffer_len: 8192,
            pool_capacity: 64,
            backoff_us: 100,
            sink_path: PathBuf::from("dump.csv"),
            log_filter: "scope_link=debug".to_string(),
            log_json: false,
        }
    }
}

impl ProcessorConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: ProcessorConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            (self.window_size, "window_size"),
            (self.persistence_size, "persistence_size"),
            (self.buffer_len, "buffer_len"),
            (self.pool_capacity, "pool_capacity"),
        ];
        for (value, name) in checks {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be > 0")));
            }
        }
        Ok(())
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_micros(self.backoff_us)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scope.json");
        std::fs::write(&path, r#"{ "window_size": 10, "persistence_size": 2 }"#).unwrap();

        let config = ProcessorConfig::load_from_file(&path).unwrap();
        assert_eq!(config.window_size, 10);
        assert_eq!(config.persistence_size, 2);
        assert_eq!(config.buffer_len, 8192);
        assert_eq!(config.backoff(), Duration::from_micros(100));
        assert_eq!(config.sink_path, PathBuf::from("dump.csv"));
    }

    #[test]
    fn test_rejects_zero_sizes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scope.json");
        std::fs::write(&path, r#"{ "buffer_len": 0 }"#).unwrap();
        assert!(matches!(
            ProcessorConfig::load_from_file(&path),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_parse_and_io_errors() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            ProcessorConfig::load_from_file(&path),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            ProcessorConfig::load_from_file(&dir.path().join("absent.json")),
            Err(ConfigError::Io(_))
        ));
    }
}
