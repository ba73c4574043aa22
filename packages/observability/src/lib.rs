//! Logging for the SnapSafe session tools.
//!
//! A binary installs the subscriber once with [`init_with_config`];
//! everything else just uses `tracing` macros.
//!
//! Events go to a JSONL file (`~/.snapsafe/logs/dev.jsonl` unless
//! overridden), one object per line, with credential-looking fields
//! redacted. A compact copy can be mirrored to stderr. `RUST_LOG` overrides
//! the configured level for both outputs.
//!
//! ```rust,ignore
//! observability::init_with_config(
//!     observability::LogConfig::for_service("snapsafe-session")
//!         .level("debug")
//!         .with_stderr(true),
//! );
//! tracing::info!("ready");
//! ```

mod file_writer;
mod json_layer;

use std::path::PathBuf;

pub use file_writer::{default_log_path, CentralLogWriter};
pub use json_layer::LogEntry;

/// Logging setup for one process.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Written into every line as `service`.
    pub service_name: String,
    /// Filter used when `RUST_LOG` is unset.
    pub default_level: String,
    /// JSONL destination; `None` means [`default_log_path`].
    pub log_path: Option<PathBuf>,
    pub also_stderr: bool,
}

impl LogConfig {
    pub fn for_service(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Self::default()
        }
    }

    pub fn level(mut self, level: impl Into<String>) -> Self {
        self.default_level = level.into();
        self
    }

    pub fn log_path(mut self, path: Option<PathBuf>) -> Self {
        self.log_path = path;
        self
    }

    pub fn with_stderr(mut self, enabled: bool) -> Self {
        self.also_stderr = enabled;
        self
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "snapsafe".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: false,
        }
    }
}

/// Install the global subscriber.
///
/// A log file that cannot be opened degrades to stderr-only output.
///
/// # Panics
///
/// Panics if a global subscriber was already installed.
pub fn init_with_config(config: LogConfig) {
    file_writer::init_file_subscriber(&config);
}

pub use tracing::{debug, error, info, instrument, trace, warn, Level};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LogConfig::default();
        assert_eq!(config.service_name, "snapsafe");
        assert_eq!(config.default_level, "info");
        assert!(config.log_path.is_none());
        assert!(!config.also_stderr);
    }

    #[test]
    fn test_builder() {
        let config = LogConfig::for_service("snapsafe-session")
            .level("debug")
            .log_path(Some(PathBuf::from("/tmp/session.jsonl")))
            .with_stderr(true);

        assert_eq!(config.service_name, "snapsafe-session");
        assert_eq!(config.default_level, "debug");
        assert_eq!(config.log_path, Some(PathBuf::from("/tmp/session.jsonl")));
        assert!(config.also_stderr);
    }
}
