//! Logging initialization.
//!
//! Thin wrapper over the observability crate: structured JSONL goes to
//! `~/.snapsafe/logs/dev.jsonl` (or the given path) and a compact copy to
//! stderr.

use observability::LogConfig;
use std::path::PathBuf;

const DEFAULT_SERVICE_NAME: &str = "snapsafe-session";

/// Initialize logging for the session tools.
///
/// `level` is the default filter; `RUST_LOG` still wins when set.
///
/// ```ignore
/// init_logging("info", None);
/// tracing::info!("started");
/// ```
pub fn init_logging(level: &str, log_path: Option<PathBuf>) {
    init_logging_for_service(DEFAULT_SERVICE_NAME, level, log_path);
}

/// Initialize logging with a custom service name.
pub fn init_logging_for_service(service_name: &str, level: &str, log_path: Option<PathBuf>) {
    observability::init_with_config(
        LogConfig::for_service(service_name)
            .level(parse_level(level).to_string().to_ascii_lowercase())
            .log_path(log_path)
            .with_stderr(true),
    );
}

/// Parse a log level string into a tracing Level.
pub fn parse_level(level: &str) -> tracing::Level {
    match level.trim().to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" | "warning" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_level_all_variants() {
        assert_eq!(parse_level("trace"), tracing::Level::TRACE);
        assert_eq!(parse_level("debug"), tracing::Level::DEBUG);
        assert_eq!(parse_level("info"), tracing::Level::INFO);
        assert_eq!(parse_level("warn"), tracing::Level::WARN);
        assert_eq!(parse_level("warning"), tracing::Level::WARN);
        assert_eq!(parse_level("error"), tracing::Level::ERROR);
    }

    #[test]
    fn parse_level_case_and_whitespace() {
        assert_eq!(parse_level(" DEBUG "), tracing::Level::DEBUG);
        assert_eq!(parse_level("Warning"), tracing::Level::WARN);
    }

    #[test]
    fn parse_level_unknown_defaults_to_info() {
        assert_eq!(parse_level(""), tracing::Level::INFO);
        assert_eq!(parse_level("verbose"), tracing::Level::INFO);
    }
}
