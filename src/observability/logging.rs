//! Structured logging configuration.

use crate::config::LoggingSettings;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Filter used when neither config nor `RUST_LOG` sets one.
pub const DEFAULT_FILTER: &str = "warn,jnext=info";

/// Filter used with `--verbose`.
pub const VERBOSE_FILTER: &str = "info,jnext=debug";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable output.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    /// Parses a format name; unknown names are `None`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pretty" | "text" => Some(Self::Pretty),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Resolved logging configuration.
#[derive(Debug)]
pub struct LoggingConfig {
    /// Output format.
    pub format: LogFormat,
    /// Event filter.
    pub filter: EnvFilter,
    /// Log file; stderr when unset.
    pub file: Option<PathBuf>,
}

/// Environment values that override logging settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoggingEnv {
    /// `JNEXT_LOG_FORMAT`.
    pub format: Option<String>,
    /// `JNEXT_LOG_FILE`.
    pub file: Option<String>,
    /// `RUST_LOG`.
    pub rust_log: Option<String>,
}

impl LoggingEnv {
    /// Reads the overrides from the process environment.
    #[must_use]
    pub fn from_process() -> Self {
        let read = |key: &str| {
            std::env::var(key)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        Self {
            format: read("JNEXT_LOG_FORMAT"),
            file: read("JNEXT_LOG_FILE"),
            rust_log: read("RUST_LOG"),
        }
    }
}

impl LoggingConfig {
    /// Builds logging configuration from config settings with env overrides.
    #[must_use]
    pub fn from_settings(settings: Option<&LoggingSettings>, verbose: bool) -> Self {
        Self::resolve(settings, verbose, &LoggingEnv::from_process())
    }

    /// Resolves settings against explicit overrides.
    ///
    /// Precedence for the filter: `--verbose`, then `RUST_LOG`, then config,
    /// then [`DEFAULT_FILTER`]. An invalid directive falls back to the default.
    #[must_use]
    pub fn resolve(settings: Option<&LoggingSettings>, verbose: bool, env: &LoggingEnv) -> Self {
        let format = env
            .format
            .as_deref()
            .and_then(LogFormat::parse)
            .or_else(|| {
                settings
                    .and_then(|s| s.format.as_deref())
                    .and_then(LogFormat::parse)
            })
            .unwrap_or_default();

        let directive = if verbose {
            VERBOSE_FILTER.to_string()
        } else {
            env.rust_log
                .clone()
                .or_else(|| settings.and_then(|s| s.filter.clone()))
                .unwrap_or_else(|| DEFAULT_FILTER.to_string())
        };
        let filter =
            EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

        let file = env
            .file
            .as_ref()
            .map(PathBuf::from)
            .or_else(|| settings.and_then(|s| s.file.clone()));

        Self {
            format,
            filter,
            file,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("json", Some(LogFormat::Json))]
    #[test_case(" Pretty ", Some(LogFormat::Pretty))]
    #[test_case("text", Some(LogFormat::Pretty))]
    #[test_case("xml", None)]
    fn test_format_parse(input: &str, expected: Option<LogFormat>) {
        assert_eq!(LogFormat::parse(input), expected);
    }

    #[test]
    fn test_defaults_without_settings() {
        let config = LoggingConfig::resolve(None, false, &LoggingEnv::default());
        assert_eq!(config.format, LogFormat::Pretty);
        assert!(config.filter.to_string().contains("jnext=info"));
        assert!(config.file.is_none());
    }

    #[test]
    fn test_env_overrides_settings() {
        let settings = LoggingSettings {
            format: Some("pretty".to_string()),
            filter: Some("error".to_string()),
            file: Some(PathBuf::from("/tmp/config.log")),
        };
        let env = LoggingEnv {
            format: Some("json".to_string()),
            file: Some("/tmp/env.log".to_string()),
            rust_log: Some("debug".to_string()),
        };

        let config = LoggingConfig::resolve(Some(&settings), false, &env);
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.filter.to_string(), "debug");
        assert_eq!(config.file, Some(PathBuf::from("/tmp/env.log")));
    }

    #[test]
    fn test_verbose_wins_over_everything() {
        let env = LoggingEnv {
            rust_log: Some("error".to_string()),
            ..LoggingEnv::default()
        };
        let config = LoggingConfig::resolve(None, true, &env);
        assert!(config.filter.to_string().contains("jnext=debug"));
    }

    #[test]
    fn test_settings_filter_used_without_env() {
        let settings = LoggingSettings {
            filter: Some("jnext=trace".to_string()),
            ..LoggingSettings::default()
        };
        let config = LoggingConfig::resolve(Some(&settings), false, &LoggingEnv::default());
        assert_eq!(config.filter.to_string(), "jnext=trace");
    }
}
