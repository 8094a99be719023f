//! Configuration management.
//!
//! Configuration is read from TOML. Every section is optional; anything left
//! out falls back to [`JnextConfig::default`]. Lookup order is documented on
//! [`JnextConfig::load`].

use crate::scope::TopicScope;
use crate::{Error, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Env var naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "JNEXT_CONFIG_PATH";

/// Main configuration for jnext.
#[derive(Debug, Clone)]
pub struct JnextConfig {
    /// Where the conversation log and document store live.
    pub data_dir: PathBuf,
    /// Recent turns loaded per request.
    pub history_limit: usize,
    /// Backend used when a request names none.
    pub default_backend: String,
    /// Configured backends, keyed by backend id.
    pub backends: BTreeMap<String, BackendSettings>,
    /// HTTP timeouts shared by every backend.
    pub http: HttpConfig,
    /// Retry policy settings.
    pub retry: RetrySettings,
    /// Capture pipeline settings.
    pub capture: CaptureSettings,
    /// Logging and metrics settings.
    pub observability: ObservabilitySettings,
    /// Topic scopes declared in configuration.
    pub scopes: Vec<ScopeSettings>,
}

/// Backend provider families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Google Gemini.
    Gemini,
    /// `OpenAI` chat completions.
    #[serde(alias = "open_ai")]
    OpenAi,
    /// Anthropic messages.
    Anthropic,
    /// Local Ollama.
    Ollama,
}

impl BackendKind {
    /// Parses a provider name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "gemini" | "google" => Some(Self::Gemini),
            "openai" | "open_ai" | "gpt" => Some(Self::OpenAi),
            "anthropic" | "claude" => Some(Self::Anthropic),
            "ollama" => Some(Self::Ollama),
            _ => None,
        }
    }

    /// Provider name as written in config.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Ollama => "ollama",
        }
    }
}

/// One `[backends.<id>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendSettings {
    /// Provider family.
    pub kind: BackendKind,
    /// Model identifier; the provider default when unset.
    #[serde(default)]
    pub model: Option<String>,
    /// Name the backend is told it has; the id when unset.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Disabled backends fail locally without a network attempt.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// API key; the provider's standard env var when unset.
    #[serde(default, deserialize_with = "optional_secret::deserialize")]
    pub api_key: Option<SecretString>,
    /// Endpoint override.
    #[serde(default)]
    pub base_url: Option<String>,
}

const fn default_enabled() -> bool {
    true
}

impl BackendSettings {
    /// Creates enabled settings with provider defaults.
    #[must_use]
    pub const fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            model: None,
            display_name: None,
            enabled: true,
            api_key: None,
            base_url: None,
        }
    }

    /// Sets the model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Sets the enabled flag.
    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// `[http]` section.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct HttpConfig {
    /// Total request timeout in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Connect timeout in milliseconds.
    pub connect_timeout_ms: Option<u64>,
}

/// `[retry]` section.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct RetrySettings {
    /// Total attempts, including the first.
    pub max_attempts: Option<u32>,
    /// Wait before the first retry in milliseconds.
    pub base_backoff_ms: Option<u64>,
}

/// `[capture]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CaptureSettings {
    /// Whether scoped exchanges are captured.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Backend used for metadata extraction; the answering backend when unset.
    #[serde(default)]
    pub metadata_backend: Option<String>,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            metadata_backend: None,
        }
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LoggingSettings {
    /// `pretty` or `json`.
    pub format: Option<String>,
    /// `EnvFilter` directive, e.g. `info,jnext=debug`.
    pub filter: Option<String>,
    /// Log file; stderr when unset.
    pub file: Option<PathBuf>,
}

/// `[metrics.push_gateway]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MetricsPushGatewaySettings {
    /// Push gateway endpoint URI.
    pub endpoint: Option<String>,
    /// Basic auth username.
    pub username: Option<String>,
    /// Basic auth password.
    pub password: Option<String>,
    /// POST instead of PUT.
    pub use_http_post: Option<bool>,
}

/// `[metrics]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MetricsSettings {
    /// Whether the Prometheus recorder is installed.
    pub enabled: Option<bool>,
    /// Listener port when metrics are exposed.
    pub port: Option<u16>,
    /// Optional push gateway for short-lived runs.
    pub push_gateway: Option<MetricsPushGatewaySettings>,
}

/// Logging and metrics settings, grouped for observability init.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservabilitySettings {
    /// Logging settings.
    pub logging: Option<LoggingSettings>,
    /// Metrics settings.
    pub metrics: Option<MetricsSettings>,
}

/// One `[[scopes]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScopeSettings {
    /// Scope id (`^[a-z_]+$`).
    pub id: String,
    /// Human-readable name.
    pub display_name: String,
    /// Short description.
    #[serde(default)]
    pub description: String,
    /// Constitution override; the generic template when unset.
    #[serde(default)]
    pub constitution: Option<String>,
    /// Topic categories the classifier recognizes.
    #[serde(default)]
    pub categories: Vec<String>,
    /// English key to store field name overrides.
    #[serde(default)]
    pub field_aliases: BTreeMap<String, String>,
}

impl ScopeSettings {
    /// Builds the topic scope this entry declares.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a malformed id or blank display
    /// name.
    pub fn to_scope(&self) -> Result<TopicScope> {
        let mut scope = TopicScope::new(&self.id, &self.display_name, &self.description)?
            .with_categories(self.categories.iter().cloned());
        if let Some(constitution) = &self.constitution {
            scope = scope.with_constitution(constitution.clone());
        }
        for (key, field) in &self.field_aliases {
            scope = scope.with_field_alias(key.clone(), field.clone());
        }
        Ok(scope)
    }
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// Data directory.
    pub data_dir: Option<String>,
    /// History limit.
    pub history_limit: Option<usize>,
    /// Default backend id.
    pub default_backend: Option<String>,
    /// Backends; replaces the built-in set when present.
    pub backends: Option<BTreeMap<String, BackendSettings>>,
    /// HTTP section.
    pub http: Option<HttpConfig>,
    /// Retry section.
    pub retry: Option<RetrySettings>,
    /// Capture section.
    pub capture: Option<CaptureSettings>,
    /// Logging section.
    pub logging: Option<LoggingSettings>,
    /// Metrics section.
    pub metrics: Option<MetricsSettings>,
    /// Declared scopes.
    #[serde(default)]
    pub scopes: Vec<ScopeSettings>,
}

/// Serde helper for optional `SecretString` values.
mod optional_secret {
    use secrecy::SecretString;
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<String>::deserialize(deserializer)?;
        Ok(value
            .filter(|s| !s.trim().is_empty())
            .map(SecretString::from))
    }
}

/// The backends available when configuration declares none.
#[must_use]
pub fn default_backends() -> BTreeMap<String, BackendSettings> {
    BTreeMap::from([
        (
            "gemini-flash".to_string(),
            BackendSettings::new(BackendKind::Gemini)
                .with_model("gemini-2.0-flash")
                .with_display_name("Gemini Flash"),
        ),
        (
            "gemini-pro".to_string(),
            BackendSettings::new(BackendKind::Gemini)
                .with_model("gemini-1.5-pro")
                .with_display_name("Gemini Pro"),
        ),
        (
            "gpt".to_string(),
            BackendSettings::new(BackendKind::OpenAi)
                .with_model("gpt-4o")
                .with_display_name("GPT"),
        ),
        (
            "claude".to_string(),
            BackendSettings::new(BackendKind::Anthropic).with_display_name("Claude"),
        ),
        (
            "ollama".to_string(),
            BackendSettings::new(BackendKind::Ollama)
                .with_display_name("Ollama")
                .with_enabled(false),
        ),
    ])
}

impl Default for JnextConfig {
    fn default() -> Self {
        Self {
            data_dir: crate::storage::default_data_dir(),
            history_limit: crate::context::MAX_HISTORY_TURNS,
            default_backend: crate::services::DEFAULT_BACKEND.to_string(),
            backends: default_backends(),
            http: HttpConfig::default(),
            retry: RetrySettings::default(),
            capture: CaptureSettings::default(),
            observability: ObservabilitySettings::default(),
            scopes: Vec::new(),
        }
    }
}

impl JnextConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid configuration.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(contents).map_err(|e| Error::OperationFailed {
            operation: "parse_config_file".to_string(),
            cause: e.to_string(),
        })?;
        Ok(Self::from_config_file(file))
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
            operation: "read_config_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;
        Self::from_toml(&contents)
    }

    /// Loads configuration.
    ///
    /// Checks the following in order:
    /// 1. `explicit`, when given
    /// 2. `JNEXT_CONFIG_PATH`
    /// 3. Platform-specific config dir (`~/Library/Application Support/jnext/` on macOS)
    /// 4. XDG config dir (`~/.config/jnext/`)
    ///
    /// Returns the default configuration if no file is found.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicit or env-named file cannot be loaded.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from_file(path);
        }
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV)
            && !path.trim().is_empty()
        {
            return Self::load_from_file(Path::new(path.trim()));
        }
        Ok(Self::load_default())
    }

    /// Loads configuration from the default locations, ignoring unreadable
    /// files.
    #[must_use]
    pub fn load_default() -> Self {
        let Some(base_dirs) = directories::BaseDirs::new() else {
            return Self::default();
        };

        let candidates = [
            base_dirs.config_dir().join("jnext").join("config.toml"),
            base_dirs
                .home_dir()
                .join(".config")
                .join("jnext")
                .join("config.toml"),
        ];
        for path in candidates.iter().filter(|path| path.exists()) {
            match Self::load_from_file(path) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable config file");
                },
            }
        }

        Self::default()
    }

    /// Converts a `ConfigFile` to `JnextConfig`.
    fn from_config_file(file: ConfigFile) -> Self {
        let mut config = Self::default();

        if let Some(data_dir) = file.data_dir {
            config.data_dir = PathBuf::from(data_dir);
        }
        if let Some(history_limit) = file.history_limit {
            config.history_limit = history_limit.min(crate::context::MAX_HISTORY_TURNS);
        }
        if let Some(default_backend) = file.default_backend {
            config.default_backend = default_backend;
        }
        if let Some(backends) = file.backends {
            config.backends = backends;
        }
        if let Some(http) = file.http {
            config.http = http;
        }
        if let Some(retry) = file.retry {
            config.retry = retry;
        }
        if let Some(capture) = file.capture {
            config.capture = capture;
        }
        config.observability = ObservabilitySettings {
            logging: file.logging,
            metrics: file.metrics,
        };
        config.scopes = file.scopes;

        config
    }

    /// Sets the data directory.
    #[must_use]
    pub fn with_data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_dir = path.into();
        self
    }

    /// Path of the `SQLite` conversation log.
    #[must_use]
    pub fn conversation_db_path(&self) -> PathBuf {
        self.data_dir.join("conversations.db")
    }

    /// Root of the filesystem document store.
    #[must_use]
    pub fn documents_path(&self) -> PathBuf {
        self.data_dir.join("documents")
    }
}
