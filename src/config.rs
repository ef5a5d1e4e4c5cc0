use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Environment override tracking
// ---------------------------------------------------------------------------

/// Tracks which configuration settings are overridden by environment variables.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    overrides: HashMap<String, String>,
}

impl EnvOverrides {
    /// Check whether a setting key (e.g. "server.host") is overridden by an env var.
    pub fn is_overridden(&self, key: &str) -> bool {
        self.overrides.contains_key(key)
    }

    /// Get the env var name that overrides the given setting key.
    pub fn env_var_for(&self, key: &str) -> Option<&str> {
        self.overrides.get(key).map(String::as_str)
    }

    /// Get all overrides as a map of setting key -> env var name.
    pub fn all(&self) -> &HashMap<String, String> {
        &self.overrides
    }

    fn record(&mut self, key: &str, env_var: &str) {
        self.overrides.insert(key.to_string(), env_var.to_string());
    }
}

// ---------------------------------------------------------------------------
// Main configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub backends: BackendsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Env var overrides are not serialized to TOML.
    #[serde(skip)]
    pub env_overrides: EnvOverrides,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    /// Master switch: when false, all API routes are accessible without auth.
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_admin_name")]
    pub default_admin_name: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_admin_name: default_admin_name(),
        }
    }
}

/// The three backend slots the router selects among. General and math share
/// an upstream endpoint by default (different model names); creative has its
/// own endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendsConfig {
    #[serde(default = "default_general_backend")]
    pub general: BackendConfig,
    #[serde(default = "default_math_backend")]
    pub math: BackendConfig,
    #[serde(default = "default_creative_backend")]
    pub creative: BackendConfig,
}

impl Default for BackendsConfig {
    fn default() -> Self {
        Self {
            general: default_general_backend(),
            math: default_math_backend(),
            creative: default_creative_backend(),
        }
    }
}

/// Connection settings for one chat-completion backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    /// Base URL of the OpenAI-compatible endpoint (e.g. `https://api.openai.com/v1`).
    pub url: String,
    /// Bearer API key. Usually injected via env var rather than the file.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Model name sent in the request body.
    pub model: String,
    /// Request timeout for chat completions.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Override for the built-in per-backend top_p default.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    /// Override for the built-in per-backend system prompt.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions
// ---------------------------------------------------------------------------

const fn default_port() -> u16 {
    8420
}
fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_db_path() -> PathBuf {
    PathBuf::from("twinroute.db")
}
fn default_admin_name() -> String {
    "admin".to_string()
}
const fn default_true() -> bool {
    true
}
const fn default_timeout_secs() -> u64 {
    60
}
fn default_log_level() -> String {
    "info".to_string()
}

fn default_general_backend() -> BackendConfig {
    BackendConfig {
        url: "https://api.openai.com/v1".to_string(),
        api_key: None,
        model: "gpt-4o".to_string(),
        timeout_secs: default_timeout_secs(),
        top_p: None,
        system_prompt: None,
    }
}
fn default_math_backend() -> BackendConfig {
    BackendConfig {
        url: "https://api.openai.com/v1".to_string(),
        api_key: None,
        model: "o3-mini".to_string(),
        timeout_secs: default_timeout_secs(),
        top_p: None,
        system_prompt: None,
    }
}
fn default_creative_backend() -> BackendConfig {
    BackendConfig {
        url: "https://api.mistral.ai/v1".to_string(),
        api_key: None,
        model: "mistral-large-latest".to_string(),
        timeout_secs: default_timeout_secs(),
        top_p: None,
        system_prompt: None,
    }
}

// ---------------------------------------------------------------------------
// Config loading and env overrides
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a TOML file, then apply environment variable
    /// overrides. Any setting prefixed with `TWINROUTE_` takes precedence over
    /// the file value and is tracked in `env_overrides`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            config
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path.display());
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Apply environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        let mut ov = EnvOverrides::default();

        macro_rules! env_str {
            ($key:expr, $env:expr, $field:expr) => {
                if let Ok(val) = std::env::var($env) {
                    $field = val;
                    ov.record($key, $env);
                }
            };
        }
        macro_rules! env_bool {
            ($key:expr, $env:expr, $field:expr) => {
                if let Ok(val) = std::env::var($env) {
                    $field = matches!(val.to_lowercase().as_str(), "1" | "true" | "yes" | "on");
                    ov.record($key, $env);
                }
            };
        }
        macro_rules! env_parse {
            ($key:expr, $env:expr, $field:expr) => {
                if let Ok(val) = std::env::var($env) {
                    if let Ok(parsed) = val.parse() {
                        $field = parsed;
                        ov.record($key, $env);
                    }
                }
            };
        }
        macro_rules! env_opt_str {
            ($key:expr, $env:expr, $field:expr) => {
                if let Ok(val) = std::env::var($env) {
                    $field = if val.is_empty() { None } else { Some(val) };
                    ov.record($key, $env);
                }
            };
        }

        // -- Server --
        env_str!("server.host", "TWINROUTE_SERVER_HOST", self.server.host);
        env_parse!("server.port", "TWINROUTE_SERVER_PORT", self.server.port);
        if let Ok(val) = std::env::var("TWINROUTE_SERVER_CORS_ORIGINS") {
            self.server.cors_origins = val
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            ov.record("server.cors_origins", "TWINROUTE_SERVER_CORS_ORIGINS");
        }

        // -- Database --
        if let Ok(val) = std::env::var("TWINROUTE_DATABASE_PATH") {
            self.database.path = PathBuf::from(val);
            ov.record("database.path", "TWINROUTE_DATABASE_PATH");
        }

        // -- Auth --
        env_bool!("auth.enabled", "TWINROUTE_AUTH_ENABLED", self.auth.enabled);
        env_str!(
            "auth.default_admin_name",
            "TWINROUTE_AUTH_ADMIN_NAME",
            self.auth.default_admin_name
        );

        // -- Backends (API keys injected at startup, never read per-call) --
        env_opt_str!(
            "backends.general.api_key",
            "TWINROUTE_GENERAL_API_KEY",
            self.backends.general.api_key
        );
        env_str!(
            "backends.general.url",
            "TWINROUTE_GENERAL_URL",
            self.backends.general.url
        );
        env_str!(
            "backends.general.model",
            "TWINROUTE_GENERAL_MODEL",
            self.backends.general.model
        );
        env_opt_str!(
            "backends.math.api_key",
            "TWINROUTE_MATH_API_KEY",
            self.backends.math.api_key
        );
        env_str!(
            "backends.math.url",
            "TWINROUTE_MATH_URL",
            self.backends.math.url
        );
        env_str!(
            "backends.math.model",
            "TWINROUTE_MATH_MODEL",
            self.backends.math.model
        );
        env_opt_str!(
            "backends.creative.api_key",
            "TWINROUTE_CREATIVE_API_KEY",
            self.backends.creative.api_key
        );
        env_str!(
            "backends.creative.url",
            "TWINROUTE_CREATIVE_URL",
            self.backends.creative.url
        );
        env_str!(
            "backends.creative.model",
            "TWINROUTE_CREATIVE_MODEL",
            self.backends.creative.model
        );

        // The math backend shares the general endpoint by default; a general
        // key applies to it unless a math-specific key is set.
        if self.backends.math.api_key.is_none()
            && self.backends.math.url == self.backends.general.url
        {
            self.backends.math.api_key = self.backends.general.api_key.clone();
        }

        // -- Logging --
        env_str!("logging.level", "TWINROUTE_LOG_LEVEL", self.logging.level);
        env_bool!("logging.json", "TWINROUTE_LOG_JSON", self.logging.json);

        self.env_overrides = ov;
    }
}
