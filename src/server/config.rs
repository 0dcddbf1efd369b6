//! Configuration loading for passerelled.
//!
//! Configuration is loaded from TOML files with the following resolution order:
//! 1. `--config <path>` (CLI flag)
//! 2. `~/.passerelle/config.toml` (user)
//! 3. `/etc/passerelle/config.toml` (system)
//!
//! With no file at all, built-in defaults are used.
//!
//! The upstream token is loaded separately with mandatory permission checks:
//! 1. `~/.passerelle/secrets.toml` (user, must be 0600)
//! 2. `/etc/passerelle/secrets.toml` (system, must be 0600)
//! 3. `OVH_TOKEN_ENDPOINT` environment variable

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::dispatch::{DispatchPolicy, RetryPolicy};
use crate::normalize::{DefaultsConfig, HeuristicsConfig};
use crate::{PasserelleError, Result};

/// Environment variable holding the upstream token.
pub const TOKEN_ENV_VAR: &str = "OVH_TOKEN_ENDPOINT";

/// Token used when none is configured. Upstream calls will fail with 401.
pub const DEV_PLACEHOLDER_TOKEN: &str = "dummy_token_for_development";

/// Server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub defaults: DefaultsConfig,
    #[serde(default)]
    pub heuristics: HeuristicsConfig,
}

/// Server network configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to (default: 127.0.0.1:8000).
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default)]
    pub limits: LimitsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            limits: LimitsConfig::default(),
        }
    }
}

fn default_address() -> String {
    "127.0.0.1:8000".to_string()
}

/// Resource limits.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Maximum concurrent requests (default: 100).
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: usize,
    /// Maximum request body size in bytes (default: 10 MiB).
    #[serde(default = "default_max_body")]
    pub max_body_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: default_max_concurrent(),
            max_body_bytes: default_max_body(),
        }
    }
}

fn default_max_concurrent() -> usize {
    100
}

fn default_max_body() -> usize {
    10 * 1024 * 1024
}

/// Upstream endpoint configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpstreamConfig {
    /// JSON file with extra alternate base URLs per model.
    #[serde(default)]
    pub overrides: Option<PathBuf>,
}

/// Dispatch tuning, in config-file units.
///
/// ```toml
/// [dispatch]
/// auth_probe = true
/// preflight = true
/// timeout_secs = 60
/// slow_timeout_secs = 120
/// max_attempts = 2
/// slow_max_attempts = 3
/// backoff_base = 2.0
/// backoff_unit_ms = 1000
/// max_candidates = 3
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub auth_probe: bool,
    pub probe_timeout_secs: u64,
    pub preflight: bool,
    pub preflight_timeout_secs: u64,
    pub preflight_max_tokens: u32,
    pub timeout_secs: u64,
    pub slow_timeout_secs: u64,
    pub max_attempts: u32,
    pub slow_max_attempts: u32,
    pub backoff_base: f64,
    pub backoff_unit_ms: u64,
    pub max_backoff_secs: u64,
    pub jitter: bool,
    pub max_candidates: Option<usize>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        let policy = DispatchPolicy::default();
        Self {
            auth_probe: policy.auth_probe,
            probe_timeout_secs: policy.probe_timeout.as_secs(),
            preflight: policy.preflight,
            preflight_timeout_secs: policy.preflight_timeout.as_secs(),
            preflight_max_tokens: policy.preflight_max_tokens,
            timeout_secs: policy.timeout.as_secs(),
            slow_timeout_secs: policy.slow_timeout.as_secs(),
            max_attempts: policy.max_attempts,
            slow_max_attempts: policy.slow_max_attempts,
            backoff_base: policy.retry.base,
            backoff_unit_ms: policy.retry.unit.as_millis() as u64,
            max_backoff_secs: policy.retry.max_delay.as_secs(),
            jitter: policy.retry.jitter,
            max_candidates: policy.max_candidates,
        }
    }
}

impl From<&DispatchConfig> for DispatchPolicy {
    fn from(c: &DispatchConfig) -> Self {
        DispatchPolicy {
            auth_probe: c.auth_probe,
            probe_timeout: Duration::from_secs(c.probe_timeout_secs),
            preflight: c.preflight,
            preflight_timeout: Duration::from_secs(c.preflight_timeout_secs),
            preflight_max_tokens: c.preflight_max_tokens,
            timeout: Duration::from_secs(c.timeout_secs),
            slow_timeout: Duration::from_secs(c.slow_timeout_secs),
            max_attempts: c.max_attempts,
            slow_max_attempts: c.slow_max_attempts,
            retry: RetryPolicy::new()
                .base(c.backoff_base)
                .unit(Duration::from_millis(c.backoff_unit_ms))
                .max_delay(Duration::from_secs(c.max_backoff_secs))
                .jitter(c.jitter),
            max_candidates: c.max_candidates,
        }
    }
}

/// Secrets configuration (upstream token).
///
/// ```toml
/// [ovh]
/// token = "..."
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Secrets {
    #[serde(default)]
    pub ovh: Option<TokenSecret>,
}

/// A single bearer token secret.
#[derive(Clone, Deserialize)]
pub struct TokenSecret {
    pub token: String,
}

impl std::fmt::Debug for TokenSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSecret")
            .field("token", &"<redacted>")
            .finish()
    }
}

impl Config {
    /// Load configuration from the standard locations.
    ///
    /// Resolution order:
    /// 1. Explicit path (if provided; missing is an error)
    /// 2. `~/.passerelle/config.toml`
    /// 3. `/etc/passerelle/config.toml`
    /// 4. Built-in defaults
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        match Self::resolve_config_path(explicit_path)? {
            Some(path) => Self::load_from_file(&path),
            None => Ok(Config::default()),
        }
    }

    /// Parse a config file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            PasserelleError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            PasserelleError::Configuration(format!("Failed to parse config file {path:?}: {e}"))
        })
    }

    /// Resolve the config file path.
    fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(Some(path.to_path_buf()));
            }
            return Err(PasserelleError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        // User config
        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".passerelle").join("config.toml");
            if user_config.exists() {
                return Ok(Some(user_config));
            }
        }

        // System config
        let system_config = PathBuf::from("/etc/passerelle/config.toml");
        if system_config.exists() {
            return Ok(Some(system_config));
        }

        Ok(None)
    }
}

impl Secrets {
    /// Load secrets from the standard locations with permission checks.
    ///
    /// Resolution order:
    /// 1. `~/.passerelle/secrets.toml` (if exists, must be 0600)
    /// 2. `/etc/passerelle/secrets.toml` (if exists, must be 0600)
    ///
    /// Returns empty secrets if no file exists (the token may come from env).
    pub fn load() -> Result<Self> {
        if let Some(home) = dirs::home_dir() {
            let user_secrets = home.join(".passerelle").join("secrets.toml");
            if user_secrets.exists() {
                return Self::load_from_file(&user_secrets);
            }
        }

        let system_secrets = PathBuf::from("/etc/passerelle/secrets.toml");
        if system_secrets.exists() {
            return Self::load_from_file(&system_secrets);
        }

        Ok(Secrets::default())
    }

    /// Parse a secrets file after checking its permissions.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        Self::check_permissions(path)?;
        let content = fs::read_to_string(path).map_err(|e| {
            PasserelleError::Configuration(format!("Failed to read secrets file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            PasserelleError::Configuration(format!("Failed to parse secrets file {path:?}: {e}"))
        })
    }

    /// Check that the secrets file has secure permissions (0600 or 0400).
    #[cfg(unix)]
    fn check_permissions(path: &Path) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let metadata = fs::metadata(path).map_err(|e| {
            PasserelleError::Configuration(format!("Failed to stat secrets file {path:?}: {e}"))
        })?;

        let mode = metadata.permissions().mode();
        // Reject if group or other bits are set
        if mode & 0o077 != 0 {
            return Err(PasserelleError::Configuration(format!(
                "Secrets file {path:?} has insecure permissions {:o}. Must be 0600 or 0400.",
                mode & 0o777
            )));
        }

        Ok(())
    }

    #[cfg(not(unix))]
    fn check_permissions(_path: &Path) -> Result<()> {
        Ok(())
    }

    /// Upstream token from the secrets file, else `OVH_TOKEN_ENDPOINT`.
    pub fn token(&self) -> Option<String> {
        self.ovh
            .as_ref()
            .map(|s| s.token.clone())
            .or_else(|| std::env::var(TOKEN_ENV_VAR).ok())
            .filter(|t| !t.trim().is_empty())
    }
}
