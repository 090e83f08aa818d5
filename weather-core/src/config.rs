use anyhow::{Context, Result, anyhow, bail};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

pub const DEFAULT_UPSTREAM_URL: &str = "https://api.openweathermap.org/data/2.5/weather";

/// Upstream provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Credentials used against the provider, tried in order on rotation.
    pub api_keys: Vec<String>,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            api_keys: Vec::new(),
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Per-caller quota settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,

    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// How often finished windows are purged from memory.
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_secs: default_window_secs(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
        }
    }
}

/// Top-level configuration stored on disk.
///
/// Example TOML:
/// ```toml
/// allowed_api_keys = ["APIKEY-12345"]
///
/// [upstream]
/// api_keys = ["..."]
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Keys callers must present to use the proxy.
    #[serde(default)]
    pub allowed_api_keys: Vec<String>,

    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    #[serde(default)]
    pub upstream: UpstreamConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            allowed_api_keys: Vec::new(),
            listen_addr: default_listen_addr(),
            upstream: UpstreamConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_UPSTREAM_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_max_requests() -> u32 {
    5
}

fn default_window_secs() -> u64 {
    3600
}

fn default_cleanup_interval_secs() -> u64 {
    600
}

fn default_listen_addr() -> String {
    "127.0.0.1:8080".to_string()
}

impl Config {
    /// Load config from the platform config directory.
    pub fn load() -> Result<Self> {
        let path = Self::config_file_path()?;
        Self::load_from(&path)
    }

    /// Load and validate config from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        cfg.validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Reject settings the proxy cannot start with.
    pub fn validate(&self) -> Result<()> {
        if self.upstream.api_keys.iter().all(|k| k.trim().is_empty()) {
            bail!(
                "No upstream API keys configured.\n\
                 Hint: add at least one key to `upstream.api_keys`."
            );
        }

        if self.rate_limit.max_requests == 0 {
            bail!("`rate_limit.max_requests` must be greater than zero");
        }

        if self.rate_limit.window_secs == 0 {
            bail!("`rate_limit.window_secs` must be greater than zero");
        }

        if self.upstream.timeout_secs == 0 {
            bail!("`upstream.timeout_secs` must be greater than zero");
        }

        if self.allowed_api_keys.is_empty() {
            tracing::warn!("No allowed API keys configured; every request will be rejected");
        }

        Ok(())
    }

    /// Upstream keys with blank entries removed.
    pub fn upstream_api_keys(&self) -> Vec<String> {
        self.upstream
            .api_keys
            .iter()
            .filter(|k| !k.trim().is_empty())
            .cloned()
            .collect()
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "weather-proxy", "weather-proxy")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }
}
