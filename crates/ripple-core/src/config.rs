//! Client configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/ripple/config.toml)
//! 3. Environment variables (RIPPLE_* prefix)
//!
//! Environment variables take precedence over config file values.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable prefix
const ENV_PREFIX: &str = "RIPPLE";

/// Fixed delay between reconnect attempts, in milliseconds
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 3000;

/// Client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Primary push channel URL (optional)
    #[serde(default)]
    pub server_url: Option<String>,

    /// Dedicated logs channel URL; falls back to `server_url`
    #[serde(default)]
    pub logs_url: Option<String>,

    /// Delay between reconnect attempts
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Page size for the windowed log view
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Timeout for individual REST requests
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: None,
            logs_url: None,
            reconnect_delay_ms: default_reconnect_delay_ms(),
            page_size: default_page_size(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (RIPPLE_SERVER_URL, RIPPLE_LOGS_URL, ...)
    /// 2. Config file (~/.config/ripple/config.toml or RIPPLE_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        // RIPPLE_SERVER_URL
        if let Ok(val) = std::env::var(format!("{}_SERVER_URL", ENV_PREFIX)) {
            self.server_url = if val.is_empty() { None } else { Some(val) };
        }

        // RIPPLE_LOGS_URL
        if let Ok(val) = std::env::var(format!("{}_LOGS_URL", ENV_PREFIX)) {
            self.logs_url = if val.is_empty() { None } else { Some(val) };
        }

        // RIPPLE_RECONNECT_DELAY_MS
        if let Ok(val) = std::env::var(format!("{}_RECONNECT_DELAY_MS", ENV_PREFIX)) {
            if let Ok(ms) = val.parse() {
                self.reconnect_delay_ms = ms;
            }
        }

        // RIPPLE_PAGE_SIZE
        if let Ok(val) = std::env::var(format!("{}_PAGE_SIZE", ENV_PREFIX)) {
            if let Ok(size) = val.parse::<usize>() {
                if size > 0 {
                    self.page_size = size;
                }
            }
        }

        // RIPPLE_REQUEST_TIMEOUT_SECS
        if let Ok(val) = std::env::var(format!("{}_REQUEST_TIMEOUT_SECS", ENV_PREFIX)) {
            if let Ok(secs) = val.parse() {
                self.request_timeout_secs = secs;
            }
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_file_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with RIPPLE_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ripple")
            .join("config.toml")
    }
}

fn default_reconnect_delay_ms() -> u64 {
    DEFAULT_RECONNECT_DELAY_MS
}

fn default_page_size() -> usize {
    crate::state::DEFAULT_PAGE_SIZE
}

fn default_request_timeout_secs() -> u64 {
    10
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to serialize tests that touch environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Guard that locks env access and saves/restores env vars
    struct EnvGuard<'a> {
        _lock: std::sync::MutexGuard<'a, ()>,
        saved: Vec<(String, Option<String>)>,
    }

    impl<'a> EnvGuard<'a> {
        fn new(vars: &[&str]) -> Self {
            let lock = ENV_MUTEX.lock().unwrap();
            let saved = vars
                .iter()
                .map(|&name| (name.to_string(), env::var(name).ok()))
                .collect();
            // Clear all the vars
            for name in vars {
                env::remove_var(name);
            }
            Self { _lock: lock, saved }
        }
    }

    impl Drop for EnvGuard<'_> {
        fn drop(&mut self) {
            for (name, value) in &self.saved {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }

    const ENV_VARS: &[&str] = &[
        "RIPPLE_SERVER_URL",
        "RIPPLE_LOGS_URL",
        "RIPPLE_RECONNECT_DELAY_MS",
        "RIPPLE_PAGE_SIZE",
        "RIPPLE_REQUEST_TIMEOUT_SECS",
    ];

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.server_url.is_none());
        assert!(config.logs_url.is_none());
        assert_eq!(config.reconnect_delay_ms, 3000);
        assert_eq!(config.page_size, 50);
        assert_eq!(config.request_timeout_secs, 10);
    }

    #[test]
    fn test_env_override_server_url() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        assert!(config.server_url.is_none());

        env::set_var("RIPPLE_SERVER_URL", "ws://localhost:8000/ws");
        config.apply_env_overrides();
        assert_eq!(config.server_url, Some("ws://localhost:8000/ws".to_string()));

        // Empty string clears it
        env::set_var("RIPPLE_SERVER_URL", "");
        config.apply_env_overrides();
        assert!(config.server_url.is_none());
    }

    #[test]
    fn test_env_override_reconnect_delay() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();

        env::set_var("RIPPLE_RECONNECT_DELAY_MS", "250");
        config.apply_env_overrides();
        assert_eq!(config.reconnect_delay(), Duration::from_millis(250));

        // Unparseable values are ignored
        env::set_var("RIPPLE_RECONNECT_DELAY_MS", "soon");
        config.apply_env_overrides();
        assert_eq!(config.reconnect_delay_ms, 250);
    }

    #[test]
    fn test_env_override_page_size_rejects_zero() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();

        env::set_var("RIPPLE_PAGE_SIZE", "0");
        config.apply_env_overrides();
        assert_eq!(config.page_size, 50);

        env::set_var("RIPPLE_PAGE_SIZE", "25");
        config.apply_env_overrides();
        assert_eq!(config.page_size, 25);
    }

    #[test]
    fn test_load_from_str() {
        let _guard = EnvGuard::new(ENV_VARS);

        let toml = r#"
            server_url = "ws://example.com/ws"
            logs_url = "ws://example.com/ws/logs"
            reconnect_delay_ms = 500
            page_size = 20
        "#;

        let config = Config::load_from_str(toml).unwrap();
        assert_eq!(config.server_url, Some("ws://example.com/ws".to_string()));
        assert_eq!(config.logs_url, Some("ws://example.com/ws/logs".to_string()));
        assert_eq!(config.reconnect_delay_ms, 500);
        assert_eq!(config.page_size, 20);
        assert_eq!(config.request_timeout_secs, 10);
    }

    #[test]
    fn test_load_from_path_missing_file() {
        let _guard = EnvGuard::new(ENV_VARS);

        let path = PathBuf::from("/nonexistent/config.toml");
        let config = Config::load_from_path(&path).unwrap();
        // Should return defaults when file doesn't exist
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_from_real_file() {
        let _guard = EnvGuard::new(ENV_VARS);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "server_url = \"ws://file.example/ws\"\n").unwrap();

        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.server_url, Some("ws://file.example/ws".to_string()));
        assert_eq!(config.page_size, 50);
    }
}
