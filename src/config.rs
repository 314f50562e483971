//! Gateway configuration
//!
//! Settings come from an optional `sqlbridge.toml`, then environment
//! variables, then command line flags.
//!
//! ## Environment Variables
//!
//! - `SQLBRIDGE_HOST` - Listen address
//! - `SQLBRIDGE_PORT` - Listen port
//! - `SQLBRIDGE_FLUSH_BUDGET_MS` - Longest time spent filling one row frame
//! - `SQLBRIDGE_MAX_CHUNK_BYTES` - Upper bound for requested frame sizes
//! - `SQLBRIDGE_CLOSE_ON_DISCONNECT` - Close connections a client leaves open
//!
//! These can be set in a `.env` file next to the configuration file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::stream::{DEFAULT_FLUSH_BUDGET, DEFAULT_MAX_CHUNK_BYTES, MAX_FRAME_ROWS_BYTES};

/// Configuration file name
pub const CONFIG_FILE_NAME: &str = "sqlbridge.toml";

/// Environment variable names
pub const ENV_HOST: &str = "SQLBRIDGE_HOST";
pub const ENV_PORT: &str = "SQLBRIDGE_PORT";
pub const ENV_FLUSH_BUDGET_MS: &str = "SQLBRIDGE_FLUSH_BUDGET_MS";
pub const ENV_MAX_CHUNK_BYTES: &str = "SQLBRIDGE_MAX_CHUNK_BYTES";
pub const ENV_CLOSE_ON_DISCONNECT: &str = "SQLBRIDGE_CLOSE_ON_DISCONNECT";

pub const DEFAULT_PORT: u16 = 7788;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listen address
    pub host: String,
    /// Listen port
    pub port: u16,
    /// Time budget for filling one row frame
    pub flush_budget_ms: u64,
    /// Larger chunk requests are clamped to this
    pub max_chunk_bytes: usize,
    /// Close connections left open when a client disconnects
    pub close_on_disconnect: bool,
    /// Tracing filter used when `RUST_LOG` is not set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_filter: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            flush_budget_ms: DEFAULT_FLUSH_BUDGET.as_millis() as u64,
            max_chunk_bytes: DEFAULT_MAX_CHUNK_BYTES,
            close_on_disconnect: true,
            log_filter: None,
        }
    }
}

impl GatewayConfig {
    /// Load configuration.
    ///
    /// An explicit `path` must exist. Without one, `sqlbridge.toml` in the
    /// working directory is used when present, defaults otherwise. A `.env`
    /// file next to the configuration is loaded first.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let config_path = match path {
            Some(path) => {
                if !path.exists() {
                    anyhow::bail!("Configuration file not found: {}", path.display());
                }
                Some(path.to_path_buf())
            }
            None => {
                let default = PathBuf::from(CONFIG_FILE_NAME);
                default.exists().then_some(default)
            }
        };

        let dir = config_path
            .as_deref()
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let env_path = dir.join(".env");
        if env_path.exists() {
            let _ = dotenvy::from_path(&env_path);
        }

        let mut config = match &config_path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        config.clamp_limits();
        Ok(config)
    }

    /// Parse a configuration file without applying overrides
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Apply environment variable overrides to the configuration
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(host) = lookup(ENV_HOST) {
            if !host.is_empty() {
                self.host = host;
            }
        }

        if let Some(port) = lookup(ENV_PORT).and_then(|v| v.parse::<u16>().ok()) {
            self.port = port;
        }

        if let Some(ms) = lookup(ENV_FLUSH_BUDGET_MS).and_then(|v| v.parse::<u64>().ok()) {
            self.flush_budget_ms = ms;
        }

        if let Some(bytes) = lookup(ENV_MAX_CHUNK_BYTES).and_then(|v| v.parse::<usize>().ok()) {
            if bytes > 0 {
                self.max_chunk_bytes = bytes;
            }
        }

        if let Some(flag) = lookup(ENV_CLOSE_ON_DISCONNECT) {
            match flag.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => self.close_on_disconnect = true,
                "0" | "false" | "no" => self.close_on_disconnect = false,
                _ => tracing::warn!("Ignoring {}={}", ENV_CLOSE_ON_DISCONNECT, flag),
            }
        }
    }

    /// Keep `max_chunk_bytes` small enough for one response message
    fn clamp_limits(&mut self) {
        if self.max_chunk_bytes > MAX_FRAME_ROWS_BYTES {
            tracing::warn!(
                "max_chunk_bytes {} exceeds the frame limit, using {}",
                self.max_chunk_bytes,
                MAX_FRAME_ROWS_BYTES
            );
            self.max_chunk_bytes = MAX_FRAME_ROWS_BYTES;
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.listen_addr(), "127.0.0.1:7788");
        assert_eq!(config.flush_budget_ms, 1000);
        assert_eq!(config.max_chunk_bytes, 8 * 1024 * 1024);
        assert!(config.close_on_disconnect);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "port = 9000\nlog_filter = \"sqlbridge=debug\"\n").unwrap();

        let config = GatewayConfig::from_file(&path).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.log_filter.as_deref(), Some("sqlbridge=debug"));
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(GatewayConfig::load(Some(&dir.path().join("absent.toml"))).is_err());
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "port = \"not a number\"").unwrap();
        assert!(GatewayConfig::from_file(&path).is_err());
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_HOST, "0.0.0.0"),
            (ENV_PORT, "7000"),
            (ENV_FLUSH_BUDGET_MS, "250"),
            (ENV_MAX_CHUNK_BYTES, "0"),
            (ENV_CLOSE_ON_DISCONNECT, "false"),
        ]
        .into_iter()
        .collect();

        let mut config = GatewayConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(config.listen_addr(), "0.0.0.0:7000");
        assert_eq!(config.flush_budget_ms, 250);
        // zero is ignored
        assert_eq!(config.max_chunk_bytes, DEFAULT_MAX_CHUNK_BYTES);
        assert!(!config.close_on_disconnect);
    }

    #[test]
    fn test_bad_override_values_are_ignored() {
        let mut config = GatewayConfig::default();
        config.apply_overrides(|key| match key {
            ENV_PORT => Some("seventy".to_string()),
            ENV_CLOSE_ON_DISCONNECT => Some("maybe".to_string()),
            _ => None,
        });
        assert_eq!(config.port, DEFAULT_PORT);
        assert!(config.close_on_disconnect);
    }

    #[test]
    fn test_chunk_limit_is_clamped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "max_chunk_bytes = 1073741824\n").unwrap();

        let config = GatewayConfig::load(Some(&path)).unwrap();
        assert_eq!(config.max_chunk_bytes, MAX_FRAME_ROWS_BYTES);
    }

    #[test]
    fn test_serialization() {
        let toml_str = toml::to_string_pretty(&GatewayConfig::default()).unwrap();
        assert!(toml_str.contains("port = 7788"));
        assert!(!toml_str.contains("log_filter"));
    }
}
