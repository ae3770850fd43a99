//! Config file loading. Search order: `--config <path>`, then ./subscrape.toml, then
//! $XDG_CONFIG_HOME/subscrape/config.toml (or ~/.config/subscrape/config.toml).
//!
//! The `[reddit]` table carries the API credentials and is mandatory:
//!
//! ```toml
//! [reddit]
//! client_id = "..."
//! client_secret = "..."
//! user_agent = "subscrape/0.1 by u/someone"
//! ```

use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "subscrape.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config source missing, unreadable, malformed, or without a `[reddit]` section.
    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("Config file {path} must contain '{field}' in the [reddit] section.")]
    CredentialField { path: PathBuf, field: &'static str },
}

/// Config file contents. Everything except the `[reddit]` section is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct Config {
    /// Directory the CSV files are written to when --output-dir is not set.
    pub output_dir: Option<PathBuf>,
    /// Delay in seconds between API requests.
    pub request_delay_secs: Option<u64>,
    /// Request timeout in seconds. Unset keeps the HTTP client's default.
    pub timeout_secs: Option<u64>,
    /// Number of HTTP attempts for transient failures (default 3).
    pub retry_count: Option<u32>,
    /// Delay in seconds before each retry (e.g. [1, 2, 4]).
    pub retry_backoff_secs: Option<Vec<u64>>,
    pub reddit: Option<RedditSection>,
}

/// Raw `[reddit]` table. Fields are checked by [Config::credentials].
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RedditSection {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub user_agent: Option<String>,
}

/// Validated API credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub user_agent: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

/// A config file together with where it was read from.
#[derive(Debug)]
pub struct LoadedConfig {
    pub path: PathBuf,
    pub config: Config,
}

impl LoadedConfig {
    pub fn credentials(&self) -> Result<Credentials, ConfigError> {
        self.config.credentials(&self.path)
    }
}

impl Config {
    /// Extract the three credential fields. `path` is only used in error messages.
    pub fn credentials(&self, path: &Path) -> Result<Credentials, ConfigError> {
        let section = self
            .reddit
            .as_ref()
            .ok_or_else(|| ConfigError::Configuration {
                reason: format!(
                    "Make sure '{}' exists and has a [reddit] section.",
                    path.display()
                ),
            })?;
        let field = |value: &Option<String>, name: &'static str| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .ok_or_else(|| ConfigError::CredentialField {
                    path: path.to_path_buf(),
                    field: name,
                })
        };
        Ok(Credentials {
            client_id: field(&section.client_id, "client_id")?,
            client_secret: field(&section.client_secret, "client_secret")?,
            user_agent: field(&section.user_agent, "user_agent")?,
        })
    }
}

/// Parse config text. `path` is only used in error messages.
pub fn parse_config(s: &str, path: &Path) -> Result<Config, ConfigError> {
    toml::from_str(s).map_err(|e| ConfigError::Configuration {
        reason: format!("Invalid config {}: {}", path.display(), e),
    })
}

/// Read and parse one config file.
pub fn read_config(path: &Path) -> Result<Config, ConfigError> {
    let s = std::fs::read_to_string(path).map_err(|e| ConfigError::Configuration {
        reason: format!("Cannot read config {}: {}", path.display(), e),
    })?;
    parse_config(&s, path)
}

/// Candidate paths in search order, without the explicit override.
pub fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        paths.push(cwd.join(LOCAL_CONFIG_FILE));
    }
    if let Some(d) = dirs::config_dir() {
        paths.push(d.join("subscrape").join("config.toml"));
    }
    paths
}

/// Load the config. An explicit path must exist; otherwise the first existing default path wins.
/// Finding no file at all is an error since credentials are required.
pub fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig, ConfigError> {
    if let Some(path) = explicit {
        return Ok(LoadedConfig {
            path: path.to_path_buf(),
            config: read_config(path)?,
        });
    }
    let candidates = default_config_paths();
    for path in &candidates {
        if path.exists() {
            return Ok(LoadedConfig {
                path: path.clone(),
                config: read_config(path)?,
            });
        }
    }
    let searched = candidates
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ");
    Err(ConfigError::Configuration {
        reason: format!("No config file found (searched: {}).", searched),
    })
}

/// Read credentials straight from a config file.
pub fn load_credentials(path: &Path) -> Result<Credentials, ConfigError> {
    read_config(path)?.credentials(path)
}
