//! Configuration system (layered: code > env > config file > defaults).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::assistant::ConnectorSettings;
use crate::error::{ParleyError, Result};

pub const DEFAULT_HISTORY_MAX_SIZE: usize = 20;
pub const DEFAULT_MAX_DELEGATION_DEPTH: usize = 8;

const CONFIG_FILE_NAME: &str = "parley.toml";

/// Engine configuration.
///
/// Resolution order:
/// 1. Values set in code (`with_*`)
/// 2. Environment variables (a `.env` file is loaded first if present)
/// 3. The TOML config file
/// 4. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ParleyConfig {
    /// Maximum number of history records replayed to the model.
    pub history_max_size: usize,
    /// Lifetime of persisted records in the in-memory store.
    pub history_ttl_secs: Option<u64>,
    /// Maximum nesting of assistant delegation within one turn.
    pub max_delegation_depth: usize,
    /// Dump outbound request messages at debug level.
    pub print_request_messages: bool,
    pub openai_base_url: Option<String>,
    #[serde(skip_serializing)]
    pub openai_api_key: Option<String>,
    /// Connector name to capability flags.
    pub connectors: HashMap<String, ConnectorSettings>,
}

impl Default for ParleyConfig {
    fn default() -> Self {
        Self {
            history_max_size: DEFAULT_HISTORY_MAX_SIZE,
            history_ttl_secs: None,
            max_delegation_depth: DEFAULT_MAX_DELEGATION_DEPTH,
            print_request_messages: false,
            openai_base_url: None,
            openai_api_key: None,
            connectors: HashMap::new(),
        }
    }
}

impl ParleyConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default config file location (`<config dir>/parley/parley.toml`).
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "parley").map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Parse a TOML config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Defaults overlaid with environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new().with_env()
    }

    /// Config file at the default path (if any) overlaid with the environment.
    pub fn load() -> Result<Self> {
        let base = match Self::default_path().filter(|path| path.exists()) {
            Some(path) => {
                tracing::debug!(path = %path.display(), "loading config file");
                Self::from_file(path)?
            }
            None => Self::new(),
        };
        base.with_env()
    }

    /// Apply environment overrides on top of `self`.
    pub fn with_env(self) -> Result<Self> {
        let _ = dotenvy::dotenv();
        self.with_vars(|key| std::env::var(key).ok())
    }

    pub(crate) fn with_vars(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(size) = parse_var(&lookup, "PARLEY_HISTORY_MAX_SIZE")? {
            self.history_max_size = size;
        }
        if let Some(ttl) = parse_var(&lookup, "PARLEY_HISTORY_TTL_SECS")? {
            self.history_ttl_secs = Some(ttl);
        }
        if let Some(depth) = parse_var(&lookup, "PARLEY_MAX_DELEGATION_DEPTH")? {
            self.max_delegation_depth = depth;
        }
        if let Some(print) = parse_var(&lookup, "PARLEY_PRINT_REQUEST_MESSAGES")? {
            self.print_request_messages = print;
        }
        if let Some(url) = lookup("OPENAI_BASE_URL").filter(|v| !v.is_empty()) {
            self.openai_base_url = Some(url);
        }
        if let Some(key) = lookup("OPENAI_API_KEY").filter(|v| !v.is_empty()) {
            self.openai_api_key = Some(key);
        }
        Ok(self)
    }

    pub fn with_history_max_size(mut self, size: usize) -> Self {
        self.history_max_size = size;
        self
    }

    pub fn with_history_ttl_secs(mut self, ttl: u64) -> Self {
        self.history_ttl_secs = Some(ttl);
        self
    }

    pub fn with_max_delegation_depth(mut self, depth: usize) -> Self {
        self.max_delegation_depth = depth;
        self
    }

    pub fn with_print_request_messages(mut self, enabled: bool) -> Self {
        self.print_request_messages = enabled;
        self
    }

    pub fn with_connector(mut self, name: impl Into<String>, settings: ConnectorSettings) -> Self {
        self.connectors.insert(name.into(), settings);
        self
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>> {
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse::<T>()
        .map(Some)
        .map_err(|_| ParleyError::Configuration(format!("{key} has an invalid value: {raw}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = ParleyConfig::default();
        assert_eq!(config.history_max_size, 20);
        assert_eq!(config.max_delegation_depth, 8);
        assert!(!config.print_request_messages);
    }

    #[test]
    fn env_overrides_file_values() {
        let config = ParleyConfig::from_toml("history_max_size = 5\nmax_delegation_depth = 2")
            .unwrap()
            .with_vars(vars(&[
                ("PARLEY_HISTORY_MAX_SIZE", "50"),
                ("PARLEY_PRINT_REQUEST_MESSAGES", "true"),
            ]))
            .unwrap();
        assert_eq!(config.history_max_size, 50);
        assert_eq!(config.max_delegation_depth, 2);
        assert!(config.print_request_messages);
    }

    #[test]
    fn malformed_env_value_is_configuration_error() {
        let err = ParleyConfig::new()
            .with_vars(vars(&[("PARLEY_MAX_DELEGATION_DEPTH", "deep")]))
            .unwrap_err();
        assert!(matches!(err, ParleyError::Configuration(msg) if msg.contains("PARLEY_MAX_DELEGATION_DEPTH")));
    }

    #[test]
    fn connectors_table() {
        let config = ParleyConfig::from_toml(
            "[connectors.openai]\ntools = true\n\n[connectors.local]\n",
        )
        .unwrap();
        assert!(config.connectors["openai"].tools);
        assert!(!config.connectors["local"].tools);
    }
}
