//! Socket configuration loading.
//!
//! Options are read from `config.json` in the cablemux config directory and
//! then overridden by environment variables. Every field has a default, so a
//! missing file yields a lazily-connecting socket with logging disabled.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::logger::{DebugLevel, Logger};

/// Environment variable overriding the config directory.
pub const CONFIG_DIR_ENV: &str = "CABLEMUX_CONFIG_DIR";

/// Name of the options file inside the config directory.
pub const CONFIG_FILE: &str = "config.json";

/// Options recognized by [`crate::Socket`].
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SocketOptions {
    /// Application key handed to the transport on connect.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
    /// Passed verbatim to [`crate::Transport::connect`].
    pub transport_options: serde_json::Value,
    /// Enable gated logging.
    pub debug: bool,
    /// Threshold for gated logging.
    pub debug_level: DebugLevel,
    /// Connect when the socket is constructed instead of on first subscribe.
    pub connect_immediately: bool,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            credential: None,
            transport_options: serde_json::Value::Object(serde_json::Map::new()),
            debug: false,
            debug_level: DebugLevel::Error,
            connect_immediately: false,
        }
    }
}

impl SocketOptions {
    /// Options with only the credential set.
    pub fn with_credential(credential: impl Into<String>) -> Self {
        Self {
            credential: Some(credential.into()),
            ..Self::default()
        }
    }

    /// Returns the configuration directory path, creating it if necessary.
    ///
    /// `CABLEMUX_CONFIG_DIR` wins over the platform config directory.
    pub fn config_dir() -> Result<PathBuf> {
        let dir = if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
            PathBuf::from(dir)
        } else {
            dirs::config_dir()
                .context("Could not determine config directory")?
                .join("cablemux")
        };
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config directory {}", dir.display()))?;
        Ok(dir)
    }

    /// Load options from the config directory with environment overrides.
    ///
    /// A missing or unreadable file falls back to defaults.
    pub fn load() -> Result<Self> {
        let path = Self::config_dir()?.join(CONFIG_FILE);
        let mut options = if path.exists() {
            Self::load_from_path(&path).unwrap_or_else(|e| {
                log::warn!("Ignoring unreadable config {}: {e:#}", path.display());
                Self::default()
            })
        } else {
            Self::default()
        };
        options.apply_env_overrides();
        Ok(options)
    }

    /// Parse options from a JSON file.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Write options as pretty JSON.
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("Failed to write {}", path.display()))
    }

    /// Apply `CABLEMUX_*` environment variables.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup.
    ///
    /// Unparseable values are logged and ignored.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(credential) = lookup("CABLEMUX_CREDENTIAL") {
            self.credential = Some(credential);
        }

        if let Some(debug) = lookup("CABLEMUX_DEBUG") {
            match parse_bool(&debug) {
                Some(value) => self.debug = value,
                None => log::warn!("Ignoring CABLEMUX_DEBUG={debug:?}: expected a boolean"),
            }
        }

        if let Some(level) = lookup("CABLEMUX_DEBUG_LEVEL") {
            match level.parse::<DebugLevel>() {
                Ok(value) => self.debug_level = value,
                Err(e) => log::warn!("Ignoring CABLEMUX_DEBUG_LEVEL: {e}"),
            }
        }

        if let Some(connect) = lookup("CABLEMUX_CONNECT_IMMEDIATELY") {
            match parse_bool(&connect) {
                Some(value) => self.connect_immediately = value,
                None => log::warn!(
                    "Ignoring CABLEMUX_CONNECT_IMMEDIATELY={connect:?}: expected a boolean"
                ),
            }
        }
    }

    /// Build the gated logger these options describe.
    #[must_use]
    pub fn logger(&self) -> Logger {
        Logger::new(self.debug, self.debug_level)
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_options() {
        let options = SocketOptions::default();
        assert!(options.credential.is_none());
        assert!(!options.debug);
        assert_eq!(options.debug_level, DebugLevel::Error);
        assert!(!options.connect_immediately);
        assert!(options.transport_options.is_object());
    }

    #[test]
    fn test_parse_camel_case_keys() {
        let json = r#"{
            "credential": "b4823ce2bf9110c0cf9f",
            "transportOptions": { "cluster": "eu" },
            "debug": true,
            "debugLevel": "info"
        }"#;
        let options: SocketOptions = serde_json::from_str(json).unwrap();
        assert_eq!(options.credential.as_deref(), Some("b4823ce2bf9110c0cf9f"));
        assert_eq!(options.transport_options["cluster"], "eu");
        assert!(options.debug);
        assert_eq!(options.debug_level, DebugLevel::Info);
        assert!(!options.connect_immediately);
    }

    #[test]
    fn test_rejects_unknown_debug_level() {
        let result = serde_json::from_str::<SocketOptions>(r#"{"debugLevel": "verbose"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut options = SocketOptions::default();
        options.apply_overrides_from(lookup_from(&[
            ("CABLEMUX_CREDENTIAL", "key-from-env"),
            ("CABLEMUX_DEBUG", "true"),
            ("CABLEMUX_DEBUG_LEVEL", "all"),
            ("CABLEMUX_CONNECT_IMMEDIATELY", "1"),
        ]));

        assert_eq!(options.credential.as_deref(), Some("key-from-env"));
        assert!(options.debug);
        assert_eq!(options.debug_level, DebugLevel::All);
        assert!(options.connect_immediately);
    }

    #[test]
    fn test_invalid_env_values_are_ignored() {
        let mut options = SocketOptions::default();
        options.apply_overrides_from(lookup_from(&[
            ("CABLEMUX_DEBUG", "maybe"),
            ("CABLEMUX_DEBUG_LEVEL", "loud"),
        ]));

        assert!(!options.debug);
        assert_eq!(options.debug_level, DebugLevel::Error);
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);

        let mut options = SocketOptions::with_credential("app-key");
        options.debug = true;
        options.save_to_path(&path).unwrap();

        let loaded = SocketOptions::load_from_path(&path).unwrap();
        assert_eq!(loaded, options);
    }

    #[test]
    fn test_logger_reflects_options() {
        let mut options = SocketOptions::default();
        options.debug = true;
        options.debug_level = DebugLevel::Info;
        let logger = options.logger();
        assert!(logger.is_enabled());
        assert_eq!(logger.level(), DebugLevel::Info);
    }
}
