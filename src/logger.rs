//! Gated log sink for socket diagnostics.
//!
//! The [`Logger`] sits in front of the `log` facade and drops everything
//! unless debugging is enabled and the message meets the configured
//! [`DebugLevel`]. Emitted messages use the `cablemux` target so they can be
//! filtered with `RUST_LOG=cablemux=info`.
//!
//! # Levels
//!
//! ```text
//! All  <  Info  <  Error
//! ```
//!
//! A threshold of `All` lets every message through, `Error` only errors.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Log target used for every gated message.
pub const LOG_TARGET: &str = "cablemux";

/// Minimum severity for gated logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DebugLevel {
    /// Log everything.
    All,
    /// Informational messages and errors.
    Info,
    /// Errors only.
    #[default]
    Error,
}

impl DebugLevel {
    /// Lowercase name as used in configuration files.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Info => "info",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for DebugLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DebugLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "info" => Ok(Self::Info),
            "error" => Ok(Self::Error),
            other => anyhow::bail!("Unknown debug level '{other}' (expected info, error or all)"),
        }
    }
}

/// Enabled flag plus severity threshold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Logger {
    enabled: bool,
    level: DebugLevel,
}

impl Logger {
    /// Create a logger with the given gate and threshold.
    #[must_use]
    pub fn new(enabled: bool, level: DebugLevel) -> Self {
        Self { enabled, level }
    }

    /// Whether debugging output is switched on at all.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Configured threshold.
    #[must_use]
    pub fn level(&self) -> DebugLevel {
        self.level
    }

    /// Whether a message at `level` would be emitted.
    #[must_use]
    pub fn should_log(&self, level: DebugLevel) -> bool {
        self.enabled && level >= self.level
    }

    /// Emit `message` if the gate is open for `level`.
    ///
    /// Returns `true` when the message was handed to the `log` facade.
    pub fn log(&self, message: &str, level: DebugLevel) -> bool {
        if !self.should_log(level) {
            return false;
        }

        match level {
            DebugLevel::Error => log::error!(target: LOG_TARGET, "{}", message),
            DebugLevel::Info | DebugLevel::All => log::info!(target: LOG_TARGET, "{}", message),
        }
        true
    }
}
