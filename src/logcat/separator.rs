//! Unique markers written into the device log so later reads only see lines
//! emitted after a known point.

use std::fmt;

use rand::Rng;

use crate::core::errors::{HarnessError, Result};

/// Log tag the separator line is written under.
pub const LOG_SEPARATOR_TAG: &str = "LOG_SEPARATOR";

/// A random token, unique per scenario step.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LogSeparator {
    token: String,
}

impl LogSeparator {
    /// Fresh random token in 8-4-4-4-12 hex form.
    #[must_use]
    pub fn new() -> Self {
        let mut rng = rand::rng();
        let hi: u64 = rng.random();
        let lo: u64 = rng.random();
        Self {
            token: format!(
                "{:08x}-{:04x}-{:04x}-{:04x}-{:012x}",
                hi >> 32,
                (hi >> 16) & 0xffff,
                hi & 0xffff,
                lo >> 48,
                lo & 0xffff_ffff_ffff
            ),
        }
    }

    /// Wrap a token read back from elsewhere (CLI argument, saved state).
    /// The token must be non-empty and free of whitespace.
    pub fn from_token(token: impl Into<String>) -> Result<Self> {
        let token = token.into();
        if token.is_empty() || token.chars().any(char::is_whitespace) {
            return Err(HarnessError::InvalidConfig {
                details: format!(
                    "invalid log separator {token:?}; expected a non-empty token without spaces"
                ),
            });
        }
        Ok(Self { token })
    }

    /// Token text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.token
    }

    /// Shell command that writes this separator to the device log.
    #[must_use]
    pub fn insert_command(&self) -> String {
        format!("log -t {LOG_SEPARATOR_TAG} {}", self.token)
    }
}

impl Default for LogSeparator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LogSeparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token)
    }
}
