//! AMWM-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, HarnessError>;

/// Top-level error type for the harness.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("[AMWM-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[AMWM-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[AMWM-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    /// The device legitimately lacks the capability under test. Callers skip.
    #[error("[AMWM-1101] capability not supported by device: {capability}")]
    CapabilityAbsent { capability: String },

    #[error("[AMWM-2001] shell transport failure running `{command}`: {details}")]
    Transport { command: String, details: String },

    #[error("[AMWM-2002] unparseable {source_name} output: {details}")]
    DumpParse {
        source_name: &'static str,
        details: String,
    },

    #[error("[AMWM-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[AMWM-3001] assertion failed: {message}")]
    Assertion { message: String },

    #[error("[AMWM-3002] timed out after {attempts} attempt(s) waiting for {condition}")]
    WaitTimedOut { condition: String, attempts: u32 },

    #[error("[AMWM-3003] {session} failed to restore device state: {details}")]
    SessionRestore {
        session: &'static str,
        details: String,
    },

    #[error("[AMWM-3901] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[AMWM-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl HarnessError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "AMWM-1001",
            Self::MissingConfig { .. } => "AMWM-1002",
            Self::ConfigParse { .. } => "AMWM-1003",
            Self::CapabilityAbsent { .. } => "AMWM-1101",
            Self::Transport { .. } => "AMWM-2001",
            Self::DumpParse { .. } => "AMWM-2002",
            Self::Serialization { .. } => "AMWM-2101",
            Self::Assertion { .. } => "AMWM-3001",
            Self::WaitTimedOut { .. } => "AMWM-3002",
            Self::SessionRestore { .. } => "AMWM-3003",
            Self::Io { .. } => "AMWM-3901",
            Self::Runtime { .. } => "AMWM-3900",
        }
    }

    /// Whether retrying might resolve the failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::Io { .. } | Self::Runtime { .. }
        )
    }

    /// Whether the failure means "skip this scenario" rather than "fail it".
    #[must_use]
    pub const fn is_skip(&self) -> bool {
        matches!(self, Self::CapabilityAbsent { .. })
    }

    /// Convenience constructor for assertion failures.
    #[must_use]
    pub fn assertion(message: impl Into<String>) -> Self {
        Self::Assertion {
            message: message.into(),
        }
    }

    /// Convenience constructor for a missing device capability.
    #[must_use]
    pub fn capability_absent(capability: impl Into<String>) -> Self {
        Self::CapabilityAbsent {
            capability: capability.into(),
        }
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<serde_json::Error> for HarnessError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for HarnessError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}

impl From<toml::ser::Error> for HarnessError {
    fn from(value: toml::ser::Error) -> Self {
        Self::Serialization {
            context: "toml",
            details: value.to_string(),
        }
    }
}
