//! Harness event logging: bracket-prefixed stderr diagnostics plus an
//! append-only JSONL event log.
//!
//! Every component holds a cheap, cloneable [`EventLog`]. A disabled log
//! swallows entries, so library code never branches on whether logging is on.

pub mod jsonl;

use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::config::LoggingConfig;
use crate::logger::jsonl::{JsonlConfig, JsonlWriter, LogEntry};

/// Shared handle to the JSONL event log.
#[derive(Clone, Default)]
pub struct EventLog {
    writer: Option<Arc<Mutex<JsonlWriter>>>,
    verbose: bool,
}

impl EventLog {
    /// A log that records nothing.
    #[must_use]
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Open the JSONL writer described by `config` (or a disabled log).
    #[must_use]
    pub fn from_config(config: &LoggingConfig) -> Self {
        if !config.enabled {
            return Self::disabled();
        }
        let writer = JsonlWriter::open(JsonlConfig {
            path: config.jsonl_path.clone(),
            fallback_path: config.fallback_path.clone(),
            max_size_bytes: config.max_size_bytes,
            max_rotated_files: config.max_rotated_files,
        });
        Self {
            writer: Some(Arc::new(Mutex::new(writer))),
            verbose: false,
        }
    }

    /// Also echo diagnostics (`[AMWM-*]` lines) to stderr.
    #[must_use]
    pub const fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Whether verbose diagnostics are on.
    #[must_use]
    pub const fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Append `entry` to the JSONL log, if enabled.
    pub fn record(&self, entry: &LogEntry) {
        if let Some(writer) = &self.writer {
            writer.lock().write_entry(entry);
        }
    }

    /// Print a tagged diagnostic line when verbose.
    pub fn diag(&self, tag: &str, message: &str) {
        if self.verbose {
            eprintln!("[AMWM-{tag}] {message}");
        }
    }
}

impl std::fmt::Debug for EventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLog")
            .field("enabled", &self.writer.is_some())
            .field("verbose", &self.verbose)
            .finish()
    }
}
