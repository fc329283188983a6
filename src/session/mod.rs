//! Scoped mutations of device-global state.
//!
//! Every session captures the original value when it is created and puts it
//! back exactly once: on [`close`](SettingsSession::close), which reports
//! restoration errors, or on `Drop`, which logs them. `Drop` covers early
//! returns and unwinding panics alike. Sessions must nest strictly; two live
//! sessions over the same key restore in reverse creation order.

pub mod app_ops;
pub mod display_metrics;
pub mod lock_screen;
pub mod rotation;
pub mod screen_doze;
pub mod settings;
pub mod virtual_display;

pub use app_ops::AppOpsSession;
pub use display_metrics::DisplayMetricsSession;
pub use lock_screen::{LockScreenSession, LockState};
pub use rotation::RotationSession;
pub use screen_doze::ScreenDozeSession;
pub use settings::{SettingValue, SettingsSession};
pub use virtual_display::VirtualDisplaySession;

use crate::core::errors::{HarnessError, Result};
use crate::logger::EventLog;
use crate::logger::jsonl::{EventType, LogEntry, Severity};

pub(crate) fn log_acquired(log: &EventLog, session: &'static str, details: &str) {
    log.diag("SESSION", &format!("{session}: acquired ({details})"));
    log.record(
        &LogEntry::new(EventType::SessionAcquired, Severity::Info)
            .session(session)
            .details(details),
    );
}

/// Record how a restore went and fold any failure into `SessionRestore`.
pub(crate) fn finish_restore(
    log: &EventLog,
    session: &'static str,
    result: Result<()>,
    from_drop: bool,
) -> Result<()> {
    let how = if from_drop { "drop" } else { "close" };
    match result {
        Ok(()) => {
            log.diag("SESSION", &format!("{session}: restored on {how}"));
            log.record(
                &LogEntry::new(EventType::SessionRestored, Severity::Info)
                    .session(session)
                    .details(how),
            );
            Ok(())
        }
        Err(err) => {
            let err = match err {
                HarnessError::SessionRestore { .. } => err,
                other => HarnessError::SessionRestore {
                    session,
                    details: other.to_string(),
                },
            };
            log.diag("SESSION", &format!("{session}: restore failed on {how}: {err}"));
            log.record(
                &LogEntry::new(EventType::SessionRestoreFailed, Severity::Critical)
                    .session(session)
                    .details(how)
                    .error(&err),
            );
            Err(err)
        }
    }
}

/// Run every restore step even if an earlier one fails; report the first
/// failure.
pub(crate) fn restore_all(steps: impl IntoIterator<Item = Result<()>>) -> Result<()> {
    let mut first = Ok(());
    for step in steps {
        if first.is_ok() {
            first = step;
        }
    }
    first
}
