//! State snapshot collector: one activity-manager and one window-manager
//! query per call, parsed into an owned [`StateSnapshot`].

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::core::errors::Result;
use crate::logger::EventLog;
use crate::logger::jsonl::{EventType, LogEntry, Severity};
use crate::platform::pal::DeviceShell;
use crate::state::SkippedLine;
use crate::state::am_parser::parse_am_dump;
use crate::state::model::{AmSnapshot, WmSnapshot};
use crate::state::wm_parser::parse_wm_dump;

/// Activity-manager dump command.
pub const AM_DUMP_COMMAND: &str = "dumpsys activity activities";
/// Window-manager dump command.
pub const WM_DUMP_COMMAND: &str = "dumpsys window -a";

/// The two subsystem views captured by one poll. Not transactionally
/// consistent: the device may change between the two queries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StateSnapshot {
    /// Activity-manager side.
    pub am: AmSnapshot,
    /// Window-manager side.
    pub wm: WmSnapshot,
}

/// Read-only snapshot source.
#[derive(Clone)]
pub struct StateCollector {
    shell: Arc<dyn DeviceShell>,
    log: EventLog,
}

impl StateCollector {
    /// Collector over `shell`, reporting to `log`.
    pub fn new(shell: Arc<dyn DeviceShell>, log: EventLog) -> Self {
        Self { shell, log }
    }

    /// The underlying transport.
    #[must_use]
    pub fn shell(&self) -> &Arc<dyn DeviceShell> {
        &self.shell
    }

    /// Event log shared with this collector.
    #[must_use]
    pub const fn log(&self) -> &EventLog {
        &self.log
    }

    /// Query both subsystems once each. Fails only on transport errors.
    pub fn collect(&self) -> Result<StateSnapshot> {
        let am = self.collect_am()?;
        let wm = self.collect_wm()?;
        self.log.record(
            &LogEntry::new(EventType::SnapshotCollected, Severity::Info).details(format!(
                "stacks={} windows={} displays={}",
                am.stack_count(),
                wm.windows.len(),
                wm.displays.len()
            )),
        );
        Ok(StateSnapshot { am, wm })
    }

    /// Query and parse the activity-manager dump.
    pub fn collect_am(&self) -> Result<AmSnapshot> {
        let text = self.run(AM_DUMP_COMMAND)?;
        let parsed = parse_am_dump(&text)?;
        self.report_skipped("activity", &parsed.skipped);
        Ok(parsed.snapshot)
    }

    /// Query and parse the window-manager dump.
    pub fn collect_wm(&self) -> Result<WmSnapshot> {
        let text = self.run(WM_DUMP_COMMAND)?;
        let parsed = parse_wm_dump(&text)?;
        self.report_skipped("window", &parsed.skipped);
        Ok(parsed.snapshot)
    }

    fn run(&self, command: &str) -> Result<String> {
        let started = Instant::now();
        let result = self.shell.execute(command);
        let elapsed = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        match &result {
            Ok(_) => self.log.record(
                &LogEntry::new(EventType::ShellCommand, Severity::Info)
                    .command(command)
                    .duration_ms(elapsed),
            ),
            Err(err) => {
                self.log.diag("SHELL", &format!("{command}: {err}"));
                self.log.record(
                    &LogEntry::new(EventType::ShellCommand, Severity::Critical)
                        .command(command)
                        .duration_ms(elapsed)
                        .error(err),
                );
            }
        }
        result
    }

    fn report_skipped(&self, source: &str, skipped: &[SkippedLine]) {
        for line in skipped {
            self.log.diag(
                "PARSE",
                &format!(
                    "{source} dump line {}: unparseable {}: {}",
                    line.line_no, line.reason, line.text
                ),
            );
            self.log.record(
                &LogEntry::new(EventType::ParseSkipped, Severity::Warning)
                    .condition(line.reason)
                    .details(format!("{source}:{}: {}", line.line_no, line.text)),
            );
        }
    }
}

impl std::fmt::Debug for StateCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateCollector")
            .field("log", &self.log)
            .finish_non_exhaustive()
    }
}
