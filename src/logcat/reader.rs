//! Device log scraping scoped to a [`LogSeparator`].

use std::sync::Arc;

use memchr::{memchr, memmem};

use crate::core::errors::Result;
use crate::logger::EventLog;
use crate::logger::jsonl::{EventType, LogEntry, Severity};
use crate::logcat::separator::{LOG_SEPARATOR_TAG, LogSeparator};
use crate::platform::pal::DeviceShell;

/// `logcat` invocation dumping the separator tag plus `tags` at info level,
/// silencing everything else.
#[must_use]
pub fn logcat_command(tags: &[&str]) -> String {
    let mut filters = format!("{LOG_SEPARATOR_TAG}:I");
    for tag in tags {
        filters.push(' ');
        filters.push_str(tag);
        filters.push_str(":I");
    }
    format!("logcat -v brief -d {filters} *:S")
}

/// Lines following the first line that contains `separator`. Without a
/// separator every line is returned; with one that never appears, none are.
#[must_use]
pub fn lines_after_separator(output: &str, separator: Option<&LogSeparator>) -> Vec<String> {
    let Some(separator) = separator else {
        return output.lines().map(str::to_string).collect();
    };
    let bytes = output.as_bytes();
    let Some(hit) = memmem::find(bytes, separator.as_str().as_bytes()) else {
        return Vec::new();
    };
    let Some(newline) = memchr(b'\n', &bytes[hit..]) else {
        return Vec::new();
    };
    output[hit + newline + 1..]
        .lines()
        .map(str::to_string)
        .collect()
}

/// Reads tagged device log lines through the shell.
#[derive(Clone)]
pub struct LogReader {
    shell: Arc<dyn DeviceShell>,
    log: EventLog,
}

impl LogReader {
    /// Reader over `shell`, reporting separators to `log`.
    pub fn new(shell: Arc<dyn DeviceShell>, log: EventLog) -> Self {
        Self { shell, log }
    }

    /// Write a fresh separator to the device log.
    pub fn separate_logs(&self) -> Result<LogSeparator> {
        let separator = LogSeparator::new();
        self.shell.execute(&separator.insert_command())?;
        self.log.record(
            &LogEntry::new(EventType::LogSeparator, Severity::Info).details(separator.as_str()),
        );
        Ok(separator)
    }

    /// Lines logged under `tags` after `separator`.
    pub fn device_logs_for_components(
        &self,
        separator: Option<&LogSeparator>,
        tags: &[&str],
    ) -> Result<Vec<String>> {
        let output = self.shell.execute(&logcat_command(tags))?;
        Ok(lines_after_separator(&output, separator))
    }
}

impl std::fmt::Debug for LogReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogReader")
            .field("log", &self.log)
            .finish_non_exhaustive()
    }
}
