//! Device shell abstraction: the single transport every harness component uses.
//!
//! [`DeviceShell::execute`] is blocking and returns the command's full stdout.
//! It fails only on transport problems (adb missing, device offline); a shell
//! command that runs but reports a logical failure still returns `Ok` with
//! whatever it printed, and callers parse the text.

#![allow(missing_docs)]

use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Command;

use parking_lot::Mutex;

use crate::core::config::DeviceConfig;
use crate::core::errors::{HarnessError, Result};

/// Synchronous shell command execution on the device under test.
pub trait DeviceShell: Send + Sync {
    fn execute(&self, command: &str) -> Result<String>;
}

/// `adb shell` transport.
#[derive(Debug, Clone)]
pub struct AdbShell {
    adb_path: PathBuf,
    serial: Option<String>,
}

impl AdbShell {
    #[must_use]
    pub fn new(adb_path: impl Into<PathBuf>, serial: Option<String>) -> Self {
        Self {
            adb_path: adb_path.into(),
            serial,
        }
    }

    #[must_use]
    pub fn from_config(config: &DeviceConfig) -> Self {
        Self::new(config.adb_path.clone(), config.serial.clone())
    }

    fn adb_args<'a>(&'a self, command: &'a str) -> Vec<&'a str> {
        let mut args = Vec::with_capacity(4);
        if let Some(serial) = &self.serial {
            args.push("-s");
            args.push(serial.as_str());
        }
        args.push("shell");
        args.push(command);
        args
    }
}

impl DeviceShell for AdbShell {
    fn execute(&self, command: &str) -> Result<String> {
        let output = Command::new(&self.adb_path)
            .args(self.adb_args(command))
            .output()
            .map_err(|source| HarnessError::Transport {
                command: command.to_string(),
                details: format!("{}: {source}", self.adb_path.display()),
            })?;
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if is_adb_transport_error(&stdout, &stderr) {
            return Err(HarnessError::Transport {
                command: command.to_string(),
                details: stderr.trim().to_string(),
            });
        }
        Ok(stdout)
    }
}

/// adb reports its own failures (no device, unauthorized, offline) as
/// `error: ...` on stderr with nothing on stdout.
fn is_adb_transport_error(stdout: &str, stderr: &str) -> bool {
    stdout.trim().is_empty() && stderr.trim_start().starts_with("error:")
}

#[derive(Debug)]
struct ScriptedResponse {
    prefix: String,
    outputs: VecDeque<String>,
}

/// In-memory scripted shell for deterministic tests.
///
/// Responses are matched by longest command prefix. A scripted sequence is
/// consumed one entry per call and its final entry repeats forever.
/// Unmatched commands return empty stdout, like most mutating shell commands.
#[derive(Debug, Default)]
pub struct MockShell {
    responses: Mutex<Vec<ScriptedResponse>>,
    transport_failures: Mutex<Vec<String>>,
    history: Mutex<Vec<String>>,
}

impl MockShell {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Always answer commands starting with `prefix` with `output`.
    pub fn respond(&self, prefix: &str, output: impl Into<String>) -> &Self {
        self.respond_sequence(prefix, vec![output.into()])
    }

    /// Answer successive matching commands with `outputs` in order.
    pub fn respond_sequence(&self, prefix: &str, outputs: Vec<String>) -> &Self {
        let mut responses = self.responses.lock();
        responses.retain(|r| r.prefix != prefix);
        responses.push(ScriptedResponse {
            prefix: prefix.to_string(),
            outputs: outputs.into(),
        });
        self
    }

    /// Make commands starting with `prefix` fail at the transport level.
    pub fn fail_transport(&self, prefix: &str) -> &Self {
        self.transport_failures.lock().push(prefix.to_string());
        self
    }

    /// Every command executed so far, in order.
    #[must_use]
    pub fn history(&self) -> Vec<String> {
        self.history.lock().clone()
    }

    /// Number of executed commands starting with `prefix`.
    #[must_use]
    pub fn count(&self, prefix: &str) -> usize {
        self.history
            .lock()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }
}

impl DeviceShell for MockShell {
    fn execute(&self, command: &str) -> Result<String> {
        self.history.lock().push(command.to_string());

        if self
            .transport_failures
            .lock()
            .iter()
            .any(|p| command.starts_with(p.as_str()))
        {
            return Err(HarnessError::Transport {
                command: command.to_string(),
                details: "scripted transport failure".to_string(),
            });
        }

        let mut responses = self.responses.lock();
        let Some(entry) = responses
            .iter_mut()
            .filter(|r| command.starts_with(r.prefix.as_str()))
            .max_by_key(|r| r.prefix.len())
        else {
            return Ok(String::new());
        };
        let output = if entry.outputs.len() > 1 {
            entry.outputs.pop_front().unwrap_or_default()
        } else {
            entry.outputs.front().cloned().unwrap_or_default()
        };
        Ok(output)
    }
}
