//! App-op overrides for one package, reset on exit.

use crate::command::AppOpsMode;
use crate::core::errors::Result;
use crate::device::handle::DeviceStateHandle;
use crate::session::{finish_restore, log_acquired};

/// `appops set` for one package; `appops reset` on close.
#[derive(Debug)]
pub struct AppOpsSession {
    device: DeviceStateHandle,
    package: String,
    closed: bool,
}

impl AppOpsSession {
    /// Session name used in logs.
    pub const NAME: &'static str = "app_ops";

    /// Scope app-op changes to `package`; nothing changes until `set_mode`.
    #[must_use]
    pub fn new(device: &DeviceStateHandle, package: &str) -> Self {
        log_acquired(device.log(), Self::NAME, package);
        Self {
            device: device.clone(),
            package: package.to_string(),
            closed: false,
        }
    }

    /// Package whose ops are reset on close.
    #[must_use]
    pub fn package(&self) -> &str {
        &self.package
    }

    /// Set `op` to `mode` for the package.
    pub fn set_mode(&self, op: &str, mode: AppOpsMode) -> Result<()> {
        self.device.set_app_op(&self.package, op, mode)
    }

    /// Raw `appops get` line, e.g. `RUN_IN_BACKGROUND: ignore`.
    pub fn mode(&self, op: &str) -> Result<String> {
        self.device.app_op(&self.package, op)
    }

    /// Reset every op of the package and report the outcome.
    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        let result = self.device.reset_app_ops(&self.package);
        finish_restore(self.device.log(), Self::NAME, result, false)
    }
}

impl Drop for AppOpsSession {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let result = self.device.reset_app_ops(&self.package);
        let _ = finish_restore(self.device.log(), Self::NAME, result, true);
    }
}
