//! `wm size` / `wm density` overrides, restored on exit.

use crate::core::errors::Result;
use crate::device::handle::{DeviceStateHandle, MetricOverride};
use crate::session::{finish_restore, log_acquired, restore_all};

/// Overrides display metrics; puts back the previous override, or resets
/// when there was none.
#[derive(Debug)]
pub struct DisplayMetricsSession {
    device: DeviceStateHandle,
    original_size: MetricOverride<(u32, u32)>,
    original_density: MetricOverride<u32>,
    closed: bool,
}

impl DisplayMetricsSession {
    /// Session name used in logs.
    pub const NAME: &'static str = "display_metrics";

    /// Capture the current size and density overrides.
    pub fn new(device: &DeviceStateHandle) -> Result<Self> {
        let original_size = device.wm_size()?;
        let original_density = device.wm_density()?;
        log_acquired(
            device.log(),
            Self::NAME,
            &format!(
                "size {:?}, density {:?}",
                original_size.overridden.or(original_size.physical),
                original_density
                    .overridden
                    .or(original_density.physical)
            ),
        );
        Ok(Self {
            device: device.clone(),
            original_size,
            original_density,
            closed: false,
        })
    }

    /// Size state captured at creation.
    #[must_use]
    pub const fn original_size(&self) -> MetricOverride<(u32, u32)> {
        self.original_size
    }

    /// Density state captured at creation.
    #[must_use]
    pub const fn original_density(&self) -> MetricOverride<u32> {
        self.original_density
    }

    /// Override the display size.
    pub fn set_size(&self, width: u32, height: u32) -> Result<()> {
        self.device.set_wm_size(width, height)
    }

    /// Override the display density.
    pub fn set_density(&self, dpi: u32) -> Result<()> {
        self.device.set_wm_density(dpi)
    }

    /// Restore both overrides and report the outcome.
    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        let result = self.restore();
        finish_restore(self.device.log(), Self::NAME, result, false)
    }

    fn restore(&self) -> Result<()> {
        let size = match self.original_size.overridden {
            Some((width, height)) => self.device.set_wm_size(width, height),
            None => self.device.reset_wm_size(),
        };
        let density = match self.original_density.overridden {
            Some(dpi) => self.device.set_wm_density(dpi),
            None => self.device.reset_wm_density(),
        };
        restore_all([size, density])
    }
}

impl Drop for DisplayMetricsSession {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let result = self.restore();
        let _ = finish_restore(self.device.log(), Self::NAME, result, true);
    }
}
