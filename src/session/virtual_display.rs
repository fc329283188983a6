//! Simulated secondary displays backed by overlay display devices.

use std::collections::BTreeSet;

use crate::command::SettingsNamespace;
use crate::core::errors::{HarnessError, Result};
use crate::device::handle::DeviceStateHandle;
use crate::session::settings::SettingsSession;
use crate::session::{finish_restore, log_acquired};
use crate::state::collector::StateCollector;
use crate::state::wait::{WaitOutcome, WaitPolicy, Waiter};

const OVERLAY_DISPLAY_DEVICES: &str = "overlay_display_devices";

/// Size and density of one overlay display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct OverlaySpec {
    pub width: u32,
    pub height: u32,
    pub density_dpi: u32,
}

impl OverlaySpec {
    /// Overlay of `width`x`height` at `density_dpi`.
    #[must_use]
    pub const fn new(width: u32, height: u32, density_dpi: u32) -> Self {
        Self {
            width,
            height,
            density_dpi,
        }
    }

    fn setting(&self) -> String {
        format!("{}x{}/{}", self.width, self.height, self.density_dpi)
    }
}

/// Creates overlay displays and removes them again on exit.
#[derive(Debug)]
pub struct VirtualDisplaySession {
    setting: Option<SettingsSession<String>>,
    collector: StateCollector,
    waiter: Waiter,
    policy: WaitPolicy,
    baseline: BTreeSet<i32>,
    created: Vec<i32>,
    closed: bool,
}

impl VirtualDisplaySession {
    /// Session name used in logs.
    pub const NAME: &'static str = "virtual_display";

    /// Record the displays the window manager currently knows about.
    pub fn new(
        device: &DeviceStateHandle,
        collector: StateCollector,
        policy: WaitPolicy,
    ) -> Result<Self> {
        let setting =
            SettingsSession::new(device, SettingsNamespace::Global, OVERLAY_DISPLAY_DEVICES)?;
        let baseline: BTreeSet<i32> = collector.collect_wm()?.display_ids().into_iter().collect();
        log_acquired(
            device.log(),
            Self::NAME,
            &format!("{} display(s) present", baseline.len()),
        );
        Ok(Self {
            setting: Some(setting),
            waiter: Waiter::new(collector.log().clone()),
            collector,
            policy,
            baseline,
            created: Vec::new(),
            closed: false,
        })
    }

    /// Ids of the displays this session added.
    #[must_use]
    pub fn created(&self) -> &[i32] {
        &self.created
    }

    /// Replace the overlay set with `displays` and wait until the window
    /// manager reports that many new display ids. The converged value holds
    /// the new ids in ascending order.
    pub fn create_displays(&mut self, displays: &[OverlaySpec]) -> Result<WaitOutcome<Vec<i32>>> {
        let value = displays
            .iter()
            .map(OverlaySpec::setting)
            .collect::<Vec<_>>()
            .join(";");
        let Some(setting) = self.setting.as_mut() else {
            return Err(HarnessError::Runtime {
                details: "virtual display session already closed".to_string(),
            });
        };
        setting.set(&value)?;

        let baseline = &self.baseline;
        let collector = &self.collector;
        let outcome = self.waiter.wait_until(
            &self.policy,
            &format!("{} overlay display(s)", displays.len()),
            || {
                Ok(collector
                    .collect_wm()?
                    .display_ids()
                    .into_iter()
                    .filter(|id| !baseline.contains(id))
                    .collect::<Vec<_>>())
            },
            |added| added.len() == displays.len(),
        )?;
        if outcome.is_converged() {
            self.created.clone_from(outcome.value());
        }
        Ok(outcome)
    }

    /// Convenience for the common single-display case.
    pub fn create_display(&mut self, spec: OverlaySpec) -> Result<WaitOutcome<Option<i32>>> {
        Ok(self
            .create_displays(&[spec])?
            .map(|ids| ids.first().copied()))
    }

    /// Clear the overlays, wait for their removal and report the outcome.
    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        let log = self.collector.log().clone();
        let result = self.restore();
        finish_restore(&log, Self::NAME, result, false)
    }

    /// Put the setting back, then wait for only the baseline displays.
    fn restore(&mut self) -> Result<()> {
        if let Some(setting) = self.setting.take() {
            setting.close()?;
        }
        let baseline = &self.baseline;
        let collector = &self.collector;
        let outcome = self.waiter.wait_until(
            &self.policy,
            "overlay displays removed",
            || {
                Ok(collector
                    .collect_wm()?
                    .display_ids()
                    .into_iter()
                    .collect::<BTreeSet<_>>())
            },
            |ids| ids == baseline,
        )?;
        let leftover: Vec<i32> = outcome.value().difference(baseline).copied().collect();
        self.created.clear();
        if leftover.is_empty() {
            Ok(())
        } else {
            Err(HarnessError::SessionRestore {
                session: Self::NAME,
                details: format!("displays {leftover:?} still present"),
            })
        }
    }
}

impl Drop for VirtualDisplaySession {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let log = self.collector.log().clone();
        let result = self.restore();
        let _ = finish_restore(&log, Self::NAME, result, true);
    }
}
