//! Ambient display (doze) switched off for the session.

use crate::command::SettingsNamespace;
use crate::core::errors::Result;
use crate::device::handle::DeviceStateHandle;
use crate::logger::EventLog;
use crate::session::settings::SettingsSession;
use crate::session::{finish_restore, log_acquired, restore_all};

/// Secure settings that can wake the ambient display.
pub const DOZE_SETTINGS: [&str; 5] = [
    "doze_enabled",
    "doze_always_on",
    "doze_pulse_on_pick_up",
    "doze_pulse_on_long_press",
    "doze_pulse_on_double_tap",
];

/// Zeroes every doze setting and restores them on exit.
#[derive(Debug)]
pub struct ScreenDozeSession {
    log: EventLog,
    settings: Vec<SettingsSession<bool>>,
}

impl ScreenDozeSession {
    /// Session name used in logs.
    pub const NAME: &'static str = "screen_doze";

    /// Capture and zero every doze setting.
    pub fn new(device: &DeviceStateHandle) -> Result<Self> {
        let mut settings = Vec::with_capacity(DOZE_SETTINGS.len());
        for key in DOZE_SETTINGS {
            let mut setting = SettingsSession::new(device, SettingsNamespace::Secure, key)?;
            setting.set(&false)?;
            settings.push(setting);
        }
        log_acquired(device.log(), Self::NAME, "doze disabled");
        Ok(Self {
            log: device.log().clone(),
            settings,
        })
    }

    /// Restore every doze setting in reverse order.
    pub fn close(self) -> Result<()> {
        let Self { log, settings } = self;
        let result = restore_all(settings.into_iter().rev().map(SettingsSession::close));
        finish_restore(&log, Self::NAME, result, false)
    }
}
