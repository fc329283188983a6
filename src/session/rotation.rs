//! Fixed user rotation with the accelerometer disabled.

use crate::command::SettingsNamespace;
use crate::core::errors::Result;
use crate::device::handle::DeviceStateHandle;
use crate::logger::EventLog;
use crate::session::settings::SettingsSession;
use crate::session::{finish_restore, log_acquired, restore_all};
use crate::state::amwm::AmWmState;
use crate::state::wait::WaitOutcome;

const ACCELEROMETER_ROTATION: &str = "accelerometer_rotation";
const USER_ROTATION: &str = "user_rotation";
const DEFAULT_DISPLAY: i32 = 0;

/// Pins the default display's rotation until closed.
///
/// Restores user rotation first, then the accelerometer setting.
#[derive(Debug)]
pub struct RotationSession {
    log: EventLog,
    // Field order is drop order.
    user_rotation: SettingsSession<i32>,
    accelerometer: SettingsSession<i32>,
}

impl RotationSession {
    /// Session name used in logs.
    pub const NAME: &'static str = "rotation";

    /// Capture both settings and switch the accelerometer off.
    pub fn new(device: &DeviceStateHandle) -> Result<Self> {
        let mut accelerometer =
            SettingsSession::new(device, SettingsNamespace::System, ACCELEROMETER_ROTATION)?;
        let user_rotation = SettingsSession::new(device, SettingsNamespace::System, USER_ROTATION)?;
        accelerometer.set(&0)?;
        log_acquired(device.log(), Self::NAME, "accelerometer off");
        Ok(Self {
            log: device.log().clone(),
            user_rotation,
            accelerometer,
        })
    }

    /// Rotation active before the session, if one was recorded.
    #[must_use]
    pub fn original_rotation(&self) -> Option<i32> {
        self.user_rotation.original()
    }

    /// Request `rotation` (0..=3) and wait for the window manager to report
    /// it. The outcome is returned so callers can skip on devices that
    /// ignore the request.
    pub fn set(&mut self, rotation: u8, state: &mut AmWmState) -> Result<WaitOutcome<()>> {
        self.user_rotation.set(&i32::from(rotation))?;
        state.wait_for_rotation(DEFAULT_DISPLAY, rotation)
    }

    /// Restore user rotation then the accelerometer, reporting the first failure.
    pub fn close(self) -> Result<()> {
        let Self {
            log,
            user_rotation,
            accelerometer,
        } = self;
        let result = restore_all([user_rotation.close(), accelerometer.close()]);
        finish_restore(&log, Self::NAME, result, false)
    }
}
