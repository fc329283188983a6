//! Lock screen state machine.
//!
//! ```text
//! Unlocked      --sleep-->            LockedInsecure --unlock--> Unlocked
//! Unlocked      --credential, sleep--> LockedSecure
//! LockedSecure  --enter credential--> UnlockedViaCredential
//! any           --close-->            Unlocked
//! ```

use serde::Serialize;

use crate::core::config::{LockConfig, WaitConfig};
use crate::core::errors::Result;
use crate::device::handle::DeviceStateHandle;
use crate::logger::EventLog;
use crate::session::{finish_restore, log_acquired, restore_all};
use crate::state::amwm::AmWmState;
use crate::state::wait::{WaitOutcome, WaitPolicy, Waiter};

/// Where the session believes the lock screen is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum LockState {
    Unlocked,
    LockedInsecure,
    LockedSecure,
    UnlockedViaCredential,
}

/// Drives keyguard transitions and restores lock settings on exit.
#[derive(Debug)]
pub struct LockScreenSession {
    device: DeviceStateHandle,
    waiter: Waiter,
    display_off: WaitPolicy,
    credential: String,
    was_lock_disabled: bool,
    lock_disabled: bool,
    credential_set: bool,
    state: LockState,
    closed: bool,
}

impl LockScreenSession {
    /// Session name used in logs.
    pub const NAME: &'static str = "lock_screen";

    /// Record the lock-disabled flag and make sure the lock screen is on.
    pub fn new(device: &DeviceStateHandle, lock: &LockConfig, waits: &WaitConfig) -> Result<Self> {
        let was_lock_disabled = device.is_lock_disabled()?;
        device.set_lock_disabled(false)?;
        log_acquired(
            device.log(),
            Self::NAME,
            &format!("lock disabled was {was_lock_disabled}"),
        );
        Ok(Self {
            device: device.clone(),
            waiter: Waiter::new(device.log().clone()),
            display_off: waits.display_off.policy(),
            credential: lock.credential.clone(),
            was_lock_disabled,
            lock_disabled: false,
            credential_set: false,
            state: LockState::Unlocked,
            closed: false,
        })
    }

    /// Current lock state.
    #[must_use]
    pub const fn state(&self) -> LockState {
        self.state
    }

    /// Whether the session installed a PIN.
    #[must_use]
    pub const fn is_credential_set(&self) -> bool {
        self.credential_set
    }

    fn log(&self) -> &EventLog {
        self.device.log()
    }

    fn transition(&mut self, next: LockState) {
        if next != self.state {
            self.log()
                .diag("SESSION", &format!("lock state {:?} -> {next:?}", self.state));
            self.state = next;
        }
    }

    /// Install the configured PIN.
    pub fn set_lock_credential(&mut self) -> Result<&mut Self> {
        self.device.set_lock_pin(&self.credential)?;
        self.credential_set = true;
        Ok(self)
    }

    /// Type the PIN on the bouncer and confirm it.
    pub fn enter_and_confirm_lock_credential(&mut self) -> Result<&mut Self> {
        self.device.input_text(&self.credential)?;
        self.device.press_enter_button()?;
        if self.state == LockState::LockedSecure {
            self.transition(LockState::UnlockedViaCredential);
        }
        Ok(self)
    }

    /// Turn the lock screen off entirely until close.
    pub fn disable_lock_screen(&mut self) -> Result<&mut Self> {
        self.device.set_lock_disabled(true)?;
        self.lock_disabled = true;
        Ok(self)
    }

    /// Press sleep and wait for the display to go dark. A display that
    /// stays on is logged, not fatal.
    pub fn sleep_device(&mut self) -> Result<&mut Self> {
        self.press_sleep_and_wait()?;
        let next = if self.lock_disabled {
            LockState::Unlocked
        } else if self.credential_set {
            LockState::LockedSecure
        } else {
            LockState::LockedInsecure
        };
        self.transition(next);
        Ok(self)
    }

    /// Press wakeup. The keyguard, if any, stays up.
    pub fn wake_up_device(&mut self) -> Result<&mut Self> {
        self.device.press_wakeup_button()?;
        Ok(self)
    }

    /// Dismiss an insecure keyguard. A secure one needs the credential.
    pub fn unlock_device(&mut self) -> Result<&mut Self> {
        self.device.press_unlock_button()?;
        if self.state == LockState::LockedInsecure {
            self.transition(LockState::Unlocked);
        }
        Ok(self)
    }

    /// Sleep, wake and wait until the keyguard shows unoccluded.
    pub fn goto_keyguard(&mut self, state: &mut AmWmState) -> Result<WaitOutcome<()>> {
        self.sleep_device()?.wake_up_device()?;
        state.wait_for_keyguard_showing_and_not_occluded()
    }

    /// Restore the lock settings, unlock the device and report the outcome.
    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        let result = self.restore();
        finish_restore(self.device.log(), Self::NAME, result, false)
    }

    fn press_sleep_and_wait(&self) -> Result<()> {
        self.device.press_sleep_button()?;
        let device = &self.device;
        let outcome = self.waiter.wait_until(
            &self.display_off,
            "display off",
            || device.is_display_on(),
            |on| !on,
        )?;
        if !outcome.is_converged() {
            self.log()
                .diag("SESSION", "display still on after sleep; continuing");
        }
        Ok(())
    }

    fn restore(&mut self) -> Result<()> {
        let flag = self.device.set_lock_disabled(self.was_lock_disabled);
        let credential = if self.credential_set {
            let cleared = self.device.clear_lock_credential(&self.credential);
            if cleared.is_ok() {
                self.credential_set = false;
            }
            cleared
        } else {
            Ok(())
        };
        self.lock_disabled = self.was_lock_disabled;
        let keys = restore_all([
            self.device.press_back_button(),
            self.press_sleep_and_wait(),
            self.device.press_wakeup_button(),
            self.device.press_unlock_button(),
        ]);
        self.transition(LockState::Unlocked);
        restore_all([flag, credential, keys])
    }
}

impl Drop for LockScreenSession {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let result = self.restore();
        let _ = finish_restore(self.device.log(), Self::NAME, result, true);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::platform::pal::{DeviceShell, MockShell};

    fn session(shell: &Arc<MockShell>) -> LockScreenSession {
        let device =
            DeviceStateHandle::new(Arc::clone(shell) as Arc<dyn DeviceShell>, EventLog::disabled());
        LockScreenSession::new(&device, &LockConfig::default(), &WaitConfig::immediate(2)).unwrap()
    }

    #[test]
    fn insecure_sleep_and_unlock() {
        let shell = Arc::new(MockShell::new());
        shell.respond("dumpsys power", "Display Power: state=OFF\n");
        let mut lock = session(&shell);
        assert_eq!(shell.count("locksettings set-disabled false"), 1);

        lock.sleep_device().unwrap();
        assert_eq!(lock.state(), LockState::LockedInsecure);
        lock.wake_up_device().unwrap().unlock_device().unwrap();
        assert_eq!(lock.state(), LockState::Unlocked);
        lock.close().unwrap();
        assert_eq!(shell.count("locksettings clear"), 0);
    }

    #[test]
    fn secure_path_needs_credential() {
        let shell = Arc::new(MockShell::new());
        shell.respond("dumpsys power", "Display Power: state=OFF\n");
        let mut lock = session(&shell);
        lock.set_lock_credential().unwrap().sleep_device().unwrap();
        assert_eq!(lock.state(), LockState::LockedSecure);
        lock.unlock_device().unwrap();
        assert_eq!(lock.state(), LockState::LockedSecure);
        lock.enter_and_confirm_lock_credential().unwrap();
        assert_eq!(lock.state(), LockState::UnlockedViaCredential);
        assert_eq!(shell.count("input text 1234"), 1);
        assert_eq!(shell.count("input keyevent 66"), 1);
    }

    #[test]
    fn drop_restores_flag_and_credential() {
        let shell = Arc::new(MockShell::new());
        shell.respond("locksettings get-disabled", "true\n");
        {
            let mut lock = session(&shell);
            lock.set_lock_credential().unwrap();
        }
        let history = shell.history();
        let tail: Vec<&str> = history.iter().rev().take(7).rev().map(String::as_str).collect();
        assert_eq!(
            tail,
            vec![
                "locksettings set-disabled true",
                "locksettings clear --old 1234",
                "input keyevent 4",
                "input keyevent 223",
                "dumpsys power",
                "input keyevent 224",
                "input keyevent 82",
            ]
        );
    }

    #[test]
    fn display_that_stays_on_is_not_fatal() {
        let shell = Arc::new(MockShell::new());
        shell.respond("dumpsys power", "Display Power: state=ON\n");
        let mut lock = session(&shell);
        lock.sleep_device().unwrap();
        assert_eq!(shell.count("dumpsys power"), 2);
    }

    #[test]
    fn close_waits_for_display_off_before_waking() {
        let shell = Arc::new(MockShell::new());
        shell.respond("dumpsys power", "Display Power: state=ON\n");
        let lock = session(&shell);
        lock.close().unwrap();
        assert_eq!(shell.count("dumpsys power"), 2);

        let history = shell.history();
        let sleep = history.iter().position(|c| c == "input keyevent 223").unwrap();
        let wake = history.iter().position(|c| c == "input keyevent 224").unwrap();
        let polls: Vec<usize> = history
            .iter()
            .enumerate()
            .filter(|(_, c)| c.as_str() == "dumpsys power")
            .map(|(i, _)| i)
            .collect();
        assert!(polls.iter().all(|i| (sleep..wake).contains(i)), "{history:?}");
    }

    #[test]
    fn close_reports_power_query_failure() {
        let shell = Arc::new(MockShell::new());
        let lock = session(&shell);
        shell.fail_transport("dumpsys power");
        let err = lock.close().unwrap_err();
        assert_eq!(err.code(), "AMWM-3003");
        assert_eq!(shell.count("input keyevent 82"), 1);
    }
}
