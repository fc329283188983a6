//! Explicit handle over the device's global state.
//!
//! Every mutation of settings, lock state, display metrics or app ops goes
//! through a [`DeviceStateHandle`], so sessions never reach for ambient
//! globals. Commands are logged as `shell_command` events.

use std::sync::{Arc, LazyLock};
use std::time::Instant;

use regex::Regex;

use crate::command::{self, AppOpsMode, KeyCode, SettingsNamespace};
use crate::core::errors::{HarnessError, Result};
use crate::logger::EventLog;
use crate::logger::jsonl::{EventType, LogEntry, Severity};
use crate::platform::pal::DeviceShell;
use crate::state::model::{ActivityType, AmSnapshot, Stack, WindowingMode};

/// Physical and override values reported by `wm size` / `wm density`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricOverride<T> {
    /// Panel value.
    pub physical: Option<T>,
    /// Active override, if one is set.
    pub overridden: Option<T>,
}

struct ProbePatterns {
    physical_size: Regex,
    override_size: Regex,
    physical_density: Regex,
    override_density: Regex,
    display_power: Regex,
    ui_mode: Regex,
    ui_mode_locked: Regex,
}

impl ProbePatterns {
    fn compile() -> std::result::Result<Self, regex::Error> {
        Ok(Self {
            physical_size: Regex::new(r"Physical size: (\d+)x(\d+)")?,
            override_size: Regex::new(r"Override size: (\d+)x(\d+)")?,
            physical_density: Regex::new(r"Physical density: (\d+)")?,
            override_density: Regex::new(r"Override density: (\d+)")?,
            display_power: Regex::new(r"Display Power: state=(\S+)")?,
            ui_mode: Regex::new(r"mCurUiMode=0x([0-9a-fA-F]+)")?,
            ui_mode_locked: Regex::new(r"mUiModeLocked=(true|false)")?,
        })
    }
}

static PATTERNS: LazyLock<std::result::Result<ProbePatterns, regex::Error>> =
    LazyLock::new(ProbePatterns::compile);

fn patterns() -> Result<&'static ProbePatterns> {
    PATTERNS.as_ref().map_err(|err| HarnessError::DumpParse {
        source_name: "device probe",
        details: format!("pattern compilation failed: {err}"),
    })
}

/// `UI_MODE_TYPE_MASK` and `UI_MODE_TYPE_VR_HEADSET`.
const UI_MODE_TYPE_MASK: u32 = 0x0f;
const UI_MODE_TYPE_VR_HEADSET: u32 = 0x07;

/// Cloneable handle used by sessions and scenario code to mutate the device.
#[derive(Clone)]
pub struct DeviceStateHandle {
    shell: Arc<dyn DeviceShell>,
    log: EventLog,
}

impl DeviceStateHandle {
    /// Handle over `shell` reporting to `log`.
    pub fn new(shell: Arc<dyn DeviceShell>, log: EventLog) -> Self {
        Self { shell, log }
    }

    /// Underlying shell.
    #[must_use]
    pub const fn shell(&self) -> &Arc<dyn DeviceShell> {
        &self.shell
    }

    /// Event log sessions report to.
    #[must_use]
    pub const fn log(&self) -> &EventLog {
        &self.log
    }

    /// Run one command, logging it. Output is returned untouched.
    pub fn run(&self, cmd: &str) -> Result<String> {
        let started = Instant::now();
        let result = self.shell.execute(cmd);
        let elapsed = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        match &result {
            Ok(_) => self.log.record(
                &LogEntry::new(EventType::ShellCommand, Severity::Info)
                    .command(cmd)
                    .duration_ms(elapsed),
            ),
            Err(err) => {
                self.log.diag("SHELL", &format!("{cmd}: {err}"));
                self.log.record(
                    &LogEntry::new(EventType::ShellCommand, Severity::Warning)
                        .command(cmd)
                        .duration_ms(elapsed)
                        .error(err),
                );
            }
        }
        result
    }

    // ──────────────────── settings ────────────────────

    /// Current value, `None` when the key is unset.
    pub fn get_setting(&self, namespace: SettingsNamespace, key: &str) -> Result<Option<String>> {
        let raw = self.run(&command::settings_get(namespace, key))?;
        let value = raw.trim();
        Ok(if value.is_empty() || value == "null" {
            None
        } else {
            Some(value.to_string())
        })
    }

    /// Write one setting.
    pub fn put_setting(&self, namespace: SettingsNamespace, key: &str, value: &str) -> Result<()> {
        self.run(&command::settings_put(namespace, key, value))
            .map(drop)
    }

    /// Remove one setting.
    pub fn delete_setting(&self, namespace: SettingsNamespace, key: &str) -> Result<()> {
        self.run(&command::settings_delete(namespace, key)).map(drop)
    }

    // ──────────────────── input ────────────────────

    /// Inject one key press.
    pub fn press_key(&self, key: KeyCode) -> Result<()> {
        self.run(&command::key_event(key)).map(drop)
    }

    /// Press the sleep key.
    pub fn press_sleep_button(&self) -> Result<()> {
        self.press_key(KeyCode::Sleep)
    }

    /// Press the wakeup key.
    pub fn press_wakeup_button(&self) -> Result<()> {
        self.press_key(KeyCode::Wakeup)
    }

    /// Dismisses an insecure keyguard.
    pub fn press_unlock_button(&self) -> Result<()> {
        self.press_key(KeyCode::Menu)
    }

    /// Press back.
    pub fn press_back_button(&self) -> Result<()> {
        self.press_key(KeyCode::Back)
    }

    /// Press home.
    pub fn press_home_button(&self) -> Result<()> {
        self.press_key(KeyCode::Home)
    }

    /// Press enter.
    pub fn press_enter_button(&self) -> Result<()> {
        self.press_key(KeyCode::Enter)
    }

    /// Press the app switch key.
    pub fn press_app_switch_button(&self) -> Result<()> {
        self.press_key(KeyCode::AppSwitch)
    }

    /// Type `text` into the focused field.
    pub fn input_text(&self, text: &str) -> Result<()> {
        self.run(&command::input_text(text)).map(drop)
    }

    // ──────────────────── activity manager ────────────────────

    /// Start the home activity.
    pub fn launch_home_activity(&self) -> Result<()> {
        self.run(command::AM_START_HOME_ACTIVITY).map(drop)
    }

    /// Force-stop `package`.
    pub fn force_stop(&self, package: &str) -> Result<()> {
        self.run(&command::force_stop(package)).map(drop)
    }

    /// Remove every stack in `am` accepted by `select`; returns the ids
    /// removed.
    pub fn remove_stacks<F>(&self, am: &AmSnapshot, mut select: F) -> Result<Vec<i32>>
    where
        F: FnMut(&Stack) -> bool,
    {
        let ids: Vec<i32> = am.stacks().filter(|s| select(s)).map(|s| s.id).collect();
        for id in &ids {
            self.run(&command::remove_stack(*id))?;
        }
        Ok(ids)
    }

    /// Remove every stack whose windowing mode is in `modes`.
    pub fn remove_stacks_in_windowing_modes(
        &self,
        am: &AmSnapshot,
        modes: &[WindowingMode],
    ) -> Result<Vec<i32>> {
        self.remove_stacks(am, |s| modes.contains(&s.windowing_mode))
    }

    /// Remove every stack whose activity type is in `kinds`.
    pub fn remove_stacks_with_activity_types(
        &self,
        am: &AmSnapshot,
        kinds: &[ActivityType],
    ) -> Result<Vec<i32>> {
        self.remove_stacks(am, |s| kinds.contains(&s.activity_type))
    }

    /// Some device classes (e.g. automotive test builds) ship without one.
    pub fn has_home_screen(&self) -> Result<bool> {
        let out = self.run(command::AM_NO_HOME_SCREEN)?;
        Ok(!out.trim_start().starts_with("true"))
    }

    // ──────────────────── probes ────────────────────

    /// Feature names from `pm list features`.
    pub fn features(&self) -> Result<Vec<String>> {
        let out = self.run(command::PM_LIST_FEATURES)?;
        Ok(out
            .lines()
            .filter_map(|line| line.trim().strip_prefix("feature:"))
            .map(|name| name.split('=').next().unwrap_or(name).to_string())
            .collect())
    }

    /// Whether the device lists feature `name`.
    pub fn has_feature(&self, name: &str) -> Result<bool> {
        Ok(self.features()?.iter().any(|f| f == name))
    }

    /// Whether the power service reports the display on.
    pub fn is_display_on(&self) -> Result<bool> {
        let out = self.run(command::DUMPSYS_POWER)?;
        Ok(patterns()?
            .display_power
            .captures(&out)
            .is_some_and(|c| &c[1] == "ON"))
    }

    /// Rotation of `display_id` from the display service, or `None` when
    /// the display is unknown.
    pub fn device_rotation(&self, display_id: i32) -> Result<Option<u8>> {
        let out = self.run(command::DUMPSYS_DISPLAYS)?;
        parse_device_rotation(&out, display_id)
    }

    /// Whether the UI mode is pinned to VR headset.
    pub fn is_ui_mode_locked_to_vr_headset(&self) -> Result<bool> {
        let out = self.run(command::DUMPSYS_UIMODE)?;
        let p = patterns()?;
        let mode = p
            .ui_mode
            .captures(&out)
            .and_then(|c| u32::from_str_radix(&c[1], 16).ok());
        let locked = p
            .ui_mode_locked
            .captures(&out)
            .is_some_and(|c| &c[1] == "true");
        Ok(locked && mode.is_some_and(|m| m & UI_MODE_TYPE_MASK == UI_MODE_TYPE_VR_HEADSET))
    }

    // ──────────────────── wm ────────────────────

    /// Physical and overridden display size.
    pub fn wm_size(&self) -> Result<MetricOverride<(u32, u32)>> {
        let out = self.run(&command::wm_size(None))?;
        let p = patterns()?;
        let size = |re: &Regex| {
            re.captures(&out)
                .and_then(|c| Some((c[1].parse().ok()?, c[2].parse().ok()?)))
        };
        Ok(MetricOverride {
            physical: size(&p.physical_size),
            overridden: size(&p.override_size),
        })
    }

    /// Override the display size.
    pub fn set_wm_size(&self, width: u32, height: u32) -> Result<()> {
        self.run(&command::wm_size(Some((width, height)))).map(drop)
    }

    /// Drop the display size override.
    pub fn reset_wm_size(&self) -> Result<()> {
        self.run(command::WM_SIZE_RESET).map(drop)
    }

    /// Physical and overridden density.
    pub fn wm_density(&self) -> Result<MetricOverride<u32>> {
        let out = self.run(&command::wm_density(None))?;
        let p = patterns()?;
        let density = |re: &Regex| re.captures(&out).and_then(|c| c[1].parse().ok());
        Ok(MetricOverride {
            physical: density(&p.physical_density),
            overridden: density(&p.override_density),
        })
    }

    /// Override the density.
    pub fn set_wm_density(&self, dpi: u32) -> Result<()> {
        self.run(&command::wm_density(Some(dpi))).map(drop)
    }

    /// Drop the density override.
    pub fn reset_wm_density(&self) -> Result<()> {
        self.run(command::WM_DENSITY_RESET).map(drop)
    }

    // ──────────────────── appops ────────────────────

    /// Raw `appops get` output for one op.
    pub fn app_op(&self, package: &str, op: &str) -> Result<String> {
        self.run(&command::appops_get(package, op))
            .map(|out| out.trim().to_string())
    }

    /// Set one app op for `package`.
    pub fn set_app_op(&self, package: &str, op: &str, mode: AppOpsMode) -> Result<()> {
        self.run(&command::appops_set(package, op, mode)).map(drop)
    }

    /// Reset every app op of `package`.
    pub fn reset_app_ops(&self, package: &str) -> Result<()> {
        self.run(&command::appops_reset(package)).map(drop)
    }

    // ──────────────────── locksettings ────────────────────

    /// `null` and anything other than `true` read as enabled.
    pub fn is_lock_disabled(&self) -> Result<bool> {
        let out = self.run(command::LOCKSETTINGS_GET_DISABLED)?;
        Ok(out.trim() == "true")
    }

    /// Enable or disable the lock screen.
    pub fn set_lock_disabled(&self, disabled: bool) -> Result<()> {
        self.run(&command::locksettings_set_disabled(disabled))
            .map(drop)
    }

    /// Install a PIN.
    pub fn set_lock_pin(&self, credential: &str) -> Result<()> {
        self.run(&command::locksettings_set_pin(credential)).map(drop)
    }

    /// Remove the PIN `credential`.
    pub fn clear_lock_credential(&self, credential: &str) -> Result<()> {
        self.run(&command::locksettings_clear(credential)).map(drop)
    }
}

impl std::fmt::Debug for DeviceStateHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceStateHandle")
            .field("log", &self.log)
            .finish_non_exhaustive()
    }
}

/// Find the `mOverrideDisplayInfo` line that follows `mDisplayId=<id>` and
/// read its `rotation` field.
fn parse_device_rotation(dump: &str, display_id: i32) -> Result<Option<u8>> {
    let pattern = format!(r"(?s)mDisplayId={display_id}\b.*?mOverrideDisplayInfo[^\n]*?\brotation (\d+)");
    let re = Regex::new(&pattern).map_err(|err| HarnessError::DumpParse {
        source_name: "display",
        details: err.to_string(),
    })?;
    Ok(re
        .captures(dump)
        .and_then(|c| c[1].parse::<u8>().ok())
        .filter(|r| *r <= 3))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::pal::MockShell;

    fn handle() -> (Arc<MockShell>, DeviceStateHandle) {
        let shell = Arc::new(MockShell::new());
        let handle = DeviceStateHandle::new(
            Arc::clone(&shell) as Arc<dyn DeviceShell>,
            EventLog::disabled(),
        );
        (shell, handle)
    }

    #[test]
    fn unset_settings_read_as_none() {
        let (shell, device) = handle();
        shell.respond("settings get system user_rotation", "null\n");
        shell.respond("settings get system accelerometer_rotation", "1\n");
        assert_eq!(
            device
                .get_setting(SettingsNamespace::System, "user_rotation")
                .unwrap(),
            None
        );
        assert_eq!(
            device
                .get_setting(SettingsNamespace::System, "accelerometer_rotation")
                .unwrap()
                .as_deref(),
            Some("1")
        );
    }

    #[test]
    fn features_strip_prefix_and_version() {
        let (shell, device) = handle();
        shell.respond(
            "pm list features",
            "feature:android.software.picture_in_picture\nfeature:android.hardware.vulkan.level=1\n",
        );
        assert!(device.has_feature("android.software.picture_in_picture").unwrap());
        assert!(device.has_feature("android.hardware.vulkan.level").unwrap());
        assert!(!device.has_feature("android.software.freeform_window_management").unwrap());
    }

    #[test]
    fn display_power_probe() {
        let (shell, device) = handle();
        shell.respond_sequence(
            "dumpsys power",
            vec![
                "Display Power: state=ON\n".to_string(),
                "Display Power: state=OFF\n".to_string(),
            ],
        );
        assert!(device.is_display_on().unwrap());
        assert!(!device.is_display_on().unwrap());
    }

    #[test]
    fn rotation_probe_is_scoped_to_display() {
        let dump = "\
  mDisplayId=0
    mOverrideDisplayInfo=DisplayInfo{\"Built-in\", 1080 x 1920, rotation 1, density 420}
  mDisplayId=2
    mOverrideDisplayInfo=DisplayInfo{\"Overlay\", 800 x 600, rotation 0, density 160}
";
        assert_eq!(parse_device_rotation(dump, 0).unwrap(), Some(1));
        assert_eq!(parse_device_rotation(dump, 2).unwrap(), Some(0));
        assert_eq!(parse_device_rotation(dump, 5).unwrap(), None);
    }

    #[test]
    fn home_screen_and_vr_probes() {
        let (shell, device) = handle();
        shell.respond("am no-home-screen", "false\n");
        shell.respond("dumpsys uimode", "mCurUiMode=0x17\nmUiModeLocked=true\n");
        assert!(device.has_home_screen().unwrap());
        assert!(device.is_ui_mode_locked_to_vr_headset().unwrap());

        shell.respond("am no-home-screen", "true\n");
        shell.respond("dumpsys uimode", "mCurUiMode=0x11\nmUiModeLocked=true\n");
        assert!(!device.has_home_screen().unwrap());
        assert!(!device.is_ui_mode_locked_to_vr_headset().unwrap());
    }

    #[test]
    fn wm_metrics_parse_override() {
        let (shell, device) = handle();
        shell.respond("wm size", "Physical size: 1080x1920\nOverride size: 720x1280\n");
        shell.respond("wm density", "Physical density: 420\n");
        let size = device.wm_size().unwrap();
        assert_eq!(size.physical, Some((1080, 1920)));
        assert_eq!(size.overridden, Some((720, 1280)));
        let density = device.wm_density().unwrap();
        assert_eq!(density.physical, Some(420));
        assert_eq!(density.overridden, None);
    }

    #[test]
    fn lock_disabled_defaults_to_false() {
        let (shell, device) = handle();
        shell.respond("locksettings get-disabled", "null\n");
        assert!(!device.is_lock_disabled().unwrap());
        device.set_lock_disabled(false).unwrap();
        assert_eq!(shell.count("locksettings set-disabled false"), 1);
    }
}
