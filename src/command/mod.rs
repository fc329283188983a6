//! Shell command composition.
//!
//! Pure string builders for the `am`, `wm`, `input`, `settings`, `appops`
//! and `locksettings` tools. Nothing here talks to a device; execution goes
//! through [`crate::device::DeviceStateHandle`] or a raw
//! [`crate::platform::pal::DeviceShell`]. Exit codes are never checked, so
//! every builder produces exactly one command line.

pub mod launch;

use std::fmt::Write as _;

use crate::state::component::ComponentName;
use crate::state::model::{Rect, WindowingMode};

/// `FLAG_ACTIVITY_NEW_TASK | FLAG_ACTIVITY_MULTIPLE_TASK`.
pub const FLAG_NEW_TASK_MULTIPLE_TASK: u32 = 0x1800_0000;

/// Launches the default home activity.
pub const AM_START_HOME_ACTIVITY: &str =
    "am start -a android.intent.action.MAIN -c android.intent.category.HOME";

/// Prints `true` when the device has no home screen.
pub const AM_NO_HOME_SCREEN: &str = "am no-home-screen";

/// Lists stacks and their tasks.
pub const AM_STACK_LIST: &str = "am stack list";

/// Lists system features, one `feature:NAME` per line.
pub const PM_LIST_FEATURES: &str = "pm list features";

/// Power service dump with the display power state.
pub const DUMPSYS_POWER: &str = "dumpsys power";
/// Display service dump with per-display rotation.
pub const DUMPSYS_DISPLAYS: &str = "dumpsys display displays";
/// UI mode service dump.
pub const DUMPSYS_UIMODE: &str = "dumpsys uimode";

// ──────────────────── am start ────────────────────

/// `am start -n <activity>` followed by `--es key value` extras.
#[must_use]
pub fn am_start(activity: &ComponentName, extras: &[(&str, &str)]) -> String {
    let mut cmd = format!("am start -n {}", activity.short());
    push_string_extras(&mut cmd, extras);
    cmd
}

/// Start in a fresh task on `display_id`.
#[must_use]
pub fn am_start_on_display(
    activity: &ComponentName,
    display_id: i32,
    extras: &[(&str, &str)],
) -> String {
    let mut cmd = format!(
        "am start -n {} -f {:#010x} --display {display_id}",
        activity.short(),
        FLAG_NEW_TASK_MULTIPLE_TASK
    );
    push_string_extras(&mut cmd, extras);
    cmd
}

/// Start in a new task, leaving existing tasks of the same affinity alone.
#[must_use]
pub fn am_start_in_new_task(activity: &ComponentName) -> String {
    format!(
        "am start -n {} -f {:#010x}",
        activity.short(),
        FLAG_NEW_TASK_MULTIPLE_TASK
    )
}

/// Start with the home task placed directly behind the new task.
#[must_use]
pub fn am_start_over_home(activity: &ComponentName) -> String {
    format!("am start --activity-task-on-home -n {}", activity.short())
}

/// Start directly into a windowing mode.
#[must_use]
pub fn am_start_in_windowing_mode(activity: &ComponentName, mode: WindowingMode) -> String {
    format!(
        "am start -n {} --windowingMode {}",
        activity.short(),
        mode.code()
    )
}

fn push_string_extras(cmd: &mut String, extras: &[(&str, &str)]) {
    for (key, value) in extras {
        let _ = write!(cmd, " --es {key} {value}");
    }
}

// ──────────────────── am stack / task ────────────────────

/// Move the top activity of `stack_id` into the pinned stack.
#[must_use]
pub fn move_top_activity_to_pinned_stack(stack_id: i32) -> String {
    format!("am stack move-top-activity-to-pinned-stack {stack_id} 0 0 500 500")
}

/// Resize a stack; the tool takes origin plus size.
#[must_use]
pub fn resize_stack(stack_id: i32, left: i32, top: i32, width: i32, height: i32) -> String {
    format!("am stack resize {stack_id} {left} {top} {width} {height}")
}

/// Resize the docked stack and the tasks inside it independently.
#[must_use]
pub fn resize_docked_stack(
    stack_width: i32,
    stack_height: i32,
    task_width: i32,
    task_height: i32,
) -> String {
    format!(
        "am stack resize-docked-stack 0 0 {stack_width} {stack_height} 0 0 {task_width} {task_height}"
    )
}

/// Resize a task to `bounds`.
#[must_use]
pub fn resize_task(task_id: i32, bounds: Rect) -> String {
    format!(
        "am task resize {task_id} {} {} {} {}",
        bounds.left, bounds.top, bounds.right, bounds.bottom
    )
}

/// Move a task to the top of another stack.
#[must_use]
pub fn move_task(task_id: i32, stack_id: i32) -> String {
    format!("am stack move-task {task_id} {stack_id} true")
}

/// Remove one stack and its tasks.
#[must_use]
pub fn remove_stack(stack_id: i32) -> String {
    format!("am stack remove {stack_id}")
}

/// Stop every process of `package`.
#[must_use]
pub fn force_stop(package: &str) -> String {
    format!("am force-stop {package}")
}

/// `am broadcast -a <action>`, optionally scoped to one package.
#[must_use]
pub fn broadcast(action: &str, package: Option<&str>, extras: &[(&str, &str)]) -> String {
    let mut cmd = format!("am broadcast -a {action}");
    if let Some(package) = package {
        let _ = write!(cmd, " -p {package}");
    }
    push_string_extras(&mut cmd, extras);
    cmd
}

// ──────────────────── input ────────────────────

/// Key events the harness sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum KeyCode {
    Home,
    Back,
    Enter,
    Menu,
    AppSwitch,
    Sleep,
    Wakeup,
}

impl KeyCode {
    /// Android key code.
    #[must_use]
    pub const fn code(self) -> u16 {
        match self {
            Self::Home => 3,
            Self::Back => 4,
            Self::Enter => 66,
            Self::Menu => 82,
            Self::AppSwitch => 187,
            Self::Sleep => 223,
            Self::Wakeup => 224,
        }
    }
}

/// Inject one key press.
#[must_use]
pub fn key_event(key: KeyCode) -> String {
    format!("input keyevent {}", key.code())
}

/// Type `text` into the focused field.
#[must_use]
pub fn input_text(text: &str) -> String {
    format!("input text {text}")
}

// ──────────────────── settings ────────────────────

/// Settings provider table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum SettingsNamespace {
    System,
    Secure,
    Global,
}

impl SettingsNamespace {
    /// Namespace spelling used by `settings`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Secure => "secure",
            Self::Global => "global",
        }
    }
}

/// Read one setting; prints `null` when unset.
#[must_use]
pub fn settings_get(namespace: SettingsNamespace, key: &str) -> String {
    format!("settings get {} {key}", namespace.as_str())
}

/// Values containing spaces or separators are quoted for the device shell.
#[must_use]
pub fn settings_put(namespace: SettingsNamespace, key: &str, value: &str) -> String {
    format!("settings put {} {key} {}", namespace.as_str(), shell_quote(value))
}

/// Remove one setting.
#[must_use]
pub fn settings_delete(namespace: SettingsNamespace, key: &str) -> String {
    format!("settings delete {} {key}", namespace.as_str())
}

fn shell_quote(value: &str) -> String {
    let plain = !value.is_empty()
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"._-/,:=".contains(&b));
    if plain {
        value.to_string()
    } else {
        format!("\"{}\"", value.replace('"', "\\\""))
    }
}

// ──────────────────── wm ────────────────────

/// Query the size with `None`, override it with `Some`.
#[must_use]
pub fn wm_size(size: Option<(u32, u32)>) -> String {
    match size {
        Some((width, height)) => format!("wm size {width}x{height}"),
        None => "wm size".to_string(),
    }
}

/// Drop the size override.
pub const WM_SIZE_RESET: &str = "wm size reset";

/// Query the density with `None`, override it with `Some`.
#[must_use]
pub fn wm_density(density: Option<u32>) -> String {
    match density {
        Some(dpi) => format!("wm density {dpi}"),
        None => "wm density".to_string(),
    }
}

/// Drop the density override.
pub const WM_DENSITY_RESET: &str = "wm density reset";

// ──────────────────── appops ────────────────────

/// App-op mode names accepted by `appops set`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum AppOpsMode {
    Allow,
    Ignore,
    Deny,
    Default,
    Foreground,
}

impl AppOpsMode {
    /// Mode spelling used by `appops`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Ignore => "ignore",
            Self::Deny => "deny",
            Self::Default => "default",
            Self::Foreground => "foreground",
        }
    }
}

/// Set one app op.
#[must_use]
pub fn appops_set(package: &str, op: &str, mode: AppOpsMode) -> String {
    format!("appops set {package} {op} {}", mode.as_str())
}

/// Read one app op.
#[must_use]
pub fn appops_get(package: &str, op: &str) -> String {
    format!("appops get {package} {op}")
}

/// Reset every app op of `package`.
#[must_use]
pub fn appops_reset(package: &str) -> String {
    format!("appops reset {package}")
}

// ──────────────────── locksettings ────────────────────

/// Prints `true` when the lock screen is disabled.
pub const LOCKSETTINGS_GET_DISABLED: &str = "locksettings get-disabled";

/// Enable or disable the lock screen.
#[must_use]
pub fn locksettings_set_disabled(disabled: bool) -> String {
    format!("locksettings set-disabled {disabled}")
}

/// Install a PIN.
#[must_use]
pub fn locksettings_set_pin(credential: &str) -> String {
    format!("locksettings set-pin {credential}")
}

/// Remove the PIN `credential`.
#[must_use]
pub fn locksettings_clear(credential: &str) -> String {
    format!("locksettings clear --old {credential}")
}
