#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;
use std::process::{Command, ExitStatus};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

use amwm_harness::core::errors::{HarnessError, Result};
use amwm_harness::logger::EventLog;
use amwm_harness::platform::pal::DeviceShell;
use amwm_harness::prelude::{ComponentName, DeviceStateHandle, StateCollector};

// ──────────────────── CLI runner ────────────────────

pub struct CmdResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub log_path: PathBuf,
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis())
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn resolve_bin_path() -> PathBuf {
    if let Ok(path) = std::env::var("CARGO_BIN_EXE_amwm") {
        return PathBuf::from(path);
    }

    let exe_name = if cfg!(windows) { "amwm.exe" } else { "amwm" };
    let fallback = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(PathBuf::from))
        .and_then(|deps| deps.parent().map(PathBuf::from))
        .map(|debug_dir| debug_dir.join(exe_name));

    match fallback {
        Some(path) if path.exists() => path,
        _ => panic!("unable to resolve amwm binary path for integration test"),
    }
}

pub fn run_cli_case(case_name: &str, args: &[&str]) -> CmdResult {
    let root = std::env::temp_dir().join("amwm-test-logs");
    fs::create_dir_all(&root).expect("create temp test log dir");

    let log_path = root.join(format!("{}-{}.log", sanitize(case_name), now_millis()));
    let bin_path = resolve_bin_path();

    let output = Command::new(&bin_path)
        .args(args)
        .env("AMWM_LOGGING_ENABLED", "false")
        .env_remove("AMWM_OUTPUT_FORMAT")
        .env("RUST_BACKTRACE", "1")
        .output()
        .expect("execute amwm command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    let mut log_content = String::new();
    let _ = writeln!(log_content, "case={case_name}");
    let _ = writeln!(log_content, "bin={}", bin_path.display());
    let _ = writeln!(log_content, "args={args:?}");
    let _ = writeln!(log_content, "status={}", output.status);
    log_content.push_str("----- stdout -----\n");
    log_content.push_str(&stdout);
    log_content.push('\n');
    log_content.push_str("----- stderr -----\n");
    log_content.push_str(&stderr);
    log_content.push('\n');
    fs::write(&log_path, log_content).expect("write test log");

    CmdResult {
        status: output.status,
        stdout,
        stderr,
        log_path,
    }
}

// ──────────────────── fake device ────────────────────

pub const HOME: &str = "com.android.launcher/.Launcher";
const HOME_STACK: i32 = 0;
const FIRST_APP_STACK: i32 = 10;
const FIRST_OVERLAY_DISPLAY: i32 = 2;
const PHYSICAL_SIZE: (u32, u32) = (1080, 1920);
const PHYSICAL_DENSITY: u32 = 420;

/// A state change that becomes visible only after some dump queries.
#[derive(Debug, Clone)]
enum Change {
    Launch(Vec<ComponentName>),
    Rotation(u8),
    Overlays(usize),
}

#[derive(Debug)]
struct Model {
    settings: BTreeMap<(String, String), String>,
    lock_disabled: bool,
    pin: Option<String>,
    typed: String,
    display_on: bool,
    keyguard_showing: bool,
    rotation: u8,
    overlays: usize,
    /// Launched activities, bottom to top.
    activities: Vec<ComponentName>,
    hidden_windows: Vec<ComponentName>,
    show_when_locked: Vec<ComponentName>,
    /// Windows that stay visible after their activity stops.
    stale_windows: Vec<ComponentName>,
    app_ops: BTreeMap<(String, String), String>,
    size_override: Option<(u32, u32)>,
    density_override: Option<u32>,
    logcat: Vec<String>,
    features: Vec<String>,
    lag: u32,
    pending: Vec<(u32, Change)>,
    offline: bool,
}

impl Model {
    fn new() -> Self {
        let mut settings = BTreeMap::new();
        settings.insert(
            ("system".to_string(), "accelerometer_rotation".to_string()),
            "1".to_string(),
        );
        settings.insert(
            ("system".to_string(), "user_rotation".to_string()),
            "0".to_string(),
        );
        Self {
            settings,
            lock_disabled: false,
            pin: None,
            typed: String::new(),
            display_on: true,
            keyguard_showing: false,
            rotation: 0,
            overlays: 0,
            activities: Vec::new(),
            hidden_windows: Vec::new(),
            show_when_locked: Vec::new(),
            stale_windows: Vec::new(),
            app_ops: BTreeMap::new(),
            size_override: None,
            density_override: None,
            logcat: Vec::new(),
            features: vec![
                "android.software.picture_in_picture".to_string(),
                "android.software.freeform_window_management".to_string(),
                "android.software.secure_lock_screen".to_string(),
                "android.hardware.screen.landscape".to_string(),
                "android.hardware.screen.portrait".to_string(),
            ],
            lag: 0,
            pending: Vec::new(),
            offline: false,
        }
    }

    fn schedule(&mut self, change: Change) {
        if self.lag == 0 {
            self.apply(change);
        } else {
            self.pending.push((self.lag, change));
        }
    }

    /// One dump query elapsed: age pending changes, applying the due ones.
    fn tick(&mut self) {
        let mut due = Vec::new();
        self.pending.retain_mut(|(remaining, change)| {
            *remaining -= 1;
            if *remaining == 0 {
                due.push(change.clone());
                false
            } else {
                true
            }
        });
        for change in due {
            self.apply(change);
        }
    }

    fn apply(&mut self, change: Change) {
        match change {
            Change::Launch(components) => {
                for component in components {
                    if let Some(top) = self.activities.last().cloned() {
                        self.log(top.simple_name(), "onPause");
                        self.log(top.simple_name(), "onStop");
                    }
                    self.activities.retain(|a| *a != component);
                    self.log(component.simple_name(), "onCreate");
                    self.log(component.simple_name(), "onStart");
                    self.log(component.simple_name(), "onResume");
                    self.activities.push(component);
                }
            }
            Change::Rotation(rotation) => self.rotation = rotation,
            Change::Overlays(count) => self.overlays = count,
        }
    }

    fn log(&mut self, tag: &str, message: &str) {
        self.logcat.push(format!("I/{tag}( 4242): {message}"));
    }

    fn setting(&self, namespace: &str, key: &str) -> Option<&String> {
        self.settings.get(&(namespace.to_string(), key.to_string()))
    }

    fn current_size(&self) -> (u32, u32) {
        let (w, h) = self.size_override.unwrap_or(PHYSICAL_SIZE);
        if self.rotation % 2 == 1 { (h, w) } else { (w, h) }
    }

    /// A show-when-locked activity on top occludes the keyguard.
    fn occluded(&self) -> bool {
        self.keyguard_showing
            && self
                .activities
                .last()
                .is_some_and(|a| self.show_when_locked.contains(a))
    }

    fn showing_activities(&self) -> bool {
        !self.keyguard_showing || self.occluded()
    }

    fn focused_stack(&self) -> i32 {
        match self.activities.len() {
            0 => HOME_STACK,
            n => FIRST_APP_STACK + i32::try_from(n - 1).unwrap_or(0),
        }
    }

    fn render_am(&self) -> String {
        let (width, height) = self.current_size();
        let mut out = String::from("ACTIVITY MANAGER ACTIVITIES (dumpsys activity activities)\n");
        out.push_str("Display #0 (activities from top to bottom):\n");
        let top = self.activities.len().checked_sub(1);
        for (index, activity) in self.activities.iter().enumerate().rev() {
            let stack_id = FIRST_APP_STACK + i32::try_from(index).unwrap_or(0);
            let task_id = 100 + stack_id;
            let is_top = Some(index) == top && self.showing_activities();
            let _ = writeln!(out, "  Stack #{stack_id}: type=standard mode=fullscreen");
            let _ = writeln!(out, "    Task id #{task_id}");
            let _ = writeln!(out, "    mBounds=Rect(0, 0 - {width}, {height})");
            push_activity(&mut out, activity, task_id, is_top);
            if is_top {
                let _ = writeln!(
                    out,
                    "    mResumedActivity: ActivityRecord{{r{task_id} u0 {} t{task_id}}}",
                    activity.short()
                );
            }
        }
        let home_top = self.activities.is_empty() && self.showing_activities();
        let _ = writeln!(out, "  Stack #{HOME_STACK}: type=home mode=fullscreen");
        out.push_str("    Task id #1\n");
        push_activity(&mut out, &home(), 1, home_top);
        if let Some(index) = top.filter(|_| self.showing_activities()) {
            let task_id = 100 + FIRST_APP_STACK + i32::try_from(index).unwrap_or(0);
            let _ = writeln!(
                out,
                "  ResumedActivity: ActivityRecord{{r{task_id} u0 {} t{task_id}}}",
                self.activities[index].short()
            );
        }
        let _ = writeln!(
            out,
            "  mFocusedStack=ActivityStack{{f0 stackId={} type=standard mode=fullscreen}}",
            self.focused_stack()
        );
        out.push_str("KeyguardController:\n");
        let _ = writeln!(out, "  mKeyguardShowing={}", self.keyguard_showing);
        let _ = writeln!(out, "  mOccluded={}", self.occluded());
        out
    }

    fn render_wm(&self) -> String {
        let (width, height) = self.current_size();
        let density = self.density_override.unwrap_or(PHYSICAL_DENSITY);
        let mut out = String::from("WINDOW MANAGER DISPLAY CONTENTS (dumpsys window displays)\n");
        let _ = writeln!(out, "  Display: mDisplayId=0");
        let _ = writeln!(
            out,
            "    init={}x{} {density}dpi cur={width}x{height} app={width}x{height} rng=0x0-0x0",
            PHYSICAL_SIZE.0, PHYSICAL_SIZE.1
        );
        let _ = writeln!(out, "    mRotation={} mAltOrientation=false", self.rotation);
        for overlay in 0..self.overlays {
            let id = FIRST_OVERLAY_DISPLAY + i32::try_from(overlay).unwrap_or(0);
            let _ = writeln!(out, "  Display: mDisplayId={id}");
            out.push_str("    init=800x600 160dpi cur=800x600 app=800x600 rng=0x0-0x0\n");
            out.push_str("    mRotation=0 mAltOrientation=false\n");
        }

        out.push_str("WINDOW MANAGER WINDOWS (dumpsys window windows)\n");
        let mut window = 0;
        let top = self.activities.len().checked_sub(1);
        for (index, activity) in self.activities.iter().enumerate().rev() {
            let stack_id = FIRST_APP_STACK + i32::try_from(index).unwrap_or(0);
            let visible = (Some(index) == top
                && self.showing_activities()
                && !self.hidden_windows.contains(activity))
                || self.stale_windows.contains(activity);
            push_window(&mut out, window, &activity.flatten(), stack_id, visible, (width, height));
            window += 1;
        }
        let home_visible = self.activities.is_empty() && self.showing_activities();
        push_window(&mut out, window, &home().flatten(), HOME_STACK, home_visible, (width, height));
        window += 1;
        let _ = writeln!(out, "  Window #{window} Window{{sb u0 StatusBar}}:");
        out.push_str("    mDisplayId=0 stackId=-1\n");
        out.push_str("    mAttrs={(0,0)(fillx63) ty=STATUS_BAR fmt=TRANSLUCENT}\n");
        out.push_str("    isVisible=true\n");

        let focus = if !self.showing_activities() {
            "StatusBar".to_string()
        } else {
            self.activities.last().map_or_else(|| home().flatten(), ComponentName::flatten)
        };
        let _ = writeln!(out, "  mCurrentFocus=Window{{fc u0 {focus}}}");
        let focused_app = self.activities.last().cloned().unwrap_or_else(home);
        let _ = writeln!(
            out,
            "  mFocusedApp=AppWindowToken{{fa token=Token{{fb ActivityRecord{{fc u0 {} t{}}}}}}}",
            focused_app.short(),
            100 + self.focused_stack()
        );
        out.push_str("  mAppTransition: AppTransition{t0 mAppTransitionState=APP_STATE_IDLE}\n");
        out
    }
}

fn home() -> ComponentName {
    ComponentName::unflatten(HOME).expect("home component")
}

fn push_activity(out: &mut String, activity: &ComponentName, task_id: i32, top: bool) {
    let state = if top { "RESUMED" } else { "STOPPED" };
    let _ = writeln!(
        out,
        "      * Hist #0: ActivityRecord{{a{task_id} u0 {} t{task_id}}}",
        activity.short()
    );
    let _ = writeln!(out, "          state={state} stopped={} finishing=false", !top);
    let _ = writeln!(out, "          keysPaused=false inHistory=true visible={top}");
    out.push_str("          frontOfTask=true\n");
}

fn push_window(
    out: &mut String,
    index: usize,
    title: &str,
    stack_id: i32,
    visible: bool,
    (width, height): (u32, u32),
) {
    let _ = writeln!(out, "  Window #{index} Window{{w{index} u0 {title}}}:");
    let _ = writeln!(out, "    mDisplayId=0 stackId={stack_id}");
    out.push_str("    mAttrs={(0,0)(fillxfill) ty=BASE_APPLICATION fmt=OPAQUE}\n");
    let _ = writeln!(out, "    mHasSurface={visible}");
    let _ = writeln!(out, "    mFrame=[0,0][{width},{height}]");
    let _ = writeln!(out, "    containing=[0,0][{width},{height}]");
    let _ = writeln!(out, "    isVisible={visible}");
}

fn unquote(raw: &str) -> String {
    let trimmed = raw.trim();
    trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(trimmed)
        .replace("\\\"", "\"")
}

/// Value of `flag` among whitespace-separated `args`.
fn flag_value<'a>(args: &[&'a str], flag: &str, key: Option<&str>) -> Option<&'a str> {
    args.windows(if key.is_some() { 3 } else { 2 })
        .find(|w| w[0] == flag && key.is_none_or(|k| w[1] == k))
        .map(|w| w[w.len() - 1])
}

/// Stateful in-memory device answering the shell commands the harness
/// issues, with dumps rendered in the formats the parsers read.
#[derive(Debug)]
pub struct FakeDevice {
    model: Mutex<Model>,
    history: Mutex<Vec<String>>,
}

impl FakeDevice {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            model: Mutex::new(Model::new()),
            history: Mutex::new(Vec::new()),
        })
    }

    /// Launches, rotations and overlay changes land only after `lag` dump
    /// queries.
    pub fn with_lag(lag: u32) -> Arc<Self> {
        let device = Self::new();
        device.model.lock().lag = lag;
        device
    }

    pub fn shell(self: &Arc<Self>) -> Arc<dyn DeviceShell> {
        Arc::clone(self) as Arc<dyn DeviceShell>
    }

    pub fn handle(self: &Arc<Self>) -> DeviceStateHandle {
        DeviceStateHandle::new(self.shell(), EventLog::disabled())
    }

    pub fn collector(self: &Arc<Self>) -> StateCollector {
        StateCollector::new(self.shell(), EventLog::disabled())
    }

    pub fn history(&self) -> Vec<String> {
        self.history.lock().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.history
            .lock()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    pub fn setting(&self, namespace: &str, key: &str) -> Option<String> {
        self.model.lock().setting(namespace, key).cloned()
    }

    pub fn put_setting(&self, namespace: &str, key: &str, value: &str) {
        self.model
            .lock()
            .settings
            .insert((namespace.to_string(), key.to_string()), value.to_string());
    }

    pub fn rotation(&self) -> u8 {
        self.model.lock().rotation
    }

    pub fn keyguard_showing(&self) -> bool {
        self.model.lock().keyguard_showing
    }

    pub fn pin(&self) -> Option<String> {
        self.model.lock().pin.clone()
    }

    pub fn lock_disabled(&self) -> bool {
        self.model.lock().lock_disabled
    }

    pub fn overlays(&self) -> usize {
        self.model.lock().overlays
    }

    pub fn app_op(&self, package: &str, op: &str) -> Option<String> {
        self.model
            .lock()
            .app_ops
            .get(&(package.to_string(), op.to_string()))
            .cloned()
    }

    pub fn size_override(&self) -> Option<(u32, u32)> {
        self.model.lock().size_override
    }

    pub fn density_override(&self) -> Option<u32> {
        self.model.lock().density_override
    }

    pub fn top_activity(&self) -> Option<ComponentName> {
        self.model.lock().activities.last().cloned()
    }

    /// Activity manager keeps reporting `activity` visible, but its window
    /// disappears.
    pub fn hide_window(&self, activity: &ComponentName) {
        self.model.lock().hidden_windows.push(activity.clone());
    }

    /// Keep the window of `activity` visible once it is no longer on top.
    pub fn leak_window(&self, activity: &ComponentName) {
        self.model.lock().stale_windows.push(activity.clone());
    }

    /// `activity` may show above the keyguard.
    pub fn mark_show_when_locked(&self, activity: &ComponentName) {
        self.model.lock().show_when_locked.push(activity.clone());
    }

    pub fn set_features(&self, features: &[&str]) {
        self.model.lock().features = features.iter().map(ToString::to_string).collect();
    }

    /// Every command fails at the transport until reconnected.
    pub fn set_offline(&self, offline: bool) {
        self.model.lock().offline = offline;
    }

    fn dispatch(&self, model: &mut Model, command: &str) -> String {
        let args: Vec<&str> = command.split_whitespace().collect();
        match args.as_slice() {
            ["dumpsys", "activity", "activities"] => {
                model.tick();
                model.render_am()
            }
            ["dumpsys", "window", ..] => {
                model.tick();
                model.render_wm()
            }
            ["dumpsys", "power"] => format!(
                "POWER MANAGER\n  Display Power: state={}\n",
                if model.display_on { "ON" } else { "OFF" }
            ),
            ["pm", "list", "features"] => model
                .features
                .iter()
                .map(|f| format!("feature:{f}\n"))
                .collect(),
            ["am", "no-home-screen"] => "false\n".to_string(),
            ["am", "start", rest @ ..] => {
                let mut launched = Vec::new();
                if let Some(component) = flag_value(rest, "-n", None)
                    .and_then(ComponentName::unflatten)
                {
                    launched.push(component);
                }
                if let Some(target) = flag_value(rest, "--es", Some("target_component"))
                    .and_then(ComponentName::unflatten)
                {
                    launched.push(target);
                }
                model.schedule(Change::Launch(launched));
                "Starting: Intent { }\n".to_string()
            }
            ["am", "force-stop", package] => {
                model.activities.retain(|a| a.package() != *package);
                String::new()
            }
            ["log", "-t", tag, token] => {
                model.log(tag, token);
                String::new()
            }
            ["logcat", ..] => {
                let mut out = model.logcat.join("\n");
                out.push('\n');
                out
            }
            ["input", "keyevent", code] => {
                self.key(model, code);
                String::new()
            }
            ["input", "text", text] => {
                model.typed = (*text).to_string();
                String::new()
            }
            ["settings", "get", namespace, key] => model
                .setting(namespace, key)
                .map_or_else(|| "null\n".to_string(), |v| format!("{v}\n")),
            ["settings", "put", namespace, key, ..] => {
                let value = command
                    .splitn(5, ' ')
                    .nth(4)
                    .map(unquote)
                    .unwrap_or_default();
                self.setting_changed(model, namespace, key, Some(&value));
                model
                    .settings
                    .insert(((*namespace).to_string(), (*key).to_string()), value);
                String::new()
            }
            ["settings", "delete", namespace, key] => {
                self.setting_changed(model, namespace, key, None);
                model
                    .settings
                    .remove(&((*namespace).to_string(), (*key).to_string()));
                "Deleted 1 rows\n".to_string()
            }
            ["locksettings", "get-disabled"] => format!("{}\n", model.lock_disabled),
            ["locksettings", "set-disabled", value] => {
                model.lock_disabled = *value == "true";
                String::new()
            }
            ["locksettings", "set-pin", pin] => {
                model.pin = Some((*pin).to_string());
                "Pin set to '****'\n".to_string()
            }
            ["locksettings", "clear", "--old", old] => {
                if model.pin.as_deref() == Some(*old) {
                    model.pin = None;
                    "Lock credential cleared\n".to_string()
                } else {
                    "Old password mismatch\n".to_string()
                }
            }
            ["appops", "set", package, op, mode] => {
                model
                    .app_ops
                    .insert(((*package).to_string(), (*op).to_string()), (*mode).to_string());
                String::new()
            }
            ["appops", "get", package, op] => model
                .app_ops
                .get(&((*package).to_string(), (*op).to_string()))
                .map_or_else(|| "No operations.\n".to_string(), |m| format!("{op}: {m}\n")),
            ["appops", "reset", package] => {
                model.app_ops.retain(|(p, _), _| p != package);
                String::new()
            }
            ["wm", "size"] => {
                let mut out = format!("Physical size: {}x{}\n", PHYSICAL_SIZE.0, PHYSICAL_SIZE.1);
                if let Some((w, h)) = model.size_override {
                    let _ = writeln!(out, "Override size: {w}x{h}");
                }
                out
            }
            ["wm", "size", "reset"] => {
                model.size_override = None;
                String::new()
            }
            ["wm", "size", value] => {
                model.size_override = value
                    .split_once('x')
                    .and_then(|(w, h)| Some((w.parse().ok()?, h.parse().ok()?)));
                String::new()
            }
            ["wm", "density"] => {
                let mut out = format!("Physical density: {PHYSICAL_DENSITY}\n");
                if let Some(dpi) = model.density_override {
                    let _ = writeln!(out, "Override density: {dpi}");
                }
                out
            }
            ["wm", "density", "reset"] => {
                model.density_override = None;
                String::new()
            }
            ["wm", "density", value] => {
                model.density_override = value.parse().ok();
                String::new()
            }
            _ => String::new(),
        }
    }

    fn key(&self, model: &mut Model, code: &str) {
        match code {
            // SLEEP
            "223" => {
                model.display_on = false;
                if !model.lock_disabled {
                    model.keyguard_showing = true;
                }
            }
            // WAKEUP
            "224" => model.display_on = true,
            // BACK finishes an activity shown over the keyguard.
            "4" => {
                if model.occluded() {
                    model.activities.pop();
                }
            }
            // MENU dismisses an insecure keyguard.
            "82" => {
                if model.display_on && model.pin.is_none() {
                    model.keyguard_showing = false;
                }
            }
            // ENTER confirms the typed credential on the bouncer.
            "66" => {
                if model.keyguard_showing && model.pin.as_deref() == Some(model.typed.as_str()) {
                    model.keyguard_showing = false;
                }
                model.typed.clear();
            }
            _ => {}
        }
    }

    fn setting_changed(&self, model: &mut Model, namespace: &str, key: &str, value: Option<&str>) {
        match (namespace, key) {
            ("system", "user_rotation") => {
                let locked = model
                    .setting("system", "accelerometer_rotation")
                    .is_none_or(|v| v == "0");
                if locked && let Some(rotation) = value.and_then(|v| v.parse::<u8>().ok()) {
                    model.schedule(Change::Rotation(rotation % 4));
                }
            }
            ("global", "overlay_display_devices") => {
                let count = value
                    .filter(|v| !v.is_empty())
                    .map_or(0, |v| v.split(';').count());
                model.schedule(Change::Overlays(count));
            }
            _ => {}
        }
    }
}

impl DeviceShell for FakeDevice {
    fn execute(&self, command: &str) -> Result<String> {
        self.history.lock().push(command.to_string());
        let mut model = self.model.lock();
        if model.offline {
            return Err(HarnessError::Transport {
                command: command.to_string(),
                details: "device offline".to_string(),
            });
        }
        Ok(self.dispatch(&mut model, command))
    }
}
