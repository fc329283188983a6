//! Snapshot data model for the two subsystems.
//!
//! Snapshots are plain owned values built fresh on every poll. Query helpers
//! live here; cross-subsystem rules live in [`crate::state::invariants`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::state::component::ComponentName;

// ──────────────────── geometry ────────────────────

/// Axis-aligned rectangle in device pixels, right/bottom exclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    /// Left edge.
    pub left: i32,
    /// Top edge.
    pub top: i32,
    /// Right edge, exclusive.
    pub right: i32,
    /// Bottom edge, exclusive.
    pub bottom: i32,
}

impl Rect {
    /// Rectangle from its four edges.
    #[must_use]
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Rectangle anchored at the origin.
    #[must_use]
    pub const fn from_size(width: i32, height: i32) -> Self {
        Self::new(0, 0, width, height)
    }

    /// Horizontal extent.
    #[must_use]
    pub const fn width(&self) -> i32 {
        self.right - self.left
    }

    /// Vertical extent.
    #[must_use]
    pub const fn height(&self) -> i32 {
        self.bottom - self.top
    }

    /// Whether the rectangle covers no pixels.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }

    /// Whether `other` lies entirely inside `self`.
    #[must_use]
    pub const fn contains(&self, other: &Self) -> bool {
        self.left <= other.left
            && self.top <= other.top
            && self.right >= other.right
            && self.bottom >= other.bottom
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{},{}][{},{}]",
            self.left, self.top, self.right, self.bottom
        )
    }
}

// ──────────────────── enums ────────────────────

/// Windowing mode of a stack.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WindowingMode {
    /// Inherits the parent's mode.
    #[default]
    Undefined,
    /// Covers the whole display.
    Fullscreen,
    /// Picture-in-picture.
    Pinned,
    /// Primary half of split screen.
    SplitScreenPrimary,
    /// Secondary half of split screen.
    SplitScreenSecondary,
    /// Free-floating resizable window.
    Freeform,
}

impl WindowingMode {
    /// Parse the dump spelling (`fullscreen`, `split-screen-primary`, ...).
    #[must_use]
    pub fn from_dump(raw: &str) -> Option<Self> {
        Some(match raw {
            "undefined" => Self::Undefined,
            "fullscreen" => Self::Fullscreen,
            "pinned" => Self::Pinned,
            "split-screen-primary" => Self::SplitScreenPrimary,
            "split-screen-secondary" => Self::SplitScreenSecondary,
            "freeform" => Self::Freeform,
            _ => return None,
        })
    }

    /// Numeric value accepted by `am start --windowingMode`.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Undefined => 0,
            Self::Fullscreen => 1,
            Self::Pinned => 2,
            Self::SplitScreenPrimary => 3,
            Self::SplitScreenSecondary => 4,
            Self::Freeform => 5,
        }
    }

    /// Dump spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Fullscreen => "fullscreen",
            Self::Pinned => "pinned",
            Self::SplitScreenPrimary => "split-screen-primary",
            Self::SplitScreenSecondary => "split-screen-secondary",
            Self::Freeform => "freeform",
        }
    }
}

/// Activity type of a stack.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActivityType {
    /// Not yet classified.
    #[default]
    Undefined,
    /// Ordinary application activity.
    Standard,
    /// Launcher.
    Home,
    /// Recents screen.
    Recents,
    /// Assistant overlay.
    Assistant,
}

impl ActivityType {
    /// Parse the dump spelling (`standard`, `home`, ...).
    #[must_use]
    pub fn from_dump(raw: &str) -> Option<Self> {
        Some(match raw {
            "undefined" => Self::Undefined,
            "standard" => Self::Standard,
            "home" => Self::Home,
            "recents" => Self::Recents,
            "assistant" => Self::Assistant,
            _ => return None,
        })
    }

    /// Dump spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Standard => "standard",
            Self::Home => "home",
            Self::Recents => "recents",
            Self::Assistant => "assistant",
        }
    }
}

/// Activity lifecycle state as reported by the activity manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Record exists, not yet started.
    Created,
    /// Started but not in the foreground.
    Started,
    /// In the foreground with input focus.
    Resumed,
    /// Losing the foreground.
    Paused,
    /// No longer visible.
    Stopped,
    /// Finished or being torn down.
    Destroyed,
}

impl LifecycleState {
    /// Map the manager's internal state names onto the six public states.
    /// Transitional states collapse onto their destination.
    #[must_use]
    pub fn from_dump(raw: &str) -> Option<Self> {
        Some(match raw {
            "INITIALIZING" | "CREATED" => Self::Created,
            "STARTED" => Self::Started,
            "RESUMED" => Self::Resumed,
            "PAUSING" | "PAUSED" => Self::Paused,
            "STOPPING" | "STOPPED" => Self::Stopped,
            "FINISHING" | "DESTROYING" | "DESTROYED" => Self::Destroyed,
            _ => return None,
        })
    }

    /// Parse the user-facing spelling (`resumed`, `stopped`, ...).
    #[must_use]
    pub fn from_name(raw: &str) -> Option<Self> {
        Self::from_dump(&raw.to_ascii_uppercase())
    }

    /// User-facing spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Started => "started",
            Self::Resumed => "resumed",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
            Self::Destroyed => "destroyed",
        }
    }

    /// Whether an activity in this state should have a window.
    #[must_use]
    pub const fn has_window(self) -> bool {
        matches!(self, Self::Started | Self::Resumed | Self::Paused)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keyguard state. Occlusion only means something while showing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyguardStatus {
    /// No keyguard.
    #[default]
    NotShowing,
    /// Keyguard covers the apps.
    ShowingUnoccluded,
    /// An activity shows above the keyguard.
    ShowingOccluded,
}

impl KeyguardStatus {
    /// Combine the `mKeyguardShowing` and `mOccluded` flags.
    #[must_use]
    pub const fn from_flags(showing: bool, occluded: bool) -> Self {
        match (showing, occluded) {
            (false, _) => Self::NotShowing,
            (true, false) => Self::ShowingUnoccluded,
            (true, true) => Self::ShowingOccluded,
        }
    }

    /// Whether the keyguard is up, occluded or not.
    #[must_use]
    pub const fn is_showing(self) -> bool {
        !matches!(self, Self::NotShowing)
    }

    /// Whether an activity is shown above the keyguard.
    #[must_use]
    pub const fn is_occluded(self) -> bool {
        matches!(self, Self::ShowingOccluded)
    }
}

// ──────────────────── activity manager ────────────────────

/// One activity record in a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    /// Component the record runs.
    pub name: ComponentName,
    /// Lifecycle state.
    pub state: LifecycleState,
    /// Whether the manager marks it visible.
    pub visible: bool,
    /// Whether it is the root of its task.
    pub front_of_task: bool,
    /// Whether it is finishing.
    pub finishing: bool,
    /// Owning task id.
    pub task_id: i32,
}

impl Activity {
    /// Freshly created record in `task_id`.
    #[must_use]
    pub const fn new(name: ComponentName, task_id: i32) -> Self {
        Self {
            name,
            state: LifecycleState::Created,
            visible: false,
            front_of_task: false,
            finishing: false,
            task_id,
        }
    }
}

/// One task and its activities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Task id.
    pub id: i32,
    /// Task bounds, absent when the task fills its stack.
    pub bounds: Option<Rect>,
    /// Top to bottom.
    pub activities: Vec<Activity>,
}

impl Task {
    /// Top activity of the task.
    #[must_use]
    pub fn top_activity(&self) -> Option<&Activity> {
        self.activities.first()
    }
}

/// One stack (root task container) on a display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stack {
    /// Stack id.
    pub id: i32,
    /// Display the stack lives on.
    pub display_id: i32,
    /// Windowing mode.
    pub windowing_mode: WindowingMode,
    /// Activity type.
    pub activity_type: ActivityType,
    /// Stack bounds when not fullscreen.
    pub bounds: Option<Rect>,
    /// Top to bottom.
    pub tasks: Vec<Task>,
    /// Activity the stack reports as resumed.
    pub resumed_activity: Option<ComponentName>,
}

impl Stack {
    /// Activities of every task, top to bottom.
    pub fn activities(&self) -> impl Iterator<Item = &Activity> {
        self.tasks.iter().flat_map(|t| t.activities.iter())
    }

    /// Top task of the stack.
    #[must_use]
    pub fn top_task(&self) -> Option<&Task> {
        self.tasks.first()
    }

    /// Number of activities in the resumed state.
    #[must_use]
    pub fn resumed_count(&self) -> usize {
        self.activities()
            .filter(|a| a.state == LifecycleState::Resumed)
            .count()
    }
}

/// Stacks on one display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityDisplay {
    /// Display id.
    pub id: i32,
    /// Top to bottom.
    pub stacks: Vec<Stack>,
}

/// Activity-manager view of the device at one instant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmSnapshot {
    /// Displays, in dump order.
    pub displays: Vec<ActivityDisplay>,
    /// Stack holding focus.
    pub focused_stack_id: Option<i32>,
    /// Activity holding focus.
    pub focused_activity: Option<ComponentName>,
    /// Activities reported as resumed, one per display at most.
    pub resumed_activities: Vec<ComponentName>,
    /// Keyguard state.
    pub keyguard: KeyguardStatus,
    /// Recognised records that failed to parse.
    pub skipped_lines: usize,
}

impl AmSnapshot {
    /// Every stack across displays.
    pub fn stacks(&self) -> impl Iterator<Item = &Stack> {
        self.displays.iter().flat_map(|d| d.stacks.iter())
    }

    /// Every task across stacks.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.stacks().flat_map(|s| s.tasks.iter())
    }

    /// Every activity across tasks.
    pub fn activities(&self) -> impl Iterator<Item = &Activity> {
        self.stacks().flat_map(Stack::activities)
    }

    /// Number of stacks across displays.
    #[must_use]
    pub fn stack_count(&self) -> usize {
        self.stacks().count()
    }

    /// Display by id.
    #[must_use]
    pub fn display(&self, id: i32) -> Option<&ActivityDisplay> {
        self.displays.iter().find(|d| d.id == id)
    }

    /// Stack by id.
    #[must_use]
    pub fn stack_by_id(&self, id: i32) -> Option<&Stack> {
        self.stacks().find(|s| s.id == id)
    }

    /// Whether a stack matches `mode`/`kind`; `Undefined` matches anything.
    #[must_use]
    pub fn contains_stack(&self, mode: WindowingMode, kind: ActivityType) -> bool {
        self.stack(mode, kind).is_some()
    }

    /// First stack matching `mode`/`kind`; `Undefined` matches anything.
    #[must_use]
    pub fn stack(&self, mode: WindowingMode, kind: ActivityType) -> Option<&Stack> {
        self.stacks().find(|s| {
            (mode == WindowingMode::Undefined || s.windowing_mode == mode)
                && (kind == ActivityType::Undefined || s.activity_type == kind)
        })
    }

    /// Top stack on `display_id`.
    #[must_use]
    pub fn front_stack(&self, display_id: i32) -> Option<&Stack> {
        self.display(display_id).and_then(|d| d.stacks.first())
    }

    /// First record running `name`.
    #[must_use]
    pub fn activity(&self, name: &ComponentName) -> Option<&Activity> {
        self.activities().find(|a| a.name == *name)
    }

    /// Whether any record runs `name`.
    #[must_use]
    pub fn contains_activity(&self, name: &ComponentName) -> bool {
        self.activity(name).is_some()
    }

    /// Stack containing `name`.
    #[must_use]
    pub fn stack_of_activity(&self, name: &ComponentName) -> Option<&Stack> {
        self.stacks().find(|s| s.activities().any(|a| a.name == *name))
    }

    /// Task containing `name`.
    #[must_use]
    pub fn task_of_activity(&self, name: &ComponentName) -> Option<&Task> {
        self.tasks()
            .find(|t| t.activities.iter().any(|a| a.name == *name))
    }

    /// Whether `name` is marked visible.
    #[must_use]
    pub fn is_activity_visible(&self, name: &ComponentName) -> bool {
        self.activity(name).is_some_and(|a| a.visible)
    }

    /// Whether `name` is in `state`.
    #[must_use]
    pub fn has_activity_state(&self, name: &ComponentName, state: LifecycleState) -> bool {
        self.activity(name).is_some_and(|a| a.state == state)
    }

    /// Top activity of the home stack.
    #[must_use]
    pub fn home_activity(&self) -> Option<&Activity> {
        self.stack(WindowingMode::Undefined, ActivityType::Home)
            .and_then(|s| s.top_task())
            .and_then(Task::top_activity)
    }

    /// Whether the home activity is visible.
    #[must_use]
    pub fn is_home_visible(&self) -> bool {
        self.home_activity().is_some_and(|a| a.visible)
    }
}

// ──────────────────── window manager ────────────────────

/// Role of a window, from its type attribute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowKind {
    /// Application window.
    App,
    /// Starting (splash) window.
    Starting,
    /// Anything else: system bars, dialogs, wallpaper.
    #[default]
    Other,
}

impl WindowKind {
    /// Classify from the `ty=` attribute.
    #[must_use]
    pub fn from_type(raw: &str) -> Self {
        match raw {
            "BASE_APPLICATION" | "APPLICATION" | "1" | "2" => Self::App,
            "APPLICATION_STARTING" | "3" => Self::Starting,
            _ => Self::Other,
        }
    }
}

/// Window-manager view of one display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WmDisplay {
    /// Display id.
    pub id: i32,
    /// Current size, rotated.
    pub frame: Rect,
    /// Area available to apps.
    pub app_frame: Rect,
    /// Density in dots per inch.
    pub density_dpi: u32,
    /// Rotation in quarter turns.
    pub rotation: u8,
}

/// One window from the window dump.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowState {
    /// Window title.
    pub name: String,
    /// Display the window is on.
    pub display_id: i32,
    /// Stack id, `-1` when unknown.
    pub stack_id: i32,
    /// Whether the window is visible.
    pub visible: bool,
    /// Whether it has a surface.
    pub has_surface: bool,
    /// Window frame.
    pub frame: Rect,
    /// Frame of the containing task.
    pub containing_frame: Rect,
    /// Window role.
    pub kind: WindowKind,
}

impl WindowState {
    /// Invisible window titled `name` with no geometry.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            display_id: 0,
            stack_id: -1,
            visible: false,
            has_surface: false,
            frame: Rect::default(),
            containing_frame: Rect::default(),
            kind: WindowKind::Other,
        }
    }

    /// Whether this window belongs to `component` (its title spells it).
    #[must_use]
    pub fn is_for(&self, component: &ComponentName) -> bool {
        component.matches(&self.name)
    }
}

/// Window-manager view of the device at one instant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WmSnapshot {
    /// Displays, in dump order.
    pub displays: Vec<WmDisplay>,
    /// Windows, top to bottom.
    pub windows: Vec<WindowState>,
    /// Title of the focused window.
    pub focused_window: Option<String>,
    /// Application owning focus.
    pub focused_app: Option<ComponentName>,
    /// App transition state string.
    pub app_transition_state: Option<String>,
    /// Default picture-in-picture bounds.
    pub pinned_stack_default_bounds: Option<Rect>,
    /// Area picture-in-picture may move within.
    pub pinned_stack_movement_bounds: Option<Rect>,
    /// Recognised records that failed to parse.
    pub skipped_lines: usize,
}

impl WmSnapshot {
    /// Display by id.
    #[must_use]
    pub fn display(&self, id: i32) -> Option<&WmDisplay> {
        self.displays.iter().find(|d| d.id == id)
    }

    /// Ids of every display.
    #[must_use]
    pub fn display_ids(&self) -> Vec<i32> {
        self.displays.iter().map(|d| d.id).collect()
    }

    /// Rotation of `display_id`.
    #[must_use]
    pub fn rotation(&self, display_id: i32) -> Option<u8> {
        self.display(display_id).map(|d| d.rotation)
    }

    /// All windows whose title is exactly `name`.
    pub fn windows_named<'a, 'n>(
        &'a self,
        name: &'n str,
    ) -> impl Iterator<Item = &'a WindowState> {
        self.windows.iter().filter(move |w| w.name == name)
    }

    /// Non-starting windows belonging to `component`.
    pub fn windows_for<'a, 'c>(
        &'a self,
        component: &'c ComponentName,
    ) -> impl Iterator<Item = &'a WindowState> {
        self.windows
            .iter()
            .filter(move |w| w.kind != WindowKind::Starting && w.is_for(component))
    }

    /// Whether any window of `component` is visible.
    #[must_use]
    pub fn is_window_visible(&self, component: &ComponentName) -> bool {
        self.windows_for(component).any(|w| w.visible)
    }

    /// Whether no app transition is running.
    #[must_use]
    pub fn is_app_transition_idle(&self) -> bool {
        self.app_transition_state
            .as_deref()
            .is_none_or(|s| s == "APP_STATE_IDLE")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn component(raw: &str) -> ComponentName {
        ComponentName::unflatten(raw).unwrap()
    }

    fn sample_am() -> AmSnapshot {
        let mut home = Activity::new(component("com.launcher/.Home"), 1);
        home.state = LifecycleState::Stopped;
        let mut app = Activity::new(component("pkg.test/.Main"), 7);
        app.state = LifecycleState::Resumed;
        app.visible = true;
        AmSnapshot {
            displays: vec![ActivityDisplay {
                id: 0,
                stacks: vec![
                    Stack {
                        id: 3,
                        display_id: 0,
                        windowing_mode: WindowingMode::Fullscreen,
                        activity_type: ActivityType::Standard,
                        bounds: None,
                        tasks: vec![Task {
                            id: 7,
                            bounds: None,
                            activities: vec![app],
                        }],
                        resumed_activity: Some(component("pkg.test/.Main")),
                    },
                    Stack {
                        id: 0,
                        display_id: 0,
                        windowing_mode: WindowingMode::Fullscreen,
                        activity_type: ActivityType::Home,
                        bounds: None,
                        tasks: vec![Task {
                            id: 1,
                            bounds: None,
                            activities: vec![home],
                        }],
                        resumed_activity: None,
                    },
                ],
            }],
            focused_stack_id: Some(3),
            ..AmSnapshot::default()
        }
    }

    #[test]
    fn rect_geometry() {
        let r = Rect::new(10, 20, 110, 220);
        assert_eq!((r.width(), r.height()), (100, 200));
        assert!(!r.is_empty());
        assert!(Rect::new(5, 5, 5, 10).is_empty());
        assert!(Rect::from_size(1080, 1920).contains(&r));
        assert_eq!(r.to_string(), "[10,20][110,220]");
    }

    #[test]
    fn lifecycle_transitional_states_collapse() {
        assert_eq!(LifecycleState::from_dump("PAUSING"), Some(LifecycleState::Paused));
        assert_eq!(
            LifecycleState::from_dump("DESTROYING"),
            Some(LifecycleState::Destroyed)
        );
        assert_eq!(LifecycleState::from_name("resumed"), Some(LifecycleState::Resumed));
        assert_eq!(LifecycleState::from_dump("BOGUS"), None);
        assert!(!LifecycleState::Stopped.has_window());
    }

    #[test]
    fn keyguard_flags() {
        assert_eq!(KeyguardStatus::from_flags(false, true), KeyguardStatus::NotShowing);
        assert!(KeyguardStatus::from_flags(true, true).is_occluded());
        assert!(!KeyguardStatus::from_flags(true, false).is_occluded());
    }

    #[test]
    fn am_queries() {
        let am = sample_am();
        let main = component("pkg.test/.Main");
        assert_eq!(am.stack_count(), 2);
        assert_eq!(am.front_stack(0).map(|s| s.id), Some(3));
        assert_eq!(am.stack_of_activity(&main).map(|s| s.id), Some(3));
        assert_eq!(am.task_of_activity(&main).map(|t| t.id), Some(7));
        assert!(am.contains_stack(WindowingMode::Undefined, ActivityType::Home));
        assert!(!am.contains_stack(WindowingMode::Pinned, ActivityType::Undefined));
        assert!(am.has_activity_state(&main, LifecycleState::Resumed));
        assert!(!am.is_home_visible());
        assert_eq!(am.stack_by_id(3).map(Stack::resumed_count), Some(1));
    }

    #[test]
    fn wm_window_lookup_ignores_starting_windows() {
        let main = component("pkg.test/.Main");
        let mut real = WindowState::new("pkg.test/pkg.test.Main");
        real.kind = WindowKind::App;
        let mut splash = WindowState::new("pkg.test/pkg.test.Main");
        splash.kind = WindowKind::Starting;
        splash.visible = true;
        let wm = WmSnapshot {
            windows: vec![real, splash],
            ..WmSnapshot::default()
        };
        assert_eq!(wm.windows_for(&main).count(), 1);
        assert!(!wm.is_window_visible(&main));
        assert_eq!(wm.windows_named("pkg.test/pkg.test.Main").count(), 2);
        assert!(wm.is_app_transition_idle());
    }

    #[test]
    fn dump_enum_spellings() {
        assert_eq!(
            WindowingMode::from_dump("split-screen-primary"),
            Some(WindowingMode::SplitScreenPrimary)
        );
        assert_eq!(WindowingMode::Pinned.code(), 2);
        assert_eq!(ActivityType::from_dump("home"), Some(ActivityType::Home));
        assert_eq!(WindowKind::from_type("APPLICATION_STARTING"), WindowKind::Starting);
        assert_eq!(WindowKind::from_type("STATUS_BAR"), WindowKind::Other);
    }
}
