//! Cross-subsystem invariant checker.
//!
//! [`InvariantChecker::check`] is a pure function of one [`StateSnapshot`]:
//! running it twice on the same pair yields the same report.

use std::fmt;

use serde::Serialize;

use crate::core::errors::{HarnessError, Result};
use crate::state::collector::StateSnapshot;
use crate::state::component::ComponentName;
use crate::state::model::{KeyguardStatus, WindowState, WmSnapshot};

/// Which checks run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckOptions {
    /// Compare task bounds with window containing frames. Turn off while a
    /// resize is in flight.
    pub compare_bounds: bool,
}

impl Default for CheckOptions {
    fn default() -> Self {
        Self {
            compare_bounds: true,
        }
    }
}

/// Category of a broken invariant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// The activity manager reports no stacks at all.
    NoStacks,
    /// The focused stack id names no stack.
    UnknownFocusedStack,
    /// A stack holds more than one resumed activity.
    MultipleResumed,
    /// An activity-manager display is unknown to the window manager.
    DisplayMissingInWm,
    /// A window sits on a display the window manager does not list.
    WindowOnUnknownDisplay,
    /// A visible activity has no visible window.
    ActivityWithoutVisibleWindow,
    /// A stopped, destroyed or finishing activity still shows a window.
    WindowForInactiveActivity,
    /// Task bounds differ from the frame of its windows.
    BoundsMismatch,
}

/// One broken invariant with what was expected and what the device showed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    /// Which invariant broke.
    pub kind: ViolationKind,
    /// Stack, display, window or activity the violation concerns.
    pub subject: String,
    /// What the invariant requires.
    pub expected: String,
    /// What the snapshot showed.
    pub observed: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} [{}]: expected {}, observed {}",
            self.kind, self.subject, self.expected, self.observed
        )
    }
}

/// Outcome of one check pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvariantReport {
    /// Every violation found, in check order.
    pub violations: Vec<Violation>,
    /// Keyguard state the visibility check ran under.
    pub keyguard: KeyguardStatus,
    /// Whether visibility was checked (not while the keyguard hides apps).
    pub visibility_checked: bool,
    /// Whether bounds were compared.
    pub bounds_checked: bool,
}

impl InvariantReport {
    /// Whether no invariant was violated.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.violations.is_empty()
    }

    /// Fail with every violation spelled out.
    pub fn into_result(self) -> Result<()> {
        if self.violations.is_empty() {
            return Ok(());
        }
        let lines: Vec<String> = self.violations.iter().map(ToString::to_string).collect();
        Err(HarnessError::assertion(format!(
            "{} invariant violation(s): {}",
            lines.len(),
            lines.join("; ")
        )))
    }
}

/// Structural checks between the activity-manager and window-manager views.
#[derive(Debug, Clone, Copy, Default)]
pub struct InvariantChecker {
    options: CheckOptions,
}

impl InvariantChecker {
    /// Checker running the given checks.
    #[must_use]
    pub const fn new(options: CheckOptions) -> Self {
        Self { options }
    }

    /// Checks this checker runs.
    #[must_use]
    pub const fn options(&self) -> CheckOptions {
        self.options
    }

    /// Run every enabled check against `state`.
    #[must_use]
    pub fn check(&self, state: &StateSnapshot) -> InvariantReport {
        let mut violations = Vec::new();
        check_am_sanity(state, &mut violations);
        check_displays(state, &mut violations);

        let keyguard = state.am.keyguard;
        let visibility_checked = keyguard != KeyguardStatus::ShowingUnoccluded;
        if visibility_checked {
            check_visibility(state, &mut violations);
        }
        check_inactive_windows(state, &mut violations);
        if self.options.compare_bounds {
            check_bounds(state, &mut violations);
        }

        InvariantReport {
            violations,
            keyguard,
            visibility_checked,
            bounds_checked: self.options.compare_bounds,
        }
    }
}

fn check_am_sanity(state: &StateSnapshot, out: &mut Vec<Violation>) {
    let am = &state.am;
    if am.stack_count() == 0 {
        out.push(Violation {
            kind: ViolationKind::NoStacks,
            subject: "activity manager".to_string(),
            expected: "at least one stack".to_string(),
            observed: "no stacks".to_string(),
        });
    }
    if let Some(id) = am.focused_stack_id
        && am.stack_by_id(id).is_none()
    {
        out.push(Violation {
            kind: ViolationKind::UnknownFocusedStack,
            subject: format!("stack {id}"),
            expected: "focused stack id to name an existing stack".to_string(),
            observed: format!(
                "stacks {:?}",
                am.stacks().map(|s| s.id).collect::<Vec<_>>()
            ),
        });
    }
    for stack in am.stacks() {
        let resumed = stack.resumed_count();
        if resumed > 1 {
            out.push(Violation {
                kind: ViolationKind::MultipleResumed,
                subject: format!("stack {}", stack.id),
                expected: "at most one resumed activity".to_string(),
                observed: format!("{resumed} resumed"),
            });
        }
    }
}

fn check_displays(state: &StateSnapshot, out: &mut Vec<Violation>) {
    let wm_ids = state.wm.display_ids();
    for display in &state.am.displays {
        if !wm_ids.contains(&display.id) {
            out.push(Violation {
                kind: ViolationKind::DisplayMissingInWm,
                subject: format!("display {}", display.id),
                expected: "window manager to report the display".to_string(),
                observed: format!("window manager displays {wm_ids:?}"),
            });
        }
    }
    for window in &state.wm.windows {
        if !wm_ids.contains(&window.display_id) {
            out.push(Violation {
                kind: ViolationKind::WindowOnUnknownDisplay,
                subject: window.name.clone(),
                expected: format!("display id in {wm_ids:?}"),
                observed: format!("display {}", window.display_id),
            });
        }
    }
}

fn check_visibility(state: &StateSnapshot, out: &mut Vec<Violation>) {
    for activity in state.am.activities() {
        if !activity.visible || activity.finishing {
            continue;
        }
        if !state.wm.is_window_visible(&activity.name) {
            let windows = state.wm.windows_for(&activity.name).count();
            out.push(Violation {
                kind: ViolationKind::ActivityWithoutVisibleWindow,
                subject: activity.name.short(),
                expected: format!("a visible window named {}", activity.name.flatten()),
                observed: if windows == 0 {
                    "no window".to_string()
                } else {
                    format!("{windows} window(s), none visible")
                },
            });
        }
    }
}

/// Only started, unfinished activities may own a visible window. A
/// component with a live instance elsewhere is skipped since windows are
/// matched by component, not by record.
fn check_inactive_windows(state: &StateSnapshot, out: &mut Vec<Violation>) {
    let live = |name: &ComponentName| {
        state
            .am
            .activities()
            .any(|a| a.name == *name && a.state.has_window() && !a.finishing)
    };
    let mut reported: Vec<&ComponentName> = Vec::new();
    for activity in state.am.activities() {
        if (activity.state.has_window() && !activity.finishing)
            || reported.contains(&&activity.name)
            || live(&activity.name)
        {
            continue;
        }
        let visible = state.wm.windows_for(&activity.name).filter(|w| w.visible).count();
        if visible > 0 {
            reported.push(&activity.name);
            out.push(Violation {
                kind: ViolationKind::WindowForInactiveActivity,
                subject: activity.name.short(),
                expected: "no visible window".to_string(),
                observed: format!(
                    "{visible} visible window(s) while {}{}",
                    activity.state,
                    if activity.finishing { ", finishing" } else { "" }
                ),
            });
        }
    }
}

fn check_bounds(state: &StateSnapshot, out: &mut Vec<Violation>) {
    for task in state.am.tasks() {
        let Some(bounds) = task.bounds.filter(|b| !b.is_empty()) else {
            continue;
        };
        for activity in task.activities.iter().filter(|a| a.visible) {
            for window in state.wm.windows_for(&activity.name).filter(|w| w.visible) {
                if window.containing_frame != bounds {
                    out.push(Violation {
                        kind: ViolationKind::BoundsMismatch,
                        subject: format!("task {} / {}", task.id, window.name),
                        expected: bounds.to_string(),
                        observed: window.containing_frame.to_string(),
                    });
                }
            }
        }
    }
}

/// Exactly one window titled `name`.
pub fn assert_single_window<'a>(wm: &'a WmSnapshot, name: &str) -> Result<&'a WindowState> {
    let mut matches = wm.windows_named(name);
    match (matches.next(), matches.next()) {
        (Some(window), None) => Ok(window),
        (None, _) => Err(HarnessError::assertion(format!(
            "expected exactly one window named {name}, found none"
        ))),
        (Some(_), Some(_)) => Err(HarnessError::assertion(format!(
            "expected exactly one window named {name}, found {}",
            wm.windows_named(name).count()
        ))),
    }
}
