//! High-level facade over the collector, the retry loop and the checker.
//!
//! [`AmWmState`] keeps the snapshot from its most recent poll so that a
//! `wait_for_*` call can be followed by any number of `assert_*` calls
//! against the same observation.


use crate::core::config::WaitConfig;
use crate::core::errors::{HarnessError, Result};
use crate::logger::jsonl::{EventType, LogEntry, Severity};
use crate::state::collector::{StateCollector, StateSnapshot};
use crate::state::component::ComponentName;
use crate::state::invariants::{
    CheckOptions, InvariantChecker, InvariantReport, assert_single_window,
};
use crate::state::model::{
    ActivityType, AmSnapshot, KeyguardStatus, LifecycleState, WindowState, WindowingMode,
    WmSnapshot,
};
use crate::state::wait::{WaitOutcome, WaitPolicy, Waiter};

fn ensure(condition: bool, message: impl FnOnce() -> String) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(HarnessError::assertion(message()))
    }
}

/// Whether the device has settled enough for assertions: stacks exist, the
/// focused stack is known, and every listed activity is visible on both
/// sides.
#[must_use]
pub fn is_valid_state(state: &StateSnapshot, activities: &[ComponentName]) -> bool {
    let am = &state.am;
    if am.stack_count() == 0 || state.wm.displays.is_empty() {
        return false;
    }
    if !am
        .focused_stack_id
        .is_some_and(|id| am.stack_by_id(id).is_some())
    {
        return false;
    }
    activities
        .iter()
        .all(|a| am.is_activity_visible(a) && state.wm.is_window_visible(a))
}

/// Polling observer of one device.
#[derive(Debug)]
pub struct AmWmState {
    collector: StateCollector,
    waiter: Waiter,
    waits: WaitConfig,
    checker: InvariantChecker,
    last: StateSnapshot,
}

impl AmWmState {
    /// Pair a collector with per-purpose wait budgets. No poll happens yet.
    #[must_use]
    pub fn new(collector: StateCollector, waits: WaitConfig) -> Self {
        let waiter = Waiter::new(collector.log().clone());
        Self {
            collector,
            waiter,
            waits,
            checker: InvariantChecker::default(),
            last: StateSnapshot::default(),
        }
    }

    /// Replace the checker options used by `assert_invariants`.
    #[must_use]
    pub fn with_check_options(mut self, options: CheckOptions) -> Self {
        self.checker = InvariantChecker::new(options);
        self
    }

    /// The underlying collector.
    #[must_use]
    pub const fn collector(&self) -> &StateCollector {
        &self.collector
    }

    /// Waiter shared with validators built on this state.
    #[must_use]
    pub const fn waiter(&self) -> &Waiter {
        &self.waiter
    }

    /// Per-purpose wait budgets.
    #[must_use]
    pub const fn waits(&self) -> &WaitConfig {
        &self.waits
    }

    /// Snapshot from the most recent poll.
    #[must_use]
    pub const fn snapshot(&self) -> &StateSnapshot {
        &self.last
    }

    /// Activity-manager half of the last snapshot.
    #[must_use]
    pub const fn am(&self) -> &AmSnapshot {
        &self.last.am
    }

    /// Window-manager half of the last snapshot.
    #[must_use]
    pub const fn wm(&self) -> &WmSnapshot {
        &self.last.wm
    }

    /// One poll, no waiting.
    pub fn compute_state(&mut self) -> Result<&StateSnapshot> {
        self.last = self.collector.collect()?;
        Ok(&self.last)
    }

    /// Poll both subsystems until `predicate` holds.
    pub fn wait_for<P>(
        &mut self,
        policy: &WaitPolicy,
        condition: &str,
        predicate: P,
    ) -> Result<WaitOutcome<()>>
    where
        P: FnMut(&StateSnapshot) -> bool,
    {
        let collector = &self.collector;
        let outcome = self
            .waiter
            .wait_until(policy, condition, || collector.collect(), predicate)?;
        Ok(outcome.map(|snapshot| self.last = snapshot))
    }

    /// Poll only the activity manager until `predicate` holds.
    pub fn wait_for_with_am_state<P>(
        &mut self,
        policy: &WaitPolicy,
        condition: &str,
        predicate: P,
    ) -> Result<WaitOutcome<()>>
    where
        P: FnMut(&AmSnapshot) -> bool,
    {
        let collector = &self.collector;
        let outcome = self
            .waiter
            .wait_until(policy, condition, || collector.collect_am(), predicate)?;
        Ok(outcome.map(|am| self.last.am = am))
    }

    /// Poll only the window manager until `predicate` holds.
    pub fn wait_for_with_wm_state<P>(
        &mut self,
        policy: &WaitPolicy,
        condition: &str,
        predicate: P,
    ) -> Result<WaitOutcome<()>>
    where
        P: FnMut(&WmSnapshot) -> bool,
    {
        let collector = &self.collector;
        let outcome = self
            .waiter
            .wait_until(policy, condition, || collector.collect_wm(), predicate)?;
        Ok(outcome.map(|wm| self.last.wm = wm))
    }

    /// Wait until the device has stacks, a focused stack, and `activities`
    /// visible in both subsystems.
    pub fn wait_for_valid_state(&mut self, activities: &[ComponentName]) -> Result<WaitOutcome<()>> {
        let names: Vec<String> = activities.iter().map(ComponentName::short).collect();
        let condition = if names.is_empty() {
            "valid state".to_string()
        } else {
            format!("valid state with {} visible", names.join(", "))
        };
        let policy = self.waits.default.policy();
        self.wait_for(&policy, &condition, |s| is_valid_state(s, activities))
    }

    /// Wait until `activity` reaches `state`.
    pub fn wait_for_activity_state(
        &mut self,
        activity: &ComponentName,
        state: LifecycleState,
    ) -> Result<WaitOutcome<()>> {
        let policy = self.waits.default.policy();
        self.wait_for_with_am_state(&policy, &format!("{activity} to be {state}"), |am| {
            am.has_activity_state(activity, state)
        })
    }

    /// Wait until the keyguard shows with nothing above it.
    pub fn wait_for_keyguard_showing_and_not_occluded(&mut self) -> Result<WaitOutcome<()>> {
        self.wait_for_keyguard(KeyguardStatus::ShowingUnoccluded, "keyguard showing")
    }

    /// Wait until an activity shows above the keyguard.
    pub fn wait_for_keyguard_showing_and_occluded(&mut self) -> Result<WaitOutcome<()>> {
        self.wait_for_keyguard(KeyguardStatus::ShowingOccluded, "keyguard showing and occluded")
    }

    /// Wait until the keyguard is dismissed.
    pub fn wait_for_keyguard_gone(&mut self) -> Result<WaitOutcome<()>> {
        self.wait_for_keyguard(KeyguardStatus::NotShowing, "keyguard gone")
    }

    fn wait_for_keyguard(
        &mut self,
        target: KeyguardStatus,
        condition: &str,
    ) -> Result<WaitOutcome<()>> {
        let policy = self.waits.keyguard.policy();
        self.wait_for_with_am_state(&policy, condition, |am| am.keyguard == target)
    }

    /// Wait until `display_id` reports `rotation`.
    pub fn wait_for_rotation(&mut self, display_id: i32, rotation: u8) -> Result<WaitOutcome<()>> {
        let policy = self.waits.rotation.policy();
        self.wait_for_with_wm_state(
            &policy,
            &format!("display {display_id} rotation {rotation}"),
            |wm| wm.rotation(display_id) == Some(rotation),
        )
    }

    /// Wait until `stack_id` holds focus.
    pub fn wait_for_focused_stack(&mut self, stack_id: i32) -> Result<WaitOutcome<()>> {
        let policy = self.waits.default.policy();
        self.wait_for_with_am_state(&policy, &format!("focused stack {stack_id}"), |am| {
            am.focused_stack_id == Some(stack_id)
        })
    }

    /// Wait until no app transition is running.
    pub fn wait_for_app_transition_idle(&mut self) -> Result<WaitOutcome<()>> {
        let policy = self.waits.default.policy();
        self.wait_for_with_wm_state(&policy, "app transition idle", WmSnapshot::is_app_transition_idle)
    }

    /// Wait until neither subsystem knows `activity` any more.
    pub fn wait_for_activity_removed(&mut self, activity: &ComponentName) -> Result<WaitOutcome<()>> {
        let policy = self.waits.default.policy();
        self.wait_for(&policy, &format!("{activity} to be removed"), |s| {
            !s.am.contains_activity(activity) && s.wm.windows_for(activity).next().is_none()
        })
    }

    /// Wait until the home activity and its window are visible.
    pub fn wait_for_home_activity_visible(&mut self) -> Result<WaitOutcome<()>> {
        let policy = self.waits.default.policy();
        self.wait_for(&policy, "home activity visible", |s| {
            s.am
                .home_activity()
                .is_some_and(|home| home.visible && s.wm.is_window_visible(&home.name))
        })
    }

    // ──────────────────── assertions on the last snapshot ────────────────────

    /// Both subsystems agree that `activity` is (in)visible.
    pub fn assert_visibility(&self, activity: &ComponentName, visible: bool) -> Result<()> {
        let am_visible = self.am().is_activity_visible(activity);
        let wm_visible = self.wm().is_window_visible(activity);
        ensure(am_visible == visible && wm_visible == visible, || {
            format!(
                "{activity} visibility: expected {visible}, activity manager {am_visible}, window manager {wm_visible}"
            )
        })
    }

    /// `activity` holds focus in both subsystems.
    pub fn assert_focused_activity(&self, activity: &ComponentName) -> Result<()> {
        let am = self.am().focused_activity.as_ref();
        let wm = self.wm().focused_app.as_ref();
        ensure(am == Some(activity) && wm == Some(activity), || {
            format!(
                "focused activity: expected {activity}, activity manager {}, window manager {}",
                describe(am),
                describe(wm)
            )
        })
    }

    /// `activity` does not hold activity-manager focus.
    pub fn assert_not_focused_activity(&self, activity: &ComponentName) -> Result<()> {
        let am = self.am().focused_activity.as_ref();
        let wm = self.wm().focused_app.as_ref();
        ensure(am != Some(activity) && wm != Some(activity), || {
            format!("{activity} must not be focused")
        })
    }

    /// `activity` is the resumed activity.
    pub fn assert_resumed_activity(&self, activity: &ComponentName) -> Result<()> {
        ensure(
            self.am().has_activity_state(activity, LifecycleState::Resumed),
            || format!("{activity} must be resumed, is {}", self.state_of(activity)),
        )
    }

    /// `activity` is not resumed.
    pub fn assert_not_resumed_activity(&self, activity: &ComponentName) -> Result<()> {
        ensure(
            !self.am().has_activity_state(activity, LifecycleState::Resumed),
            || format!("{activity} must not be resumed"),
        )
    }

    /// `stack_id` is the focused stack.
    pub fn assert_focused_stack(&self, stack_id: i32) -> Result<()> {
        let focused = self.am().focused_stack_id;
        ensure(focused == Some(stack_id), || {
            format!("focused stack: expected {stack_id}, observed {focused:?}")
        })
    }

    /// The focused window is titled `name`.
    pub fn assert_focused_window(&self, name: &str) -> Result<()> {
        let focused = self.wm().focused_window.as_deref();
        ensure(focused == Some(name), || {
            format!("focused window: expected {name}, observed {focused:?}")
        })
    }

    /// The focused window is not titled `name`.
    pub fn assert_not_focused_window(&self, name: &str) -> Result<()> {
        ensure(self.wm().focused_window.as_deref() != Some(name), || {
            format!("{name} must not be the focused window")
        })
    }

    /// Some stack matches `mode`/`kind`.
    pub fn assert_contains_stack(&self, mode: WindowingMode, kind: ActivityType) -> Result<()> {
        ensure(self.am().contains_stack(mode, kind), || {
            format!(
                "expected a {} {} stack",
                mode.as_str(),
                kind.as_str()
            )
        })
    }

    /// No stack matches `mode`/`kind`.
    pub fn assert_does_not_contain_stack(&self, mode: WindowingMode, kind: ActivityType) -> Result<()> {
        ensure(!self.am().contains_stack(mode, kind), || {
            format!("unexpected {} {} stack", mode.as_str(), kind.as_str())
        })
    }

    /// The top stack on `display_id` has the given mode and type
    /// (`Undefined` matches any).
    pub fn assert_front_stack(
        &self,
        display_id: i32,
        mode: WindowingMode,
        kind: ActivityType,
    ) -> Result<()> {
        let front = self.am().front_stack(display_id);
        let matches = front.is_some_and(|s| {
            (mode == WindowingMode::Undefined || s.windowing_mode == mode)
                && (kind == ActivityType::Undefined || s.activity_type == kind)
        });
        ensure(matches, || {
            format!(
                "front stack on display {display_id}: expected {} {}, observed {}",
                mode.as_str(),
                kind.as_str(),
                front.map_or_else(
                    || "none".to_string(),
                    |s| format!("#{} {} {}", s.id, s.windowing_mode.as_str(), s.activity_type.as_str())
                )
            )
        })
    }

    /// The home activity is (in)visible.
    pub fn assert_home_activity_visible(&self, visible: bool) -> Result<()> {
        let home = self.am().home_activity().ok_or_else(|| {
            HarnessError::assertion("no home activity in activity manager state")
        })?;
        self.assert_visibility(&home.name, visible)
    }

    /// An activity shows above the keyguard.
    pub fn assert_keyguard_showing_and_occluded(&self) -> Result<()> {
        self.assert_keyguard(KeyguardStatus::ShowingOccluded)
    }

    /// The keyguard shows with nothing above it.
    pub fn assert_keyguard_showing_and_not_occluded(&self) -> Result<()> {
        self.assert_keyguard(KeyguardStatus::ShowingUnoccluded)
    }

    /// No keyguard is showing.
    pub fn assert_keyguard_gone(&self) -> Result<()> {
        self.assert_keyguard(KeyguardStatus::NotShowing)
    }

    fn assert_keyguard(&self, expected: KeyguardStatus) -> Result<()> {
        let observed = self.am().keyguard;
        ensure(observed == expected, || {
            format!("keyguard: expected {expected:?}, observed {observed:?}")
        })
    }

    /// Exactly one window is titled `name`; returns a copy of it.
    pub fn assert_single_window(&self, name: &str) -> Result<WindowState> {
        assert_single_window(self.wm(), name).cloned()
    }

    /// Run the invariant checker on the last snapshot.
    #[must_use]
    pub fn check_invariants(&self) -> InvariantReport {
        self.checker.check(&self.last)
    }

    /// Fail on any cross-subsystem invariant violation.
    pub fn assert_invariants(&self) -> Result<()> {
        let report = self.check_invariants();
        for violation in &report.violations {
            self.collector.log().record(
                &LogEntry::new(EventType::InvariantViolation, Severity::Warning)
                    .condition(format!("{:?}", violation.kind))
                    .details(violation.to_string()),
            );
        }
        report.into_result()
    }

    fn state_of(&self, activity: &ComponentName) -> String {
        self.am()
            .activity(activity)
            .map_or_else(|| "absent".to_string(), |a| a.state.to_string())
    }
}

fn describe(name: Option<&ComponentName>) -> String {
    name.map_or_else(|| "none".to_string(), ComponentName::short)
}
