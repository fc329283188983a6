//! Log-based lifecycle validation: count an activity's callbacks since a
//! separator and retry until the counts match what the scenario expects.

use serde::Serialize;

use crate::core::errors::Result;
use crate::logcat::events::{LifecycleCallback, LifecycleEvent, ReportedSizes, parse_lifecycle_events};
use crate::logcat::reader::LogReader;
use crate::logcat::separator::LogSeparator;
use crate::state::component::ComponentName;
use crate::state::wait::{WaitOutcome, WaitPolicy, Waiter};

/// Callback tallies for one activity since a separator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[allow(missing_docs)]
pub struct ActivityLifecycleCounts {
    pub create: u32,
    pub start: u32,
    pub resume: u32,
    pub pause: u32,
    pub stop: u32,
    pub destroy: u32,
    pub configuration_changed: u32,
    pub moved_to_display: u32,
    pub multi_window_mode_changed: u32,
    pub picture_in_picture_mode_changed: u32,
    pub user_leave_hint: u32,
    pub last_configuration_changed_line: usize,
    pub last_multi_window_mode_changed_line: usize,
    pub last_picture_in_picture_mode_changed_line: usize,
    pub last_stop_line: usize,
}

impl ActivityLifecycleCounts {
    /// Tally events whose tag is `tag`.
    #[must_use]
    pub fn from_events(tag: &str, events: &[LifecycleEvent]) -> Self {
        let mut counts = Self::default();
        for event in events.iter().filter(|e| e.tag == tag) {
            let line = event.line_index;
            match event.callback {
                LifecycleCallback::Create => counts.create += 1,
                LifecycleCallback::Start => counts.start += 1,
                LifecycleCallback::Resume => counts.resume += 1,
                LifecycleCallback::Pause => counts.pause += 1,
                LifecycleCallback::Stop => {
                    counts.stop += 1;
                    counts.last_stop_line = line;
                }
                LifecycleCallback::Destroy => counts.destroy += 1,
                LifecycleCallback::ConfigurationChanged => {
                    counts.configuration_changed += 1;
                    counts.last_configuration_changed_line = line;
                }
                LifecycleCallback::MovedToDisplay => counts.moved_to_display += 1,
                LifecycleCallback::MultiWindowModeChanged => {
                    counts.multi_window_mode_changed += 1;
                    counts.last_multi_window_mode_changed_line = line;
                }
                LifecycleCallback::PictureInPictureModeChanged => {
                    counts.picture_in_picture_mode_changed += 1;
                    counts.last_picture_in_picture_mode_changed_line = line;
                }
                LifecycleCallback::UserLeaveHint => counts.user_leave_hint += 1,
                LifecycleCallback::NewConfig(_) => {}
            }
        }
        counts
    }

    /// `create/start/resume/pause/stop/destroy`.
    #[must_use]
    pub fn counters(&self) -> String {
        format!(
            "{}/{}/{}/{}/{}/{}",
            self.create, self.start, self.resume, self.pause, self.stop, self.destroy
        )
    }
}

/// Expected callback counts. `configuration_changed: None` leaves config
/// changes unchecked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct LifecycleExpectation {
    pub create: u32,
    pub start: u32,
    pub resume: u32,
    pub pause: u32,
    pub stop: u32,
    pub destroy: u32,
    pub configuration_changed: Option<u32>,
}

impl LifecycleExpectation {
    /// create, start, resume.
    pub const SINGLE_LAUNCH: Self = Self::counts(1, 1, 1, 0, 0, 0);
    /// create, start, resume, pause, stop.
    pub const SINGLE_LAUNCH_AND_STOP: Self = Self::counts(1, 1, 1, 1, 1, 0);
    /// start, resume, pause, stop.
    pub const SINGLE_START_AND_STOP: Self = Self::counts(0, 1, 1, 1, 1, 0);
    /// start, resume.
    pub const SINGLE_START: Self = Self::counts(0, 1, 1, 0, 0, 0);

    /// Expectation with the given counters and no configuration check.
    #[must_use]
    pub const fn counts(
        create: u32,
        start: u32,
        resume: u32,
        pause: u32,
        stop: u32,
        destroy: u32,
    ) -> Self {
        Self {
            create,
            start,
            resume,
            pause,
            stop,
            destroy,
            configuration_changed: None,
        }
    }

    /// Also require `count` configuration changes.
    #[must_use]
    pub const fn with_configuration_changed(mut self, count: u32) -> Self {
        self.configuration_changed = Some(count);
        self
    }

    /// First field that differs, phrased for a failure message.
    #[must_use]
    pub fn mismatch(&self, tag: &str, actual: &ActivityLifecycleCounts) -> Option<String> {
        let checks = [
            ("created", self.create, actual.create),
            ("started", self.start, actual.start),
            ("resumed", self.resume, actual.resume),
            ("paused", self.pause, actual.pause),
            ("stopped", self.stop, actual.stop),
            ("destroyed", self.destroy, actual.destroy),
        ];
        for (verb, expected, observed) in checks {
            if expected != observed {
                return Some(format!(
                    "{tag} has been {verb} {observed} time(s), expecting {expected} (counts {})",
                    actual.counters()
                ));
            }
        }
        match self.configuration_changed {
            Some(expected) if expected != actual.configuration_changed => Some(format!(
                "{tag} has received config changes {} time(s), expecting {expected}",
                actual.configuration_changed
            )),
            _ => None,
        }
    }
}

/// Retrying lifecycle assertions over scraped device logs.
#[derive(Debug, Clone)]
pub struct LifecycleValidator {
    reader: LogReader,
    waiter: Waiter,
    policy: WaitPolicy,
}

impl LifecycleValidator {
    /// `policy` is the lifecycle retry budget.
    #[must_use]
    pub const fn new(reader: LogReader, waiter: Waiter, policy: WaitPolicy) -> Self {
        Self {
            reader,
            waiter,
            policy,
        }
    }

    /// Reader scraping the device log.
    #[must_use]
    pub const fn reader(&self) -> &LogReader {
        &self.reader
    }

    fn events(&self, activity: &ComponentName, separator: &LogSeparator) -> Result<Vec<LifecycleEvent>> {
        let lines = self
            .reader
            .device_logs_for_components(Some(separator), &[activity.simple_name()])?;
        parse_lifecycle_events(&lines)
    }

    /// Current counts, read once.
    pub fn counts(
        &self,
        activity: &ComponentName,
        separator: &LogSeparator,
    ) -> Result<ActivityLifecycleCounts> {
        let events = self.events(activity, separator)?;
        Ok(ActivityLifecycleCounts::from_events(activity.simple_name(), &events))
    }

    fn retry<F>(
        &self,
        activity: &ComponentName,
        separator: &LogSeparator,
        waiting: &str,
        mut check: F,
    ) -> Result<()>
    where
        F: FnMut(&str, &ActivityLifecycleCounts) -> Option<String>,
    {
        let tag = activity.simple_name();
        self.waiter.retry_validator(&self.policy, waiting, || {
            let counts = self.counts(activity, separator)?;
            Ok(check(tag, &counts))
        })
    }

    /// Counts equal `expected` exactly.
    pub fn assert_lifecycle_counts(
        &self,
        activity: &ComponentName,
        separator: &LogSeparator,
        expected: &LifecycleExpectation,
    ) -> Result<()> {
        self.retry(activity, separator, "activity lifecycle counts", |tag, counts| {
            expected.mismatch(tag, counts)
        })
    }

    /// Created, started and resumed exactly once.
    pub fn assert_single_launch(&self, activity: &ComponentName, separator: &LogSeparator) -> Result<()> {
        self.assert_lifecycle_counts(activity, separator, &LifecycleExpectation::SINGLE_LAUNCH)
    }

    /// Launched once, then paused and stopped once.
    pub fn assert_single_launch_and_stop(
        &self,
        activity: &ComponentName,
        separator: &LogSeparator,
    ) -> Result<()> {
        self.assert_lifecycle_counts(
            activity,
            separator,
            &LifecycleExpectation::SINGLE_LAUNCH_AND_STOP,
        )
    }

    /// Started, resumed, paused and stopped once, without being created.
    pub fn assert_single_start_and_stop(
        &self,
        activity: &ComponentName,
        separator: &LogSeparator,
    ) -> Result<()> {
        self.assert_lifecycle_counts(
            activity,
            separator,
            &LifecycleExpectation::SINGLE_START_AND_STOP,
        )
    }

    /// Started and resumed once, without being created.
    pub fn assert_single_start(&self, activity: &ComponentName, separator: &LogSeparator) -> Result<()> {
        self.assert_lifecycle_counts(activity, separator, &LifecycleExpectation::SINGLE_START)
    }

    /// Destroyed exactly once, not recreated, no config change.
    pub fn assert_activity_destroyed(
        &self,
        activity: &ComponentName,
        separator: &LogSeparator,
    ) -> Result<()> {
        self.retry(activity, separator, "activity destroyed", |tag, c| {
            if c.destroy != 1 {
                Some(format!(
                    "{tag} has been destroyed {} time(s), expecting single destruction",
                    c.destroy
                ))
            } else if c.create != 0 {
                Some(format!(
                    "{tag} has been (re)created {} time(s), not expecting any",
                    c.create
                ))
            } else if c.configuration_changed != 0 {
                Some(format!(
                    "{tag} has received {} onConfigurationChanged() calls, not expecting any",
                    c.configuration_changed
                ))
            } else {
                None
            }
        })
    }

    /// Exactly `relaunches` destroy+create pairs and `config_changes`
    /// configuration callbacks.
    pub fn assert_relaunch_or_config_changed(
        &self,
        activity: &ComponentName,
        relaunches: u32,
        config_changes: u32,
        separator: &LogSeparator,
    ) -> Result<()> {
        self.retry(activity, separator, "relaunch or config changed", |tag, c| {
            if c.destroy != relaunches {
                Some(format!(
                    "{tag} has been destroyed {} time(s), expecting {relaunches}",
                    c.destroy
                ))
            } else if c.create != relaunches {
                Some(format!(
                    "{tag} has been (re)created {} time(s), expecting {relaunches}",
                    c.create
                ))
            } else if c.configuration_changed != config_changes {
                Some(format!(
                    "{tag} has received {} onConfigurationChanged() calls, expecting {config_changes}",
                    c.configuration_changed
                ))
            } else {
                None
            }
        })
    }

    /// Either relaunched (destroyed and recreated) or handled the change in
    /// place (config callback, no destroy/create).
    pub fn assert_activity_lifecycle(
        &self,
        activity: &ComponentName,
        relaunched: bool,
        separator: &LogSeparator,
    ) -> Result<()> {
        self.retry(activity, separator, "valid lifecycle state", |tag, c| {
            if relaunched {
                if c.destroy < 1 {
                    return Some(format!("{tag} must have been destroyed, destroy={}", c.destroy));
                }
                if c.create < 1 {
                    return Some(format!("{tag} must have been (re)created, create={}", c.create));
                }
                return None;
            }
            if c.destroy > 0 {
                return Some(format!("{tag} must not have been destroyed, destroy={}", c.destroy));
            }
            if c.create > 0 {
                return Some(format!("{tag} must not have been (re)created, create={}", c.create));
            }
            if c.configuration_changed < 1 {
                return Some(format!(
                    "{tag} must have received a configuration change, configuration_changed={}",
                    c.configuration_changed
                ));
            }
            None
        })
    }

    /// Poll until at least one multi-window mode change was logged.
    pub fn wait_for_on_multi_window_mode_changed(
        &self,
        activity: &ComponentName,
        separator: &LogSeparator,
    ) -> Result<WaitOutcome<ActivityLifecycleCounts>> {
        self.waiter.wait_until(
            &self.policy,
            &format!("{activity} onMultiWindowModeChanged"),
            || self.counts(activity, separator),
            |c| c.multi_window_mode_changed >= 1,
        )
    }

    /// Sizes from the most recent config report, polling until one appears.
    pub fn last_reported_sizes(
        &self,
        activity: &ComponentName,
        separator: &LogSeparator,
    ) -> Result<Option<ReportedSizes>> {
        let tag = activity.simple_name();
        let outcome = self.waiter.wait_until(
            &self.policy,
            &format!("{tag} to report sizes"),
            || {
                let events = self.events(activity, separator)?;
                Ok(events.iter().rev().find_map(|e| match e.callback {
                    LifecycleCallback::NewConfig(sizes) if e.tag == tag => Some(sizes),
                    _ => None,
                }))
            },
            Option::is_some,
        )?;
        Ok(outcome.into_value())
    }
}
