//! Eventual-consistency retry loop.
//!
//! The device converges asynchronously after every mutation, so every
//! assertion about device state goes through [`Waiter::wait_until`]: sample,
//! evaluate, sleep, repeat until the predicate holds or the budget runs out.
//! Exhaustion is reported as a [`WaitOutcome`], never as an error; the caller
//! decides whether a timeout fails the scenario or skips it.

use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::core::errors::{HarnessError, Result};
use crate::logger::EventLog;
use crate::logger::jsonl::{EventType, LogEntry, Severity};

/// Poll interval and attempt budget for one kind of wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WaitPolicy {
    /// Sleep between consecutive attempts.
    pub interval: Duration,
    /// Total number of samples taken before giving up (at least one).
    pub max_attempts: u32,
}

impl WaitPolicy {
    /// A budget of zero attempts is raised to one.
    #[must_use]
    pub const fn new(interval: Duration, max_attempts: u32) -> Self {
        let max_attempts = if max_attempts == 0 { 1 } else { max_attempts };
        Self {
            interval,
            max_attempts,
        }
    }

    /// Upper bound on the time spent sleeping.
    #[must_use]
    pub fn budget(&self) -> Duration {
        self.interval
            .saturating_mul(self.max_attempts.saturating_sub(1))
    }
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self::new(Duration::from_millis(500), 10)
    }
}

/// What to do when a wait exhausts its budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnTimeout {
    /// The scenario fails with [`HarnessError::WaitTimedOut`].
    Fail,
    /// The device cannot do it; [`HarnessError::CapabilityAbsent`] tells the
    /// caller to skip.
    Skip,
}

/// Result of a wait: the converged sample or the last one observed.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum WaitOutcome<T> {
    /// The predicate held on sample number `attempts`.
    Converged { value: T, attempts: u32 },
    /// The budget ran out; `last` is the final sample.
    TimedOut { last: T, attempts: u32 },
}

impl<T> WaitOutcome<T> {
    /// Whether the predicate held within budget.
    #[must_use]
    pub const fn is_converged(&self) -> bool {
        matches!(self, Self::Converged { .. })
    }

    /// Samples taken.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        match self {
            Self::Converged { attempts, .. } | Self::TimedOut { attempts, .. } => *attempts,
        }
    }

    /// The last sample, converged or not.
    #[must_use]
    pub const fn value(&self) -> &T {
        match self {
            Self::Converged { value, .. } | Self::TimedOut { last: value, .. } => value,
        }
    }

    /// Take the last sample, converged or not.
    #[must_use]
    pub fn into_value(self) -> T {
        match self {
            Self::Converged { value, .. } | Self::TimedOut { last: value, .. } => value,
        }
    }

    /// Transform the carried sample, keeping the outcome kind.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> WaitOutcome<U> {
        match self {
            Self::Converged { value, attempts } => WaitOutcome::Converged {
                value: f(value),
                attempts,
            },
            Self::TimedOut { last, attempts } => WaitOutcome::TimedOut {
                last: f(last),
                attempts,
            },
        }
    }

    /// Map a timeout to the error selected by `on_timeout`.
    pub fn resolve(self, condition: &str, on_timeout: OnTimeout) -> Result<T> {
        match self {
            Self::Converged { value, .. } => Ok(value),
            Self::TimedOut { attempts, .. } => Err(match on_timeout {
                OnTimeout::Fail => HarnessError::WaitTimedOut {
                    condition: condition.to_string(),
                    attempts,
                },
                OnTimeout::Skip => HarnessError::capability_absent(format!(
                    "{condition} (not reached after {attempts} attempt(s))"
                )),
            }),
        }
    }

    /// Hard-fail on timeout.
    pub fn require(self, condition: &str) -> Result<T> {
        self.resolve(condition, OnTimeout::Fail)
    }

    /// Soft-skip on timeout.
    pub fn or_skip(self, condition: &str) -> Result<T> {
        self.resolve(condition, OnTimeout::Skip)
    }
}

/// Runs poll loops and reports each attempt to the event log.
#[derive(Debug, Clone, Default)]
pub struct Waiter {
    log: EventLog,
}

impl Waiter {
    /// Waiter reporting to `log`.
    #[must_use]
    pub const fn new(log: EventLog) -> Self {
        Self { log }
    }

    /// Log the waiter reports to.
    #[must_use]
    pub const fn log(&self) -> &EventLog {
        &self.log
    }

    /// Sample until `predicate` holds or `policy.max_attempts` samples have
    /// been taken. Sampling errors abort the wait immediately.
    pub fn wait_until<T, S, P>(
        &self,
        policy: &WaitPolicy,
        condition: &str,
        mut sample: S,
        mut predicate: P,
    ) -> Result<WaitOutcome<T>>
    where
        S: FnMut() -> Result<T>,
        P: FnMut(&T) -> bool,
    {
        let started = Instant::now();
        let max_attempts = policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let value = sample()?;
            if predicate(&value) {
                self.log.record(
                    &LogEntry::new(EventType::WaitConverged, Severity::Info)
                        .condition(condition)
                        .attempts(attempt)
                        .duration_ms(elapsed_ms(started)),
                );
                return Ok(WaitOutcome::Converged {
                    value,
                    attempts: attempt,
                });
            }

            self.log.diag(
                "WAIT",
                &format!("waiting for {condition} (attempt {attempt}/{max_attempts})"),
            );
            self.log.record(
                &LogEntry::new(EventType::PollAttempt, Severity::Info)
                    .condition(condition)
                    .attempts(attempt),
            );

            if attempt >= max_attempts {
                self.log.record(
                    &LogEntry::new(EventType::WaitTimedOut, Severity::Warning)
                        .condition(condition)
                        .attempts(attempt)
                        .duration_ms(elapsed_ms(started)),
                );
                return Ok(WaitOutcome::TimedOut {
                    last: value,
                    attempts: attempt,
                });
            }
            if !policy.interval.is_zero() {
                thread::sleep(policy.interval);
            }
            attempt += 1;
        }
    }

    /// Retry a validator that returns `Some(mismatch)` until it returns
    /// `None`. On exhaustion the last mismatch becomes the assertion message.
    pub fn retry_validator<F>(
        &self,
        policy: &WaitPolicy,
        waiting_message: &str,
        mut validate: F,
    ) -> Result<()>
    where
        F: FnMut() -> Result<Option<String>>,
    {
        match self.wait_until(policy, waiting_message, &mut validate, Option::is_none)? {
            WaitOutcome::Converged { .. } | WaitOutcome::TimedOut { last: None, .. } => Ok(()),
            WaitOutcome::TimedOut {
                last: Some(message),
                ..
            } => Err(HarnessError::assertion(message)),
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
