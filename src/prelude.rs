//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use amwm_harness::prelude::*;
//! ```

// Core
pub use crate::core::config::{Config, WaitConfig};
pub use crate::core::errors::{HarnessError, Result};

// Platform and logging
pub use crate::logger::EventLog;
pub use crate::platform::pal::{AdbShell, DeviceShell, MockShell};

// State observation
pub use crate::state::amwm::{AmWmState, is_valid_state};
pub use crate::state::collector::{StateCollector, StateSnapshot};
pub use crate::state::component::ComponentName;
pub use crate::state::invariants::{CheckOptions, InvariantChecker, InvariantReport, Violation};
pub use crate::state::model::{
    ActivityType, AmSnapshot, KeyguardStatus, LifecycleState, Rect, WindowingMode, WmSnapshot,
};
pub use crate::state::wait::{OnTimeout, WaitOutcome, WaitPolicy, Waiter};

// Device logs
pub use crate::logcat::lifecycle::{ActivityLifecycleCounts, LifecycleExpectation, LifecycleValidator};
pub use crate::logcat::reader::LogReader;
pub use crate::logcat::separator::LogSeparator;

// Device mutation
pub use crate::command::launch::LaunchActivityBuilder;
pub use crate::device::{Capabilities, Capability, DeviceStateHandle};
pub use crate::session::{
    AppOpsSession, DisplayMetricsSession, LockScreenSession, LockState, RotationSession,
    ScreenDozeSession, SettingsSession, VirtualDisplaySession,
};
