#![forbid(unsafe_code)]

//! amwm harness: black-box observation of a device's activity manager and
//! window manager.
//!
//! Four pieces work together:
//! 1. **Snapshot collector**: parses the two text dumps into owned snapshots
//! 2. **Wait engine**: bounded polling until a predicate over a snapshot holds
//! 3. **Invariant checker**: structural agreement between the two subsystems
//! 4. **Sessions**: scoped mutation of device-global state, restored on drop
//!
//! # Library usage
//!
//! Use the [`prelude`] for convenient access to the most common types:
//!
//! ```rust,no_run
//! use amwm_harness::prelude::*;
//! ```
//!
//! Individual modules can also be imported directly:
//!
//! ```rust,no_run
//! use amwm_harness::core::config::Config;
//! use amwm_harness::state::collector::{StateCollector, StateSnapshot};
//! ```

pub mod prelude;

pub mod command;
pub mod core;
pub mod device;
pub mod logcat;
pub mod logger;
pub mod platform;
pub mod session;
pub mod state;
