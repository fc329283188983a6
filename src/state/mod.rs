//! Device state observation: snapshot model, dump parsers, the collector,
//! the retry loop, the cross-subsystem checker, and the high-level
//! [`amwm::AmWmState`] facade.

pub mod am_parser;
pub mod amwm;
pub mod collector;
pub mod component;
pub mod invariants;
pub mod model;
pub mod wait;
pub mod wm_parser;

use serde::Serialize;

/// A dump line that looked like a known record but did not parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedLine {
    /// 1-based line number within the dump.
    pub line_no: usize,
    /// The trimmed line text.
    pub text: String,
    /// Which record kind it resembled.
    pub reason: &'static str,
}

/// Parser result: the snapshot plus every skipped line.
#[derive(Debug, Clone)]
pub struct ParseOutput<T> {
    /// The snapshot built from all lines that did parse.
    pub snapshot: T,
    /// Lines recognised but rejected, in dump order.
    pub skipped: Vec<SkippedLine>,
}
