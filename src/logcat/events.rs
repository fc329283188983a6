//! Regex adapter turning raw `logcat -v brief` lines into structured
//! lifecycle events. Nothing past this module looks at log text.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::core::errors::{HarnessError, Result};

/// Configuration an activity reported after a change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[allow(missing_docs)]
pub struct ReportedSizes {
    pub width_dp: u32,
    pub height_dp: u32,
    pub display_width: u32,
    pub display_height: u32,
    pub metrics_width: u32,
    pub metrics_height: u32,
    pub smallest_width_dp: u32,
    pub density_dpi: u32,
    pub orientation: u32,
}

/// Activity callback named by one log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum LifecycleCallback {
    Create,
    Start,
    Resume,
    Pause,
    Stop,
    Destroy,
    ConfigurationChanged,
    MovedToDisplay,
    MultiWindowModeChanged,
    PictureInPictureModeChanged,
    UserLeaveHint,
    NewConfig(ReportedSizes),
}

impl LifecycleCallback {
    fn from_message(message: &str) -> Option<Self> {
        Some(match message {
            "onCreate" => Self::Create,
            "onStart" => Self::Start,
            "onResume" => Self::Resume,
            "onPause" => Self::Pause,
            "onStop" => Self::Stop,
            "onDestroy" => Self::Destroy,
            "onConfigurationChanged" => Self::ConfigurationChanged,
            "onMovedToDisplay" => Self::MovedToDisplay,
            "onMultiWindowModeChanged" => Self::MultiWindowModeChanged,
            "onPictureInPictureModeChanged" => Self::PictureInPictureModeChanged,
            "onUserLeaveHint" => Self::UserLeaveHint,
            _ => return None,
        })
    }
}

/// One recognised callback line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LifecycleEvent {
    /// Log tag (the activity's simple class name).
    pub tag: String,
    /// What happened.
    pub callback: LifecycleCallback,
    /// 1-based position among the scraped lines.
    pub line_index: usize,
}

struct LogPatterns {
    brief: Regex,
    plain: Regex,
    new_config: Regex,
}

impl LogPatterns {
    fn compile() -> std::result::Result<Self, regex::Error> {
        Ok(Self {
            brief: Regex::new(r"^[VDIWEFA]/(.+?)\(\s*\d+\): (.*)$")?,
            plain: Regex::new(r"^(.+?): (.*)$")?,
            new_config: Regex::new(
                r"^config size=\((\d+),(\d+)\) displaySize=\((\d+),(\d+)\) metricsSize=\((\d+),(\d+)\) smallestScreenWidth=(\d+) densityDpi=(\d+) orientation=(\d+)$",
            )?,
        })
    }
}

static PATTERNS: LazyLock<std::result::Result<LogPatterns, regex::Error>> =
    LazyLock::new(LogPatterns::compile);

fn patterns() -> Result<&'static LogPatterns> {
    PATTERNS.as_ref().map_err(|err| HarnessError::DumpParse {
        source_name: "logcat",
        details: format!("pattern compilation failed: {err}"),
    })
}

/// Split a brief-format line into `(tag, message)`.
pub fn split_log_line(line: &str) -> Result<Option<(String, String)>> {
    let p = patterns()?;
    let line = line.trim();
    let captures = p.brief.captures(line).or_else(|| p.plain.captures(line));
    Ok(captures.map(|c| (c[1].trim().to_string(), c[2].trim().to_string())))
}

fn parse_new_config(p: &LogPatterns, message: &str) -> Option<ReportedSizes> {
    let c = p.new_config.captures(message)?;
    let n = |i: usize| c[i].parse::<u32>().ok();
    Some(ReportedSizes {
        width_dp: n(1)?,
        height_dp: n(2)?,
        display_width: n(3)?,
        display_height: n(4)?,
        metrics_width: n(5)?,
        metrics_height: n(6)?,
        smallest_width_dp: n(7)?,
        density_dpi: n(8)?,
        orientation: n(9)?,
    })
}

/// Structured events for every recognised line; others are dropped.
pub fn parse_lifecycle_events(lines: &[String]) -> Result<Vec<LifecycleEvent>> {
    let p = patterns()?;
    let mut events = Vec::new();
    for (index, line) in lines.iter().enumerate() {
        let Some((tag, message)) = split_log_line(line)? else {
            continue;
        };
        let callback = LifecycleCallback::from_message(&message)
            .or_else(|| parse_new_config(p, &message).map(LifecycleCallback::NewConfig));
        if let Some(callback) = callback {
            events.push(LifecycleEvent {
                tag,
                callback,
                line_index: index + 1,
            });
        }
    }
    Ok(events)
}
