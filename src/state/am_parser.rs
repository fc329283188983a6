//! Line-oriented parser for `dumpsys activity activities`.
//!
//! Unknown lines are ignored. Lines that start like a recognised record but
//! do not parse are reported as [`SkippedLine`]s and otherwise ignored, so a
//! partially garbled dump still yields a usable snapshot.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::errors::{HarnessError, Result};
use crate::state::component::ComponentName;
use crate::state::model::{
    Activity, ActivityDisplay, ActivityType, AmSnapshot, KeyguardStatus, LifecycleState, Rect,
    Stack, Task, WindowingMode,
};
use crate::state::{ParseOutput, SkippedLine};

struct AmPatterns {
    display: Regex,
    stack: Regex,
    bounds: Regex,
    task: Regex,
    hist: Regex,
    state: Regex,
    finishing: Regex,
    visible: Regex,
    front_of_task: Regex,
    stack_resumed: Regex,
    resumed: Regex,
    focused_stack: Regex,
    keyguard_showing: Regex,
    occluded: Regex,
}

impl AmPatterns {
    fn compile() -> std::result::Result<Self, regex::Error> {
        const RECORD: &str = r"ActivityRecord\{\S+ u\d+ ([^\s}]+)(?: t-?\d+)?[^}]*\}";
        Ok(Self {
            display: Regex::new(r"^Display #(\d+)")?,
            stack: Regex::new(r"^Stack #(\d+):\s*type=([a-z-]+)\s+mode=([a-z-]+)")?,
            bounds: Regex::new(r"^mBounds=Rect\((-?\d+), (-?\d+) - (-?\d+), (-?\d+)\)")?,
            task: Regex::new(r"^Task id #(\d+)")?,
            hist: Regex::new(r"^\* Hist #\d+: ActivityRecord\{\S+ u\d+ ([^\s}]+) t(-?\d+)\}")?,
            state: Regex::new(r"^state=([A-Z_]+)")?,
            finishing: Regex::new(r"\bfinishing=(true|false)\b")?,
            visible: Regex::new(r"\bvisible=(true|false)\b")?,
            front_of_task: Regex::new(r"^frontOfTask=(true|false)\b")?,
            stack_resumed: Regex::new(&format!("^mResumedActivity: {RECORD}"))?,
            resumed: Regex::new(&format!("^ResumedActivity: {RECORD}"))?,
            focused_stack: Regex::new(r"^mFocusedStack=ActivityStack\{.*\bstackId=(-?\d+)")?,
            keyguard_showing: Regex::new(r"^mKeyguardShowing=(true|false)\b")?,
            occluded: Regex::new(r"^mOccluded=(true|false)\b")?,
        })
    }
}

static PATTERNS: LazyLock<std::result::Result<AmPatterns, regex::Error>> =
    LazyLock::new(AmPatterns::compile);

fn patterns() -> Result<&'static AmPatterns> {
    PATTERNS.as_ref().map_err(|err| HarnessError::DumpParse {
        source_name: "activity manager",
        details: format!("pattern compilation failed: {err}"),
    })
}

/// Where the parser currently is in the display → stack → task → activity
/// hierarchy. Indices point into the snapshot being built.
#[derive(Default)]
struct Cursor {
    display: Option<usize>,
    stack: Option<usize>,
    task: Option<usize>,
    activity: Option<usize>,
}

struct Builder<'p> {
    p: &'p AmPatterns,
    snapshot: AmSnapshot,
    cursor: Cursor,
    skipped: Vec<SkippedLine>,
    keyguard_showing: bool,
    occluded: bool,
}

impl<'p> Builder<'p> {
    fn new(p: &'p AmPatterns) -> Self {
        Self {
            p,
            snapshot: AmSnapshot::default(),
            cursor: Cursor::default(),
            skipped: Vec::new(),
            keyguard_showing: false,
            occluded: false,
        }
    }

    fn skip(&mut self, line_no: usize, text: &str, reason: &'static str) {
        self.skipped.push(SkippedLine {
            line_no,
            text: text.to_string(),
            reason,
        });
    }

    fn current_stack(&mut self) -> Option<&mut Stack> {
        let d = self.cursor.display?;
        let s = self.cursor.stack?;
        self.snapshot.displays.get_mut(d)?.stacks.get_mut(s)
    }

    fn current_task(&mut self) -> Option<&mut Task> {
        let t = self.cursor.task?;
        self.current_stack()?.tasks.get_mut(t)
    }

    fn current_activity(&mut self) -> Option<&mut Activity> {
        let a = self.cursor.activity?;
        self.current_task()?.activities.get_mut(a)
    }

    fn open_display(&mut self, id: i32) {
        self.snapshot.displays.push(ActivityDisplay {
            id,
            stacks: Vec::new(),
        });
        self.cursor = Cursor {
            display: Some(self.snapshot.displays.len() - 1),
            ..Cursor::default()
        };
    }

    fn line(&mut self, line_no: usize, raw: &str) {
        let line = raw.trim();
        if line.is_empty() {
            return;
        }
        let p = self.p;

        if line.starts_with("Display #") {
            match p.display.captures(line).and_then(|c| c[1].parse().ok()) {
                Some(id) => self.open_display(id),
                None => self.skip(line_no, line, "display header"),
            }
        } else if line.starts_with("Stack #") {
            self.stack_header(line_no, line);
        } else if line.starts_with("Task id #") {
            self.task_header(line_no, line);
        } else if line.starts_with("* Hist #") {
            self.hist(line_no, line);
        } else if line.starts_with("mBounds=") {
            self.bounds(line_no, line);
        } else if line.starts_with("state=") {
            self.activity_state(line_no, line);
        } else if line.starts_with("frontOfTask=") {
            match p.front_of_task.captures(line) {
                Some(c) => {
                    let front = &c[1] == "true";
                    if let Some(activity) = self.current_activity() {
                        activity.front_of_task = front;
                    }
                }
                None => self.skip(line_no, line, "frontOfTask"),
            }
        } else if line.starts_with("mResumedActivity:") {
            match record_component(&p.stack_resumed, line) {
                Some(name) => {
                    if let Some(stack) = self.current_stack() {
                        stack.resumed_activity = Some(name);
                    }
                }
                None if line.ends_with("null") => {}
                None => self.skip(line_no, line, "stack resumed activity"),
            }
        } else if line.starts_with("ResumedActivity:") {
            match record_component(&p.resumed, line) {
                Some(name) => {
                    if !self.snapshot.resumed_activities.contains(&name) {
                        self.snapshot.resumed_activities.push(name);
                    }
                }
                None if line.ends_with("null") => {}
                None => self.skip(line_no, line, "resumed activity"),
            }
        } else if line.starts_with("mFocusedStack=") {
            match p.focused_stack.captures(line).and_then(|c| c[1].parse().ok()) {
                Some(id) => self.snapshot.focused_stack_id = Some(id),
                None if line.ends_with("null") => self.snapshot.focused_stack_id = None,
                None => self.skip(line_no, line, "focused stack"),
            }
        } else if line.starts_with("mKeyguardShowing=") {
            match p.keyguard_showing.captures(line) {
                Some(c) => self.keyguard_showing = &c[1] == "true",
                None => self.skip(line_no, line, "keyguard showing"),
            }
        } else if line.starts_with("mOccluded=") {
            match p.occluded.captures(line) {
                Some(c) => self.occluded = &c[1] == "true",
                None => self.skip(line_no, line, "keyguard occluded"),
            }
        } else if self.cursor.activity.is_some()
            && let Some(c) = p.visible.captures(line)
        {
            let visible = &c[1] == "true";
            if let Some(activity) = self.current_activity() {
                activity.visible = visible;
            }
        }
    }

    fn stack_header(&mut self, line_no: usize, line: &str) {
        let Some((id, mode, kind)) = self.p.stack.captures(line).and_then(|c| {
            Some((
                c[1].parse::<i32>().ok()?,
                WindowingMode::from_dump(&c[3]).unwrap_or_default(),
                ActivityType::from_dump(&c[2]).unwrap_or_default(),
            ))
        }) else {
            self.skip(line_no, line, "stack header");
            return;
        };
        if self.cursor.display.is_none() {
            self.open_display(0);
        }
        let Some(display_index) = self.cursor.display else {
            return;
        };
        let Some(display) = self.snapshot.displays.get_mut(display_index) else {
            return;
        };
        display.stacks.push(Stack {
            id,
            display_id: display.id,
            windowing_mode: mode,
            activity_type: kind,
            bounds: None,
            tasks: Vec::new(),
            resumed_activity: None,
        });
        self.cursor.stack = Some(display.stacks.len() - 1);
        self.cursor.task = None;
        self.cursor.activity = None;
    }

    fn task_header(&mut self, line_no: usize, line: &str) {
        let Some(id) = self.p.task.captures(line).and_then(|c| c[1].parse().ok()) else {
            self.skip(line_no, line, "task header");
            return;
        };
        let Some(stack) = self.current_stack() else {
            self.skip(line_no, line, "task outside stack");
            return;
        };
        stack.tasks.push(Task {
            id,
            bounds: None,
            activities: Vec::new(),
        });
        let index = stack.tasks.len() - 1;
        self.cursor.task = Some(index);
        self.cursor.activity = None;
    }

    fn hist(&mut self, line_no: usize, line: &str) {
        let Some((name, task_id)) = self.p.hist.captures(line).and_then(|c| {
            Some((
                ComponentName::unflatten(&c[1])?,
                c[2].parse::<i32>().ok()?,
            ))
        }) else {
            self.skip(line_no, line, "activity record");
            return;
        };
        let Some(task) = self.current_task() else {
            self.skip(line_no, line, "activity outside task");
            return;
        };
        task.activities.push(Activity::new(name, task_id));
        let index = task.activities.len() - 1;
        self.cursor.activity = Some(index);
    }

    fn bounds(&mut self, line_no: usize, line: &str) {
        let Some(rect) = self.p.bounds.captures(line).and_then(|c| {
            Some(Rect::new(
                c[1].parse().ok()?,
                c[2].parse().ok()?,
                c[3].parse().ok()?,
                c[4].parse().ok()?,
            ))
        }) else {
            self.skip(line_no, line, "bounds");
            return;
        };
        let bounds = (!rect.is_empty()).then_some(rect);
        if self.cursor.activity.is_none()
            && let Some(task) = self.current_task()
        {
            task.bounds = bounds;
        } else if self.cursor.task.is_none()
            && let Some(stack) = self.current_stack()
        {
            stack.bounds = bounds;
        }
    }

    fn activity_state(&mut self, line_no: usize, line: &str) {
        let Some(state) = self
            .p
            .state
            .captures(line)
            .and_then(|c| LifecycleState::from_dump(&c[1]))
        else {
            self.skip(line_no, line, "activity state");
            return;
        };
        let finishing = self
            .p
            .finishing
            .captures(line)
            .is_some_and(|c| &c[1] == "true");
        if let Some(activity) = self.current_activity() {
            activity.state = state;
            activity.finishing = finishing;
        }
    }

    fn finish(mut self) -> ParseOutput<AmSnapshot> {
        self.snapshot.keyguard = KeyguardStatus::from_flags(self.keyguard_showing, self.occluded);
        self.snapshot.focused_activity = self
            .snapshot
            .focused_stack_id
            .and_then(|id| self.snapshot.stack_by_id(id))
            .and_then(|s| s.resumed_activity.clone())
            .or_else(|| self.snapshot.resumed_activities.first().cloned());
        self.snapshot.skipped_lines = self.skipped.len();
        ParseOutput {
            snapshot: self.snapshot,
            skipped: self.skipped,
        }
    }
}

fn record_component(re: &Regex, line: &str) -> Option<ComponentName> {
    re.captures(line)
        .and_then(|c| ComponentName::unflatten(&c[1]))
}

/// Parse a full activity-manager dump.
pub fn parse_am_dump(text: &str) -> Result<ParseOutput<AmSnapshot>> {
    let mut builder = Builder::new(patterns()?);
    for (index, line) in text.lines().enumerate() {
        builder.line(index + 1, line);
    }
    Ok(builder.finish())
}
