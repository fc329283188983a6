//! Line-oriented parser for `dumpsys window -a`.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::core::errors::{HarnessError, Result};
use crate::state::component::ComponentName;
use crate::state::model::{Rect, WindowKind, WindowState, WmDisplay, WmSnapshot};
use crate::state::{ParseOutput, SkippedLine};

const RECT: &str = r"\[(-?\d+),(-?\d+)\]\[(-?\d+),(-?\d+)\]";

struct WmPatterns {
    display: Regex,
    display_size: Regex,
    rotation: Regex,
    window: Regex,
    window_ids: Regex,
    window_type: Regex,
    has_surface: Regex,
    frame: Regex,
    containing: Regex,
    is_visible: Regex,
    current_focus: Regex,
    focused_app: Regex,
    transition_state: Regex,
    default_bounds: Regex,
    movement_bounds: Regex,
}

impl WmPatterns {
    fn compile() -> std::result::Result<Self, regex::Error> {
        Ok(Self {
            display: Regex::new(r"^Display: mDisplayId=(-?\d+)")?,
            display_size: Regex::new(
                r"^init=(\d+)x(\d+) (\d+)dpi(?:.*?) cur=(\d+)x(\d+) app=(\d+)x(\d+)",
            )?,
            rotation: Regex::new(r"^mRotation=([0-3])\b")?,
            window: Regex::new(r"^Window #\d+ Window\{\S+ u\d+ ([^}]+)\}:")?,
            window_ids: Regex::new(r"^mDisplayId=(-?\d+) stackId=(-?\d+)")?,
            window_type: Regex::new(r"\bty=([A-Z_0-9]+)")?,
            has_surface: Regex::new(r"^mHasSurface=(true|false)\b")?,
            frame: Regex::new(&format!("^mFrame={RECT}"))?,
            containing: Regex::new(&format!("^containing={RECT}"))?,
            is_visible: Regex::new(r"\bisVisible=(true|false)\b")?,
            current_focus: Regex::new(r"^mCurrentFocus=Window\{\S+ u\d+ ([^}]+)\}")?,
            focused_app: Regex::new(r"^mFocusedApp=.*?ActivityRecord\{\S+ u\d+ ([^\s}]+)")?,
            transition_state: Regex::new(r"\bmAppTransitionState=([A-Z_]+)")?,
            default_bounds: Regex::new(&format!("^defaultBounds={RECT}"))?,
            movement_bounds: Regex::new(&format!("^movementBounds={RECT}"))?,
        })
    }
}

static PATTERNS: LazyLock<std::result::Result<WmPatterns, regex::Error>> =
    LazyLock::new(WmPatterns::compile);

fn patterns() -> Result<&'static WmPatterns> {
    PATTERNS.as_ref().map_err(|err| HarnessError::DumpParse {
        source_name: "window manager",
        details: format!("pattern compilation failed: {err}"),
    })
}

fn rect(c: &Captures<'_>) -> Option<Rect> {
    Some(Rect::new(
        c[1].parse().ok()?,
        c[2].parse().ok()?,
        c[3].parse().ok()?,
        c[4].parse().ok()?,
    ))
}

fn flag(re: &Regex, line: &str) -> Option<bool> {
    re.captures(line).map(|c| &c[1] == "true")
}

#[derive(Default)]
struct Builder {
    snapshot: WmSnapshot,
    skipped: Vec<SkippedLine>,
    display: Option<usize>,
    window: Option<usize>,
}

impl Builder {
    fn skip(&mut self, line_no: usize, text: &str, reason: &'static str) {
        self.skipped.push(SkippedLine {
            line_no,
            text: text.to_string(),
            reason,
        });
    }

    fn current_display(&mut self) -> Option<&mut WmDisplay> {
        self.snapshot.displays.get_mut(self.display?)
    }

    fn current_window(&mut self) -> Option<&mut WindowState> {
        self.snapshot.windows.get_mut(self.window?)
    }

    #[allow(clippy::too_many_lines)]
    fn line(&mut self, p: &WmPatterns, line_no: usize, raw: &str) {
        let line = raw.trim();
        if line.is_empty() {
            return;
        }

        if line.starts_with("Display: mDisplayId=") {
            match p.display.captures(line).and_then(|c| c[1].parse().ok()) {
                Some(id) => {
                    self.snapshot.displays.push(WmDisplay {
                        id,
                        frame: Rect::default(),
                        app_frame: Rect::default(),
                        density_dpi: 0,
                        rotation: 0,
                    });
                    self.display = Some(self.snapshot.displays.len() - 1);
                    self.window = None;
                }
                None => self.skip(line_no, line, "display header"),
            }
        } else if line.starts_with("init=") {
            let parsed = p.display_size.captures(line).and_then(|c| {
                Some((
                    c[3].parse::<u32>().ok()?,
                    Rect::from_size(c[4].parse().ok()?, c[5].parse().ok()?),
                    Rect::from_size(c[6].parse().ok()?, c[7].parse().ok()?),
                ))
            });
            match parsed {
                Some((dpi, frame, app_frame)) => {
                    if let Some(display) = self.current_display() {
                        display.density_dpi = dpi;
                        display.frame = frame;
                        display.app_frame = app_frame;
                    }
                }
                None => self.skip(line_no, line, "display size"),
            }
        } else if line.starts_with("mRotation=") {
            match p.rotation.captures(line).and_then(|c| c[1].parse::<u8>().ok()) {
                Some(rotation) => {
                    if let Some(display) = self.current_display() {
                        display.rotation = rotation;
                    }
                }
                None => self.skip(line_no, line, "rotation"),
            }
        } else if line.starts_with("Window #") {
            match p.window.captures(line) {
                Some(c) => {
                    let mut window = WindowState::new(c[1].trim());
                    if let Some(display) = self.display.and_then(|i| self.snapshot.displays.get(i))
                    {
                        window.display_id = display.id;
                    }
                    self.snapshot.windows.push(window);
                    self.window = Some(self.snapshot.windows.len() - 1);
                }
                None => {
                    self.window = None;
                    self.skip(line_no, line, "window header");
                }
            }
        } else if line.starts_with("mCurrentFocus=") {
            match p.current_focus.captures(line) {
                Some(c) => self.snapshot.focused_window = Some(c[1].trim().to_string()),
                None if line.ends_with("null") => self.snapshot.focused_window = None,
                None => self.skip(line_no, line, "current focus"),
            }
        } else if line.starts_with("mFocusedApp=") {
            match p
                .focused_app
                .captures(line)
                .and_then(|c| ComponentName::unflatten(&c[1]))
            {
                Some(app) => self.snapshot.focused_app = Some(app),
                None if line.ends_with("null") => self.snapshot.focused_app = None,
                None => self.skip(line_no, line, "focused app"),
            }
        } else if line.starts_with("defaultBounds=") {
            match p.default_bounds.captures(line).as_ref().and_then(rect) {
                Some(r) => self.snapshot.pinned_stack_default_bounds = Some(r),
                None => self.skip(line_no, line, "pinned default bounds"),
            }
        } else if line.starts_with("movementBounds=") {
            match p.movement_bounds.captures(line).as_ref().and_then(rect) {
                Some(r) => self.snapshot.pinned_stack_movement_bounds = Some(r),
                None => self.skip(line_no, line, "pinned movement bounds"),
            }
        } else if let Some(c) = p.transition_state.captures(line) {
            self.snapshot.app_transition_state = Some(c[1].to_string());
        } else if self.window.is_some() {
            self.window_attribute(p, line_no, line);
        }
    }

    fn window_attribute(&mut self, p: &WmPatterns, line_no: usize, line: &str) {
        if line.starts_with("mDisplayId=") {
            let ids = p.window_ids.captures(line).and_then(|c| {
                Some((c[1].parse::<i32>().ok()?, c[2].parse::<i32>().ok()?))
            });
            match ids {
                Some((display_id, stack_id)) => {
                    if let Some(window) = self.current_window() {
                        window.display_id = display_id;
                        window.stack_id = stack_id;
                    }
                }
                None => self.skip(line_no, line, "window ids"),
            }
            return;
        }
        if line.starts_with("mHasSurface=") {
            match flag(&p.has_surface, line) {
                Some(has_surface) => {
                    if let Some(window) = self.current_window() {
                        window.has_surface = has_surface;
                    }
                }
                None => self.skip(line_no, line, "surface flag"),
            }
            return;
        }
        if line.starts_with("mFrame=") {
            match p.frame.captures(line).as_ref().and_then(rect) {
                Some(r) => {
                    if let Some(window) = self.current_window() {
                        window.frame = r;
                    }
                }
                None => self.skip(line_no, line, "window frame"),
            }
            return;
        }
        if line.starts_with("containing=") {
            match p.containing.captures(line).as_ref().and_then(rect) {
                Some(r) => {
                    if let Some(window) = self.current_window() {
                        window.containing_frame = r;
                    }
                }
                None => self.skip(line_no, line, "containing frame"),
            }
            return;
        }

        let kind = p
            .window_type
            .captures(line)
            .map(|c| WindowKind::from_type(&c[1]));
        let visible = flag(&p.is_visible, line);
        if let Some(window) = self.current_window() {
            if let Some(kind) = kind {
                window.kind = kind;
            }
            if let Some(visible) = visible {
                window.visible = visible;
            }
        }
    }

    fn finish(mut self) -> ParseOutput<WmSnapshot> {
        self.snapshot.skipped_lines = self.skipped.len();
        ParseOutput {
            snapshot: self.snapshot,
            skipped: self.skipped,
        }
    }
}

/// Parse a full window-manager dump.
pub fn parse_wm_dump(text: &str) -> Result<ParseOutput<WmSnapshot>> {
    let p = patterns()?;
    let mut builder = Builder::default();
    for (index, line) in text.lines().enumerate() {
        builder.line(p, index + 1, line);
    }
    Ok(builder.finish())
}
