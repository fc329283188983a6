//! Top-level CLI definition and dispatch.

use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use colored::{Colorize, control};
use serde_json::{Value, json};
use thiserror::Error;

use amwm_harness::core::config::Config;
use amwm_harness::core::errors::HarnessError;
use amwm_harness::device::{Capabilities, DeviceStateHandle};
use amwm_harness::logcat::lifecycle::LifecycleValidator;
use amwm_harness::logcat::reader::LogReader;
use amwm_harness::logcat::separator::LogSeparator;
use amwm_harness::logger::EventLog;
use amwm_harness::logger::jsonl::{EventType, LogEntry, Severity};
use amwm_harness::platform::pal::{AdbShell, DeviceShell};
use amwm_harness::state::amwm::AmWmState;
use amwm_harness::state::collector::{StateCollector, StateSnapshot};
use amwm_harness::state::component::ComponentName;
use amwm_harness::state::invariants::{CheckOptions, InvariantChecker, InvariantReport};
use amwm_harness::state::model::LifecycleState;
use amwm_harness::state::wait::{OnTimeout, WaitOutcome, WaitPolicy};

/// amwm: observe and assert on a device's activity and window managers.
#[derive(Debug, Parser)]
#[command(
    name = "amwm",
    author,
    version,
    about = "Activity/Window manager state harness",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Target device serial (overrides config and ANDROID_SERIAL).
    #[arg(long, global = true, value_name = "SERIAL")]
    serial: Option<String>,
    /// Path to the adb executable.
    #[arg(long, global = true, value_name = "PATH")]
    adb: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Increase verbosity.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,
    /// Quiet mode (errors only).
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Collect and print one snapshot of both subsystems.
    Dump(DumpArgs),
    /// Collect a snapshot and run the cross-subsystem invariant checks.
    Check(CheckArgs),
    /// Poll until an activity reaches a state or becomes visible.
    WaitActivity(WaitActivityArgs),
    /// Print lifecycle callback counts scraped from the device log.
    Lifecycle(LifecycleArgs),
    /// Write a fresh separator to the device log and print its token.
    Separator,
    /// Probe and print device capabilities.
    Capabilities,
    /// View configuration state.
    Config(ConfigArgs),
}

#[derive(Debug, Clone, Args, Default)]
struct DumpArgs {
    /// Only the activity manager.
    #[arg(long, conflicts_with = "wm_only")]
    am_only: bool,
    /// Only the window manager.
    #[arg(long, conflicts_with = "am_only")]
    wm_only: bool,
}

#[derive(Debug, Clone, Args, Default)]
struct CheckArgs {
    /// Skip the task bounds vs window frame comparison.
    #[arg(long)]
    no_bounds: bool,
    /// Wait for a valid state with these activities visible before checking.
    #[arg(long, value_name = "COMPONENT")]
    wait_for: Vec<String>,
}

#[derive(Debug, Clone, Args)]
struct WaitActivityArgs {
    /// Component name, e.g. `com.example/.MainActivity`.
    #[arg(value_name = "COMPONENT")]
    activity: String,
    /// Lifecycle state to wait for; omit to wait for visibility.
    #[arg(long, value_name = "STATE")]
    state: Option<String>,
    /// Override the attempt budget.
    #[arg(long, value_name = "N")]
    attempts: Option<u32>,
    /// Override the poll interval.
    #[arg(long, value_name = "MILLISECONDS")]
    interval_ms: Option<u64>,
    /// Report a timeout as a skip (exit 5) instead of a failure.
    #[arg(long)]
    skip_on_timeout: bool,
}

#[derive(Debug, Clone, Args)]
struct LifecycleArgs {
    /// Component name whose simple class name is the log tag.
    #[arg(value_name = "COMPONENT")]
    activity: String,
    /// Only count lines after this separator token.
    #[arg(long, value_name = "TOKEN")]
    separator: String,
}

#[derive(Debug, Clone, Args)]
struct ConfigArgs {
    /// Config operation to run.
    #[command(subcommand)]
    command: Option<ConfigCommand>,
}

#[derive(Debug, Clone, Subcommand)]
enum ConfigCommand {
    /// Print resolved config file path.
    Path,
    /// Print effective merged configuration.
    Show,
    /// Validate configuration and exit.
    Validate,
    /// Show effective-vs-default config diff.
    Diff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input or configuration.
    #[error("{0}")]
    User(String),
    /// Transport, parse or environment failure.
    #[error("{0}")]
    Runtime(String),
    /// An assertion, invariant or wait failed on the device.
    #[error("{0}")]
    Failed(String),
    /// The device lacks a required capability.
    #[error("{0}")]
    Skipped(String),
    /// JSON serialization failed.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Runtime(_) | Self::Io(_) => 2,
            Self::Json(_) => 3,
            Self::Failed(_) => 4,
            Self::Skipped(_) => 5,
        }
    }
}

impl From<HarnessError> for CliError {
    fn from(err: HarnessError) -> Self {
        let message = err.to_string();
        match err {
            HarnessError::InvalidConfig { .. }
            | HarnessError::MissingConfig { .. }
            | HarnessError::ConfigParse { .. } => Self::User(message),
            HarnessError::CapabilityAbsent { .. } => Self::Skipped(message),
            HarnessError::Assertion { .. }
            | HarnessError::WaitTimedOut { .. }
            | HarnessError::SessionRestore { .. } => Self::Failed(message),
            _ => Self::Runtime(message),
        }
    }
}

/// Everything a device-facing subcommand needs.
struct Context {
    config: Config,
    log: EventLog,
    shell: Arc<dyn DeviceShell>,
}

impl Context {
    fn open(cli: &Cli) -> Result<Self, CliError> {
        let mut config = Config::load(cli.config.as_deref())?;
        if let Some(serial) = &cli.serial {
            config.device.serial = Some(serial.clone());
        }
        if let Some(adb) = &cli.adb {
            config.device.adb_path.clone_from(adb);
        }
        let log = EventLog::from_config(&config.logging).with_verbose(cli.verbose);
        log.record(
            &LogEntry::new(EventType::HarnessStart, Severity::Info)
                .details(format!("config {}", config.stable_hash()?)),
        );
        let shell: Arc<dyn DeviceShell> = Arc::new(AdbShell::from_config(&config.device));
        Ok(Self { config, log, shell })
    }

    fn collector(&self) -> StateCollector {
        StateCollector::new(Arc::clone(&self.shell), self.log.clone())
    }

    fn device(&self) -> DeviceStateHandle {
        DeviceStateHandle::new(Arc::clone(&self.shell), self.log.clone())
    }
}

/// Dispatch CLI commands.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.no_color {
        control::set_override(false);
    }

    match &cli.command {
        Command::Dump(args) => run_dump(cli, args),
        Command::Check(args) => run_check(cli, args),
        Command::WaitActivity(args) => run_wait_activity(cli, args),
        Command::Lifecycle(args) => run_lifecycle(cli, args),
        Command::Separator => run_separator(cli),
        Command::Capabilities => run_capabilities(cli),
        Command::Config(args) => run_config(cli, args),
    }
}

fn parse_component(raw: &str) -> Result<ComponentName, CliError> {
    raw.parse::<ComponentName>()
        .map_err(|e| CliError::User(e.to_string()))
}

// ──────────────────── dump / check ────────────────────

fn run_dump(cli: &Cli, args: &DumpArgs) -> Result<(), CliError> {
    let ctx = Context::open(cli)?;
    let collector = ctx.collector();
    let snapshot = if args.wm_only {
        StateSnapshot {
            am: Default::default(),
            wm: collector.collect_wm()?,
        }
    } else if args.am_only {
        StateSnapshot {
            am: collector.collect_am()?,
            wm: Default::default(),
        }
    } else {
        collector.collect()?
    };

    match output_mode(cli) {
        OutputMode::Human => print_snapshot_human(&snapshot, args),
        OutputMode::Json => {
            let mut payload = json!({ "command": "dump" });
            if !args.wm_only {
                payload["am"] = serde_json::to_value(&snapshot.am)?;
            }
            if !args.am_only {
                payload["wm"] = serde_json::to_value(&snapshot.wm)?;
            }
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

fn print_snapshot_human(snapshot: &StateSnapshot, args: &DumpArgs) {
    if !args.wm_only {
        let am = &snapshot.am;
        println!("{}", "Activity manager".bold());
        println!(
            "  focused stack: {}",
            am.focused_stack_id
                .map_or_else(|| "none".to_string(), |id| id.to_string())
        );
        if let Some(activity) = &am.focused_activity {
            println!("  focused activity: {activity}");
        }
        println!("  keyguard: {:?}", am.keyguard);
        for display in &am.displays {
            println!("  display #{}", display.id);
            for stack in &display.stacks {
                println!(
                    "    stack #{} {} {}",
                    stack.id,
                    stack.windowing_mode.as_str(),
                    stack.activity_type.as_str()
                );
                for task in &stack.tasks {
                    println!("      task #{}", task.id);
                    for activity in &task.activities {
                        let visibility = if activity.visible {
                            "visible".green()
                        } else {
                            "hidden".dimmed()
                        };
                        println!(
                            "        {} {} {visibility}",
                            activity.name,
                            activity.state.as_str()
                        );
                    }
                }
            }
        }
        if am.skipped_lines > 0 {
            println!("  {} unparsed line(s) skipped", am.skipped_lines.to_string().yellow());
        }
    }
    if !args.am_only {
        let wm = &snapshot.wm;
        println!("{}", "Window manager".bold());
        for display in &wm.displays {
            println!(
                "  display #{} {} rotation {}",
                display.id, display.frame, display.rotation
            );
        }
        if let Some(focus) = &wm.focused_window {
            println!("  focused window: {focus}");
        }
        for window in &wm.windows {
            let visibility = if window.visible {
                "visible".green()
            } else {
                "hidden".dimmed()
            };
            println!(
                "    {} display {} {visibility} {}",
                window.name, window.display_id, window.frame
            );
        }
        if wm.skipped_lines > 0 {
            println!("  {} unparsed line(s) skipped", wm.skipped_lines.to_string().yellow());
        }
    }
}

fn run_check(cli: &Cli, args: &CheckArgs) -> Result<(), CliError> {
    let ctx = Context::open(cli)?;
    let options = CheckOptions {
        compare_bounds: !args.no_bounds,
    };
    let activities = args
        .wait_for
        .iter()
        .map(|raw| parse_component(raw))
        .collect::<Result<Vec<_>, _>>()?;

    let mut state =
        AmWmState::new(ctx.collector(), ctx.config.wait.clone()).with_check_options(options);
    if activities.is_empty() {
        state.compute_state()?;
    } else {
        state
            .wait_for_valid_state(&activities)?
            .require("valid state")?;
    }
    let report = InvariantChecker::new(options).check(state.snapshot());
    for violation in &report.violations {
        ctx.log.record(
            &LogEntry::new(EventType::InvariantViolation, Severity::Warning)
                .condition(format!("{:?}", violation.kind))
                .details(violation.to_string()),
        );
    }

    match output_mode(cli) {
        OutputMode::Human => print_report_human(cli, &report),
        OutputMode::Json => {
            let payload = json!({
                "command": "check",
                "ok": report.is_ok(),
                "report": serde_json::to_value(&report)?,
            });
            write_json_line(&payload)?;
        }
    }

    if report.is_ok() {
        Ok(())
    } else {
        Err(CliError::Failed(format!(
            "{} invariant violation(s)",
            report.violations.len()
        )))
    }
}

fn print_report_human(cli: &Cli, report: &InvariantReport) {
    if report.is_ok() {
        if !cli.quiet {
            println!("{} all invariants hold", "PASS".green().bold());
        }
        return;
    }
    println!(
        "{} {} violation(s)",
        "FAIL".red().bold(),
        report.violations.len()
    );
    for violation in &report.violations {
        println!("  - {violation}");
    }
    if !report.visibility_checked {
        println!("  (visibility not checked: keyguard {:?})", report.keyguard);
    }
}

// ──────────────────── wait-activity ────────────────────

fn run_wait_activity(cli: &Cli, args: &WaitActivityArgs) -> Result<(), CliError> {
    let activity = parse_component(&args.activity)?;
    let target = args
        .state
        .as_deref()
        .map(|raw| {
            LifecycleState::from_name(raw)
                .ok_or_else(|| CliError::User(format!("unknown lifecycle state: {raw}")))
        })
        .transpose()?;

    let ctx = Context::open(cli)?;
    let mut waits = ctx.config.wait.clone();
    if let Some(attempts) = args.attempts {
        waits.default.max_attempts = attempts.max(1);
    }
    if let Some(interval) = args.interval_ms {
        waits.default.interval_ms = interval;
    }
    let policy = waits.default.policy();
    let mut state = AmWmState::new(ctx.collector(), waits);

    let (condition, outcome) = match target {
        Some(lifecycle) => (
            format!("{activity} to be {lifecycle}"),
            state.wait_for_activity_state(&activity, lifecycle)?,
        ),
        None => (
            format!("{activity} visible"),
            state.wait_for_valid_state(std::slice::from_ref(&activity))?,
        ),
    };
    report_wait(cli, &condition, &policy, &outcome)?;

    let on_timeout = if args.skip_on_timeout {
        OnTimeout::Skip
    } else {
        OnTimeout::Fail
    };
    Ok(outcome.resolve(&condition, on_timeout)?)
}

fn report_wait(
    cli: &Cli,
    condition: &str,
    policy: &WaitPolicy,
    outcome: &WaitOutcome<()>,
) -> Result<(), CliError> {
    match output_mode(cli) {
        OutputMode::Human => {
            if cli.quiet {
                return Ok(());
            }
            let status = if outcome.is_converged() {
                "CONVERGED".green().bold()
            } else {
                "TIMED OUT".yellow().bold()
            };
            println!(
                "{status} {condition} after {}/{} attempt(s)",
                outcome.attempts(),
                policy.max_attempts
            );
        }
        OutputMode::Json => {
            let payload = json!({
                "command": "wait-activity",
                "condition": condition,
                "converged": outcome.is_converged(),
                "attempts": outcome.attempts(),
                "max_attempts": policy.max_attempts,
                "interval_ms": u64::try_from(policy.interval.as_millis()).unwrap_or(u64::MAX),
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

// ──────────────────── logcat ────────────────────

fn run_lifecycle(cli: &Cli, args: &LifecycleArgs) -> Result<(), CliError> {
    let activity = parse_component(&args.activity)?;
    let separator = LogSeparator::from_token(args.separator.clone())?;
    let ctx = Context::open(cli)?;
    let reader = LogReader::new(Arc::clone(&ctx.shell), ctx.log.clone());
    let state = AmWmState::new(ctx.collector(), ctx.config.wait.clone());
    let validator = LifecycleValidator::new(
        reader,
        state.waiter().clone(),
        ctx.config.wait.lifecycle.policy(),
    );
    let counts = validator.counts(&activity, &separator)?;
    let sizes = validator.last_reported_sizes(&activity, &separator)?;

    match output_mode(cli) {
        OutputMode::Human => {
            println!("{} {}", activity.simple_name().bold(), counts.counters());
            println!(
                "  config changed {}, moved to display {}, multi-window {}, pip {}, user leave hint {}",
                counts.configuration_changed,
                counts.moved_to_display,
                counts.multi_window_mode_changed,
                counts.picture_in_picture_mode_changed,
                counts.user_leave_hint
            );
            if let Some(sizes) = sizes {
                println!(
                    "  last config {}x{}dp display {}x{} density {}",
                    sizes.width_dp,
                    sizes.height_dp,
                    sizes.display_width,
                    sizes.display_height,
                    sizes.density_dpi
                );
            }
        }
        OutputMode::Json => {
            let payload = json!({
                "command": "lifecycle",
                "activity": activity.flatten(),
                "separator": separator.as_str(),
                "counts": serde_json::to_value(counts)?,
                "last_reported_sizes": serde_json::to_value(sizes)?,
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

fn run_separator(cli: &Cli) -> Result<(), CliError> {
    let ctx = Context::open(cli)?;
    let separator = LogReader::new(Arc::clone(&ctx.shell), ctx.log.clone()).separate_logs()?;
    match output_mode(cli) {
        OutputMode::Human => println!("{separator}"),
        OutputMode::Json => write_json_line(&json!({
            "command": "separator",
            "token": separator.as_str(),
        }))?,
    }
    Ok(())
}

// ──────────────────── capabilities ────────────────────

fn run_capabilities(cli: &Cli) -> Result<(), CliError> {
    let ctx = Context::open(cli)?;
    let device = ctx.device();
    let caps = Capabilities::probe(&device)?;
    let display_on = device.is_display_on()?;
    let vr_locked = device.is_ui_mode_locked_to_vr_headset()?;

    match output_mode(cli) {
        OutputMode::Human => {
            for (capability, supported) in caps.matrix() {
                let mark = if supported { "yes".green() } else { "no".red() };
                println!("  {:<22} {mark}", capability.as_str());
            }
            println!("  {:<22} {display_on}", "display-on");
            println!("  {:<22} {vr_locked}", "ui-mode-locked-to-vr");
        }
        OutputMode::Json => {
            let matrix: serde_json::Map<String, Value> = caps
                .matrix()
                .into_iter()
                .map(|(c, supported)| (c.as_str().to_string(), Value::Bool(supported)))
                .collect();
            write_json_line(&json!({
                "command": "capabilities",
                "capabilities": matrix,
                "display_on": display_on,
                "ui_mode_locked_to_vr": vr_locked,
            }))?;
        }
    }
    Ok(())
}

// ──────────────────── config ────────────────────

fn run_config(cli: &Cli, args: &ConfigArgs) -> Result<(), CliError> {
    match &args.command {
        None | Some(ConfigCommand::Path) => {
            let path = cli.config.clone().unwrap_or_else(Config::default_path);
            let exists = path.exists();

            match output_mode(cli) {
                OutputMode::Human => {
                    println!("{}", path.display());
                    if !exists {
                        println!("  (file does not exist; defaults will be used)");
                    }
                }
                OutputMode::Json => {
                    let payload = json!({
                        "command": "config path",
                        "path": path.to_string_lossy(),
                        "exists": exists,
                    });
                    write_json_line(&payload)?;
                }
            }
            Ok(())
        }
        Some(ConfigCommand::Show) => {
            let config = Config::load(cli.config.as_deref())?;

            match output_mode(cli) {
                OutputMode::Human => println!("{}", config.to_toml()?),
                OutputMode::Json => {
                    let payload = json!({
                        "command": "config show",
                        "config": serde_json::to_value(&config)?,
                    });
                    write_json_line(&payload)?;
                }
            }
            Ok(())
        }
        Some(ConfigCommand::Validate) => match Config::load(cli.config.as_deref()) {
            Ok(config) => {
                let hash = config.stable_hash()?;

                match output_mode(cli) {
                    OutputMode::Human => {
                        println!("Configuration is valid.");
                        println!("  Source: {}", config.paths.config_file.display());
                        println!("  Hash: {hash}");
                    }
                    OutputMode::Json => {
                        let payload = json!({
                            "command": "config validate",
                            "valid": true,
                            "path": config.paths.config_file.to_string_lossy(),
                            "hash": hash,
                        });
                        write_json_line(&payload)?;
                    }
                }
                Ok(())
            }
            Err(e) => {
                match output_mode(cli) {
                    OutputMode::Human => eprintln!("Configuration is INVALID: {e}"),
                    OutputMode::Json => {
                        let payload = json!({
                            "command": "config validate",
                            "valid": false,
                            "code": e.code(),
                            "error": e.to_string(),
                        });
                        write_json_line(&payload)?;
                    }
                }
                Err(CliError::User(format!("invalid config: {e}")))
            }
        },
        Some(ConfigCommand::Diff) => {
            let effective = Config::load(cli.config.as_deref())?;
            let mut defaults = Config::default();
            defaults.paths.clone_from(&effective.paths);
            let eff_json = serde_json::to_value(&effective)?;
            let def_json = serde_json::to_value(&defaults)?;

            match output_mode(cli) {
                OutputMode::Human => {
                    if effective == defaults {
                        println!("No differences from defaults.");
                    } else {
                        println!("--- defaults");
                        println!("+++ effective ({})", effective.paths.config_file.display());
                        println!();
                        print_json_diff("", &def_json, &eff_json);
                    }
                }
                OutputMode::Json => {
                    let payload = json!({
                        "command": "config diff",
                        "has_differences": effective != defaults,
                        "effective": eff_json,
                        "defaults": def_json,
                    });
                    write_json_line(&payload)?;
                }
            }
            Ok(())
        }
    }
}

fn print_json_diff(prefix: &str, default: &Value, effective: &Value) {
    match (default, effective) {
        (Value::Object(def_map), Value::Object(eff_map)) => {
            let mut keys: Vec<&String> = def_map.keys().chain(eff_map.keys()).collect();
            keys.sort();
            keys.dedup();

            for key in keys {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                match (def_map.get(key), eff_map.get(key)) {
                    (Some(d), Some(e)) if d != e => print_json_diff(&path, d, e),
                    (Some(d), None) => println!("- {path}: {d}"),
                    (None, Some(e)) => println!("+ {path}: {e}"),
                    _ => {}
                }
            }
        }
        _ => {
            if default != effective {
                println!("- {prefix}: {default}");
                println!("+ {prefix}: {effective}");
            }
        }
    }
}

// ──────────────────── output ────────────────────

fn write_json_line(payload: &Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    Ok(())
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("AMWM_OUTPUT_FORMAT").ok();
    resolve_output_mode(cli.json, env_mode.as_deref(), io::stdout().is_terminal())
}

fn resolve_output_mode(json_flag: bool, env_mode: Option<&str>, stdout_is_tty: bool) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }

    let fallback = if stdout_is_tty {
        OutputMode::Human
    } else {
        OutputMode::Json
    };

    match env_mode
        .map(str::trim)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("json") => OutputMode::Json,
        Some("human") => OutputMode::Human,
        _ => fallback,
    }
}
