//! Indirect launches: a helper activity or broadcast receiver on the device
//! starts the target with the options packed into intent extras.

use std::fmt::Write as _;

use crate::core::errors::Result;
use crate::state::amwm::AmWmState;
use crate::state::component::ComponentName;
use crate::state::wait::WaitOutcome;

/// `FLAG_ACTIVITY_SINGLE_TOP | FLAG_INCLUDE_STOPPED_PACKAGES`.
const LAUNCHING_ACTIVITY_FLAGS: u32 = 0x2000_0020;
/// `FLAG_INCLUDE_STOPPED_PACKAGES`.
const BROADCAST_FLAGS: u32 = 0x0000_0020;

/// Who receives the launch request.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Launcher {
    /// A trampoline activity started with `am start`.
    Activity(ComponentName),
    /// A receiver reached with `am broadcast -a <action> -p <package>`.
    Broadcast { action: String, package: String },
}

/// Builds and runs one indirect launch of `target`.
#[derive(Debug, Clone)]
pub struct LaunchActivityBuilder {
    target: ComponentName,
    launcher: Launcher,
    to_side: bool,
    random_data: bool,
    new_task: bool,
    multiple_task: bool,
    reorder_to_front: bool,
    use_application_context: bool,
    suppress_exceptions: bool,
    display_id: Option<i32>,
    wait_for_launched: bool,
}

impl LaunchActivityBuilder {
    /// Launch `target` through the trampoline `launching_activity`.
    #[must_use]
    pub const fn new(target: ComponentName, launching_activity: ComponentName) -> Self {
        Self {
            target,
            launcher: Launcher::Activity(launching_activity),
            to_side: false,
            random_data: false,
            new_task: false,
            multiple_task: false,
            reorder_to_front: false,
            use_application_context: false,
            suppress_exceptions: false,
            display_id: None,
            wait_for_launched: true,
        }
    }

    /// Route the request through a broadcast receiver instead.
    #[must_use]
    pub fn via_broadcast(mut self, action: impl Into<String>, package: impl Into<String>) -> Self {
        self.launcher = Launcher::Broadcast {
            action: action.into(),
            package: package.into(),
        };
        self
    }

    /// Launch into the adjacent split-screen side.
    #[must_use]
    pub const fn to_side(mut self, value: bool) -> Self {
        self.to_side = value;
        self
    }

    /// Attach random intent data so each launch is distinct.
    #[must_use]
    pub const fn random_data(mut self, value: bool) -> Self {
        self.random_data = value;
        self
    }

    /// Ask the launcher to add `FLAG_ACTIVITY_NEW_TASK`.
    #[must_use]
    pub const fn new_task(mut self, value: bool) -> Self {
        self.new_task = value;
        self
    }

    /// Ask the launcher to add `FLAG_ACTIVITY_MULTIPLE_TASK`.
    #[must_use]
    pub const fn multiple_task(mut self, value: bool) -> Self {
        self.multiple_task = value;
        self
    }

    /// Ask the launcher to add `FLAG_ACTIVITY_REORDER_TO_FRONT`.
    #[must_use]
    pub const fn reorder_to_front(mut self, value: bool) -> Self {
        self.reorder_to_front = value;
        self
    }

    /// Start from the application context instead of the launching activity.
    #[must_use]
    pub const fn use_application_context(mut self, value: bool) -> Self {
        self.use_application_context = value;
        self
    }

    /// Swallow launch exceptions on the launching side.
    #[must_use]
    pub const fn suppress_exceptions(mut self, value: bool) -> Self {
        self.suppress_exceptions = value;
        self
    }

    /// Launch on `display_id`.
    #[must_use]
    pub const fn display_id(mut self, display_id: i32) -> Self {
        self.display_id = Some(display_id);
        self
    }

    /// Whether `execute` waits for a valid state after issuing the command.
    /// On by default.
    #[must_use]
    pub const fn wait_for_launched(mut self, value: bool) -> Self {
        self.wait_for_launched = value;
        self
    }

    /// Activity to start.
    #[must_use]
    pub const fn target(&self) -> &ComponentName {
        &self.target
    }

    /// How the launch request is delivered.
    #[must_use]
    pub const fn launcher(&self) -> &Launcher {
        &self.launcher
    }

    /// The full shell command for this launch.
    #[must_use]
    pub fn command(&self) -> String {
        let mut cmd = match &self.launcher {
            Launcher::Activity(activity) => format!(
                "am start -n {} -f {LAUNCHING_ACTIVITY_FLAGS:#010x}",
                activity.short()
            ),
            Launcher::Broadcast { action, package } => {
                format!("am broadcast -a {action} -p {package} -f {BROADCAST_FLAGS:#010x}")
            }
        };
        cmd.push_str(" --ez launch_activity true");

        let flags = [
            ("launch_to_side", self.to_side),
            ("random_data", self.random_data),
            ("new_task", self.new_task),
            ("multiple_task", self.multiple_task),
            ("reorder_to_front", self.reorder_to_front),
            ("use_application_context", self.use_application_context),
            ("suppress_exceptions", self.suppress_exceptions),
        ];
        for (key, _) in flags.iter().filter(|(_, on)| *on) {
            let _ = write!(cmd, " --ez {key} true");
        }
        if let Some(display_id) = self.display_id {
            let _ = write!(cmd, " --ei display_id {display_id}");
        }
        let _ = write!(cmd, " --es target_component {}", self.target.short());
        cmd
    }

    /// Issue the launch. Unless disabled, wait until the target is visible
    /// in both subsystems and return how that went.
    pub fn execute(&self, state: &mut AmWmState) -> Result<Option<WaitOutcome<()>>> {
        state.collector().shell().execute(&self.command())?;
        if !self.wait_for_launched {
            return Ok(None);
        }
        state
            .wait_for_valid_state(std::slice::from_ref(&self.target))
            .map(Some)
    }
}
