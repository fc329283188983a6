//! Component names: the join key between activity-manager records and
//! window-manager windows.
//!
//! The activity manager prints the short form (`pkg/.Cls`) while window titles
//! carry the fully qualified form (`pkg/pkg.Cls`). Both parse to the same
//! [`ComponentName`], and [`ComponentName::matches`] accepts either spelling.


use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::errors::HarnessError;

/// Android component: package plus fully qualified activity class.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentName {
    package: String,
    class: String,
}

impl ComponentName {
    /// A leading `.` on `class` is expanded relative to `package`.
    #[must_use]
    pub fn new(package: &str, class: &str) -> Self {
        let class = if class.starts_with('.') {
            format!("{package}{class}")
        } else {
            class.to_string()
        };
        Self {
            package: package.to_string(),
            class,
        }
    }

    /// Parse `pkg/.Cls`, `pkg/pkg.Cls` or `pkg/Cls`.
    #[must_use]
    pub fn unflatten(raw: &str) -> Option<Self> {
        let (package, class) = raw.trim().split_once('/')?;
        if package.is_empty() || class.is_empty() || class.contains(char::is_whitespace) {
            return None;
        }
        Some(Self::new(package, class))
    }

    /// Package name.
    #[must_use]
    pub fn package(&self) -> &str {
        &self.package
    }

    /// Fully qualified class name.
    #[must_use]
    pub fn class(&self) -> &str {
        &self.class
    }

    /// `pkg/pkg.Cls`: the window title form.
    #[must_use]
    pub fn flatten(&self) -> String {
        format!("{}/{}", self.package, self.class)
    }

    /// `pkg/.Cls` when the class lives in the package, else the full form.
    #[must_use]
    pub fn short(&self) -> String {
        match self
            .class
            .strip_prefix(self.package.as_str())
            .filter(|rest| rest.starts_with('.'))
        {
            Some(rest) => format!("{}/{rest}", self.package),
            None => self.flatten(),
        }
    }

    /// Unqualified class name; activities under test log with this tag.
    #[must_use]
    pub fn simple_name(&self) -> &str {
        self.class.rsplit('.').next().unwrap_or(&self.class)
    }

    /// Whether `name` spells this component in either form.
    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        Self::unflatten(name).is_some_and(|other| other == *self)
    }
}

impl fmt::Display for ComponentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.short())
    }
}

impl FromStr for ComponentName {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::unflatten(s).ok_or_else(|| HarnessError::InvalidConfig {
            details: format!("invalid component name {s:?}; expected pkg/.Class or pkg/pkg.Class"),
        })
    }
}
