//! Capability probing. Scenarios call [`Capabilities::require`] before any
//! destructive mutation so an unsupported device skips instead of failing.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use crate::core::errors::{HarnessError, Result};
use crate::device::handle::DeviceStateHandle;
use crate::logger::jsonl::{EventType, LogEntry, Severity};

const FEATURE_PICTURE_IN_PICTURE: &str = "android.software.picture_in_picture";
const FEATURE_FREEFORM: &str = "android.software.freeform_window_management";
const FEATURE_LEANBACK: &str = "android.software.leanback";
const FEATURE_WATCH: &str = "android.hardware.type.watch";
const FEATURE_EMBEDDED: &str = "android.hardware.type.embedded";
const FEATURE_SCREEN_LANDSCAPE: &str = "android.hardware.screen.landscape";
const FEATURE_SCREEN_PORTRAIT: &str = "android.hardware.screen.portrait";
const FEATURE_VR_HIGH_PERFORMANCE: &str = "android.hardware.vr.high_performance";

/// Something a scenario may need from the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
#[allow(missing_docs)]
pub enum Capability {
    PictureInPicture,
    Freeform,
    SplitScreen,
    SecureLockScreen,
    InsecureLockScreen,
    Rotation,
    VrMode,
    HomeScreen,
}

impl Capability {
    /// Every capability, in report order.
    pub const ALL: [Self; 8] = [
        Self::PictureInPicture,
        Self::Freeform,
        Self::SplitScreen,
        Self::SecureLockScreen,
        Self::InsecureLockScreen,
        Self::Rotation,
        Self::VrMode,
        Self::HomeScreen,
    ];

    /// Stable name used in reports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PictureInPicture => "picture-in-picture",
            Self::Freeform => "freeform",
            Self::SplitScreen => "split-screen",
            Self::SecureLockScreen => "secure-lock-screen",
            Self::InsecureLockScreen => "insecure-lock-screen",
            Self::Rotation => "rotation",
            Self::VrMode => "vr-mode",
            Self::HomeScreen => "home-screen",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Probed once, queried many times.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    features: BTreeSet<String>,
    has_home_screen: bool,
}

impl Capabilities {
    /// Build from an explicit feature list.
    #[must_use]
    pub fn from_features<I, S>(features: I, has_home_screen: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            features: features.into_iter().map(Into::into).collect(),
            has_home_screen,
        }
    }

    /// Query the device's feature list and home-screen presence.
    pub fn probe(device: &DeviceStateHandle) -> Result<Self> {
        let features = device.features()?;
        let has_home_screen = device.has_home_screen()?;
        Ok(Self::from_features(features, has_home_screen))
    }

    /// Whether `pm list features` listed `name`.
    #[must_use]
    pub fn has_feature(&self, name: &str) -> bool {
        self.features.contains(name)
    }

    /// Whether the probed device supports `capability`.
    #[must_use]
    pub fn supports(&self, capability: Capability) -> bool {
        let has = |name: &str| self.has_feature(name);
        match capability {
            Capability::PictureInPicture => has(FEATURE_PICTURE_IN_PICTURE),
            Capability::Freeform => has(FEATURE_FREEFORM),
            // Split screen is disabled for watch and TV form factors.
            Capability::SplitScreen => !has(FEATURE_WATCH) && !has(FEATURE_LEANBACK),
            Capability::SecureLockScreen => !has(FEATURE_LEANBACK) && !has(FEATURE_EMBEDDED),
            Capability::InsecureLockScreen => {
                !has(FEATURE_LEANBACK) && !has(FEATURE_WATCH) && !has(FEATURE_EMBEDDED)
            }
            Capability::Rotation => {
                // Neither declared means both orientations are supported.
                has(FEATURE_SCREEN_LANDSCAPE) == has(FEATURE_SCREEN_PORTRAIT)
            }
            Capability::VrMode => has(FEATURE_VR_HIGH_PERFORMANCE),
            Capability::HomeScreen => self.has_home_screen,
        }
    }

    /// `CapabilityAbsent` unless the device supports `capability`.
    pub fn require(&self, capability: Capability, device: &DeviceStateHandle) -> Result<()> {
        if self.supports(capability) {
            return Ok(());
        }
        let err = HarnessError::capability_absent(capability.as_str());
        device.log().diag("SKIP", &err.to_string());
        device.log().record(
            &LogEntry::new(EventType::CapabilitySkipped, Severity::Info)
                .condition(capability.as_str())
                .error(&err),
        );
        Err(err)
    }

    /// Support matrix in declaration order.
    #[must_use]
    pub fn matrix(&self) -> Vec<(Capability, bool)> {
        Capability::ALL
            .iter()
            .map(|c| (*c, self.supports(*c)))
            .collect()
    }
}
