//! Configuration system: TOML file + env var overrides + smart defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::errors::{HarnessError, Result};
use crate::state::wait::WaitPolicy;

/// Full harness configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    pub device: DeviceConfig,
    pub wait: WaitConfig,
    pub lock: LockConfig,
    pub logging: LoggingConfig,
    pub paths: PathsConfig,
}

/// How to reach the device under test.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DeviceConfig {
    pub adb_path: PathBuf,
    /// Target a specific device (`adb -s`); `None` lets adb pick.
    pub serial: Option<String>,
}

/// One retry budget: fixed interval, bounded attempts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WaitPolicyConfig {
    pub interval_ms: u64,
    pub max_attempts: u32,
}

impl Default for WaitPolicyConfig {
    fn default() -> Self {
        Self {
            interval_ms: 500,
            max_attempts: 10,
        }
    }
}

impl WaitPolicyConfig {
    #[must_use]
    pub const fn new(interval_ms: u64, max_attempts: u32) -> Self {
        Self {
            interval_ms,
            max_attempts,
        }
    }

    #[must_use]
    pub const fn policy(&self) -> WaitPolicy {
        WaitPolicy::new(Duration::from_millis(self.interval_ms), self.max_attempts)
    }
}

/// Retry budgets per call-site family.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WaitConfig {
    /// Snapshot-pair predicates (valid state, focus, stacks).
    pub default: WaitPolicyConfig,
    /// Log-scraped lifecycle validators.
    pub lifecycle: WaitPolicyConfig,
    /// Rotation settling after `user_rotation` changes.
    pub rotation: WaitPolicyConfig,
    /// Keyguard showing/occluded/gone transitions.
    pub keyguard: WaitPolicyConfig,
    /// Display power-off after a sleep key event.
    pub display_off: WaitPolicyConfig,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            default: WaitPolicyConfig::new(500, 10),
            lifecycle: WaitPolicyConfig::new(1_000, 5),
            rotation: WaitPolicyConfig::new(500, 10),
            keyguard: WaitPolicyConfig::new(500, 10),
            display_off: WaitPolicyConfig::new(1_000, 5),
        }
    }
}

impl WaitConfig {
    /// Zero-interval budgets for deterministic tests against fake devices.
    #[must_use]
    pub const fn immediate(max_attempts: u32) -> Self {
        let policy = WaitPolicyConfig::new(0, max_attempts);
        Self {
            default: policy,
            lifecycle: policy,
            rotation: policy,
            keyguard: policy,
            display_off: policy,
        }
    }
}

/// Lock-screen credential used by lock sessions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LockConfig {
    pub credential: String,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            credential: "1234".to_string(),
        }
    }
}

/// JSONL event log settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    pub enabled: bool,
    pub jsonl_path: PathBuf,
    pub fallback_path: Option<PathBuf>,
    pub max_size_bytes: u64,
    pub max_rotated_files: u32,
}

/// Filesystem paths used by the harness.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub config_file: PathBuf,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            adb_path: PathBuf::from("adb"),
            serial: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        let data = home_dir().join(".local").join("share").join("amwm");
        Self {
            enabled: true,
            jsonl_path: data.join("events.jsonl"),
            fallback_path: Some(env::temp_dir().join("amwm-events.jsonl")),
            max_size_bytes: 16 * 1024 * 1024,
            max_rotated_files: 3,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            config_file: home_dir().join(".config").join("amwm").join("config.toml"),
        }
    }
}

fn home_dir() -> PathBuf {
    env::var_os("HOME").map_or_else(
        || {
            eprintln!("[AMWM-CONFIG] WARNING: HOME not set, falling back to /tmp for data paths");
            PathBuf::from("/tmp")
        },
        PathBuf::from,
    )
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathsConfig::default().config_file
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from default path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);
        let is_explicit_path = path.is_some();

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf)
                .map_err(|source| HarnessError::io(&path_buf, source))?;
            toml::from_str::<Self>(&raw)?
        } else if is_explicit_path {
            return Err(HarnessError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.paths.config_file = path_buf;
        cfg.apply_env_overrides()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Deterministic hash of the effective config for event-log correlation.
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(raw) = env_var("AMWM_DEVICE_ADB_PATH") {
            self.device.adb_path = PathBuf::from(raw);
        }
        if let Some(raw) = env_var("AMWM_DEVICE_SERIAL") {
            self.device.serial = Some(raw);
        } else if let Some(raw) = env_var("ANDROID_SERIAL") {
            self.device.serial.get_or_insert(raw);
        }

        for (prefix, slot) in [
            ("AMWM_WAIT_DEFAULT", &mut self.wait.default),
            ("AMWM_WAIT_LIFECYCLE", &mut self.wait.lifecycle),
            ("AMWM_WAIT_ROTATION", &mut self.wait.rotation),
            ("AMWM_WAIT_KEYGUARD", &mut self.wait.keyguard),
            ("AMWM_WAIT_DISPLAY_OFF", &mut self.wait.display_off),
        ] {
            set_env_u64(&format!("{prefix}_INTERVAL_MS"), &mut slot.interval_ms)?;
            set_env_u32(&format!("{prefix}_MAX_ATTEMPTS"), &mut slot.max_attempts)?;
        }

        if let Some(raw) = env_var("AMWM_LOCK_CREDENTIAL") {
            self.lock.credential = raw;
        }

        set_env_bool("AMWM_LOGGING_ENABLED", &mut self.logging.enabled)?;
        if let Some(raw) = env_var("AMWM_LOGGING_JSONL_PATH") {
            self.logging.jsonl_path = PathBuf::from(raw);
        }
        set_env_u64(
            "AMWM_LOGGING_MAX_SIZE_BYTES",
            &mut self.logging.max_size_bytes,
        )?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        for (name, policy) in [
            ("default", self.wait.default),
            ("lifecycle", self.wait.lifecycle),
            ("rotation", self.wait.rotation),
            ("keyguard", self.wait.keyguard),
            ("display_off", self.wait.display_off),
        ] {
            if policy.max_attempts == 0 {
                return Err(HarnessError::InvalidConfig {
                    details: format!("wait.{name}.max_attempts must be >= 1"),
                });
            }
            if policy.interval_ms > 60_000 {
                return Err(HarnessError::InvalidConfig {
                    details: format!(
                        "wait.{name}.interval_ms must be <= 60000, got {}",
                        policy.interval_ms
                    ),
                });
            }
        }

        if self.lock.credential.is_empty()
            || !self.lock.credential.chars().all(|c| c.is_ascii_digit())
        {
            return Err(HarnessError::InvalidConfig {
                details: "lock.credential must be a non-empty PIN of ASCII digits".to_string(),
            });
        }

        if self.device.adb_path.as_os_str().is_empty() {
            return Err(HarnessError::InvalidConfig {
                details: "device.adb_path must not be empty".to_string(),
            });
        }

        if self.logging.enabled && self.logging.max_size_bytes < 1024 {
            return Err(HarnessError::InvalidConfig {
                details: format!(
                    "logging.max_size_bytes ({}) must be >= 1024",
                    self.logging.max_size_bytes
                ),
            });
        }

        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn set_env_u64(name: &str, slot: &mut u64) -> Result<()> {
    if let Some(raw) = env_var(name) {
        *slot = raw.parse::<u64>().map_err(|error| HarnessError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })?;
    }
    Ok(())
}

fn set_env_u32(name: &str, slot: &mut u32) -> Result<()> {
    if let Some(raw) = env_var(name) {
        *slot = raw.parse::<u32>().map_err(|error| HarnessError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })?;
    }
    Ok(())
}

fn set_env_bool(name: &str, slot: &mut bool) -> Result<()> {
    if let Some(raw) = env_var(name) {
        *slot = raw.parse::<bool>().map_err(|error| HarnessError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })?;
    }
    Ok(())
}
