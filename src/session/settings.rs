//! One settings key, restored on scope exit.

use std::marker::PhantomData;

use crate::command::SettingsNamespace;
use crate::core::errors::Result;
use crate::device::handle::DeviceStateHandle;
use crate::session::{finish_restore, log_acquired};

/// Conversion between a typed value and the settings provider's string.
pub trait SettingValue: Sized {
    /// `None` when `raw` is not a valid `Self`.
    fn parse_setting(raw: &str) -> Option<Self>;
    /// Spelling written with `settings put`.
    fn to_setting(&self) -> String;
}

impl SettingValue for String {
    fn parse_setting(raw: &str) -> Option<Self> {
        Some(raw.to_string())
    }

    fn to_setting(&self) -> String {
        self.clone()
    }
}

impl SettingValue for i32 {
    fn parse_setting(raw: &str) -> Option<Self> {
        raw.trim().parse().ok()
    }

    fn to_setting(&self) -> String {
        self.to_string()
    }
}

impl SettingValue for f32 {
    fn parse_setting(raw: &str) -> Option<Self> {
        raw.trim().parse().ok()
    }

    fn to_setting(&self) -> String {
        self.to_string()
    }
}

/// Settings store booleans as `0` / `1`.
impl SettingValue for bool {
    fn parse_setting(raw: &str) -> Option<Self> {
        match raw.trim() {
            "1" | "true" => Some(true),
            "0" | "false" => Some(false),
            _ => None,
        }
    }

    fn to_setting(&self) -> String {
        String::from(if *self { "1" } else { "0" })
    }
}

/// Holds one `settings` key for the lifetime of the session.
///
/// The original raw value is put back verbatim; a key that was unset is
/// deleted again.
pub struct SettingsSession<T: SettingValue> {
    device: DeviceStateHandle,
    namespace: SettingsNamespace,
    key: String,
    original: Option<String>,
    closed: bool,
    _value: PhantomData<T>,
}

impl<T: SettingValue> SettingsSession<T> {
    /// Session name used in logs.
    pub const NAME: &'static str = "settings";

    /// Capture the current value of `namespace`/`key`.
    pub fn new(device: &DeviceStateHandle, namespace: SettingsNamespace, key: &str) -> Result<Self> {
        let original = device.get_setting(namespace, key)?;
        log_acquired(
            device.log(),
            Self::NAME,
            &format!(
                "{} {key}={}",
                namespace.as_str(),
                original.as_deref().unwrap_or("<unset>")
            ),
        );
        Ok(Self {
            device: device.clone(),
            namespace,
            key: key.to_string(),
            original,
            closed: false,
            _value: PhantomData,
        })
    }

    /// Settings key under control.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Value captured at creation, if it was set and parses as `T`.
    #[must_use]
    pub fn original(&self) -> Option<T> {
        self.original.as_deref().and_then(T::parse_setting)
    }

    /// Current value on the device.
    pub fn get(&self) -> Result<Option<T>> {
        Ok(self
            .device
            .get_setting(self.namespace, &self.key)?
            .as_deref()
            .and_then(T::parse_setting))
    }

    /// Write `value` to the device.
    pub fn set(&mut self, value: &T) -> Result<()> {
        self.device
            .put_setting(self.namespace, &self.key, &value.to_setting())
    }

    /// Restore now and report the outcome.
    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        let result = self.restore();
        finish_restore(self.device.log(), Self::NAME, result, false)
    }

    fn restore(&self) -> Result<()> {
        match &self.original {
            Some(raw) => self.device.put_setting(self.namespace, &self.key, raw),
            None => self.device.delete_setting(self.namespace, &self.key),
        }
    }
}

impl<T: SettingValue> Drop for SettingsSession<T> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let result = self.restore();
        let _ = finish_restore(self.device.log(), Self::NAME, result, true);
    }
}

impl<T: SettingValue> std::fmt::Debug for SettingsSession<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsSession")
            .field("namespace", &self.namespace)
            .field("key", &self.key)
            .field("original", &self.original)
            .field("closed", &self.closed)
            .finish()
    }
}
