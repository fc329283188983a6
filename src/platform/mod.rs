//! Platform abstraction: how shell commands reach the device.

pub mod pal;
