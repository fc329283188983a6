//! Device-global state: the mutation handle and capability probes.

pub mod capabilities;
pub mod handle;

pub use capabilities::{Capabilities, Capability};
pub use handle::DeviceStateHandle;
