//! Device registry module
//!
//! Enumerates audio devices, identifies the target wireless headset and
//! tracks the current default input device. Snapshots are always
//! recomputed in full, never patched.

mod matcher;
mod registry;

pub use matcher::TargetMatcher;
pub use registry::{DeviceRegistry, EnumerationError, TargetDeviceBinding};
