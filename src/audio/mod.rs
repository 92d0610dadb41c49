//! Audio system seam
//!
//! Everything the daemon needs from the operating system's audio stack is
//! expressed by the [`AudioSystem`] trait: device enumeration, the input
//! mute property, and callback registration for gestures, mute changes
//! and device topology changes.
//!
//! Backends:
//! - `coreaudio`: CoreAudio HAL + AVAudioApplication (macOS)
//! - `simulated`: in-memory, used on other hosts and in tests

#[cfg(target_os = "macos")]
pub mod coreaudio;
#[cfg(any(test, not(target_os = "macos")))]
pub mod simulated;

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Opaque handle for an audio device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceId {
    /// OS-assigned object id
    Object(u32),
    /// No device (e.g. no input hardware present)
    Unknown,
}

impl DeviceId {
    pub fn is_unknown(&self) -> bool {
        matches!(self, DeviceId::Unknown)
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceId::Object(id) => write!(f, "#{}", id),
            DeviceId::Unknown => write!(f, "unknown"),
        }
    }
}

/// One audio device as reported by a single enumeration pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioDevice {
    pub id: DeviceId,
    pub name: String,
    pub vendor: String,
    /// Device exposes at least one input stream
    pub supports_input: bool,
}

impl AudioDevice {
    pub fn new(
        id: u32,
        name: impl Into<String>,
        vendor: impl Into<String>,
        supports_input: bool,
    ) -> Self {
        Self {
            id: DeviceId::Object(id),
            name: name.into(),
            vendor: vendor.into(),
            supports_input,
        }
    }
}

/// Handler invoked with the new mute value from the gesture API
pub type GestureHandler = Box<dyn Fn(bool) + Send + Sync>;

/// Handler invoked when an OS notification fires (no payload)
pub type NotifyHandler = Box<dyn Fn() + Send + Sync>;

/// Errors reported by an audio backend
#[derive(Debug, Clone, thiserror::Error)]
pub enum AudioError {
    #[error("{op} failed with OSStatus {status}")]
    Status { op: &'static str, status: i32 },

    #[error("{0} is not supported on this system")]
    Unsupported(&'static str),

    #[error("{0} did not return within the query timeout")]
    Timeout(&'static str),

    #[error("audio worker failed: {0}")]
    Worker(String),
}

/// Operating system audio capabilities used by the daemon.
///
/// Implementations are shared across the OS callback threads, the poller
/// task and the IPC handlers, so every method takes `&self`.
pub trait AudioSystem: Send + Sync {
    /// All audio devices, input-capable or not, in OS order
    fn devices(&self) -> Result<Vec<AudioDevice>, AudioError>;

    /// The default input device, `None` if the OS reports none
    fn default_input_device(&self) -> Result<Option<DeviceId>, AudioError>;

    /// Low-level input mute property read
    fn input_muted(&self) -> Result<bool, AudioError>;

    /// Apply the input mute at the OS level
    fn set_input_muted(&self, muted: bool) -> Result<(), AudioError>;

    /// Mute value as seen by the gesture-capable API, `None` if unavailable
    fn gesture_muted(&self) -> Option<bool>;

    /// Register for hardware mute gestures
    fn on_gesture(&self, handler: GestureHandler) -> Result<Registration, AudioError>;

    /// Register for the mute-changed broadcast
    fn on_mute_changed(&self, handler: NotifyHandler) -> Result<Registration, AudioError>;

    /// Register for device list / default input changes
    fn on_topology_changed(&self, handler: NotifyHandler) -> Result<Registration, AudioError>;
}

/// Backend for the current host
#[cfg(target_os = "macos")]
pub fn system_backend() -> Arc<dyn AudioSystem> {
    Arc::new(coreaudio::CoreAudioSystem::new())
}

/// Backend for the current host
#[cfg(not(target_os = "macos"))]
pub fn system_backend() -> Arc<dyn AudioSystem> {
    Arc::new(simulated::SimulatedAudio::with_builtin_mic())
}

/// Guard for an OS callback registration.
///
/// Unregisters exactly once, either on [`Registration::cancel`] or on drop.
pub struct Registration {
    label: &'static str,
    release: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Registration {
    pub fn new(label: &'static str, release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            label,
            release: Mutex::new(Some(Box::new(release))),
        }
    }

    /// Unregister the callback. Calling this again is a no-op.
    pub fn cancel(&self) {
        if let Some(release) = self.release.lock().take() {
            tracing::debug!(registration = self.label, "unregistering OS callback");
            release();
        }
    }

    pub fn is_active(&self) -> bool {
        self.release.lock().is_some()
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("label", &self.label)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_registration_releases_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let reg = Registration::new("test", move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(reg.is_active());
        reg.cancel();
        reg.cancel();
        drop(reg);

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_registration_releases_on_drop() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        {
            let _reg = Registration::new("test", move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_device_id_display() {
        assert_eq!(DeviceId::Object(73).to_string(), "#73");
        assert!(DeviceId::Unknown.is_unknown());
    }
}
