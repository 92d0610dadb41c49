//! Device snapshot and target binding

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::audio::{AudioDevice, AudioError, AudioSystem, DeviceId};

use super::matcher::TargetMatcher;

/// The OS device list could not be read
#[derive(Debug, thiserror::Error)]
#[error("audio device enumeration failed: {0}")]
pub struct EnumerationError(#[from] pub AudioError);

/// Which device is the default input, and which one is the target headset.
///
/// `matched_device_id`, when present, names an input-capable device that
/// passed the target heuristic in the same enumeration pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetDeviceBinding {
    pub current_input_device_id: DeviceId,
    pub matched_device_id: Option<DeviceId>,
}

impl Default for TargetDeviceBinding {
    fn default() -> Self {
        Self {
            current_input_device_id: DeviceId::Unknown,
            matched_device_id: None,
        }
    }
}

#[derive(Debug, Default)]
struct Snapshot {
    devices: Vec<AudioDevice>,
    binding: TargetDeviceBinding,
}

/// Tracks the device list and the target headset binding
pub struct DeviceRegistry {
    system: Arc<dyn AudioSystem>,
    matcher: TargetMatcher,
    snapshot: RwLock<Snapshot>,
}

impl DeviceRegistry {
    pub fn new(system: Arc<dyn AudioSystem>, matcher: TargetMatcher) -> Self {
        Self {
            system,
            matcher,
            snapshot: RwLock::new(Snapshot::default()),
        }
    }

    /// All devices, unfiltered, in OS order
    pub fn enumerate(&self) -> Result<Vec<AudioDevice>, EnumerationError> {
        Ok(self.system.devices()?)
    }

    /// Default input device, [`DeviceId::Unknown`] if there is none
    pub fn current_input_device(&self) -> Result<DeviceId, EnumerationError> {
        Ok(self.system.default_input_device()?.unwrap_or(DeviceId::Unknown))
    }

    /// Apply the target heuristic against the current default input
    pub fn match_target_device(&self, devices: &[AudioDevice]) -> Option<DeviceId> {
        let current = self.current_input_device().unwrap_or_else(|e| {
            debug!(error = %e, "default input unavailable for matching");
            DeviceId::Unknown
        });
        self.matcher.match_target(devices, current)
    }

    /// Re-enumerate and replace the snapshot in one step.
    ///
    /// On failure the previous snapshot stays in place.
    pub fn refresh(&self) -> Result<TargetDeviceBinding, EnumerationError> {
        let result = self
            .enumerate()
            .and_then(|devices| Ok((self.current_input_device()?, devices)));

        let (current_input, devices) = match result {
            Ok(found) => found,
            Err(e) => {
                warn!(error = %e, "keeping previous device list");
                return Err(e);
            }
        };

        let binding = TargetDeviceBinding {
            current_input_device_id: current_input,
            matched_device_id: self.matcher.match_target(&devices, current_input),
        };

        let mut snapshot = self.snapshot.write();
        if snapshot.binding != binding {
            let target = binding
                .matched_device_id
                .and_then(|id| devices.iter().find(|d| d.id == id))
                .map(|d| d.name.as_str());
            info!(
                input = %binding.current_input_device_id,
                target = target.unwrap_or("none"),
                "device binding updated"
            );
        }
        debug!(count = devices.len(), "device list refreshed");
        *snapshot = Snapshot { devices, binding };

        Ok(binding)
    }

    pub fn devices(&self) -> Vec<AudioDevice> {
        self.snapshot.read().devices.clone()
    }

    pub fn binding(&self) -> TargetDeviceBinding {
        self.snapshot.read().binding
    }

    /// The bound target headset, if one is attached
    pub fn target_device(&self) -> Option<AudioDevice> {
        let snapshot = self.snapshot.read();
        let id = snapshot.binding.matched_device_id?;
        snapshot.devices.iter().find(|d| d.id == id).cloned()
    }

    /// True if the target headset is the current default input
    pub fn target_is_input(&self) -> bool {
        let binding = self.binding();
        binding.matched_device_id == Some(binding.current_input_device_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::simulated::SimulatedAudio;

    fn airpods_system() -> SimulatedAudio {
        let sim = SimulatedAudio::new();
        sim.replace_devices(
            vec![
                AudioDevice::new(1, "MacBook Pro Microphone", "Apple Inc.", true),
                AudioDevice::new(2, "MacBook Pro Speakers", "Apple Inc.", false),
                AudioDevice::new(3, "AirPods Pro", "Apple Inc.", true),
            ],
            Some(DeviceId::Object(3)),
        );
        sim
    }

    #[test]
    fn test_refresh_binds_target() {
        let sim = airpods_system();
        let registry = DeviceRegistry::new(Arc::new(sim), TargetMatcher::default());

        let binding = registry.refresh().unwrap();
        assert_eq!(binding.current_input_device_id, DeviceId::Object(3));
        assert_eq!(binding.matched_device_id, Some(DeviceId::Object(3)));
        assert!(registry.target_is_input());
        assert_eq!(registry.target_device().unwrap().name, "AirPods Pro");
        // Enumeration is unfiltered
        assert_eq!(registry.devices().len(), 3);
    }

    #[test]
    fn test_failed_enumeration_keeps_previous_snapshot() {
        let sim = airpods_system();
        let registry = DeviceRegistry::new(Arc::new(sim.clone()), TargetMatcher::default());
        let before = registry.refresh().unwrap();

        sim.fail_enumeration(true);
        assert!(registry.refresh().is_err());

        assert_eq!(registry.binding(), before);
        assert_eq!(registry.devices().len(), 3);
    }

    #[test]
    fn test_no_default_input_is_unknown() {
        let sim = SimulatedAudio::new();
        let registry = DeviceRegistry::new(Arc::new(sim), TargetMatcher::default());

        assert_eq!(registry.current_input_device().unwrap(), DeviceId::Unknown);
        let binding = registry.refresh().unwrap();
        assert_eq!(binding, TargetDeviceBinding::default());
        assert!(registry.target_device().is_none());
    }

    #[test]
    fn test_headset_removed_clears_binding() {
        let sim = airpods_system();
        let registry = DeviceRegistry::new(Arc::new(sim.clone()), TargetMatcher::default());
        registry.refresh().unwrap();

        sim.replace_devices(
            vec![AudioDevice::new(1, "MacBook Pro Microphone", "Apple Inc.", true)],
            Some(DeviceId::Object(1)),
        );
        let binding = registry.refresh().unwrap();

        assert_eq!(binding.matched_device_id, None);
        assert!(!registry.target_is_input());
    }

    #[test]
    fn test_match_target_device_uses_live_default_input() {
        let sim = airpods_system();
        let registry = DeviceRegistry::new(Arc::new(sim.clone()), TargetMatcher::default());
        let devices = registry.enumerate().unwrap();

        assert_eq!(registry.match_target_device(&devices), Some(DeviceId::Object(3)));

        // Match still succeeds by enumeration when the headset isn't the input
        sim.replace_devices(devices.clone(), Some(DeviceId::Object(1)));
        assert_eq!(registry.match_target_device(&devices), Some(DeviceId::Object(3)));
    }
}
