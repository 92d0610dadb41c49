//! Device topology source
//!
//! On every device list or default input change: rebuild the registry
//! snapshot, then run the cross-checked read through the reconciler.

use std::sync::Arc;

use tracing::{info, warn};

use crate::audio::{AudioSystem, Registration};
use crate::devices::DeviceRegistry;
use crate::events::CandidateObservation;
use crate::reconcile::Reconciler;

use super::query::PropertyQuery;
use super::{RegistrationError, SignalSource};

pub struct TopologySource {
    system: Arc<dyn AudioSystem>,
    registry: Arc<DeviceRegistry>,
    reconciler: Arc<Reconciler>,
    registration: Option<Registration>,
}

impl TopologySource {
    pub fn new(
        system: Arc<dyn AudioSystem>,
        registry: Arc<DeviceRegistry>,
        reconciler: Arc<Reconciler>,
    ) -> Self {
        Self {
            system,
            registry,
            reconciler,
            registration: None,
        }
    }
}

/// Refresh the registry and feed a cross-checked reading
pub(crate) fn resync(registry: &DeviceRegistry, query: &PropertyQuery, reconciler: &Reconciler) {
    // A failed enumeration keeps the old snapshot; the mute read still runs
    let _ = registry.refresh();

    match query.read_cross_checked() {
        Ok(reading) => {
            reconciler.observe(CandidateObservation::new(reading.source, reading.value));
        }
        Err(e) => warn!(error = %e, "mute re-read after device change failed"),
    }
}

impl SignalSource for TopologySource {
    fn name(&self) -> &'static str {
        "topology"
    }

    fn start(&mut self) -> Result<(), RegistrationError> {
        if self.registration.is_some() {
            return Ok(());
        }

        let registry = Arc::clone(&self.registry);
        let reconciler = Arc::clone(&self.reconciler);
        let query = PropertyQuery::new(Arc::clone(&self.system));
        let handler = move || resync(&registry, &query, &reconciler);

        let registration = self
            .system
            .on_topology_changed(Box::new(handler))
            .map_err(|reason| RegistrationError {
                name: self.name(),
                reason,
            })?;

        info!("topology source registered");
        self.registration = Some(registration);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(registration) = self.registration.take() {
            registration.cancel();
            info!("topology source stopped");
        }
    }

    fn is_active(&self) -> bool {
        self.registration.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::simulated::SimulatedAudio;
    use crate::audio::{AudioDevice, DeviceId};
    use crate::devices::TargetMatcher;
    use crate::reconcile::EventBus;
    use crate::state::MuteStore;

    #[test]
    fn test_device_change_rebinds_and_cross_checks() {
        let sim = SimulatedAudio::with_builtin_mic().with_gesture_api(false);
        let system: Arc<dyn AudioSystem> = Arc::new(sim.clone());
        let registry = Arc::new(DeviceRegistry::new(
            Arc::clone(&system),
            TargetMatcher::default(),
        ));
        let reconciler = Arc::new(Reconciler::new(
            Arc::new(MuteStore::new(false)),
            EventBus::new(),
        ));
        let mut sub = reconciler.subscribe();
        let mut source =
            TopologySource::new(system, Arc::clone(&registry), Arc::clone(&reconciler));
        source.start().unwrap();

        // AirPods connect; the property still lags behind the gesture API
        sim.set_gesture_api_muted(Some(true));
        sim.replace_devices(
            vec![
                AudioDevice::new(1, "Built-in Microphone", "Generic", true),
                AudioDevice::new(7, "AirPods Pro", "Apple Inc.", true),
            ],
            Some(DeviceId::Object(7)),
        );

        assert_eq!(registry.binding().matched_device_id, Some(DeviceId::Object(7)));
        assert!(reconciler.current());
        assert_eq!(sub.drain().len(), 1);

        source.stop();
        assert_eq!(sim.registered_handlers(), 0);
    }
}
