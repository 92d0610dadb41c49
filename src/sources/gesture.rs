//! Hardware mute gesture source
//!
//! Lowest latency source where the OS supports it. Every callback yields
//! exactly one observation.

use std::sync::Arc;

use tracing::{debug, info};

use crate::audio::{AudioSystem, Registration};
use crate::devices::DeviceRegistry;
use crate::events::{CandidateObservation, Source};
use crate::reconcile::Reconciler;

use super::{RegistrationError, SignalSource};

pub struct GestureSource {
    system: Arc<dyn AudioSystem>,
    registry: Arc<DeviceRegistry>,
    reconciler: Arc<Reconciler>,
    registration: Option<Registration>,
}

impl GestureSource {
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

impl SignalSource for GestureSource {
    fn name(&self) -> &'static str {
        "gesture"
    }

    fn start(&mut self) -> Result<(), RegistrationError> {
        if self.registration.is_some() {
            return Ok(());
        }

        let registry = Arc::clone(&self.registry);
        let reconciler = Arc::clone(&self.reconciler);
        let handler = move |muted: bool| {
            match registry.target_device() {
                Some(device) => debug!(device = %device.name, muted, "headset mute gesture"),
                None => debug!(muted, "mute gesture with no target headset bound"),
            }
            reconciler.observe(CandidateObservation::new(Source::Gesture, muted));
        };

        let registration = self
            .system
            .on_gesture(Box::new(handler))
            .map_err(|reason| RegistrationError {
                name: self.name(),
                reason,
            })?;

        info!("gesture source registered");
        self.registration = Some(registration);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(registration) = self.registration.take() {
            registration.cancel();
            info!("gesture source stopped");
        }
    }

    fn is_active(&self) -> bool {
        self.registration.is_some()
    }
}
