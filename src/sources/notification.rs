//! Mute-changed broadcast source
//!
//! Backstop for a gesture registration that silently fails. The broadcast
//! carries no trusted payload, so each firing re-reads the value.

use std::sync::Arc;

use tracing::{info, warn};

use crate::audio::{AudioSystem, Registration};
use crate::events::{CandidateObservation, Source};
use crate::reconcile::Reconciler;

use super::query::PropertyQuery;
use super::{RegistrationError, SignalSource};

pub struct NotificationSource {
    system: Arc<dyn AudioSystem>,
    query: PropertyQuery,
    reconciler: Arc<Reconciler>,
    registration: Option<Registration>,
}

impl NotificationSource {
    pub fn new(system: Arc<dyn AudioSystem>, reconciler: Arc<Reconciler>) -> Self {
        Self {
            query: PropertyQuery::new(Arc::clone(&system)),
            system,
            reconciler,
            registration: None,
        }
    }
}

impl SignalSource for NotificationSource {
    fn name(&self) -> &'static str {
        "notification"
    }

    fn start(&mut self) -> Result<(), RegistrationError> {
        if self.registration.is_some() {
            return Ok(());
        }

        let query = self.query.clone();
        let reconciler = Arc::clone(&self.reconciler);
        let handler = move || match query.read_cross_checked() {
            Ok(reading) => {
                let observation = CandidateObservation::new(Source::Notification, reading.value);
                reconciler.observe(observation);
            }
            Err(e) => warn!(error = %e, "mute notification re-read failed"),
        };

        let registration = self
            .system
            .on_mute_changed(Box::new(handler))
            .map_err(|reason| RegistrationError {
                name: self.name(),
                reason,
            })?;

        info!("notification source registered");
        self.registration = Some(registration);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(registration) = self.registration.take() {
            registration.cancel();
            info!("notification source stopped");
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
    use crate::reconcile::EventBus;
    use crate::state::MuteStore;

    fn setup(sim: &SimulatedAudio) -> (NotificationSource, Arc<Reconciler>) {
        let reconciler = Arc::new(Reconciler::new(
            Arc::new(MuteStore::new(false)),
            EventBus::new(),
        ));
        let source = NotificationSource::new(Arc::new(sim.clone()), Arc::clone(&reconciler));
        (source, reconciler)
    }

    #[test]
    fn test_notification_rereads_value() {
        let sim = SimulatedAudio::with_builtin_mic();
        let (mut source, reconciler) = setup(&sim);
        let mut sub = reconciler.subscribe();
        source.start().unwrap();

        sim.change_hardware_mute(true);
        sim.change_hardware_mute(true);

        assert!(reconciler.current());
        assert_eq!(sub.drain().len(), 1);
    }

    #[test]
    fn test_failed_reread_is_swallowed() {
        let sim = SimulatedAudio::with_builtin_mic();
        let (mut source, reconciler) = setup(&sim);
        let mut sub = reconciler.subscribe();
        source.start().unwrap();

        sim.fail_queries(true);
        sim.change_hardware_mute(true);

        assert!(!reconciler.current());
        assert!(sub.drain().is_empty());
    }
}
