//! Control surface for presentation collaborators
//!
//! `toggle`, `set` and `query` are the only ways the menu bar (via IPC)
//! touches the mute state. Requests are applied at the OS level first and
//! then go through the same reconciler as hardware observations, so
//! subscribers can't tell a menu click from a stem press.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::audio::{AudioError, AudioSystem};
use crate::events::{CandidateObservation, Source};
use crate::reconcile::Reconciler;
use crate::state::Accept;

/// Errors surfaced to control surface callers
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    /// The OS refused or failed to apply the requested mute value
    #[error("failed to apply input mute = {requested}: {reason}")]
    SetFailure {
        requested: bool,
        #[source]
        reason: AudioError,
    },
}

pub struct ControlSurface {
    system: Arc<dyn AudioSystem>,
    reconciler: Arc<Reconciler>,
    /// Keeps toggle's read-negate-apply sequence from interleaving
    op_lock: Mutex<()>,
}

impl ControlSurface {
    pub fn new(system: Arc<dyn AudioSystem>, reconciler: Arc<Reconciler>) -> Self {
        Self {
            system,
            reconciler,
            op_lock: Mutex::new(()),
        }
    }

    /// Current authoritative value
    pub fn query(&self) -> bool {
        self.reconciler.current()
    }

    /// Flip the mute state. Returns the new value.
    pub fn toggle(&self) -> Result<bool, ControlError> {
        let _op = self.op_lock.lock();
        let target = !self.reconciler.current();
        self.apply(target)?;
        Ok(target)
    }

    /// Set an explicit value. Setting the current value emits nothing.
    pub fn set(&self, muted: bool) -> Result<Accept, ControlError> {
        let _op = self.op_lock.lock();
        self.apply(muted)
    }

    fn apply(&self, muted: bool) -> Result<Accept, ControlError> {
        if let Err(reason) = self.system.set_input_muted(muted) {
            warn!(error = %reason, muted, "OS rejected mute request");
            return Err(ControlError::SetFailure {
                requested: muted,
                reason,
            });
        }

        let outcome = self
            .reconciler
            .observe(CandidateObservation::new(Source::ControlSurface, muted));
        info!(muted, ?outcome, "mute request applied");
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::simulated::SimulatedAudio;
    use crate::reconcile::EventBus;
    use crate::sources::{NotificationSource, SignalSource};
    use crate::state::MuteStore;

    fn setup(sim: &SimulatedAudio, initial: bool) -> (ControlSurface, Arc<Reconciler>) {
        let reconciler = Arc::new(Reconciler::new(
            Arc::new(MuteStore::new(initial)),
            EventBus::new(),
        ));
        let control = ControlSurface::new(Arc::new(sim.clone()), Arc::clone(&reconciler));
        (control, reconciler)
    }

    #[test]
    fn test_toggle_twice_restores_state() {
        let sim = SimulatedAudio::with_builtin_mic();
        let (control, reconciler) = setup(&sim, false);
        let mut sub = reconciler.subscribe();

        assert!(control.toggle().unwrap());
        assert!(!control.toggle().unwrap());

        assert!(!control.query());
        assert_eq!(sub.drain().len(), 2);
    }

    #[test]
    fn test_toggle_with_notification_echo_emits_once_per_change() {
        let sim = SimulatedAudio::with_builtin_mic();
        let (control, reconciler) = setup(&sim, false);
        let mut notifications =
            NotificationSource::new(Arc::new(sim.clone()), Arc::clone(&reconciler));
        notifications.start().unwrap();
        let mut sub = reconciler.subscribe();

        control.toggle().unwrap();
        control.toggle().unwrap();

        let currents: Vec<bool> = sub.drain().into_iter().map(|e| e.current).collect();
        assert_eq!(currents, vec![true, false]);
    }

    #[test]
    fn test_set_failure_leaves_state() {
        let sim = SimulatedAudio::with_builtin_mic();
        let (control, reconciler) = setup(&sim, false);
        let mut sub = reconciler.subscribe();
        sim.fail_sets(true);

        let err = control.set(true).unwrap_err();
        assert!(matches!(err, ControlError::SetFailure { requested: true, .. }));
        assert!(control.toggle().is_err());

        assert!(!control.query());
        assert!(sub.drain().is_empty());
    }

    #[test]
    fn test_set_current_value_is_unchanged() {
        let sim = SimulatedAudio::with_builtin_mic();
        let (control, reconciler) = setup(&sim, false);
        let mut sub = reconciler.subscribe();

        assert_eq!(control.set(false).unwrap(), Accept::Unchanged);
        assert!(sub.drain().is_empty());
    }

    #[test]
    fn test_set_applies_to_os() {
        let sim = SimulatedAudio::with_builtin_mic();
        let (control, _) = setup(&sim, false);

        control.set(true).unwrap();
        assert!(sim.input_muted().unwrap());
    }
}
