//! Merge policy for candidate observations
//!
//! No source outranks another here: the first observation carrying a new
//! value wins the transition and every later duplicate is discarded.
//! Source preference only matters at startup, where the property query
//! seeds the store before any push source is registered.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::events::{CandidateObservation, ChangeEvent};
use crate::state::{Accept, MuteStore};

use super::bus::{EventBus, Subscription};

/// Serializes accept + publish so events leave in transition order
pub struct Reconciler {
    store: Arc<MuteStore>,
    bus: EventBus,
    gate: Mutex<()>,
}

impl Reconciler {
    pub fn new(store: Arc<MuteStore>, bus: EventBus) -> Self {
        Self {
            store,
            bus,
            gate: Mutex::new(()),
        }
    }

    /// Offer one observation. Publishes before returning if it transitioned.
    pub fn observe(&self, observation: CandidateObservation) -> Accept {
        let _gate = self.gate.lock();
        self.apply(observation)
    }

    /// Offer an observation taken while the store held `expected`.
    ///
    /// Returns `None` without touching the store if another observation
    /// moved it in the meantime, since the reading may predate that change.
    pub fn observe_if(&self, expected: bool, observation: CandidateObservation) -> Option<Accept> {
        let _gate = self.gate.lock();
        if self.store.current() != expected {
            debug!(
                source = %observation.source,
                muted = observation.value,
                "store moved during read, dropping observation"
            );
            return None;
        }
        Some(self.apply(observation))
    }

    /// Caller holds the gate
    fn apply(&self, observation: CandidateObservation) -> Accept {
        let outcome = self.store.accept(observation.value);
        match outcome {
            Accept::Unchanged => {
                debug!(
                    source = %observation.source,
                    muted = observation.value,
                    "observation matches current state"
                );
            }
            Accept::Transitioned { previous, current } => {
                let event = ChangeEvent { previous, current };
                info!(
                    source = %observation.source,
                    %event,
                    age_us = observation.timestamp.elapsed().as_micros() as u64,
                    "mute state changed"
                );
                let delivered = self.bus.publish(event);
                debug!(delivered, "change event published");
            }
        }
        outcome
    }

    /// Authoritative current value
    pub fn current(&self) -> bool {
        self.store.current()
    }

    pub fn subscribe(&self) -> Subscription {
        self.bus.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.bus.subscriber_count()
    }
}
