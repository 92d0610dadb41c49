//! Fixed-interval fallback poller
//!
//! Runs only where the gesture callback is unavailable (or when forced by
//! configuration). A tick emits an observation only when the OS value
//! differs from the store, so a steady state produces nothing.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::audio::AudioError;
use crate::events::{CandidateObservation, Source};
use crate::reconcile::Reconciler;

use super::query::{PropertyQuery, QueryError};
use super::{RegistrationError, SignalSource};

#[derive(Debug, Clone, Copy)]
pub struct PollerSettings {
    pub period: Duration,
    /// Heartbeat summary every this many ticks
    pub log_every: u64,
    pub query_timeout: Duration,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            period: Duration::from_millis(100),
            log_every: 50,
            query_timeout: Duration::from_millis(250),
        }
    }
}

/// Per-tick decision and log throttling, independent of the timer
#[derive(Debug)]
pub struct PollTick {
    log_every: u64,
    ticks: u64,
    emitted: u64,
    failures: u64,
    failing: bool,
}

impl PollTick {
    pub fn new(log_every: u64) -> Self {
        Self {
            log_every: log_every.max(1),
            ticks: 0,
            emitted: 0,
            failures: 0,
            failing: false,
        }
    }

    /// Compare one reading against the store's value
    pub fn tick(
        &mut self,
        reading: Result<bool, QueryError>,
        known: bool,
    ) -> Option<CandidateObservation> {
        self.ticks += 1;

        let observation = match reading {
            Ok(value) => {
                if self.failing {
                    debug!(failures = self.failures, "poll query recovered");
                    self.failing = false;
                }
                (value != known).then(|| {
                    self.emitted += 1;
                    CandidateObservation::new(Source::Poll, value)
                })
            }
            Err(e) => {
                self.failures += 1;
                // One warning per failure streak
                if !self.failing {
                    warn!(error = %e, "poll query failed");
                    self.failing = true;
                }
                None
            }
        };

        if self.ticks % self.log_every == 0 {
            debug!(
                ticks = self.ticks,
                emitted = self.emitted,
                failures = self.failures,
                "poller heartbeat"
            );
        }

        observation
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn emitted(&self) -> u64 {
        self.emitted
    }
}

struct PollerTask {
    stop_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

pub struct Poller {
    query: PropertyQuery,
    reconciler: Arc<Reconciler>,
    settings: PollerSettings,
    task: Option<PollerTask>,
}

impl Poller {
    pub fn new(
        query: PropertyQuery,
        reconciler: Arc<Reconciler>,
        settings: PollerSettings,
    ) -> Self {
        Self {
            query,
            reconciler,
            settings,
            task: None,
        }
    }
}

impl SignalSource for Poller {
    fn name(&self) -> &'static str {
        "poll"
    }

    fn start(&mut self) -> Result<(), RegistrationError> {
        if self.task.is_some() {
            return Ok(());
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|e| RegistrationError {
            name: self.name(),
            reason: AudioError::Worker(e.to_string()),
        })?;

        let (stop_tx, mut stop_rx) = oneshot::channel();
        let query = self.query.clone();
        let reconciler = Arc::clone(&self.reconciler);
        let settings = self.settings;

        let handle = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(settings.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut state = PollTick::new(settings.log_every);

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        // Sampled before the read so a change landing mid-query isn't undone
                        let known = reconciler.current();
                        let reading = query
                            .read_bounded(settings.query_timeout)
                            .await
                            .map(|r| r.value);
                        if let Some(observation) = state.tick(reading, known) {
                            reconciler.observe_if(known, observation);
                        }
                    }
                }
            }

            debug!(ticks = state.ticks(), emitted = state.emitted(), "poller loop exited");
        });

        info!(period_ms = settings.period.as_millis() as u64, "poller started");
        self.task = Some(PollerTask { stop_tx, handle });
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            // The loop may already have exited; either way it's done after this
            let _ = task.stop_tx.send(());
            task.handle.abort();
            info!("poller stopped");
        }
    }

    fn is_active(&self) -> bool {
        self.task.is_some()
    }
}
