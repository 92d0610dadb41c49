//! Mute service
//!
//! Explicitly owned instance that builds the store, reconciler, registry
//! and control surface, seeds the state from a cross-checked read, and
//! runs the signal sources for the lifetime of the daemon.

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::audio::AudioSystem;
use crate::control::ControlSurface;
use crate::devices::{DeviceRegistry, TargetMatcher};
use crate::reconcile::{EventBus, Reconciler, Subscription};
use crate::sources::{
    GestureSource, NotificationSource, Poller, PollerSettings, PropertyQuery, SignalSource,
    TopologySource,
};
use crate::state::MuteStore;

/// Knobs the service needs from the configuration
#[derive(Debug, Clone, Default)]
pub struct ServiceSettings {
    pub matcher: TargetMatcher,
    pub poller: PollerSettings,
    /// Run the poller even when the gesture source registered
    pub always_poll: bool,
}

/// Point-in-time view for status requests
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceStatus {
    pub muted: bool,
    pub gesture_active: bool,
    pub polling: bool,
    pub target_device: Option<String>,
    /// The target headset is the current default input
    pub target_is_input: bool,
    pub uptime_secs: u64,
}

pub struct MuteService {
    system: Arc<dyn AudioSystem>,
    query: PropertyQuery,
    registry: Arc<DeviceRegistry>,
    reconciler: Arc<Reconciler>,
    control: Arc<ControlSurface>,
    settings: ServiceSettings,
    /// Active sources, in start order
    sources: Mutex<Vec<Box<dyn SignalSource>>>,
    started_at: Instant,
}

impl MuteService {
    /// Build the service and seed the store. No OS callbacks are registered yet.
    pub fn new(system: Arc<dyn AudioSystem>, settings: ServiceSettings) -> Self {
        let registry = Arc::new(DeviceRegistry::new(
            Arc::clone(&system),
            settings.matcher.clone(),
        ));
        if let Err(e) = registry.refresh() {
            warn!(error = %e, "starting without a device list");
        }

        let query = PropertyQuery::new(Arc::clone(&system));
        let initial = match query.read_cross_checked() {
            Ok(reading) => {
                info!(muted = reading.value, source = %reading.source, "initial mute state");
                reading.value
            }
            Err(e) => {
                warn!(error = %e, "initial mute read failed, assuming unmuted");
                false
            }
        };

        let reconciler = Arc::new(Reconciler::new(
            Arc::new(MuteStore::new(initial)),
            EventBus::new(),
        ));
        let control = Arc::new(ControlSurface::new(
            Arc::clone(&system),
            Arc::clone(&reconciler),
        ));

        Self {
            system,
            query,
            registry,
            reconciler,
            control,
            settings,
            sources: Mutex::new(Vec::new()),
            started_at: Instant::now(),
        }
    }

    /// Register the signal sources.
    ///
    /// Topology and notification come first, then the gesture handler.
    /// The poller only runs if the gesture handler or the notification
    /// listener can't register (or `always_poll` is set). Must be called
    /// inside the tokio runtime.
    pub fn start(&self) {
        let mut sources = self.sources.lock();
        if !sources.is_empty() {
            return;
        }

        Self::start_source(
            &mut sources,
            Box::new(TopologySource::new(
                Arc::clone(&self.system),
                Arc::clone(&self.registry),
                Arc::clone(&self.reconciler),
            )),
        );
        let notification = Self::start_source(
            &mut sources,
            Box::new(NotificationSource::new(
                Arc::clone(&self.system),
                Arc::clone(&self.reconciler),
            )),
        );
        let gesture = Self::start_source(
            &mut sources,
            Box::new(GestureSource::new(
                Arc::clone(&self.system),
                Arc::clone(&self.registry),
                Arc::clone(&self.reconciler),
            )),
        );

        if !gesture || !notification || self.settings.always_poll {
            if !gesture || !notification {
                info!(gesture, notification, "push source unavailable, falling back to poller");
            }
            let poller = Poller::new(
                self.query.clone(),
                Arc::clone(&self.reconciler),
                self.settings.poller,
            );
            if !Self::start_source(&mut sources, Box::new(poller)) {
                error!("no polling fallback; changes from other origins may be missed");
            }
        }

        let names: Vec<_> = sources.iter().map(|s| s.name()).collect();
        info!(sources = ?names, "signal sources started");
    }

    fn start_source(
        sources: &mut Vec<Box<dyn SignalSource>>,
        mut source: Box<dyn SignalSource>,
    ) -> bool {
        match source.start() {
            Ok(()) => {
                sources.push(source);
                true
            }
            Err(e) => {
                // Logged once; registration is not retried
                warn!(error = %e, "signal source not registered");
                false
            }
        }
    }

    /// Unregister every source, newest first. Safe to call more than once.
    pub fn shutdown(&self) {
        let mut sources = self.sources.lock();
        while let Some(mut source) = sources.pop() {
            source.stop();
        }
        debug!("all signal sources stopped");
    }

    pub fn control(&self) -> &Arc<ControlSurface> {
        &self.control
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    pub fn subscribe(&self) -> Subscription {
        self.reconciler.subscribe()
    }

    pub fn muted(&self) -> bool {
        self.reconciler.current()
    }

    fn source_active(&self, name: &str) -> bool {
        self.sources
            .lock()
            .iter()
            .any(|s| s.name() == name && s.is_active())
    }

    pub fn status(&self) -> ServiceStatus {
        ServiceStatus {
            muted: self.muted(),
            gesture_active: self.source_active("gesture"),
            polling: self.source_active("poll"),
            target_device: self.registry.target_device().map(|d| d.name),
            target_is_input: self.registry.target_is_input(),
            uptime_secs: self.started_at.elapsed().as_secs(),
        }
    }

    /// Human-readable summary of every view of the mute state
    pub fn diagnostics(&self) -> String {
        let mut out = String::from("Mute state diagnostics:\n");
        let property = match self.query.read() {
            Ok(muted) => muted.to_string(),
            Err(e) => format!("error ({})", e),
        };
        let gesture = match self.system.gesture_muted() {
            Some(muted) => muted.to_string(),
            None => "unavailable".to_string(),
        };
        let names: Vec<_> = self.sources.lock().iter().map(|s| s.name()).collect();
        let binding = self.registry.binding();

        let _ = writeln!(out, "  property query: {}", property);
        let _ = writeln!(out, "  gesture API: {}", gesture);
        let _ = writeln!(out, "  store: {}", self.muted());
        let _ = writeln!(out, "  sources: {}", names.join(", "));
        let _ = writeln!(out, "  subscribers: {}", self.reconciler.subscriber_count());
        let _ = write!(
            out,
            "  input device: {}, target: {}",
            binding.current_input_device_id,
            binding
                .matched_device_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "none".to_string())
        );
        out
    }
}

impl Drop for MuteService {
    fn drop(&mut self) {
        self.shutdown();
    }
}
