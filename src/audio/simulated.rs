//! In-memory audio backend
//!
//! Stands in for CoreAudio on hosts that don't have it and drives every
//! test. Failures and OS callbacks are injected explicitly.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::{
    AudioDevice, AudioError, AudioSystem, DeviceId, GestureHandler, NotifyHandler, Registration,
};

#[derive(Debug)]
struct SimState {
    devices: Vec<AudioDevice>,
    default_input: Option<DeviceId>,
    property_muted: bool,
    /// `None` when the gesture-capable API is unavailable
    gesture_muted: Option<bool>,
    fail_enumeration: bool,
    fail_queries: bool,
    fail_sets: bool,
    fail_mute_listener: bool,
    /// Property reads return the value sampled this long ago
    read_delay: Option<Duration>,
}

#[derive(Default)]
struct Handlers {
    next_id: u64,
    gesture: Vec<(u64, Arc<dyn Fn(bool) + Send + Sync>)>,
    mute: Vec<(u64, Arc<dyn Fn() + Send + Sync>)>,
    topology: Vec<(u64, Arc<dyn Fn() + Send + Sync>)>,
}

#[derive(Clone, Copy)]
enum Kind {
    Gesture,
    Mute,
    Topology,
}

struct Inner {
    state: Mutex<SimState>,
    handlers: Mutex<Handlers>,
}

/// Simulated audio stack with injectable OS behaviour
#[derive(Clone)]
pub struct SimulatedAudio {
    inner: Arc<Inner>,
}

impl SimulatedAudio {
    /// Empty system: no devices, unmuted, gesture API unavailable
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(SimState {
                    devices: Vec::new(),
                    default_input: None,
                    property_muted: false,
                    gesture_muted: None,
                    fail_enumeration: false,
                    fail_queries: false,
                    fail_sets: false,
                    fail_mute_listener: false,
                    read_delay: None,
                }),
                handlers: Mutex::new(Handlers::default()),
            }),
        }
    }

    /// A single built-in microphone as the default input
    pub fn with_builtin_mic() -> Self {
        let sim = Self::new();
        {
            let mut state = sim.inner.state.lock();
            state.devices = vec![AudioDevice::new(1, "Built-in Microphone", "Generic", true)];
            state.default_input = Some(DeviceId::Object(1));
        }
        sim
    }

    /// Enable the gesture-capable API with the given initial value
    pub fn with_gesture_api(self, muted: bool) -> Self {
        self.inner.state.lock().gesture_muted = Some(muted);
        self
    }

    /// Change the low-level property without firing anything
    pub fn set_property_muted(&self, muted: bool) {
        self.inner.state.lock().property_muted = muted;
    }

    /// Change the gesture API's view without firing anything
    pub fn set_gesture_api_muted(&self, muted: Option<bool>) {
        self.inner.state.lock().gesture_muted = muted;
    }

    pub fn fail_enumeration(&self, fail: bool) {
        self.inner.state.lock().fail_enumeration = fail;
    }

    pub fn fail_queries(&self, fail: bool) {
        self.inner.state.lock().fail_queries = fail;
    }

    pub fn fail_sets(&self, fail: bool) {
        self.inner.state.lock().fail_sets = fail;
    }

    /// Refuse mute-changed listener registration
    pub fn fail_mute_listener(&self, fail: bool) {
        self.inner.state.lock().fail_mute_listener = fail;
    }

    /// Make property reads slow, like a busy audio server
    pub fn set_read_delay(&self, delay: Option<Duration>) {
        self.inner.state.lock().read_delay = delay;
    }

    /// Simulate a stem press: both views change and gesture handlers fire
    pub fn press_gesture(&self, muted: bool) {
        {
            let mut state = self.inner.state.lock();
            state.property_muted = muted;
            state.gesture_muted = Some(muted);
        }
        let handlers: Vec<_> = self
            .inner
            .handlers
            .lock()
            .gesture
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect();
        for handler in handlers {
            handler(muted);
        }
    }

    /// Mute changed from some other origin; fires the broadcast
    pub fn change_hardware_mute(&self, muted: bool) {
        {
            let mut state = self.inner.state.lock();
            state.property_muted = muted;
            if state.gesture_muted.is_some() {
                state.gesture_muted = Some(muted);
            }
        }
        self.fire(Kind::Mute);
    }

    /// Replace the device list and default input, then fire topology handlers
    pub fn replace_devices(&self, devices: Vec<AudioDevice>, default_input: Option<DeviceId>) {
        {
            let mut state = self.inner.state.lock();
            state.devices = devices;
            state.default_input = default_input;
        }
        self.fire(Kind::Topology);
    }

    /// Number of live registrations, across all kinds
    pub fn registered_handlers(&self) -> usize {
        let handlers = self.inner.handlers.lock();
        handlers.gesture.len() + handlers.mute.len() + handlers.topology.len()
    }

    fn fire(&self, kind: Kind) {
        // Handlers call back into the system, so never hold a lock while they run
        let handlers: Vec<_> = {
            let handlers = self.inner.handlers.lock();
            let list = match kind {
                Kind::Mute => &handlers.mute,
                Kind::Topology => &handlers.topology,
                Kind::Gesture => return,
            };
            list.iter().map(|(_, h)| Arc::clone(h)).collect()
        };
        for handler in handlers {
            handler();
        }
    }

    fn registration(&self, kind: Kind, id: u64, label: &'static str) -> Registration {
        let inner = Arc::downgrade(&self.inner);
        Registration::new(label, move || {
            if let Some(inner) = inner.upgrade() {
                let mut handlers = inner.handlers.lock();
                match kind {
                    Kind::Gesture => handlers.gesture.retain(|(i, _)| *i != id),
                    Kind::Mute => handlers.mute.retain(|(i, _)| *i != id),
                    Kind::Topology => handlers.topology.retain(|(i, _)| *i != id),
                }
            }
        })
    }

    fn add_notify(&self, kind: Kind, handler: NotifyHandler) -> u64 {
        let mut handlers = self.inner.handlers.lock();
        handlers.next_id += 1;
        let id = handlers.next_id;
        let handler: Arc<dyn Fn() + Send + Sync> = Arc::from(handler);
        match kind {
            Kind::Mute => handlers.mute.push((id, handler)),
            Kind::Topology => handlers.topology.push((id, handler)),
            Kind::Gesture => {}
        }
        id
    }
}

impl Default for SimulatedAudio {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioSystem for SimulatedAudio {
    fn devices(&self) -> Result<Vec<AudioDevice>, AudioError> {
        let state = self.inner.state.lock();
        if state.fail_enumeration {
            return Err(AudioError::Status {
                op: "enumerate devices",
                status: -50,
            });
        }
        Ok(state.devices.clone())
    }

    fn default_input_device(&self) -> Result<Option<DeviceId>, AudioError> {
        let state = self.inner.state.lock();
        if state.fail_enumeration {
            return Err(AudioError::Status {
                op: "default input device",
                status: -50,
            });
        }
        Ok(state.default_input)
    }

    fn input_muted(&self) -> Result<bool, AudioError> {
        let (muted, delay) = {
            let state = self.inner.state.lock();
            if state.fail_queries {
                return Err(AudioError::Status {
                    op: "read input mute",
                    status: -50,
                });
            }
            (state.property_muted, state.read_delay)
        };
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        Ok(muted)
    }

    fn set_input_muted(&self, muted: bool) -> Result<(), AudioError> {
        {
            let mut state = self.inner.state.lock();
            if state.fail_sets {
                return Err(AudioError::Status {
                    op: "set input mute",
                    status: -50,
                });
            }
            state.property_muted = muted;
            if state.gesture_muted.is_some() {
                state.gesture_muted = Some(muted);
            }
        }
        // The OS broadcasts every mute change regardless of origin
        self.fire(Kind::Mute);
        Ok(())
    }

    fn gesture_muted(&self) -> Option<bool> {
        self.inner.state.lock().gesture_muted
    }

    fn on_gesture(&self, handler: GestureHandler) -> Result<Registration, AudioError> {
        if self.inner.state.lock().gesture_muted.is_none() {
            return Err(AudioError::Unsupported("input mute gesture handler"));
        }
        let id = {
            let mut handlers = self.inner.handlers.lock();
            handlers.next_id += 1;
            let id = handlers.next_id;
            handlers.gesture.push((id, Arc::from(handler)));
            id
        };
        Ok(self.registration(Kind::Gesture, id, "gesture"))
    }

    fn on_mute_changed(&self, handler: NotifyHandler) -> Result<Registration, AudioError> {
        if self.inner.state.lock().fail_mute_listener {
            return Err(AudioError::Status {
                op: "add mute listener",
                status: -50,
            });
        }
        let id = self.add_notify(Kind::Mute, handler);
        Ok(self.registration(Kind::Mute, id, "mute_changed"))
    }

    fn on_topology_changed(&self, handler: NotifyHandler) -> Result<Registration, AudioError> {
        let id = self.add_notify(Kind::Topology, handler);
        Ok(self.registration(Kind::Topology, id, "topology"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_gesture_unsupported_without_api() {
        let sim = SimulatedAudio::with_builtin_mic();
        assert!(matches!(
            sim.on_gesture(Box::new(|_| {})),
            Err(AudioError::Unsupported(_))
        ));
    }

    #[test]
    fn test_dropped_registration_stops_callbacks() {
        let sim = SimulatedAudio::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let reg = sim
            .on_mute_changed(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();

        sim.change_hardware_mute(true);
        drop(reg);
        sim.change_hardware_mute(false);

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(sim.registered_handlers(), 0);
    }

    #[test]
    fn test_failed_set_leaves_property() {
        let sim = SimulatedAudio::new();
        sim.fail_sets(true);
        assert!(sim.set_input_muted(true).is_err());
        assert!(!sim.input_muted().unwrap());
    }
}
