//! Signal sources
//!
//! Independent producers of candidate mute observations. Push sources
//! (gesture, notification, poller, topology) feed the reconciler directly
//! from whatever context the OS or the runtime calls them on. The property
//! query is pull-only.
//!
//! OS failures inside a running source are logged and swallowed; the next
//! event or tick retries.

mod gesture;
mod notification;
mod poller;
mod query;
mod topology;

pub use gesture::GestureSource;
pub use notification::NotificationSource;
pub use poller::{Poller, PollerSettings};
pub use query::{PropertyQuery, QueryError, Reading};
pub use topology::TopologySource;

use crate::audio::AudioError;

/// A source could not subscribe to its OS capability
#[derive(Debug, thiserror::Error)]
#[error("failed to register {name} source: {reason}")]
pub struct RegistrationError {
    pub name: &'static str,
    #[source]
    pub reason: AudioError,
}

/// Common lifecycle for every push source
pub trait SignalSource: Send {
    /// Short name used in logs and status
    fn name(&self) -> &'static str;

    /// Subscribe to the OS capability. Starting an active source is a no-op.
    fn start(&mut self) -> Result<(), RegistrationError>;

    /// Unsubscribe. Stopping an inactive source is a no-op.
    fn stop(&mut self);

    fn is_active(&self) -> bool;
}
