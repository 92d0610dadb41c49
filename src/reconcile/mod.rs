//! Reconciliation of racing mute observations
//!
//! Every signal source and the control surface feed candidate
//! observations into one [`Reconciler`]. It serializes them through the
//! mute store and publishes a single [`ChangeEvent`](crate::events::ChangeEvent)
//! per real transition on the [`EventBus`].

mod bus;
mod reconciler;

pub use bus::{EventBus, Subscription};
pub use reconciler::Reconciler;
