//! Mute state store
//!
//! Holds the single authoritative muted/unmuted value for the process.
//! The only mutator is [`MuteStore::accept`], and only the reconciler
//! calls it.

mod store;

pub use store::{Accept, MuteStore};
