//! Events module for mute state reconciliation
//!
//! Provides the candidate observations produced by signal sources and
//! the change events emitted when the authoritative mute state flips.

use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Where a candidate observation came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// Hardware mute gesture callback (AirPods stem press)
    Gesture,
    /// OS broadcast fired after any mute change
    Notification,
    /// Direct read of the mute property
    PropertyQuery,
    /// Fixed-interval fallback poller
    Poll,
    /// Toggle/set requested by a presentation collaborator
    ControlSurface,
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Source::Gesture => write!(f, "gesture"),
            Source::Notification => write!(f, "notification"),
            Source::PropertyQuery => write!(f, "property_query"),
            Source::Poll => write!(f, "poll"),
            Source::ControlSurface => write!(f, "control_surface"),
        }
    }
}

/// An unconfirmed report of the current mute value from one source.
///
/// Consumed immediately by the reconciler, never stored.
#[derive(Debug, Clone, Copy)]
pub struct CandidateObservation {
    pub source: Source,
    pub value: bool,
    pub timestamp: Instant,
}

impl CandidateObservation {
    /// Create an observation stamped with the current instant
    pub fn new(source: Source, value: bool) -> Self {
        Self {
            source,
            value,
            timestamp: Instant::now(),
        }
    }
}

/// Emitted at most once per actual transition of the mute state.
///
/// The payload is advisory: subscribers that care about the latest value
/// should re-query the store, since several transitions may be queued
/// behind this one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Value before the transition
    pub previous: bool,
    /// Value after the transition
    pub current: bool,
}

impl std::fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = |muted: bool| if muted { "MUTED" } else { "UNMUTED" };
        write!(f, "{} -> {}", label(self.previous), label(self.current))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = ChangeEvent {
            previous: false,
            current: true,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"previous\":false"));
        assert!(json.contains("\"current\":true"));
    }

    #[test]
    fn test_source_deserialization() {
        let source: Source = serde_json::from_str(r#""property_query""#).unwrap();
        assert_eq!(source, Source::PropertyQuery);
    }

    #[test]
    fn test_event_display() {
        let event = ChangeEvent {
            previous: true,
            current: false,
        };
        assert_eq!(event.to_string(), "MUTED -> UNMUTED");
        assert_eq!(Source::ControlSurface.to_string(), "control_surface");
    }
}
