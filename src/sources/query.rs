//! Property-query read path
//!
//! Used for the startup seed, for every device change, and by the sources
//! that re-read rather than trust a payload. When both the low-level
//! property and the gesture-capable API are readable and disagree, the
//! gesture API wins: the property lags right after a topology change.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::audio::{AudioError, AudioSystem};
use crate::events::Source;

/// A single mute read failed
#[derive(Debug, thiserror::Error)]
#[error("mute state query failed: {0}")]
pub struct QueryError(#[from] pub AudioError);

/// Value returned by a cross-checked read, with the path that produced it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reading {
    pub value: bool,
    pub source: Source,
}

/// Pull-only mute reader
#[derive(Clone)]
pub struct PropertyQuery {
    system: Arc<dyn AudioSystem>,
}

impl PropertyQuery {
    pub fn new(system: Arc<dyn AudioSystem>) -> Self {
        Self { system }
    }

    /// Raw low-level property read
    pub fn read(&self) -> Result<bool, QueryError> {
        Ok(self.system.input_muted()?)
    }

    /// Property read, overridden by the gesture API when they disagree
    pub fn read_cross_checked(&self) -> Result<Reading, QueryError> {
        match (self.read(), self.system.gesture_muted()) {
            (Ok(property), Some(gesture)) if property != gesture => {
                warn!(property, gesture, "mute state mismatch, using gesture API value");
                Ok(Reading {
                    value: gesture,
                    source: Source::Gesture,
                })
            }
            (Ok(property), _) => Ok(Reading {
                value: property,
                source: Source::PropertyQuery,
            }),
            (Err(e), Some(gesture)) => {
                debug!(error = %e, gesture, "property read failed, using gesture API value");
                Ok(Reading {
                    value: gesture,
                    source: Source::Gesture,
                })
            }
            (Err(e), None) => Err(e),
        }
    }

    /// Cross-checked read on a blocking worker, abandoned after `limit`
    pub async fn read_bounded(&self, limit: Duration) -> Result<Reading, QueryError> {
        let query = self.clone();
        let work = tokio::task::spawn_blocking(move || query.read_cross_checked());

        match tokio::time::timeout(limit, work).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(QueryError(AudioError::Worker(join.to_string()))),
            Err(_) => Err(QueryError(AudioError::Timeout("mute query"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::simulated::SimulatedAudio;

    #[test]
    fn test_gesture_api_wins_disagreement() {
        let sim = SimulatedAudio::with_builtin_mic().with_gesture_api(true);
        sim.set_property_muted(false);
        let query = PropertyQuery::new(Arc::new(sim));

        assert!(!query.read().unwrap());
        assert_eq!(
            query.read_cross_checked().unwrap(),
            Reading {
                value: true,
                source: Source::Gesture
            }
        );
    }

    #[test]
    fn test_property_used_without_gesture_api() {
        let sim = SimulatedAudio::with_builtin_mic();
        sim.set_property_muted(true);
        let query = PropertyQuery::new(Arc::new(sim));

        assert_eq!(
            query.read_cross_checked().unwrap(),
            Reading {
                value: true,
                source: Source::PropertyQuery
            }
        );
    }

    #[test]
    fn test_property_failure_falls_back_to_gesture_api() {
        let sim = SimulatedAudio::with_builtin_mic().with_gesture_api(true);
        sim.fail_queries(true);
        let query = PropertyQuery::new(Arc::new(sim));

        assert!(query.read().is_err());
        assert!(query.read_cross_checked().unwrap().value);
    }

    #[test]
    fn test_failure_without_gesture_api() {
        let sim = SimulatedAudio::with_builtin_mic();
        sim.fail_queries(true);
        let query = PropertyQuery::new(Arc::new(sim));

        assert!(query.read_cross_checked().is_err());
    }

    #[tokio::test]
    async fn test_bounded_read() {
        let sim = SimulatedAudio::with_builtin_mic();
        sim.set_property_muted(true);
        let query = PropertyQuery::new(Arc::new(sim));

        let reading = query.read_bounded(Duration::from_secs(1)).await.unwrap();
        assert!(reading.value);
    }

    #[tokio::test]
    async fn test_bounded_read_times_out() {
        let sim = SimulatedAudio::with_builtin_mic();
        sim.set_read_delay(Some(Duration::from_millis(200)));
        let query = PropertyQuery::new(Arc::new(sim));

        let err = query.read_bounded(Duration::from_millis(20)).await.unwrap_err();
        assert!(matches!(err, QueryError(AudioError::Timeout(_))));
    }
}
