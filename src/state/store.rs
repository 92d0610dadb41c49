//! Authoritative mute value with compare-and-swap acceptance

use std::sync::atomic::{AtomicBool, Ordering};

/// Result of offering a candidate value to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accept {
    /// Candidate equalled the stored value; nothing changed
    Unchanged,
    /// Stored value flipped
    Transitioned { previous: bool, current: bool },
}

/// The process-wide mute value
#[derive(Debug)]
pub struct MuteStore {
    muted: AtomicBool,
}

impl MuteStore {
    /// Create the store seeded with the startup reading
    pub fn new(initial: bool) -> Self {
        Self {
            muted: AtomicBool::new(initial),
        }
    }

    /// Current value. Never blocks.
    pub fn current(&self) -> bool {
        self.muted.load(Ordering::Acquire)
    }

    /// Offer a candidate value.
    ///
    /// Exactly one of several racing callers offering the same new value
    /// observes `Transitioned`. The write is released before this returns,
    /// so any thread calling [`current`](Self::current) afterwards sees it.
    pub fn accept(&self, candidate: bool) -> Accept {
        match self
            .muted
            .compare_exchange(!candidate, candidate, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(previous) => Accept::Transitioned {
                previous,
                current: candidate,
            },
            Err(_) => Accept::Unchanged,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::thread;

    #[test]
    fn test_initial_value() {
        assert!(MuteStore::new(true).current());
        assert!(!MuteStore::new(false).current());
    }

    #[test]
    fn test_same_value_unchanged() {
        let store = MuteStore::new(false);
        assert_eq!(store.accept(false), Accept::Unchanged);
        assert!(!store.current());
    }

    #[test]
    fn test_new_value_transitions() {
        let store = MuteStore::new(false);
        assert_eq!(
            store.accept(true),
            Accept::Transitioned {
                previous: false,
                current: true
            }
        );
        assert!(store.current());
        assert_eq!(store.accept(true), Accept::Unchanged);
    }

    #[test]
    fn test_racing_accepts_single_winner() {
        let store = Arc::new(MuteStore::new(false));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    store.accept(true)
                })
            })
            .collect();

        let transitions = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|r| matches!(r, Accept::Transitioned { .. }))
            .count();

        assert_eq!(transitions, 1);
        assert!(store.current());
    }
}
