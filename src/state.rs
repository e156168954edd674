//! ==============================================================================
//! state.rs - shared latest-value store
//! ==============================================================================
//!
//! one writer (the ingestion thread) and any number of concurrent readers
//! (datagram handlers). the map is only reachable through `update` and
//! `snapshot`, each of which holds the lock for the whole operation, so a
//! snapshot never sees a partially applied update.
//!
//! in single mode every reading also overwrites the scalar slot, inside the
//! same critical section as its own key.
//!
//! ==============================================================================

use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};

use crate::config::IngestMode;
use crate::domain::{LatestState, Reading, SCALAR_KEY};

#[derive(Clone, Debug)]
pub struct StateStore {
    inner: Arc<RwLock<LatestState>>,
    /// keys allowed into the map; readings for other keys are not cached
    tracked: Arc<HashSet<String>>,
    /// mirror every reading's value into `SCALAR_KEY`
    scalar: bool,
}

impl StateStore {
    pub fn new<I, S>(tracked_keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            inner: Arc::new(RwLock::new(LatestState::new())),
            tracked: Arc::new(tracked_keys.into_iter().map(Into::into).collect()),
            scalar: false,
        }
    }

    /// store shaped for the ingest mode
    ///
    /// single mode additionally tracks `SCALAR_KEY`, which always holds the
    /// most recent value of any reading.
    pub fn for_mode(mode: IngestMode, tracked_keys: &[String]) -> Self {
        match mode {
            IngestMode::Keyed => Self::new(tracked_keys.iter().cloned()),
            IngestMode::Single => {
                let keys = tracked_keys.iter().cloned().chain([SCALAR_KEY.to_string()]);
                Self { scalar: true, ..Self::new(keys) }
            }
        }
    }

    /// store `reading.value` under `reading.key`; returns false when nothing changed
    pub fn update(&self, reading: &Reading) -> bool {
        let keyed = self.tracked.contains(&reading.key);
        if !keyed && !self.scalar {
            tracing::debug!(key = %reading.key, "Untracked key, state unchanged");
            return false;
        }
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if keyed {
            guard.insert(reading.key.clone(), reading.value.clone());
        }
        if self.scalar {
            guard.insert(SCALAR_KEY.to_string(), reading.value.clone());
        }
        true
    }

    /// point-in-time copy of every known value
    pub fn snapshot(&self) -> LatestState {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn reading(key: &str, value: &str) -> Reading {
        Reading::now(key, value, "")
    }

    #[test]
    fn test_empty_snapshot() {
        let store = StateStore::new(["temperature"]);
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn test_update_replaces_value() {
        let store = StateStore::new(["temperature", "humidity"]);
        assert!(store.update(&reading("temperature", "20")));
        assert!(store.update(&reading("temperature", "21.5")));
        assert!(store.update(&reading("humidity", "60")));

        let snap = store.snapshot();
        assert_eq!(snap.len(), 2);
        assert_eq!(snap["temperature"], "21.5");
        assert_eq!(snap["humidity"], "60");
    }

    #[test]
    fn test_untracked_key_never_inserted() {
        let store = StateStore::new(["temperature"]);
        assert!(!store.update(&reading("pressure", "1013")));
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn test_single_mode_mirrors_every_value_into_scalar() {
        let store = StateStore::for_mode(IngestMode::Single, &["temperature".to_string()]);
        assert!(store.snapshot().is_empty());

        assert!(store.update(&reading("temperature", "21.5")));
        let snap = store.snapshot();
        assert_eq!(snap["temperature"], "21.5");
        assert_eq!(snap[SCALAR_KEY], "21.5");

        // untracked keys still reach the scalar, but not the map
        assert!(store.update(&reading("pressure", "1013")));
        let snap = store.snapshot();
        assert_eq!(snap[SCALAR_KEY], "1013");
        assert!(!snap.contains_key("pressure"));

        assert!(store.update(&reading(SCALAR_KEY, "7")));
        assert_eq!(store.snapshot()[SCALAR_KEY], "7");
    }

    #[test]
    fn test_keyed_mode_has_no_scalar() {
        let store = StateStore::for_mode(IngestMode::Keyed, &["temperature".to_string()]);
        store.update(&reading("temperature", "21.5"));
        assert!(!store.snapshot().contains_key(SCALAR_KEY));
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let store = StateStore::new(["temperature"]);
        store.update(&reading("temperature", "20"));
        let before = store.snapshot();
        store.update(&reading("temperature", "25"));
        assert_eq!(before["temperature"], "20");
        assert_eq!(store.snapshot()["temperature"], "25");
    }

    #[test]
    fn test_concurrent_readers_see_whole_values() {
        let store = StateStore::new(["temperature"]);
        let writer = {
            let store = store.clone();
            thread::spawn(move || {
                for i in 0..1000 {
                    store.update(&reading("temperature", &format!("{i}.{i}")));
                }
            })
        };
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                thread::spawn(move || {
                    for _ in 0..1000 {
                        if let Some(v) = store.snapshot().get("temperature") {
                            let (a, b) = v.split_once('.').expect("value written as i.i");
                            assert_eq!(a, b);
                        }
                    }
                })
            })
            .collect();
        writer.join().unwrap();
        for r in readers {
            r.join().unwrap();
        }
        assert_eq!(store.snapshot()["temperature"], "999.999");
    }
}
