//! Per-key mutual exclusion for read-modify-write sequences.
//!
//! RULE: Hold a user's lock from the first read of their record until the
//! final write. Never hold it across a network call.
//!
//! Locks are per key: two different users never wait on each other,
//! apart from the brief moment spent looking up the slot table.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Slot tables larger than this are swept for unused entries.
const PRUNE_THRESHOLD: usize = 1024;

#[derive(Debug, Default)]
pub struct KeyedLocks {
    slots: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the exclusive lock for `key`.
    pub fn with_lock<T>(&self, key: &str, f: impl FnOnce() -> T) -> T {
        let slot = self.slot(key);
        // The mutex guards no data, so a poisoned lock is still a valid lock.
        let _guard = slot.lock().unwrap_or_else(|e| e.into_inner());
        f()
    }

    /// Run `f` while holding the locks for two keys.
    /// Keys are always taken in sorted order so pairs never deadlock.
    /// Equal keys take a single lock.
    pub fn with_pair<T>(&self, a: &str, b: &str, f: impl FnOnce() -> T) -> T {
        if a == b {
            return self.with_lock(a, f);
        }
        let (first, second) = if a < b { (a, b) } else { (b, a) };
        let first_slot = self.slot(first);
        let second_slot = self.slot(second);
        let _first = first_slot.lock().unwrap_or_else(|e| e.into_inner());
        let _second = second_slot.lock().unwrap_or_else(|e| e.into_inner());
        f()
    }

    /// Number of live slots. Exposed for tests.
    pub fn slot_count(&self) -> usize {
        self.slots.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn slot(&self, key: &str) -> Arc<Mutex<()>> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        if slots.len() >= PRUNE_THRESHOLD {
            // Only the table holds a reference: nobody is using or waiting on it.
            slots.retain(|_, slot| Arc::strong_count(slot) > 1);
        }
        slots
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
