//! In-memory store for testing.

use std::sync::{
    Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use async_trait::async_trait;

use crate::{Error, Result, store::SubscriberStore, types::Destination};

/// In-memory store. No persistence; counts saves and can be told to fail them
/// so callers can assert the write-through contract.
#[derive(Default)]
pub struct InMemoryStore {
    destinations: Mutex<Vec<Destination>>,
    saves: AtomicUsize,
    fail_saves: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_destinations(destinations: Vec<Destination>) -> Self {
        Self {
            destinations: Mutex::new(destinations),
            ..Self::default()
        }
    }

    /// Number of successful saves so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Make every subsequent `save` fail (or succeed again).
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Last saved set.
    pub fn saved(&self) -> Vec<Destination> {
        self.destinations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl SubscriberStore for InMemoryStore {
    async fn load(&self) -> Result<Vec<Destination>> {
        Ok(self.saved())
    }

    async fn save(&self, destinations: &[Destination]) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(Error::Io(std::io::Error::other("simulated save failure")));
        }
        let mut stored = self.destinations.lock().unwrap_or_else(|e| e.into_inner());
        *stored = destinations.to_vec();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
