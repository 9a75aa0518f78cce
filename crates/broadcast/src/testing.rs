//! Test doubles shared by the unit tests in this crate.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
};

use {
    async_trait::async_trait,
    herald_registry::{Destination, DestinationId, InMemoryStore, SubscriberRegistry},
    tokio::sync::Notify,
};

use crate::{
    access::AdminCheck,
    delivery::{BroadcastMessage, Deliver, DeliveryError},
};

/// Delivery stub: `Ok` unless a failure, hang or gate was scripted for the id.
#[derive(Default)]
pub(crate) struct ScriptedDelivery {
    failures: HashMap<i64, DeliveryError>,
    hangs: HashSet<i64>,
    gates: HashMap<i64, Arc<Notify>>,
    calls: Mutex<Vec<i64>>,
}

impl ScriptedDelivery {
    pub(crate) fn fail(mut self, id: i64, error: impl Into<DeliveryError>) -> Self {
        self.failures.insert(id, error.into());
        self
    }

    pub(crate) fn hang(mut self, id: i64) -> Self {
        self.hangs.insert(id);
        self
    }

    /// Hold the attempt for `id` until `gate` is notified.
    pub(crate) fn park(mut self, id: i64, gate: Arc<Notify>) -> Self {
        self.gates.insert(id, gate);
        self
    }

    /// Ids attempted so far, sorted.
    pub(crate) fn calls(&self) -> Vec<i64> {
        let mut calls = self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone();
        calls.sort_unstable();
        calls
    }
}

#[async_trait]
impl Deliver for ScriptedDelivery {
    async fn deliver(
        &self,
        _message: &BroadcastMessage,
        destination: DestinationId,
    ) -> Result<(), DeliveryError> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(destination.0);
        if self.hangs.contains(&destination.0) {
            std::future::pending::<()>().await;
        }
        if let Some(gate) = self.gates.get(&destination.0) {
            gate.notified().await;
        }
        match self.failures.get(&destination.0) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

/// Admin lookup stub keyed by `(chat, user)`. Unknown pairs error out.
#[derive(Default)]
pub(crate) struct StaticAdminCheck {
    answers: HashMap<(i64, u64), bool>,
    calls: Mutex<usize>,
}

impl StaticAdminCheck {
    pub(crate) fn with(mut self, chat: i64, user_id: u64, is_admin: bool) -> Self {
        self.answers.insert((chat, user_id), is_admin);
        self
    }

    pub(crate) fn call_count(&self) -> usize {
        *self.calls.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl AdminCheck for StaticAdminCheck {
    async fn is_admin(&self, chat: DestinationId, user_id: u64) -> anyhow::Result<bool> {
        *self.calls.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        self.answers
            .get(&(chat.0, user_id))
            .copied()
            .ok_or_else(|| anyhow::anyhow!("member lookup failed for {chat}/{user_id}"))
    }
}

pub(crate) async fn registry_with(ids: &[i64]) -> (Arc<InMemoryStore>, Arc<SubscriberRegistry>) {
    let store = Arc::new(InMemoryStore::with_destinations(
        ids.iter().copied().map(Destination::new).collect(),
    ));
    let registry = SubscriberRegistry::open(Arc::<InMemoryStore>::clone(&store))
        .await
        .unwrap_or_else(|e| panic!("open registry: {e}"));
    (store, Arc::new(registry))
}
