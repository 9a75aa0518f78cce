//! The authoritative subscriber set.
//!
//! Mutators hold the write lock across both the in-memory change and the
//! store save, so mutations are totally ordered and a save failure can be
//! rolled back before anyone else observes the change. `list`/`contains`
//! share the read lock.

use std::{collections::BTreeMap, sync::Arc};

use {
    tokio::sync::RwLock,
    tracing::{error, info},
};

use crate::{
    Result,
    store::SubscriberStore,
    types::{ChatKind, Destination, DestinationId},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeOutcome {
    Added,
    AlreadyPresent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsubscribeOutcome {
    Removed,
    NotPresent,
}

/// A group that was upgraded to a supergroup under a new id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Migration {
    pub from: DestinationId,
    pub to: DestinationId,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneOutcome {
    pub evicted: usize,
    pub migrated: usize,
}

pub struct SubscriberRegistry {
    store: Arc<dyn SubscriberStore>,
    destinations: RwLock<BTreeMap<DestinationId, Destination>>,
}

impl SubscriberRegistry {
    /// Load the persisted set once and wrap it. A missing backing file yields
    /// an empty registry; a corrupt one is returned as an error.
    pub async fn open(store: Arc<dyn SubscriberStore>) -> Result<Self> {
        let loaded = store.load().await?;
        let destinations: BTreeMap<_, _> = loaded.into_iter().map(|d| (d.id, d)).collect();
        info!(count = destinations.len(), "subscriber registry loaded");
        Ok(Self {
            store,
            destinations: RwLock::new(destinations),
        })
    }

    pub async fn subscribe(&self, destination: Destination) -> Result<SubscribeOutcome> {
        let mut destinations = self.destinations.write().await;
        if destinations.contains_key(&destination.id) {
            return Ok(SubscribeOutcome::AlreadyPresent);
        }

        let id = destination.id;
        destinations.insert(id, destination);
        if let Err(e) = self.persist(&destinations).await {
            destinations.remove(&id);
            error!(chat_id = %id, error = %e, "failed to persist subscribe, rolled back");
            return Err(e);
        }

        info!(chat_id = %id, total = destinations.len(), "destination subscribed");
        Ok(SubscribeOutcome::Added)
    }

    pub async fn unsubscribe(&self, id: DestinationId) -> Result<UnsubscribeOutcome> {
        let mut destinations = self.destinations.write().await;
        let Some(previous) = destinations.remove(&id) else {
            return Ok(UnsubscribeOutcome::NotPresent);
        };

        if let Err(e) = self.persist(&destinations).await {
            destinations.insert(id, previous);
            error!(chat_id = %id, error = %e, "failed to persist unsubscribe, rolled back");
            return Err(e);
        }

        info!(chat_id = %id, total = destinations.len(), "destination unsubscribed");
        Ok(UnsubscribeOutcome::Removed)
    }

    /// Snapshot of the set, ordered by id.
    pub async fn list(&self) -> Vec<Destination> {
        self.destinations.read().await.values().cloned().collect()
    }

    pub async fn contains(&self, id: DestinationId) -> bool {
        self.destinations.read().await.contains_key(&id)
    }

    pub async fn len(&self) -> usize {
        self.destinations.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.destinations.read().await.is_empty()
    }

    /// Remove every id in `ids` that is still present and persist once for the
    /// whole batch. Ids already gone (e.g. unsubscribed mid-broadcast) are
    /// skipped. Returns how many were removed.
    pub async fn evict_many(&self, ids: &[DestinationId]) -> Result<usize> {
        Ok(self.prune(ids, &[]).await?.evicted)
    }

    /// Apply the aftermath of a broadcast in one save: drop `evict` ids and
    /// re-key each migrated chat to its new id, keeping its title.
    ///
    /// Only ids still present are touched, so a chat unsubscribed while the
    /// broadcast ran is neither evicted nor resurrected under its new id. On a
    /// save failure the whole batch is rolled back.
    pub async fn prune(
        &self,
        evict: &[DestinationId],
        migrations: &[Migration],
    ) -> Result<PruneOutcome> {
        let mut destinations = self.destinations.write().await;
        let mut removed: Vec<Destination> = Vec::new();
        let mut inserted: Vec<DestinationId> = Vec::new();
        let mut moved: Vec<Migration> = Vec::new();
        let mut outcome = PruneOutcome::default();

        for id in evict {
            if let Some(destination) = destinations.remove(id) {
                removed.push(destination);
                outcome.evicted += 1;
            }
        }
        for migration in migrations {
            let Some(previous) = destinations.remove(&migration.from) else {
                continue;
            };
            if !destinations.contains_key(&migration.to) {
                let mut upgraded = previous.clone();
                upgraded.id = migration.to;
                upgraded.kind = Some(ChatKind::Supergroup);
                destinations.insert(migration.to, upgraded);
                inserted.push(migration.to);
            }
            removed.push(previous);
            moved.push(*migration);
            outcome.migrated += 1;
        }
        if removed.is_empty() {
            return Ok(outcome);
        }

        if let Err(e) = self.persist(&destinations).await {
            for id in &inserted {
                destinations.remove(id);
            }
            let count = removed.len();
            for destination in removed {
                destinations.insert(destination.id, destination);
            }
            error!(count, error = %e, "failed to persist eviction, rolled back");
            return Err(e);
        }

        if outcome.evicted > 0 {
            let evicted: Vec<String> = removed[..outcome.evicted]
                .iter()
                .map(|d| d.id.to_string())
                .collect();
            info!(
                evicted = ?evicted,
                total = destinations.len(),
                "evicted unreachable destinations"
            );
        }
        for Migration { from, to } in moved {
            info!(%from, %to, "destination migrated");
        }
        Ok(outcome)
    }

    async fn persist(&self, destinations: &BTreeMap<DestinationId, Destination>) -> Result<()> {
        let snapshot: Vec<Destination> = destinations.values().cloned().collect();
        self.store.save(&snapshot).await
    }
}
