//! One-pass fanout of a message to a registry snapshot.
//!
//! Each destination gets exactly one attempt, bounded by
//! [`FanoutConfig::delivery_timeout`]. No registry lock is held while
//! delivering; permanent failures are evicted, and migrated groups re-keyed,
//! in a single batch afterwards.

use std::{sync::Arc, time::Duration};

use {
    futures::{StreamExt, stream},
    herald_registry::{Destination, DestinationId, Migration, SubscriberRegistry},
    tracing::{debug, error, info, warn},
};

use crate::delivery::{BroadcastMessage, Deliver, DeliveryError, PermanentReason, TransientReason};

#[derive(Debug, Clone, Copy)]
pub struct FanoutConfig {
    /// Upper bound for a single delivery attempt. Expiry counts as transient.
    pub delivery_timeout: Duration,
    /// Attempts in flight at once. A stalled attempt holds only its own slot,
    /// and results keep snapshot order regardless.
    pub concurrency: usize,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            delivery_timeout: Duration::from_secs(15),
            concurrency: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryResult {
    Delivered,
    TransientFailure(TransientReason),
    PermanentFailure(PermanentReason),
}

/// Result of the attempt against one destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub destination: Destination,
    pub result: DeliveryResult,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastFailure {
    pub destination: Destination,
    pub error: DeliveryError,
}

impl BroadcastFailure {
    pub fn id(&self) -> DestinationId {
        self.destination.id
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub attempted: usize,
    pub delivered: usize,
    pub evicted: usize,
    /// Groups re-keyed to their new supergroup id.
    pub migrated: usize,
    /// Every destination that was not delivered to, in snapshot order.
    pub failures: Vec<BroadcastFailure>,
    /// Set when the eviction batch could not be persisted; nothing was
    /// evicted or migrated in that case.
    pub eviction_error: Option<String>,
}

pub struct FanoutEngine {
    registry: Arc<SubscriberRegistry>,
    delivery: Arc<dyn Deliver>,
    config: FanoutConfig,
}

impl FanoutEngine {
    pub fn new(
        registry: Arc<SubscriberRegistry>,
        delivery: Arc<dyn Deliver>,
        config: FanoutConfig,
    ) -> Self {
        Self {
            registry,
            delivery,
            config,
        }
    }

    /// Snapshot the registry and broadcast to it.
    pub async fn broadcast_to_all(&self, message: &BroadcastMessage) -> BroadcastReport {
        let snapshot = self.registry.list().await;
        self.broadcast(message, &snapshot).await
    }

    /// Deliver to every destination in `snapshot`, then evict the ones that
    /// failed permanently.
    pub async fn broadcast(
        &self,
        message: &BroadcastMessage,
        snapshot: &[Destination],
    ) -> BroadcastReport {
        let outcomes = self.fan_out(message, snapshot).await;

        let mut report = BroadcastReport {
            attempted: outcomes.len(),
            ..Default::default()
        };
        let mut to_evict = Vec::new();
        let mut migrations = Vec::new();
        for DeliveryOutcome {
            destination,
            result,
        } in outcomes
        {
            match result {
                DeliveryResult::Delivered => report.delivered += 1,
                DeliveryResult::PermanentFailure(reason) => {
                    match reason {
                        PermanentReason::Migrated { to } => migrations.push(Migration {
                            from: destination.id,
                            to: DestinationId(to),
                        }),
                        _ => to_evict.push(destination.id),
                    }
                    report.failures.push(BroadcastFailure {
                        destination,
                        error: DeliveryError::Permanent(reason),
                    });
                },
                DeliveryResult::TransientFailure(reason) => {
                    report.failures.push(BroadcastFailure {
                        destination,
                        error: DeliveryError::Transient(reason),
                    });
                },
            }
        }

        if !to_evict.is_empty() || !migrations.is_empty() {
            match self.registry.prune(&to_evict, &migrations).await {
                Ok(outcome) => {
                    report.evicted = outcome.evicted;
                    report.migrated = outcome.migrated;
                },
                Err(e) => {
                    error!(
                        evict = to_evict.len(),
                        migrate = migrations.len(),
                        error = %e,
                        "failed to update destinations after broadcast"
                    );
                    report.eviction_error = Some(e.to_string());
                },
            }
        }

        info!(
            source_chat_id = message.source_chat_id,
            message_id = message.message_id,
            attempted = report.attempted,
            delivered = report.delivered,
            evicted = report.evicted,
            migrated = report.migrated,
            failed = report.failures.len(),
            "broadcast finished"
        );
        report
    }

    /// One attempt per destination, results in snapshot order. Touches no
    /// registry state.
    ///
    /// Attempts complete in any order so a slow head never holds back the
    /// rest; outcomes are re-sorted by snapshot position afterwards.
    pub async fn fan_out(
        &self,
        message: &BroadcastMessage,
        snapshot: &[Destination],
    ) -> Vec<DeliveryOutcome> {
        let attempts: Vec<_> = snapshot
            .iter()
            .enumerate()
            .map(|(idx, destination)| async move {
                let outcome = DeliveryOutcome {
                    destination: destination.clone(),
                    result: self.attempt(message, destination.id).await,
                };
                (idx, outcome)
            })
            .collect();
        let mut outcomes: Vec<(usize, DeliveryOutcome)> = stream::iter(attempts)
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;
        outcomes.sort_by_key(|(idx, _)| *idx);
        outcomes.into_iter().map(|(_, outcome)| outcome).collect()
    }

    async fn attempt(&self, message: &BroadcastMessage, id: DestinationId) -> DeliveryResult {
        let delivery = self.delivery.deliver(message, id);
        match tokio::time::timeout(self.config.delivery_timeout, delivery).await {
            Ok(Ok(())) => {
                debug!(chat_id = %id, "broadcast delivered");
                DeliveryResult::Delivered
            },
            Ok(Err(DeliveryError::Permanent(reason))) => {
                warn!(chat_id = %id, %reason, "destination unreachable, will evict");
                DeliveryResult::PermanentFailure(reason)
            },
            Ok(Err(DeliveryError::Transient(reason))) => {
                warn!(chat_id = %id, %reason, "broadcast delivery failed, keeping destination");
                DeliveryResult::TransientFailure(reason)
            },
            Err(_) => {
                warn!(
                    chat_id = %id,
                    timeout_ms = self.config.delivery_timeout.as_millis() as u64,
                    "broadcast delivery timed out"
                );
                DeliveryResult::TransientFailure(TransientReason::Timeout)
            },
        }
    }
}
