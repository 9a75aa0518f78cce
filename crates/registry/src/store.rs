//! Persistence seam for the subscriber set.

use async_trait::async_trait;

use crate::{Result, types::Destination};

/// Durable backing for the registry. The whole set is loaded and saved as one
/// unit; implementations must never expose a partially written state.
#[async_trait]
pub trait SubscriberStore: Send + Sync {
    /// Load the persisted set. A store that has never been written returns an
    /// empty list.
    async fn load(&self) -> Result<Vec<Destination>>;

    /// Replace the persisted set with `destinations`.
    async fn save(&self, destinations: &[Destination]) -> Result<()>;
}
