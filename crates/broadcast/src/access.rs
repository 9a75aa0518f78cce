use std::{collections::BTreeSet, fmt};

use {async_trait::async_trait, herald_registry::DestinationId, tracing::warn};

/// Operators allowed to broadcast. An empty list is open mode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperatorAllowlist {
    ids: BTreeSet<u64>,
}

impl OperatorAllowlist {
    pub fn new(ids: impl IntoIterator<Item = u64>) -> Self {
        Self {
            ids: ids.into_iter().collect(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn is_allowed_operator(&self, user_id: u64) -> bool {
        self.is_open() || self.ids.contains(&user_id)
    }

    /// Like [`Self::is_allowed_operator`] for a message that may have no
    /// sender. Anonymous senders only pass in open mode.
    pub fn permits(&self, user_id: Option<u64>) -> bool {
        match user_id {
            Some(id) => self.is_allowed_operator(id),
            None => self.is_open(),
        }
    }

    /// Allowed ids in ascending order.
    pub fn ids(&self) -> Vec<u64> {
        self.ids.iter().copied().collect()
    }
}

/// Admin-status lookup provided by the transport.
#[async_trait]
pub trait AdminCheck: Send + Sync {
    async fn is_admin(&self, chat: DestinationId, user_id: u64) -> anyhow::Result<bool>;
}

/// `true` only if the lookup succeeds and says yes. Lookup errors deny.
pub async fn is_chat_admin(check: &dyn AdminCheck, chat: DestinationId, user_id: u64) -> bool {
    match check.is_admin(chat, user_id).await {
        Ok(is_admin) => is_admin,
        Err(e) => {
            warn!(chat_id = %chat, user_id, error = %e, "admin lookup failed, denying");
            false
        },
    }
}

/// Reason a command was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenialReason {
    NotAllowedOperator,
    NotChatAdmin,
    UnknownSender,
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAllowedOperator => write!(f, "user is not an allowed operator"),
            Self::NotChatAdmin => write!(f, "user is not a chat admin"),
            Self::UnknownSender => write!(f, "sender is unknown"),
        }
    }
}
