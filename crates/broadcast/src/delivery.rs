//! Delivery collaborator seam and its error taxonomy.

use std::fmt;

use {async_trait::async_trait, herald_registry::DestinationId, thiserror::Error};

/// The operator's private message, identified by where it was sent. Delivery
/// copies it into each destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastMessage {
    pub source_chat_id: i64,
    pub message_id: i32,
    /// Text preview for logs; the copy itself carries the original content.
    pub text: Option<String>,
}

impl BroadcastMessage {
    pub fn new(source_chat_id: i64, message_id: i32) -> Self {
        Self {
            source_chat_id,
            message_id,
            text: None,
        }
    }

    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }
}

/// Sends one message to one destination.
#[async_trait]
pub trait Deliver: Send + Sync {
    async fn deliver(
        &self,
        message: &BroadcastMessage,
        destination: DestinationId,
    ) -> Result<(), DeliveryError>;
}

/// Delivery failure, split on whether retrying could ever succeed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// The chat can no longer be reached under this id. The destination is
    /// evicted, or re-keyed when it migrated.
    #[error("{0}")]
    Permanent(PermanentReason),
    /// Anything else. The destination is kept.
    #[error("{0}")]
    Transient(TransientReason),
}

impl DeliveryError {
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent(_))
    }
}

impl From<PermanentReason> for DeliveryError {
    fn from(reason: PermanentReason) -> Self {
        Self::Permanent(reason)
    }
}

impl From<TransientReason> for DeliveryError {
    fn from(reason: TransientReason) -> Self {
        Self::Transient(reason)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermanentReason {
    Forbidden,
    Kicked,
    ChatNotFound,
    Blocked,
    Deactivated,
    NotEnoughRights,
    /// Group upgraded to a supergroup; the old id no longer accepts messages.
    /// The destination is re-keyed to `to` instead of being dropped.
    Migrated {
        to: i64,
    },
}

impl fmt::Display for PermanentReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Forbidden => write!(f, "forbidden"),
            Self::Kicked => write!(f, "bot was removed from the chat"),
            Self::ChatNotFound => write!(f, "chat not found"),
            Self::Blocked => write!(f, "bot was blocked"),
            Self::Deactivated => write!(f, "chat is deactivated"),
            Self::NotEnoughRights => write!(f, "bot is not allowed to post"),
            Self::Migrated { to } => write!(f, "chat migrated to {to}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransientReason {
    RateLimited { retry_after_secs: Option<u32> },
    Network(String),
    Server(String),
    Timeout,
    /// Errors with no clear mapping. Kept, not evicted.
    Unclassified(String),
}

impl fmt::Display for TransientReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RateLimited {
                retry_after_secs: Some(secs),
            } => write!(f, "rate limited (retry after {secs}s)"),
            Self::RateLimited {
                retry_after_secs: None,
            } => write!(f, "rate limited"),
            Self::Network(msg) => write!(f, "network error: {msg}"),
            Self::Server(msg) => write!(f, "server error: {msg}"),
            Self::Timeout => write!(f, "timed out"),
            Self::Unclassified(msg) => write!(f, "{msg}"),
        }
    }
}
