use thiserror::Error;

use crate::access::DenialReason;

/// Failure of a single subscribe/unsubscribe/broadcast command.
#[derive(Debug, Error)]
pub enum Error {
    #[error("access denied: {0}")]
    AuthorizationDenied(DenialReason),

    #[error(transparent)]
    Persistence(#[from] herald_registry::Error),

    #[error("command is only available in groups and channels")]
    PrivateChat,

    #[error("no chats have subscribed yet")]
    NoSubscribers,
}

impl Error {
    #[must_use]
    pub fn denied(reason: DenialReason) -> Self {
        Self::AuthorizationDenied(reason)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
