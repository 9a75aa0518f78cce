use {
    async_trait::async_trait,
    teloxide::{
        ApiError, RequestError,
        prelude::*,
        types::{ChatId, MessageId},
    },
    tracing::debug,
};

use {
    herald_broadcast::{BroadcastMessage, Deliver, DeliveryError, PermanentReason, TransientReason},
    herald_registry::DestinationId,
};

/// Copies the operator's message into a destination chat.
pub struct TelegramDelivery {
    bot: Bot,
}

impl TelegramDelivery {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl Deliver for TelegramDelivery {
    async fn deliver(
        &self,
        message: &BroadcastMessage,
        destination: DestinationId,
    ) -> Result<(), DeliveryError> {
        let copied = self
            .bot
            .copy_message(
                ChatId(destination.0),
                ChatId(message.source_chat_id),
                MessageId(message.message_id),
            )
            .await
            .map_err(|e| classify_request_error(&e))?;
        debug!(
            chat_id = destination.0,
            copied_message_id = copied.0,
            "telegram message copied"
        );
        Ok(())
    }
}

/// Map a Bot API failure onto the permanent/transient split.
///
/// Only errors that mean the bot can no longer post to the chat are
/// permanent. Everything unrecognised stays transient.
pub fn classify_request_error(error: &RequestError) -> DeliveryError {
    match error {
        RequestError::Api(api) => classify_api_error(api),
        RequestError::MigrateToChatId(new_id) => {
            PermanentReason::Migrated { to: new_id.0 }.into()
        },
        RequestError::RetryAfter(wait) => TransientReason::RateLimited {
            retry_after_secs: Some(wait.seconds()),
        }
        .into(),
        RequestError::Network(e) => TransientReason::Network(e.to_string()).into(),
        RequestError::Io(e) => TransientReason::Network(e.to_string()).into(),
        RequestError::InvalidJson { source, .. } => {
            TransientReason::Server(source.to_string()).into()
        },
    }
}

fn classify_api_error(error: &ApiError) -> DeliveryError {
    match error {
        ApiError::BotBlocked => PermanentReason::Blocked.into(),
        ApiError::BotKicked | ApiError::BotKickedFromSupergroup => PermanentReason::Kicked.into(),
        ApiError::ChatNotFound => PermanentReason::ChatNotFound.into(),
        ApiError::UserDeactivated | ApiError::GroupDeactivated => {
            PermanentReason::Deactivated.into()
        },
        ApiError::CantInitiateConversation | ApiError::CantTalkWithBots => {
            PermanentReason::Forbidden.into()
        },
        ApiError::NotEnoughRightsToPostMessages => PermanentReason::NotEnoughRights.into(),
        // Forbidden descriptions teloxide has no variant for, e.g. "bot was
        // kicked from the group chat".
        ApiError::Unknown(description) if description.starts_with("Forbidden:") => {
            PermanentReason::Forbidden.into()
        },
        other => TransientReason::Unclassified(other.to_string()).into(),
    }
}
