use {
    async_trait::async_trait,
    teloxide::{
        prelude::*,
        types::{Chat, UserId},
    },
};

use {
    herald_broadcast::AdminCheck,
    herald_registry::{ChatKind, Destination, DestinationId},
};

/// Admin lookup backed by `getChatMember`.
pub struct TelegramAdminCheck {
    bot: Bot,
}

impl TelegramAdminCheck {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl AdminCheck for TelegramAdminCheck {
    async fn is_admin(&self, chat: DestinationId, user_id: u64) -> anyhow::Result<bool> {
        let member = self
            .bot
            .get_chat_member(ChatId(chat.0), UserId(user_id))
            .await?;
        Ok(member.kind.is_privileged())
    }
}

pub fn chat_kind(chat: &Chat) -> ChatKind {
    if chat.is_private() {
        ChatKind::Private
    } else if chat.is_channel() {
        ChatKind::Channel
    } else if chat.is_supergroup() {
        ChatKind::Supergroup
    } else {
        ChatKind::Group
    }
}

/// Registry entry for `chat`, titled the way it shows up in `/list`.
///
/// Falls back from the chat title to the full name, then `@username`, then
/// the numeric id.
pub fn destination_for(chat: &Chat) -> Destination {
    let full_name = match (chat.first_name(), chat.last_name()) {
        (Some(first), Some(last)) => Some(format!("{first} {last}")),
        (Some(first), None) => Some(first.to_string()),
        (None, Some(last)) => Some(last.to_string()),
        (None, None) => None,
    };
    let title = chat
        .title()
        .map(str::to_string)
        .or(full_name)
        .or_else(|| chat.username().map(|u| format!("@{u}")))
        .unwrap_or_else(|| chat.id.0.to_string());

    Destination::new(chat.id.0)
        .with_kind(chat_kind(chat))
        .with_title(title)
}
