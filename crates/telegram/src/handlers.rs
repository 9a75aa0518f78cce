use {
    teloxide::{
        prelude::*,
        utils::command::{BotCommands, ParseError},
    },
    tracing::{debug, info},
};

use {
    herald_broadcast::{
        BroadcastMessage, BroadcastReport, DeliveryError, DenialReason, Error, PermanentReason,
    },
    herald_registry::{Destination, SubscribeOutcome, UnsubscribeOutcome},
};

use crate::{access::destination_for, state::BotState};

/// Failures listed in a broadcast summary before the rest are collapsed.
const MAX_LISTED_ISSUES: usize = 20;
/// Longest single line in a broadcast summary.
const MAX_ISSUE_CHARS: usize = 160;
/// Telegram rejects messages longer than this.
const MAX_MESSAGE_CHARS: usize = 4096;

#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase")]
pub enum Command {
    #[command(description = "show what this bot does")]
    Start,
    #[command(description = "show what this bot does")]
    Help,
    #[command(description = "add this group or channel to the broadcast list")]
    Subscribe,
    #[command(description = "remove this group or channel from the broadcast list")]
    Unsubscribe,
    #[command(description = "list subscribed chats (private chat only)")]
    List,
}

/// Handle one inbound message or channel post.
///
/// Commands are dispatched by name. Any other message in a private chat is
/// relayed to every subscribed chat.
pub async fn handle_message(msg: Message, state: &BotState) -> anyhow::Result<()> {
    if let Some(text) = msg.text()
        && text.starts_with('/')
    {
        let bot_name = state.bot_username.as_deref().unwrap_or_default();
        return match Command::parse(text, bot_name) {
            Ok(command) => handle_command(command, &msg, state).await,
            Err(ParseError::WrongBotName(name)) => {
                debug!(chat_id = msg.chat.id.0, bot = %name, "command addressed to another bot");
                Ok(())
            },
            Err(e) => {
                debug!(chat_id = msg.chat.id.0, error = %e, "ignoring unknown command");
                Ok(())
            },
        };
    }

    if msg.chat.is_private() {
        handle_broadcast(&msg, state).await
    } else {
        Ok(())
    }
}

async fn handle_command(command: Command, msg: &Message, state: &BotState) -> anyhow::Result<()> {
    let user_id = sender_id(msg);
    debug!(chat_id = msg.chat.id.0, user_id = ?user_id, ?command, "telegram command");

    let text = match command {
        Command::Start | Command::Help => {
            intro_text(!state.service.operators().is_open(), msg.chat.is_private())
        },
        Command::Subscribe => {
            let result = state
                .service
                .handle_subscribe(destination_for(&msg.chat), user_id)
                .await;
            subscribe_reply(&result)
        },
        Command::Unsubscribe => {
            let result = state
                .service
                .handle_unsubscribe(destination_for(&msg.chat), user_id)
                .await;
            unsubscribe_reply(&result)
        },
        Command::List => {
            if !msg.chat.is_private() {
                debug!(chat_id = msg.chat.id.0, "ignoring /list outside a private chat");
                return Ok(());
            }
            format_list(&state.service.handle_list().await)
        },
    };

    reply(state, msg.chat.id, text).await
}

async fn handle_broadcast(msg: &Message, state: &BotState) -> anyhow::Result<()> {
    let mut message = BroadcastMessage::new(msg.chat.id.0, msg.id.0);
    if let Some(text) = msg.text().or_else(|| msg.caption()) {
        message = message.with_text(text);
    }

    let result = state.service.handle_broadcast(sender_id(msg), &message).await;
    if let Ok(report) = &result {
        info!(
            chat_id = msg.chat.id.0,
            attempted = report.attempted,
            delivered = report.delivered,
            evicted = report.evicted,
            migrated = report.migrated,
            "broadcast handled"
        );
    }
    reply(state, msg.chat.id, broadcast_reply(&result)).await
}

async fn reply(state: &BotState, chat_id: ChatId, text: String) -> anyhow::Result<()> {
    state.bot.send_message(chat_id, text).await?;
    Ok(())
}

fn sender_id(msg: &Message) -> Option<u64> {
    msg.from.as_ref().map(|user| user.id.0)
}

fn intro_text(restricted: bool, private: bool) -> String {
    let mut lines = vec![
        "Hi! I relay announcements to every chat that subscribed via /subscribe.",
        "Use /subscribe or /unsubscribe inside a group/channel where I'm an admin.",
        "Send any non-command message here in a private chat to broadcast it everywhere.",
    ];
    if restricted {
        lines.push("Only authorized users can broadcast via DM.");
    }
    if !private {
        lines.push("For best results, DM me with /start for detailed help.");
    }
    lines.join("\n")
}

fn subscribe_reply(result: &herald_broadcast::Result<SubscribeOutcome>) -> String {
    match result {
        Ok(SubscribeOutcome::Added) => "Subscribed! I'll broadcast here.".into(),
        Ok(SubscribeOutcome::AlreadyPresent) => "Already subscribed.".into(),
        Err(Error::PrivateChat) => {
            "Use /subscribe inside a group, supergroup, or channel where I'm an admin.".into()
        },
        Err(e) => error_reply(e, "Only chat admins can subscribe me."),
    }
}

fn unsubscribe_reply(result: &herald_broadcast::Result<UnsubscribeOutcome>) -> String {
    match result {
        Ok(UnsubscribeOutcome::Removed) => "Removed from the broadcast list.".into(),
        Ok(UnsubscribeOutcome::NotPresent) => "This chat was not subscribed.".into(),
        Err(Error::PrivateChat) => {
            "Use /unsubscribe inside a group, supergroup, or channel to remove it.".into()
        },
        Err(e) => error_reply(e, "Only chat admins can unsubscribe me."),
    }
}

fn broadcast_reply(result: &herald_broadcast::Result<BroadcastReport>) -> String {
    match result {
        Ok(report) => format_report(report),
        Err(e) => error_reply(e, "Only chat admins can do that."),
    }
}

fn error_reply(error: &Error, not_admin: &str) -> String {
    match error {
        Error::AuthorizationDenied(DenialReason::NotAllowedOperator) => {
            "You're not allowed to broadcast with this bot.".into()
        },
        Error::AuthorizationDenied(DenialReason::NotChatAdmin | DenialReason::UnknownSender) => {
            not_admin.into()
        },
        Error::NoSubscribers => "No chats have subscribed yet. Use /subscribe first.".into(),
        Error::PrivateChat => "That only works in groups and channels.".into(),
        Error::Persistence(_) => {
            "Couldn't save the broadcast list. Nothing was changed, please try again.".into()
        },
    }
}

fn describe(destination: &Destination) -> String {
    match destination.kind {
        Some(kind) => format!("{} ({kind})", destination.display_name()),
        None => destination.display_name(),
    }
}

pub fn format_list(destinations: &[Destination]) -> String {
    if destinations.is_empty() {
        return "No chats subscribed yet.".into();
    }
    let lines: Vec<String> = destinations
        .iter()
        .enumerate()
        .map(|(idx, dest)| format!("{}. {}", idx + 1, describe(dest)))
        .collect();
    format!("Broadcast targets:\n{}", lines.join("\n"))
}

pub fn format_report(report: &BroadcastReport) -> String {
    let mut out = format!("Broadcast delivered to {} chat(s).", report.delivered);
    if report.failures.is_empty() {
        return out;
    }

    let applied = report.eviction_error.is_none();
    let mut issues: Vec<String> = report
        .failures
        .iter()
        .take(MAX_LISTED_ISSUES)
        .map(|failure| {
            let line = match &failure.error {
                DeliveryError::Permanent(PermanentReason::Migrated { .. }) if applied => format!(
                    "{} moved to a supergroup. Future broadcasts go to the new chat.",
                    describe(&failure.destination)
                ),
                DeliveryError::Permanent(_) if applied => format!(
                    "Lost access to {}. Removed from list.",
                    describe(&failure.destination)
                ),
                DeliveryError::Permanent(reason) => format!(
                    "Lost access to {} ({reason}).",
                    describe(&failure.destination)
                ),
                DeliveryError::Transient(reason) => {
                    format!("{}: {reason}", failure.destination.display_name())
                },
            };
            truncate(&line, MAX_ISSUE_CHARS)
        })
        .collect();
    if report.failures.len() > MAX_LISTED_ISSUES {
        issues.push(format!(
            "…and {} more.",
            report.failures.len() - MAX_LISTED_ISSUES
        ));
    }
    out.push_str("\nIssues:\n- ");
    out.push_str(&issues.join("\n- "));

    if let Some(error) = &report.eviction_error {
        out.push('\n');
        out.push_str(&truncate(
            &format!("Couldn't update the broadcast list, unreachable chats were kept: {error}"),
            MAX_ISSUE_CHARS,
        ));
    }
    truncate(&out, MAX_MESSAGE_CHARS)
}

/// Cut `text` to at most `max` chars, marking the cut with an ellipsis.
fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}
