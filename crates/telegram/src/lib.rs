//! Telegram transport for the broadcast relay.
//!
//! Receives updates with teloxide, turns commands and private messages into
//! calls on [`herald_broadcast::BroadcastService`], and implements the
//! delivery and admin-check collaborators on top of the Bot API.

pub mod access;
pub mod bot;
pub mod config;
pub mod error;
pub mod handlers;
pub mod outbound;
pub mod state;

#[cfg(test)]
mod testing;

pub use {
    access::TelegramAdminCheck,
    bot::{build_bot, start_polling},
    config::{BotConfig, parse_allowed_user_ids},
    error::{Error, Result},
    outbound::TelegramDelivery,
    state::BotState,
};
