use std::{sync::Arc, time::Duration};

use {
    secrecy::ExposeSecret,
    teloxide::{
        ApiError, RequestError,
        prelude::*,
        types::{AllowedUpdate, UpdateKind},
        utils::command::BotCommands,
    },
    tokio::task::JoinHandle,
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
};

use herald_broadcast::BroadcastService;

use crate::{
    Error, Result,
    config::BotConfig,
    handlers::{self, Command},
    state::BotState,
};

/// Long-poll timeout passed to `getUpdates`, in seconds.
const POLL_TIMEOUT_SECS: u32 = 30;
const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Build a bot whose HTTP client outlives the long-poll timeout.
pub fn build_bot(config: &BotConfig) -> Result<Bot> {
    let token = config.token.expose_secret();
    if token.trim().is_empty() {
        return Err(Error::message("telegram bot token is empty"));
    }
    let client = teloxide::net::default_reqwest_settings()
        .timeout(Duration::from_secs(u64::from(POLL_TIMEOUT_SECS) + 15))
        .build()?;
    Ok(Bot::with_client(token, client))
}

/// Connect and start the polling loop.
///
/// Returns the token that stops the loop and the loop's task handle.
pub async fn start_polling(
    bot: Bot,
    service: Arc<BroadcastService>,
) -> Result<(CancellationToken, JoinHandle<()>)> {
    let me = bot.get_me().await?;
    let bot_username = me.username.clone();

    // Long polling does not work while a webhook is set.
    bot.delete_webhook().send().await?;

    if let Err(e) = bot.set_my_commands(Command::bot_commands()).await {
        warn!(error = %e, "failed to register bot commands");
    }

    info!(username = ?bot_username, "telegram bot connected (webhook cleared)");

    let cancel = CancellationToken::new();
    let state = BotState {
        bot,
        bot_username,
        service,
    };
    let handle = tokio::spawn(poll_loop(state, cancel.clone()));
    Ok((cancel, handle))
}

async fn poll_loop(state: BotState, cancel: CancellationToken) {
    info!("starting telegram polling loop");
    let mut offset: i32 = 0;

    loop {
        let result = tokio::select! {
            _ = cancel.cancelled() => {
                info!("telegram polling stopped");
                break;
            },
            result = state
                .bot
                .get_updates()
                .offset(offset)
                .timeout(POLL_TIMEOUT_SECS)
                .allowed_updates(vec![AllowedUpdate::Message, AllowedUpdate::ChannelPost])
                .send() => result,
        };

        match result {
            Ok(updates) => {
                debug!(count = updates.len(), "got telegram updates");
                for update in updates {
                    offset = update.id.as_offset();
                    match update.kind {
                        UpdateKind::Message(msg) | UpdateKind::ChannelPost(msg) => {
                            let state = state.clone();
                            // A broadcast can take a while; keep other chats responsive.
                            tokio::spawn(async move {
                                let chat_id = msg.chat.id.0;
                                if let Err(e) = handlers::handle_message(msg, &state).await {
                                    error!(chat_id, error = %e, "error handling telegram message");
                                }
                            });
                        },
                        other => {
                            debug!("ignoring non-message update: {other:?}");
                        },
                    }
                }
            },
            Err(RequestError::Api(ApiError::TerminatedByOtherGetUpdates)) => {
                warn!(
                    "telegram polling disabled: another instance is already running with this token"
                );
                cancel.cancel();
                break;
            },
            Err(e) => {
                warn!(error = %e, "telegram getUpdates failed");
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(RETRY_DELAY) => {},
                }
            },
        }
    }
}
