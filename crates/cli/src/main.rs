use std::{path::PathBuf, sync::Arc};

use {
    anyhow::Context,
    clap::Parser,
    herald_broadcast::BroadcastService,
    herald_registry::{FileStore, SubscriberRegistry},
    herald_telegram::{
        BotConfig, TelegramAdminCheck, TelegramDelivery, build_bot, parse_allowed_user_ids,
        start_polling,
    },
    secrecy::Secret,
    tracing::{info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "herald", version, about = "Herald: Telegram broadcast relay")]
struct Cli {
    /// Bot token from @BotFather.
    #[arg(long, env = "TELEGRAM_BOT_TOKEN", hide_env_values = true)]
    token: String,

    /// Comma or semicolon separated user ids allowed to broadcast. Empty lets
    /// anyone who DMs the bot broadcast.
    #[arg(long, env = "TELEGRAM_ALLOWED_USER_IDS", default_value = "")]
    allowed_user_ids: String,

    /// JSON file holding the subscribed chats.
    #[arg(long, env = "SUBSCRIPTIONS_FILE", default_value = "data/subscriptions.json")]
    subscriptions_file: PathBuf,

    /// Upper bound for a single per-chat delivery, in seconds.
    #[arg(long, default_value_t = 15)]
    delivery_timeout_secs: u64,

    /// Deliveries in flight at once during a broadcast.
    #[arg(long, default_value_t = 4)]
    fanout_concurrency: usize,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, default_value_t = false)]
    json_logs: bool,
}

impl Cli {
    fn bot_config(&self) -> BotConfig {
        BotConfig {
            token: Secret::new(self.token.clone()),
            allowed_user_ids: parse_allowed_user_ids(&self.allowed_user_ids),
            subscriptions_file: self.subscriptions_file.clone(),
            delivery_timeout_secs: self.delivery_timeout_secs,
            fanout_concurrency: self.fanout_concurrency,
        }
    }
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "herald starting");

    let config = cli.bot_config();
    if config.allowed_user_ids.is_empty() {
        warn!("no TELEGRAM_ALLOWED_USER_IDS set, anyone who DMs the bot can broadcast");
    } else {
        info!(user_ids = ?config.allowed_user_ids, "broadcast restricted to telegram user ids");
    }

    let store = Arc::new(FileStore::new(&config.subscriptions_file));
    let registry = SubscriberRegistry::open(store).await.with_context(|| {
        format!(
            "failed to load subscriptions from {}",
            config.subscriptions_file.display()
        )
    })?;
    info!(
        path = %config.subscriptions_file.display(),
        chats = registry.len().await,
        "subscriptions loaded"
    );

    let bot = build_bot(&config)?;
    let service = Arc::new(BroadcastService::new(
        Arc::new(registry),
        Arc::new(TelegramDelivery::new(bot.clone())),
        Arc::new(TelegramAdminCheck::new(bot.clone())),
        config.operator_allowlist(),
        config.fanout_config(),
    ));

    let (cancel, polling) = start_polling(bot, service).await?;
    info!("bot is running, press Ctrl+C to stop");

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for ctrl-c")?;
            info!("shutdown requested");
        },
        () = cancel.cancelled() => {
            warn!("telegram polling stopped on its own");
        },
    }
    cancel.cancel();
    polling.await?;
    info!("herald stopped");
    Ok(())
}
