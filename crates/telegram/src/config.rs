use std::{path::PathBuf, time::Duration};

use {
    herald_broadcast::{FanoutConfig, OperatorAllowlist},
    secrecy::Secret,
    tracing::warn,
};

/// Runtime configuration for the relay bot.
#[derive(Clone)]
pub struct BotConfig {
    /// Bot token from @BotFather.
    pub token: Secret<String>,

    /// Telegram user ids allowed to broadcast. Empty means anyone.
    pub allowed_user_ids: Vec<u64>,

    /// JSON file holding the subscribed chats.
    pub subscriptions_file: PathBuf,

    /// Upper bound for a single per-chat delivery (seconds).
    pub delivery_timeout_secs: u64,

    /// Deliveries in flight at once during a broadcast.
    pub fanout_concurrency: usize,
}

impl BotConfig {
    pub fn fanout_config(&self) -> FanoutConfig {
        FanoutConfig {
            delivery_timeout: Duration::from_secs(self.delivery_timeout_secs.max(1)),
            concurrency: self.fanout_concurrency.max(1),
        }
    }

    pub fn operator_allowlist(&self) -> OperatorAllowlist {
        OperatorAllowlist::new(self.allowed_user_ids.iter().copied())
    }
}

impl std::fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotConfig")
            .field("token", &"[REDACTED]")
            .field("allowed_user_ids", &self.allowed_user_ids)
            .field("subscriptions_file", &self.subscriptions_file)
            .finish_non_exhaustive()
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            token: Secret::new(String::new()),
            allowed_user_ids: Vec::new(),
            subscriptions_file: PathBuf::from("data/subscriptions.json"),
            delivery_timeout_secs: 15,
            fanout_concurrency: 4,
        }
    }
}

/// Parse a `,`/`;` separated list of user ids. Invalid entries are logged and
/// skipped.
pub fn parse_allowed_user_ids(raw: &str) -> Vec<u64> {
    let mut ids: Vec<u64> = raw
        .split([',', ';'])
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .filter_map(|token| match token.parse::<u64>() {
            Ok(id) => Some(id),
            Err(_) => {
                warn!(value = token, "ignoring invalid user id");
                None
            },
        })
        .collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}
