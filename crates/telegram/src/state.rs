use std::sync::Arc;

use herald_broadcast::BroadcastService;

/// Runtime state shared by every update task.
#[derive(Clone)]
pub struct BotState {
    pub bot: teloxide::Bot,
    /// Used to accept `/command@this_bot` in groups.
    pub bot_username: Option<String>,
    pub service: Arc<BroadcastService>,
}
