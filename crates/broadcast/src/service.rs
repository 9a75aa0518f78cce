//! Command surface consumed by the transport's dispatcher.

use std::sync::Arc;

use {
    herald_registry::{
        ChatKind, Destination, SubscribeOutcome, SubscriberRegistry, UnsubscribeOutcome,
    },
    tracing::{info, warn},
};

use crate::{
    Error, Result,
    access::{AdminCheck, DenialReason, OperatorAllowlist, is_chat_admin},
    delivery::{BroadcastMessage, Deliver},
    fanout::{BroadcastReport, FanoutConfig, FanoutEngine},
};

pub struct BroadcastService {
    registry: Arc<SubscriberRegistry>,
    fanout: FanoutEngine,
    operators: OperatorAllowlist,
    admin_check: Arc<dyn AdminCheck>,
}

impl BroadcastService {
    pub fn new(
        registry: Arc<SubscriberRegistry>,
        delivery: Arc<dyn Deliver>,
        admin_check: Arc<dyn AdminCheck>,
        operators: OperatorAllowlist,
        fanout_config: FanoutConfig,
    ) -> Self {
        let fanout = FanoutEngine::new(Arc::clone(&registry), delivery, fanout_config);
        Self {
            registry,
            fanout,
            operators,
            admin_check,
        }
    }

    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.registry
    }

    pub fn operators(&self) -> &OperatorAllowlist {
        &self.operators
    }

    /// Opt `chat` in. `user_id` is whoever issued the command.
    pub async fn handle_subscribe(
        &self,
        chat: Destination,
        user_id: Option<u64>,
    ) -> Result<SubscribeOutcome> {
        self.authorize_chat_change(&chat, user_id).await?;
        let id = chat.id;
        let outcome = self.registry.subscribe(chat).await?;
        info!(chat_id = %id, user_id = ?user_id, ?outcome, "subscribe handled");
        Ok(outcome)
    }

    pub async fn handle_unsubscribe(
        &self,
        chat: Destination,
        user_id: Option<u64>,
    ) -> Result<UnsubscribeOutcome> {
        self.authorize_chat_change(&chat, user_id).await?;
        let outcome = self.registry.unsubscribe(chat.id).await?;
        info!(chat_id = %chat.id, user_id = ?user_id, ?outcome, "unsubscribe handled");
        Ok(outcome)
    }

    pub async fn handle_list(&self) -> Vec<Destination> {
        self.registry.list().await
    }

    /// Relay `message` to every subscribed chat if `operator` may broadcast.
    pub async fn handle_broadcast(
        &self,
        operator: Option<u64>,
        message: &BroadcastMessage,
    ) -> Result<BroadcastReport> {
        if !self.operators.permits(operator) {
            warn!(user_id = ?operator, "broadcast refused: not an allowed operator");
            return Err(Error::denied(DenialReason::NotAllowedOperator));
        }

        let snapshot = self.registry.list().await;
        if snapshot.is_empty() {
            return Err(Error::NoSubscribers);
        }
        info!(
            user_id = ?operator,
            targets = snapshot.len(),
            preview = ?message.text.as_deref().map(preview),
            "broadcast started"
        );
        Ok(self.fanout.broadcast(message, &snapshot).await)
    }

    /// Only chat admins may opt a chat in or out. Anything posted inside a
    /// channel already comes from one of its admins, so channels skip the
    /// lookup.
    async fn authorize_chat_change(&self, chat: &Destination, user_id: Option<u64>) -> Result<()> {
        match chat.kind {
            Some(ChatKind::Private) => return Err(Error::PrivateChat),
            Some(ChatKind::Channel) => return Ok(()),
            _ => {},
        }
        let Some(user_id) = user_id else {
            warn!(chat_id = %chat.id, "chat change refused: no sender");
            return Err(Error::denied(DenialReason::UnknownSender));
        };
        if is_chat_admin(self.admin_check.as_ref(), chat.id, user_id).await {
            Ok(())
        } else {
            warn!(chat_id = %chat.id, user_id, "chat change refused: not a chat admin");
            Err(Error::denied(DenialReason::NotChatAdmin))
        }
    }
}

fn preview(text: &str) -> String {
    const MAX_CHARS: usize = 40;
    let mut out: String = text.chars().take(MAX_CHARS).collect();
    if text.chars().count() > MAX_CHARS {
        out.push('…');
    }
    out
}
