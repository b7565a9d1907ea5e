use crate::activity::{ActivityLog, Direction};
use crate::host::{ReplyPayload, ReplySender};
use crate::message::{ConversationId, Message, ReplyCapability};
use crate::utils::now_ms;
use std::sync::Arc;
use tracing::warn;

pub struct ReplyInjector {
    sender: Arc<dyn ReplySender>,
    activity: Arc<ActivityLog>,
    bot_name: String,
}

impl ReplyInjector {
    pub fn new(sender: Arc<dyn ReplySender>, activity: Arc<ActivityLog>, bot_name: &str) -> Self {
        Self {
            sender,
            activity,
            bot_name: bot_name.to_string(),
        }
    }

    /// Submit `text` through `capability`. `false` on any send error,
    /// including a capability that died since it was resolved.
    pub async fn inject(
        &self,
        conversation: &ConversationId,
        capability: &ReplyCapability,
        text: &str,
    ) -> bool {
        let payload = ReplyPayload::new(capability, text);
        if let Err(e) = self.sender.send(capability, &payload).await {
            warn!("reply injection into {} failed: {:#}", conversation, e);
            return false;
        }
        self.activity.record(
            Direction::Outbound,
            Message::bot_reply(conversation, &self.bot_name, text, now_ms()),
        );
        true
    }
}
