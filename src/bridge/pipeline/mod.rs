use super::BridgeContext;
use crate::decision::ProcessRequest;
use crate::dispatch::TaskHandler;
use crate::message::{ConversationId, Message};
use crate::reply::{DeliveryOutcome, ResolveRequest, deliver};
use crate::utils::now_ms;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// No reply channel could plausibly exist; the service was not called.
    NoChannel,
    /// The decision call failed or timed out. Not retried.
    ServiceFailed,
    /// The service chose not to answer.
    NoReply,
    Delivery(DeliveryOutcome),
}

/// Body of each dispatch task.
pub struct ReplyPipeline {
    ctx: Arc<BridgeContext>,
}

impl ReplyPipeline {
    pub fn new(ctx: Arc<BridgeContext>) -> Self {
        Self { ctx }
    }

    pub async fn run(&self, msg: Message) -> DispatchOutcome {
        let ctx = &self.ctx;
        let Some((kind, name)) = msg.conversation() else {
            return DispatchOutcome::NoChannel;
        };
        let id = ConversationId::new(kind, name);
        let probe = ResolveRequest {
            conversation_id: &id,
            display_name: Some(name),
            kind,
        };
        if !ctx.resolver.has_plausible_channel(&probe) {
            debug!("no reply channel for {}, decision call skipped", id);
            return DispatchOutcome::NoChannel;
        }

        let Some(request) = ProcessRequest::from_message(&msg, &ctx.device_id, now_ms()) else {
            return DispatchOutcome::NoChannel;
        };
        let response = match ctx.decision.process(&request).await {
            Ok(resp) => resp,
            Err(e) => {
                warn!(
                    "decision request {} for {} failed (retryable: {}): {}",
                    request.id,
                    id,
                    e.is_retryable(),
                    e
                );
                return DispatchOutcome::ServiceFailed;
            }
        };
        let Some(reply) = response.reply_text() else {
            debug!("no reply for {} ({})", id, request.id);
            return DispatchOutcome::NoReply;
        };

        let outcome = deliver(&ctx.resolver, &ctx.injector, &id, Some(name), kind, reply).await;
        DispatchOutcome::Delivery(outcome)
    }
}

#[async_trait]
impl TaskHandler<Message> for ReplyPipeline {
    async fn handle(&self, msg: Message) {
        let outcome = self.run(msg).await;
        debug!("dispatch finished: {:?}", outcome);
    }
}
