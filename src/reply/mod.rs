//! Reply-channel resolution and one-shot injection.

pub mod cache;
pub mod injector;
pub mod resolver;

use crate::message::{ConversationId, ConversationKind};
use tracing::{info, warn};

pub use cache::ReplyChannelCache;
pub use injector::ReplyInjector;
pub use resolver::{CacheTier, DurableTier, LiveTier, ResolveRequest, ResolveTier, Resolver};

/// Result of trying to get a reply into a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Sent through a capability found by the named tier.
    Delivered { tier: &'static str },
    /// No tier produced a capability; the reply is lost.
    NoChannel,
    /// A capability was found but the send failed (usually expiry).
    InjectionFailed { tier: &'static str },
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }
}

/// Resolve a channel for `conversation_id` and inject `text` through it.
pub async fn deliver(
    resolver: &Resolver,
    injector: &ReplyInjector,
    conversation_id: &ConversationId,
    display_name: Option<&str>,
    kind: ConversationKind,
    text: &str,
) -> DeliveryOutcome {
    let request = ResolveRequest {
        conversation_id,
        display_name,
        kind,
    };
    let Some((capability, tier)) = resolver.resolve(&request) else {
        warn!("no reply channel for {}, reply dropped", conversation_id);
        return DeliveryOutcome::NoChannel;
    };
    if injector.inject(conversation_id, &capability, text).await {
        info!("reply delivered to {} via {} tier", conversation_id, tier);
        DeliveryOutcome::Delivered { tier }
    } else {
        DeliveryOutcome::InjectionFailed { tier }
    }
}
