use super::ReplyChannelCache;
use crate::context::ChatContextStore;
use crate::host::{LiveNotification, NotificationHost};
use crate::message::{ConversationId, ConversationKind, ReplyCapability};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy)]
pub struct ResolveRequest<'a> {
    pub conversation_id: &'a ConversationId,
    /// Absent when the caller only knows the id (scheduled pulls).
    pub display_name: Option<&'a str>,
    pub kind: ConversationKind,
}

/// One strategy in the resolver's ordered fallback chain.
pub trait ResolveTier: Send + Sync {
    fn name(&self) -> &'static str;

    fn resolve(&self, request: &ResolveRequest<'_>) -> Option<ReplyCapability>;

    /// Cheap check that this tier could plausibly produce a capability.
    /// Must not mutate any state.
    fn has_candidate(&self, request: &ResolveRequest<'_>) -> bool;
}

pub struct CacheTier {
    cache: Arc<ReplyChannelCache>,
}

impl CacheTier {
    pub fn new(cache: Arc<ReplyChannelCache>) -> Self {
        Self { cache }
    }
}

impl ResolveTier for CacheTier {
    fn name(&self) -> &'static str {
        "cache"
    }

    fn resolve(&self, request: &ResolveRequest<'_>) -> Option<ReplyCapability> {
        self.cache.get(request.conversation_id)
    }

    fn has_candidate(&self, request: &ResolveRequest<'_>) -> bool {
        self.cache.contains(request.conversation_id)
    }
}

/// Scans the host's visible notifications for a matching conversation.
pub struct LiveTier {
    host: Arc<dyn NotificationHost>,
    package_id: String,
    cache: Arc<ReplyChannelCache>,
}

impl LiveTier {
    pub fn new(
        host: Arc<dyn NotificationHost>,
        package_id: impl Into<String>,
        cache: Arc<ReplyChannelCache>,
    ) -> Self {
        Self {
            host,
            package_id: package_id.into(),
            cache,
        }
    }

    fn matches(&self, n: &LiveNotification, kind: ConversationKind, display_name: &str) -> bool {
        if n.package_id != self.package_id {
            return false;
        }
        match kind {
            ConversationKind::Group => n.is_group && n.sub_text == display_name,
            ConversationKind::Personal => !n.is_group && n.title == display_name,
        }
    }

    fn find(&self, kind: ConversationKind, display_name: &str) -> Option<ReplyCapability> {
        self.host
            .active_notifications()
            .into_iter()
            .filter(|n| self.matches(n, kind, display_name))
            .find_map(|n| n.capability)
    }

    /// Look up `display_name` live and promote a hit into the cache.
    pub fn lookup(
        &self,
        conversation_id: &ConversationId,
        kind: ConversationKind,
        display_name: &str,
    ) -> Option<ReplyCapability> {
        let capability = self.find(kind, display_name)?;
        self.cache.put(conversation_id.clone(), capability.clone());
        debug!("promoted live capability for {} into cache", conversation_id);
        Some(capability)
    }

    fn has_live(&self, kind: ConversationKind, display_name: &str) -> bool {
        self.host
            .active_notifications()
            .iter()
            .any(|n| self.matches(n, kind, display_name) && n.capability.is_some())
    }
}

impl ResolveTier for LiveTier {
    fn name(&self) -> &'static str {
        "live"
    }

    fn resolve(&self, request: &ResolveRequest<'_>) -> Option<ReplyCapability> {
        let name = request.display_name?;
        self.lookup(request.conversation_id, request.kind, name)
    }

    fn has_candidate(&self, request: &ResolveRequest<'_>) -> bool {
        request
            .display_name
            .is_some_and(|name| self.has_live(request.kind, name))
    }
}

/// Recovers the display name from the chat context store, then retries live.
pub struct DurableTier {
    contexts: Arc<ChatContextStore>,
    live: Arc<LiveTier>,
}

impl DurableTier {
    pub fn new(contexts: Arc<ChatContextStore>, live: Arc<LiveTier>) -> Self {
        Self { contexts, live }
    }
}

impl ResolveTier for DurableTier {
    fn name(&self) -> &'static str {
        "durable"
    }

    fn resolve(&self, request: &ResolveRequest<'_>) -> Option<ReplyCapability> {
        let ctx = match self.contexts.get(request.conversation_id) {
            Ok(Some(ctx)) => ctx,
            Ok(None) => return None,
            Err(e) => {
                warn!("chat context lookup for {} failed: {}", request.conversation_id, e);
                return None;
            }
        };
        self.live
            .lookup(request.conversation_id, ctx.kind, &ctx.display_name)
    }

    fn has_candidate(&self, request: &ResolveRequest<'_>) -> bool {
        matches!(
            self.contexts.get(request.conversation_id),
            Ok(Some(ctx)) if ctx.remote_input_key.is_some()
        )
    }
}

/// Ordered tier chain; the first tier that yields a capability wins.
pub struct Resolver {
    tiers: Vec<Arc<dyn ResolveTier>>,
}

impl Resolver {
    pub fn new(tiers: Vec<Arc<dyn ResolveTier>>) -> Self {
        Self { tiers }
    }

    /// Cache, then live host enumeration, then the durable store.
    pub fn standard(
        cache: Arc<ReplyChannelCache>,
        host: Arc<dyn NotificationHost>,
        package_id: &str,
        contexts: Arc<ChatContextStore>,
    ) -> Self {
        let live = Arc::new(LiveTier::new(host, package_id, cache.clone()));
        Self::new(vec![
            Arc::new(CacheTier::new(cache)),
            live.clone(),
            Arc::new(DurableTier::new(contexts, live)),
        ])
    }

    pub fn resolve(&self, request: &ResolveRequest<'_>) -> Option<(ReplyCapability, &'static str)> {
        for tier in &self.tiers {
            if let Some(capability) = tier.resolve(request) {
                debug!("{} resolved by {} tier", request.conversation_id, tier.name());
                return Some((capability, tier.name()));
            }
        }
        None
    }

    pub fn has_plausible_channel(&self, request: &ResolveRequest<'_>) -> bool {
        self.tiers.iter().any(|t| t.has_candidate(request))
    }
}
