//! The explicitly-owned service context and the inbound event path.

pub mod pipeline;

use crate::activity::{ActivityLog, Direction};
use crate::allowlist::AllowlistGate;
use crate::classifier::classify;
use crate::config::Config;
use crate::context::ChatContextStore;
use crate::decision::DecisionService;
use crate::dedup::DedupFilter;
use crate::dispatch::DispatchQueue;
use crate::host::{NotificationHost, ReplySender};
use crate::message::{Message, MessageBody, RawEvent};
use crate::reply::{ReplyChannelCache, ReplyInjector, Resolver};
use crate::storage::KvStore;
use std::sync::Arc;
use tracing::{debug, error};

pub use pipeline::{DispatchOutcome, ReplyPipeline};

/// External collaborators the bridge is wired to.
pub struct Collaborators {
    pub host: Arc<dyn NotificationHost>,
    pub sender: Arc<dyn ReplySender>,
    pub decision: Arc<dyn DecisionService>,
    pub kv: Arc<dyn KvStore>,
    pub gate: Arc<AllowlistGate>,
}

/// Every shared component, constructed once and handed to each stage.
pub struct BridgeContext {
    pub package_id: String,
    pub device_id: String,
    pub dedup: DedupFilter,
    pub gate: Arc<AllowlistGate>,
    pub contexts: Arc<ChatContextStore>,
    pub cache: Arc<ReplyChannelCache>,
    pub resolver: Resolver,
    pub injector: ReplyInjector,
    pub decision: Arc<dyn DecisionService>,
    pub activity: Arc<ActivityLog>,
}

impl BridgeContext {
    pub fn new(config: &Config, c: Collaborators) -> Self {
        let cache = Arc::new(ReplyChannelCache::new(config.reply_cache.capacity));
        let contexts = Arc::new(ChatContextStore::new(c.kv, config.storage.retention));
        let activity = Arc::new(ActivityLog::new(config.activity_capacity));
        let resolver = Resolver::standard(
            cache.clone(),
            c.host,
            &config.host.package_id,
            contexts.clone(),
        );
        let injector = ReplyInjector::new(c.sender, activity.clone(), &config.host.bot_name);
        Self {
            package_id: config.host.package_id.clone(),
            device_id: config.service.device_id.clone(),
            dedup: DedupFilter::new(&config.dedup),
            gate: c.gate,
            contexts,
            cache,
            resolver,
            injector,
            decision: c.decision,
            activity,
        }
    }
}

/// What the event path did with one raw event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// Event from a package other than the observed chat app.
    OtherPackage,
    /// No classifier rule matched.
    Unclassified,
    /// Unread-count summary; never forwarded.
    Unread,
    Duplicate,
    NotAllowed,
    Enqueued,
    /// The dispatch queue has been shut down.
    Rejected,
}

impl EventOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OtherPackage => "other_package",
            Self::Unclassified => "unclassified",
            Self::Unread => "unread",
            Self::Duplicate => "duplicate",
            Self::NotAllowed => "not_allowed",
            Self::Enqueued => "enqueued",
            Self::Rejected => "rejected",
        }
    }
}

#[derive(Clone)]
pub struct Bridge {
    ctx: Arc<BridgeContext>,
    queue: DispatchQueue<Message>,
}

impl Bridge {
    pub fn new(ctx: Arc<BridgeContext>, concurrency: usize) -> Self {
        let pipeline = Arc::new(ReplyPipeline::new(ctx.clone()));
        Self {
            queue: DispatchQueue::new(concurrency, pipeline),
            ctx,
        }
    }

    pub fn context(&self) -> &Arc<BridgeContext> {
        &self.ctx
    }

    pub fn queue(&self) -> &DispatchQueue<Message> {
        &self.queue
    }

    /// Synchronous part of event handling; ends with an enqueue at most.
    pub fn on_event(&self, event: &RawEvent) -> EventOutcome {
        let ctx = &self.ctx;
        if event.package_id != ctx.package_id {
            return EventOutcome::OtherPackage;
        }

        let Some(msg) = classify(event) else {
            debug!("unrecognized event shape from '{}', dropped", event.title);
            return EventOutcome::Unclassified;
        };
        if let MessageBody::Unread { info } = &msg.body {
            debug!("unread summary dropped: {}", info);
            return EventOutcome::Unread;
        }

        if let Some(key) = msg.dedup_key()
            && ctx.dedup.is_duplicate(&key)
        {
            debug!("duplicate delivery suppressed: {}", key);
            return EventOutcome::Duplicate;
        }

        self.capture_capability(event, &msg);
        ctx.activity.record(Direction::Inbound, msg.clone());

        if !ctx.gate.should_forward(&msg) {
            debug!(
                "{} not on allowlist, not forwarded",
                msg.conversation_id().map(|c| c.to_string()).unwrap_or_default()
            );
            return EventOutcome::NotAllowed;
        }

        if self.queue.enqueue(msg) {
            EventOutcome::Enqueued
        } else {
            EventOutcome::Rejected
        }
    }

    /// Remember the event's reply capability even if the message is not
    /// forwarded; scheduled messages may need it later.
    fn capture_capability(&self, event: &RawEvent, msg: &Message) {
        let (Some((kind, name)), Some(sender)) = (msg.conversation(), msg.sender()) else {
            return;
        };
        let id = crate::message::ConversationId::new(kind, name);
        if let Some(capability) = &event.capability {
            self.ctx.cache.put(id.clone(), capability.clone());
        }
        let key = event.capability.as_ref().map(|c| c.key.as_str());
        if let Err(e) = self.ctx.contexts.record_message(kind, name, sender, key) {
            error!("failed to update chat context {}: {}", id, e);
        }
    }

    pub fn shutdown(&self) {
        self.queue.shutdown();
    }
}
