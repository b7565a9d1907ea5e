use crate::message::{ConversationId, ReplyCapability};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;

/// Bounded map of conversation id to its most recent capability.
///
/// Reads use `peek`, so eviction follows insertion order rather than access.
pub struct ReplyChannelCache {
    entries: Mutex<LruCache<ConversationId, ReplyCapability>>,
}

impl ReplyChannelCache {
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(cap)),
        }
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, LruCache<ConversationId, ReplyCapability>> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub fn get(&self, id: &ConversationId) -> Option<ReplyCapability> {
        self.entries().peek(id).cloned()
    }

    pub fn put(&self, id: ConversationId, capability: ReplyCapability) {
        self.entries().push(id, capability);
    }

    pub fn contains(&self, id: &ConversationId) -> bool {
        self.entries().contains(id)
    }

    pub fn remove(&self, id: &ConversationId) -> Option<ReplyCapability> {
        self.entries().pop(id)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}
