use crate::config::DedupConfig;
use crate::utils::now_ms;
use indexmap::IndexSet;
use std::sync::Mutex;
use tracing::debug;

/// Time-bucketed duplicate suppression.
///
/// A key is stored together with its bucket (`now / bucket_ms`), so the same
/// logical message delivered twice within one bucket is reported once. The set
/// is advisory: when it grows past `capacity` the oldest `evict_batch` entries
/// are dropped in insertion order.
pub struct DedupFilter {
    seen: Mutex<IndexSet<String>>,
    bucket_ms: i64,
    capacity: usize,
    evict_batch: usize,
}

impl DedupFilter {
    pub fn new(config: &DedupConfig) -> Self {
        Self {
            seen: Mutex::new(IndexSet::with_capacity(config.capacity + 1)),
            bucket_ms: config.bucket_ms.max(1) as i64,
            capacity: config.capacity.max(1),
            evict_batch: config.evict_batch.clamp(1, config.capacity.max(1)),
        }
    }

    pub fn is_duplicate(&self, key: &str) -> bool {
        self.is_duplicate_at(key, now_ms())
    }

    /// Returns true if `key` was already seen in the bucket containing `now_ms`;
    /// otherwise records it and returns false.
    pub fn is_duplicate_at(&self, key: &str, now_ms: i64) -> bool {
        let bucketed = format!("{}:{}", key, now_ms.div_euclid(self.bucket_ms));
        let mut seen = self
            .seen
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if seen.contains(&bucketed) {
            debug!("duplicate delivery suppressed: {}", bucketed);
            return true;
        }
        seen.insert(bucketed);
        if seen.len() > self.capacity {
            let evict = self.evict_batch.min(seen.len());
            seen.drain(..evict);
        }
        false
    }

    pub fn len(&self) -> usize {
        self.seen
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
