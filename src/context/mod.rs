//! Durable per-conversation metadata with a write-through memory cache.

use crate::config::RetentionPolicy;
use crate::errors::BridgeError;
use crate::message::{ConversationId, ConversationKind};
use crate::storage::KvStore;
use crate::utils::now_ms;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

const KEY_PREFIX: &str = "chat_context:";
const DAY_MS: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatContext {
    pub conversation_id: ConversationId,
    pub kind: ConversationKind,
    pub display_name: String,
    pub last_sender: String,
    /// Key of the most recent reply capability seen for this conversation.
    pub remote_input_key: Option<String>,
    pub last_update_time: i64,
    pub is_active: bool,
}

impl ChatContext {
    pub fn new(kind: ConversationKind, display_name: &str, last_sender: &str, now_ms: i64) -> Self {
        Self {
            conversation_id: ConversationId::new(kind, display_name),
            kind,
            display_name: display_name.to_string(),
            last_sender: last_sender.to_string(),
            remote_input_key: None,
            last_update_time: now_ms,
            is_active: true,
        }
    }
}

pub struct ChatContextStore {
    kv: Arc<dyn KvStore>,
    cache: Mutex<HashMap<ConversationId, ChatContext>>,
    retention: RetentionPolicy,
}

fn storage_err(op: &str, e: impl std::fmt::Display) -> BridgeError {
    BridgeError::Storage(format!("{}: {}", op, e))
}

impl ChatContextStore {
    pub fn new(kv: Arc<dyn KvStore>, retention: RetentionPolicy) -> Self {
        Self {
            kv,
            cache: Mutex::new(HashMap::new()),
            retention,
        }
    }

    fn key(id: &ConversationId) -> String {
        format!("{}{}", KEY_PREFIX, id)
    }

    fn cache(&self) -> std::sync::MutexGuard<'_, HashMap<ConversationId, ChatContext>> {
        self.cache
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Memory first, then the durable store (populating memory on a hit).
    pub fn get(&self, id: &ConversationId) -> Result<Option<ChatContext>, BridgeError> {
        if let Some(ctx) = self.cache().get(id) {
            return Ok(Some(ctx.clone()));
        }
        let Some(raw) = self
            .kv
            .get(&Self::key(id))
            .map_err(|e| storage_err("read chat context", e))?
        else {
            return Ok(None);
        };
        let ctx: ChatContext = serde_json::from_str(&raw)
            .map_err(|e| storage_err("decode chat context", e))?;
        self.cache().insert(id.clone(), ctx.clone());
        Ok(Some(ctx))
    }

    /// Durable write-through, then cache. Last write wins.
    pub fn save(&self, ctx: &ChatContext) -> Result<(), BridgeError> {
        let raw =
            serde_json::to_string(ctx).map_err(|e| storage_err("encode chat context", e))?;
        self.kv
            .put(&Self::key(&ctx.conversation_id), &raw)
            .map_err(|e| storage_err("write chat context", e))?;
        self.cache()
            .insert(ctx.conversation_id.clone(), ctx.clone());
        Ok(())
    }

    /// Save with `last_update_time` refreshed to now.
    pub fn update(&self, mut ctx: ChatContext) -> Result<ChatContext, BridgeError> {
        ctx.last_update_time = now_ms();
        self.save(&ctx)?;
        Ok(ctx)
    }

    /// Refresh the context for an inbound message.
    ///
    /// A context is only created when the message carried a reply capability;
    /// otherwise an unknown conversation yields `None`.
    pub fn record_message(
        &self,
        kind: ConversationKind,
        display_name: &str,
        sender: &str,
        remote_input_key: Option<&str>,
    ) -> Result<Option<ChatContext>, BridgeError> {
        let id = ConversationId::new(kind, display_name);
        let mut ctx = match (self.get(&id)?, remote_input_key) {
            (Some(existing), _) => existing,
            (None, Some(_)) => {
                debug!("new chat context {}", id);
                ChatContext::new(kind, display_name, sender, now_ms())
            }
            (None, None) => return Ok(None),
        };
        ctx.last_sender = sender.to_string();
        ctx.is_active = true;
        if let Some(key) = remote_input_key {
            ctx.remote_input_key = Some(key.to_string());
        }
        self.update(ctx).map(Some)
    }

    /// Soft delete: the record stays, flagged inactive.
    pub fn deactivate(&self, id: &ConversationId) -> Result<bool, BridgeError> {
        let Some(mut ctx) = self.get(id)? else {
            return Ok(false);
        };
        ctx.is_active = false;
        self.save(&ctx)?;
        Ok(true)
    }

    /// Every stored context, most recently updated first.
    pub fn list_all(&self) -> Result<Vec<ChatContext>, BridgeError> {
        let rows = self
            .kv
            .scan_prefix(KEY_PREFIX)
            .map_err(|e| storage_err("scan chat contexts", e))?;
        let mut contexts: Vec<ChatContext> = rows
            .into_iter()
            .filter_map(|(key, raw)| match serde_json::from_str(&raw) {
                Ok(ctx) => Some(ctx),
                Err(e) => {
                    warn!("skipping undecodable chat context {}: {}", key, e);
                    None
                }
            })
            .collect();
        contexts.sort_by(|a, b| b.last_update_time.cmp(&a.last_update_time));
        Ok(contexts)
    }

    pub fn list_active(&self) -> Result<Vec<ChatContext>, BridgeError> {
        let mut contexts = self.list_all()?;
        contexts.retain(|c| c.is_active);
        Ok(contexts)
    }

    /// Remove contexts older than the retention window. A no-op under
    /// [`RetentionPolicy::Infinite`].
    pub fn cleanup(&self, now_ms: i64) -> Result<usize, BridgeError> {
        let RetentionPolicy::MaxAge { days } = self.retention else {
            return Ok(0);
        };
        let cutoff = now_ms - i64::from(days) * DAY_MS;
        let mut removed = 0;
        for ctx in self.list_all()? {
            if ctx.last_update_time < cutoff {
                self.kv
                    .delete(&Self::key(&ctx.conversation_id))
                    .map_err(|e| storage_err("delete chat context", e))?;
                self.cache().remove(&ctx.conversation_id);
                removed += 1;
            }
        }
        if removed > 0 {
            info!("removed {} chat contexts older than {} days", removed, days);
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests;
