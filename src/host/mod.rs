//! Contracts for the host collaborators and the adapters that implement them.
//!
//! The bridge never talks to a concrete chat app. It sees the host through
//! three seams: [`NotificationHost`] (live notification enumeration),
//! [`ReplySender`] (the one-shot send primitive) and [`Alarm`] (wall-clock
//! one-shot timer).

pub mod alarm;
pub mod board;
pub mod webhook;

use crate::message::ReplyCapability;
use anyhow::Result;
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use alarm::TokioAlarm;
pub use board::NotificationBoard;
pub use webhook::WebhookReplySender;

/// A notification currently visible on the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveNotification {
    pub package_id: String,
    pub title: String,
    pub sub_text: String,
    pub is_group: bool,
    pub capability: Option<ReplyCapability>,
}

pub trait NotificationHost: Send + Sync {
    fn active_notifications(&self) -> Vec<LiveNotification>;
}

/// Result bundle handed to the host, keyed by the capability's input key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyPayload {
    pub results: BTreeMap<String, String>,
}

impl ReplyPayload {
    pub fn new(capability: &ReplyCapability, text: &str) -> Self {
        let mut results = BTreeMap::new();
        results.insert(capability.key.clone(), text.to_string());
        Self { results }
    }
}

#[async_trait]
pub trait ReplySender: Send + Sync {
    async fn send(&self, capability: &ReplyCapability, payload: &ReplyPayload) -> Result<()>;
}

pub type AlarmCallback = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

pub trait Alarm: Send + Sync {
    /// Arm a single firing at `at_ms` (epoch millis), replacing any pending one.
    fn arm_once(&self, at_ms: i64, callback: AlarmCallback);
    fn cancel(&self);
}

#[cfg(test)]
mod tests;
