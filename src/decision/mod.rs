//! Client side of the external decision service.

pub mod http;

use crate::errors::BridgeError;
use crate::message::Message;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use http::HttpDecisionService;

const REQUEST_ID_SUFFIX_LEN: usize = 9;

/// `msg_<timestamp>_<random>`.
pub fn request_id(now_ms: i64) -> String {
    let suffix: String = std::iter::repeat_with(fastrand::alphanumeric)
        .take(REQUEST_ID_SUFFIX_LEN)
        .collect::<String>()
        .to_lowercase();
    format!("msg_{}_{}", now_ms, suffix)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRequest {
    pub id: String,
    pub is_group: bool,
    pub group_name: Option<String>,
    pub sender: String,
    pub message: String,
    pub timestamp: i64,
    pub device_id: String,
}

impl ProcessRequest {
    /// Build the request for a forwardable message. `None` for `Unread`.
    pub fn from_message(msg: &Message, device_id: &str, now_ms: i64) -> Option<Self> {
        Some(Self {
            id: request_id(now_ms),
            is_group: msg.is_group(),
            group_name: msg.group_name().map(str::to_string),
            sender: msg.sender()?.to_string(),
            message: msg.text()?.to_string(),
            timestamp: msg.timestamp_ms,
            device_id: device_id.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceErrorBody {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl From<ServiceErrorBody> for BridgeError {
    fn from(e: ServiceErrorBody) -> Self {
        BridgeError::Service {
            code: e.code,
            message: e.message,
            retry_after: e.retry_after,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessResponse {
    #[serde(default)]
    pub id: String,
    pub success: bool,
    #[serde(default)]
    pub reply: Option<String>,
    #[serde(default)]
    pub processing_time: Option<u64>,
    #[serde(default)]
    pub error: Option<ServiceErrorBody>,
}

impl ProcessResponse {
    /// The reply text, if the service chose to answer.
    pub fn reply_text(&self) -> Option<&str> {
        self.reply
            .as_deref()
            .filter(|r| !r.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledMessage {
    pub chat_id: String,
    pub message: String,
    #[serde(default)]
    pub message_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledPull {
    pub success: bool,
    #[serde(default)]
    pub messages: Option<Vec<ScheduledMessage>>,
    #[serde(default)]
    pub error: Option<ServiceErrorBody>,
}

#[async_trait]
pub trait DecisionService: Send + Sync {
    /// Ask the service whether and how to answer one message.
    async fn process(&self, request: &ProcessRequest) -> Result<ProcessResponse, BridgeError>;

    /// Fetch messages due at the (optional) `HH:MM` time hint.
    async fn pull_scheduled(
        &self,
        time_hint: Option<&str>,
    ) -> Result<Vec<ScheduledMessage>, BridgeError>;
}

#[cfg(test)]
mod tests;
