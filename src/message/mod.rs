//! Inbound event shapes and the classified message model.

use chrono::{DateTime, Local, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Text sent to the decision service in place of image bytes.
pub const IMAGE_MARKER: &str = "[image]";

const PERSONAL_PREFIX: &str = "personal_";
const GROUP_PREFIX: &str = "group_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationKind {
    Personal,
    Group,
}

impl ConversationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Personal => "personal",
            Self::Group => "group",
        }
    }
}

/// Deterministic conversation identity: `personal_<name>` or `group_<name>`.
///
/// Two logical conversations that share a display name collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    pub fn new(kind: ConversationKind, name: &str) -> Self {
        let prefix = match kind {
            ConversationKind::Personal => PERSONAL_PREFIX,
            ConversationKind::Group => GROUP_PREFIX,
        };
        Self(format!("{}{}", prefix, name))
    }

    /// Wrap an id received from elsewhere (e.g. the scheduled-pull endpoint).
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Split the id back into kind and display name, if it carries a known prefix.
    pub fn parse(&self) -> Option<(ConversationKind, &str)> {
        if let Some(name) = self.0.strip_prefix(GROUP_PREFIX) {
            Some((ConversationKind::Group, name))
        } else {
            self.0
                .strip_prefix(PERSONAL_PREFIX)
                .map(|name| (ConversationKind::Personal, name))
        }
    }

    pub fn kind(&self) -> Option<ConversationKind> {
        self.parse().map(|(kind, _)| kind)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque, host-issued, one-shot reply handle.
///
/// `key` names the input field the host expects to be filled; `target` is the
/// host's routing token. There is no expiry signal: a dead capability only shows
/// up as a failed send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyCapability {
    pub key: String,
    pub target: String,
    #[serde(default)]
    pub issued_at_ms: i64,
}

/// A raw notification as delivered by the host event source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawEvent {
    pub package_id: String,
    pub title: String,
    pub text: String,
    pub sub_text: String,
    pub is_group: bool,
    pub image: Option<Vec<u8>>,
    pub capability: Option<ReplyCapability>,
    pub timestamp_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessageBody {
    Personal {
        sender: String,
        text: String,
    },
    Group {
        group_name: String,
        sender: String,
        text: String,
    },
    /// Unread-count summary. Never cached, persisted or forwarded.
    Unread {
        info: String,
    },
    Image {
        sender: String,
        group_name: Option<String>,
        #[serde(skip)]
        bytes: Vec<u8>,
    },
}

/// Classified message, immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub timestamp_ms: i64,
    pub formatted_time: String,
    #[serde(flatten)]
    pub body: MessageBody,
}

impl Message {
    pub fn new(body: MessageBody, timestamp_ms: i64) -> Self {
        Self {
            timestamp_ms,
            formatted_time: format_time(timestamp_ms),
            body,
        }
    }

    /// Conversation this message belongs to. `Unread` has none.
    pub fn conversation(&self) -> Option<(ConversationKind, &str)> {
        match &self.body {
            MessageBody::Personal { sender, .. } => Some((ConversationKind::Personal, sender)),
            MessageBody::Group { group_name, .. } => Some((ConversationKind::Group, group_name)),
            MessageBody::Image {
                group_name: Some(group),
                ..
            } => Some((ConversationKind::Group, group)),
            MessageBody::Image { sender, .. } => Some((ConversationKind::Personal, sender)),
            MessageBody::Unread { .. } => None,
        }
    }

    pub fn conversation_id(&self) -> Option<ConversationId> {
        self.conversation()
            .map(|(kind, name)| ConversationId::new(kind, name))
    }

    pub fn sender(&self) -> Option<&str> {
        match &self.body {
            MessageBody::Personal { sender, .. }
            | MessageBody::Group { sender, .. }
            | MessageBody::Image { sender, .. } => Some(sender),
            MessageBody::Unread { .. } => None,
        }
    }

    /// Text forwarded to the decision service; images use [`IMAGE_MARKER`].
    pub fn text(&self) -> Option<&str> {
        match &self.body {
            MessageBody::Personal { text, .. } | MessageBody::Group { text, .. } => Some(text),
            MessageBody::Image { .. } => Some(IMAGE_MARKER),
            MessageBody::Unread { .. } => None,
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self.conversation(), Some((ConversationKind::Group, _)))
    }

    pub fn group_name(&self) -> Option<&str> {
        match &self.body {
            MessageBody::Group { group_name, .. } => Some(group_name),
            MessageBody::Image { group_name, .. } => group_name.as_deref(),
            MessageBody::Personal { .. } | MessageBody::Unread { .. } => None,
        }
    }

    /// Key used by the dedup filter, before the time bucket is appended.
    ///
    /// Group messages include the sender so two members posting the same text
    /// are not coalesced.
    pub fn dedup_key(&self) -> Option<String> {
        let conversation = self.conversation_id()?;
        Some(match &self.body {
            MessageBody::Personal { text, .. } => format!("{}:{}", conversation, text),
            MessageBody::Group { sender, text, .. } => {
                format!("{}:{}:{}", conversation, sender, text)
            }
            MessageBody::Image { sender, bytes, .. } => {
                format!("{}:{}:{}{}", conversation, sender, IMAGE_MARKER, bytes.len())
            }
            MessageBody::Unread { .. } => return None,
        })
    }

    /// Synthetic message recorded in the activity log after a successful reply.
    pub fn bot_reply(conversation: &ConversationId, bot_name: &str, text: &str, now_ms: i64) -> Self {
        let body = match conversation.parse() {
            Some((ConversationKind::Group, group)) => MessageBody::Group {
                group_name: group.to_string(),
                sender: bot_name.to_string(),
                text: text.to_string(),
            },
            _ => MessageBody::Personal {
                sender: bot_name.to_string(),
                text: text.to_string(),
            },
        };
        Self::new(body, now_ms)
    }
}

/// Local wall-clock rendering used for display (`HH:MM:SS`).
pub fn format_time(timestamp_ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(timestamp_ms)
        .map(|dt| Local.from_utc_datetime(&dt.naive_utc()).format("%H:%M:%S").to_string())
        .unwrap_or_default()
}
