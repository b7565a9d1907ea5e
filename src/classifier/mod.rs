//! Raw event → [`Message`] decision table.
//!
//! Rows are evaluated in priority order, first match wins:
//!
//! 1. image payload present → `Image` (group when flagged and `sub_text` is set)
//! 2. text, group flag, `sub_text` → `Group`
//! 3. text, no group flag → `Personal`
//! 4. no text, `sub_text` → `Unread`
//! 5. anything else → discarded

use crate::message::{Message, MessageBody, RawEvent};

pub fn classify(event: &RawEvent) -> Option<Message> {
    let has_text = !event.text.is_empty();
    let has_sub_text = !event.sub_text.is_empty();

    let body = if let Some(bytes) = &event.image {
        MessageBody::Image {
            sender: event.title.clone(),
            group_name: (event.is_group && has_sub_text).then(|| event.sub_text.clone()),
            bytes: bytes.clone(),
        }
    } else if has_text && event.is_group && has_sub_text {
        MessageBody::Group {
            group_name: event.sub_text.clone(),
            sender: event.title.clone(),
            text: event.text.clone(),
        }
    } else if has_text && !event.is_group {
        MessageBody::Personal {
            sender: event.title.clone(),
            text: event.text.clone(),
        }
    } else if !has_text && has_sub_text {
        MessageBody::Unread {
            info: event.sub_text.clone(),
        }
    } else {
        return None;
    };

    Some(Message::new(body, event.timestamp_ms))
}
