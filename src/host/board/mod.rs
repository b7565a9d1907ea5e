use super::{LiveNotification, NotificationHost};
use crate::message::ReplyCapability;
use crate::utils::now_ms;
use std::sync::Mutex;
use tracing::debug;

struct Posted {
    notification: LiveNotification,
    posted_at_ms: i64,
}

/// In-process stand-in for the host's notification shade.
///
/// One entry per conversation; a newer post replaces the older one the way a
/// chat app updates its notification. Entries expire after `ttl_ms`, which
/// also kills their capability.
pub struct NotificationBoard {
    ttl_ms: i64,
    entries: Mutex<Vec<Posted>>,
}

fn same_conversation(a: &LiveNotification, b: &LiveNotification) -> bool {
    a.package_id == b.package_id
        && a.is_group == b.is_group
        && if a.is_group {
            a.sub_text == b.sub_text
        } else {
            a.title == b.title
        }
}

impl NotificationBoard {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            ttl_ms: i64::try_from(ttl_secs.saturating_mul(1000)).unwrap_or(i64::MAX),
            entries: Mutex::new(Vec::new()),
        }
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, Vec<Posted>> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub fn post(&self, notification: LiveNotification) {
        self.post_at(notification, now_ms());
    }

    pub fn post_at(&self, notification: LiveNotification, now_ms: i64) {
        let mut entries = self.entries();
        entries.retain(|p| !same_conversation(&p.notification, &notification));
        entries.push(Posted {
            notification,
            posted_at_ms: now_ms,
        });
    }

    pub fn active_at(&self, now_ms: i64) -> Vec<LiveNotification> {
        let mut entries = self.entries();
        let ttl = self.ttl_ms;
        entries.retain(|p| now_ms.saturating_sub(p.posted_at_ms) < ttl);
        entries.iter().map(|p| p.notification.clone()).collect()
    }

    /// True while a non-expired notification still carries this capability.
    pub fn is_live(&self, capability: &ReplyCapability) -> bool {
        self.active_at(now_ms())
            .iter()
            .any(|n| n.capability.as_ref() == Some(capability))
    }

    /// Drop the capability after it has been used; the notification stays.
    pub fn consume(&self, capability: &ReplyCapability) {
        let mut entries = self.entries();
        for posted in entries.iter_mut() {
            if posted.notification.capability.as_ref() == Some(capability) {
                debug!("capability {} consumed", capability.key);
                posted.notification.capability = None;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

impl NotificationHost for NotificationBoard {
    fn active_notifications(&self) -> Vec<LiveNotification> {
        self.active_at(now_ms())
    }
}
