//! Fakes shared by unit tests.

use crate::allowlist::{AllowlistGate, AllowlistSnapshot};
use crate::bridge::{Bridge, BridgeContext, Collaborators};
use crate::config::Config;
use crate::decision::{DecisionService, ProcessRequest, ProcessResponse, ScheduledMessage};
use crate::errors::BridgeError;
use crate::host::{LiveNotification, NotificationBoard, ReplyPayload, ReplySender};
use crate::message::{RawEvent, ReplyCapability};
use crate::storage::MemoryKv;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

pub const PKG: &str = "com.chat";

#[derive(Default)]
pub struct FakeDecision {
    pub reply: Option<String>,
    pub fail: bool,
    pub scheduled: Vec<ScheduledMessage>,
    pub calls: Mutex<Vec<ProcessRequest>>,
    pub pulls: Mutex<Vec<Option<String>>>,
}

impl FakeDecision {
    pub fn replying(reply: Option<&str>) -> Self {
        Self {
            reply: reply.map(str::to_string),
            ..Default::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl DecisionService for FakeDecision {
    async fn process(&self, request: &ProcessRequest) -> Result<ProcessResponse, BridgeError> {
        self.calls.lock().unwrap().push(request.clone());
        if self.fail {
            return Err(BridgeError::Timeout {
                operation: "decision request",
                secs: 30,
            });
        }
        Ok(ProcessResponse {
            id: request.id.clone(),
            success: true,
            reply: self.reply.clone(),
            processing_time: Some(1),
            error: None,
        })
    }

    async fn pull_scheduled(
        &self,
        time_hint: Option<&str>,
    ) -> Result<Vec<ScheduledMessage>, BridgeError> {
        self.pulls.lock().unwrap().push(time_hint.map(str::to_string));
        if self.fail {
            return Err(BridgeError::Service {
                code: "INTERNAL_ERROR".into(),
                message: "down".into(),
                retry_after: None,
            });
        }
        Ok(self.scheduled.clone())
    }
}

#[derive(Default)]
pub struct RecordingSender {
    pub sent: Mutex<Vec<(ReplyCapability, String)>>,
    pub fail: bool,
}

impl RecordingSender {
    pub fn texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, t)| t.clone())
            .collect()
    }
}

#[async_trait]
impl ReplySender for RecordingSender {
    async fn send(&self, capability: &ReplyCapability, payload: &ReplyPayload) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("capability expired");
        }
        let text = payload.results.get(&capability.key).cloned().unwrap_or_default();
        self.sent.lock().unwrap().push((capability.clone(), text));
        Ok(())
    }
}

pub struct Harness {
    pub bridge: Bridge,
    pub board: Arc<NotificationBoard>,
    pub sender: Arc<RecordingSender>,
    pub decision: Arc<FakeDecision>,
    pub gate: Arc<AllowlistGate>,
}

pub fn harness(decision: FakeDecision, allow: AllowlistSnapshot) -> Harness {
    harness_with(decision, allow, RecordingSender::default())
}

pub fn harness_with(
    decision: FakeDecision,
    allow: AllowlistSnapshot,
    sender: RecordingSender,
) -> Harness {
    let mut config = Config::default();
    config.host.package_id = PKG.into();
    let board = Arc::new(NotificationBoard::new(600));
    let sender = Arc::new(sender);
    let decision = Arc::new(decision);
    let gate = Arc::new(AllowlistGate::in_memory(allow));
    let ctx = BridgeContext::new(
        &config,
        Collaborators {
            host: board.clone(),
            sender: sender.clone(),
            decision: decision.clone(),
            kv: Arc::new(MemoryKv::new()),
            gate: gate.clone(),
        },
    );
    Harness {
        bridge: Bridge::new(Arc::new(ctx), 4),
        board,
        sender,
        decision,
        gate,
    }
}

pub fn turbo() -> AllowlistSnapshot {
    AllowlistSnapshot {
        turbo_mode: true,
        ..Default::default()
    }
}

pub fn capability(key: &str) -> ReplyCapability {
    ReplyCapability {
        key: key.into(),
        target: format!("http://host/{}", key),
        issued_at_ms: 0,
    }
}

pub fn personal_event(sender: &str, text: &str, cap: Option<ReplyCapability>) -> RawEvent {
    RawEvent {
        package_id: PKG.into(),
        title: sender.into(),
        text: text.into(),
        capability: cap,
        timestamp_ms: 1_000,
        ..Default::default()
    }
}

pub fn group_event(group: &str, sender: &str, text: &str, cap: Option<ReplyCapability>) -> RawEvent {
    RawEvent {
        package_id: PKG.into(),
        title: sender.into(),
        text: text.into(),
        sub_text: group.into(),
        is_group: true,
        capability: cap,
        timestamp_ms: 1_000,
        ..Default::default()
    }
}

/// Post the event's notification to the board, as the host would.
pub fn show(board: &NotificationBoard, event: &RawEvent) {
    board.post(LiveNotification {
        package_id: event.package_id.clone(),
        title: event.title.clone(),
        sub_text: event.sub_text.clone(),
        is_group: event.is_group,
        capability: event.capability.clone(),
    });
}
