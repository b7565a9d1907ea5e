// Shared test helpers: not all items used by every test binary.
#![allow(unused)]

use async_trait::async_trait;
use chatbridge::allowlist::{AllowlistGate, AllowlistSnapshot};
use chatbridge::bridge::{Bridge, BridgeContext, Collaborators};
use chatbridge::config::Config;
use chatbridge::decision::{DecisionService, ProcessRequest, ProcessResponse, ScheduledMessage};
use chatbridge::errors::BridgeError;
use chatbridge::host::{LiveNotification, NotificationHost, ReplyPayload, ReplySender};
use chatbridge::message::{RawEvent, ReplyCapability};
use chatbridge::storage::MemoryKv;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const PKG: &str = "com.chat";

pub struct MockDecisionService {
    pub reply: Option<String>,
    pub calls: Mutex<Vec<ProcessRequest>>,
}

impl MockDecisionService {
    pub fn replying(reply: Option<&str>) -> Self {
        Self {
            reply: reply.map(str::to_string),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl DecisionService for MockDecisionService {
    async fn process(&self, request: &ProcessRequest) -> Result<ProcessResponse, BridgeError> {
        self.calls.lock().unwrap().push(request.clone());
        Ok(ProcessResponse {
            id: request.id.clone(),
            success: true,
            reply: self.reply.clone(),
            processing_time: Some(5),
            error: None,
        })
    }

    async fn pull_scheduled(
        &self,
        _time_hint: Option<&str>,
    ) -> Result<Vec<ScheduledMessage>, BridgeError> {
        Ok(Vec::new())
    }
}

/// Live host whose enumeration calls are counted.
#[derive(Default)]
pub struct SpyHost {
    pub notifications: Mutex<Vec<LiveNotification>>,
    pub enumerations: AtomicUsize,
}

impl SpyHost {
    pub fn show(&self, title: &str, key: &str) {
        self.notifications.lock().unwrap().push(LiveNotification {
            package_id: PKG.into(),
            title: title.into(),
            sub_text: String::new(),
            is_group: false,
            capability: Some(capability(key)),
        });
    }

    pub fn enumerations(&self) -> usize {
        self.enumerations.load(Ordering::SeqCst)
    }
}

impl NotificationHost for SpyHost {
    fn active_notifications(&self) -> Vec<LiveNotification> {
        self.enumerations.fetch_add(1, Ordering::SeqCst);
        self.notifications.lock().unwrap().clone()
    }
}

#[derive(Default)]
pub struct MockInjector {
    pub sent: Mutex<Vec<String>>,
}

#[async_trait]
impl ReplySender for MockInjector {
    async fn send(&self, capability: &ReplyCapability, payload: &ReplyPayload) -> anyhow::Result<()> {
        let text = payload
            .results
            .get(&capability.key)
            .cloned()
            .unwrap_or_default();
        self.sent.lock().unwrap().push(text);
        Ok(())
    }
}

pub struct TestBridge {
    pub bridge: Bridge,
    pub host: Arc<SpyHost>,
    pub injector: Arc<MockInjector>,
    pub decision: Arc<MockDecisionService>,
}

impl TestBridge {
    pub async fn settle(&self) {
        tokio::time::timeout(Duration::from_secs(5), self.bridge.queue().wait_idle())
            .await
            .expect("dispatch queue did not drain");
    }
}

pub fn create_test_bridge(decision: MockDecisionService, allow: AllowlistSnapshot) -> TestBridge {
    let mut config = Config::default();
    config.host.package_id = PKG.into();
    let host = Arc::new(SpyHost::default());
    let injector = Arc::new(MockInjector::default());
    let decision = Arc::new(decision);
    let ctx = BridgeContext::new(
        &config,
        Collaborators {
            host: host.clone(),
            sender: injector.clone(),
            decision: decision.clone(),
            kv: Arc::new(MemoryKv::new()),
            gate: Arc::new(AllowlistGate::in_memory(allow)),
        },
    );
    TestBridge {
        bridge: Bridge::new(Arc::new(ctx), config.queue.concurrency()),
        host,
        injector,
        decision,
    }
}

pub fn capability(key: &str) -> ReplyCapability {
    ReplyCapability {
        key: key.into(),
        target: format!("http://host/{}", key),
        issued_at_ms: 0,
    }
}

pub fn personal_event(sender: &str, text: &str) -> RawEvent {
    RawEvent {
        package_id: PKG.into(),
        title: sender.into(),
        text: text.into(),
        timestamp_ms: 1_000,
        ..Default::default()
    }
}

pub fn turbo() -> AllowlistSnapshot {
    AllowlistSnapshot {
        turbo_mode: true,
        ..Default::default()
    }
}
