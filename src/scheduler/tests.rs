use super::*;
use crate::allowlist::AllowlistSnapshot;
use crate::decision::ScheduledMessage;
use crate::message::ConversationKind;
use crate::testing::*;
use chrono::TimeZone;

#[derive(Default)]
struct ManualAlarm {
    armed: Mutex<Vec<i64>>,
    cancels: Mutex<usize>,
}

impl ManualAlarm {
    fn armed(&self) -> Vec<i64> {
        self.armed.lock().unwrap().clone()
    }
}

impl Alarm for ManualAlarm {
    fn arm_once(&self, at_ms: i64, _callback: AlarmCallback) {
        self.armed.lock().unwrap().push(at_ms);
    }

    fn cancel(&self) {
        *self.cancels.lock().unwrap() += 1;
    }
}

fn at(h: u32, m: u32, s: u32) -> i64 {
    Utc.with_ymd_and_hms(2024, 5, 1, h, m, s)
        .unwrap()
        .timestamp_millis()
}

fn scheduler(decision: FakeDecision) -> (Scheduler, Arc<ManualAlarm>, Harness) {
    let h = harness(decision, AllowlistSnapshot::default());
    let alarm = Arc::new(ManualAlarm::default());
    let sched = Scheduler::new(
        h.bridge.context().clone(),
        alarm.clone(),
        &SchedulerConfig::default(),
    )
    .unwrap();
    (sched, alarm, h)
}

#[test]
fn test_next_boundary() {
    let ten = 10 * MINUTE_MS;
    let utc = chrono_tz::UTC;
    assert_eq!(next_boundary(at(8, 3, 0), ten, utc), at(8, 10, 0));
    assert_eq!(next_boundary(at(8, 10, 0), ten, utc), at(8, 20, 0));
    assert_eq!(next_boundary(at(8, 59, 59), ten, utc), at(9, 0, 0));
}

#[test]
fn test_normalized_boundary_rounds_to_nearest() {
    let ten = 10 * MINUTE_MS;
    let utc = chrono_tz::UTC;
    assert_eq!(normalized_boundary(at(8, 9, 58), ten, utc), at(8, 10, 0));
    assert_eq!(normalized_boundary(at(8, 10, 2), ten, utc), at(8, 10, 0));
    assert_eq!(normalized_boundary(at(8, 3, 0), ten, utc), at(8, 0, 0));
}

#[test]
fn test_boundaries_follow_local_wall_clock() {
    // Kathmandu is UTC+05:45, so 08:03Z is 13:48 local
    let ten = 10 * MINUTE_MS;
    let ktm = chrono_tz::Asia::Kathmandu;
    let next = next_boundary(at(8, 3, 0), ten, ktm);
    assert_eq!(next, at(8, 5, 0));
    assert_eq!(time_hint(next, ktm), "13:50");
    let slot = normalized_boundary(at(8, 4, 58), ten, ktm);
    assert_eq!(time_hint(slot, ktm), "13:50");

    // Hour-aligned intervals in a half-hour zone
    let hour = 60 * MINUTE_MS;
    let kolkata = chrono_tz::Asia::Kolkata;
    assert_eq!(time_hint(next_boundary(at(8, 3, 0), hour, kolkata), kolkata), "14:00");
}

#[tokio::test]
async fn test_kathmandu_scheduler_hints_land_on_boundaries() {
    let h = harness(FakeDecision::default(), AllowlistSnapshot::default());
    let alarm = Arc::new(ManualAlarm::default());
    let config = SchedulerConfig {
        timezone: "Asia/Kathmandu".into(),
        ..SchedulerConfig::default()
    };
    let sched = Scheduler::new(h.bridge.context().clone(), alarm.clone(), &config).unwrap();

    let first = sched.start_at(at(8, 3, 0));
    assert_eq!(first, at(8, 5, 0));
    let report = sched.fire_at(first + 150).await.unwrap();
    assert_eq!(report.time_hint, "13:50");
    assert_eq!(report.next_ms, at(8, 15, 0));
    assert_eq!(*h.decision.pulls.lock().unwrap(), vec![Some("13:50".to_string())]);
}

#[test]
fn test_time_hint_uses_timezone() {
    assert_eq!(time_hint(at(8, 10, 0), chrono_tz::UTC), "08:10");
    assert_eq!(time_hint(at(8, 10, 0), chrono_tz::Asia::Tokyo), "17:10");
}

#[tokio::test]
async fn test_start_and_stop_transitions() {
    let (sched, alarm, _h) = scheduler(FakeDecision::default());
    assert_eq!(sched.state(), SchedulerState::Idle);

    let next = sched.start_at(at(8, 3, 0));
    assert_eq!(next, at(8, 10, 0));
    assert_eq!(sched.state(), SchedulerState::Armed { next_ms: next });
    assert_eq!(alarm.armed(), vec![next]);

    sched.stop();
    assert_eq!(sched.state(), SchedulerState::Idle);
    assert_eq!(*alarm.cancels.lock().unwrap(), 2);
}

#[tokio::test]
async fn test_late_fire_rearms_at_next_boundary_not_interval() {
    let (sched, alarm, _h) = scheduler(FakeDecision::default());
    sched.start_at(at(7, 55, 0));

    // Expected 08:00, fired three minutes late
    let report = sched.fire_at(at(8, 3, 0)).await.unwrap();
    assert_eq!(report.expected_ms, at(8, 0, 0));
    assert_eq!(report.next_ms, at(8, 10, 0));
    assert_eq!(alarm.armed().last().copied(), Some(at(8, 10, 0)));
    assert_eq!(sched.state(), SchedulerState::Armed { next_ms: at(8, 10, 0) });
}

#[tokio::test]
async fn test_early_fire_does_not_repeat_the_slot() {
    let (sched, alarm, h) = scheduler(FakeDecision::default());
    sched.start_at(at(7, 55, 0));

    // Alarm goes off 200 ms before the 08:00 boundary it was armed for
    let early = sched.fire_at(at(8, 0, 0) - 200).await.unwrap();
    assert_eq!(early.time_hint, "08:00");
    assert_eq!(early.next_ms, at(8, 10, 0));
    assert_eq!(alarm.armed(), vec![at(8, 0, 0), at(8, 10, 0)]);

    let following = sched.fire_at(at(8, 10, 0) + 5).await.unwrap();
    assert_eq!(following.time_hint, "08:10");
    assert_eq!(
        *h.decision.pulls.lock().unwrap(),
        vec![Some("08:00".to_string()), Some("08:10".to_string())]
    );
}

#[tokio::test]
async fn test_fire_while_idle_is_ignored() {
    let (sched, alarm, h) = scheduler(FakeDecision::default());
    assert!(sched.fire_at(at(8, 0, 0)).await.is_none());
    assert!(alarm.armed().is_empty());
    assert!(h.decision.pulls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_fire_sends_normalized_hint_and_delivers() {
    let decision = FakeDecision {
        scheduled: vec![
            ScheduledMessage {
                chat_id: "personal_Alice".into(),
                message: "standup in 5".into(),
                message_type: Some("text".into()),
            },
            ScheduledMessage {
                chat_id: "group_Nobody".into(),
                message: "lost".into(),
                message_type: None,
            },
            ScheduledMessage {
                chat_id: "weird".into(),
                message: "skipped".into(),
                message_type: None,
            },
        ],
        ..Default::default()
    };
    let (sched, _alarm, h) = scheduler(decision);

    // Alice is known from an earlier event and currently visible
    let event = personal_event("Alice", "hello", Some(capability("a")));
    show(&h.board, &event);
    h.bridge
        .context()
        .contexts
        .record_message(ConversationKind::Personal, "Alice", "Alice", Some("a"))
        .unwrap();

    sched.start_at(at(8, 5, 0));
    let report = sched.fire_at(at(8, 9, 59)).await.unwrap();

    assert_eq!(report.time_hint, "08:10");
    assert_eq!(
        *h.decision.pulls.lock().unwrap(),
        vec![Some("08:10".to_string())]
    );
    assert_eq!(report.pulled, 3);
    assert_eq!(report.delivered, 1);
    assert_eq!(h.sender.texts(), vec!["standup in 5".to_string()]);
}

#[tokio::test]
async fn test_failed_pull_still_rearmed() {
    let (sched, alarm, _h) = scheduler(FakeDecision {
        fail: true,
        ..Default::default()
    });
    sched.start_at(at(8, 0, 0));
    let report = sched.fire_at(at(8, 10, 1)).await.unwrap();
    assert!(report.error.is_some());
    assert_eq!(alarm.armed().last().copied(), Some(at(8, 20, 0)));
    assert!(matches!(sched.state(), SchedulerState::Armed { .. }));
}

#[test]
fn test_invalid_timezone_rejected() {
    let h = harness(FakeDecision::default(), AllowlistSnapshot::default());
    let config = SchedulerConfig {
        timezone: "Mars/Olympus".into(),
        ..SchedulerConfig::default()
    };
    let result = Scheduler::new(
        h.bridge.context().clone(),
        Arc::new(ManualAlarm::default()),
        &config,
    );
    assert!(matches!(result, Err(BridgeError::Config(_))));
}

#[tokio::test]
async fn test_runs_with_tokio_alarm() {
    let h = harness(FakeDecision::default(), AllowlistSnapshot::default());
    let alarm = Arc::new(crate::host::TokioAlarm::new());
    let sched = Scheduler::new(h.bridge.context().clone(), alarm.clone(), &SchedulerConfig::default())
        .unwrap();
    sched.start();
    assert!(alarm.is_armed());
    sched.stop();
    assert!(!alarm.is_armed());
}
