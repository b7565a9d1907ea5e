use super::*;
use crate::storage::{MemoryKv, SqliteKv};

fn store() -> ChatContextStore {
    ChatContextStore::new(Arc::new(MemoryKv::new()), RetentionPolicy::Infinite)
}

#[test]
fn test_get_missing_returns_none() {
    let store = store();
    let id = ConversationId::new(ConversationKind::Personal, "Nobody");
    assert!(store.get(&id).unwrap().is_none());
}

#[test]
fn test_record_message_creates_then_updates() {
    let store = store();
    let first = store
        .record_message(ConversationKind::Group, "Team", "Alice", Some("key-1"))
        .unwrap()
        .unwrap();
    assert_eq!(first.conversation_id.as_str(), "group_Team");
    assert_eq!(first.last_sender, "Alice");
    assert_eq!(first.remote_input_key.as_deref(), Some("key-1"));

    let second = store
        .record_message(ConversationKind::Group, "Team", "Bob", None)
        .unwrap()
        .unwrap();
    assert_eq!(second.last_sender, "Bob");
    // Previous capability key is kept when the new event carried none
    assert_eq!(second.remote_input_key.as_deref(), Some("key-1"));
    assert!(second.last_update_time >= first.last_update_time);
}

#[test]
fn test_record_message_without_capability_does_not_create() {
    let store = store();
    let ctx = store
        .record_message(ConversationKind::Personal, "Alice", "Alice", None)
        .unwrap();
    assert!(ctx.is_none());
    assert!(store.list_all().unwrap().is_empty());
}

#[test]
fn test_get_reads_through_to_durable_store() {
    let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
    let writer = ChatContextStore::new(kv.clone(), RetentionPolicy::Infinite);
    writer
        .record_message(ConversationKind::Personal, "Alice", "Alice", Some("reply"))
        .unwrap();

    // A fresh store has an empty cache and must hit the KV
    let reader = ChatContextStore::new(kv, RetentionPolicy::Infinite);
    let id = ConversationId::new(ConversationKind::Personal, "Alice");
    let ctx = reader.get(&id).unwrap().unwrap();
    assert_eq!(ctx.display_name, "Alice");
}

#[test]
fn test_update_refreshes_timestamp() {
    let store = store();
    let mut ctx = ChatContext::new(ConversationKind::Personal, "Alice", "Alice", 0);
    ctx.last_update_time = 0;
    let updated = store.update(ctx).unwrap();
    assert!(updated.last_update_time > 0);
}

#[test]
fn test_deactivate_is_soft_delete() {
    let store = store();
    store
        .record_message(ConversationKind::Personal, "Alice", "Alice", Some("reply"))
        .unwrap();
    let id = ConversationId::new(ConversationKind::Personal, "Alice");
    assert!(store.deactivate(&id).unwrap());

    let ctx = store.get(&id).unwrap().unwrap();
    assert!(!ctx.is_active);
    assert!(store.list_active().unwrap().is_empty());
    assert_eq!(store.list_all().unwrap().len(), 1);

    let missing = ConversationId::new(ConversationKind::Personal, "Ghost");
    assert!(!store.deactivate(&missing).unwrap());
}

#[test]
fn test_new_message_reactivates() {
    let store = store();
    store
        .record_message(ConversationKind::Personal, "Alice", "Alice", Some("reply"))
        .unwrap();
    let id = ConversationId::new(ConversationKind::Personal, "Alice");
    store.deactivate(&id).unwrap();
    store
        .record_message(ConversationKind::Personal, "Alice", "Alice", Some("reply"))
        .unwrap();
    assert!(store.get(&id).unwrap().unwrap().is_active);
}

#[test]
fn test_list_active_sorted_newest_first() {
    let store = store();
    for (name, ts) in [("Old", 1_000), ("New", 3_000), ("Mid", 2_000)] {
        let mut ctx = ChatContext::new(ConversationKind::Personal, name, name, ts);
        ctx.last_update_time = ts;
        store.save(&ctx).unwrap();
    }
    let names: Vec<_> = store
        .list_active()
        .unwrap()
        .into_iter()
        .map(|c| c.display_name)
        .collect();
    assert_eq!(names, vec!["New", "Mid", "Old"]);
}

#[test]
fn test_cleanup_infinite_retention_keeps_everything() {
    let store = store();
    let ctx = ChatContext::new(ConversationKind::Personal, "Ancient", "Ancient", 0);
    store.save(&ctx).unwrap();
    assert_eq!(store.cleanup(i64::MAX / 2).unwrap(), 0);
    assert_eq!(store.list_all().unwrap().len(), 1);
}

#[test]
fn test_cleanup_max_age_removes_stale() {
    let store = ChatContextStore::new(
        Arc::new(MemoryKv::new()),
        RetentionPolicy::MaxAge { days: 7 },
    );
    let now = 100 * DAY_MS;
    let stale = ChatContext::new(ConversationKind::Personal, "Stale", "Stale", now - 8 * DAY_MS);
    let fresh = ChatContext::new(ConversationKind::Personal, "Fresh", "Fresh", now - DAY_MS);
    store.save(&stale).unwrap();
    store.save(&fresh).unwrap();

    assert_eq!(store.cleanup(now).unwrap(), 1);
    assert!(store.get(&stale.conversation_id).unwrap().is_none());
    assert!(store.get(&fresh.conversation_id).unwrap().is_some());
}

#[test]
fn test_works_over_sqlite() {
    let store = ChatContextStore::new(
        Arc::new(SqliteKv::open_in_memory().unwrap()),
        RetentionPolicy::Infinite,
    );
    store
        .record_message(ConversationKind::Group, "Team", "Bob", Some("reply"))
        .unwrap();
    assert_eq!(store.list_active().unwrap().len(), 1);
}

#[test]
fn test_corrupt_record_surfaces_storage_error() {
    let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
    kv.put("chat_context:personal_Bad", "{not json").unwrap();
    let store = ChatContextStore::new(kv, RetentionPolicy::Infinite);
    let id = ConversationId::from_raw("personal_Bad");
    assert!(matches!(store.get(&id), Err(BridgeError::Storage(_))));
    // Scans skip it instead of failing
    assert!(store.list_all().unwrap().is_empty());
}
