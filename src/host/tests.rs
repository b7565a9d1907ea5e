use super::*;

#[test]
fn test_reply_payload_keyed_by_capability() {
    let cap = ReplyCapability {
        key: "reply_text".into(),
        target: "http://host/reply/1".into(),
        issued_at_ms: 0,
    };
    let payload = ReplyPayload::new(&cap, "Hello");
    let json = serde_json::to_value(&payload).unwrap();
    assert_eq!(json, serde_json::json!({"results": {"reply_text": "Hello"}}));
}
