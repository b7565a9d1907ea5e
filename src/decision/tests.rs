use super::*;
use crate::message::MessageBody;
use serde_json::json;

#[test]
fn test_request_id_format() {
    let id = request_id(1_700_000_000_000);
    let rest = id.strip_prefix("msg_1700000000000_").unwrap();
    assert_eq!(rest.len(), 9);
    assert!(rest.chars().all(|c| c.is_ascii_alphanumeric()));
    assert_ne!(request_id(1), request_id(1));
}

#[test]
fn test_process_request_from_group_message() {
    let msg = Message::new(
        MessageBody::Group {
            group_name: "Team".into(),
            sender: "Bob".into(),
            text: "lunch?".into(),
        },
        42,
    );
    let req = ProcessRequest::from_message(&msg, "dev-1", 100).unwrap();
    let value = serde_json::to_value(&req).unwrap();
    assert_eq!(value["isGroup"], true);
    assert_eq!(value["groupName"], "Team");
    assert_eq!(value["sender"], "Bob");
    assert_eq!(value["message"], "lunch?");
    assert_eq!(value["timestamp"], 42);
    assert_eq!(value["deviceId"], "dev-1");
    assert!(req.id.starts_with("msg_100_"));
}

#[test]
fn test_process_request_personal_has_null_group() {
    let msg = Message::new(
        MessageBody::Personal {
            sender: "Alice".into(),
            text: "hi".into(),
        },
        1,
    );
    let value = serde_json::to_value(ProcessRequest::from_message(&msg, "d", 1).unwrap()).unwrap();
    assert_eq!(value["isGroup"], false);
    assert!(value["groupName"].is_null());
}

#[test]
fn test_image_request_uses_marker() {
    let msg = Message::new(
        MessageBody::Image {
            sender: "Alice".into(),
            group_name: None,
            bytes: vec![1, 2, 3],
        },
        1,
    );
    let req = ProcessRequest::from_message(&msg, "d", 1).unwrap();
    assert_eq!(req.message, crate::message::IMAGE_MARKER);
}

#[test]
fn test_unread_has_no_request() {
    let msg = Message::new(MessageBody::Unread { info: "3 new".into() }, 1);
    assert!(ProcessRequest::from_message(&msg, "d", 1).is_none());
}

#[test]
fn test_reply_text_ignores_null_and_blank() {
    let parse = |v: serde_json::Value| serde_json::from_value::<ProcessResponse>(v).unwrap();
    assert_eq!(
        parse(json!({"id": "1", "success": true, "reply": "Hello"})).reply_text(),
        Some("Hello")
    );
    assert_eq!(parse(json!({"id": "1", "success": true, "reply": null})).reply_text(), None);
    assert_eq!(parse(json!({"success": true, "reply": "  "})).reply_text(), None);
}

#[test]
fn test_service_error_maps_to_bridge_error() {
    let body: ServiceErrorBody =
        serde_json::from_value(json!({"code": "INTERNAL_ERROR", "message": "boom", "retryAfter": 5}))
            .unwrap();
    let err: BridgeError = body.into();
    assert!(matches!(
        err,
        BridgeError::Service { ref code, retry_after: Some(5), .. } if code == "INTERNAL_ERROR"
    ));
}
