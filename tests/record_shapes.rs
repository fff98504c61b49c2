use serde_json::json;

use querysync::{
    config::SyncConfig,
    query::{QueryRecord, Sender},
    types::{Channel, QueryStatus, QueryType},
};

fn base_row() -> serde_json::Value {
    json!({
        "id": "1",
        "subject": "Product not working as expected",
        "content": "Advanced features are missing from my dashboard.",
        "channel": "email",
        "type": "complaint",
        "priority": "urgent",
        "status": "new",
        "tags": ["premium", "dashboard", "features"],
        "created_at": "2025-01-01T11:30:00Z",
        "updated_at": "2025-01-01T11:30:00Z",
        "history": [
            {"timestamp": "2025-01-01T11:30:00Z", "action": "Query received", "user": "System"}
        ]
    })
}

#[test]
fn flat_sender_columns_are_read() {
    let mut row = base_row();
    row["sender_name"] = json!("Sarah Johnson");
    row["sender_email"] = json!("sarah.j@example.com");

    let rec: QueryRecord = serde_json::from_value(row).expect("decode");
    assert_eq!(rec.sender.name.as_deref(), Some("Sarah Johnson"));
    assert_eq!(rec.sender.email.as_deref(), Some("sarah.j@example.com"));
    assert_eq!(rec.tags, ["premium", "dashboard", "features"]);
    assert_eq!(rec.query_type, QueryType::Complaint);
}

#[test]
fn nested_sender_object_is_normalized() {
    let mut row = base_row();
    row["sender"] = json!({"name": "Mike Chen", "email": "mike.chen@mail.com"});

    let rec: QueryRecord = serde_json::from_value(row).expect("decode");
    assert_eq!(
        rec.sender,
        Sender {
            name: Some("Mike Chen".to_string()),
            email: Some("mike.chen@mail.com".to_string()),
        }
    );
}

#[test]
fn header_string_sender_and_camel_case_timestamps_are_accepted() {
    let row = json!({
        "id": "e1",
        "subject": "Help with login",
        "content": "I cannot log in.",
        "channel": "email",
        "type": "bug_report",
        "priority": "medium",
        "status": "new",
        "sender": "\"Ana Ruiz\" <ana@example.org>",
        "tags": ["email", "auto"],
        "createdAt": "2025-02-03T08:00:00+00:00",
        "updatedAt": "2025-02-03T08:00:00+00:00",
        "history": null
    });

    let rec: QueryRecord = serde_json::from_value(row).expect("decode");
    assert_eq!(rec.sender.name.as_deref(), Some("Ana Ruiz"));
    assert_eq!(rec.sender.email.as_deref(), Some("ana@example.org"));
    assert!(rec.history.is_empty());
    assert_eq!(rec.query_type, QueryType::BugReport);
    assert_eq!(rec.created_at, rec.updated_at);
}

#[test]
fn unknown_channel_maps_to_other_and_missing_updated_at_falls_back() {
    let mut row = base_row();
    row["channel"] = json!("carrier_pigeon");
    row.as_object_mut().expect("object").remove("updated_at");

    let rec: QueryRecord = serde_json::from_value(row).expect("decode");
    assert_eq!(rec.channel, Channel::Other);
    assert_eq!(rec.updated_at, rec.created_at);
}

#[test]
fn encoding_uses_flat_snake_case_shape() {
    let mut row = base_row();
    row["sender"] = json!({"name": "Mike Chen"});
    let rec: QueryRecord = serde_json::from_value(row).expect("decode");

    let out = serde_json::to_value(&rec).expect("encode");
    assert_eq!(out["sender_name"], json!("Mike Chen"));
    assert_eq!(out["sender_email"], json!(null));
    assert_eq!(out["status"], json!("new"));
    assert_eq!(out["type"], json!("complaint"));
    assert!(out.get("sender").is_none());

    let back: QueryRecord = serde_json::from_value(out).expect("decode again");
    assert_eq!(back, rec);
    assert_eq!(back.status, QueryStatus::New);
}

#[test]
fn sender_header_variants() {
    assert_eq!(
        Sender::from_header("ops@example.com"),
        Sender {
            name: None,
            email: Some("ops@example.com".to_string()),
        }
    );
    assert_eq!(
        Sender::from_header("Front Desk"),
        Sender {
            name: Some("Front Desk".to_string()),
            email: None,
        }
    );
    assert_eq!(
        Sender::from_header("<noreply@example.com>"),
        Sender {
            name: None,
            email: Some("noreply@example.com".to_string()),
        }
    );
    assert_eq!(Sender::from_header("   "), Sender::default());
}

#[test]
fn config_from_json_keeps_defaults_for_missing_keys() {
    let cfg = SyncConfig::from_json(r#"{"poll_interval_ms": 2000, "acting_user": "Dana"}"#)
        .expect("config");
    assert_eq!(cfg.poll_interval_ms, 2000);
    assert_eq!(cfg.acting_user, "Dana");
    assert_eq!(cfg.page_size, SyncConfig::default().page_size);
}
