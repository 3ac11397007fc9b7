// Model Tests - Chat and Message records

use crate::model::{Chat, ChatType, DeliveryStatus, Message, MessageKind};

fn sample_message() -> Message {
    Message::new(
        "msg_1".to_string(),
        "chat_1".to_string(),
        "bob".to_string(),
        "Bob".to_string(),
        "Hello".to_string(),
        1000,
    )
}

#[test]
fn test_message_creation() {
    let msg = sample_message();

    assert_eq!(msg.id, "msg_1");
    assert_eq!(msg.chat_id, "chat_1");
    assert_eq!(msg.kind, MessageKind::Text);
    assert_eq!(msg.status, DeliveryStatus::Sending);
    assert!(msg.read_by.is_empty());
    assert!(msg.reply_to.is_none());
}

#[test]
fn test_message_text_generates_unique_ids() {
    let a = Message::text("chat_1", "bob", "Bob", "one");
    let b = Message::text("chat_1", "bob", "Bob", "two");

    assert_ne!(a.id, b.id);
    assert!(a.sent_at > 0);
}

#[test]
fn test_message_eligibility() {
    let msg = sample_message();

    // Sent by someone else, unread
    assert!(msg.is_eligible_for("alice"));
    // Own message
    assert!(!msg.is_eligible_for("bob"));

    let mut read = msg.clone();
    read.mark_read_by("alice");
    assert!(!read.is_eligible_for("alice"));
    // Still unread for others
    assert!(read.is_eligible_for("carol"));
}

#[test]
fn test_mark_read_by_is_idempotent() {
    let mut msg = sample_message();

    assert!(msg.mark_read_by("alice"));
    assert_eq!(msg.status, DeliveryStatus::Read);
    let after_first = msg.clone();

    assert!(!msg.mark_read_by("alice"));
    assert_eq!(msg, after_first);
    assert_eq!(msg.read_by, vec!["alice".to_string()]);
}

#[test]
fn test_message_preview() {
    let text = sample_message();
    assert_eq!(text.preview(), "Hello");

    let image = sample_message().with_kind(MessageKind::Image);
    assert_eq!(image.preview(), "📷 Image");

    let file = sample_message().with_kind(MessageKind::File);
    assert_eq!(file.preview(), "📎 File");

    let system = sample_message().with_kind(MessageKind::System);
    assert_eq!(system.preview(), "Hello");
}

#[test]
fn test_message_reply_to() {
    let reply = sample_message().with_reply_to("msg_0");
    assert_eq!(reply.reply_to.as_deref(), Some("msg_0"));
}

#[test]
fn test_message_serialization_defaults() {
    // Older records without kind/status/read_by still parse
    let json = r#"{
        "id": "m1",
        "chat_id": "c1",
        "sender_id": "bob",
        "content": "hi",
        "sent_at": 5
    }"#;
    let msg: Message = serde_json::from_str(json).expect("Failed to parse message");

    assert_eq!(msg.kind, MessageKind::Text);
    assert_eq!(msg.status, DeliveryStatus::Sending);
    assert!(msg.read_by.is_empty());
    assert_eq!(msg.sender_name, "");
}

#[test]
fn test_kind_and_status_names() {
    for kind in [
        MessageKind::Text,
        MessageKind::Image,
        MessageKind::File,
        MessageKind::System,
    ] {
        assert_eq!(MessageKind::parse(kind.as_str()), Some(kind));
    }
    for status in [
        DeliveryStatus::Sending,
        DeliveryStatus::Sent,
        DeliveryStatus::Delivered,
        DeliveryStatus::Read,
        DeliveryStatus::Error,
    ] {
        assert_eq!(DeliveryStatus::parse(status.as_str()), Some(status));
    }
    assert_eq!(MessageKind::parse("video"), None);
    assert_eq!(ChatType::parse("channel"), None);
}

#[test]
fn test_chat_creation_dedupes_participants() {
    let chat = Chat::new(
        "chat_1".to_string(),
        ChatType::Group,
        vec![
            "alice".to_string(),
            "bob".to_string(),
            "alice".to_string(),
        ],
    );

    assert_eq!(chat.participants, vec!["alice".to_string(), "bob".to_string()]);
    assert!(chat.has_participant("bob"));
    assert!(!chat.has_participant("carol"));
    assert_eq!(chat.created_at, chat.updated_at);
}

#[test]
fn test_chat_display_name() {
    let chat = Chat::new("c".to_string(), ChatType::Group, vec![]);
    assert_eq!(chat.display_name(), None);

    let blank = chat.clone().with_name("   ");
    assert_eq!(blank.display_name(), None);

    let named = chat.with_name("Roadmap");
    assert_eq!(named.display_name(), Some("Roadmap"));
}

#[test]
fn test_chat_project_link_and_unread() {
    let mut chat = Chat::new(
        "c".to_string(),
        ChatType::Project,
        vec!["alice".to_string()],
    )
    .with_project("proj_9");

    assert_eq!(chat.project_id.as_deref(), Some("proj_9"));
    assert_eq!(chat.unread_count_for("alice"), 0);

    chat.unread_counts.insert("alice".to_string(), 3);
    assert_eq!(chat.unread_count_for("alice"), 3);
}
