//! Message structures, read receipts and delivery status

use serde::{Deserialize, Serialize};

/// Kind of message payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Plain text
    Text,
    /// Image attachment; content holds the attachment path
    Image,
    /// File attachment; content holds the attachment path
    File,
    /// Generated by the system (member joined, chat renamed...)
    System,
}

impl Default for MessageKind {
    fn default() -> Self {
        Self::Text
    }
}

impl MessageKind {
    /// Stable name used for persistence
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Image => "image",
            MessageKind::File => "file",
            MessageKind::System => "system",
        }
    }

    /// Parse a persisted kind name
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "text" => Some(MessageKind::Text),
            "image" => Some(MessageKind::Image),
            "file" => Some(MessageKind::File),
            "system" => Some(MessageKind::System),
            _ => None,
        }
    }
}

/// Message delivery status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// Message is being written to the data source
    Sending,
    /// Message stored by the data source
    Sent,
    /// Message reached at least one recipient device
    Delivered,
    /// Message read by at least one recipient
    Read,
    /// Message could not be stored
    Error,
}

impl Default for DeliveryStatus {
    fn default() -> Self {
        Self::Sending
    }
}

impl DeliveryStatus {
    /// Stable name used for persistence
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Sending => "sending",
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Read => "read",
            DeliveryStatus::Error => "error",
        }
    }

    /// Parse a persisted status name
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "sending" => Some(DeliveryStatus::Sending),
            "sent" => Some(DeliveryStatus::Sent),
            "delivered" => Some(DeliveryStatus::Delivered),
            "read" => Some(DeliveryStatus::Read),
            "error" => Some(DeliveryStatus::Error),
            _ => None,
        }
    }
}

/// A chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Message ID
    pub id: String,
    /// Owning chat ID
    pub chat_id: String,
    /// Sender user ID
    pub sender_id: String,
    /// Sender display name
    #[serde(default)]
    pub sender_name: String,
    /// Text content, or the attachment path for image/file messages
    pub content: String,
    /// Payload kind
    #[serde(default)]
    pub kind: MessageKind,
    /// ID of the message this one replies to
    #[serde(default)]
    pub reply_to: Option<String>,
    /// Users who have read this message
    #[serde(default)]
    pub read_by: Vec<String>,
    /// Sent timestamp (Unix milliseconds)
    pub sent_at: i64,
    /// Delivery status
    #[serde(default)]
    pub status: DeliveryStatus,
}

impl Message {
    /// Create a new message
    pub fn new(
        id: String,
        chat_id: String,
        sender_id: String,
        sender_name: String,
        content: String,
        sent_at: i64,
    ) -> Self {
        Self {
            id,
            chat_id,
            sender_id,
            sender_name,
            content,
            kind: MessageKind::Text,
            reply_to: None,
            read_by: Vec::new(),
            sent_at,
            status: DeliveryStatus::Sending,
        }
    }

    /// Create a text message with a fresh ID, sent now
    pub fn text(chat_id: &str, sender_id: &str, sender_name: &str, content: &str) -> Self {
        Self::new(
            uuid::Uuid::new_v4().to_string(),
            chat_id.to_string(),
            sender_id.to_string(),
            sender_name.to_string(),
            content.to_string(),
            crate::now_millis(),
        )
    }

    /// Set the payload kind
    pub fn with_kind(mut self, kind: MessageKind) -> Self {
        self.kind = kind;
        self
    }

    /// Mark this message as a reply to another one
    pub fn with_reply_to(mut self, message_id: &str) -> Self {
        self.reply_to = Some(message_id.to_string());
        self
    }

    /// Check whether `user_id` has read this message
    pub fn is_read_by(&self, user_id: &str) -> bool {
        self.read_by.iter().any(|u| u == user_id)
    }

    /// Record a read receipt for `user_id`
    ///
    /// Returns `true` if the receipt is new, `false` if the user had already
    /// read the message (no state change).
    pub fn mark_read_by(&mut self, user_id: &str) -> bool {
        if self.is_read_by(user_id) {
            return false;
        }
        self.read_by.push(user_id.to_string());
        self.status = DeliveryStatus::Read;
        true
    }

    /// Whether this message still needs attention from `user_id`:
    /// sent by someone else and not yet read by them
    pub fn is_eligible_for(&self, user_id: &str) -> bool {
        self.sender_id != user_id && !self.is_read_by(user_id)
    }

    /// Short text suitable for a notification body
    pub fn preview(&self) -> String {
        match self.kind {
            MessageKind::Text | MessageKind::System => self.content.clone(),
            MessageKind::Image => "📷 Image".to_string(),
            MessageKind::File => "📎 File".to_string(),
        }
    }
}
