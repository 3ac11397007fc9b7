//! Chat data model
//!
//! The records exchanged with a chat data source:
//! - `chat` - Chat conversations, participants and unread counters
//! - `message` - Messages, their kind, read receipts and delivery status

// Submodules
pub mod chat;
pub mod message;

// Re-export commonly used types
pub use chat::{Chat, ChatType};
pub use message::{DeliveryStatus, Message, MessageKind};
