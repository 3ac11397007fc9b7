//! Collaborator contracts consumed by the chat listener
//!
//! The listener never talks to a database, a preference file or the
//! platform notification API directly; it goes through these traits.

use crate::{
    model::{Chat, Message},
    notification::Notification,
    Result,
};
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use std::collections::HashSet;

/// Live sequence of full snapshots
///
/// Every item supersedes the previous one. An `Err` item means the source
/// could not produce a snapshot for that change; consumers do not advance.
pub type LiveSnapshots<T> = BoxStream<'static, Result<Vec<T>>>;

/// Source of chats and messages
#[async_trait]
pub trait ChatDataSource: Send + Sync {
    /// Chats containing `user_id`, re-emitted in full on every change
    fn chats_for(&self, user_id: &str) -> LiveSnapshots<Chat>;

    /// Messages of `chat_id`, re-emitted in full on every change
    fn messages_for(&self, chat_id: &str) -> LiveSnapshots<Message>;

    /// Record that `user_id` read `message_id`
    ///
    /// Must be idempotent: marking an already-read message again succeeds
    /// without changing anything.
    async fn mark_read(&self, message_id: &str, chat_id: &str, user_id: &str) -> Result<()>;
}

/// Access to the signed-in user
pub trait UserContext: Send + Sync {
    /// ID of the signed-in user, `None` when signed out
    fn current_user_id(&self) -> Option<String>;
}

/// Per-chat notification preferences
#[async_trait]
pub trait NotificationPreferences: Send + Sync {
    /// Chat IDs the user has muted
    async fn muted_chats(&self) -> Result<HashSet<String>>;
}

/// Platform notification mechanism
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Show `notification`, replacing any notification with the same key
    async fn notify(&self, notification: Notification) -> Result<()>;
}
