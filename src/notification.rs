//! Notification construction and dispatch
//!
//! Turns an unread message into a platform notification, honouring the
//! user's muted chats. Every chat owns exactly one notification slot: the
//! key is derived from the chat ID, so a newer message replaces the older
//! notification instead of stacking.

use crate::{
    model::{Chat, Message},
    source::{NotificationPreferences, NotificationSink},
    Result,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Title used when neither the chat nor the sender has a display name
pub const DEFAULT_FALLBACK_TITLE: &str = "Chat";

/// Notification channel for chat messages
pub const DEFAULT_CHANNEL_ID: &str = "chat_messages";

/// Identity of a notification slot
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationKey(String);

impl NotificationKey {
    /// Key of the slot belonging to `chat_id`
    pub fn for_chat(chat_id: &str) -> Self {
        Self(chat_id.to_string())
    }

    /// Key as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NotificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a tapped notification takes the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRoute {
    /// Chat to open
    pub chat_id: String,
}

impl NotificationRoute {
    /// Route to `chat_id`
    pub fn to_chat(chat_id: &str) -> Self {
        Self {
            chat_id: chat_id.to_string(),
        }
    }

    /// In-app deep link, e.g. `chat/abc`
    pub fn deep_link(&self) -> String {
        format!("chat/{}", self.chat_id)
    }
}

/// A notification ready to be shown
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Slot identity; equal keys replace each other
    pub key: NotificationKey,
    /// Platform channel
    pub channel_id: String,
    /// Title line
    pub title: String,
    /// Body text
    pub body: String,
    /// Tap target
    pub route: NotificationRoute,
}

/// What happened to a dispatch request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Notification handed to the sink
    Sent,
    /// Chat is muted; nothing was shown
    Muted,
    /// Preferences or sink failed; the notification was skipped
    Failed,
}

/// Builds notifications for unread messages and hands them to a sink
#[derive(Clone)]
pub struct NotificationDispatcher {
    preferences: Arc<dyn NotificationPreferences>,
    sink: Arc<dyn NotificationSink>,
    fallback_title: String,
    channel_id: String,
}

impl NotificationDispatcher {
    /// Create a dispatcher with the default fallback title and channel
    pub fn new(
        preferences: Arc<dyn NotificationPreferences>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            preferences,
            sink,
            fallback_title: DEFAULT_FALLBACK_TITLE.to_string(),
            channel_id: DEFAULT_CHANNEL_ID.to_string(),
        }
    }

    /// Override the title used when no display name is available
    pub fn with_fallback_title(mut self, title: &str) -> Self {
        self.fallback_title = title.to_string();
        self
    }

    /// Override the notification channel
    pub fn with_channel(mut self, channel_id: &str) -> Self {
        self.channel_id = channel_id.to_string();
        self
    }

    /// Build the notification for `message` in `chat`
    ///
    /// Title falls back from the chat name to the sender name to the
    /// fallback title.
    ///
    /// # Arguments
    /// * `message` - Unread message to announce
    /// * `chat` - Chat the message belongs to
    ///
    /// # Returns
    /// Notification keyed by the chat ID, routed to the chat screen
    pub fn build(&self, message: &Message, chat: &Chat) -> Notification {
        let sender_name = Some(message.sender_name.trim()).filter(|name| !name.is_empty());
        let title = chat
            .display_name()
            .or(sender_name)
            .unwrap_or(self.fallback_title.as_str())
            .to_string();

        Notification {
            key: NotificationKey::for_chat(&chat.id),
            channel_id: self.channel_id.clone(),
            title,
            body: message.preview(),
            route: NotificationRoute::to_chat(&chat.id),
        }
    }

    /// Notify about `message` unless `chat` is muted
    ///
    /// Never fails: preference lookup and sink errors are logged and the
    /// notification is skipped.
    ///
    /// # Returns
    /// What happened to the notification
    pub async fn dispatch(&self, message: &Message, chat: &Chat) -> DispatchOutcome {
        let muted = match self.preferences.muted_chats().await {
            Ok(muted) => muted,
            Err(e) => {
                warn!(chat_id = %chat.id, message_id = %message.id, "Failed to read muted chats: {}", e);
                return DispatchOutcome::Failed;
            }
        };

        if muted.contains(&chat.id) {
            debug!(chat_id = %chat.id, message_id = %message.id, "Chat muted, notification suppressed");
            return DispatchOutcome::Muted;
        }

        let notification = self.build(message, chat);
        match self.sink.notify(notification).await {
            Ok(()) => {
                debug!(chat_id = %chat.id, message_id = %message.id, "Notification sent");
                DispatchOutcome::Sent
            }
            Err(e) => {
                warn!(chat_id = %chat.id, message_id = %message.id, "Failed to send notification: {}", e);
                DispatchOutcome::Failed
            }
        }
    }
}

/// Sink that logs notifications and keeps the latest one per key
#[derive(Debug, Clone, Default)]
pub struct LogSink {
    shown: Arc<Mutex<HashMap<NotificationKey, Notification>>>,
}

impl LogSink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifications currently shown, one per key
    pub async fn shown(&self) -> Vec<Notification> {
        let shown = self.shown.lock().await;
        let mut list: Vec<Notification> = shown.values().cloned().collect();
        list.sort_by(|a, b| a.key.as_str().cmp(b.key.as_str()));
        list
    }

    /// Remove the notification for `key`, e.g. when its chat is opened
    pub async fn cancel(&self, key: &NotificationKey) -> Option<Notification> {
        self.shown.lock().await.remove(key)
    }
}

#[async_trait]
impl NotificationSink for LogSink {
    async fn notify(&self, notification: Notification) -> Result<()> {
        info!(
            key = %notification.key,
            route = %notification.route.deep_link(),
            "🔔 {}: {}",
            notification.title,
            notification.body
        );
        let mut shown = self.shown.lock().await;
        shown.insert(notification.key.clone(), notification);
        Ok(())
    }
}
