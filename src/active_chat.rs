//! Tracking of the chat currently shown in the foreground

use std::sync::Arc;
use tokio::sync::watch;

/// Single-writer, multi-reader cell holding the foreground chat ID
///
/// The UI layer writes it when a chat screen gains or loses focus; the
/// listener reads it while classifying messages. Values are published
/// through a `watch` channel, so a read always observes every `set` that
/// completed before it. Last write wins.
///
/// # Example
/// ```rust
/// use chatwatch::ActiveChatTracker;
///
/// let tracker = ActiveChatTracker::new();
/// tracker.set(Some("chat_1".to_string()));
/// assert!(tracker.is_active("chat_1"));
///
/// // Shared with the UI layer
/// let ui = tracker.clone();
/// ui.set(None);
/// assert_eq!(tracker.get(), None);
/// ```
#[derive(Debug, Clone)]
pub struct ActiveChatTracker {
    tx: Arc<watch::Sender<Option<String>>>,
}

impl ActiveChatTracker {
    /// Create a tracker with no active chat
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Replace the active chat (`None` when no chat is in the foreground)
    pub fn set(&self, chat_id: Option<String>) {
        let previous = self.tx.send_replace(chat_id);
        tracing::debug!(
            previous = previous.as_deref().unwrap_or("<none>"),
            current = self.tx.borrow().as_deref().unwrap_or("<none>"),
            "active chat changed"
        );
    }

    /// Currently active chat ID
    pub fn get(&self) -> Option<String> {
        self.tx.borrow().clone()
    }

    /// Check whether `chat_id` is the active chat
    pub fn is_active(&self, chat_id: &str) -> bool {
        self.tx.borrow().as_deref() == Some(chat_id)
    }

    /// Observe active chat changes
    pub fn subscribe(&self) -> watch::Receiver<Option<String>> {
        self.tx.subscribe()
    }
}

impl Default for ActiveChatTracker {
    fn default() -> Self {
        Self::new()
    }
}
