//! Chatwatch - chat delivery and notification pipeline
//!
//! This library watches every chat the signed-in user belongs to, reconciles
//! read state for the chat currently on screen, and raises notifications for
//! everything else unless the chat is muted.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod active_chat;
pub mod listener;
pub mod model;
pub mod notification;
pub mod preferences;
pub mod session;
pub mod source;
pub mod store;

pub use active_chat::ActiveChatTracker;
pub use listener::{ChatListener, FanOutPolicy, ListenerHandle};
pub use session::Session;

/// Result type alias for Chatwatch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Chatwatch operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Chat/message storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Live subscription error
    #[error("Subscription error: {0}")]
    Subscription(String),

    /// Notification preferences error
    #[error("Preferences error: {0}")]
    Preferences(String),

    /// Notification delivery error
    #[error("Notification error: {0}")]
    Notification(String),

    /// User session error
    #[error("Session error: {0}")]
    Session(String),

    /// General I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    /// SQLite database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Initialize the Chatwatch library with logging
///
/// Honours `RUST_LOG`, falling back to `info`.
pub fn init() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Current time as Unix milliseconds
pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests;
