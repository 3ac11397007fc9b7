//! Notification preferences
//!
//! - `settings` - Persistent notification settings (muted chats, labels)
//! - `manager` - Thread-safe, auto-saving access for UI and listener

pub mod manager;
pub mod settings;

pub use manager::PreferencesManager;
pub use settings::NotificationSettings;
