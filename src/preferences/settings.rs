//! Notification settings persisted as JSON

use crate::{
    notification::{DEFAULT_CHANNEL_ID, DEFAULT_FALLBACK_TITLE},
    Error, Result,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Notification settings
///
/// Stored as JSON; a missing or empty file yields the defaults.
///
/// # Example
/// ```rust,no_run
/// use chatwatch::preferences::NotificationSettings;
///
/// let mut settings = NotificationSettings::load("notifications.json").expect("Failed to load");
/// settings.mute("chat_42");
/// settings.save("notifications.json").expect("Failed to save");
///
/// assert!(settings.is_muted("chat_42"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationSettings {
    /// Chats whose messages never raise a notification
    #[serde(default)]
    pub muted_chats: BTreeSet<String>,
    /// Title used when neither the chat nor the sender has a name
    #[serde(default = "default_fallback_title")]
    pub fallback_title: String,
    /// Platform notification channel
    #[serde(default = "default_channel_id")]
    pub channel_id: String,
}

fn default_fallback_title() -> String {
    DEFAULT_FALLBACK_TITLE.to_string()
}

fn default_channel_id() -> String {
    DEFAULT_CHANNEL_ID.to_string()
}

impl NotificationSettings {
    /// Load settings from a JSON file
    ///
    /// # Returns
    /// The loaded settings, or defaults if the file doesn't exist or is empty
    pub fn load<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(Self::default());
        }

        let data = std::fs::read_to_string(path)
            .map_err(|e| Error::Preferences(format!("Failed to read settings: {}", e)))?;

        if data.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_json::from_str(&data)
            .map_err(|e| Error::Preferences(format!("Failed to parse settings: {}", e)))
    }

    /// Save settings to a JSON file, creating parent directories
    pub fn save<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::Preferences(format!("Failed to create settings directory: {}", e))
            })?;
        }

        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .map_err(|e| Error::Preferences(format!("Failed to write settings: {}", e)))?;

        Ok(())
    }

    /// Mute a chat. Returns `false` if it was already muted
    pub fn mute(&mut self, chat_id: &str) -> bool {
        self.muted_chats.insert(chat_id.to_string())
    }

    /// Unmute a chat. Returns `false` if it wasn't muted
    pub fn unmute(&mut self, chat_id: &str) -> bool {
        self.muted_chats.remove(chat_id)
    }

    /// Check if a chat is muted
    pub fn is_muted(&self, chat_id: &str) -> bool {
        self.muted_chats.contains(chat_id)
    }
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            muted_chats: BTreeSet::new(),
            fallback_title: default_fallback_title(),
            channel_id: default_channel_id(),
        }
    }
}
