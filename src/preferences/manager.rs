//! Thread-safe preferences manager for concurrent access

use crate::{
    notification::NotificationDispatcher,
    preferences::settings::NotificationSettings,
    source::{NotificationPreferences, NotificationSink},
    Result,
};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared notification preferences with automatic persistence
///
/// The UI mutes and unmutes chats through it while the listener reads the
/// muted set concurrently.
///
/// # Example
/// ```rust,no_run
/// use chatwatch::preferences::PreferencesManager;
///
/// # async fn example() -> chatwatch::Result<()> {
/// let manager = PreferencesManager::new("notifications.json").await?;
///
/// // Mute a chat (auto-saves)
/// manager.mute("chat_42").await?;
/// assert!(manager.is_muted("chat_42").await);
///
/// // Share with the listener
/// let listener_view = manager.clone();
/// tokio::spawn(async move {
///     let settings = listener_view.get_all().await;
///     println!("{} muted chats", settings.muted_chats.len());
/// });
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct PreferencesManager {
    /// Shared settings state
    settings: Arc<RwLock<NotificationSettings>>,
    /// Path to settings file for auto-save; `None` keeps settings in memory
    settings_path: Arc<Option<String>>,
}

impl PreferencesManager {
    /// Create a manager backed by the settings file at `path`
    ///
    /// Loads the file, or starts from defaults if it doesn't exist.
    ///
    /// # Arguments
    /// * `path` - Path to the settings file
    ///
    /// # Returns
    /// A new PreferencesManager instance
    pub async fn new<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        let settings = NotificationSettings::load(&path)?;

        Ok(Self {
            settings: Arc::new(RwLock::new(settings)),
            settings_path: Arc::new(Some(path_str)),
        })
    }

    /// Create a manager that never touches the disk
    pub fn in_memory() -> Self {
        Self::with_settings(NotificationSettings::default())
    }

    /// Create an in-memory manager seeded with `settings`
    pub fn with_settings(settings: NotificationSettings) -> Self {
        Self {
            settings: Arc::new(RwLock::new(settings)),
            settings_path: Arc::new(None),
        }
    }

    /// Mute a chat and auto-save
    pub async fn mute(&self, chat_id: &str) -> Result<()> {
        self.set_muted(chat_id, true).await
    }

    /// Unmute a chat and auto-save
    pub async fn unmute(&self, chat_id: &str) -> Result<()> {
        self.set_muted(chat_id, false).await
    }

    /// Set the mute state of a chat and auto-save if it changed
    ///
    /// # Arguments
    /// * `chat_id` - Chat to mute or unmute
    /// * `muted` - New mute state
    ///
    /// # Returns
    /// Result indicating success or failure
    pub async fn set_muted(&self, chat_id: &str, muted: bool) -> Result<()> {
        let mut settings = self.settings.write().await;
        let changed = if muted {
            settings.mute(chat_id)
        } else {
            settings.unmute(chat_id)
        };
        if changed {
            tracing::info!(chat_id, muted, "Chat mute state changed");
            self.persist(&settings)?;
        }
        Ok(())
    }

    /// Check if a chat is muted
    pub async fn is_muted(&self, chat_id: &str) -> bool {
        let settings = self.settings.read().await;
        settings.is_muted(chat_id)
    }

    /// Get a clone of all settings
    pub async fn get_all(&self) -> NotificationSettings {
        let settings = self.settings.read().await;
        settings.clone()
    }

    /// Update multiple settings at once and auto-save
    ///
    /// # Arguments
    /// * `update_fn` - Function that modifies the settings
    ///
    /// # Returns
    /// Result indicating success or failure
    pub async fn update<F>(&self, update_fn: F) -> Result<()>
    where
        F: FnOnce(&mut NotificationSettings),
    {
        let mut settings = self.settings.write().await;
        update_fn(&mut *settings);
        self.persist(&settings)
    }

    /// Reload settings from disk
    ///
    /// Picks up edits made by another process. No-op for in-memory managers.
    pub async fn reload(&self) -> Result<()> {
        if let Some(path) = self.settings_path.as_deref() {
            let loaded = NotificationSettings::load(path)?;
            let mut settings = self.settings.write().await;
            *settings = loaded;
        }
        Ok(())
    }

    /// Save current settings to disk
    pub async fn save(&self) -> Result<()> {
        let settings = self.settings.read().await;
        self.persist(&settings)
    }

    /// Build a dispatcher that reads muted chats from this manager and uses
    /// the configured fallback title and channel
    pub async fn dispatcher(&self, sink: Arc<dyn NotificationSink>) -> NotificationDispatcher {
        let settings = self.settings.read().await;
        NotificationDispatcher::new(Arc::new(self.clone()), sink)
            .with_fallback_title(&settings.fallback_title)
            .with_channel(&settings.channel_id)
    }

    fn persist(&self, settings: &NotificationSettings) -> Result<()> {
        match self.settings_path.as_deref() {
            Some(path) => settings.save(path),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl NotificationPreferences for PreferencesManager {
    async fn muted_chats(&self) -> Result<HashSet<String>> {
        let settings = self.settings.read().await;
        Ok(settings.muted_chats.iter().cloned().collect())
    }
}
