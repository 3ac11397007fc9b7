//! Chat conversation records

use crate::model::message::Message;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What a chat is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatType {
    /// One-to-one conversation
    Direct,
    /// Ad-hoc group conversation
    Group,
    /// Conversation linked to a project
    Project,
}

impl ChatType {
    /// Stable name used for persistence
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatType::Direct => "direct",
            ChatType::Group => "group",
            ChatType::Project => "project",
        }
    }

    /// Parse a persisted type name
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "direct" => Some(ChatType::Direct),
            "group" => Some(ChatType::Group),
            "project" => Some(ChatType::Project),
            _ => None,
        }
    }
}

/// A chat conversation between a set of users
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    /// Chat ID
    pub id: String,
    /// Chat type
    pub chat_type: ChatType,
    /// Optional display name (groups and project chats usually have one)
    #[serde(default)]
    pub name: Option<String>,
    /// Participant user IDs, in join order
    pub participants: Vec<String>,
    /// Linked project ID for project chats
    #[serde(default)]
    pub project_id: Option<String>,
    /// Most recent message
    #[serde(default)]
    pub last_message: Option<Message>,
    /// Unread message count per user ID
    #[serde(default)]
    pub unread_counts: HashMap<String, u32>,
    /// Creation timestamp (Unix milliseconds)
    pub created_at: i64,
    /// Last update timestamp (Unix milliseconds)
    pub updated_at: i64,
}

impl Chat {
    /// Create a new chat; duplicate participants are dropped
    pub fn new(id: String, chat_type: ChatType, participants: Vec<String>) -> Self {
        let mut unique: Vec<String> = Vec::with_capacity(participants.len());
        for p in participants {
            if !unique.contains(&p) {
                unique.push(p);
            }
        }
        let now = crate::now_millis();
        Self {
            id,
            chat_type,
            name: None,
            participants: unique,
            project_id: None,
            last_message: None,
            unread_counts: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the display name
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    /// Link the chat to a project
    pub fn with_project(mut self, project_id: &str) -> Self {
        self.project_id = Some(project_id.to_string());
        self
    }

    /// Check if `user_id` is a participant
    pub fn has_participant(&self, user_id: &str) -> bool {
        self.participants.iter().any(|p| p == user_id)
    }

    /// Unread count for `user_id` (0 when unknown)
    pub fn unread_count_for(&self, user_id: &str) -> u32 {
        self.unread_counts.get(user_id).copied().unwrap_or(0)
    }

    /// Display name, if set and non-blank
    pub fn display_name(&self) -> Option<&str> {
        self.name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }
}
