//! Local chat store
//!
//! SQLite-backed implementation of [`ChatDataSource`]:
//! - Chats, participants and per-user unread counters
//! - Messages with read receipts and delivery status
//! - Live snapshots: every write re-publishes the affected chat lists and
//!   message lists to their subscribers

use crate::{
    model::{Chat, ChatType, DeliveryStatus, Message, MessageKind},
    source::{ChatDataSource, LiveSnapshots},
    Error, Result,
};
use async_trait::async_trait;
use futures_util::StreamExt;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::{debug, warn};

/// Snapshot published to subscribers
#[derive(Debug, Clone)]
enum Published<T> {
    Ready(Vec<T>),
    Failed(String),
}

impl<T> Published<T> {
    fn from_result(result: Result<Vec<T>>) -> Self {
        match result {
            Ok(items) => Published::Ready(items),
            Err(e) => Published::Failed(e.to_string()),
        }
    }

    fn into_result(self) -> Result<Vec<T>> {
        match self {
            Published::Ready(items) => Ok(items),
            Published::Failed(reason) => Err(Error::Subscription(reason)),
        }
    }
}

/// Live channels, created on first subscription
#[derive(Default)]
struct Channels {
    /// Chat list per user ID
    chats: HashMap<String, watch::Sender<Published<Chat>>>,
    /// Message list per chat ID
    messages: HashMap<String, watch::Sender<Published<Message>>>,
}

/// Chat store with SQLite persistence and live snapshots
///
/// # Example
/// ```rust,no_run
/// use chatwatch::model::{Chat, ChatType, Message};
/// use chatwatch::store::ChatStore;
///
/// # fn example() -> chatwatch::Result<()> {
/// let store = ChatStore::open_in_memory()?;
/// store.create_chat(&Chat::new(
///     "chat_1".to_string(),
///     ChatType::Direct,
///     vec!["alice".to_string(), "bob".to_string()],
/// ))?;
///
/// store.send_message(Message::text("chat_1", "bob", "Bob", "Hi Alice"))?;
/// let chat = store.get_chat("chat_1")?.expect("chat exists");
/// assert_eq!(chat.unread_count_for("alice"), 1);
/// # Ok(())
/// # }
/// ```
///
/// Clones share the same database and subscribers.
#[derive(Clone)]
pub struct ChatStore {
    conn: Arc<Mutex<Connection>>,
    channels: Arc<Mutex<Channels>>,
}

impl ChatStore {
    /// Open a store with an in-memory database
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    /// Open a store backed by the database file at `path`
    ///
    /// # Arguments
    /// * `path` - SQLite database file, created if missing
    ///
    /// # Returns
    /// A store with the schema initialized
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::with_connection(Connection::open(path)?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            channels: Arc::new(Mutex::new(Channels::default())),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Storage("Chat store connection lock poisoned".to_string()))
    }

    fn channels(&self) -> Result<MutexGuard<'_, Channels>> {
        self.channels
            .lock()
            .map_err(|_| Error::Storage("Chat store channel lock poisoned".to_string()))
    }

    /// Create a chat and its participants
    ///
    /// # Errors
    /// Fails if a chat with the same ID already exists.
    pub fn create_chat(&self, chat: &Chat) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let last_message = chat
            .last_message
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        tx.execute(
            "INSERT INTO chats (id, chat_type, name, project_id, last_message, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                chat.id,
                chat.chat_type.as_str(),
                chat.name,
                chat.project_id,
                last_message,
                chat.created_at,
                chat.updated_at,
            ],
        )?;

        for (position, user_id) in chat.participants.iter().enumerate() {
            tx.execute(
                "INSERT INTO chat_participants (chat_id, user_id, position, unread_count)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    chat.id,
                    user_id,
                    position as i64,
                    chat.unread_count_for(user_id),
                ],
            )?;
        }

        tx.commit()?;
        debug!(chat_id = %chat.id, participants = chat.participants.len(), "Created chat");

        self.publish(&conn, &chat.id)
    }

    /// Get a chat by ID
    pub fn get_chat(&self, chat_id: &str) -> Result<Option<Chat>> {
        let conn = self.conn()?;
        load_chat(&conn, chat_id)
    }

    /// Chats `user_id` participates in, most recently updated first
    pub fn chats_for_user(&self, user_id: &str) -> Result<Vec<Chat>> {
        let conn = self.conn()?;
        load_chats_for_user(&conn, user_id)
    }

    /// Messages of a chat, oldest first
    pub fn messages(&self, chat_id: &str) -> Result<Vec<Message>> {
        let conn = self.conn()?;
        load_messages(&conn, chat_id)
    }

    /// Store a new message
    ///
    /// The stored copy has status `Sent`, becomes the chat's last message,
    /// and bumps the unread counter of every participant except the sender
    /// and those already listed in `read_by`.
    ///
    /// # Arguments
    /// * `message` - Message to store
    ///
    /// # Returns
    /// The stored copy of the message
    ///
    /// # Errors
    /// Fails if the chat doesn't exist or the sender is not a participant.
    pub fn send_message(&self, mut message: Message) -> Result<Message> {
        let mut conn = self.conn()?;

        let chat = load_chat(&conn, &message.chat_id)?
            .ok_or_else(|| Error::Storage(format!("Chat not found: {}", message.chat_id)))?;
        if !chat.has_participant(&message.sender_id) {
            return Err(Error::Storage(format!(
                "User {} is not a participant of chat {}",
                message.sender_id, message.chat_id
            )));
        }

        message.status = DeliveryStatus::Sent;
        let read_by = serde_json::to_string(&message.read_by)?;
        let last_message = serde_json::to_string(&message)?;

        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO messages
             (id, chat_id, sender_id, sender_name, content, kind, reply_to, read_by, sent_at, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                message.id,
                message.chat_id,
                message.sender_id,
                message.sender_name,
                message.content,
                message.kind.as_str(),
                message.reply_to,
                read_by,
                message.sent_at,
                message.status.as_str(),
            ],
        )?;
        tx.execute(
            "UPDATE chats SET last_message = ?1, updated_at = MAX(updated_at, ?2) WHERE id = ?3",
            params![last_message, message.sent_at, message.chat_id],
        )?;
        for user_id in chat
            .participants
            .iter()
            .filter(|user_id| message.is_eligible_for(user_id))
        {
            tx.execute(
                "UPDATE chat_participants SET unread_count = unread_count + 1
                 WHERE chat_id = ?1 AND user_id = ?2",
                params![message.chat_id, user_id],
            )?;
        }
        tx.commit()?;

        debug!(chat_id = %message.chat_id, message_id = %message.id, "Stored message");
        self.publish(&conn, &message.chat_id)?;
        Ok(message)
    }

    /// Record that `user_id` read a message
    ///
    /// Idempotent: returns `Ok(false)` without touching anything if the user
    /// had already read it. On the first read the unread counter of the user
    /// is decremented (never below zero).
    ///
    /// # Errors
    /// Fails if the message doesn't exist in `chat_id`.
    pub fn mark_read(&self, message_id: &str, chat_id: &str, user_id: &str) -> Result<bool> {
        let mut conn = self.conn()?;

        let mut message = load_message(&conn, message_id, chat_id)?.ok_or_else(|| {
            Error::Storage(format!("Message {} not found in chat {}", message_id, chat_id))
        })?;

        if !message.mark_read_by(user_id) {
            return Ok(false);
        }

        let tx = conn.transaction()?;
        write_read_state(&tx, &message)?;
        tx.execute(
            "UPDATE chat_participants SET unread_count = MAX(unread_count - 1, 0)
             WHERE chat_id = ?1 AND user_id = ?2",
            params![chat_id, user_id],
        )?;
        tx.commit()?;

        debug!(chat_id, message_id, user_id, "Marked message read");
        self.publish(&conn, chat_id)?;
        Ok(true)
    }

    /// Mark every message of a chat read for `user_id` and reset their
    /// unread counter
    ///
    /// # Returns
    /// How many messages were newly marked
    pub fn mark_chat_read(&self, chat_id: &str, user_id: &str) -> Result<usize> {
        let mut conn = self.conn()?;

        let unread: Vec<Message> = load_messages(&conn, chat_id)?
            .into_iter()
            .filter(|m| m.is_eligible_for(user_id))
            .collect();

        let tx = conn.transaction()?;
        for mut message in unread.iter().cloned() {
            message.mark_read_by(user_id);
            write_read_state(&tx, &message)?;
        }
        tx.execute(
            "UPDATE chat_participants SET unread_count = 0 WHERE chat_id = ?1 AND user_id = ?2",
            params![chat_id, user_id],
        )?;
        tx.commit()?;

        if !unread.is_empty() {
            debug!(chat_id, user_id, count = unread.len(), "Marked chat read");
        }
        self.publish(&conn, chat_id)?;
        Ok(unread.len())
    }

    /// Add a participant to a chat. Returns `false` if already present
    pub fn add_participant(&self, chat_id: &str, user_id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let chat = load_chat(&conn, chat_id)?
            .ok_or_else(|| Error::Storage(format!("Chat not found: {}", chat_id)))?;
        if chat.has_participant(user_id) {
            return Ok(false);
        }

        conn.execute(
            "INSERT INTO chat_participants (chat_id, user_id, position, unread_count)
             VALUES (?1, ?2, ?3, 0)",
            params![chat_id, user_id, chat.participants.len() as i64],
        )?;
        touch_chat(&conn, chat_id)?;

        self.publish(&conn, chat_id)?;
        Ok(true)
    }

    /// Remove a participant from a chat. Returns `false` if not present
    pub fn remove_participant(&self, chat_id: &str, user_id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let removed = conn.execute(
            "DELETE FROM chat_participants WHERE chat_id = ?1 AND user_id = ?2",
            params![chat_id, user_id],
        )?;
        if removed == 0 {
            return Ok(false);
        }
        touch_chat(&conn, chat_id)?;

        self.publish(&conn, chat_id)?;
        Ok(true)
    }

    /// Delete a chat with its participants and messages
    pub fn delete_chat(&self, chat_id: &str) -> Result<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM messages WHERE chat_id = ?1", params![chat_id])?;
        tx.execute(
            "DELETE FROM chat_participants WHERE chat_id = ?1",
            params![chat_id],
        )?;
        let deleted = tx.execute("DELETE FROM chats WHERE id = ?1", params![chat_id])?;
        tx.commit()?;

        if deleted > 0 {
            debug!(chat_id, "Deleted chat");
            self.publish(&conn, chat_id)?;
        }
        Ok(deleted > 0)
    }

    /// Re-publish snapshots affected by a write to `chat_id`
    ///
    /// Membership may have changed, so every chat-list channel is refreshed.
    /// Channels without subscribers are dropped.
    fn publish(&self, conn: &Connection, chat_id: &str) -> Result<()> {
        let mut channels = self.channels()?;

        channels.chats.retain(|_, tx| tx.receiver_count() > 0);
        channels.messages.retain(|_, tx| tx.receiver_count() > 0);

        for (user_id, tx) in channels.chats.iter() {
            let snapshot = load_chats_for_user(conn, user_id);
            if let Err(e) = &snapshot {
                warn!(user_id = %user_id, "Failed to load chat list: {}", e);
            }
            tx.send_replace(Published::from_result(snapshot));
        }

        if let Some(tx) = channels.messages.get(chat_id) {
            let snapshot = load_messages(conn, chat_id);
            if let Err(e) = &snapshot {
                warn!(chat_id, "Failed to load messages: {}", e);
            }
            tx.send_replace(Published::from_result(snapshot));
        }

        Ok(())
    }

    fn subscribe_chats(&self, user_id: &str) -> Result<watch::Receiver<Published<Chat>>> {
        let conn = self.conn()?;
        let mut channels = self.channels()?;
        if let Some(tx) = channels.chats.get(user_id) {
            return Ok(tx.subscribe());
        }
        let (tx, rx) = watch::channel(Published::from_result(load_chats_for_user(&conn, user_id)));
        channels.chats.insert(user_id.to_string(), tx);
        Ok(rx)
    }

    fn subscribe_messages(&self, chat_id: &str) -> Result<watch::Receiver<Published<Message>>> {
        let conn = self.conn()?;
        let mut channels = self.channels()?;
        if let Some(tx) = channels.messages.get(chat_id) {
            return Ok(tx.subscribe());
        }
        let (tx, rx) = watch::channel(Published::from_result(load_messages(&conn, chat_id)));
        channels.messages.insert(chat_id.to_string(), tx);
        Ok(rx)
    }
}

#[async_trait]
impl ChatDataSource for ChatStore {
    fn chats_for(&self, user_id: &str) -> LiveSnapshots<Chat> {
        match self.subscribe_chats(user_id) {
            Ok(rx) => watch_snapshots(rx),
            Err(e) => failed_snapshots(e),
        }
    }

    fn messages_for(&self, chat_id: &str) -> LiveSnapshots<Message> {
        match self.subscribe_messages(chat_id) {
            Ok(rx) => watch_snapshots(rx),
            Err(e) => failed_snapshots(e),
        }
    }

    /// Runs the SQLite write on the blocking pool
    async fn mark_read(&self, message_id: &str, chat_id: &str, user_id: &str) -> Result<()> {
        let store = self.clone();
        let (message_id, chat_id, user_id) = (
            message_id.to_string(),
            chat_id.to_string(),
            user_id.to_string(),
        );
        tokio::task::spawn_blocking(move || store.mark_read(&message_id, &chat_id, &user_id))
            .await
            .map_err(|e| Error::Storage(format!("Mark read task failed: {}", e)))?
            .map(|_| ())
    }
}

/// Stream the current value of `rx`, then every change
fn watch_snapshots<T>(rx: watch::Receiver<Published<T>>) -> LiveSnapshots<T>
where
    T: Clone + Send + Sync + 'static,
{
    futures_util::stream::unfold((rx, true), |(mut rx, first)| async move {
        if !first && rx.changed().await.is_err() {
            return None;
        }
        let snapshot = rx.borrow_and_update().clone().into_result();
        Some((snapshot, (rx, false)))
    })
    .boxed()
}

fn failed_snapshots<T: Send + 'static>(error: Error) -> LiveSnapshots<T> {
    futures_util::stream::once(async move { Err(error) }).boxed()
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS chats (
            id TEXT PRIMARY KEY,
            chat_type TEXT NOT NULL,
            name TEXT,
            project_id TEXT,
            last_message TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE TABLE IF NOT EXISTS chat_participants (
            chat_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            unread_count INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (chat_id, user_id)
        );
        CREATE INDEX IF NOT EXISTS idx_participants_user ON chat_participants(user_id);
        CREATE TABLE IF NOT EXISTS messages (
            id TEXT PRIMARY KEY,
            chat_id TEXT NOT NULL,
            sender_id TEXT NOT NULL,
            sender_name TEXT NOT NULL,
            content TEXT NOT NULL,
            kind TEXT NOT NULL,
            reply_to TEXT,
            read_by TEXT NOT NULL,
            sent_at INTEGER NOT NULL,
            status TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_messages_chat_sent ON messages(chat_id, sent_at);",
    )?;
    Ok(())
}

fn touch_chat(conn: &Connection, chat_id: &str) -> Result<()> {
    conn.execute(
        "UPDATE chats SET updated_at = MAX(updated_at, ?1) WHERE id = ?2",
        params![crate::now_millis(), chat_id],
    )?;
    Ok(())
}

fn write_read_state(conn: &Connection, message: &Message) -> Result<()> {
    conn.execute(
        "UPDATE messages SET read_by = ?1, status = ?2 WHERE id = ?3",
        params![
            serde_json::to_string(&message.read_by)?,
            message.status.as_str(),
            message.id
        ],
    )?;
    Ok(())
}

fn load_chat(conn: &Connection, chat_id: &str) -> Result<Option<Chat>> {
    let row = conn
        .query_row(
            "SELECT id, chat_type, name, project_id, last_message, created_at, updated_at
             FROM chats WHERE id = ?1",
            params![chat_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, i64>(5)?,
                    row.get::<_, i64>(6)?,
                ))
            },
        )
        .optional()?;

    let Some((id, chat_type, name, project_id, last_message, created_at, updated_at)) = row else {
        return Ok(None);
    };

    let chat_type = ChatType::parse(&chat_type)
        .ok_or_else(|| Error::Storage(format!("Unknown chat type: {}", chat_type)))?;
    let last_message = last_message
        .map(|json| serde_json::from_str::<Message>(&json))
        .transpose()?;

    let mut stmt = conn.prepare(
        "SELECT user_id, unread_count FROM chat_participants
         WHERE chat_id = ?1 ORDER BY position ASC",
    )?;
    let rows = stmt.query_map(params![chat_id], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?))
    })?;

    let mut participants = Vec::new();
    let mut unread_counts = HashMap::new();
    for row in rows {
        let (user_id, unread) = row?;
        unread_counts.insert(user_id.clone(), unread);
        participants.push(user_id);
    }

    Ok(Some(Chat {
        id,
        chat_type,
        name,
        participants,
        project_id,
        last_message,
        unread_counts,
        created_at,
        updated_at,
    }))
}

fn load_chats_for_user(conn: &Connection, user_id: &str) -> Result<Vec<Chat>> {
    let mut stmt = conn.prepare(
        "SELECT c.id FROM chats c
         JOIN chat_participants p ON p.chat_id = c.id
         WHERE p.user_id = ?1
         ORDER BY c.updated_at DESC, c.id ASC",
    )?;
    let ids = stmt.query_map(params![user_id], |row| row.get::<_, String>(0))?;

    let mut chats = Vec::new();
    for id in ids {
        if let Some(chat) = load_chat(conn, &id?)? {
            chats.push(chat);
        }
    }
    Ok(chats)
}

const MESSAGE_COLUMNS: &str =
    "id, chat_id, sender_id, sender_name, content, kind, reply_to, read_by, sent_at, status";

/// Raw message row; `kind`, `status` and `read_by` are still text
struct MessageRow {
    message: Message,
    kind: String,
    status: String,
    read_by: String,
}

fn message_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRow> {
    let message = Message {
        id: row.get(0)?,
        chat_id: row.get(1)?,
        sender_id: row.get(2)?,
        sender_name: row.get(3)?,
        content: row.get(4)?,
        kind: MessageKind::default(),
        reply_to: row.get(6)?,
        read_by: Vec::new(),
        sent_at: row.get(8)?,
        status: DeliveryStatus::default(),
    };
    Ok(MessageRow {
        message,
        kind: row.get(5)?,
        status: row.get(9)?,
        read_by: row.get(7)?,
    })
}

fn finish_message(row: MessageRow) -> Result<Message> {
    let mut message = row.message;
    message.kind = MessageKind::parse(&row.kind)
        .ok_or_else(|| Error::Storage(format!("Unknown message kind: {}", row.kind)))?;
    message.status = DeliveryStatus::parse(&row.status)
        .ok_or_else(|| Error::Storage(format!("Unknown delivery status: {}", row.status)))?;
    message.read_by = serde_json::from_str(&row.read_by)?;
    Ok(message)
}

fn load_message(conn: &Connection, message_id: &str, chat_id: &str) -> Result<Option<Message>> {
    let sql = format!(
        "SELECT {} FROM messages WHERE id = ?1 AND chat_id = ?2",
        MESSAGE_COLUMNS
    );
    conn.query_row(&sql, params![message_id, chat_id], message_from_row)
        .optional()?
        .map(finish_message)
        .transpose()
}

fn load_messages(conn: &Connection, chat_id: &str) -> Result<Vec<Message>> {
    let sql = format!(
        "SELECT {} FROM messages WHERE chat_id = ?1 ORDER BY sent_at ASC, id ASC",
        MESSAGE_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![chat_id], message_from_row)?;

    let mut messages = Vec::new();
    for row in rows {
        messages.push(finish_message(row?)?);
    }
    Ok(messages)
}
