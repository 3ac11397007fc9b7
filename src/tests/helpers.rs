//! Shared test fakes for listener and notification tests

use crate::model::{Chat, ChatType, Message};
use crate::notification::Notification;
use crate::source::{ChatDataSource, LiveSnapshots, NotificationPreferences, NotificationSink};
use crate::{Error, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;

/// Live feed of snapshots; late subscribers get the latest snapshot first
pub struct Feed<T> {
    latest: Option<Vec<T>>,
    subscribers: Vec<mpsc::UnboundedSender<Result<Vec<T>>>>,
}

impl<T> Default for Feed<T> {
    fn default() -> Self {
        Self {
            latest: None,
            subscribers: Vec::new(),
        }
    }
}

impl<T: Clone + Send + 'static> Feed<T> {
    fn subscribe(&mut self) -> LiveSnapshots<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Some(latest) = &self.latest {
            let _ = tx.send(Ok(latest.clone()));
        }
        self.subscribers.push(tx);
        futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })
        .boxed()
    }

    fn push(&mut self, items: Vec<T>) {
        self.latest = Some(items.clone());
        self.subscribers
            .retain(|tx| tx.send(Ok(items.clone())).is_ok());
    }

    fn fail(&mut self, reason: &str) {
        self.subscribers
            .retain(|tx| tx.send(Err(Error::Subscription(reason.to_string()))).is_ok());
    }
}

/// Data source driven by the test
#[derive(Default)]
pub struct ScriptedSource {
    chats: Mutex<Feed<Chat>>,
    messages: Mutex<HashMap<String, Feed<Message>>>,
    message_subscriptions: Mutex<HashMap<String, usize>>,
    mark_reads: Mutex<Vec<(String, String, String)>>,
    fail_mark_read: AtomicBool,
    broken_subscriptions: Mutex<HashSet<String>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_chats(&self, chats: Vec<Chat>) {
        self.chats.lock().unwrap().push(chats);
    }

    pub fn fail_chats(&self, reason: &str) {
        self.chats.lock().unwrap().fail(reason);
    }

    pub fn push_messages(&self, chat_id: &str, messages: Vec<Message>) {
        self.messages
            .lock()
            .unwrap()
            .entry(chat_id.to_string())
            .or_default()
            .push(messages);
    }

    pub fn fail_messages(&self, chat_id: &str, reason: &str) {
        self.messages
            .lock()
            .unwrap()
            .entry(chat_id.to_string())
            .or_default()
            .fail(reason);
    }

    /// How many times `messages_for(chat_id)` was called
    pub fn message_subscriptions(&self, chat_id: &str) -> usize {
        self.message_subscriptions
            .lock()
            .unwrap()
            .get(chat_id)
            .copied()
            .unwrap_or(0)
    }

    /// Recorded `(message_id, chat_id, user_id)` mark-read calls
    pub fn mark_reads(&self) -> Vec<(String, String, String)> {
        self.mark_reads.lock().unwrap().clone()
    }

    /// Make the next `messages_for(chat_id)` yield one error and end
    pub fn break_next_subscription(&self, chat_id: &str) {
        self.broken_subscriptions
            .lock()
            .unwrap()
            .insert(chat_id.to_string());
    }

    pub fn set_fail_mark_read(&self, fail: bool) {
        self.fail_mark_read.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChatDataSource for ScriptedSource {
    fn chats_for(&self, _user_id: &str) -> LiveSnapshots<Chat> {
        self.chats.lock().unwrap().subscribe()
    }

    fn messages_for(&self, chat_id: &str) -> LiveSnapshots<Message> {
        *self
            .message_subscriptions
            .lock()
            .unwrap()
            .entry(chat_id.to_string())
            .or_default() += 1;
        if self.broken_subscriptions.lock().unwrap().remove(chat_id) {
            let error = Error::Subscription(format!("subscription to {} rejected", chat_id));
            return futures_util::stream::once(async move { Err(error) }).boxed();
        }
        self.messages
            .lock()
            .unwrap()
            .entry(chat_id.to_string())
            .or_default()
            .subscribe()
    }

    async fn mark_read(&self, message_id: &str, chat_id: &str, user_id: &str) -> Result<()> {
        self.mark_reads.lock().unwrap().push((
            message_id.to_string(),
            chat_id.to_string(),
            user_id.to_string(),
        ));
        if self.fail_mark_read.load(Ordering::SeqCst) {
            return Err(Error::Storage("mark read rejected".to_string()));
        }
        Ok(())
    }
}

/// Sink that records every notify call
#[derive(Default)]
pub struct RecordingSink {
    notifications: Mutex<Vec<Notification>>,
    fail: AtomicBool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let sink = Self::default();
        sink.fail.store(true, Ordering::SeqCst);
        sink
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn notify(&self, notification: Notification) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Notification("platform refused".to_string()));
        }
        self.notifications.lock().unwrap().push(notification);
        Ok(())
    }
}

/// Preferences whose lookup always fails
pub struct FailingPreferences;

#[async_trait]
impl NotificationPreferences for FailingPreferences {
    async fn muted_chats(&self) -> Result<HashSet<String>> {
        Err(Error::Preferences("preference store offline".to_string()))
    }
}

/// Preferences that take a while to answer
pub struct SlowPreferences {
    pub delay: Duration,
    pub muted: HashSet<String>,
}

#[async_trait]
impl NotificationPreferences for SlowPreferences {
    async fn muted_chats(&self) -> Result<HashSet<String>> {
        tokio::time::sleep(self.delay).await;
        Ok(self.muted.clone())
    }
}

pub fn direct_chat(id: &str, users: &[&str]) -> Chat {
    Chat::new(
        id.to_string(),
        ChatType::Direct,
        users.iter().map(|u| u.to_string()).collect(),
    )
}

pub fn message(id: &str, chat_id: &str, sender: &str, content: &str) -> Message {
    Message::new(
        id.to_string(),
        chat_id.to_string(),
        sender.to_string(),
        format!("{} name", sender),
        content.to_string(),
        1_700_000_000_000,
    )
}

/// Poll `condition` until it holds or two seconds pass
pub async fn wait_until<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Give background tasks time to react before asserting that nothing happened
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(150)).await;
}
