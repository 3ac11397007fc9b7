//! Chat listener
//!
//! Watches every chat the session user belongs to and takes exactly one
//! action per unread message:
//! - the chat is in the foreground: mark the message read
//! - otherwise: request a notification (suppressed for muted chats)
//!
//! Messages sent by the user, or already read by them, are ignored.
//!
//! One outer task follows the user's chat list. Each chat in the list gets
//! its own message subscription task, and each message snapshot is processed
//! in a child task that the next snapshot for the same chat cancels.

use crate::{
    active_chat::ActiveChatTracker,
    model::{Chat, Message},
    notification::{DispatchOutcome, NotificationDispatcher},
    session::Session,
    source::{ChatDataSource, NotificationPreferences, NotificationSink},
};
use futures_util::StreamExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How a new chat-list snapshot is applied to running message subscriptions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FanOutPolicy {
    /// Stop subscriptions of removed chats, start subscriptions of added
    /// chats, keep the rest running with refreshed chat metadata
    #[default]
    Reconcile,
    /// Stop every subscription and start one per chat in the snapshot
    Restart,
}

/// What the listener did with an eligible message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MessageAction {
    MarkedRead,
    MarkReadFailed,
    Notified(DispatchOutcome),
}

/// Task handle that aborts its task when dropped
#[derive(Debug)]
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// A running message subscription for one chat
struct ChatSubscription {
    /// Latest chat metadata, read when a snapshot is processed
    chat: watch::Sender<Chat>,
    task: AbortOnDrop,
}

impl ChatSubscription {
    /// Whether the message stream is still being followed
    fn is_running(&self) -> bool {
        !self.task.0.is_finished()
    }
}

#[derive(Default)]
struct Subscriptions {
    stopped: bool,
    chats: HashMap<String, ChatSubscription>,
}

type SharedSubscriptions = Arc<Mutex<Subscriptions>>;

fn lock(subscriptions: &SharedSubscriptions) -> MutexGuard<'_, Subscriptions> {
    subscriptions
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Everything a running listener needs, bound to one session
struct ListenerContext {
    source: Arc<dyn ChatDataSource>,
    dispatcher: NotificationDispatcher,
    tracker: ActiveChatTracker,
    policy: FanOutPolicy,
    user_id: String,
}

/// Chat delivery and notification pipeline
///
/// # Example
/// ```rust,no_run
/// use chatwatch::{ActiveChatTracker, ChatListener, Session};
/// use chatwatch::notification::LogSink;
/// use chatwatch::preferences::PreferencesManager;
/// use chatwatch::store::ChatStore;
/// use std::sync::Arc;
///
/// # async fn example() -> chatwatch::Result<()> {
/// let store = ChatStore::open("chats.db")?;
/// let listener = ChatListener::new(
///     Arc::new(store),
///     Arc::new(PreferencesManager::in_memory()),
///     Arc::new(LogSink::new()),
///     ActiveChatTracker::new(),
/// );
///
/// let handle = listener.start_listening(Session::new("alice"));
///
/// // Chat screen gained focus
/// listener.set_active_chat(Some("chat_1".to_string()));
///
/// // Sign-out
/// handle.stop();
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ChatListener {
    source: Arc<dyn ChatDataSource>,
    dispatcher: NotificationDispatcher,
    tracker: ActiveChatTracker,
    policy: FanOutPolicy,
}

impl ChatListener {
    /// Create a listener with a default notification dispatcher
    pub fn new(
        source: Arc<dyn ChatDataSource>,
        preferences: Arc<dyn NotificationPreferences>,
        sink: Arc<dyn NotificationSink>,
        tracker: ActiveChatTracker,
    ) -> Self {
        Self::with_dispatcher(source, NotificationDispatcher::new(preferences, sink), tracker)
    }

    /// Create a listener with a preconfigured dispatcher
    pub fn with_dispatcher(
        source: Arc<dyn ChatDataSource>,
        dispatcher: NotificationDispatcher,
        tracker: ActiveChatTracker,
    ) -> Self {
        Self {
            source,
            dispatcher,
            tracker,
            policy: FanOutPolicy::default(),
        }
    }

    /// Choose how chat-list changes are applied
    pub fn with_policy(mut self, policy: FanOutPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The active-chat tracker shared with the UI layer
    pub fn tracker(&self) -> &ActiveChatTracker {
        &self.tracker
    }

    /// Record which chat is in the foreground (`None` when none is)
    pub fn set_active_chat(&self, chat_id: Option<String>) {
        self.tracker.set(chat_id);
    }

    /// Start watching the session user's chats
    ///
    /// Returns immediately; all work happens on spawned tasks. Must be
    /// called from within a Tokio runtime.
    ///
    /// # Arguments
    /// * `session` - Signed-in user to listen for
    ///
    /// # Returns
    /// Handle that stops the listener when stopped or dropped
    pub fn start_listening(&self, session: Session) -> ListenerHandle {
        let context = Arc::new(ListenerContext {
            source: self.source.clone(),
            dispatcher: self.dispatcher.clone(),
            tracker: self.tracker.clone(),
            policy: self.policy,
            user_id: session.user_id().to_string(),
        });
        let subscriptions: SharedSubscriptions = Arc::new(Mutex::new(Subscriptions::default()));

        info!(user_id = %context.user_id, policy = ?context.policy, "Starting chat listener");

        let task = tokio::spawn(run_chat_list(context, subscriptions.clone()));

        ListenerHandle {
            session,
            outer: AbortOnDrop(task),
            subscriptions,
        }
    }

    /// Stop `handle` and start listening for `session`
    ///
    /// Used when the signed-in user changes.
    pub fn restart(&self, handle: ListenerHandle, session: Session) -> ListenerHandle {
        handle.stop();
        drop(handle);
        self.start_listening(session)
    }
}

/// Handle to a running listener; dropping it stops the listener
pub struct ListenerHandle {
    session: Session,
    outer: AbortOnDrop,
    subscriptions: SharedSubscriptions,
}

impl ListenerHandle {
    /// Session this listener runs for
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Stop the chat-list subscription and every message subscription
    pub fn stop(&self) {
        self.outer.0.abort();
        let mut subs = lock(&self.subscriptions);
        if !subs.stopped {
            subs.stopped = true;
            let count = subs.chats.len();
            subs.chats.clear();
            info!(user_id = %self.session.user_id(), subscriptions = count, "Chat listener stopped");
        }
    }

    /// Whether the listener is still following the chat list
    pub fn is_running(&self) -> bool {
        !lock(&self.subscriptions).stopped && !self.outer.0.is_finished()
    }

    /// IDs of chats with a running message subscription, sorted
    ///
    /// A chat whose message stream ended is left out until the next
    /// chat-list snapshot subscribes it again.
    pub fn subscribed_chats(&self) -> Vec<String> {
        let subs = lock(&self.subscriptions);
        let mut ids: Vec<String> = subs
            .chats
            .iter()
            .filter(|(_, sub)| sub.is_running())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Follow the user's chat list and keep one message subscription per chat
async fn run_chat_list(context: Arc<ListenerContext>, subscriptions: SharedSubscriptions) {
    let mut chats = context.source.chats_for(&context.user_id);

    while let Some(snapshot) = chats.next().await {
        match snapshot {
            Ok(list) => apply_chat_snapshot(&context, &subscriptions, list),
            Err(e) => warn!(user_id = %context.user_id, "Chat list snapshot failed: {}", e),
        }
    }

    debug!(user_id = %context.user_id, "Chat list stream ended");
}

fn apply_chat_snapshot(
    context: &Arc<ListenerContext>,
    subscriptions: &SharedSubscriptions,
    chats: Vec<Chat>,
) {
    let mut incoming: HashMap<String, Chat> = HashMap::with_capacity(chats.len());
    for chat in chats {
        incoming.insert(chat.id.clone(), chat);
    }

    let mut subs = lock(subscriptions);
    if subs.stopped {
        return;
    }

    let before = subs.chats.len();
    match context.policy {
        FanOutPolicy::Restart => subs.chats.clear(),
        // A chat whose message stream ended is subscribed again
        FanOutPolicy::Reconcile => subs
            .chats
            .retain(|id, sub| incoming.contains_key(id) && sub.is_running()),
    }
    let removed = before - subs.chats.len();

    let mut added = 0;
    for (chat_id, chat) in incoming {
        match subs.chats.get(&chat_id) {
            Some(existing) => {
                existing.chat.send_replace(chat);
            }
            None => {
                let (chat_tx, chat_rx) = watch::channel(chat);
                let task = tokio::spawn(run_chat(context.clone(), chat_id.clone(), chat_rx));
                subs.chats.insert(
                    chat_id,
                    ChatSubscription {
                        chat: chat_tx,
                        task: AbortOnDrop(task),
                    },
                );
                added += 1;
            }
        }
    }

    debug!(
        user_id = %context.user_id,
        added,
        removed,
        total = subs.chats.len(),
        "Applied chat list snapshot"
    );
}

/// Follow one chat's messages; each snapshot supersedes the previous one
async fn run_chat(context: Arc<ListenerContext>, chat_id: String, chat: watch::Receiver<Chat>) {
    let mut messages = context.source.messages_for(&chat_id);
    let mut in_flight: Option<AbortOnDrop> = None;

    while let Some(snapshot) = messages.next().await {
        match snapshot {
            Ok(list) => {
                // Replacing the guard cancels processing of the stale snapshot
                let current = chat.borrow().clone();
                let task = tokio::spawn(process_snapshot(context.clone(), current, list));
                in_flight = Some(AbortOnDrop(task));
            }
            Err(e) => warn!(chat_id = %chat_id, "Message snapshot failed: {}", e),
        }
    }

    debug!(chat_id = %chat_id, "Message stream ended");
    if let Some(mut last) = in_flight.take() {
        let _ = (&mut last.0).await;
    }
}

async fn process_snapshot(context: Arc<ListenerContext>, chat: Chat, messages: Vec<Message>) {
    let eligible: Vec<Message> = messages
        .into_iter()
        .filter(|m| m.is_eligible_for(&context.user_id))
        .collect();

    if eligible.is_empty() {
        return;
    }

    debug!(chat_id = %chat.id, unread = eligible.len(), "Processing unread messages");

    let actions = futures_util::future::join_all(
        eligible
            .iter()
            .map(|message| handle_message(&context, &chat, message)),
    )
    .await;

    let marked = actions
        .iter()
        .filter(|a| **a == MessageAction::MarkedRead)
        .count();
    let notified = actions
        .iter()
        .filter(|a| **a == MessageAction::Notified(DispatchOutcome::Sent))
        .count();
    debug!(chat_id = %chat.id, marked, notified, "Processed unread messages");
}

async fn handle_message(context: &ListenerContext, chat: &Chat, message: &Message) -> MessageAction {
    if context.tracker.is_active(&chat.id) {
        match context
            .source
            .mark_read(&message.id, &chat.id, &context.user_id)
            .await
        {
            Ok(()) => {
                debug!(chat_id = %chat.id, message_id = %message.id, "Marked message read");
                MessageAction::MarkedRead
            }
            Err(e) => {
                warn!(chat_id = %chat.id, message_id = %message.id, "Failed to mark message read: {}", e);
                MessageAction::MarkReadFailed
            }
        }
    } else {
        MessageAction::Notified(context.dispatcher.dispatch(message, chat).await)
    }
}
