//! Chatwatch demo
//!
//! Runs the listener against an in-memory chat store and shows which
//! messages raise notifications, which are marked read and which are muted.

use chatwatch::model::{Chat, ChatType, Message};
use chatwatch::notification::LogSink;
use chatwatch::preferences::PreferencesManager;
use chatwatch::store::ChatStore;
use chatwatch::{ActiveChatTracker, ChatListener, Session};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    chatwatch::init();

    let store = Arc::new(ChatStore::open_in_memory()?);
    let me = "alice";

    store.create_chat(&Chat::new(
        "direct_bob".to_string(),
        ChatType::Direct,
        vec![me.to_string(), "bob".to_string()],
    ))?;
    store.create_chat(
        &Chat::new(
            "project_apollo".to_string(),
            ChatType::Project,
            vec![me.to_string(), "bob".to_string(), "carol".to_string()],
        )
        .with_name("Apollo launch")
        .with_project("apollo"),
    )?;
    store.create_chat(
        &Chat::new(
            "group_random".to_string(),
            ChatType::Group,
            vec![me.to_string(), "carol".to_string()],
        )
        .with_name("Random"),
    )?;

    let preferences = PreferencesManager::in_memory();
    preferences.mute("group_random").await?;

    let sink = Arc::new(LogSink::new());
    let dispatcher = preferences.dispatcher(sink.clone()).await;
    let listener = ChatListener::with_dispatcher(store.clone(), dispatcher, ActiveChatTracker::new());

    let handle = listener.start_listening(Session::new(me));
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Alice has the project chat open
    listener.set_active_chat(Some("project_apollo".to_string()));

    store.send_message(Message::text("direct_bob", "bob", "Bob", "Lunch?"))?;
    store.send_message(Message::text("project_apollo", "carol", "Carol", "Build is green"))?;
    store.send_message(Message::text("group_random", "carol", "Carol", "cat pictures"))?;
    store.send_message(Message::text("direct_bob", me, "Alice", "Sure"))?;

    tokio::time::sleep(Duration::from_millis(300)).await;

    for chat in store.chats_for_user(me)? {
        println!(
            "{:<16} unread for {}: {}",
            chat.id,
            me,
            chat.unread_count_for(me)
        );
    }
    for notification in sink.shown().await {
        println!(
            "notification [{}] {}: {} -> {}",
            notification.key,
            notification.title,
            notification.body,
            notification.route.deep_link()
        );
    }

    handle.stop();
    Ok(())
}
