mod common;

use std::time::Duration;
use tokio::time::timeout;
use uuid::Uuid;

use carelink_messaging::realtime::{ConversationFeed, MessageFeed};
use carelink_messaging::models::NewMessage;
use carelink_messaging::services::conversation_service::ConversationService;
use carelink_messaging::services::message_service::MessageService;
use carelink_messaging::AppError;

use common::{direct_conversation, world};

const WAIT: Duration = Duration::from_secs(2);

async fn next_snapshot(
    rx: &mut tokio::sync::mpsc::UnboundedReceiver<ConversationFeed>,
) -> Vec<carelink_messaging::models::Conversation> {
    match timeout(WAIT, rx.recv()).await.expect("feed item in time") {
        Some(ConversationFeed::Snapshot(conversations)) => conversations,
        other => panic!("expected snapshot, got {other:?}"),
    }
}

#[tokio::test]
async fn conversation_feed_starts_with_a_snapshot_and_tracks_changes() {
    let w = world();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let id = direct_conversation(&w, a, b, Uuid::new_v4()).await;

    let mut rx = w
        .state
        .subscriptions
        .subscribe_to_conversations(b, "list:b")
        .await;

    let initial = next_snapshot(&mut rx).await;
    assert_eq!(initial.len(), 1);
    assert_eq!(initial[0].id, id);
    assert_eq!(initial[0].unread_for(b), 0);

    MessageService::send(
        &w.state.store,
        &w.state.config,
        NewMessage::text(id, a, "Alex", "ping"),
    )
    .await
    .unwrap();

    let updated = next_snapshot(&mut rx).await;
    assert_eq!(updated[0].unread_for(b), 1);
    assert!(updated[0].last_message.is_some());

    w.state.subscriptions.unsubscribe("list:b").await;
}

#[tokio::test]
async fn deactivation_removes_the_conversation_from_the_live_view() {
    let w = world();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let id = direct_conversation(&w, a, b, Uuid::new_v4()).await;

    let mut rx = w
        .state
        .subscriptions
        .subscribe_to_conversations(b, "list:b")
        .await;
    assert_eq!(next_snapshot(&mut rx).await.len(), 1);

    ConversationService::deactivate(&w.state.store, &w.state.config, id, a)
        .await
        .unwrap();

    let after = next_snapshot(&mut rx).await;
    assert!(after.is_empty());
}

#[tokio::test]
async fn message_feed_streams_inserts_edits_and_deletes() {
    let w = world();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let id = direct_conversation(&w, a, b, Uuid::new_v4()).await;

    let mut rx = w
        .state
        .subscriptions
        .subscribe_to_messages(id, b, "thread:b")
        .await
        .unwrap();

    let sent = MessageService::send(
        &w.state.store,
        &w.state.config,
        NewMessage::text(id, a, "Alex", "hello"),
    )
    .await
    .unwrap();
    match timeout(WAIT, rx.recv()).await.unwrap() {
        Some(MessageFeed::New(message)) => assert_eq!(message.id, sent.id),
        other => panic!("expected new-message event, got {other:?}"),
    }

    MessageService::edit(&w.state.store, &w.state.config, sent.id, a, "hello!")
        .await
        .unwrap();
    match timeout(WAIT, rx.recv()).await.unwrap() {
        Some(MessageFeed::Edited(message)) => {
            assert_eq!(message.id, sent.id);
            assert!(message.is_edited);
        }
        other => panic!("expected edit event, got {other:?}"),
    }

    MessageService::delete(&w.state.store, &w.state.config, sent.id, a)
        .await
        .unwrap();
    match timeout(WAIT, rx.recv()).await.unwrap() {
        Some(MessageFeed::Deleted(message_id)) => assert_eq!(message_id, sent.id),
        other => panic!("expected delete event, got {other:?}"),
    }
}

#[tokio::test]
async fn message_feed_ignores_other_conversations() {
    let w = world();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let id = direct_conversation(&w, a, b, Uuid::new_v4()).await;
    let other = direct_conversation(&w, a, Uuid::new_v4(), Uuid::new_v4()).await;

    let mut rx = w
        .state
        .subscriptions
        .subscribe_to_messages(id, a, "thread:a")
        .await
        .unwrap();

    MessageService::send(
        &w.state.store,
        &w.state.config,
        NewMessage::text(other, a, "Alex", "elsewhere"),
    )
    .await
    .unwrap();
    let here = MessageService::send(
        &w.state.store,
        &w.state.config,
        NewMessage::text(id, a, "Alex", "here"),
    )
    .await
    .unwrap();

    // The first item on the feed is for this conversation, not the other.
    match timeout(WAIT, rx.recv()).await.unwrap() {
        Some(MessageFeed::New(message)) => assert_eq!(message.id, here.id),
        other => panic!("expected new-message event, got {other:?}"),
    }
}

#[tokio::test]
async fn subscribe_is_gate_checked_up_front() {
    let w = world();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let id = direct_conversation(&w, a, b, Uuid::new_v4()).await;

    let outsider = Uuid::new_v4();
    assert!(matches!(
        w.state
            .subscriptions
            .subscribe_to_messages(id, outsider, "thread:outsider")
            .await,
        Err(AppError::PermissionDenied)
    ));

    assert!(matches!(
        w.state
            .subscriptions
            .subscribe_to_messages(Uuid::new_v4(), a, "thread:missing")
            .await,
        Err(AppError::NotFound("conversation"))
    ));
}

#[tokio::test]
async fn logout_tears_down_every_subscription() {
    let w = world();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let id = direct_conversation(&w, a, b, Uuid::new_v4()).await;

    let _conversations = w
        .state
        .subscriptions
        .subscribe_to_conversations(a, "list:a")
        .await;
    let _messages = w
        .state
        .subscriptions
        .subscribe_to_messages(id, a, "thread:a")
        .await
        .unwrap();
    assert_eq!(w.state.subscriptions.active_count().await, 2);

    w.state.subscriptions.unsubscribe_all().await;
    assert_eq!(w.state.subscriptions.active_count().await, 0);
}

#[tokio::test]
async fn resubscribing_under_the_same_key_replaces_the_old_feed() {
    let w = world();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    direct_conversation(&w, a, b, Uuid::new_v4()).await;

    let _first = w
        .state
        .subscriptions
        .subscribe_to_conversations(a, "list:a")
        .await;
    let _second = w
        .state
        .subscriptions
        .subscribe_to_conversations(a, "list:a")
        .await;
    assert_eq!(w.state.subscriptions.active_count().await, 1);
}
