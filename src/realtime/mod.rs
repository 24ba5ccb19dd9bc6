//! Real-time delivery: live conversation-list snapshots and per-thread
//! message feeds, driven by the store's change feed. Subscriptions are
//! tracked in a keyed registry owned by the session so logout can tear
//! everything down at once, with no ambient global listener state.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::Config;
use crate::error::AppResult;
use crate::models::{Conversation, Message};
use crate::services::conversation_service::{ConversationService, ListOptions};
use crate::services::permission;
use crate::store::{MemoryStore, StoreEvent};

/// Transport-level failure surfaced into a feed instead of being swallowed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    /// Subscriber fell behind the change feed; `skipped` events were
    /// dropped. Conversation feeds resynchronize with a fresh snapshot.
    TransportLagged { skipped: u64 },
    /// Change feed closed underneath the subscription.
    TransportUnavailable,
}

#[derive(Debug, Clone)]
pub enum ConversationFeed {
    /// Full current result set, sent on subscribe and after every change.
    Snapshot(Vec<Conversation>),
    Error(FeedError),
}

#[derive(Debug, Clone)]
pub enum MessageFeed {
    New(Message),
    Edited(Message),
    Deleted(Uuid),
    Error(FeedError),
}

/// Keyed registry of live subscriptions, one per session. Dropping the
/// manager or calling [`SubscriptionManager::unsubscribe_all`] on logout
/// aborts every feed task, preventing leaked listeners and cross-session
/// data bleed.
pub struct SubscriptionManager {
    store: Arc<MemoryStore>,
    config: Arc<Config>,
    tasks: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl SubscriptionManager {
    pub fn new(store: Arc<MemoryStore>, config: Arc<Config>) -> Self {
        Self {
            store,
            config,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Live conversation list for `user_id`: same filter and order as
    /// `ConversationService::list`. The first item on the channel is the
    /// current snapshot; each relevant store change produces a fresh one
    /// (conversations leaving the view through deactivation or participant
    /// removal simply vanish from the next snapshot).
    pub async fn subscribe_to_conversations(
        &self,
        user_id: Uuid,
        key: &str,
    ) -> UnboundedReceiver<ConversationFeed> {
        let (tx, rx) = unbounded_channel();
        let store = Arc::clone(&self.store);
        let config = Arc::clone(&self.config);
        // Bus subscription opens before this call returns so no commit can
        // fall between subscribing and the task's first poll.
        let mut events = store.subscribe_events();

        let handle = tokio::spawn(async move {
            let mut visible: HashSet<Uuid> =
                match send_snapshot(&store, &config, user_id, &tx).await {
                    Some(ids) => ids,
                    None => return,
                };

            loop {
                match events.recv().await {
                    Ok(StoreEvent::ConversationUpserted { conversation }) => {
                        let relevant = conversation.is_participant(user_id)
                            || visible.contains(&conversation.id);
                        if !relevant {
                            continue;
                        }
                        match send_snapshot(&store, &config, user_id, &tx).await {
                            Some(ids) => visible = ids,
                            None => return,
                        }
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        if tx
                            .send(ConversationFeed::Error(FeedError::TransportLagged {
                                skipped,
                            }))
                            .is_err()
                        {
                            return;
                        }
                        // Resync after the gap.
                        match send_snapshot(&store, &config, user_id, &tx).await {
                            Some(ids) => visible = ids,
                            None => return,
                        }
                    }
                    Err(RecvError::Closed) => {
                        let _ = tx.send(ConversationFeed::Error(FeedError::TransportUnavailable));
                        return;
                    }
                }
            }
        });

        self.register(key, handle).await;
        rx
    }

    /// Streams message inserts, edits, and deletes for one conversation.
    /// Gate-checked once at subscribe time; a non-participant gets
    /// `PermissionDenied` before any stream exists.
    pub async fn subscribe_to_messages(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        key: &str,
    ) -> AppResult<UnboundedReceiver<MessageFeed>> {
        let (conversation, _) = self
            .store
            .get_conversation(conversation_id)
            .await
            .ok_or(crate::error::AppError::NotFound("conversation"))?;
        permission::ensure_conversation_access(user_id, &conversation)?;

        let (tx, rx) = unbounded_channel();
        let mut events = self.store.subscribe_events();

        let handle = tokio::spawn(async move {
            loop {
                let feed_item = match events.recv().await {
                    Ok(StoreEvent::MessageInserted { message })
                        if message.conversation_id == conversation_id =>
                    {
                        MessageFeed::New(message)
                    }
                    Ok(StoreEvent::MessageUpdated { message })
                        if message.conversation_id == conversation_id =>
                    {
                        if message.is_deleted {
                            MessageFeed::Deleted(message.id)
                        } else {
                            MessageFeed::Edited(message)
                        }
                    }
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        MessageFeed::Error(FeedError::TransportLagged { skipped })
                    }
                    Err(RecvError::Closed) => {
                        let _ = tx.send(MessageFeed::Error(FeedError::TransportUnavailable));
                        return;
                    }
                };
                if tx.send(feed_item).is_err() {
                    return;
                }
            }
        });

        self.register(key, handle).await;
        Ok(rx)
    }

    /// Force-unsubscribes one feed by key.
    pub async fn unsubscribe(&self, key: &str) {
        if let Some(handle) = self.tasks.lock().await.remove(key) {
            handle.abort();
            tracing::debug!(key, "subscription removed");
        }
    }

    /// Tears down every live feed. Run on logout.
    pub async fn unsubscribe_all(&self) {
        let mut tasks = self.tasks.lock().await;
        let count = tasks.len();
        for (_, handle) in tasks.drain() {
            handle.abort();
        }
        if count > 0 {
            tracing::info!(count, "all subscriptions removed");
        }
    }

    pub async fn active_count(&self) -> usize {
        self.tasks.lock().await.len()
    }

    async fn register(&self, key: &str, handle: JoinHandle<()>) {
        let mut tasks = self.tasks.lock().await;
        // Re-subscribing under an existing key replaces the old feed.
        if let Some(previous) = tasks.insert(key.to_string(), handle) {
            previous.abort();
        }
    }
}

impl Drop for SubscriptionManager {
    fn drop(&mut self) {
        if let Ok(mut tasks) = self.tasks.try_lock() {
            for (_, handle) in tasks.drain() {
                handle.abort();
            }
        }
    }
}

async fn send_snapshot(
    store: &MemoryStore,
    config: &Config,
    user_id: Uuid,
    tx: &UnboundedSender<ConversationFeed>,
) -> Option<HashSet<Uuid>> {
    let conversations = ConversationService::list(store, config, user_id, ListOptions::default())
        .await
        .unwrap_or_default();
    let ids = conversations.iter().map(|c| c.id).collect();
    tx.send(ConversationFeed::Snapshot(conversations)).ok()?;
    Some(ids)
}
