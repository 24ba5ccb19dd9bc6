//! In-process document store backing the conversation and message
//! services. Two flat collections (`conversations`, `messages`; messages
//! carry `conversation_id` as a foreign key, no nesting) with per-document
//! version numbers. All mutation goes through [`MemoryStore::commit`],
//! which checks every expected version under one write section and applies
//! every write together, so an atomic unit is never visible half-applied.
//! Successful commits publish [`StoreEvent`]s on a broadcast bus, the
//! change feed the real-time layer consumes.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::models::{Conversation, Message};

const EVENT_BUS_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
struct Versioned<T> {
    doc: T,
    version: u64,
}

/// Change-feed notification emitted after a commit lands.
#[derive(Debug, Clone)]
pub enum StoreEvent {
    ConversationUpserted { conversation: Conversation },
    MessageInserted { message: Message },
    MessageUpdated { message: Message },
}

/// Precondition a commit asserts before applying its writes.
/// `version: None` means "document must not exist" (insert guard).
#[derive(Debug, Clone, Copy)]
pub enum VersionCheck {
    Conversation { id: Uuid, version: Option<u64> },
    Message { id: Uuid, version: Option<u64> },
}

#[derive(Debug, Clone)]
pub enum StoreWrite {
    PutConversation(Conversation),
    InsertMessage(Message),
    PutMessage(Message),
}

#[derive(Debug, Error)]
pub enum CasError {
    /// A checked document changed (or appeared) since it was read.
    /// The caller's retry loop re-reads and recomputes.
    #[error("version mismatch on {entity} {id}")]
    VersionMismatch { entity: &'static str, id: Uuid },
}

#[derive(Debug)]
pub struct MemoryStore {
    conversations: RwLock<HashMap<Uuid, Versioned<Conversation>>>,
    messages: RwLock<HashMap<Uuid, Versioned<Message>>>,
    events: broadcast::Sender<StoreEvent>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self {
            conversations: RwLock::new(HashMap::new()),
            messages: RwLock::new(HashMap::new()),
            events,
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Change-feed receiver. Subscribers that fall behind the bus capacity
    /// observe `RecvError::Lagged`, which the real-time layer surfaces.
    pub fn subscribe_events(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    pub async fn get_conversation(&self, id: Uuid) -> Option<(Conversation, u64)> {
        let guard = self.conversations.read().await;
        guard.get(&id).map(|v| (v.doc.clone(), v.version))
    }

    pub async fn get_message(&self, id: Uuid) -> Option<(Message, u64)> {
        let guard = self.messages.read().await;
        guard.get(&id).map(|v| (v.doc.clone(), v.version))
    }

    /// Snapshot of conversations matching `predicate`. Callers sort and cap.
    pub async fn find_conversations<F>(&self, predicate: F) -> Vec<Conversation>
    where
        F: Fn(&Conversation) -> bool,
    {
        let guard = self.conversations.read().await;
        guard
            .values()
            .filter(|v| predicate(&v.doc))
            .map(|v| v.doc.clone())
            .collect()
    }

    pub async fn find_messages<F>(&self, predicate: F) -> Vec<Message>
    where
        F: Fn(&Message) -> bool,
    {
        let guard = self.messages.read().await;
        guard
            .values()
            .filter(|v| predicate(&v.doc))
            .map(|v| v.doc.clone())
            .collect()
    }

    /// Applies `writes` iff every `check` still holds, under a single
    /// write section (conversations lock acquired before messages lock,
    /// always in that order). On success every write is visible at once
    /// and a change-feed event is published per write.
    pub async fn commit(
        &self,
        checks: &[VersionCheck],
        writes: Vec<StoreWrite>,
    ) -> Result<(), CasError> {
        let mut conversations = self.conversations.write().await;
        let mut messages = self.messages.write().await;

        for check in checks {
            match *check {
                VersionCheck::Conversation { id, version } => {
                    let current = conversations.get(&id).map(|v| v.version);
                    if current != version {
                        return Err(CasError::VersionMismatch {
                            entity: "conversation",
                            id,
                        });
                    }
                }
                VersionCheck::Message { id, version } => {
                    let current = messages.get(&id).map(|v| v.version);
                    if current != version {
                        return Err(CasError::VersionMismatch {
                            entity: "message",
                            id,
                        });
                    }
                }
            }
        }

        let mut published = Vec::with_capacity(writes.len());
        for write in writes {
            match write {
                StoreWrite::PutConversation(doc) => {
                    let next_version = conversations
                        .get(&doc.id)
                        .map(|v| v.version + 1)
                        .unwrap_or(1);
                    published.push(StoreEvent::ConversationUpserted {
                        conversation: doc.clone(),
                    });
                    conversations.insert(
                        doc.id,
                        Versioned {
                            doc,
                            version: next_version,
                        },
                    );
                }
                StoreWrite::InsertMessage(doc) => {
                    published.push(StoreEvent::MessageInserted {
                        message: doc.clone(),
                    });
                    messages.insert(doc.id, Versioned { doc, version: 1 });
                }
                StoreWrite::PutMessage(doc) => {
                    let next_version =
                        messages.get(&doc.id).map(|v| v.version + 1).unwrap_or(1);
                    published.push(StoreEvent::MessageUpdated {
                        message: doc.clone(),
                    });
                    messages.insert(
                        doc.id,
                        Versioned {
                            doc,
                            version: next_version,
                        },
                    );
                }
            }
        }

        // Locks released after publish so subscribers re-reading the store
        // observe at least the state this commit produced.
        for event in published {
            let _ = self.events.send(event);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Conversation, ConversationType, Message, NewMessage};

    fn convo() -> Conversation {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        Conversation::new(
            vec![a, b],
            Uuid::new_v4(),
            ConversationType::Direct,
            "DM",
            a,
        )
    }

    #[tokio::test]
    async fn insert_guard_rejects_existing_document() {
        let store = MemoryStore::new();
        let c = convo();
        store
            .commit(
                &[VersionCheck::Conversation {
                    id: c.id,
                    version: None,
                }],
                vec![StoreWrite::PutConversation(c.clone())],
            )
            .await
            .unwrap();

        let err = store
            .commit(
                &[VersionCheck::Conversation {
                    id: c.id,
                    version: None,
                }],
                vec![StoreWrite::PutConversation(c.clone())],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CasError::VersionMismatch { .. }));
    }

    #[tokio::test]
    async fn stale_version_fails_and_nothing_is_applied() {
        let store = MemoryStore::new();
        let c = convo();
        store
            .commit(&[], vec![StoreWrite::PutConversation(c.clone())])
            .await
            .unwrap();
        let (_, version) = store.get_conversation(c.id).await.unwrap();

        // Concurrent writer bumps the version.
        store
            .commit(&[], vec![StoreWrite::PutConversation(c.clone())])
            .await
            .unwrap();

        let msg = Message::new(NewMessage::text(c.id, c.participants[0], "A", "hi"));
        let result = store
            .commit(
                &[VersionCheck::Conversation {
                    id: c.id,
                    version: Some(version),
                }],
                vec![
                    StoreWrite::PutConversation(c.clone()),
                    StoreWrite::InsertMessage(msg.clone()),
                ],
            )
            .await;
        assert!(result.is_err());
        assert!(store.get_message(msg.id).await.is_none());
    }

    #[tokio::test]
    async fn commit_publishes_change_feed_events() {
        let store = MemoryStore::new();
        let mut rx = store.subscribe_events();
        let c = convo();
        store
            .commit(&[], vec![StoreWrite::PutConversation(c.clone())])
            .await
            .unwrap();

        match rx.recv().await.unwrap() {
            StoreEvent::ConversationUpserted { conversation } => {
                assert_eq!(conversation.id, c.id)
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
