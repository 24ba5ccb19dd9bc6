use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::message::{validate_message, NewMessage};
use crate::models::{LastMessage, Message, ValidationReport};
use crate::services::conversation_service::backoff;
use crate::services::permission;
use crate::store::{MemoryStore, StoreWrite, VersionCheck};

#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    pub limit: Option<usize>,
    /// Cursor: only messages created strictly before this instant.
    pub before: Option<DateTime<Utc>>,
    pub include_deleted: bool,
}

pub struct MessageService;

impl MessageService {
    /// Sends a message. One atomic unit inserts the message, overwrites
    /// the conversation's `last_message` preview, increments every other
    /// participant's unread count, and stamps `updated_at`. Readers never
    /// observe one side without the other. Racing sends retry on version
    /// conflict so no unread increment is lost.
    pub async fn send(
        store: &MemoryStore,
        config: &Config,
        input: NewMessage,
    ) -> AppResult<Message> {
        let message = Message::new(input);
        let report = validate_message(&message);
        if !report.is_valid() {
            return Err(AppError::validation(report));
        }

        if let Some(reply_to) = message.reply_to {
            let parent = store.get_message(reply_to).await;
            let same_thread = parent
                .map(|(p, _)| p.conversation_id == message.conversation_id)
                .unwrap_or(false);
            if !same_thread {
                let mut report = ValidationReport::default();
                report.error("reply_to", "must reference a message in the same conversation");
                return Err(AppError::validation(report));
            }
        }

        for attempt in 1..=config.txn_retry_budget {
            let (mut conversation, version) = store
                .get_conversation(message.conversation_id)
                .await
                .ok_or(AppError::NotFound("conversation"))?;
            if !conversation.is_active {
                return Err(AppError::NotFound("conversation"));
            }
            permission::ensure_conversation_access(message.sender_id, &conversation)?;

            conversation.last_message = Some(LastMessage {
                id: message.id,
                text: preview(&message.text, config.last_message_preview_len),
                sender_id: message.sender_id,
                kind: message.kind,
                timestamp: message.created_at,
            });
            for participant in conversation.participants.clone() {
                if participant != message.sender_id {
                    *conversation.unread_counts.entry(participant).or_insert(0) += 1;
                }
            }
            conversation.updated_at = Utc::now();

            let checks = [
                VersionCheck::Conversation {
                    id: conversation.id,
                    version: Some(version),
                },
                VersionCheck::Message {
                    id: message.id,
                    version: None,
                },
            ];
            if store
                .commit(
                    &checks,
                    vec![
                        StoreWrite::PutConversation(conversation),
                        StoreWrite::InsertMessage(message.clone()),
                    ],
                )
                .await
                .is_ok()
            {
                tracing::info!(
                    message_id = %message.id,
                    conversation_id = %message.conversation_id,
                    kind = ?message.kind,
                    "message sent"
                );
                return Ok(message);
            }
            backoff(attempt).await;
        }

        Err(AppError::Conflict {
            attempts: config.txn_retry_budget,
        })
    }

    /// Message page for display: oldest-first, soft-deleted filtered out
    /// unless requested, `before` cursor for walking history backwards.
    pub async fn fetch(
        store: &MemoryStore,
        config: &Config,
        conversation_id: Uuid,
        user_id: Uuid,
        options: FetchOptions,
    ) -> AppResult<Vec<Message>> {
        let (conversation, _) = store
            .get_conversation(conversation_id)
            .await
            .ok_or(AppError::NotFound("conversation"))?;
        if !conversation.is_active {
            return Err(AppError::NotFound("conversation"));
        }
        permission::ensure_conversation_access(user_id, &conversation)?;

        let limit = options
            .limit
            .unwrap_or(config.default_fetch_limit)
            .min(config.max_fetch_limit);

        let mut messages = store
            .find_messages(|m| {
                m.conversation_id == conversation_id
                    && (options.include_deleted || !m.is_deleted)
                    && options.before.map_or(true, |cutoff| m.created_at < cutoff)
            })
            .await;
        // Newest-first to take the page nearest the cursor, then reversed
        // for display order.
        messages.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        messages.truncate(limit);
        messages.reverse();
        Ok(messages)
    }

    /// Acknowledges a message for `user_id`. Idempotent: a second call for
    /// the same user is a no-op. Otherwise one atomic unit sets
    /// `read_by[user]` and decrements the conversation's unread count for
    /// that user, clamped at zero. Membership is re-checked inside the
    /// retry loop since permissions can change between read and write.
    pub async fn mark_as_read(
        store: &MemoryStore,
        config: &Config,
        message_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<()> {
        for attempt in 1..=config.txn_retry_budget {
            let (mut message, message_version) = store
                .get_message(message_id)
                .await
                .ok_or(AppError::NotFound("message"))?;
            let (mut conversation, conversation_version) = store
                .get_conversation(message.conversation_id)
                .await
                .ok_or(AppError::NotFound("conversation"))?;
            if !conversation.is_active {
                return Err(AppError::NotFound("conversation"));
            }
            permission::ensure_message_access(user_id, &message, &conversation)?;

            if message.is_read_by(user_id) {
                return Ok(());
            }

            let now = Utc::now();
            message.read_by.insert(user_id, now);
            message.updated_at = now;

            let count = conversation.unread_counts.entry(user_id).or_insert(0);
            *count = count.saturating_sub(1);
            conversation.updated_at = now;

            let checks = [
                VersionCheck::Message {
                    id: message_id,
                    version: Some(message_version),
                },
                VersionCheck::Conversation {
                    id: conversation.id,
                    version: Some(conversation_version),
                },
            ];
            if store
                .commit(
                    &checks,
                    vec![
                        StoreWrite::PutMessage(message),
                        StoreWrite::PutConversation(conversation),
                    ],
                )
                .await
                .is_ok()
            {
                tracing::debug!(%message_id, %user_id, "message marked read");
                return Ok(());
            }
            backoff(attempt).await;
        }

        Err(AppError::Conflict {
            attempts: config.txn_retry_budget,
        })
    }

    /// Replaces the text of the sender's own message; sets `is_edited`.
    pub async fn edit(
        store: &MemoryStore,
        config: &Config,
        message_id: Uuid,
        user_id: Uuid,
        new_text: &str,
    ) -> AppResult<Message> {
        for attempt in 1..=config.txn_retry_budget {
            let (mut message, version) = store
                .get_message(message_id)
                .await
                .ok_or(AppError::NotFound("message"))?;
            if message.sender_id != user_id {
                return Err(AppError::PermissionDenied);
            }
            if message.is_deleted {
                return Err(AppError::NotFound("message"));
            }

            message.text = new_text.to_string();
            message.is_edited = true;
            message.updated_at = Utc::now();
            let report = validate_message(&message);
            if !report.is_valid() {
                return Err(AppError::validation(report));
            }

            let check = VersionCheck::Message {
                id: message_id,
                version: Some(version),
            };
            if store
                .commit(&[check], vec![StoreWrite::PutMessage(message.clone())])
                .await
                .is_ok()
            {
                tracing::debug!(%message_id, "message edited");
                return Ok(message);
            }
            backoff(attempt).await;
        }

        Err(AppError::Conflict {
            attempts: config.txn_retry_budget,
        })
    }

    /// Soft delete of the sender's own message. Repeat calls are no-ops.
    pub async fn delete(
        store: &MemoryStore,
        config: &Config,
        message_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<()> {
        for attempt in 1..=config.txn_retry_budget {
            let (mut message, version) = store
                .get_message(message_id)
                .await
                .ok_or(AppError::NotFound("message"))?;
            if message.sender_id != user_id {
                return Err(AppError::PermissionDenied);
            }
            if message.is_deleted {
                return Ok(());
            }

            message.is_deleted = true;
            message.updated_at = Utc::now();

            let check = VersionCheck::Message {
                id: message_id,
                version: Some(version),
            };
            if store
                .commit(&[check], vec![StoreWrite::PutMessage(message)])
                .await
                .is_ok()
            {
                tracing::debug!(%message_id, "message deleted");
                return Ok(());
            }
            backoff(attempt).await;
        }

        Err(AppError::Conflict {
            attempts: config.txn_retry_budget,
        })
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    trimmed.chars().take(max_chars).collect()
}
