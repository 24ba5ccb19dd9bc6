use chrono::Utc;
use rand::Rng;
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::conversation::{validate_conversation, MAX_TITLE_LEN};
use crate::models::{Conversation, ConversationType, LastMessage, ValidationReport};
use crate::services::directory::ChildAccess;
use crate::services::permission;
use crate::store::{MemoryStore, StoreWrite, VersionCheck};

#[derive(Debug, Clone)]
pub struct CreateConversation {
    pub participants: Vec<Uuid>,
    pub child_id: Uuid,
    pub kind: ConversationType,
    pub title: String,
    pub created_by: Uuid,
}

#[derive(Debug, Clone, Copy)]
pub struct CreateOutcome {
    pub conversation_id: Uuid,
    /// True when a direct conversation with the same participant pair and
    /// child already existed and was returned instead of a duplicate.
    pub is_existing: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub limit: Option<usize>,
    pub child_id: Option<Uuid>,
}

/// Whitelist of fields mutable through [`ConversationService::update`].
/// Anything not representable here cannot be written through this path.
#[derive(Debug, Clone, Default)]
pub struct ConversationUpdate {
    pub title: Option<String>,
    pub unread_counts: Option<HashMap<Uuid, u32>>,
    pub last_message: Option<LastMessage>,
}

pub struct ConversationService;

impl ConversationService {
    /// Creates a conversation. Direct conversations deduplicate: the id is
    /// derived from the sorted participant pair plus the child id, so a
    /// second create (or a racing concurrent one) lands on the existing
    /// document and reports `is_existing`.
    pub async fn create(
        store: &MemoryStore,
        config: &Config,
        child_access: &dyn ChildAccess,
        request: CreateConversation,
    ) -> AppResult<CreateOutcome> {
        let conversation = Conversation::new(
            request.participants,
            request.child_id,
            request.kind,
            &request.title,
            request.created_by,
        );
        let report = validate_conversation(&conversation);
        if !report.is_valid() {
            return Err(AppError::validation(report));
        }

        permission::ensure_child_capability(child_access, request.created_by, request.child_id)
            .await?;

        for attempt in 1..=config.txn_retry_budget {
            let existing = store.get_conversation(conversation.id).await;
            match existing {
                Some((current, _)) if current.is_active => {
                    tracing::debug!(conversation_id = %current.id, "direct conversation already exists");
                    return Ok(CreateOutcome {
                        conversation_id: current.id,
                        is_existing: true,
                    });
                }
                Some((mut dormant, version)) => {
                    // Soft-deleted document under the deterministic id:
                    // reactivate it in place. The row is never replaced, so
                    // the original metadata and message history survive.
                    dormant.is_active = true;
                    dormant.updated_at = Utc::now();
                    let check = VersionCheck::Conversation {
                        id: dormant.id,
                        version: Some(version),
                    };
                    if store
                        .commit(&[check], vec![StoreWrite::PutConversation(dormant)])
                        .await
                        .is_ok()
                    {
                        tracing::info!(conversation_id = %conversation.id, "conversation reactivated");
                        return Ok(CreateOutcome {
                            conversation_id: conversation.id,
                            is_existing: true,
                        });
                    }
                }
                None => {
                    let check = VersionCheck::Conversation {
                        id: conversation.id,
                        version: None,
                    };
                    if store
                        .commit(&[check], vec![StoreWrite::PutConversation(conversation.clone())])
                        .await
                        .is_ok()
                    {
                        tracing::info!(
                            conversation_id = %conversation.id,
                            kind = ?conversation.kind,
                            participants = conversation.participants.len(),
                            "conversation created"
                        );
                        return Ok(CreateOutcome {
                            conversation_id: conversation.id,
                            is_existing: false,
                        });
                    }
                }
            }
            backoff(attempt).await;
        }

        Err(AppError::Conflict {
            attempts: config.txn_retry_budget,
        })
    }

    /// Active conversations the user participates in, newest activity
    /// first, optionally scoped to one child, capped at the hard limit.
    pub async fn list(
        store: &MemoryStore,
        config: &Config,
        user_id: Uuid,
        options: ListOptions,
    ) -> AppResult<Vec<Conversation>> {
        let limit = options
            .limit
            .unwrap_or(config.default_list_limit)
            .min(config.max_list_limit);

        let mut conversations = store
            .find_conversations(|c| {
                c.is_active
                    && c.is_participant(user_id)
                    && options.child_id.map_or(true, |child| c.child_id == child)
            })
            .await;
        conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        conversations.truncate(limit);
        Ok(conversations)
    }

    pub async fn get_by_id(
        store: &MemoryStore,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<Conversation> {
        let (conversation, _) = store
            .get_conversation(conversation_id)
            .await
            .ok_or(AppError::NotFound("conversation"))?;
        if !conversation.is_active {
            return Err(AppError::NotFound("conversation"));
        }
        permission::ensure_conversation_access(user_id, &conversation)?;
        Ok(conversation)
    }

    /// Metadata update restricted to the whitelisted fields; always stamps
    /// `updated_at`.
    pub async fn update(
        store: &MemoryStore,
        config: &Config,
        conversation_id: Uuid,
        updates: ConversationUpdate,
        user_id: Uuid,
    ) -> AppResult<Conversation> {
        if let Some(title) = &updates.title {
            let trimmed = title.trim();
            if trimmed.is_empty() || trimmed.chars().count() > MAX_TITLE_LEN {
                let mut report = ValidationReport::default();
                report.error("title", format!("title must be 1-{MAX_TITLE_LEN} characters"));
                return Err(AppError::validation(report));
            }
        }
        if let Some(last_message) = &updates.last_message {
            // Keeps the invariant last_message.timestamp <= updated_at.
            if last_message.timestamp > Utc::now() {
                let mut report = ValidationReport::default();
                report.error("last_message.timestamp", "timestamp cannot be in the future");
                return Err(AppError::validation(report));
            }
        }

        for attempt in 1..=config.txn_retry_budget {
            let (mut conversation, version) = store
                .get_conversation(conversation_id)
                .await
                .ok_or(AppError::NotFound("conversation"))?;
            if !conversation.is_active {
                return Err(AppError::NotFound("conversation"));
            }
            permission::ensure_conversation_access(user_id, &conversation)?;

            if let Some(counts) = &updates.unread_counts {
                // Every key must be a current participant.
                if counts.keys().any(|k| !conversation.is_participant(*k)) {
                    let mut report = ValidationReport::default();
                    report.error("unread_counts", "keys must be current participants");
                    return Err(AppError::validation(report));
                }
            }

            if let Some(title) = &updates.title {
                conversation.title = title.trim().to_string();
            }
            if let Some(counts) = &updates.unread_counts {
                conversation.unread_counts = counts.clone();
            }
            if let Some(last_message) = &updates.last_message {
                conversation.last_message = Some(last_message.clone());
            }
            conversation.updated_at = Utc::now();

            let check = VersionCheck::Conversation {
                id: conversation_id,
                version: Some(version),
            };
            if store
                .commit(&[check], vec![StoreWrite::PutConversation(conversation.clone())])
                .await
                .is_ok()
            {
                return Ok(conversation);
            }
            backoff(attempt).await;
        }

        Err(AppError::Conflict {
            attempts: config.txn_retry_budget,
        })
    }

    /// Soft delete, creator only. Already-inactive conversations are a
    /// no-op so a repeated tap cannot fail.
    pub async fn deactivate(
        store: &MemoryStore,
        config: &Config,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<()> {
        for attempt in 1..=config.txn_retry_budget {
            let (mut conversation, version) = store
                .get_conversation(conversation_id)
                .await
                .ok_or(AppError::NotFound("conversation"))?;
            if conversation.created_by != user_id {
                return Err(AppError::PermissionDenied);
            }
            if !conversation.is_active {
                return Ok(());
            }

            conversation.is_active = false;
            conversation.updated_at = Utc::now();

            let check = VersionCheck::Conversation {
                id: conversation_id,
                version: Some(version),
            };
            if store
                .commit(&[check], vec![StoreWrite::PutConversation(conversation)])
                .await
                .is_ok()
            {
                tracing::info!(%conversation_id, "conversation deactivated");
                return Ok(());
            }
            backoff(attempt).await;
        }

        Err(AppError::Conflict {
            attempts: config.txn_retry_budget,
        })
    }
}

/// Small jittered pause between optimistic-commit retries.
pub(crate) async fn backoff(attempt: u32) {
    let jitter: u64 = rand::thread_rng().gen_range(0..5);
    tokio::time::sleep(Duration::from_millis(attempt as u64 * 2 + jitter)).await;
}
