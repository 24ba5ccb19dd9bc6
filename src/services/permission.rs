//! The gate: side-effect-free access checks guarding every read and write
//! path. A denied check surfaces `AppError::PermissionDenied`, never a
//! silent no-op.

use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Conversation, Message};
use crate::services::directory::ChildAccess;

/// True iff the conversation is live and the user is a participant.
pub fn can_access_conversation(user_id: Uuid, conversation: &Conversation) -> bool {
    conversation.is_active && conversation.is_participant(user_id)
}

pub fn can_access_message(user_id: Uuid, message: &Message, conversation: &Conversation) -> bool {
    can_access_conversation(user_id, conversation) && message.conversation_id == conversation.id
}

/// Creation capability: any care role on the child record qualifies.
pub async fn can_create_conversation_for_child(
    child_access: &dyn ChildAccess,
    user_id: Uuid,
    child_id: Uuid,
) -> AppResult<bool> {
    let roles = child_access.child_roles(user_id, child_id).await?;
    Ok(roles.any())
}

pub fn ensure_conversation_access(user_id: Uuid, conversation: &Conversation) -> AppResult<()> {
    if can_access_conversation(user_id, conversation) {
        Ok(())
    } else {
        Err(AppError::PermissionDenied)
    }
}

pub fn ensure_message_access(
    user_id: Uuid,
    message: &Message,
    conversation: &Conversation,
) -> AppResult<()> {
    if can_access_message(user_id, message, conversation) {
        Ok(())
    } else {
        Err(AppError::PermissionDenied)
    }
}

pub async fn ensure_child_capability(
    child_access: &dyn ChildAccess,
    user_id: Uuid,
    child_id: Uuid,
) -> AppResult<()> {
    if can_create_conversation_for_child(child_access, user_id, child_id).await? {
        Ok(())
    } else {
        Err(AppError::PermissionDenied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConversationType, NewMessage};
    use crate::services::directory::{ChildRoles, StaticChildAccess};

    fn convo() -> (Conversation, Uuid, Uuid) {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Conversation::new(
            vec![a, b],
            Uuid::new_v4(),
            ConversationType::Direct,
            "DM",
            a,
        );
        (c, a, b)
    }

    #[test]
    fn non_participants_are_denied() {
        let (c, a, _) = convo();
        assert!(can_access_conversation(a, &c));
        assert!(!can_access_conversation(Uuid::new_v4(), &c));
    }

    #[test]
    fn inactive_conversations_deny_everyone() {
        let (mut c, a, _) = convo();
        c.is_active = false;
        assert!(!can_access_conversation(a, &c));
        assert!(ensure_conversation_access(a, &c).is_err());
    }

    #[test]
    fn message_access_requires_matching_conversation() {
        let (c, a, _) = convo();
        let msg = Message::new(NewMessage::text(c.id, a, "A", "hi"));
        assert!(can_access_message(a, &msg, &c));

        let foreign = Message::new(NewMessage::text(Uuid::new_v4(), a, "A", "hi"));
        assert!(!can_access_message(a, &foreign, &c));
    }

    #[tokio::test]
    async fn any_care_role_grants_creation_capability() {
        let access = StaticChildAccess::new();
        let (user, child) = (Uuid::new_v4(), Uuid::new_v4());
        assert!(
            !can_create_conversation_for_child(access.as_ref(), user, child)
                .await
                .unwrap()
        );

        access.grant(user, child, ChildRoles::caregiver()).await;
        assert!(
            can_create_conversation_for_child(access.as_ref(), user, child)
                .await
                .unwrap()
        );
    }
}
