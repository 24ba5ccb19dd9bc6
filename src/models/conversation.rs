use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use super::message::MessageType;
use super::validation::ValidationReport;

/// Namespace for deterministic direct-conversation ids. Two clients that
/// simultaneously start the same DM derive the same id and collide at the
/// store instead of fragmenting into parallel threads.
const DIRECT_ID_NAMESPACE: Uuid = Uuid::from_bytes([
    0x6b, 0x1e, 0x2f, 0x6a, 0x4c, 0x8d, 0x4b, 0x0e, 0x9a, 0x51, 0xd2, 0x30, 0x7f, 0x41, 0x9c,
    0x05,
]);

pub const MAX_TITLE_LEN: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationType {
    Direct,
    Group,
}

/// Denormalized snapshot of the newest message, kept on the conversation
/// so list views render without a join.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastMessage {
    pub id: Uuid,
    pub text: String,
    pub sender_id: Uuid,
    pub kind: MessageType,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    /// Order-insignificant for semantics, stored as the list given at creation.
    pub participants: Vec<Uuid>,
    pub child_id: Uuid,
    pub kind: ConversationType,
    pub title: String,
    pub last_message: Option<LastMessage>,
    /// participant id -> messages not yet acknowledged read. Never negative.
    pub unread_counts: HashMap<Uuid, u32>,
    /// false = soft-deleted; excluded from all normal queries.
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: Uuid,
}

impl Conversation {
    /// Factory. Produces a fully populated conversation with zeroed unread
    /// counts for every participant. Does not validate; pair with
    /// [`validate_conversation`] and check the report before persisting.
    pub fn new(
        participants: Vec<Uuid>,
        child_id: Uuid,
        kind: ConversationType,
        title: &str,
        created_by: Uuid,
    ) -> Self {
        let now = Utc::now();
        let id = match kind {
            ConversationType::Direct => direct_conversation_id(&participants, child_id),
            ConversationType::Group => Uuid::new_v4(),
        };
        let unread_counts = participants.iter().map(|p| (*p, 0)).collect();
        Self {
            id,
            participants,
            child_id,
            kind,
            title: title.trim().to_string(),
            last_message: None,
            unread_counts,
            is_active: true,
            created_at: now,
            updated_at: now,
            created_by,
        }
    }

    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.participants.contains(&user_id)
    }

    pub fn unread_for(&self, user_id: Uuid) -> u32 {
        self.unread_counts.get(&user_id).copied().unwrap_or(0)
    }
}

/// Deterministic id for a direct conversation: v5 uuid over the sorted
/// participant pair plus the child id.
pub fn direct_conversation_id(participants: &[Uuid], child_id: Uuid) -> Uuid {
    let mut sorted: Vec<Uuid> = participants.to_vec();
    sorted.sort();
    let mut name = Vec::with_capacity(16 * (sorted.len() + 1));
    for p in &sorted {
        name.extend_from_slice(p.as_bytes());
    }
    name.extend_from_slice(child_id.as_bytes());
    Uuid::new_v5(&DIRECT_ID_NAMESPACE, &name)
}

pub fn validate_conversation(conversation: &Conversation) -> ValidationReport {
    let mut report = ValidationReport::default();

    if conversation.participants.is_empty() {
        report.error("participants", "at least one participant is required");
    }
    let unique: HashSet<Uuid> = conversation.participants.iter().copied().collect();
    if unique.len() != conversation.participants.len() {
        report.error("participants", "duplicate participant ids");
    }
    if conversation.kind == ConversationType::Direct && conversation.participants.len() != 2 {
        report.error(
            "participants",
            "direct conversations require exactly 2 participants",
        );
    }
    if conversation.child_id.is_nil() {
        report.error("child_id", "child id is required");
    }
    if conversation.title.trim().is_empty() {
        report.error("title", "title is required");
    } else if conversation.title.trim().chars().count() > MAX_TITLE_LEN {
        report.error("title", format!("title exceeds {MAX_TITLE_LEN} characters"));
    }
    if conversation.created_by.is_nil() {
        report.error("created_by", "creator id is required");
    } else if !conversation.participants.is_empty()
        && !conversation.is_participant(conversation.created_by)
    {
        report.error("created_by", "creator must be a participant");
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two() -> Vec<Uuid> {
        vec![Uuid::new_v4(), Uuid::new_v4()]
    }

    #[test]
    fn factory_zeroes_unread_counts_for_every_participant() {
        let participants = two();
        let convo = Conversation::new(
            participants.clone(),
            Uuid::new_v4(),
            ConversationType::Direct,
            "Care team",
            participants[0],
        );
        assert!(convo.is_active);
        assert_eq!(convo.unread_counts.len(), 2);
        assert!(participants.iter().all(|p| convo.unread_for(*p) == 0));
        assert!(validate_conversation(&convo).is_valid());
    }

    #[test]
    fn direct_id_ignores_participant_order() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let child = Uuid::new_v4();
        assert_eq!(
            direct_conversation_id(&[a, b], child),
            direct_conversation_id(&[b, a], child)
        );
        assert_ne!(
            direct_conversation_id(&[a, b], child),
            direct_conversation_id(&[a, b], Uuid::new_v4())
        );
    }

    #[test]
    fn validation_rejects_duplicates_and_bad_titles() {
        let a = Uuid::new_v4();
        let convo = Conversation::new(
            vec![a, a],
            Uuid::new_v4(),
            ConversationType::Group,
            "  ",
            a,
        );
        let report = validate_conversation(&convo);
        assert!(report.has_error_on("participants"));
        assert!(report.has_error_on("title"));
    }

    #[test]
    fn validation_rejects_direct_with_three_participants() {
        let participants = vec![Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];
        let convo = Conversation::new(
            participants.clone(),
            Uuid::new_v4(),
            ConversationType::Direct,
            "DM",
            participants[0],
        );
        assert!(validate_conversation(&convo).has_error_on("participants"));
    }

    #[test]
    fn validation_requires_creator_among_participants() {
        let convo = Conversation::new(
            two(),
            Uuid::new_v4(),
            ConversationType::Group,
            "Team",
            Uuid::new_v4(),
        );
        assert!(validate_conversation(&convo).has_error_on("created_by"));
    }

    #[test]
    fn title_at_exactly_100_chars_passes() {
        let participants = two();
        let title = "x".repeat(100);
        let convo = Conversation::new(
            participants.clone(),
            Uuid::new_v4(),
            ConversationType::Group,
            &title,
            participants[0],
        );
        assert!(validate_conversation(&convo).is_valid());

        let long = "x".repeat(101);
        let convo = Conversation::new(
            participants.clone(),
            Uuid::new_v4(),
            ConversationType::Group,
            &long,
            participants[0],
        );
        assert!(validate_conversation(&convo).has_error_on("title"));
    }
}
