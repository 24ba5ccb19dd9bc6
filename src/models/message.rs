use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use super::validation::ValidationReport;

pub const MAX_TEXT_LEN: usize = 2000;
/// Soft threshold: larger attachments validate with a warning, not an error.
pub const ATTACHMENT_WARN_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Text,
    Image,
    IncidentShare,
    System,
}

impl MessageType {
    /// Text/system messages carry their content in `text`; image and
    /// incident-share messages may leave it empty.
    pub fn requires_text(self) -> bool {
        matches!(self, MessageType::Text | MessageType::System)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessagePriority {
    Normal,
    Urgent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    Image,
    File,
}

impl AttachmentKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "image" => Some(AttachmentKind::Image),
            "file" => Some(AttachmentKind::File),
            _ => None,
        }
    }
}

/// Upload descriptor, consumed verbatim from the storage/CDN collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: Uuid,
    pub kind: AttachmentKind,
    pub url: String,
    pub filename: String,
    pub size: u64,
    pub mime_type: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    /// Owning conversation; immutable after creation.
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    /// Display name denormalized at send time.
    pub sender_name: String,
    pub kind: MessageType,
    pub text: String,
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub priority: MessagePriority,
    /// participant id -> read timestamp; absent = unread.
    pub read_by: HashMap<Uuid, DateTime<Utc>>,
    pub reply_to: Option<Uuid>,
    pub is_edited: bool,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Everything `Message::new` needs beyond the conversation context.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub sender_name: String,
    pub kind: MessageType,
    pub text: String,
    pub attachments: Vec<Attachment>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub priority: MessagePriority,
    pub reply_to: Option<Uuid>,
}

impl NewMessage {
    pub fn text(conversation_id: Uuid, sender_id: Uuid, sender_name: &str, text: &str) -> Self {
        Self {
            conversation_id,
            sender_id,
            sender_name: sender_name.to_string(),
            kind: MessageType::Text,
            text: text.to_string(),
            attachments: Vec::new(),
            metadata: serde_json::Map::new(),
            priority: MessagePriority::Normal,
            reply_to: None,
        }
    }
}

impl Message {
    /// Factory. The sender is auto-marked as having read their own message.
    pub fn new(input: NewMessage) -> Self {
        let now = Utc::now();
        let mut read_by = HashMap::new();
        read_by.insert(input.sender_id, now);
        Self {
            id: Uuid::new_v4(),
            conversation_id: input.conversation_id,
            sender_id: input.sender_id,
            sender_name: input.sender_name,
            kind: input.kind,
            text: input.text,
            attachments: input.attachments,
            metadata: input.metadata,
            priority: input.priority,
            read_by,
            reply_to: input.reply_to,
            is_edited: false,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_read_by(&self, user_id: Uuid) -> bool {
        self.read_by.contains_key(&user_id)
    }
}

pub fn validate_message(message: &Message) -> ValidationReport {
    let mut report = ValidationReport::default();

    if message.conversation_id.is_nil() {
        report.error("conversation_id", "conversation id is required");
    }
    if message.sender_id.is_nil() {
        report.error("sender_id", "sender id is required");
    }
    if message.sender_name.trim().is_empty() {
        report.error("sender_name", "sender name is required");
    }

    let text_len = message.text.chars().count();
    if message.kind.requires_text() && message.text.trim().is_empty() {
        report.error("text", "text is required for this message type");
    }
    if text_len > MAX_TEXT_LEN {
        report.error("text", format!("text exceeds {MAX_TEXT_LEN} characters"));
    }

    if message.kind == MessageType::IncidentShare
        && !message.metadata.contains_key("incidentId")
        && !message.metadata.contains_key("entryId")
    {
        report.error(
            "metadata",
            "incident_share messages require metadata.incidentId or metadata.entryId",
        );
    }

    for (i, attachment) in message.attachments.iter().enumerate() {
        report.absorb(&format!("attachments[{i}]"), validate_attachment(attachment));
    }

    report
}

pub fn validate_attachment(attachment: &Attachment) -> ValidationReport {
    let mut report = ValidationReport::default();
    if attachment.filename.trim().is_empty() {
        report.error("filename", "filename is required");
    }
    if attachment.url.trim().is_empty() {
        report.error("url", "url is required");
    }
    if attachment.size > ATTACHMENT_WARN_BYTES {
        report.warn(
            "size",
            format!(
                "attachment is {} bytes, above the {} byte threshold",
                attachment.size, ATTACHMENT_WARN_BYTES
            ),
        );
    }
    report
}

/// Validates a raw attachment descriptor before it is typed. The kind
/// string is the one place an out-of-range value can appear; past this
/// boundary the enum makes it unrepresentable.
pub fn validate_attachment_input(kind: &str, filename: &str, size: u64) -> ValidationReport {
    let mut report = ValidationReport::default();
    if AttachmentKind::parse(kind).is_none() {
        report.error("type", format!("unknown attachment type `{kind}`"));
    }
    if filename.trim().is_empty() {
        report.error("filename", "filename is required");
    }
    if size > ATTACHMENT_WARN_BYTES {
        report.warn("size", "attachment exceeds the 10MB threshold");
    }
    report
}
