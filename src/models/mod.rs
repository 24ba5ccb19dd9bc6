pub mod conversation;
pub mod message;
pub mod validation;

pub use conversation::{Conversation, ConversationType, LastMessage};
pub use message::{Attachment, AttachmentKind, Message, MessagePriority, MessageType, NewMessage};
pub use validation::{FieldError, ValidationReport};

/// Escapes characters that break out of HTML attribute/text contexts.
/// For render paths that do not already escape; storage keeps raw text.
pub fn sanitize_text(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            '/' => out.push_str("&#x2F;"),
            other => out.push(other),
        }
    }
    out
}
