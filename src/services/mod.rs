pub mod conversation_service;
pub mod directory;
pub mod message_service;
pub mod permission;

pub use conversation_service::ConversationService;
pub use message_service::MessageService;
