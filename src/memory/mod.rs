//! 记忆层：对话模型、对话存储与持久化

pub mod conversation;
pub mod persistence;

pub use conversation::{Conversation, ConversationStore, ImageRef, Message, Role, StoreError};
pub use persistence::ConversationPersistence;
