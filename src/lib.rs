pub mod ai;
pub mod chat;
pub mod config;
pub mod scripture;

// Re-export main types for convenience
pub use ai::{AnswerGenerator, GeminiClient, GenerateError, TextModel};
pub use chat::{ChatError, ChatReply, ChatService, RagFlagPolicy};
pub use config::Config;
pub use scripture::{Citation, RetrieveError, VerseStore};
