pub mod ai;
pub mod config;
pub mod conversation;
pub mod error;
pub mod input;
pub mod state;

// Re-export main types for convenience
pub use ai::{CompletionService, OpenAIClient};
pub use config::Config;
pub use conversation::{Conversation, Exchange};
pub use error::CompletionError;
pub use input::InputBuffer;
pub use state::{ChatMessage, ChatRole, RequestState, Transcript};
