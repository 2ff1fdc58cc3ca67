pub mod auth;
pub mod error;
pub mod session;
pub mod types;

pub use auth::{AuthState, CodeMeta};
pub use error::ChatError;
pub use session::ChatSession;
pub use types::{ChatDocument, ChatMessage, ChatSummary, ListChatsParams, ListChatsResult};
