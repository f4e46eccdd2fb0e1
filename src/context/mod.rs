//! Prompt assembly and token budgeting for chat history.

pub mod prompt;
pub mod tokens;
pub mod window;

pub use prompt::{format_history, grounding_block, rag_answer_prompt};
pub use tokens::TokenCounter;
pub use window::trim_messages;
