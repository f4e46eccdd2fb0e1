use crate::llm::types::{ChatMessage, ROLE_ASSISTANT, ROLE_SYSTEM};

/// One-shot question answering over freshly crawled pages.
pub fn rag_answer_prompt(context: &str, question: &str) -> String {
    format!(
        "You are a helpful assistant. Use the following context to answer the question.\n\n\
         Context:\n{}\n\nQuestion:\n{}\n\nAnswer:",
        context, question
    )
}

/// `User: ...` / `Assistant: ...` lines; system turns are skipped.
pub fn format_history(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .filter(|m| m.role != ROLE_SYSTEM)
        .map(|m| {
            let speaker = if m.role == ROLE_ASSISTANT {
                "Assistant"
            } else {
                "User"
            };
            format!("{}: {}", speaker, m.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// The system block that carries history, retrieved app info and the
/// current question to the chat model.
pub fn grounding_block(history: &[ChatMessage], context: &str, question: &str) -> String {
    let history = format_history(history);
    let history = if history.is_empty() {
        "(no previous messages)".to_string()
    } else {
        history
    };
    format!(
        "### Chat History\n{}\n\n### Relevant App Info\n{}\n\n### Current Question\n{}",
        history,
        context.trim(),
        question.trim()
    )
}
