//! History trimming.
//!
//! Keeps the most recent whole messages that fit a token budget. Messages
//! are never cut in half.

use super::tokens::TokenCounter;
use crate::llm::ChatMessage;

/// Trims `messages` to at most `max_tokens`.
///
/// Leading system messages are kept first when `include_system` is set and
/// count against the budget; otherwise they are dropped. The remaining
/// budget takes the longest suffix of non-system messages that fits.
/// Chronological order is preserved.
pub fn trim_messages(
    messages: &[ChatMessage],
    max_tokens: usize,
    counter: &TokenCounter,
    include_system: bool,
) -> Vec<ChatMessage> {
    let mut used = 0usize;
    let mut head = Vec::new();

    let leading_system = messages.iter().take_while(|m| m.is_system()).count();
    if include_system {
        for msg in &messages[..leading_system] {
            let tokens = counter.count(&msg.content);
            if used + tokens > max_tokens {
                break;
            }
            used += tokens;
            head.push(msg.clone());
        }
    }

    let mut tail = Vec::new();
    for msg in messages[leading_system..]
        .iter()
        .rev()
        .filter(|m| !m.is_system())
    {
        let tokens = counter.count(&msg.content);
        if used + tokens > max_tokens {
            break;
        }
        used += tokens;
        tail.push(msg.clone());
    }
    tail.reverse();

    head.extend(tail);
    head
}
