//! Small text helpers shared by the console and the relay bot.

use crate::ChatMessage;

/// Render messages as a plain `Role: content` transcript, one per line.
#[must_use]
pub fn transcript(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .map(|m| format!("{}: {}", m.role.label(), m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Shorten `s` to at most `max_chars` characters, marking the cut with `...`.
#[must_use]
pub fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{kept}...")
}
