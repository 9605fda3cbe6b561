use sandchat::core::agent_loop::TurnResult;
use sandchat::core::schemas::{ChatMessage, MessageType};
use tokio::sync::mpsc;

pub fn assert_ok_turn(result: &TurnResult, expected: &str) {
    assert!(result.error.is_none(), "unexpected error: {:?}", result.error);
    assert_eq!(result.assistant_text, expected);
}

pub fn assert_has_error(result: &TurnResult, needle: &str) {
    let error = result.error.as_deref().unwrap_or_default();
    assert!(
        error.contains(needle),
        "expected error containing {needle:?}, got {:?}",
        result.error
    );
}

/// Drain every event already sent on the channel.
pub fn drain(rx: &mut mpsc::UnboundedReceiver<ChatMessage>) -> Vec<ChatMessage> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}

pub fn kinds(events: &[ChatMessage]) -> Vec<MessageType> {
    events.iter().map(|e| e.kind).collect()
}

/// Concatenated `stream/text` content.
pub fn streamed_text(events: &[ChatMessage]) -> String {
    events
        .iter()
        .filter(|e| e.kind == MessageType::StreamText)
        .filter_map(|e| e.content.as_text())
        .collect()
}

/// Text of events with the given `from` and plain `text` type.
pub fn texts_from(events: &[ChatMessage], from: &str) -> Vec<String> {
    events
        .iter()
        .filter(|e| e.kind == MessageType::Text && e.from.as_deref() == Some(from))
        .filter_map(|e| e.content.as_text().map(str::to_string))
        .collect()
}
