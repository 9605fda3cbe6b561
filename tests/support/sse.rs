/// A text-generation-inference `/generate_stream` body streaming `tokens`,
/// followed by the special end-of-turn token.
pub fn token_stream(tokens: &[&str]) -> String {
    let mut body = String::new();
    for (i, text) in tokens.iter().enumerate() {
        body.push_str(&token_event(i as u64 + 1, text, false, None));
    }
    let full: String = tokens.concat();
    body.push_str(&token_event(
        tokens.len() as u64 + 1,
        "<|im_end|>",
        true,
        Some(&full),
    ));
    body
}

/// Stream `text` one whitespace-separated chunk at a time.
pub fn text_stream(text: &str) -> String {
    let tokens: Vec<&str> = text.split_inclusive(' ').collect();
    token_stream(&tokens)
}

pub fn error_event(message: &str) -> String {
    let event = serde_json::json!({ "error": message, "error_type": "generation" });
    format!("data:{event}\n\n")
}

fn token_event(id: u64, text: &str, special: bool, generated: Option<&str>) -> String {
    let event = serde_json::json!({
        "token": { "id": id, "text": text, "logprob": -0.1, "special": special },
        "generated_text": generated,
        "details": null,
    });
    format!("data:{event}\n\n")
}
