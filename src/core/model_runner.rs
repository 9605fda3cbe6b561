//! One streamed model generation.

use tracing::{debug, info, instrument};

use crate::core::config::AppConfig;
use crate::core::error::Result;
use crate::core::prompt::{STOP_SEQUENCES, strip_stop_sequences};
use crate::core::utils::safe_truncate;
use crate::llm::api_types::StreamChunk;
use crate::llm::client::{build_request, generate_stream};

/// Streams a completion for a rendered prompt.
pub struct ModelRunner<'a> {
    config: &'a AppConfig,
}

impl<'a> ModelRunner<'a> {
    pub fn new(config: &'a AppConfig) -> Self {
        Self { config }
    }

    /// Generate a completion for `prompt`, calling `on_token` per streamed
    /// chunk. Returns the full text with any echoed stop sequence removed.
    #[instrument(skip_all, fields(prompt_len = prompt.len()))]
    pub async fn generate<F>(&self, prompt: &str, mut on_token: F) -> Result<String>
    where
        F: FnMut(&str),
    {
        let request = build_request(self.config, prompt, STOP_SEQUENCES);
        let mut rx = generate_stream(self.config, &request).await?;

        let mut full = String::new();
        let mut tokens = 0usize;
        while let Some(chunk) = rx.recv().await {
            match chunk? {
                StreamChunk::Token(text) => {
                    if STOP_SEQUENCES.contains(&text.trim()) {
                        continue;
                    }
                    tokens += 1;
                    on_token(&text);
                    full.push_str(&text);
                }
                StreamChunk::Done => break,
            }
        }

        let text = strip_stop_sequences(&full).to_string();
        info!(
            tokens,
            text_len = text.len(),
            preview = %safe_truncate(&text, 80),
            "model_runner.completed"
        );
        debug!(text = %text, "model_runner.output");
        Ok(text)
    }
}
