use std::sync::OnceLock;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, instrument, warn};

use crate::core::config::AppConfig;
use crate::core::error::{Result, SandchatError};
use crate::llm::api_types::{
    ApiErrorBody, GenerateParameters, GenerateRequest, GenerateResponse, StreamChunk, StreamEvent,
};

/// Global shared HTTP client for connection pooling across all requests.
static HTTP_CLIENT: OnceLock<reqwest::Client> = OnceLock::new();

const DEFAULT_TIMEOUT_SECS: u64 = 300;
const MAX_RETRIES: usize = 3;

fn get_http_client() -> &'static reqwest::Client {
    HTTP_CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .pool_max_idle_per_host(5)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new())
    })
}

/// Generation request for `prompt` using the configured limits.
pub fn build_request(config: &AppConfig, prompt: &str, stop: &[&str]) -> GenerateRequest {
    GenerateRequest {
        inputs: prompt.to_string(),
        parameters: GenerateParameters {
            max_new_tokens: config.max_new_tokens,
            temperature: config.temperature,
            stop: stop.iter().map(|s| s.to_string()).collect(),
            details: false,
        },
    }
}

/// Non-streaming generation. Returns the generated text.
#[instrument(skip_all, fields(prompt_len = request.inputs.len()))]
pub async fn generate(config: &AppConfig, request: &GenerateRequest) -> Result<String> {
    let url = endpoint(config, "generate");
    let response = with_retries(config.retry_delay_ms, || send(config, &url, request)).await?;
    let body = response
        .text()
        .await
        .map_err(|e| SandchatError::Network(format!("failed to read response body: {e}")))?;
    debug!(body_len = body.len(), "llm.generate.response");

    let parsed: GenerateResponse = serde_json::from_str(&body)?;
    Ok(parsed.generated_text)
}

/// Streaming generation.
///
/// Tokens arrive on the returned channel as `StreamChunk::Token`, terminated
/// by `StreamChunk::Done` or an error. Only the initial request is retried;
/// once the stream is open, failures are delivered on the channel.
#[instrument(skip_all, fields(prompt_len = request.inputs.len()))]
pub async fn generate_stream(
    config: &AppConfig,
    request: &GenerateRequest,
) -> Result<mpsc::UnboundedReceiver<Result<StreamChunk>>> {
    let url = endpoint(config, "generate_stream");
    let response = with_retries(config.retry_delay_ms, || send(config, &url, request)).await?;

    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let mut stream = response.bytes_stream();
        let mut pending: Vec<u8> = Vec::new();
        let mut buffer = String::new();

        while let Some(chunk_res) = stream.next().await {
            match chunk_res {
                Ok(bytes) => {
                    pending.extend_from_slice(&bytes);
                    decode_utf8_prefix(&mut pending, &mut buffer);
                    for data in drain_sse_events(&mut buffer) {
                        match decode_event(&data) {
                            Ok(Some(chunk)) => {
                                if tx.send(Ok(chunk)).is_err() {
                                    return;
                                }
                            }
                            Ok(None) => {}
                            Err(e) => {
                                let _ = tx.send(Err(e));
                                return;
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "llm.stream.error");
                    let _ = tx.send(Err(SandchatError::Network(format!("stream error: {e}"))));
                    return;
                }
            }
        }

        // Flush a final event that was not followed by a blank line.
        if !pending.is_empty() {
            buffer.push_str(&String::from_utf8_lossy(&pending));
        }
        buffer.push_str("\n\n");
        for data in drain_sse_events(&mut buffer) {
            match decode_event(&data) {
                Ok(Some(chunk)) => {
                    let _ = tx.send(Ok(chunk));
                }
                Ok(None) => {}
                Err(e) => {
                    let _ = tx.send(Err(e));
                    return;
                }
            }
        }
        let _ = tx.send(Ok(StreamChunk::Done));
    });

    Ok(rx)
}

fn endpoint(config: &AppConfig, path: &str) -> String {
    format!("{}/{path}", config.inference_url.trim_end_matches('/'))
}

async fn with_retries<F, Fut>(initial_delay_ms: u64, mut attempt_fn: F) -> Result<reqwest::Response>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<reqwest::Response>>,
{
    let mut delay_ms = initial_delay_ms;
    let mut attempt = 0;
    loop {
        let result = attempt_fn().await;
        match &result {
            Err(SandchatError::RateLimit(_)) | Err(SandchatError::Network(_))
                if attempt < MAX_RETRIES =>
            {
                attempt += 1;
                warn!(attempt, delay_ms, error = ?result.as_ref().err(), "llm.retry");
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                delay_ms *= 2;
            }
            _ => return result,
        }
    }
}

async fn send(
    config: &AppConfig,
    url: &str,
    request: &GenerateRequest,
) -> Result<reqwest::Response> {
    debug!(url = %url, "llm.request");
    let mut builder = get_http_client()
        .post(url)
        .header("Content-Type", "application/json")
        .json(request);
    if let Some(key) = &config.api_key {
        builder = builder.bearer_auth(key);
    }

    let response = builder.send().await.map_err(|e| {
        if e.is_timeout() {
            SandchatError::Network(format!("request timed out after {DEFAULT_TIMEOUT_SECS}s"))
        } else if e.is_connect() {
            SandchatError::Network(format!("connection failed: {e}"))
        } else {
            SandchatError::Network(format!("request failed: {e}"))
        }
    })?;

    let status = response.status();
    debug!(status = %status, "llm.response.headers");
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "failed to read error body".to_string());
    Err(error_from_status(status, &body))
}

fn error_from_status(status: reqwest::StatusCode, body_text: &str) -> SandchatError {
    let detail = serde_json::from_str::<ApiErrorBody>(body_text)
        .map(|b| b.error)
        .unwrap_or_else(|_| body_text.to_string());

    match status.as_u16() {
        429 | 503 => {
            warn!(status = %status, "llm.overloaded");
            SandchatError::RateLimit(format!("HTTP {status}: {detail}"))
        }
        s if (500..600).contains(&s) => {
            warn!(status = %status, "llm.server_error");
            SandchatError::Api(format!("server error (HTTP {status}): {detail}"))
        }
        _ => {
            warn!(status = %status, "llm.unexpected_status");
            SandchatError::Api(format!("HTTP {status}: {detail}"))
        }
    }
}

/// Move the longest valid UTF-8 prefix of `pending` into `out`.
///
/// An incomplete trailing sequence stays in `pending` for the next chunk;
/// invalid bytes become U+FFFD.
fn decode_utf8_prefix(pending: &mut Vec<u8>, out: &mut String) {
    loop {
        match std::str::from_utf8(pending) {
            Ok(text) => {
                out.push_str(text);
                pending.clear();
                return;
            }
            Err(e) => {
                let valid = e.valid_up_to();
                out.push_str(&String::from_utf8_lossy(&pending[..valid]));
                match e.error_len() {
                    Some(len) => {
                        out.push(char::REPLACEMENT_CHARACTER);
                        pending.drain(..valid + len);
                    }
                    None => {
                        pending.drain(..valid);
                        return;
                    }
                }
            }
        }
    }
}

/// Remove every complete (blank-line terminated) SSE event from `buffer`
/// and return the concatenated `data:` payload of each.
fn drain_sse_events(buffer: &mut String) -> Vec<String> {
    let mut out = Vec::new();
    loop {
        let normalized = buffer.replace("\r\n", "\n");
        if normalized.len() != buffer.len() {
            *buffer = normalized;
        }
        let Some(pos) = buffer.find("\n\n") else {
            break;
        };
        let event: String = buffer[..pos].to_string();
        buffer.drain(..pos + 2);

        let data: Vec<&str> = event
            .lines()
            .filter_map(|line| line.strip_prefix("data:"))
            .map(str::trim)
            .collect();
        if !data.is_empty() {
            out.push(data.join("\n"));
        }
    }
    out
}

fn decode_event(data: &str) -> Result<Option<StreamChunk>> {
    if data.is_empty() || data == "[DONE]" {
        return Ok(None);
    }
    let event: StreamEvent = match serde_json::from_str(data) {
        Ok(ev) => ev,
        Err(e) => {
            debug!(error = %e, data = %data, "llm.stream.unparsed_event");
            return Ok(None);
        }
    };
    if let Some(err) = event.error {
        let kind = event.error_type.unwrap_or_else(|| "generation".to_string());
        return Err(SandchatError::Api(format!("{kind} error: {err}")));
    }
    match event.token {
        Some(token) if !token.special => Ok(Some(StreamChunk::Token(token.text))),
        _ => Ok(None),
    }
}
