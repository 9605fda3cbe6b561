//! Request / response shapes of the text-generation-inference HTTP API.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GenerateParameters {
    pub max_new_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
    pub details: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GenerateRequest {
    pub inputs: String,
    pub parameters: GenerateParameters,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateResponse {
    pub generated_text: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamToken {
    #[serde(default)]
    pub id: i64,
    pub text: String,
    #[serde(default)]
    pub special: bool,
}

/// One `data:` event of `/generate_stream`.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamEvent {
    pub token: Option<StreamToken>,
    #[serde(default)]
    pub generated_text: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_type: Option<String>,
}

/// Error body returned with non-2xx statuses.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    pub error: String,
    #[serde(default)]
    pub error_type: Option<String>,
}

/// Incremental output of a streaming generation.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    Token(String),
    Done,
}
