use std::io;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SandchatError {
    #[error("config error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("network error: {0}")]
    Network(String),
    #[error("api error: {0}")]
    Api(String),
    #[error("rate limited: {0}")]
    RateLimit(String),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("could not parse model output: {0}")]
    OutputParse(String),
    #[error("sandbox error: {0}")]
    Sandbox(String),
}

pub type Result<T> = std::result::Result<T, SandchatError>;

impl SandchatError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            SandchatError::NotFound(_) => StatusCode::NOT_FOUND,
            SandchatError::BadRequest(_) | SandchatError::OutputParse(_) => {
                StatusCode::BAD_REQUEST
            }
            SandchatError::Network(_)
            | SandchatError::Api(_)
            | SandchatError::RateLimit(_)
            | SandchatError::Http(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for SandchatError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request.failed");
        }
        let body = serde_json::json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}
