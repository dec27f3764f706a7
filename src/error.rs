//! Error hierarchy for the proxy.
//!
//! `OriginError` and `StoreError` are internal: the pipeline always degrades them per the
//! disposition table and never lets them escape a handler as an `Err`. `ProxyError` covers the
//! two genuinely fatal paths, both at startup.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum OriginError {
    #[error("origin transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("origin returned status {0}")]
    Http(u16),
    #[error("failed to decode origin response body: {0}")]
    Decode(String),
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("far tier transport error: {0}")]
    Transport(String),
    #[error("far tier decode error: {0}")]
    Decode(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("invalid value for environment variable {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to bind listener: {0}")]
    Bind(#[source] std::io::Error),
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = StatusCode::INTERNAL_SERVER_ERROR;
        (status, axum::Json(json!({ "error": self.to_string() }))).into_response()
    }
}
