//! Origin client: a `reqwest`-backed client with explicit status-code branching and a
//! mapped-error decode step.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::error::OriginError;
use crate::traits::{OriginClient, OriginResponse};

pub struct ReqwestOriginClient {
    client: Client,
    base_url: String,
}

impl ReqwestOriginClient {
    /// # Panics
    ///
    /// Panics if the underlying `reqwest::Client` cannot be built, which only happens when the
    /// process's TLS backend fails to initialise.
    #[must_use]
    pub fn new(base_url: String, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build origin HTTP client");
        Self { client, base_url }
    }
}

#[async_trait]
impl OriginClient for ReqwestOriginClient {
    async fn fetch(&self, path: &str, query: Option<&str>) -> Result<OriginResponse, OriginError> {
        let mut url = format!("{}{}", self.base_url, path);
        if let Some(query) = query.filter(|q| !q.is_empty()) {
            url.push('?');
            url.push_str(query);
        }

        debug!(url = %url, "fetching from origin");
        let response = self.client.get(&url).send().await?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();

        let body = response.bytes().await?;

        Ok(OriginResponse {
            status,
            content_type,
            body,
        })
    }
}
