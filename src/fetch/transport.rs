//! HTTP Transport
//!
//! The single network seam of the crate: GET a URL, get JSON back.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::error::{Error, FetchError, Result};

/// Fetches a JSON document from a URL.
///
/// Implementations do not cache and do not retry; the coordinator owns both
/// concerns.
#[async_trait]
pub trait JsonTransport: Send + Sync {
    /// GET `url` and parse the body as JSON
    async fn get_json(&self, url: &str) -> std::result::Result<Value, FetchError>;
}

/// reqwest-backed transport
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    timeout: Duration,
}

impl HttpTransport {
    /// Build a client with a fixed per-request timeout
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, timeout })
    }
}

#[async_trait]
impl JsonTransport for HttpTransport {
    #[instrument(skip(self))]
    async fn get_json(&self, url: &str) -> std::result::Result<Value, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.json::<Value>().await.map_err(|e| FetchError::Decode {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        debug!("Fetched {} ({})", url, status);
        Ok(body)
    }
}
