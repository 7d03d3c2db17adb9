//! Scripted Transport
//!
//! In-memory [`JsonTransport`] answering from a per-URL script. Used by the
//! unit tests and for offline runs.
//!
//! Enable with: `cargo build --features scripted-transport`

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use super::transport::JsonTransport;
use crate::error::FetchError;

#[derive(Debug, Clone)]
struct Script {
    outcome: Result<Value, u16>,
    delay: Duration,
}

/// Transport whose answers are set up front, per URL.
///
/// Unscripted URLs fail with HTTP 404.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    scripts: Mutex<HashMap<String, Script>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `url` with `body`
    pub fn respond(&self, url: &str, body: Value) {
        self.respond_after(url, body, Duration::ZERO);
    }

    /// Answer `url` with `body` after `delay`
    pub fn respond_after(&self, url: &str, body: Value, delay: Duration) {
        self.script(url, Ok(body), delay);
    }

    /// Fail `url` with HTTP `status`
    pub fn fail(&self, url: &str, status: u16) {
        self.fail_after(url, status, Duration::ZERO);
    }

    /// Fail `url` with HTTP `status` after `delay`
    pub fn fail_after(&self, url: &str, status: u16, delay: Duration) {
        self.script(url, Err(status), delay);
    }

    /// Number of requests made for `url`
    pub fn calls(&self, url: &str) -> usize {
        self.calls.lock().get(url).copied().unwrap_or(0)
    }

    /// Number of requests made for any URL
    pub fn total_calls(&self) -> usize {
        self.calls.lock().values().sum()
    }

    fn script(&self, url: &str, outcome: Result<Value, u16>, delay: Duration) {
        self.scripts
            .lock()
            .insert(url.to_string(), Script { outcome, delay });
    }
}

#[async_trait]
impl JsonTransport for ScriptedTransport {
    async fn get_json(&self, url: &str) -> Result<Value, FetchError> {
        *self.calls.lock().entry(url.to_string()).or_insert(0) += 1;

        let script = self.scripts.lock().get(url).cloned();
        let Some(script) = script else {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: 404,
            });
        };

        if !script.delay.is_zero() {
            tokio::time::sleep(script.delay).await;
        }

        script.outcome.map_err(|status| FetchError::Status {
            url: url.to_string(),
            status,
        })
    }
}
