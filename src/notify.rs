//! Push dispatcher contract and the FCM HTTP client behind it.
//!
//! Delivery is best-effort everywhere: a failed or timed-out push never
//! fails the enclosing operation.

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

const PUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome counts for a multicast send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MulticastReport {
    pub success_count: usize,
    pub failure_count: usize,
}

#[async_trait]
pub trait PushDispatcher: Send + Sync {
    /// Send one notification. Returns whether the dispatcher accepted it.
    async fn send(
        &self,
        endpoint_token: &str,
        title: &str,
        body: &str,
        data: HashMap<String, String>,
    ) -> bool;

    async fn multicast(
        &self,
        tokens: &[String],
        title: &str,
        body: &str,
        data: HashMap<String, String>,
    ) -> MulticastReport {
        let mut report = MulticastReport {
            success_count: 0,
            failure_count: 0,
        };
        for token in tokens {
            if self.send(token, title, body, data.clone()).await {
                report.success_count += 1;
            } else {
                report.failure_count += 1;
            }
        }
        report
    }
}

/// FCM legacy HTTP dispatcher. Hard 5 s timeout; failures log and return
/// false rather than erroring.
pub struct FcmDispatcher {
    client: reqwest::Client,
    endpoint: String,
    server_key: String,
}

impl FcmDispatcher {
    pub fn new(endpoint: String, server_key: String) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(PUSH_TIMEOUT)
            .build()?;
        info!("🔔 Push dispatcher configured");
        Ok(Self {
            client,
            endpoint,
            server_key,
        })
    }
}

#[async_trait]
impl PushDispatcher for FcmDispatcher {
    async fn send(
        &self,
        endpoint_token: &str,
        title: &str,
        body: &str,
        data: HashMap<String, String>,
    ) -> bool {
        let payload = json!({
            "to": endpoint_token,
            "notification": { "title": title, "body": body },
            "data": data,
        });

        let result = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("key={}", self.server_key))
            .json(&payload)
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => {
                debug!("notification sent: {title}");
                true
            }
            Ok(resp) => {
                warn!("push dispatcher rejected notification: {}", resp.status());
                false
            }
            Err(e) => {
                warn!("push dispatch failed (non-critical): {e}");
                false
            }
        }
    }
}

/// Dispatcher used when FCM is not configured. Drops everything.
pub struct NoopDispatcher;

#[async_trait]
impl PushDispatcher for NoopDispatcher {
    async fn send(
        &self,
        _endpoint_token: &str,
        title: &str,
        _body: &str,
        _data: HashMap<String, String>,
    ) -> bool {
        debug!("push dispatcher not configured, dropping notification: {title}");
        false
    }
}
