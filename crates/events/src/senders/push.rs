//! Web push delivery via an HTTP push gateway.

use std::time::Duration;

use async_trait::async_trait;

use super::{NotificationSender, SendError};

/// HTTP request timeout for a single delivery attempt. The dispatcher
/// applies its own outer per-attempt deadline on top of this.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Delivers web push notifications by POSTing JSON to a push gateway.
pub struct WebPushSender {
    client: reqwest::Client,
    gateway_url: String,
}

impl WebPushSender {
    /// Create a sender with a pre-configured HTTP client.
    pub fn new(gateway_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to build reqwest HTTP client");
        Self {
            client,
            gateway_url: gateway_url.into(),
        }
    }
}

#[async_trait]
impl NotificationSender for WebPushSender {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), SendError> {
        let payload = serde_json::json!({
            "recipient": recipient,
            "title": subject,
            "body": body,
        });

        let response = self
            .client
            .post(&self.gateway_url)
            .json(&payload)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(SendError::HttpStatus(response.status().as_u16()));
        }
        tracing::debug!(recipient, subject, "Web push delivered");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
