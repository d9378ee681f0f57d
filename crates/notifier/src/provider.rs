//! Delivery providers: the boundary to the upstream email/SMS service.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use thiserror::Error;

use relay_common::types::{Channel, ProviderResponse};

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Provider rejected delivery: {0}")]
    Rejected(String),

    #[error("Delivery timed out after {0:?}")]
    Timeout(Duration),
}

/// Sends one message to one recipient over one channel.
///
/// Callers treat every error as retryable.
#[async_trait]
pub trait DeliveryProvider: Send + Sync {
    async fn deliver(
        &self,
        channel: Channel,
        recipient: &str,
        body: &str,
    ) -> Result<(), DeliveryError>;

    /// Human-readable name for logs.
    fn name(&self) -> &'static str;
}

/// Provider backed by the notification service's HTTP API
/// (`POST /send-email`, `POST /send-sms`).
pub struct HttpDeliveryProvider {
    client: reqwest::Client,
    base_url: String,
}

impl HttpDeliveryProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self, channel: Channel) -> String {
        format!("{}/send-{}", self.base_url, channel)
    }

    fn payload(channel: Channel, recipient: &str, body: &str) -> serde_json::Value {
        match channel {
            Channel::Email => json!({ "email": recipient, "message": body }),
            Channel::Sms => json!({ "telephone": recipient, "message": body }),
        }
    }
}

#[async_trait]
impl DeliveryProvider for HttpDeliveryProvider {
    async fn deliver(
        &self,
        channel: Channel,
        recipient: &str,
        body: &str,
    ) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(self.endpoint(channel))
            .json(&Self::payload(channel, recipient, body))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Rejected(format!("{}: {}", status, detail)));
        }

        // The send already succeeded; an unexpected body must not trigger a resend.
        match response.json::<ProviderResponse>().await {
            Ok(receipt) => tracing::debug!(
                channel = %receipt.channel,
                to = %receipt.to,
                status = %receipt.status,
                "Provider accepted notification"
            ),
            Err(e) => tracing::debug!(
                channel = %channel,
                error = %e,
                "Provider response body not understood"
            ),
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
