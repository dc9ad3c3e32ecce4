//! Email delivery through an HTTP relay.
//!
//! The relay takes `{from, to, subject, html}` as JSON with a bearer key and
//! answers with the id it assigned to the message.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{ChannelKind, NotificationChannel, OutboundMessage};
use crate::error::{ChannelError, Result};

/// Relay endpoint, key and sender address.
#[derive(Debug, Clone)]
pub struct EmailRelayConfig {
    pub api_url: String,
    pub api_key: String,
    pub from: String,
}

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(alias = "messageId", alias = "message_id")]
    id: String,
}

pub struct EmailRelayChannel {
    client: Client,
    config: EmailRelayConfig,
}

impl EmailRelayChannel {
    pub fn new(client: Client, config: EmailRelayConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl NotificationChannel for EmailRelayChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Email
    }

    fn provider(&self) -> &'static str {
        "http-relay"
    }

    fn sender(&self) -> Option<&str> {
        Some(&self.config.from)
    }

    async fn send(&self, to: &str, message: &OutboundMessage) -> Result<String> {
        if !to.contains('@') {
            return Err(ChannelError::Rejected(format!("invalid email address {to}")));
        }

        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(&SendRequest {
                from: &self.config.from,
                to,
                subject: &message.subject,
                html: &message.body,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChannelError::Provider {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        let reply: SendResponse = response
            .json()
            .await
            .map_err(|e| ChannelError::InvalidResponse(e.to_string()))?;

        tracing::debug!(message_id = %reply.id, "email accepted by relay");
        Ok(reply.id)
    }
}
