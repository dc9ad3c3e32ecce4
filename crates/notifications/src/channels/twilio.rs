//! SMS and WhatsApp delivery through the Twilio Messages API.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{ChannelKind, NotificationChannel, OutboundMessage};
use crate::error::{ChannelError, Result};

const DEFAULT_BASE_URL: &str = "https://api.twilio.com";

/// Twilio account credentials and sender number.
#[derive(Debug, Clone)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    /// Sender number in E.164 form, without any channel prefix.
    pub from: String,
    pub base_url: String,
}

impl TwilioConfig {
    pub fn new(
        account_sid: impl Into<String>,
        auth_token: impl Into<String>,
        from: impl Into<String>,
    ) -> Self {
        Self {
            account_sid: account_sid.into(),
            auth_token: auth_token.into(),
            from: from.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Points the client at a different API host.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.base_url.trim_end_matches('/'),
            self.account_sid
        )
    }
}

#[derive(Debug, Deserialize)]
struct MessageResource {
    sid: String,
}

/// Twilio-backed channel. The same API serves SMS and WhatsApp; WhatsApp
/// addresses carry a `whatsapp:` prefix.
pub struct TwilioChannel {
    client: Client,
    config: TwilioConfig,
    kind: ChannelKind,
}

impl TwilioChannel {
    pub fn sms(client: Client, config: TwilioConfig) -> Self {
        Self {
            client,
            config,
            kind: ChannelKind::Sms,
        }
    }

    pub fn whatsapp(client: Client, config: TwilioConfig) -> Self {
        Self {
            client,
            config,
            kind: ChannelKind::WhatsApp,
        }
    }

    fn address(&self, number: &str) -> String {
        match self.kind {
            ChannelKind::WhatsApp if !number.starts_with("whatsapp:") => {
                format!("whatsapp:{number}")
            }
            _ => number.to_string(),
        }
    }
}

#[async_trait]
impl NotificationChannel for TwilioChannel {
    fn kind(&self) -> ChannelKind {
        self.kind
    }

    fn provider(&self) -> &'static str {
        "twilio"
    }

    fn sender(&self) -> Option<&str> {
        Some(&self.config.from)
    }

    async fn send(&self, to: &str, message: &OutboundMessage) -> Result<String> {
        let to = self.address(to);
        let from = self.address(&self.config.from);

        let response = self
            .client
            .post(self.config.messages_url())
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&[
                ("To", to.as_str()),
                ("From", from.as_str()),
                ("Body", message.body.as_str()),
            ])
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

        let resource: MessageResource = response
            .json()
            .await
            .map_err(|e| ChannelError::InvalidResponse(e.to_string()))?;

        tracing::debug!(channel = %self.kind, sid = %resource.sid, "message accepted by twilio");
        Ok(resource.sid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> TwilioConfig {
        TwilioConfig::new("AC123", "token", "+15550001111")
    }

    #[test]
    fn whatsapp_addresses_are_prefixed_once() {
        let channel = TwilioChannel::whatsapp(Client::new(), config());
        assert_eq!(channel.address("+15550002222"), "whatsapp:+15550002222");
        assert_eq!(
            channel.address("whatsapp:+15550002222"),
            "whatsapp:+15550002222"
        );
    }

    #[test]
    fn sms_addresses_are_left_alone() {
        let channel = TwilioChannel::sms(Client::new(), config());
        assert_eq!(channel.address("+15550002222"), "+15550002222");
        assert_eq!(channel.kind(), ChannelKind::Sms);
        assert_eq!(channel.sender(), Some("+15550001111"));
    }

    #[test]
    fn messages_url_uses_account_sid() {
        let config = config().with_base_url("http://localhost:8080/");
        assert_eq!(
            config.messages_url(),
            "http://localhost:8080/2010-04-01/Accounts/AC123/Messages.json"
        );
    }
}
