//! Delivery channels and their provider implementations.

pub mod email;
pub mod recording;
pub mod twilio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use email::{EmailRelayChannel, EmailRelayConfig};
pub use recording::{RecordingChannel, SentMessage};
pub use twilio::{TwilioChannel, TwilioConfig};

/// The channels a notification fans out to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Email,
    Sms,
    WhatsApp,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 3] = [ChannelKind::Email, ChannelKind::Sms, ChannelKind::WhatsApp];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Email => "email",
            ChannelKind::Sms => "sms",
            ChannelKind::WhatsApp => "whatsapp",
        }
    }

    /// SMS and WhatsApp need a phone number; email does not.
    pub fn needs_phone(&self) -> bool {
        !matches!(self, ChannelKind::Email)
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rendered message ready for one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Subject line. Only email uses it.
    pub subject: String,
    /// HTML for email, plain text for SMS and WhatsApp.
    pub body: String,
}

/// A single delivery channel backed by an external provider.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn kind(&self) -> ChannelKind;

    /// Provider name shown in the settings view.
    fn provider(&self) -> &'static str;

    /// Sender address or number, if the provider has one.
    fn sender(&self) -> Option<&str>;

    /// Delivers one message and returns the provider's message id.
    async fn send(&self, to: &str, message: &OutboundMessage) -> Result<String>;
}
