//! Multi-channel notification dispatch for order events.
//!
//! A [`Dispatcher`] renders one [`Notification`] for email, SMS and
//! WhatsApp, attempts every enabled channel independently and writes a
//! single log record. Welcome messages are dispatched inline; order events
//! go through the bounded [`DispatchQueue`], which is the order service's
//! post-commit notifier.

pub mod channels;
pub mod dispatcher;
pub mod error;
pub mod notification;
pub mod queue;
pub mod templates;

pub use channels::{
    ChannelKind, EmailRelayChannel, EmailRelayConfig, NotificationChannel, OutboundMessage,
    RecordingChannel, SentMessage, TwilioChannel, TwilioConfig,
};
pub use dispatcher::{
    ChannelOutcome, ChannelSetting, ChannelSettings, DispatchReport, Dispatcher, DispatcherConfig,
};
pub use error::ChannelError;
pub use notification::Notification;
pub use queue::{DispatchQueue, DispatchReceiver};
pub use templates::Templates;
