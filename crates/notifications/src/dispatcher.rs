//! Fan-out of one notification across every channel.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use common::OrderStatus;
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use store::{NotificationLog, NotificationRecord, User};

use crate::channels::{ChannelKind, NotificationChannel, OutboundMessage};
use crate::error::ChannelError;
use crate::notification::Notification;
use crate::templates::Templates;

/// Read-only dispatcher settings.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub email_enabled: bool,
    pub sms_enabled: bool,
    pub whatsapp_enabled: bool,
    /// Base URL for tracking links.
    pub frontend_url: String,
    /// Upper bound on a single channel attempt.
    pub channel_timeout: Duration,
}

impl DispatcherConfig {
    fn enabled(&self, kind: ChannelKind) -> bool {
        match kind {
            ChannelKind::Email => self.email_enabled,
            ChannelKind::Sms => self.sms_enabled,
            ChannelKind::WhatsApp => self.whatsapp_enabled,
        }
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            email_enabled: false,
            sms_enabled: false,
            whatsapp_enabled: false,
            frontend_url: "http://localhost:5173".to_string(),
            channel_timeout: Duration::from_secs(10),
        }
    }
}

/// Result of one channel attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ChannelOutcome {
    Sent { id: String },
    Failed { error: String },
}

impl ChannelOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, ChannelOutcome::Sent { .. })
    }

    fn label(&self) -> &'static str {
        match self {
            ChannelOutcome::Sent { .. } => "sent",
            ChannelOutcome::Failed { .. } => "failed",
        }
    }
}

/// Per-channel outcomes of one dispatch. `None` means the channel was skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchReport {
    pub email: Option<ChannelOutcome>,
    pub sms: Option<ChannelOutcome>,
    pub whatsapp: Option<ChannelOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<OrderStatus>,
}

impl DispatchReport {
    pub fn outcome(&self, kind: ChannelKind) -> Option<&ChannelOutcome> {
        match kind {
            ChannelKind::Email => self.email.as_ref(),
            ChannelKind::Sms => self.sms.as_ref(),
            ChannelKind::WhatsApp => self.whatsapp.as_ref(),
        }
    }

    pub fn failures(&self) -> usize {
        ChannelKind::ALL
            .into_iter()
            .filter(|kind| matches!(self.outcome(*kind), Some(ChannelOutcome::Failed { .. })))
            .count()
    }
}

/// How one channel is set up, for the settings view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelSetting {
    pub enabled: bool,
    pub configured: bool,
    pub provider: Option<&'static str>,
    pub from: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelSettings {
    pub email: ChannelSetting,
    pub sms: ChannelSetting,
    pub whatsapp: ChannelSetting,
}

/// Sends a notification on every enabled and configured channel, then
/// writes exactly one log record.
///
/// Channels are attempted concurrently and independently: a channel that
/// fails, times out or panics only affects its own outcome. Neither channel
/// failures nor log failures reach the caller.
pub struct Dispatcher<L: NotificationLog> {
    log: L,
    config: DispatcherConfig,
    templates: Templates,
    email: Option<Arc<dyn NotificationChannel>>,
    sms: Option<Arc<dyn NotificationChannel>>,
    whatsapp: Option<Arc<dyn NotificationChannel>>,
}

impl<L: NotificationLog> Dispatcher<L> {
    /// Creates a dispatcher with no channels configured.
    pub fn new(log: L, config: DispatcherConfig) -> Self {
        let templates = Templates::new(config.frontend_url.clone());
        Self {
            log,
            config,
            templates,
            email: None,
            sms: None,
            whatsapp: None,
        }
    }

    /// Installs a channel in the slot matching its kind.
    pub fn with_channel(mut self, channel: Arc<dyn NotificationChannel>) -> Self {
        match channel.kind() {
            ChannelKind::Email => self.email = Some(channel),
            ChannelKind::Sms => self.sms = Some(channel),
            ChannelKind::WhatsApp => self.whatsapp = Some(channel),
        }
        self
    }

    pub fn log(&self) -> &L {
        &self.log
    }

    fn channel(&self, kind: ChannelKind) -> Option<&Arc<dyn NotificationChannel>> {
        match kind {
            ChannelKind::Email => self.email.as_ref(),
            ChannelKind::Sms => self.sms.as_ref(),
            ChannelKind::WhatsApp => self.whatsapp.as_ref(),
        }
    }

    pub fn settings(&self) -> ChannelSettings {
        let setting = |kind: ChannelKind| {
            let channel = self.channel(kind);
            ChannelSetting {
                enabled: self.config.enabled(kind),
                configured: channel.is_some(),
                provider: channel.map(|c| c.provider()),
                from: channel.and_then(|c| c.sender()).map(str::to_string),
            }
        };
        ChannelSettings {
            email: setting(ChannelKind::Email),
            sms: setting(ChannelKind::Sms),
            whatsapp: setting(ChannelKind::WhatsApp),
        }
    }

    /// Dispatches a notification and records the attempt.
    #[tracing::instrument(skip(self, notification), fields(kind = %notification.kind(), user_id = %notification.user().id))]
    pub async fn dispatch(&self, notification: &Notification) -> DispatchReport {
        let user = notification.user();
        let render = |kind: ChannelKind| move || self.templates.render(notification, kind);
        let (email, sms, whatsapp) = tokio::join!(
            self.attempt(ChannelKind::Email, user, render(ChannelKind::Email)),
            self.attempt(ChannelKind::Sms, user, render(ChannelKind::Sms)),
            self.attempt(ChannelKind::WhatsApp, user, render(ChannelKind::WhatsApp)),
        );
        let report = DispatchReport {
            email,
            sms,
            whatsapp,
            status: notification.status(),
        };

        metrics::counter!("notifications_dispatched_total", "kind" => notification.kind().as_str())
            .increment(1);
        self.record(notification, &report).await;
        report
    }

    /// Sends a test message on one channel. The other channels stay empty
    /// in the report and nothing is logged.
    #[tracing::instrument(skip(self, user), fields(channel = %kind, user_id = %user.id))]
    pub async fn send_test(&self, kind: ChannelKind, user: &User) -> DispatchReport {
        let outcome = self
            .attempt(kind, user, || self.templates.render_test(user, kind))
            .await;
        let mut report = DispatchReport::default();
        match kind {
            ChannelKind::Email => report.email = outcome,
            ChannelKind::Sms => report.sms = outcome,
            ChannelKind::WhatsApp => report.whatsapp = outcome,
        }
        report
    }

    async fn attempt(
        &self,
        kind: ChannelKind,
        user: &User,
        render: impl FnOnce() -> OutboundMessage,
    ) -> Option<ChannelOutcome> {
        if !self.config.enabled(kind) {
            return None;
        }
        let channel = self.channel(kind)?;
        let to = if kind.needs_phone() {
            user.contact_phone()?
        } else {
            user.email.as_str()
        };

        let message = render();
        let outcome = match self.send_guarded(channel.as_ref(), to, &message).await {
            Ok(id) => ChannelOutcome::Sent { id },
            Err(e) => {
                tracing::warn!(channel = %kind, error = %e, "notification channel failed");
                ChannelOutcome::Failed {
                    error: e.to_string(),
                }
            }
        };

        metrics::counter!(
            "notification_channel_outcomes_total",
            "channel" => kind.as_str(),
            "outcome" => outcome.label()
        )
        .increment(1);
        Some(outcome)
    }

    async fn send_guarded(
        &self,
        channel: &dyn NotificationChannel,
        to: &str,
        message: &OutboundMessage,
    ) -> Result<String, ChannelError> {
        let send = AssertUnwindSafe(channel.send(to, message)).catch_unwind();
        match tokio::time::timeout(self.config.channel_timeout, send).await {
            Err(_) => Err(ChannelError::Timeout(self.config.channel_timeout)),
            Ok(Err(_)) => Err(ChannelError::Panicked),
            Ok(Ok(result)) => result,
        }
    }

    async fn record(&self, notification: &Notification, report: &DispatchReport) {
        let metadata = match serde_json::to_value(report) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode dispatch report");
                serde_json::Value::Null
            }
        };
        let user = notification.user();
        let record = NotificationRecord::new(
            user.tenant_id,
            user.id,
            notification.kind(),
            notification.reference(),
            metadata,
        );

        if let Err(e) = self.log.record(record).await {
            metrics::counter!("notification_log_failures_total").increment(1);
            tracing::warn!(error = %e, "failed to write notification log");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::RecordingChannel;
    use common::{Role, TenantId, UserId};
    use store::{InMemoryStore, User};

    fn user(phone: Option<&str>) -> User {
        User {
            id: UserId::new(),
            tenant_id: TenantId::new(),
            name: "Ravi".to_string(),
            email: "ravi@example.com".to_string(),
            phone: phone.map(str::to_string),
            role: Role::Customer,
        }
    }

    fn all_enabled() -> DispatcherConfig {
        DispatcherConfig {
            email_enabled: true,
            sms_enabled: true,
            whatsapp_enabled: true,
            ..DispatcherConfig::default()
        }
    }

    #[test]
    fn report_serializes_skipped_channels_as_null() {
        let report = DispatchReport {
            email: Some(ChannelOutcome::Sent {
                id: "m-1".to_string(),
            }),
            sms: Some(ChannelOutcome::Failed {
                error: "down".to_string(),
            }),
            whatsapp: None,
            status: None,
        };

        assert_eq!(
            serde_json::to_value(&report).unwrap(),
            serde_json::json!({
                "email": {"status": "sent", "id": "m-1"},
                "sms": {"status": "failed", "error": "down"},
                "whatsapp": null,
            })
        );
        assert_eq!(report.failures(), 1);
    }

    #[tokio::test]
    async fn disabled_channels_are_skipped_even_when_configured() {
        let sms = RecordingChannel::new(ChannelKind::Sms);
        let dispatcher = Dispatcher::new(InMemoryStore::new(), DispatcherConfig::default())
            .with_channel(Arc::new(sms.clone()));

        let report = dispatcher
            .dispatch(&Notification::Welcome {
                user: user(Some("+15550001111")),
            })
            .await;

        assert_eq!(report, DispatchReport::default());
        assert_eq!(sms.attempts(), 0);
        assert_eq!(dispatcher.log().notification_count().await, 1);
    }

    #[tokio::test]
    async fn enabled_but_unconfigured_channels_are_skipped() {
        let email = RecordingChannel::new(ChannelKind::Email);
        let dispatcher = Dispatcher::new(InMemoryStore::new(), all_enabled())
            .with_channel(Arc::new(email.clone()));

        let report = dispatcher
            .dispatch(&Notification::Welcome {
                user: user(Some("+15550001111")),
            })
            .await;

        assert!(report.email.as_ref().is_some_and(ChannelOutcome::is_sent));
        assert!(report.sms.is_none());
        assert!(report.whatsapp.is_none());
        assert_eq!(email.sent()[0].to, "ravi@example.com");
    }

    #[tokio::test]
    async fn test_send_uses_one_channel_and_is_not_logged() {
        let email = RecordingChannel::new(ChannelKind::Email);
        let sms = RecordingChannel::new(ChannelKind::Sms);
        let dispatcher = Dispatcher::new(InMemoryStore::new(), all_enabled())
            .with_channel(Arc::new(email.clone()))
            .with_channel(Arc::new(sms.clone()));

        let report = dispatcher
            .send_test(ChannelKind::Sms, &user(Some("+15550001111")))
            .await;

        assert!(report.sms.as_ref().is_some_and(ChannelOutcome::is_sent));
        assert!(report.email.is_none() && report.whatsapp.is_none());
        assert_eq!(email.attempts(), 0);
        assert_eq!(sms.sent()[0].to, "+15550001111");
        assert!(sms.sent()[0].body.contains("test message"));
        assert_eq!(dispatcher.log().notification_count().await, 0);

        let no_phone = dispatcher.send_test(ChannelKind::Sms, &user(None)).await;
        assert_eq!(no_phone, DispatchReport::default());
    }

    #[test]
    fn settings_reflect_flags_and_installed_channels() {
        let dispatcher = Dispatcher::new(
            InMemoryStore::new(),
            DispatcherConfig {
                sms_enabled: true,
                ..DispatcherConfig::default()
            },
        )
        .with_channel(Arc::new(RecordingChannel::new(ChannelKind::Sms)));

        let settings = dispatcher.settings();
        assert!(settings.sms.enabled && settings.sms.configured);
        assert_eq!(settings.sms.provider, Some("recording"));
        assert!(!settings.email.enabled && !settings.email.configured);
        assert_eq!(settings.whatsapp.provider, None);
    }
}
