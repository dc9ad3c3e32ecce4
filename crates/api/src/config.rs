//! Application configuration loaded from environment variables.

use std::time::Duration;

use notifications::{DispatcherConfig, EmailRelayConfig, TwilioConfig};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `pretty` or `json` (default: `pretty`)
/// - `DATABASE_URL`: PostgreSQL URL; unset runs on the in-memory store
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default: `10`)
/// - `EXPOSE_ERROR_DETAILS`: include internal error details in responses (default: `false`)
/// - `FRONTEND_URL`: base for tracking links (default: `"http://localhost:5173"`)
/// - `ENABLE_EMAIL`, `ENABLE_SMS`, `ENABLE_WHATSAPP`: channel switches (default: `false`)
/// - `EMAIL_API_URL`, `EMAIL_API_KEY`, `EMAIL_FROM`: email relay credentials
/// - `TWILIO_ACCOUNT_SID`, `TWILIO_AUTH_TOKEN`, `TWILIO_PHONE_NUMBER`,
///   `TWILIO_WHATSAPP_NUMBER`: Twilio credentials and senders
/// - `NOTIFY_CHANNEL_TIMEOUT_SECS`: per-channel send timeout (default: `10`)
/// - `NOTIFY_QUEUE_CAPACITY`: pending notification jobs (default: `1024`)
/// - `NOTIFY_WORKERS`: concurrent notification jobs (default: `8`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub expose_error_details: bool,
    pub frontend_url: String,
    pub enable_email: bool,
    pub enable_sms: bool,
    pub enable_whatsapp: bool,
    pub email_api_url: Option<String>,
    pub email_api_key: Option<String>,
    pub email_from: Option<String>,
    pub twilio_account_sid: Option<String>,
    pub twilio_auth_token: Option<String>,
    pub twilio_phone_number: Option<String>,
    pub twilio_whatsapp_number: Option<String>,
    pub notify_channel_timeout: Duration,
    pub notify_queue_capacity: usize,
    pub notify_workers: usize,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        // Blank values count as unset.
        let text = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let flag = |key: &str| {
            text(key).is_some_and(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
        };
        let defaults = Self::default();

        Self {
            host: text("HOST").unwrap_or(defaults.host),
            port: text("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: text("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match text("LOG_FORMAT").as_deref() {
                Some("json") => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
            database_url: text("DATABASE_URL"),
            database_max_connections: text("DATABASE_MAX_CONNECTIONS")
                .and_then(|n| n.parse().ok())
                .unwrap_or(defaults.database_max_connections),
            expose_error_details: flag("EXPOSE_ERROR_DETAILS"),
            frontend_url: text("FRONTEND_URL").unwrap_or(defaults.frontend_url),
            enable_email: flag("ENABLE_EMAIL"),
            enable_sms: flag("ENABLE_SMS"),
            enable_whatsapp: flag("ENABLE_WHATSAPP"),
            email_api_url: text("EMAIL_API_URL"),
            email_api_key: text("EMAIL_API_KEY"),
            email_from: text("EMAIL_FROM"),
            twilio_account_sid: text("TWILIO_ACCOUNT_SID"),
            twilio_auth_token: text("TWILIO_AUTH_TOKEN"),
            twilio_phone_number: text("TWILIO_PHONE_NUMBER"),
            twilio_whatsapp_number: text("TWILIO_WHATSAPP_NUMBER"),
            notify_channel_timeout: text("NOTIFY_CHANNEL_TIMEOUT_SECS")
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.notify_channel_timeout),
            notify_queue_capacity: text("NOTIFY_QUEUE_CAPACITY")
                .and_then(|n| n.parse::<usize>().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.notify_queue_capacity),
            notify_workers: text("NOTIFY_WORKERS")
                .and_then(|n| n.parse::<usize>().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.notify_workers),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            email_enabled: self.enable_email,
            sms_enabled: self.enable_sms,
            whatsapp_enabled: self.enable_whatsapp,
            frontend_url: self.frontend_url.clone(),
            channel_timeout: self.notify_channel_timeout,
        }
    }

    /// Email relay settings, if every credential is present.
    pub fn email_relay(&self) -> Option<EmailRelayConfig> {
        Some(EmailRelayConfig {
            api_url: self.email_api_url.clone()?,
            api_key: self.email_api_key.clone()?,
            from: self.email_from.clone()?,
        })
    }

    /// Twilio SMS settings, if the account and sender number are present.
    pub fn twilio_sms(&self) -> Option<TwilioConfig> {
        self.twilio(self.twilio_phone_number.as_deref()?)
    }

    /// Twilio WhatsApp settings, if the account and sender number are present.
    pub fn twilio_whatsapp(&self) -> Option<TwilioConfig> {
        self.twilio(self.twilio_whatsapp_number.as_deref()?)
    }

    fn twilio(&self, from: &str) -> Option<TwilioConfig> {
        Some(TwilioConfig::new(
            self.twilio_account_sid.as_deref()?,
            self.twilio_auth_token.as_deref()?,
            from,
        ))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            database_url: None,
            database_max_connections: 10,
            expose_error_details: false,
            frontend_url: "http://localhost:5173".to_string(),
            enable_email: false,
            enable_sms: false,
            enable_whatsapp: false,
            email_api_url: None,
            email_api_key: None,
            email_from: None,
            twilio_account_sid: None,
            twilio_auth_token: None,
            twilio_phone_number: None,
            twilio_whatsapp_number: None,
            notify_channel_timeout: Duration::from_secs(10),
            notify_queue_capacity: 1024,
            notify_workers: 8,
        }
    }
}
