//! Notification channel error types.

use std::time::Duration;

use thiserror::Error;

/// Errors a single delivery channel can report.
///
/// These never leave the dispatcher: each one is turned into a `failed`
/// outcome in the dispatch report.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The HTTP request to the provider could not be completed.
    #[error("Provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider answered with a non-success status.
    #[error("Provider returned {status}: {body}")]
    Provider { status: u16, body: String },

    /// The provider accepted the request but the reply was unusable.
    #[error("Unexpected provider response: {0}")]
    InvalidResponse(String),

    /// The provider refused the message outright.
    #[error("Message rejected: {0}")]
    Rejected(String),

    /// The attempt did not finish within the per-channel timeout.
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// The channel panicked while sending.
    #[error("Channel panicked")]
    Panicked,
}

/// Convenience type alias for channel results.
pub type Result<T> = std::result::Result<T, ChannelError>;
