//! HTTP route handlers.

pub mod health;
pub mod metrics;
pub mod notifications;
pub mod orders;

use std::str::FromStr;

use crate::error::ApiError;

/// Parses a UUID path or query segment into a typed id.
pub(crate) fn parse_id<T>(raw: &str) -> Result<T, ApiError>
where
    T: FromStr<Err = uuid::Error>,
{
    raw.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid ID format: {e}")))
}
