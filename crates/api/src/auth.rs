//! Caller identity taken from the upstream authentication headers.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common::{Role, TenantId, UserId};
use domain::Actor;

use crate::error::ApiError;

pub const TENANT_HEADER: &str = "x-tenant-id";
pub const USER_HEADER: &str = "x-user-id";
pub const ROLE_HEADER: &str = "x-user-role";

/// The authenticated actor for a request.
#[derive(Debug, Clone, Copy)]
pub struct Identity(pub Actor);

impl Identity {
    /// Rejects anyone but tenant admins.
    pub fn require_admin(&self) -> Result<&Actor, ApiError> {
        if self.0.role == Role::Admin {
            Ok(&self.0)
        } else {
            Err(ApiError::Forbidden("Admin access required".to_string()))
        }
    }
}

fn header<'a>(parts: &'a Parts, name: &str) -> Result<&'a str, ApiError> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::Unauthorized(format!("Missing {name} header")))
}

impl<S: Send + Sync> FromRequestParts<S> for Identity {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let tenant_id: TenantId = header(parts, TENANT_HEADER)?
            .parse()
            .map_err(|_| ApiError::Unauthorized(format!("Invalid {TENANT_HEADER} header")))?;
        let user_id: UserId = header(parts, USER_HEADER)?
            .parse()
            .map_err(|_| ApiError::Unauthorized(format!("Invalid {USER_HEADER} header")))?;
        let role: Role = header(parts, ROLE_HEADER)?
            .to_ascii_lowercase()
            .parse()
            .map_err(|_| ApiError::Unauthorized(format!("Invalid {ROLE_HEADER} header")))?;

        Ok(Identity(Actor::new(tenant_id, user_id, role)))
    }
}
