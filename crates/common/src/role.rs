use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The string did not name a known role.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown role: {0}")]
pub struct ParseRoleError(pub String);

/// Role asserted by the authentication layer for the acting user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Staff,
    Customer,
    Delivery,
}

impl Role {
    /// Store operators see and manage every order in their tenant.
    pub fn is_privileged(&self) -> bool {
        matches!(self, Role::Admin | Role::Staff)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Staff => "staff",
            Role::Customer => "customer",
            Role::Delivery => "delivery",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = ParseRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "staff" => Ok(Role::Staff),
            "customer" => Ok(Role::Customer),
            "delivery" => Ok(Role::Delivery),
            other => Err(ParseRoleError(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn privileged_roles() {
        assert!(Role::Admin.is_privileged());
        assert!(Role::Staff.is_privileged());
        assert!(!Role::Customer.is_privileged());
        assert!(!Role::Delivery.is_privileged());
    }

    #[test]
    fn parses_lowercase_names() {
        assert_eq!("delivery".parse::<Role>(), Ok(Role::Delivery));
        assert!("root".parse::<Role>().is_err());
    }
}
