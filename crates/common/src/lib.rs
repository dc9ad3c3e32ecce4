//! Shared types for the storefront order pipeline.
//!
//! Every crate in the workspace speaks in terms of these identifiers and
//! value types, so they live here with no dependency on storage or HTTP.

pub mod money;
pub mod role;
pub mod status;
pub mod types;

pub use money::{Money, MoneyError};
pub use role::{ParseRoleError, Role};
pub use status::{OrderStatus, ParseStatusError, PaymentStatus};
pub use types::{NotificationId, OrderId, ProductId, TenantId, UserId};
