//! The authenticated caller of a domain operation.

use common::{Role, TenantId, UserId};
use store::OrderScope;

/// Identity supplied by the authentication collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn new(tenant_id: TenantId, user_id: UserId, role: Role) -> Self {
        Self {
            tenant_id,
            user_id,
            role,
        }
    }

    /// Which of the tenant's orders this actor may read.
    pub fn order_scope(&self) -> OrderScope {
        match self.role {
            Role::Admin | Role::Staff => OrderScope::Tenant,
            Role::Customer => OrderScope::Customer(self.user_id),
            Role::Delivery => OrderScope::Delivery(self.user_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_follows_role() {
        let tenant = TenantId::new();
        let user = UserId::new();
        assert_eq!(
            Actor::new(tenant, user, Role::Staff).order_scope(),
            OrderScope::Tenant
        );
        assert_eq!(
            Actor::new(tenant, user, Role::Customer).order_scope(),
            OrderScope::Customer(user)
        );
        assert_eq!(
            Actor::new(tenant, user, Role::Delivery).order_scope(),
            OrderScope::Delivery(user)
        );
    }
}
