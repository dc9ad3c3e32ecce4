//! Rows the order pipeline reads and writes.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use common::{Money, OrderId, OrderStatus, PaymentStatus, ProductId, Role, TenantId, UserId};
use serde::{Deserialize, Serialize};

/// Catalog product as seen by the order pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub tenant_id: TenantId,
    pub name: String,
    pub price: Money,
    pub stock: u32,
    pub is_active: bool,
}

/// Account data needed to address a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub tenant_id: TenantId,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub role: Role,
}

impl User {
    /// Phone number if one is on file and not blank.
    pub fn contact_phone(&self) -> Option<&str> {
        self.phone.as_deref().map(str::trim).filter(|p| !p.is_empty())
    }
}

/// One line of an order. Name and price are snapshots taken at order time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub subtotal: Money,
}

/// Order header with its lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub tenant_id: TenantId,
    pub order_number: String,
    pub customer_id: UserId,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: String,
    pub payment_id: Option<String>,
    pub total_amount: Money,
    pub delivery_charge: Money,
    pub delivery_address: String,
    pub notes: Option<String>,
    pub delivery_agent_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub lines: Vec<OrderLine>,
}

impl Order {
    /// Sum of line subtotals, excluding the delivery charge.
    pub fn lines_subtotal(&self) -> Money {
        self.lines.iter().map(|line| line.subtotal).sum()
    }
}

/// An order as shown to clients, with the names of the people on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderView {
    #[serde(flatten)]
    pub order: Order,
    pub customer_name: Option<String>,
    pub delivery_agent_name: Option<String>,
}

impl OrderView {
    /// Attaches names looked up by user id. Unknown users stay `None`.
    pub fn new(order: Order, names: &HashMap<UserId, String>) -> Self {
        let customer_name = names.get(&order.customer_id).cloned();
        let delivery_agent_name = order
            .delivery_agent_id
            .and_then(|id| names.get(&id).cloned());
        Self {
            order,
            customer_name,
            delivery_agent_name,
        }
    }
}

/// Which orders an actor is allowed to see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderScope {
    /// Every order in the tenant.
    Tenant,
    /// Only orders placed by this customer.
    Customer(UserId),
    /// Orders assigned to this agent, plus open (pending/processing) orders.
    Delivery(UserId),
}

impl OrderScope {
    /// Returns true if the order falls within this scope.
    pub fn admits(&self, order: &Order) -> bool {
        match self {
            OrderScope::Tenant => true,
            OrderScope::Customer(customer_id) => order.customer_id == *customer_id,
            OrderScope::Delivery(agent_id) => {
                order.delivery_agent_id == Some(*agent_id) || order.status.is_open()
            }
        }
    }
}

/// Filter for listing orders, newest first.
#[derive(Debug, Clone)]
pub struct OrderQuery {
    pub tenant_id: TenantId,
    pub scope: OrderScope,
    pub status: Option<OrderStatus>,
    pub limit: usize,
    pub offset: usize,
}

impl OrderQuery {
    pub fn new(tenant_id: TenantId, scope: OrderScope) -> Self {
        Self {
            tenant_id,
            scope,
            status: None,
            limit: 20,
            offset: 0,
        }
    }

    pub fn status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn page(mut self, limit: usize, offset: usize) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }
}

/// Compare-and-set update of an order's status.
///
/// Applied only while the order is still in `expected`; the optional side
/// effects are written in the same statement.
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub expected: OrderStatus,
    pub new_status: OrderStatus,
    pub delivery_agent_id: Option<UserId>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Per-tenant order counters for the dashboard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStats {
    pub total_orders: u64,
    pub pending_orders: u64,
    pub processing_orders: u64,
    pub in_transit_orders: u64,
    pub delivered_orders: u64,
    pub cancelled_orders: u64,
    /// Sum of totals of paid orders.
    pub total_revenue: Money,
}

impl OrderStats {
    pub(crate) fn count(&mut self, order: &Order) {
        self.total_orders += 1;
        match order.status {
            OrderStatus::Pending => self.pending_orders += 1,
            OrderStatus::Processing => self.processing_orders += 1,
            OrderStatus::InTransit => self.in_transit_orders += 1,
            OrderStatus::Delivered => self.delivered_orders += 1,
            OrderStatus::Cancelled => self.cancelled_orders += 1,
        }
        if order.payment_status == PaymentStatus::Paid {
            self.total_revenue += order.total_amount;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(customer_id: UserId, status: OrderStatus, agent: Option<UserId>) -> Order {
        let now = Utc::now();
        Order {
            id: OrderId::new(),
            tenant_id: TenantId::new(),
            order_number: "ORD1".to_string(),
            customer_id,
            status,
            payment_status: PaymentStatus::Pending,
            payment_method: "cod".to_string(),
            payment_id: None,
            total_amount: Money::from_cents(300),
            delivery_charge: Money::zero(),
            delivery_address: "1 Main St".to_string(),
            notes: None,
            delivery_agent_id: agent,
            created_at: now,
            updated_at: now,
            delivered_at: None,
            lines: vec![
                OrderLine {
                    product_id: ProductId::new(),
                    product_name: "Rice".to_string(),
                    quantity: 2,
                    unit_price: Money::from_cents(100),
                    subtotal: Money::from_cents(200),
                },
                OrderLine {
                    product_id: ProductId::new(),
                    product_name: "Dal".to_string(),
                    quantity: 1,
                    unit_price: Money::from_cents(100),
                    subtotal: Money::from_cents(100),
                },
            ],
        }
    }

    #[test]
    fn lines_subtotal_sums_lines() {
        let o = order(UserId::new(), OrderStatus::Pending, None);
        assert_eq!(o.lines_subtotal(), Money::from_cents(300));
    }

    #[test]
    fn customer_scope_admits_only_own_orders() {
        let me = UserId::new();
        assert!(OrderScope::Customer(me).admits(&order(me, OrderStatus::Pending, None)));
        assert!(!OrderScope::Customer(me).admits(&order(UserId::new(), OrderStatus::Pending, None)));
    }

    #[test]
    fn delivery_scope_admits_assigned_and_open_orders() {
        let agent = UserId::new();
        let scope = OrderScope::Delivery(agent);
        assert!(scope.admits(&order(UserId::new(), OrderStatus::Processing, None)));
        assert!(scope.admits(&order(UserId::new(), OrderStatus::InTransit, Some(agent))));
        assert!(!scope.admits(&order(UserId::new(), OrderStatus::InTransit, Some(UserId::new()))));
        assert!(!scope.admits(&order(UserId::new(), OrderStatus::Delivered, None)));
    }

    #[test]
    fn view_names_customer_and_agent_and_flattens_order() {
        let customer = UserId::new();
        let agent = UserId::new();
        let names = HashMap::from([
            (customer, "Asha".to_string()),
            (agent, "Vikram".to_string()),
        ]);

        let view = OrderView::new(order(customer, OrderStatus::InTransit, Some(agent)), &names);
        assert_eq!(view.customer_name.as_deref(), Some("Asha"));
        assert_eq!(view.delivery_agent_name.as_deref(), Some("Vikram"));

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["order_number"], "ORD1");
        assert_eq!(json["customer_name"], "Asha");

        let unassigned = OrderView::new(order(customer, OrderStatus::Pending, None), &names);
        assert_eq!(unassigned.delivery_agent_name, None);
        let unknown = OrderView::new(order(UserId::new(), OrderStatus::Pending, None), &names);
        assert_eq!(unknown.customer_name, None);
    }

    #[test]
    fn blank_phone_is_no_phone() {
        let mut user = User {
            id: UserId::new(),
            tenant_id: TenantId::new(),
            name: "Asha".to_string(),
            email: "asha@example.com".to_string(),
            phone: Some("  ".to_string()),
            role: Role::Customer,
        };
        assert_eq!(user.contact_phone(), None);
        user.phone = Some("+911234567890".to_string());
        assert_eq!(user.contact_phone(), Some("+911234567890"));
    }
}
