//! Order service: the entry point for every order operation.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use common::{Money, OrderId, OrderStatus, Role};
use serde::{Deserialize, Serialize};
use store::{
    Order, OrderQuery, OrderStats, OrderStore, OrderView, StatusChange, Transaction, User,
};

use super::intake::{self, PlaceOrder};
use super::numbering::{OrderNumberGenerator, TimestampOrderNumbers};
use super::reservation;
use super::transitions;
use super::writer::{self, NewOrder};
use crate::actor::Actor;
use crate::error::OrderError;
use crate::notifier::{NoopNotifier, OrderNotifier};

/// Result of a successful order placement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacedOrder {
    pub order_id: OrderId,
    pub order_number: String,
    pub total_amount: Money,
}

/// Filter for listing orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    /// One-based page number.
    pub page: u32,
    pub limit: u32,
}

impl OrderFilter {
    pub const MAX_LIMIT: u32 = 100;

    fn to_query(self, actor: &Actor) -> OrderQuery {
        let limit = self.limit.clamp(1, Self::MAX_LIMIT) as usize;
        let offset = (self.page.max(1) as usize - 1) * limit;
        let query = OrderQuery::new(actor.tenant_id, actor.order_scope()).page(limit, offset);
        match self.status {
            Some(status) => query.status(status),
            None => query,
        }
    }
}

impl Default for OrderFilter {
    fn default() -> Self {
        Self {
            status: None,
            page: 1,
            limit: 20,
        }
    }
}

/// Service for placing orders and moving them through their lifecycle.
///
/// Placement runs validation, reservation and persistence inside a single
/// store transaction. Notifications are handed to the notifier only after
/// the transaction commits.
pub struct OrderService<S: OrderStore> {
    store: S,
    notifier: Arc<dyn OrderNotifier>,
    order_numbers: Arc<dyn OrderNumberGenerator>,
    delivery_charge: Money,
}

impl<S: OrderStore> OrderService<S> {
    /// Creates a new order service with the given store.
    pub fn new(store: S) -> Self {
        Self {
            store,
            notifier: Arc::new(NoopNotifier),
            order_numbers: Arc::new(TimestampOrderNumbers::new()),
            delivery_charge: Money::zero(),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn OrderNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_order_numbers(mut self, order_numbers: Arc<dyn OrderNumberGenerator>) -> Self {
        self.order_numbers = order_numbers;
        self
    }

    /// Flat delivery charge added to every new order.
    pub fn with_delivery_charge(mut self, delivery_charge: Money) -> Self {
        self.delivery_charge = delivery_charge;
        self
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Places an order for the acting customer.
    ///
    /// Either the order, all of its lines and every stock decrement are
    /// committed, or none of them are.
    #[tracing::instrument(skip(self, request), fields(tenant_id = %actor.tenant_id, lines = request.lines.len()))]
    pub async fn create_order(
        &self,
        actor: &Actor,
        request: PlaceOrder,
    ) -> Result<PlacedOrder, OrderError> {
        if actor.role != Role::Customer {
            return Err(OrderError::Forbidden(
                "Only customers can place orders".to_string(),
            ));
        }
        request.validate()?;

        let started = Instant::now();
        let result = self.place(actor, &request).await;
        metrics::histogram!("order_creation_duration_seconds")
            .record(started.elapsed().as_secs_f64());

        let order = match result {
            Ok(order) => order,
            Err(e) => {
                metrics::counter!("order_creation_failures_total", "kind" => e.kind().as_str())
                    .increment(1);
                tracing::info!(error = %e, "order rejected");
                return Err(e);
            }
        };

        metrics::counter!("orders_created_total").increment(1);
        tracing::info!(
            order_id = %order.id,
            order_number = %order.order_number,
            total = %order.total_amount,
            "order created"
        );

        let placed = PlacedOrder {
            order_id: order.id,
            order_number: order.order_number.clone(),
            total_amount: order.total_amount,
        };
        if let Some(customer) = self.lookup_customer(&order).await {
            self.notifier.order_placed(order, customer);
        }
        Ok(placed)
    }

    async fn place(&self, actor: &Actor, request: &PlaceOrder) -> Result<Order, OrderError> {
        let mut tx = self.store.begin().await?;

        match self.run_placement(tx.as_mut(), actor, request).await {
            Ok(order) => {
                tx.commit().await?;
                Ok(order)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(error = %rollback_err, "rollback failed");
                }
                Err(e)
            }
        }
    }

    async fn run_placement(
        &self,
        tx: &mut dyn Transaction,
        actor: &Actor,
        request: &PlaceOrder,
    ) -> Result<Order, OrderError> {
        let cart = intake::validate_lines(tx, actor.tenant_id, &request.lines).await?;
        reservation::reserve_lines(tx, actor.tenant_id, &cart.lines).await?;

        let order = writer::build_order(
            NewOrder {
                tenant_id: actor.tenant_id,
                customer_id: actor.user_id,
                order_number: self.order_numbers.next(actor.tenant_id),
                delivery_charge: self.delivery_charge,
                created_at: Utc::now(),
            },
            request,
            cart,
        )?;
        writer::write_order(tx, &order).await?;
        Ok(order)
    }

    /// Moves an order to the requested status.
    ///
    /// The update only applies if the order is still in the status it was
    /// read in; otherwise nothing changes and `StatusChanged` is returned.
    #[tracing::instrument(skip(self), fields(tenant_id = %actor.tenant_id, role = %actor.role))]
    pub async fn update_status(
        &self,
        actor: &Actor,
        order_id: OrderId,
        requested: &str,
    ) -> Result<Order, OrderError> {
        let to = transitions::parse_status(requested)?;
        let order = self
            .store
            .get_order(actor.tenant_id, order_id)
            .await?
            .ok_or_else(OrderError::order_not_found)?;

        // Customers get Forbidden on foreign orders from the role table;
        // delivery agents never learn about orders outside their scope.
        if actor.role == Role::Delivery && !actor.order_scope().admits(&order) {
            return Err(OrderError::order_not_found());
        }

        let transition = transitions::plan(actor, &order, to)?;
        let now = Utc::now();
        let change = StatusChange {
            tenant_id: actor.tenant_id,
            order_id,
            expected: transition.from,
            new_status: transition.to,
            delivery_agent_id: transition.bind_agent,
            delivered_at: transition.stamp_delivered.then_some(now),
            updated_at: now,
        };

        let updated = self
            .store
            .apply_status_change(&change)
            .await?
            .ok_or(OrderError::StatusChanged { order_id })?;

        metrics::counter!("order_status_transitions_total", "status" => to.as_str())
            .increment(1);
        tracing::info!(
            order_number = %updated.order_number,
            from = %transition.from,
            to = %transition.to,
            "order status updated"
        );

        if let Some(customer) = self.lookup_customer(&updated).await {
            self.notifier.status_changed(updated.clone(), customer, to);
        }
        Ok(updated)
    }

    /// Loads an order visible to the actor.
    #[tracing::instrument(skip(self), fields(tenant_id = %actor.tenant_id))]
    pub async fn get_order(
        &self,
        actor: &Actor,
        order_id: OrderId,
    ) -> Result<OrderView, OrderError> {
        let order = self
            .store
            .get_order(actor.tenant_id, order_id)
            .await?
            .filter(|order| actor.order_scope().admits(order))
            .ok_or_else(OrderError::order_not_found)?;
        let mut views = self.with_names(actor, vec![order]).await?;
        views.pop().ok_or_else(OrderError::order_not_found)
    }

    /// Lists the orders visible to the actor, newest first.
    #[tracing::instrument(skip(self), fields(tenant_id = %actor.tenant_id))]
    pub async fn list_orders(
        &self,
        actor: &Actor,
        filter: OrderFilter,
    ) -> Result<Vec<OrderView>, OrderError> {
        let orders = self.store.list_orders(&filter.to_query(actor)).await?;
        self.with_names(actor, orders).await
    }

    /// Dashboard counters for the actor's tenant. Staff and admins only.
    #[tracing::instrument(skip(self), fields(tenant_id = %actor.tenant_id))]
    pub async fn order_stats(&self, actor: &Actor) -> Result<OrderStats, OrderError> {
        if !actor.role.is_privileged() {
            return Err(OrderError::Forbidden(
                "Only staff can view order statistics".to_string(),
            ));
        }
        Ok(self.store.order_stats(actor.tenant_id).await?)
    }

    /// Attaches customer and delivery agent names with one lookup per batch.
    async fn with_names(
        &self,
        actor: &Actor,
        orders: Vec<Order>,
    ) -> Result<Vec<OrderView>, OrderError> {
        let mut ids: Vec<_> = orders
            .iter()
            .flat_map(|o| std::iter::once(o.customer_id).chain(o.delivery_agent_id))
            .collect();
        ids.sort_unstable();
        ids.dedup();

        let names = if ids.is_empty() {
            Default::default()
        } else {
            self.store.user_names(actor.tenant_id, &ids).await?
        };
        Ok(orders
            .into_iter()
            .map(|order| OrderView::new(order, &names))
            .collect())
    }

    /// Owner of an order, for notifications. Failures are logged and skipped.
    async fn lookup_customer(&self, order: &Order) -> Option<User> {
        match self.store.get_user(order.tenant_id, order.customer_id).await {
            Ok(Some(user)) => Some(user),
            Ok(None) => {
                tracing::warn!(customer_id = %order.customer_id, "order owner not found, skipping notification");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to load order owner, skipping notification");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{TenantId, UserId};

    #[test]
    fn filter_pages_are_one_based_and_clamped() {
        let actor = Actor::new(TenantId::new(), UserId::new(), Role::Admin);

        let q = OrderFilter::default().to_query(&actor);
        assert_eq!((q.limit, q.offset), (20, 0));

        let q = OrderFilter {
            status: Some(OrderStatus::Pending),
            page: 3,
            limit: 10,
        }
        .to_query(&actor);
        assert_eq!((q.limit, q.offset), (10, 20));
        assert_eq!(q.status, Some(OrderStatus::Pending));

        let q = OrderFilter {
            status: None,
            page: 0,
            limit: 10_000,
        }
        .to_query(&actor);
        assert_eq!((q.limit, q.offset), (100, 0));
    }
}
