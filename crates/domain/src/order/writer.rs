//! Order header and line persistence.

use chrono::{DateTime, Utc};
use common::{Money, OrderId, OrderStatus, PaymentStatus, TenantId, UserId};
use store::{Order, OrderLine, Transaction};

use super::intake::{PlaceOrder, ValidatedCart};
use crate::error::OrderError;

/// Everything needed to build a new order row besides the request itself.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub tenant_id: TenantId,
    pub customer_id: UserId,
    pub order_number: String,
    pub delivery_charge: Money,
    pub created_at: DateTime<Utc>,
}

/// Builds the order header and lines.
///
/// The total is fixed here as the cart subtotal plus the delivery charge.
/// Payment is `paid` exactly when a payment id was supplied.
pub fn build_order(
    new: NewOrder,
    request: &PlaceOrder,
    cart: ValidatedCart,
) -> Result<Order, OrderError> {
    let total_amount = cart.subtotal.checked_add(new.delivery_charge)?;
    let payment_id = request
        .payment_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string);
    let notes = request
        .notes
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string);

    Ok(Order {
        id: OrderId::new(),
        tenant_id: new.tenant_id,
        order_number: new.order_number,
        customer_id: new.customer_id,
        status: OrderStatus::Pending,
        payment_status: PaymentStatus::from_payment_id(payment_id.as_deref()),
        payment_method: request.payment_method.trim().to_string(),
        payment_id,
        total_amount,
        delivery_charge: new.delivery_charge,
        delivery_address: request.delivery_address.trim().to_string(),
        notes,
        delivery_agent_id: None,
        created_at: new.created_at,
        updated_at: new.created_at,
        delivered_at: None,
        lines: cart
            .lines
            .into_iter()
            .map(|line| OrderLine {
                product_id: line.product_id,
                product_name: line.product_name,
                quantity: line.quantity,
                unit_price: line.unit_price,
                subtotal: line.subtotal,
            })
            .collect(),
    })
}

/// Writes the header and every line through the open transaction.
pub async fn write_order(tx: &mut dyn Transaction, order: &Order) -> Result<(), OrderError> {
    tx.insert_order(order).await?;
    Ok(())
}
