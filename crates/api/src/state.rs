//! Shared application state.

use std::sync::Arc;

use domain::OrderService;
use notifications::Dispatcher;
use store::{NotificationLog, OrderStore};

/// Shared application state accessible from all handlers.
pub struct AppState<S: OrderStore + NotificationLog> {
    pub order_service: OrderService<S>,
    /// Inline dispatcher for welcome messages and the settings view.
    pub dispatcher: Arc<Dispatcher<S>>,
    pub store: S,
}
