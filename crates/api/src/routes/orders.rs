//! Order endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::{OrderId, OrderStatus};
use domain::{OrderFilter, PlaceOrder, PlacedOrder};
use serde::{Deserialize, Serialize};
use store::{NotificationLog, Order, OrderStats, OrderStore, OrderView};

use crate::auth::Identity;
use crate::error::ApiError;
use crate::routes::parse_id;
use crate::state::AppState;

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct ListOrdersParams {
    pub status: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

// -- Response types --

#[derive(Debug, Serialize)]
pub struct OrderListResponse {
    pub orders: Vec<OrderView>,
    pub page: u32,
    pub limit: u32,
}

// -- Handlers --

/// POST /orders: place an order for the calling customer.
#[tracing::instrument(skip(state, identity, payload))]
pub async fn create<S: OrderStore + NotificationLog + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    payload: Result<Json<PlaceOrder>, JsonRejection>,
) -> Result<(StatusCode, Json<PlacedOrder>), ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let placed = state.order_service.create_order(&identity.0, request).await?;
    Ok((StatusCode::CREATED, Json(placed)))
}

/// GET /orders: list orders visible to the caller, newest first.
#[tracing::instrument(skip(state, identity))]
pub async fn list<S: OrderStore + NotificationLog + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Query(params): Query<ListOrdersParams>,
) -> Result<Json<OrderListResponse>, ApiError> {
    let status = params
        .status
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(str::parse::<OrderStatus>)
        .transpose()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let defaults = OrderFilter::default();
    let filter = OrderFilter {
        status,
        page: params.page.unwrap_or(defaults.page).max(1),
        limit: params
            .limit
            .unwrap_or(defaults.limit)
            .clamp(1, OrderFilter::MAX_LIMIT),
    };

    let orders = state.order_service.list_orders(&identity.0, filter).await?;
    Ok(Json(OrderListResponse {
        orders,
        page: filter.page,
        limit: filter.limit,
    }))
}

/// GET /orders/stats: dashboard counters for the caller's tenant.
#[tracing::instrument(skip(state, identity))]
pub async fn stats<S: OrderStore + NotificationLog + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
) -> Result<Json<OrderStats>, ApiError> {
    Ok(Json(state.order_service.order_stats(&identity.0).await?))
}

/// GET /orders/{id}: load one order with its lines.
#[tracing::instrument(skip(state, identity))]
pub async fn get<S: OrderStore + NotificationLog + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Path(id): Path<String>,
) -> Result<Json<OrderView>, ApiError> {
    let order_id: OrderId = parse_id(&id)?;
    Ok(Json(state.order_service.get_order(&identity.0, order_id).await?))
}

/// PATCH /orders/{id}/status: move an order to a new status.
#[tracing::instrument(skip(state, identity, payload))]
pub async fn update_status<S: OrderStore + NotificationLog + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Path(id): Path<String>,
    payload: Result<Json<UpdateStatusRequest>, JsonRejection>,
) -> Result<Json<Order>, ApiError> {
    let order_id: OrderId = parse_id(&id)?;
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let order = state
        .order_service
        .update_status(&identity.0, order_id, &request.status)
        .await?;
    Ok(Json(order))
}
