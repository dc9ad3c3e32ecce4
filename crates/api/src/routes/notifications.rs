//! Notification log and dispatch endpoints. Admins only, except that users
//! may read their own notification history.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use chrono::Utc;
use common::{NotificationId, Role, UserId};
use notifications::{ChannelKind, ChannelSettings, DispatchReport, Notification};
use serde::{Deserialize, Serialize};
use store::{
    LogQuery, NotificationKind, NotificationLog, NotificationRecord, NotificationStats,
    OrderStore, User,
};

use crate::auth::Identity;
use crate::error::ApiError;
use crate::routes::parse_id;
use crate::state::AppState;

const DEFAULT_LOG_LIMIT: u32 = 50;
const MAX_LOG_LIMIT: u32 = 200;
const DEFAULT_HISTORY_LIMIT: u32 = 20;
const DEFAULT_RETENTION_DAYS: u32 = 90;
const RECENT_ACTIVITY_DAYS: i64 = 7;

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct ListLogsParams {
    pub kind: Option<String>,
    pub user_id: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct PageParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct TestNotificationRequest {
    /// `welcome`, `test_email`, `test_sms` or `test_whatsapp`.
    #[serde(rename = "type")]
    pub kind: String,
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct PruneParams {
    pub days: Option<u32>,
}

// -- Response types --

#[derive(Debug, Serialize)]
pub struct LogListResponse {
    pub logs: Vec<NotificationRecord>,
    pub page: u32,
    pub limit: u32,
    /// Matching records across all pages.
    pub total: u64,
}

#[derive(Debug, Serialize)]
pub struct TestNotificationResponse {
    #[serde(rename = "type")]
    pub kind: String,
    pub result: DispatchReport,
}

#[derive(Debug, Serialize)]
pub struct PruneResponse {
    pub deleted: u64,
    pub days: u32,
}

// -- Handlers --

/// GET /notifications/logs: list log records, newest first.
#[tracing::instrument(skip(state, identity))]
pub async fn list_logs<S: OrderStore + NotificationLog + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Query(params): Query<ListLogsParams>,
) -> Result<Json<LogListResponse>, ApiError> {
    let actor = identity.require_admin()?;

    let page = params.page.unwrap_or(1).max(1);
    let limit = params.limit.unwrap_or(DEFAULT_LOG_LIMIT).clamp(1, MAX_LOG_LIMIT);
    let mut query = LogQuery::new(actor.tenant_id).page(
        limit as usize,
        (page as usize - 1) * limit as usize,
    );
    if let Some(kind) = params.kind.as_deref().filter(|k| !k.is_empty()) {
        let kind: NotificationKind = kind
            .to_ascii_uppercase()
            .parse()
            .map_err(|_| ApiError::BadRequest(format!("Unknown notification type {kind}")))?;
        query = query.kind(kind);
    }
    if let Some(user_id) = params.user_id.as_deref().filter(|u| !u.is_empty()) {
        query = query.user(parse_id::<UserId>(user_id)?);
    }

    let logs = state.store.list(&query).await?;
    let total = state.store.count(&query).await?;
    Ok(Json(LogListResponse {
        logs,
        page,
        limit,
        total,
    }))
}

/// GET /notifications/user/{user_id}: one user's history, newest first.
#[tracing::instrument(skip(state, identity))]
pub async fn user_history<S: OrderStore + NotificationLog + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Path(user_id): Path<String>,
    Query(params): Query<PageParams>,
) -> Result<Json<LogListResponse>, ApiError> {
    let actor = &identity.0;
    let user_id: UserId = parse_id(&user_id)?;
    if user_id != actor.user_id && actor.role != Role::Admin {
        return Err(ApiError::Forbidden(
            "You can only view your own notifications".to_string(),
        ));
    }

    let page = params.page.unwrap_or(1).max(1);
    let limit = params
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_LOG_LIMIT);
    let query = LogQuery::new(actor.tenant_id)
        .user(user_id)
        .page(limit as usize, (page as usize - 1) * limit as usize);

    let logs = state.store.list(&query).await?;
    let total = state.store.count(&query).await?;
    Ok(Json(LogListResponse {
        logs,
        page,
        limit,
        total,
    }))
}

/// GET /notifications/stats: counts by type, daily activity and top recipients.
#[tracing::instrument(skip(state, identity))]
pub async fn stats<S: OrderStore + NotificationLog + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
) -> Result<Json<NotificationStats>, ApiError> {
    let actor = identity.require_admin()?;
    let since = Utc::now() - chrono::Duration::days(RECENT_ACTIVITY_DAYS);
    Ok(Json(state.store.stats(actor.tenant_id, since).await?))
}

/// POST /notifications/test: send a welcome or a single-channel test message.
///
/// Welcome messages go through the normal dispatch and are logged; channel
/// tests are not.
#[tracing::instrument(skip(state, identity, payload))]
pub async fn send_test<S: OrderStore + NotificationLog + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    payload: Result<Json<TestNotificationRequest>, JsonRejection>,
) -> Result<Json<TestNotificationResponse>, ApiError> {
    let actor = identity.require_admin()?;
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let channel = match request.kind.as_str() {
        "welcome" => None,
        "test_email" => Some(ChannelKind::Email),
        "test_sms" => Some(ChannelKind::Sms),
        "test_whatsapp" => Some(ChannelKind::WhatsApp),
        other => {
            return Err(ApiError::BadRequest(format!(
                "Invalid notification type {other}. Valid types: welcome, test_email, test_sms, test_whatsapp"
            )));
        }
    };
    let user = load_user(&state, actor.tenant_id, parse_id(&request.user_id)?).await?;

    let result = match channel {
        None => state.dispatcher.dispatch(&Notification::Welcome { user }).await,
        Some(kind) => state.dispatcher.send_test(kind, &user).await,
    };
    Ok(Json(TestNotificationResponse {
        kind: request.kind,
        result,
    }))
}

/// GET /notifications/logs/{id}: load one log record.
#[tracing::instrument(skip(state, identity))]
pub async fn get_log<S: OrderStore + NotificationLog + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Path(id): Path<String>,
) -> Result<Json<NotificationRecord>, ApiError> {
    let actor = identity.require_admin()?;
    let log_id: NotificationId = parse_id(&id)?;

    let record = state
        .store
        .get(actor.tenant_id, log_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Notification {id} not found")))?;
    Ok(Json(record))
}

/// POST /notifications/welcome/{user_id}: send a welcome message now.
#[tracing::instrument(skip(state, identity))]
pub async fn send_welcome<S: OrderStore + NotificationLog + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Path(user_id): Path<String>,
) -> Result<Json<DispatchReport>, ApiError> {
    let actor = identity.require_admin()?;
    let user = load_user(&state, actor.tenant_id, parse_id(&user_id)?).await?;

    let report = state.dispatcher.dispatch(&Notification::Welcome { user }).await;
    Ok(Json(report))
}

/// POST /notifications/resend/{id}: dispatch a logged welcome message again.
#[tracing::instrument(skip(state, identity))]
pub async fn resend<S: OrderStore + NotificationLog + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Path(id): Path<String>,
) -> Result<Json<DispatchReport>, ApiError> {
    let actor = identity.require_admin()?;
    let log_id: NotificationId = parse_id(&id)?;

    let record = state
        .store
        .get(actor.tenant_id, log_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Notification {id} not found")))?;
    if record.kind != NotificationKind::Welcome {
        return Err(ApiError::BadRequest(format!(
            "Resend is only supported for {} notifications",
            NotificationKind::Welcome
        )));
    }

    let user = load_user(&state, actor.tenant_id, record.user_id).await?;
    let report = state.dispatcher.dispatch(&Notification::Welcome { user }).await;
    Ok(Json(report))
}

/// DELETE /notifications/logs/old: prune records older than `days`.
#[tracing::instrument(skip(state, identity))]
pub async fn prune_logs<S: OrderStore + NotificationLog + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Query(params): Query<PruneParams>,
) -> Result<Json<PruneResponse>, ApiError> {
    let actor = identity.require_admin()?;
    let days = params.days.unwrap_or(DEFAULT_RETENTION_DAYS);

    let cutoff = Utc::now()
        .checked_sub_signed(chrono::Duration::days(i64::from(days)))
        .ok_or_else(|| ApiError::BadRequest(format!("Retention of {days} days is out of range")))?;
    let deleted = state.store.prune_older_than(actor.tenant_id, cutoff).await?;
    tracing::info!(deleted, days, "pruned notification logs");
    Ok(Json(PruneResponse { deleted, days }))
}

/// GET /notifications/settings: which channels are enabled and configured.
#[tracing::instrument(skip(state, identity))]
pub async fn settings<S: OrderStore + NotificationLog + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
) -> Result<Json<ChannelSettings>, ApiError> {
    identity.require_admin()?;
    Ok(Json(state.dispatcher.settings()))
}

async fn load_user<S: OrderStore + NotificationLog + Clone + 'static>(
    state: &AppState<S>,
    tenant_id: common::TenantId,
    user_id: UserId,
) -> Result<User, ApiError> {
    state
        .store
        .get_user(tenant_id, user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("User {user_id} not found")))
}
