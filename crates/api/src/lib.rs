//! HTTP API for the storefront order pipeline.
//!
//! Provides REST endpoints for placing and tracking orders and for
//! administering notifications, with structured logging (tracing) and
//! Prometheus metrics.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::middleware;
use axum::routing::{delete, get, patch, post};
use domain::OrderService;
use metrics_exporter_prometheus::PrometheusHandle;
use notifications::{
    DispatchQueue, Dispatcher, EmailRelayChannel, NotificationChannel, TwilioChannel,
};
use store::{NotificationLog, OrderStore};
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use state::AppState;

/// Creates the Axum application router with all routes and shared state.
///
/// `expose_error_details` is fixed for the lifetime of the router.
pub fn create_app<S: OrderStore + NotificationLog + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
    expose_error_details: bool,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route(
            "/orders",
            post(routes::orders::create::<S>).get(routes::orders::list::<S>),
        )
        .route("/orders/stats", get(routes::orders::stats::<S>))
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route(
            "/orders/{id}/status",
            patch(routes::orders::update_status::<S>),
        )
        .route(
            "/notifications/logs",
            get(routes::notifications::list_logs::<S>),
        )
        .route(
            "/notifications/logs/old",
            delete(routes::notifications::prune_logs::<S>),
        )
        .route(
            "/notifications/logs/{id}",
            get(routes::notifications::get_log::<S>),
        )
        .route(
            "/notifications/welcome/{user_id}",
            post(routes::notifications::send_welcome::<S>),
        )
        .route(
            "/notifications/resend/{id}",
            post(routes::notifications::resend::<S>),
        )
        .route(
            "/notifications/user/{user_id}",
            get(routes::notifications::user_history::<S>),
        )
        .route(
            "/notifications/stats",
            get(routes::notifications::stats::<S>),
        )
        .route(
            "/notifications/test",
            post(routes::notifications::send_test::<S>),
        )
        .route(
            "/notifications/settings",
            get(routes::notifications::settings::<S>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(middleware::map_response_with_state(
            expose_error_details,
            error::expose_error_details,
        ))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Builds the provider-backed channels whose credentials are configured.
pub fn configured_channels(
    config: &Config,
    http: &reqwest::Client,
) -> Vec<Arc<dyn NotificationChannel>> {
    let mut channels: Vec<Arc<dyn NotificationChannel>> = Vec::new();
    if let Some(relay) = config.email_relay() {
        channels.push(Arc::new(EmailRelayChannel::new(http.clone(), relay)));
    }
    if let Some(twilio) = config.twilio_sms() {
        channels.push(Arc::new(TwilioChannel::sms(http.clone(), twilio)));
    }
    if let Some(twilio) = config.twilio_whatsapp() {
        channels.push(Arc::new(TwilioChannel::whatsapp(http.clone(), twilio)));
    }
    for kind in notifications::ChannelKind::ALL {
        if !channels.iter().any(|c| c.kind() == kind) {
            tracing::info!(channel = %kind, "notification channel not configured");
        }
    }
    channels
}

/// Creates the application state and starts the notification queue.
///
/// The returned handle completes once the state (and with it every queue
/// producer) has been dropped and in-flight notifications have finished.
pub fn create_default_state<S: OrderStore + NotificationLog + Clone + 'static>(
    store: S,
    config: &Config,
    channels: Vec<Arc<dyn NotificationChannel>>,
) -> (Arc<AppState<S>>, JoinHandle<()>) {
    let dispatcher = channels.into_iter().fold(
        Dispatcher::new(store.clone(), config.dispatcher_config()),
        Dispatcher::with_channel,
    );
    let dispatcher = Arc::new(dispatcher);

    let (queue, consumer) = DispatchQueue::start(
        dispatcher.clone(),
        config.notify_queue_capacity,
        config.notify_workers,
    );
    let order_service = OrderService::new(store.clone()).with_notifier(Arc::new(queue));

    let state = Arc::new(AppState {
        order_service,
        dispatcher,
        store,
    });
    (state, consumer)
}
