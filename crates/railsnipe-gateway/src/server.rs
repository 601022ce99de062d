// SPDX-FileCopyrightText: 2026 Railsnipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Sets up routes, middleware, and shared state for the gateway.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};
use railsnipe_config::model::GatewayConfig;
use railsnipe_core::RailsnipeError;
use railsnipe_engine::{BookingDesk, TaskSupervisor};
use tokio_util::sync::CancellationToken;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::{AuthConfig, auth_middleware};
use crate::handlers;
use crate::ws;

/// Upper bound on requests handled at once by the authenticated API.
const MAX_CONCURRENT_REQUESTS: usize = 256;

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub supervisor: Arc<TaskSupervisor>,
    pub desk: Arc<BookingDesk>,
    /// Authentication configuration.
    pub auth: AuthConfig,
    /// Interval between server pings on live channels.
    pub heartbeat: Duration,
    /// Cancelled when the process starts shutting down.
    pub shutdown: CancellationToken,
    /// Process start time for uptime calculation.
    pub start_time: Instant,
}

impl GatewayState {
    pub fn new(
        config: &GatewayConfig,
        supervisor: Arc<TaskSupervisor>,
        desk: Arc<BookingDesk>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            supervisor,
            desk,
            auth: AuthConfig {
                bearer_token: config.bearer_token.clone(),
            },
            heartbeat: Duration::from_secs(config.heartbeat_secs.max(1)),
            shutdown,
            start_time: Instant::now(),
        }
    }
}

/// Builds the gateway router.
///
/// - GET /health (public)
/// - POST /v1/tasks, GET /v1/tasks/{id}, POST /v1/tasks/{id}/cancel
/// - GET /v1/tasks/{id}/live (WebSocket)
/// - GET /v1/bookings/{provider}/{user}
/// - POST /v1/bookings/{provider}/{user}/{ref}/cancel and .../pay
pub fn router(state: GatewayState) -> Router {
    let auth_state = state.auth.clone();

    let public_routes = Router::new()
        .route("/health", get(handlers::get_health))
        .with_state(state.clone());

    let api_routes = Router::new()
        .route("/v1/tasks", post(handlers::post_task))
        .route("/v1/tasks/{id}", get(handlers::get_task))
        .route("/v1/tasks/{id}/cancel", post(handlers::cancel_task))
        .route("/v1/tasks/{id}/live", get(ws::live_handler))
        .route("/v1/bookings/{provider}/{user}", get(handlers::list_bookings))
        .route(
            "/v1/bookings/{provider}/{user}/{record_ref}/cancel",
            post(handlers::cancel_booking),
        )
        .route(
            "/v1/bookings/{provider}/{user}/{record_ref}/pay",
            post(handlers::pay_booking),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            auth_state,
            auth_middleware,
        ))
        .layer(ConcurrencyLimitLayer::new(MAX_CONCURRENT_REQUESTS))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Serves the gateway until `state.shutdown` is cancelled.
pub async fn start_server(config: &GatewayConfig, state: GatewayState) -> Result<(), RailsnipeError> {
    let shutdown = state.shutdown.clone();
    let app = router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| RailsnipeError::Config(format!("failed to bind gateway to {addr}: {e}")))?;

    tracing::info!("gateway listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| RailsnipeError::Internal(format!("gateway server error: {e}")))?;

    tracing::info!("gateway stopped");
    Ok(())
}
