//! HTTP API server with observability for the stock reservation service.
//!
//! Provides REST endpoints for the item catalog, reservations and direct
//! stock deductions, with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use keyspace::KeyValueStore;
use ledger::InventoryStore;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::{AppState, Backends};

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<L, K>(state: Arc<AppState<L, K>>, metrics_handle: PrometheusHandle) -> Router
where
    L: InventoryStore + 'static,
    K: KeyValueStore + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check::<L, K>))
        .route(
            "/items",
            get(routes::items::list::<L, K>).post(routes::items::create::<L, K>),
        )
        .route("/items/search", get(routes::items::search::<L, K>))
        .route(
            "/items/{id}",
            get(routes::items::get::<L, K>)
                .put(routes::items::update::<L, K>)
                .delete(routes::items::delete::<L, K>),
        )
        .route(
            "/items/{id}/availability",
            get(routes::items::availability::<L, K>),
        )
        .route("/reservations", post(routes::reservations::reserve::<L, K>))
        .route(
            "/reservations/confirm",
            post(routes::reservations::confirm::<L, K>),
        )
        .route(
            "/reservations/cancel",
            post(routes::reservations::cancel::<L, K>),
        )
        .route(
            "/reservations/{group_id}",
            get(routes::reservations::for_group::<L, K>),
        )
        .route("/stock/deduct", post(routes::stock::deduct::<L, K>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
