//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use keyspace::KeyValueStore;
use ledger::InventoryStore;
use serde::Serialize;

use crate::state::{AppState, Backends};

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub backends: Backends,
}

/// GET /health: liveness plus the backends in use.
pub async fn check<L: InventoryStore + 'static, K: KeyValueStore + 'static>(
    State(state): State<Arc<AppState<L, K>>>,
) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        backends: state.backends,
    })
}
