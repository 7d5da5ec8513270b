//! Direct stock withdrawal without a prior reservation.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use keyspace::KeyValueStore;
use ledger::InventoryStore;
use reservation::ReservationError;
use serde::Deserialize;

use super::items::ItemResponse;
use super::{LineRequest, parse_lines};
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct DeductRequest {
    pub items: Vec<LineRequest>,
}

/// POST /stock/deduct: lines are applied in order; a failing line stops
/// the request and earlier lines stay applied.
#[tracing::instrument(skip_all)]
pub async fn deduct<L: InventoryStore + 'static, K: KeyValueStore + 'static>(
    State(state): State<Arc<AppState<L, K>>>,
    payload: Result<Json<DeductRequest>, JsonRejection>,
) -> Result<Json<Vec<ItemResponse>>, ApiError> {
    let Json(req) = payload?;
    let lines = parse_lines(&req.items)?;
    if lines.is_empty() {
        let err = ReservationError::InvalidInput("at least one item is required".to_string());
        return Err(err.into());
    }

    let items = state.coordinator.deduct_stock(&lines).await?;

    Ok(Json(items.into_iter().map(ItemResponse::from).collect()))
}
