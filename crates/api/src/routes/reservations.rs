//! Reservation endpoints: reserve, confirm, cancel and lookup by group.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{GroupId, ReservationId};
use keyspace::KeyValueStore;
use ledger::{InventoryStore, Reservation};
use reservation::{ReservationOutcome, ReserveRequest};
use serde::{Deserialize, Serialize};

use super::{LineRequest, parse_id, parse_lines};
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ReserveItemsRequest {
    pub group_id: String,
    pub items: Vec<LineRequest>,
}

#[derive(Deserialize)]
pub struct ConfirmRequest {
    pub group_id: String,
}

/// Exactly one of the two ids must be present.
#[derive(Deserialize)]
pub struct CancelRequest {
    pub group_id: Option<String>,
    pub reservation_id: Option<String>,
}

#[derive(Serialize)]
pub struct SettlementResponse {
    pub reservations: Vec<Reservation>,
    pub message: String,
}

/// POST /reservations: reserve every item for the group, all or nothing.
///
/// Repeating the request with the same `group_id` returns the stored result.
#[tracing::instrument(skip_all)]
pub async fn reserve<L: InventoryStore + 'static, K: KeyValueStore + 'static>(
    State(state): State<Arc<AppState<L, K>>>,
    payload: Result<Json<ReserveItemsRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ReservationOutcome>), ApiError> {
    let Json(req) = payload?;
    let group_id: GroupId = parse_id(&req.group_id, "group_id")?;
    let request = ReserveRequest::new(group_id, parse_lines(&req.items)?)?;

    let outcome = state.coordinator.reserve_items(request).await?;

    Ok((StatusCode::CREATED, Json(outcome)))
}

/// GET /reservations/{group_id}
pub async fn for_group<L: InventoryStore + 'static, K: KeyValueStore + 'static>(
    State(state): State<Arc<AppState<L, K>>>,
    Path(group_id): Path<String>,
) -> Result<Json<Vec<Reservation>>, ApiError> {
    let group_id: GroupId = parse_id(&group_id, "group_id")?;
    let reservations = state.coordinator.reservations_for_group(group_id).await?;
    Ok(Json(reservations))
}

/// POST /reservations/confirm: settle the group's pending reservations.
#[tracing::instrument(skip_all)]
pub async fn confirm<L: InventoryStore + 'static, K: KeyValueStore + 'static>(
    State(state): State<Arc<AppState<L, K>>>,
    payload: Result<Json<ConfirmRequest>, JsonRejection>,
) -> Result<Json<SettlementResponse>, ApiError> {
    let Json(req) = payload?;
    let group_id: GroupId = parse_id(&req.group_id, "group_id")?;

    let confirmed = state
        .coordinator
        .confirm_reservation_group(group_id)
        .await?;

    Ok(Json(SettlementResponse {
        message: format!("{} reservations confirmed", confirmed.len()),
        reservations: confirmed,
    }))
}

/// POST /reservations/cancel: release a group or a single reservation.
#[tracing::instrument(skip_all)]
pub async fn cancel<L: InventoryStore + 'static, K: KeyValueStore + 'static>(
    State(state): State<Arc<AppState<L, K>>>,
    payload: Result<Json<CancelRequest>, JsonRejection>,
) -> Result<Json<SettlementResponse>, ApiError> {
    let Json(req) = payload?;

    let cancelled = match (req.group_id.as_deref(), req.reservation_id.as_deref()) {
        (Some(group_id), None) => {
            let group_id: GroupId = parse_id(group_id, "group_id")?;
            state.coordinator.cancel_reservation_group(group_id).await?
        }
        (None, Some(reservation_id)) => {
            let reservation_id: ReservationId = parse_id(reservation_id, "reservation_id")?;
            state.coordinator.cancel_reservation(reservation_id).await?
        }
        _ => {
            return Err(ApiError::BadRequest(
                "exactly one of group_id or reservation_id is required".to_string(),
            ));
        }
    };

    Ok(Json(SettlementResponse {
        message: format!("{} reservations cancelled", cancelled.len()),
        reservations: cancelled,
    }))
}
