//! Item catalog and availability endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::ItemId;
use keyspace::KeyValueStore;
use ledger::{InventoryStore, Item, ItemUpdate, NewItem};
use serde::{Deserialize, Serialize};

use super::parse_id;
use crate::error::ApiError;
use crate::state::AppState;

// -- Request types --

#[derive(Deserialize)]
pub struct CreateItemRequest {
    pub code: String,
    pub description: String,
    pub balance: i64,
}

#[derive(Deserialize)]
pub struct UpdateItemRequest {
    pub description: Option<String>,
    pub balance: Option<i64>,
}

#[derive(Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
}

#[derive(Deserialize)]
pub struct AvailabilityParams {
    pub quantity: i64,
}

// -- Response types --

#[derive(Serialize)]
pub struct ItemResponse {
    pub id: ItemId,
    pub code: String,
    pub description: String,
    pub balance: i64,
    pub reserved: i64,
    pub available: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Item> for ItemResponse {
    fn from(item: Item) -> Self {
        Self {
            available: item.available(),
            id: item.id,
            code: item.code,
            description: item.description,
            balance: item.balance,
            reserved: item.reserved,
            created_at: item.created_at,
            updated_at: item.updated_at,
        }
    }
}

#[derive(Serialize)]
pub struct AvailabilityResponse {
    pub item_id: ItemId,
    pub quantity: i64,
    pub available: bool,
}

// -- Handlers --

/// POST /items: create an item with nothing reserved.
#[tracing::instrument(skip_all)]
pub async fn create<L: InventoryStore + 'static, K: KeyValueStore + 'static>(
    State(state): State<Arc<AppState<L, K>>>,
    payload: Result<Json<CreateItemRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ItemResponse>), ApiError> {
    let Json(req) = payload?;

    let item = state
        .catalog
        .create_item(NewItem {
            code: req.code,
            description: req.description,
            balance: req.balance,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(item.into())))
}

/// GET /items: list all items, ordered by code.
pub async fn list<L: InventoryStore + 'static, K: KeyValueStore + 'static>(
    State(state): State<Arc<AppState<L, K>>>,
) -> Result<Json<Vec<ItemResponse>>, ApiError> {
    let items = state.catalog.list_items().await?;
    Ok(Json(items.into_iter().map(ItemResponse::from).collect()))
}

/// GET /items/search?q=: substring search over code and description.
pub async fn search<L: InventoryStore + 'static, K: KeyValueStore + 'static>(
    State(state): State<Arc<AppState<L, K>>>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> Result<Json<Vec<ItemResponse>>, ApiError> {
    let Query(params) = params?;
    let items = state.catalog.search_items(&params.q).await?;
    Ok(Json(items.into_iter().map(ItemResponse::from).collect()))
}

/// GET /items/{id}
#[tracing::instrument(skip(state))]
pub async fn get<L: InventoryStore + 'static, K: KeyValueStore + 'static>(
    State(state): State<Arc<AppState<L, K>>>,
    Path(id): Path<String>,
) -> Result<Json<ItemResponse>, ApiError> {
    let item_id: ItemId = parse_id(&id, "item id")?;
    let item = state.catalog.get_item(item_id).await?;
    Ok(Json(item.into()))
}

/// PUT /items/{id}: partial update of description and balance.
#[tracing::instrument(skip(state, payload))]
pub async fn update<L: InventoryStore + 'static, K: KeyValueStore + 'static>(
    State(state): State<Arc<AppState<L, K>>>,
    Path(id): Path<String>,
    payload: Result<Json<UpdateItemRequest>, JsonRejection>,
) -> Result<Json<ItemResponse>, ApiError> {
    let item_id: ItemId = parse_id(&id, "item id")?;
    let Json(req) = payload?;

    let item = state
        .catalog
        .update_item(
            item_id,
            ItemUpdate {
                description: req.description,
                balance: req.balance,
            },
        )
        .await?;

    Ok(Json(item.into()))
}

/// DELETE /items/{id}: refused while pending reservations reference the item.
#[tracing::instrument(skip(state))]
pub async fn delete<L: InventoryStore + 'static, K: KeyValueStore + 'static>(
    State(state): State<Arc<AppState<L, K>>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let item_id: ItemId = parse_id(&id, "item id")?;
    state.catalog.delete_item(item_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /items/{id}/availability?quantity=: authoritative, never cached.
pub async fn availability<L: InventoryStore + 'static, K: KeyValueStore + 'static>(
    State(state): State<Arc<AppState<L, K>>>,
    Path(id): Path<String>,
    params: Result<Query<AvailabilityParams>, QueryRejection>,
) -> Result<Json<AvailabilityResponse>, ApiError> {
    let item_id: ItemId = parse_id(&id, "item id")?;
    let Query(params) = params?;

    let available = state
        .coordinator
        .check_availability(item_id, params.quantity)
        .await?;

    Ok(Json(AvailabilityResponse {
        item_id,
        quantity: params.quantity,
        available,
    }))
}
