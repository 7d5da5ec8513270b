//! HTTP handlers, grouped by resource.

pub mod health;
pub mod items;
pub mod metrics;
pub mod reservations;
pub mod stock;

use std::str::FromStr;

use common::ItemId;
use reservation::StockLine;
use serde::Deserialize;

use crate::error::ApiError;

/// One `{item_id, quantity}` entry of a request body.
#[derive(Debug, Deserialize)]
pub struct LineRequest {
    pub item_id: String,
    pub quantity: i64,
}

fn parse_id<T>(raw: &str, field: &str) -> Result<T, ApiError>
where
    T: FromStr<Err = uuid::Error>,
{
    raw.trim()
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid {field}: {e}")))
}

fn parse_lines(lines: &[LineRequest]) -> Result<Vec<StockLine>, ApiError> {
    lines
        .iter()
        .map(|line| -> Result<StockLine, ApiError> {
            let item_id: ItemId = parse_id(&line.item_id, "item_id")?;
            Ok(StockLine::new(item_id, line.quantity)?)
        })
        .collect()
}
