use common::{GroupId, ItemId};
use ledger::{LedgerError, Reservation};
use serde::{Deserialize, Serialize};

use crate::{ReservationError, Result};

/// One `(item, quantity)` pair of a request. Quantity is always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StockLine {
    item_id: ItemId,
    quantity: i64,
}

impl StockLine {
    pub fn new(item_id: ItemId, quantity: i64) -> Result<Self> {
        if quantity <= 0 {
            return Err(LedgerError::InvalidQuantity(quantity).into());
        }
        Ok(Self { item_id, quantity })
    }

    pub fn item_id(&self) -> ItemId {
        self.item_id
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }
}

/// A validated reservation request: a group and its lines in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReserveRequest {
    group_id: GroupId,
    lines: Vec<StockLine>,
}

impl ReserveRequest {
    pub fn new(group_id: GroupId, lines: Vec<StockLine>) -> Result<Self> {
        if lines.is_empty() {
            return Err(ReservationError::InvalidInput(
                "at least one item is required".to_string(),
            ));
        }
        Ok(Self { group_id, lines })
    }

    pub fn group_id(&self) -> GroupId {
        self.group_id
    }

    pub fn lines(&self) -> &[StockLine] {
        &self.lines
    }
}

/// Result of a successful reservation request, replayed verbatim on retry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationOutcome {
    pub group_id: GroupId,
    pub reservations: Vec<Reservation>,
    pub message: String,
}

impl ReservationOutcome {
    pub fn new(group_id: GroupId, reservations: Vec<Reservation>) -> Self {
        let message = format!("{} items reserved", reservations.len());
        Self {
            group_id,
            reservations,
            message,
        }
    }
}
