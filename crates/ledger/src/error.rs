use thiserror::Error;

use crate::{GroupId, ItemId, ReservationId};

/// Errors that can occur when interacting with the stock ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The item does not exist.
    #[error("Item not found: {0}")]
    ItemNotFound(ItemId),

    /// Another item already uses this code.
    #[error("Item code already exists: {0}")]
    DuplicateCode(String),

    /// Not enough unreserved stock for the requested quantity.
    #[error("Insufficient stock for item {item_id}: requested {requested}, available {available}")]
    InsufficientStock {
        item_id: ItemId,
        requested: i64,
        available: i64,
    },

    /// No reservation matches the group or reservation id.
    #[error("Reservation not found: {0}")]
    ReservationNotFound(String),

    /// A pending reservation's window elapsed before it was confirmed.
    #[error("Reservation {reservation_id} of group {group_id} has expired")]
    ReservationExpired {
        reservation_id: ReservationId,
        group_id: GroupId,
    },

    /// The reservation was already confirmed.
    #[error("Reservation already confirmed: {0}")]
    ReservationAlreadyConfirmed(String),

    /// The reservation was already cancelled.
    ///
    /// Neither ledger raises this today: cancelling twice is a no-op and
    /// confirm only considers pending reservations. Kept so transports map
    /// it to a conflict if a backend does report it.
    #[error("Reservation already cancelled: {0}")]
    ReservationAlreadyCancelled(String),

    /// The operation would leave an item with a negative balance.
    #[error("Balance of item {0} cannot be negative")]
    NegativeBalance(String),

    /// The new balance would be smaller than the units currently reserved.
    #[error("Balance {balance} of item {item_id} cannot be lower than reserved {reserved}")]
    BalanceBelowReserved {
        item_id: ItemId,
        balance: i64,
        reserved: i64,
    },

    /// Quantities must be strictly positive.
    #[error("Quantity must be greater than zero, got {0}")]
    InvalidQuantity(i64),

    /// The operation is not permitted in the item's current state.
    #[error("Operation not allowed: {0}")]
    OperationNotAllowed(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// The backing store refused the call (used by the in-memory ledger's
    /// failure injection).
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
