//! Reservation error types.

use common::ItemId;
use keyspace::KeyspaceError;
use ledger::LedgerError;
use serde::Serialize;
use thiserror::Error;

/// Errors that can occur while coordinating reservations.
#[derive(Debug, Error)]
pub enum ReservationError {
    /// Ledger error, carrying the ledger's own failure kind.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Another request holds the item lock. Safe to retry.
    #[error("Item {item_id} is being modified by another request")]
    ConcurrentModification { item_id: ItemId },

    /// The request failed validation.
    #[error("Invalid data: {0}")]
    InvalidInput(String),

    /// The shared keyspace failed.
    #[error("Keyspace error: {0}")]
    Keyspace(#[from] KeyspaceError),
}

/// Closed classification of failures, used by transports to pick a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Expired,
    InvalidInput,
    Forbidden,
    Internal,
}

impl ReservationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReservationError::Ledger(e) => match e {
                LedgerError::ItemNotFound(_) | LedgerError::ReservationNotFound(_) => {
                    ErrorKind::NotFound
                }
                LedgerError::DuplicateCode(_)
                | LedgerError::InsufficientStock { .. }
                | LedgerError::ReservationAlreadyConfirmed(_)
                | LedgerError::ReservationAlreadyCancelled(_) => ErrorKind::Conflict,
                LedgerError::ReservationExpired { .. } => ErrorKind::Expired,
                LedgerError::NegativeBalance(_)
                | LedgerError::BalanceBelowReserved { .. }
                | LedgerError::InvalidQuantity(_) => ErrorKind::InvalidInput,
                LedgerError::OperationNotAllowed(_) => ErrorKind::Forbidden,
                LedgerError::Database(_)
                | LedgerError::Migration(_)
                | LedgerError::Unavailable(_) => ErrorKind::Internal,
            },
            ReservationError::ConcurrentModification { .. } => ErrorKind::Conflict,
            ReservationError::InvalidInput(_) => ErrorKind::InvalidInput,
            ReservationError::Keyspace(_) => ErrorKind::Internal,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            ReservationError::Ledger(e) => match e {
                LedgerError::ItemNotFound(_) => "NOT_FOUND",
                LedgerError::DuplicateCode(_) => "DUPLICATE_CODE",
                LedgerError::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
                LedgerError::ReservationNotFound(_) => "RESERVATION_NOT_FOUND",
                LedgerError::ReservationExpired { .. } => "RESERVATION_EXPIRED",
                LedgerError::ReservationAlreadyConfirmed(_) => "RESERVATION_ALREADY_CONFIRMED",
                LedgerError::ReservationAlreadyCancelled(_) => "RESERVATION_ALREADY_CANCELLED",
                LedgerError::NegativeBalance(_) | LedgerError::BalanceBelowReserved { .. } => {
                    "NEGATIVE_BALANCE"
                }
                LedgerError::InvalidQuantity(_) => "INVALID_QUANTITY",
                LedgerError::OperationNotAllowed(_) => "OPERATION_NOT_ALLOWED",
                LedgerError::Database(_)
                | LedgerError::Migration(_)
                | LedgerError::Unavailable(_) => "INTERNAL_ERROR",
            },
            ReservationError::ConcurrentModification { .. } => "CONCURRENT_MODIFICATION",
            ReservationError::InvalidInput(_) => "INVALID_DATA",
            ReservationError::Keyspace(_) => "INTERNAL_ERROR",
        }
    }
}

/// Convenience type alias for reservation results.
pub type Result<T> = std::result::Result<T, ReservationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_failures_keep_their_kind() {
        let err = ReservationError::from(LedgerError::InsufficientStock {
            item_id: ItemId::new(),
            requested: 6,
            available: 4,
        });
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(err.code(), "INSUFFICIENT_STOCK");

        let err = ReservationError::from(LedgerError::ReservationExpired {
            reservation_id: common::ReservationId::new(),
            group_id: common::GroupId::new(),
        });
        assert_eq!(err.kind(), ErrorKind::Expired);

        let err = ReservationError::from(LedgerError::OperationNotAllowed("x".into()));
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        assert_eq!(err.code(), "OPERATION_NOT_ALLOWED");
    }

    #[test]
    fn settled_reservations_are_conflicts() {
        let err = ReservationError::from(LedgerError::ReservationAlreadyConfirmed("r".into()));
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let err = ReservationError::from(LedgerError::ReservationAlreadyCancelled("r".into()));
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(err.code(), "RESERVATION_ALREADY_CANCELLED");
    }

    #[test]
    fn lock_contention_is_a_conflict_not_internal() {
        let err = ReservationError::ConcurrentModification {
            item_id: ItemId::new(),
        };
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(err.code(), "CONCURRENT_MODIFICATION");
    }

    #[test]
    fn infrastructure_failures_are_internal() {
        let err = ReservationError::from(KeyspaceError::Unavailable("down".into()));
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(err.code(), "INTERNAL_ERROR");

        let err = ReservationError::from(LedgerError::Unavailable("down".into()));
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn validation_failures_are_invalid_input() {
        let err = ReservationError::from(LedgerError::InvalidQuantity(0));
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(err.code(), "INVALID_QUANTITY");

        let err = ReservationError::InvalidInput("no items".into());
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(err.code(), "INVALID_DATA");
    }
}
