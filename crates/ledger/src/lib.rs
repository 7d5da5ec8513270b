//! Stock ledger for the reservation service.
//!
//! The ledger owns persisted item and reservation state. Every mutating
//! operation is a single transaction that reads the affected item rows
//! exclusively, so the item row is the correctness boundary for
//! `balance` and `reserved` regardless of how many service replicas run.

pub mod error;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod store;

pub use common::{GroupId, ItemId, ReservationId};
pub use error::{LedgerError, Result};
pub use memory::InMemoryStockLedger;
pub use model::{
    CancelTarget, Item, ItemUpdate, NewItem, NewReservation, Reservation, ReservationStatus,
};
pub use postgres::PostgresStockLedger;
pub use store::{InventoryStore, ItemCatalog, StockLedger};
