//! Reservation coordination for stock items.
//!
//! A reservation request holds stock for several items on behalf of one
//! group (an order or fiscal document). The [`ReservationCoordinator`]
//! processes the items in order:
//! 1. Replay a stored result if the group was already reserved
//! 2. Per item: take the item lock, reserve in the ledger, release the lock
//! 3. On any failure, cancel the reservations already made
//! 4. On success, store the result for replay and evict derived read views
//!
//! The ledger transaction is the correctness boundary; the per-item lock
//! only turns concurrent access to one item into fast, retriable failures.

pub mod catalog;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod model;
pub mod sweeper;

pub use catalog::CatalogService;
pub use config::CoordinatorConfig;
pub use coordinator::ReservationCoordinator;
pub use error::{ErrorKind, ReservationError, Result};
pub use model::{ReservationOutcome, ReserveRequest, StockLine};
pub use sweeper::run_expiry_sweeper;
