//! Shared types for the stock reservation service.

pub mod types;

pub use types::{GroupId, ItemId, ReservationId};
