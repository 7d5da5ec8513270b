use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    CancelTarget, GroupId, Item, ItemId, ItemUpdate, NewItem, NewReservation, Reservation, Result,
};

/// Transactional stock operations consumed by the reservation coordinator.
///
/// Each mutating method runs as one store transaction: the affected item
/// rows are read exclusively, and balance/reserved changes commit together
/// with the reservation status changes or not at all.
#[async_trait]
pub trait StockLedger: Send + Sync {
    /// Reads the authoritative state of an item.
    async fn get_item(&self, item_id: ItemId) -> Result<Item>;

    /// Creates a pending reservation and increments the item's `reserved`.
    ///
    /// Fails with `InsufficientStock` if `balance - reserved < quantity`,
    /// leaving the item untouched.
    async fn reserve(&self, reservation: NewReservation) -> Result<Reservation>;

    /// Confirms every pending reservation of the group, decrementing both
    /// `balance` and `reserved` of each item by the reserved quantity.
    ///
    /// Fails with `ReservationNotFound` if the group has no pending
    /// reservations and with `ReservationExpired` if any of them is past its
    /// window. Nothing is applied when any reservation of the group fails.
    async fn confirm(&self, group_id: GroupId, now: DateTime<Utc>) -> Result<Vec<Reservation>>;

    /// Cancels the pending reservations matched by `target`, releasing their
    /// quantity from `reserved` (floored at zero).
    ///
    /// Already cancelled reservations are skipped; the returned list only
    /// holds reservations transitioned by this call.
    async fn cancel(&self, target: CancelTarget) -> Result<Vec<Reservation>>;

    /// Withdraws stock directly, without a prior reservation.
    ///
    /// Fails with `InsufficientStock` if `balance < quantity` or if the
    /// withdrawal would leave fewer units than are currently reserved.
    async fn deduct(&self, item_id: ItemId, quantity: i64) -> Result<Item>;

    /// Lists every reservation of a group, oldest first.
    async fn reservations_for_group(&self, group_id: GroupId) -> Result<Vec<Reservation>>;

    /// Cancels every pending reservation whose window elapsed at `now`.
    async fn release_expired(&self, now: DateTime<Utc>) -> Result<Vec<Reservation>>;
}

/// Plain item data access: catalog creation, lookups and field updates.
#[async_trait]
pub trait ItemCatalog: Send + Sync {
    /// Creates an item with nothing reserved.
    async fn create_item(&self, item: NewItem) -> Result<Item>;

    /// Looks up an item by its unique code.
    async fn find_item_by_code(&self, code: &str) -> Result<Option<Item>>;

    /// Lists all items ordered by code.
    async fn list_items(&self) -> Result<Vec<Item>>;

    /// Case-insensitive substring search over code and description.
    async fn search_items(&self, term: &str) -> Result<Vec<Item>>;

    /// Applies a partial update.
    async fn update_item(&self, item_id: ItemId, update: ItemUpdate) -> Result<Item>;

    /// Deletes an item. Refused while pending reservations reference it.
    async fn delete_item(&self, item_id: ItemId) -> Result<()>;
}

/// A backend providing both the transactional ledger and the catalog.
pub trait InventoryStore: StockLedger + ItemCatalog {}

impl<T: StockLedger + ItemCatalog + ?Sized> InventoryStore for T {}

#[async_trait]
impl<T: StockLedger + ?Sized> StockLedger for Arc<T> {
    async fn get_item(&self, item_id: ItemId) -> Result<Item> {
        (**self).get_item(item_id).await
    }

    async fn reserve(&self, reservation: NewReservation) -> Result<Reservation> {
        (**self).reserve(reservation).await
    }

    async fn confirm(&self, group_id: GroupId, now: DateTime<Utc>) -> Result<Vec<Reservation>> {
        (**self).confirm(group_id, now).await
    }

    async fn cancel(&self, target: CancelTarget) -> Result<Vec<Reservation>> {
        (**self).cancel(target).await
    }

    async fn deduct(&self, item_id: ItemId, quantity: i64) -> Result<Item> {
        (**self).deduct(item_id, quantity).await
    }

    async fn reservations_for_group(&self, group_id: GroupId) -> Result<Vec<Reservation>> {
        (**self).reservations_for_group(group_id).await
    }

    async fn release_expired(&self, now: DateTime<Utc>) -> Result<Vec<Reservation>> {
        (**self).release_expired(now).await
    }
}

#[async_trait]
impl<T: ItemCatalog + ?Sized> ItemCatalog for Arc<T> {
    async fn create_item(&self, item: NewItem) -> Result<Item> {
        (**self).create_item(item).await
    }

    async fn find_item_by_code(&self, code: &str) -> Result<Option<Item>> {
        (**self).find_item_by_code(code).await
    }

    async fn list_items(&self) -> Result<Vec<Item>> {
        (**self).list_items().await
    }

    async fn search_items(&self, term: &str) -> Result<Vec<Item>> {
        (**self).search_items(term).await
    }

    async fn update_item(&self, item_id: ItemId, update: ItemUpdate) -> Result<Item> {
        (**self).update_item(item_id, update).await
    }

    async fn delete_item(&self, item_id: ItemId) -> Result<()> {
        (**self).delete_item(item_id).await
    }
}
