use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::{
    CancelTarget, GroupId, Item, ItemId, ItemUpdate, LedgerError, NewItem, NewReservation,
    Reservation, ReservationId, ReservationStatus, Result,
    store::{ItemCatalog, StockLedger},
};

#[derive(Debug, Default)]
struct LedgerState {
    items: HashMap<ItemId, Item>,
    /// Kept in creation order.
    reservations: Vec<Reservation>,
    fail_on_cancel: bool,
}

/// In-memory stock ledger for tests and local runs.
///
/// A single mutex around all tables makes every call atomic. Multi-row
/// calls stage their changes and only write them back once every row has
/// been validated, so a failing call never partially applies.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStockLedger {
    state: Arc<Mutex<LedgerState>>,
}

impl InMemoryStockLedger {
    /// Creates a new empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures cancel calls to fail, simulating an unavailable store.
    pub async fn set_fail_on_cancel(&self, fail: bool) {
        self.state.lock().await.fail_on_cancel = fail;
    }

    /// Returns a reservation by id.
    pub async fn reservation(&self, reservation_id: ReservationId) -> Option<Reservation> {
        self.state
            .lock()
            .await
            .reservations
            .iter()
            .find(|r| r.id == reservation_id)
            .cloned()
    }

    /// Returns the total number of reservation records.
    pub async fn reservation_count(&self) -> usize {
        self.state.lock().await.reservations.len()
    }
}

fn insufficient(item: &Item, requested: i64) -> LedgerError {
    LedgerError::InsufficientStock {
        item_id: item.id,
        requested,
        available: item.available(),
    }
}

fn release(item: &mut Item, quantity: i64, now: DateTime<Utc>) {
    item.reserved = (item.reserved - quantity).max(0);
    item.updated_at = now;
}

#[async_trait]
impl StockLedger for InMemoryStockLedger {
    async fn get_item(&self, item_id: ItemId) -> Result<Item> {
        self.state
            .lock()
            .await
            .items
            .get(&item_id)
            .cloned()
            .ok_or(LedgerError::ItemNotFound(item_id))
    }

    async fn reserve(&self, new: NewReservation) -> Result<Reservation> {
        if new.quantity <= 0 {
            return Err(LedgerError::InvalidQuantity(new.quantity));
        }

        let mut state = self.state.lock().await;
        let now = Utc::now();

        let item = state
            .items
            .get_mut(&new.item_id)
            .ok_or(LedgerError::ItemNotFound(new.item_id))?;
        if !item.can_reserve(new.quantity) {
            return Err(insufficient(item, new.quantity));
        }
        item.reserved += new.quantity;
        item.updated_at = now;

        let reservation = Reservation {
            id: ReservationId::new(),
            item_id: new.item_id,
            group_id: new.group_id,
            quantity: new.quantity,
            status: ReservationStatus::Pending,
            expires_at: new.expires_at,
            created_at: now,
            updated_at: now,
        };
        state.reservations.push(reservation.clone());

        Ok(reservation)
    }

    async fn confirm(&self, group_id: GroupId, now: DateTime<Utc>) -> Result<Vec<Reservation>> {
        let mut state = self.state.lock().await;

        let pending: Vec<usize> = state
            .reservations
            .iter()
            .enumerate()
            .filter(|(_, r)| r.group_id == group_id && r.status == ReservationStatus::Pending)
            .map(|(i, _)| i)
            .collect();

        if pending.is_empty() {
            return Err(LedgerError::ReservationNotFound(group_id.to_string()));
        }

        if let Some(expired) = pending
            .iter()
            .map(|&i| &state.reservations[i])
            .find(|r| r.is_expired_at(now))
        {
            return Err(LedgerError::ReservationExpired {
                reservation_id: expired.id,
                group_id,
            });
        }

        // Stage item changes; nothing is written until every row checks out.
        let mut staged: HashMap<ItemId, Item> = HashMap::new();
        for &i in &pending {
            let reservation = &state.reservations[i];
            let item = match staged.entry(reservation.item_id) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => {
                    let current = state
                        .items
                        .get(&reservation.item_id)
                        .cloned()
                        .ok_or(LedgerError::ItemNotFound(reservation.item_id))?;
                    entry.insert(current)
                }
            };
            item.balance -= reservation.quantity;
            item.reserved -= reservation.quantity;
            item.updated_at = now;
            if item.balance < 0 {
                return Err(LedgerError::NegativeBalance(item.id.to_string()));
            }
        }

        state.items.extend(staged);
        let mut confirmed = Vec::with_capacity(pending.len());
        for i in pending {
            let reservation = &mut state.reservations[i];
            reservation.status = ReservationStatus::Confirmed;
            reservation.updated_at = now;
            confirmed.push(reservation.clone());
        }

        Ok(confirmed)
    }

    async fn cancel(&self, target: CancelTarget) -> Result<Vec<Reservation>> {
        let mut state = self.state.lock().await;

        if state.fail_on_cancel {
            return Err(LedgerError::Unavailable(format!(
                "cancel of {target} refused"
            )));
        }

        let matched: Vec<usize> = state
            .reservations
            .iter()
            .enumerate()
            .filter(|(_, r)| match target {
                CancelTarget::Group(group_id) => r.group_id == group_id,
                CancelTarget::Reservation(reservation_id) => r.id == reservation_id,
            })
            .map(|(i, _)| i)
            .collect();

        if matched.is_empty() {
            return Err(LedgerError::ReservationNotFound(target.to_string()));
        }

        let pending: Vec<usize> = matched
            .iter()
            .copied()
            .filter(|&i| state.reservations[i].status == ReservationStatus::Pending)
            .collect();

        if pending.is_empty()
            && matched
                .iter()
                .all(|&i| state.reservations[i].status == ReservationStatus::Confirmed)
        {
            return Err(LedgerError::ReservationAlreadyConfirmed(target.to_string()));
        }

        let now = Utc::now();
        let mut cancelled = Vec::with_capacity(pending.len());
        for i in pending {
            let (item_id, quantity) = {
                let reservation = &mut state.reservations[i];
                reservation.status = ReservationStatus::Cancelled;
                reservation.updated_at = now;
                cancelled.push(reservation.clone());
                (reservation.item_id, reservation.quantity)
            };
            if let Some(item) = state.items.get_mut(&item_id) {
                release(item, quantity, now);
            }
        }

        Ok(cancelled)
    }

    async fn deduct(&self, item_id: ItemId, quantity: i64) -> Result<Item> {
        if quantity <= 0 {
            return Err(LedgerError::InvalidQuantity(quantity));
        }

        let mut state = self.state.lock().await;
        let item = state
            .items
            .get_mut(&item_id)
            .ok_or(LedgerError::ItemNotFound(item_id))?;

        if item.balance < quantity || item.balance - quantity < item.reserved {
            return Err(insufficient(item, quantity));
        }
        item.balance -= quantity;
        item.updated_at = Utc::now();

        Ok(item.clone())
    }

    async fn reservations_for_group(&self, group_id: GroupId) -> Result<Vec<Reservation>> {
        let state = self.state.lock().await;
        Ok(state
            .reservations
            .iter()
            .filter(|r| r.group_id == group_id)
            .cloned()
            .collect())
    }

    async fn release_expired(&self, now: DateTime<Utc>) -> Result<Vec<Reservation>> {
        let mut state = self.state.lock().await;

        let expired: Vec<usize> = state
            .reservations
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_expired_at(now))
            .map(|(i, _)| i)
            .collect();

        let mut released = Vec::with_capacity(expired.len());
        for i in expired {
            let (item_id, quantity) = {
                let reservation = &mut state.reservations[i];
                reservation.status = ReservationStatus::Cancelled;
                reservation.updated_at = now;
                released.push(reservation.clone());
                (reservation.item_id, reservation.quantity)
            };
            if let Some(item) = state.items.get_mut(&item_id) {
                release(item, quantity, now);
            }
        }

        Ok(released)
    }
}

#[async_trait]
impl ItemCatalog for InMemoryStockLedger {
    async fn create_item(&self, new: NewItem) -> Result<Item> {
        if new.balance < 0 {
            return Err(LedgerError::NegativeBalance(new.code));
        }

        let mut state = self.state.lock().await;
        if state.items.values().any(|i| i.code == new.code) {
            return Err(LedgerError::DuplicateCode(new.code));
        }

        let now = Utc::now();
        let item = Item {
            id: ItemId::new(),
            code: new.code,
            description: new.description,
            balance: new.balance,
            reserved: 0,
            created_at: now,
            updated_at: now,
        };
        state.items.insert(item.id, item.clone());

        Ok(item)
    }

    async fn find_item_by_code(&self, code: &str) -> Result<Option<Item>> {
        let state = self.state.lock().await;
        Ok(state.items.values().find(|i| i.code == code).cloned())
    }

    async fn list_items(&self) -> Result<Vec<Item>> {
        let state = self.state.lock().await;
        let mut items: Vec<Item> = state.items.values().cloned().collect();
        items.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(items)
    }

    async fn search_items(&self, term: &str) -> Result<Vec<Item>> {
        let needle = term.to_lowercase();
        let state = self.state.lock().await;
        let mut items: Vec<Item> = state
            .items
            .values()
            .filter(|i| {
                i.code.to_lowercase().contains(&needle)
                    || i.description.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect();
        items.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(items)
    }

    async fn update_item(&self, item_id: ItemId, update: ItemUpdate) -> Result<Item> {
        let mut state = self.state.lock().await;
        let item = state
            .items
            .get_mut(&item_id)
            .ok_or(LedgerError::ItemNotFound(item_id))?;

        if let Some(balance) = update.balance {
            if balance < 0 {
                return Err(LedgerError::NegativeBalance(item_id.to_string()));
            }
            if balance < item.reserved {
                return Err(LedgerError::BalanceBelowReserved {
                    item_id,
                    balance,
                    reserved: item.reserved,
                });
            }
            item.balance = balance;
        }
        if let Some(description) = update.description.filter(|d| !d.is_empty()) {
            item.description = description;
        }
        item.updated_at = Utc::now();

        Ok(item.clone())
    }

    async fn delete_item(&self, item_id: ItemId) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.items.contains_key(&item_id) {
            return Err(LedgerError::ItemNotFound(item_id));
        }
        if state
            .reservations
            .iter()
            .any(|r| r.item_id == item_id && r.status == ReservationStatus::Pending)
        {
            return Err(LedgerError::OperationNotAllowed(format!(
                "item {item_id} has pending reservations"
            )));
        }

        state.items.remove(&item_id);
        state.reservations.retain(|r| r.item_id != item_id);
        Ok(())
    }
}
