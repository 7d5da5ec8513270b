use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    CancelTarget, GroupId, Item, ItemId, ItemUpdate, LedgerError, NewItem, NewReservation,
    Reservation, ReservationId, ReservationStatus, Result,
    store::{ItemCatalog, StockLedger},
};

const ITEM_COLUMNS: &str = "id, code, description, balance, reserved, created_at, updated_at";
const RESERVATION_COLUMNS: &str =
    "id, item_id, group_id, quantity, status, expires_at, created_at, updated_at";

/// PostgreSQL-backed stock ledger.
///
/// Item rows are read with `SELECT ... FOR UPDATE` inside the transaction
/// of each operation. When an operation touches several items the rows are
/// locked in id order, so two concurrent multi-item calls cannot deadlock.
#[derive(Clone)]
pub struct PostgresStockLedger {
    pool: PgPool,
}

impl PostgresStockLedger {
    /// Creates a new PostgreSQL stock ledger.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a connection pool to `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_item(row: PgRow) -> Result<Item> {
        Ok(Item {
            id: ItemId::from_uuid(row.try_get::<Uuid, _>("id")?),
            code: row.try_get("code")?,
            description: row.try_get("description")?,
            balance: row.try_get("balance")?,
            reserved: row.try_get("reserved")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_reservation(row: PgRow) -> Result<Reservation> {
        let status: String = row.try_get("status")?;
        let status: ReservationStatus = status
            .parse()
            .map_err(|e: String| LedgerError::Database(sqlx::Error::Decode(e.into())))?;

        Ok(Reservation {
            id: ReservationId::from_uuid(row.try_get::<Uuid, _>("id")?),
            item_id: ItemId::from_uuid(row.try_get::<Uuid, _>("item_id")?),
            group_id: GroupId::from_uuid(row.try_get::<Uuid, _>("group_id")?),
            quantity: row.try_get("quantity")?,
            status,
            expires_at: row.try_get("expires_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    /// Reads an item row exclusively for the rest of the transaction.
    async fn lock_item(conn: &mut PgConnection, item_id: ItemId) -> Result<Item> {
        let row = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM items WHERE id = $1 FOR UPDATE"
        ))
        .bind(item_id.as_uuid())
        .fetch_optional(&mut *conn)
        .await?;

        match row {
            Some(row) => Self::row_to_item(row),
            None => Err(LedgerError::ItemNotFound(item_id)),
        }
    }

    /// Locks every item referenced by `reservations`, in id order.
    async fn lock_items_for(
        conn: &mut PgConnection,
        reservations: &[Reservation],
    ) -> Result<HashMap<ItemId, Item>> {
        let item_ids: BTreeSet<ItemId> = reservations.iter().map(|r| r.item_id).collect();
        let mut items = HashMap::with_capacity(item_ids.len());
        for item_id in item_ids {
            let item = Self::lock_item(conn, item_id).await?;
            items.insert(item_id, item);
        }
        Ok(items)
    }

    async fn write_item_counters(
        conn: &mut PgConnection,
        item: &Item,
        now: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query("UPDATE items SET balance = $2, reserved = $3, updated_at = $4 WHERE id = $1")
            .bind(item.id.as_uuid())
            .bind(item.balance)
            .bind(item.reserved)
            .bind(now)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    async fn set_status(
        conn: &mut PgConnection,
        reservations: &[Reservation],
        status: ReservationStatus,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let ids: Vec<Uuid> = reservations.iter().map(|r| r.id.as_uuid()).collect();
        sqlx::query("UPDATE reservations SET status = $2, updated_at = $3 WHERE id = ANY($1)")
            .bind(&ids)
            .bind(status.as_str())
            .bind(now)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// Marks pending reservations cancelled and releases their quantity.
    async fn release_pending(
        conn: &mut PgConnection,
        pending: Vec<Reservation>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Reservation>> {
        if pending.is_empty() {
            return Ok(pending);
        }

        let mut items = Self::lock_items_for(conn, &pending).await?;
        for reservation in &pending {
            if let Some(item) = items.get_mut(&reservation.item_id) {
                item.reserved = (item.reserved - reservation.quantity).max(0);
            }
        }
        for item in items.values() {
            Self::write_item_counters(conn, item, now).await?;
        }
        Self::set_status(conn, &pending, ReservationStatus::Cancelled, now).await?;

        Ok(pending
            .into_iter()
            .map(|mut r| {
                r.status = ReservationStatus::Cancelled;
                r.updated_at = now;
                r
            })
            .collect())
    }
}

#[async_trait]
impl StockLedger for PostgresStockLedger {
    async fn get_item(&self, item_id: ItemId) -> Result<Item> {
        let row = sqlx::query(&format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = $1"))
            .bind(item_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Self::row_to_item(row),
            None => Err(LedgerError::ItemNotFound(item_id)),
        }
    }

    async fn reserve(&self, new: NewReservation) -> Result<Reservation> {
        if new.quantity <= 0 {
            return Err(LedgerError::InvalidQuantity(new.quantity));
        }

        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        let item = Self::lock_item(&mut *tx, new.item_id).await?;
        if !item.can_reserve(new.quantity) {
            return Err(LedgerError::InsufficientStock {
                item_id: item.id,
                requested: new.quantity,
                available: item.available(),
            });
        }

        sqlx::query("UPDATE items SET reserved = reserved + $2, updated_at = $3 WHERE id = $1")
            .bind(new.item_id.as_uuid())
            .bind(new.quantity)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO reservations (id, item_id, group_id, quantity, status, expires_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
            RETURNING {RESERVATION_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(new.item_id.as_uuid())
        .bind(new.group_id.as_uuid())
        .bind(new.quantity)
        .bind(ReservationStatus::Pending.as_str())
        .bind(new.expires_at)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;
        let reservation = Self::row_to_reservation(row)?;

        tx.commit().await?;
        tracing::debug!(
            reservation_id = %reservation.id,
            item_id = %reservation.item_id,
            quantity = reservation.quantity,
            "reservation created"
        );
        Ok(reservation)
    }

    async fn confirm(&self, group_id: GroupId, now: DateTime<Utc>) -> Result<Vec<Reservation>> {
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query(&format!(
            r#"
            SELECT {RESERVATION_COLUMNS} FROM reservations
            WHERE group_id = $1 AND status = 'PENDING'
            ORDER BY created_at ASC
            FOR UPDATE
            "#
        ))
        .bind(group_id.as_uuid())
        .fetch_all(&mut *tx)
        .await?;
        let pending: Vec<Reservation> = rows
            .into_iter()
            .map(Self::row_to_reservation)
            .collect::<Result<_>>()?;

        if pending.is_empty() {
            return Err(LedgerError::ReservationNotFound(group_id.to_string()));
        }
        if let Some(expired) = pending.iter().find(|r| r.is_expired_at(now)) {
            return Err(LedgerError::ReservationExpired {
                reservation_id: expired.id,
                group_id,
            });
        }

        let mut items = Self::lock_items_for(&mut *tx, &pending).await?;
        for reservation in &pending {
            let item = items
                .get_mut(&reservation.item_id)
                .ok_or(LedgerError::ItemNotFound(reservation.item_id))?;
            item.balance -= reservation.quantity;
            item.reserved -= reservation.quantity;
            if item.balance < 0 {
                // Dropping the transaction rolls back the whole group.
                return Err(LedgerError::NegativeBalance(item.id.to_string()));
            }
        }
        for item in items.values() {
            Self::write_item_counters(&mut *tx, item, now).await?;
        }
        Self::set_status(&mut *tx, &pending, ReservationStatus::Confirmed, now).await?;

        tx.commit().await?;

        Ok(pending
            .into_iter()
            .map(|mut r| {
                r.status = ReservationStatus::Confirmed;
                r.updated_at = now;
                r
            })
            .collect())
    }

    async fn cancel(&self, target: CancelTarget) -> Result<Vec<Reservation>> {
        let mut tx = self.pool.begin().await?;

        let (filter, id) = match target {
            CancelTarget::Group(group_id) => ("group_id", group_id.as_uuid()),
            CancelTarget::Reservation(reservation_id) => ("id", reservation_id.as_uuid()),
        };
        let rows = sqlx::query(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE {filter} = $1 ORDER BY created_at ASC FOR UPDATE"
        ))
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;
        let matched: Vec<Reservation> = rows
            .into_iter()
            .map(Self::row_to_reservation)
            .collect::<Result<_>>()?;

        if matched.is_empty() {
            return Err(LedgerError::ReservationNotFound(target.to_string()));
        }

        let all_confirmed = matched
            .iter()
            .all(|r| r.status == ReservationStatus::Confirmed);
        let pending: Vec<Reservation> = matched
            .into_iter()
            .filter(|r| r.status == ReservationStatus::Pending)
            .collect();
        if pending.is_empty() && all_confirmed {
            return Err(LedgerError::ReservationAlreadyConfirmed(target.to_string()));
        }

        let cancelled = Self::release_pending(&mut *tx, pending, Utc::now()).await?;
        tx.commit().await?;

        Ok(cancelled)
    }

    async fn deduct(&self, item_id: ItemId, quantity: i64) -> Result<Item> {
        if quantity <= 0 {
            return Err(LedgerError::InvalidQuantity(quantity));
        }

        let mut tx = self.pool.begin().await?;
        let mut item = Self::lock_item(&mut *tx, item_id).await?;

        if item.balance < quantity || item.balance - quantity < item.reserved {
            return Err(LedgerError::InsufficientStock {
                item_id,
                requested: quantity,
                available: item.available(),
            });
        }

        let now = Utc::now();
        item.balance -= quantity;
        item.updated_at = now;
        Self::write_item_counters(&mut *tx, &item, now).await?;

        tx.commit().await?;
        Ok(item)
    }

    async fn reservations_for_group(&self, group_id: GroupId) -> Result<Vec<Reservation>> {
        let rows = sqlx::query(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE group_id = $1 ORDER BY created_at ASC"
        ))
        .bind(group_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_reservation).collect()
    }

    async fn release_expired(&self, now: DateTime<Utc>) -> Result<Vec<Reservation>> {
        let mut tx = self.pool.begin().await?;

        // Rows another transaction is confirming or cancelling are left for
        // the next sweep.
        let rows = sqlx::query(&format!(
            r#"
            SELECT {RESERVATION_COLUMNS} FROM reservations
            WHERE status = 'PENDING' AND expires_at <= $1
            ORDER BY created_at ASC
            FOR UPDATE SKIP LOCKED
            "#
        ))
        .bind(now)
        .fetch_all(&mut *tx)
        .await?;
        let expired: Vec<Reservation> = rows
            .into_iter()
            .map(Self::row_to_reservation)
            .collect::<Result<_>>()?;

        let released = Self::release_pending(&mut *tx, expired, now).await?;
        tx.commit().await?;

        Ok(released)
    }
}

#[async_trait]
impl ItemCatalog for PostgresStockLedger {
    async fn create_item(&self, new: NewItem) -> Result<Item> {
        if new.balance < 0 {
            return Err(LedgerError::NegativeBalance(new.code));
        }

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO items (id, code, description, balance, reserved)
            VALUES ($1, $2, $3, $4, 0)
            RETURNING {ITEM_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&new.code)
        .bind(&new.description)
        .bind(new.balance)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("items_code_unique")
            {
                return LedgerError::DuplicateCode(new.code.clone());
            }
            LedgerError::Database(e)
        })?;

        Self::row_to_item(row)
    }

    async fn find_item_by_code(&self, code: &str) -> Result<Option<Item>> {
        let row = sqlx::query(&format!("SELECT {ITEM_COLUMNS} FROM items WHERE code = $1"))
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_item).transpose()
    }

    async fn list_items(&self) -> Result<Vec<Item>> {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM items ORDER BY code ASC");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        rows.into_iter().map(Self::row_to_item).collect()
    }

    async fn search_items(&self, term: &str) -> Result<Vec<Item>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {ITEM_COLUMNS} FROM items
            WHERE code ILIKE '%' || $1 || '%' OR description ILIKE '%' || $1 || '%'
            ORDER BY code ASC
            "#
        ))
        .bind(term)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_item).collect()
    }

    async fn update_item(&self, item_id: ItemId, update: ItemUpdate) -> Result<Item> {
        let mut tx = self.pool.begin().await?;
        let mut item = Self::lock_item(&mut *tx, item_id).await?;

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

        let row = sqlx::query(&format!(
            r#"
            UPDATE items SET description = $2, balance = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING {ITEM_COLUMNS}
            "#
        ))
        .bind(item_id.as_uuid())
        .bind(&item.description)
        .bind(item.balance)
        .fetch_one(&mut *tx)
        .await?;
        let item = Self::row_to_item(row)?;

        tx.commit().await?;
        Ok(item)
    }

    async fn delete_item(&self, item_id: ItemId) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        Self::lock_item(&mut *tx, item_id).await?;

        let has_pending: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM reservations WHERE item_id = $1 AND status = 'PENDING')",
        )
        .bind(item_id.as_uuid())
        .fetch_one(&mut *tx)
        .await?;
        if has_pending {
            return Err(LedgerError::OperationNotAllowed(format!(
                "item {item_id} has pending reservations"
            )));
        }

        // Terminal reservation records go with the item (ON DELETE CASCADE).
        sqlx::query("DELETE FROM items WHERE id = $1")
            .bind(item_id.as_uuid())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}
