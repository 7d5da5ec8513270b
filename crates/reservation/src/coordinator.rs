//! Reservation coordinator for multi-item stock holds.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use common::{GroupId, ItemId, ReservationId};
use keyspace::{IdempotencyCache, KeyValueStore, KeyspaceError, LockManager, LockToken, ReadCache};
use ledger::{CancelTarget, Item, LedgerError, NewReservation, Reservation, StockLedger};

use crate::catalog::ITEM_VIEWS_PATTERN;
use crate::config::CoordinatorConfig;
use crate::error::{ReservationError, Result};
use crate::model::{ReservationOutcome, ReserveRequest, StockLine};

fn lock_resource(item_id: ItemId) -> String {
    format!("item:{item_id}")
}

/// Orchestrates reservations across the ledger and the shared keyspace.
///
/// Items of a request are processed strictly in input order. Each item is
/// locked only for the duration of its own ledger transaction. When an item
/// fails, reservations already made for the request are cancelled in the
/// order they were made, and the original failure is returned.
pub struct ReservationCoordinator<L, K> {
    ledger: L,
    locks: LockManager<K>,
    idempotency: IdempotencyCache<K>,
    cache: ReadCache<K>,
    config: CoordinatorConfig,
}

impl<L, K> ReservationCoordinator<L, K>
where
    L: StockLedger,
    K: KeyValueStore + Clone,
{
    /// Creates a coordinator whose locks, idempotency records and read views
    /// share one keyspace.
    pub fn new(ledger: L, keyspace: K, config: CoordinatorConfig) -> Self {
        Self::from_parts(
            ledger,
            LockManager::new(keyspace.clone()),
            IdempotencyCache::new(keyspace.clone()),
            ReadCache::new(keyspace),
            config,
        )
    }
}

impl<L, K> ReservationCoordinator<L, K>
where
    L: StockLedger,
    K: KeyValueStore,
{
    pub fn from_parts(
        ledger: L,
        locks: LockManager<K>,
        idempotency: IdempotencyCache<K>,
        cache: ReadCache<K>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            ledger,
            locks,
            idempotency,
            cache,
            config,
        }
    }

    /// Reserves every line of the request for its group.
    ///
    /// A request whose group already has a stored result returns that result
    /// unchanged without touching locks or the ledger.
    #[tracing::instrument(
        skip_all,
        fields(group_id = %request.group_id(), lines = request.lines().len())
    )]
    pub async fn reserve_items(&self, request: ReserveRequest) -> Result<ReservationOutcome> {
        metrics::counter!("reservation_requests_total").increment(1);
        let started = Instant::now();
        let group_id = request.group_id();
        let operation_key = group_id.idempotency_key();

        let mut unreadable_record = false;
        match self
            .idempotency
            .lookup::<ReservationOutcome>(&operation_key)
            .await
        {
            Ok(Some(previous)) => {
                metrics::counter!("reservation_idempotent_hits_total").increment(1);
                tracing::info!("Replaying stored reservation result");
                return Ok(previous);
            }
            Ok(None) => {}
            Err(KeyspaceError::Serialization(e)) => {
                tracing::warn!(error = %e, "Stored reservation result is unreadable, replacing it");
                unreadable_record = true;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Idempotency lookup failed, executing request");
            }
        }

        let expires_at = Utc::now() + self.config.reservation_window;
        let mut committed: Vec<Reservation> = Vec::with_capacity(request.lines().len());

        for line in request.lines() {
            match self.reserve_line(group_id, *line, expires_at).await {
                Ok(reservation) => committed.push(reservation),
                Err(e) => {
                    metrics::counter!("reservation_failures_total").increment(1);
                    tracing::warn!(
                        item_id = %line.item_id(),
                        error = %e,
                        committed = committed.len(),
                        "Reservation step failed, compensating"
                    );
                    self.compensate(&committed).await;
                    metrics::histogram!("reservation_duration_seconds")
                        .record(started.elapsed().as_secs_f64());
                    return Err(e);
                }
            }
        }

        let outcome = ReservationOutcome::new(group_id, committed);

        // The reservations are committed at this point; a lost record only
        // widens the window in which a retry re-executes.
        self.record_outcome(&operation_key, &outcome, unreadable_record)
            .await;

        self.invalidate_read_views().await;

        let duration = started.elapsed().as_secs_f64();
        metrics::histogram!("reservation_duration_seconds").record(duration);
        tracing::info!(
            reservations = outcome.reservations.len(),
            duration,
            "Items reserved"
        );

        Ok(outcome)
    }

    /// Stores the outcome for replay. A record that could not be decoded is
    /// overwritten, otherwise it would shadow this outcome until it expires.
    async fn record_outcome(
        &self,
        operation_key: &str,
        outcome: &ReservationOutcome,
        replace_existing: bool,
    ) {
        let ttl = self.config.idempotency_ttl;
        let stored = if replace_existing {
            self.idempotency
                .replace(operation_key, outcome, ttl)
                .await
                .map(|()| true)
        } else {
            self.idempotency.store(operation_key, outcome, ttl).await
        };

        match stored {
            Ok(true) => {}
            Ok(false) => tracing::warn!("Idempotency record already present, keeping it"),
            Err(e) => tracing::error!(error = %e, "Failed to store idempotency record"),
        }
    }

    async fn reserve_line(
        &self,
        group_id: GroupId,
        line: StockLine,
        expires_at: DateTime<Utc>,
    ) -> Result<Reservation> {
        let resource = lock_resource(line.item_id());
        let token = self
            .acquire(&resource, line.item_id(), self.config.lock_ttl)
            .await?;

        let reserved = self
            .ledger
            .reserve(NewReservation {
                item_id: line.item_id(),
                group_id,
                quantity: line.quantity(),
                expires_at,
            })
            .await;

        self.release(&resource, &token).await;

        Ok(reserved?)
    }

    /// Cancels committed reservations in commit order. Failures are logged
    /// and left for the expiry sweeper.
    async fn compensate(&self, committed: &[Reservation]) {
        for reservation in committed {
            match self
                .ledger
                .cancel(CancelTarget::Reservation(reservation.id))
                .await
            {
                Ok(_) => {
                    metrics::counter!("reservation_compensations_total").increment(1);
                    tracing::info!(
                        reservation_id = %reservation.id,
                        item_id = %reservation.item_id,
                        "Reservation compensated"
                    );
                }
                Err(e) => {
                    tracing::error!(
                        reservation_id = %reservation.id,
                        item_id = %reservation.item_id,
                        error = %e,
                        "Compensation failed, reservation stays pending until it expires"
                    );
                }
            }
        }
    }

    async fn acquire(&self, resource: &str, item_id: ItemId, ttl: Duration) -> Result<LockToken> {
        match self.locks.try_acquire(resource, ttl).await? {
            Some(token) => Ok(token),
            None => {
                metrics::counter!("lock_acquire_failures_total").increment(1);
                tracing::warn!(%item_id, "Item lock busy");
                Err(ReservationError::ConcurrentModification { item_id })
            }
        }
    }

    async fn release(&self, resource: &str, token: &LockToken) {
        if let Err(e) = self.locks.release(resource, token).await {
            tracing::warn!(resource, error = %e, "Lock release failed, it will lapse with its ttl");
        }
    }

    async fn invalidate_read_views(&self) {
        let evicted = self.cache.invalidate(ITEM_VIEWS_PATTERN).await;
        tracing::debug!(evicted, "Read views invalidated");
    }

    /// Confirms every pending reservation of the group.
    ///
    /// The whole group is rejected with `ReservationExpired` when any of its
    /// pending reservations is past its window.
    #[tracing::instrument(skip_all, fields(group_id = %group_id))]
    pub async fn confirm_reservation_group(&self, group_id: GroupId) -> Result<Vec<Reservation>> {
        let confirmed = self.ledger.confirm(group_id, Utc::now()).await?;
        self.invalidate_read_views().await;
        tracing::info!(confirmed = confirmed.len(), "Reservation group confirmed");
        Ok(confirmed)
    }

    /// Cancels the pending reservations of a group. Repeating it is a no-op.
    #[tracing::instrument(skip_all, fields(group_id = %group_id))]
    pub async fn cancel_reservation_group(&self, group_id: GroupId) -> Result<Vec<Reservation>> {
        let cancelled = self.ledger.cancel(CancelTarget::Group(group_id)).await?;
        self.invalidate_read_views().await;
        tracing::info!(cancelled = cancelled.len(), "Reservation group cancelled");
        Ok(cancelled)
    }

    #[tracing::instrument(skip_all, fields(reservation_id = %reservation_id))]
    pub async fn cancel_reservation(
        &self,
        reservation_id: ReservationId,
    ) -> Result<Vec<Reservation>> {
        let cancelled = self
            .ledger
            .cancel(CancelTarget::Reservation(reservation_id))
            .await?;
        self.invalidate_read_views().await;
        Ok(cancelled)
    }

    /// Withdraws stock without a prior reservation, one line at a time.
    ///
    /// Each line is its own ledger transaction; lines applied before a
    /// failing one stay applied.
    #[tracing::instrument(skip_all, fields(lines = lines.len()))]
    pub async fn deduct_stock(&self, lines: &[StockLine]) -> Result<Vec<Item>> {
        let mut updated = Vec::with_capacity(lines.len());

        let mut result = Ok(());
        for line in lines {
            match self.deduct_line(*line).await {
                Ok(item) => {
                    metrics::counter!("stock_deductions_total").increment(1);
                    updated.push(item);
                }
                Err(e) => {
                    tracing::warn!(item_id = %line.item_id(), error = %e, "Deduction failed");
                    result = Err(e);
                    break;
                }
            }
        }

        if !updated.is_empty() {
            self.invalidate_read_views().await;
        }
        result.map(|()| updated)
    }

    async fn deduct_line(&self, line: StockLine) -> Result<Item> {
        let resource = lock_resource(line.item_id());
        let token = self
            .acquire(&resource, line.item_id(), self.config.deduct_lock_ttl)
            .await?;

        let deducted = self.ledger.deduct(line.item_id(), line.quantity()).await;

        self.release(&resource, &token).await;

        Ok(deducted?)
    }

    /// Whether `quantity` units can be reserved right now, read from the
    /// ledger rather than from any cached view.
    pub async fn check_availability(&self, item_id: ItemId, quantity: i64) -> Result<bool> {
        if quantity <= 0 {
            return Err(LedgerError::InvalidQuantity(quantity).into());
        }
        let item = self.ledger.get_item(item_id).await?;
        Ok(item.can_reserve(quantity))
    }

    pub async fn reservations_for_group(&self, group_id: GroupId) -> Result<Vec<Reservation>> {
        Ok(self.ledger.reservations_for_group(group_id).await?)
    }

    /// Cancels pending reservations whose window elapsed. Returns how many
    /// were released.
    #[tracing::instrument(skip_all)]
    pub async fn release_expired_reservations(&self) -> Result<usize> {
        let released = self.ledger.release_expired(Utc::now()).await?;

        if !released.is_empty() {
            metrics::counter!("reservations_expired_total").increment(released.len() as u64);
            for reservation in &released {
                tracing::info!(
                    reservation_id = %reservation.id,
                    group_id = %reservation.group_id,
                    item_id = %reservation.item_id,
                    "Expired reservation released"
                );
            }
            self.invalidate_read_views().await;
        }

        Ok(released.len())
    }
}
