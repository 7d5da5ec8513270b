use std::{sync::Arc, time::Duration};

use keyspace::KeyValueStore;
use ledger::StockLedger;

use crate::ReservationCoordinator;

/// Background task that periodically releases expired pending reservations.
///
/// Runs until the surrounding task is aborted. A failed sweep is logged and
/// retried on the next tick.
pub async fn run_expiry_sweeper<L, K>(
    coordinator: Arc<ReservationCoordinator<L, K>>,
    period: Duration,
) where
    L: StockLedger,
    K: KeyValueStore,
{
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        match coordinator.release_expired_reservations().await {
            Ok(0) => {}
            Ok(released) => tracing::info!(released, "Expired reservations released"),
            Err(e) => tracing::warn!(error = %e, "Expiry sweep failed"),
        }
    }
}
