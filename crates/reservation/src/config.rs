use std::time::Duration;

/// Timing knobs of the coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// TTL of the item lock taken while reserving.
    pub lock_ttl: Duration,
    /// TTL of the item lock taken for direct deductions.
    pub deduct_lock_ttl: Duration,
    /// How long a pending reservation holds stock before it expires.
    pub reservation_window: chrono::Duration,
    /// Retention of stored results for idempotent replay.
    pub idempotency_ttl: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            lock_ttl: Duration::from_secs(10),
            deduct_lock_ttl: Duration::from_secs(5),
            reservation_window: chrono::Duration::minutes(10),
            idempotency_ttl: Duration::from_secs(60 * 60),
        }
    }
}
