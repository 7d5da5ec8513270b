use std::sync::Arc;

use keyspace::KeyValueStore;
use ledger::InventoryStore;
use reservation::{CatalogService, CoordinatorConfig, ReservationCoordinator};
use serde::Serialize;

/// Names of the backends the process runs on, reported by `/health`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Backends {
    pub ledger: &'static str,
    pub keyspace: &'static str,
}

impl Backends {
    pub const IN_MEMORY: Backends = Backends {
        ledger: "memory",
        keyspace: "memory",
    };
}

/// Shared application state accessible from all handlers.
pub struct AppState<L, K> {
    pub coordinator: Arc<ReservationCoordinator<L, K>>,
    pub catalog: CatalogService<L, K>,
    pub backends: Backends,
}

impl<L, K> AppState<L, K>
where
    L: InventoryStore + Clone,
    K: KeyValueStore + Clone,
{
    /// Wires the coordinator and the catalog onto the same store and keyspace.
    pub fn new(store: L, keyspace: K, config: CoordinatorConfig, backends: Backends) -> Self {
        Self {
            coordinator: Arc::new(ReservationCoordinator::new(
                store.clone(),
                keyspace.clone(),
                config,
            )),
            catalog: CatalogService::new(store, keyspace),
            backends,
        }
    }
}
