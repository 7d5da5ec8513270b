use std::time::Duration;

use common::ItemId;
use keyspace::{KeyValueStore, ReadCache};
use ledger::{InventoryStore, Item, ItemUpdate, LedgerError, NewItem};

use crate::{ReservationError, Result};

/// Pattern covering every derived item view.
pub const ITEM_VIEWS_PATTERN: &str = "items:*";

const ITEM_LIST_KEY: &str = "items:list";
const ITEM_TTL: Duration = Duration::from_secs(5 * 60);
const ITEM_LIST_TTL: Duration = Duration::from_secs(2 * 60);

fn item_key(item_id: ItemId) -> String {
    format!("items:{item_id}")
}

/// Item catalog access with read-through caching of single items and the
/// full listing. Every mutation evicts all item views.
pub struct CatalogService<L, K> {
    store: L,
    cache: ReadCache<K>,
}

impl<L, K> CatalogService<L, K>
where
    L: InventoryStore,
    K: KeyValueStore,
{
    pub fn new(store: L, keyspace: K) -> Self {
        Self {
            store,
            cache: ReadCache::new(keyspace),
        }
    }

    #[tracing::instrument(skip_all, fields(code = %item.code))]
    pub async fn create_item(&self, item: NewItem) -> Result<Item> {
        let code = item.code.trim();
        if code.is_empty() || item.description.trim().is_empty() {
            return Err(ReservationError::InvalidInput(
                "code and description are required".to_string(),
            ));
        }
        if item.balance < 0 {
            return Err(LedgerError::NegativeBalance(code.to_string()).into());
        }

        let created = self
            .store
            .create_item(NewItem {
                code: code.to_string(),
                ..item
            })
            .await?;
        self.cache.invalidate(ITEM_VIEWS_PATTERN).await;

        tracing::info!(item_id = %created.id, "Item created");
        Ok(created)
    }

    pub async fn get_item(&self, item_id: ItemId) -> Result<Item> {
        let key = item_key(item_id);
        if let Some(item) = self.cache.get::<Item>(&key).await {
            return Ok(item);
        }

        let item = self.store.get_item(item_id).await?;
        self.cache.put(&key, &item, ITEM_TTL).await;
        Ok(item)
    }

    pub async fn list_items(&self) -> Result<Vec<Item>> {
        if let Some(items) = self.cache.get::<Vec<Item>>(ITEM_LIST_KEY).await {
            return Ok(items);
        }

        let items = self.store.list_items().await?;
        self.cache.put(ITEM_LIST_KEY, &items, ITEM_LIST_TTL).await;
        Ok(items)
    }

    /// Searches code and description. A blank term matches nothing.
    pub async fn search_items(&self, term: &str) -> Result<Vec<Item>> {
        let term = term.trim();
        if term.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.store.search_items(term).await?)
    }

    #[tracing::instrument(skip_all, fields(item_id = %item_id))]
    pub async fn update_item(&self, item_id: ItemId, update: ItemUpdate) -> Result<Item> {
        if let Some(balance) = update.balance
            && balance < 0
        {
            return Err(LedgerError::NegativeBalance(item_id.to_string()).into());
        }

        let updated = self.store.update_item(item_id, update).await?;
        self.cache.invalidate(ITEM_VIEWS_PATTERN).await;
        Ok(updated)
    }

    #[tracing::instrument(skip_all, fields(item_id = %item_id))]
    pub async fn delete_item(&self, item_id: ItemId) -> Result<()> {
        self.store.delete_item(item_id).await?;
        self.cache.invalidate(ITEM_VIEWS_PATTERN).await;
        tracing::info!("Item deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyspace::InMemoryKeyValueStore;
    use ledger::{InMemoryStockLedger, StockLedger};

    fn widget(balance: i64) -> NewItem {
        NewItem {
            code: "  SKU-001 ".into(),
            description: "Widget".into(),
            balance,
        }
    }

    fn service() -> (
        CatalogService<InMemoryStockLedger, InMemoryKeyValueStore>,
        InMemoryStockLedger,
        InMemoryKeyValueStore,
    ) {
        let ledger = InMemoryStockLedger::new();
        let keyspace = InMemoryKeyValueStore::new();
        (
            CatalogService::new(ledger.clone(), keyspace.clone()),
            ledger,
            keyspace,
        )
    }

    #[tokio::test]
    async fn create_trims_code_and_validates() {
        let (catalog, _, _) = service();

        let item = catalog.create_item(widget(5)).await.unwrap();
        assert_eq!(item.code, "SKU-001");

        assert!(matches!(
            catalog.create_item(widget(-1)).await,
            Err(ReservationError::Ledger(LedgerError::NegativeBalance(_)))
        ));
        assert!(matches!(
            catalog
                .create_item(NewItem {
                    code: " ".into(),
                    description: "x".into(),
                    balance: 1
                })
                .await,
            Err(ReservationError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn get_reads_through_the_cache() {
        let (catalog, ledger, keyspace) = service();
        let item = catalog.create_item(widget(5)).await.unwrap();

        catalog.get_item(item.id).await.unwrap();
        assert!(keyspace.exists(&item_key(item.id)).await.unwrap());

        // A ledger write outside the service is not visible until eviction.
        ledger
            .reserve(ledger::NewReservation {
                item_id: item.id,
                group_id: common::GroupId::new(),
                quantity: 2,
                expires_at: chrono::Utc::now() + chrono::Duration::minutes(10),
            })
            .await
            .unwrap();
        assert_eq!(catalog.get_item(item.id).await.unwrap().reserved, 0);

        catalog
            .update_item(item.id, ItemUpdate::default())
            .await
            .unwrap();
        assert_eq!(catalog.get_item(item.id).await.unwrap().reserved, 2);
    }

    #[tokio::test]
    async fn mutations_evict_the_listing() {
        let (catalog, _, keyspace) = service();
        catalog.create_item(widget(5)).await.unwrap();

        assert_eq!(catalog.list_items().await.unwrap().len(), 1);
        assert!(keyspace.exists(ITEM_LIST_KEY).await.unwrap());

        catalog
            .create_item(NewItem {
                code: "SKU-002".into(),
                description: "Gadget".into(),
                balance: 1,
            })
            .await
            .unwrap();
        assert!(!keyspace.exists(ITEM_LIST_KEY).await.unwrap());
        assert_eq!(catalog.list_items().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn blank_search_matches_nothing() {
        let (catalog, _, _) = service();
        catalog.create_item(widget(5)).await.unwrap();

        assert!(catalog.search_items("   ").await.unwrap().is_empty());
        assert_eq!(catalog.search_items("widg").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn cache_outage_falls_back_to_the_store() {
        let (catalog, _, keyspace) = service();
        let item = catalog.create_item(widget(5)).await.unwrap();
        keyspace.set_fail_writes(true).await;

        assert_eq!(catalog.get_item(item.id).await.unwrap().id, item.id);
        catalog.delete_item(item.id).await.unwrap();
        assert!(matches!(
            catalog.get_item(item.id).await,
            Err(ReservationError::Ledger(LedgerError::ItemNotFound(_)))
        ));
    }
}
