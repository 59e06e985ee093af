use std::sync::Arc;

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::store::{Inventory, InventoryStore, Item, StoreError};

const SERVICE_TARGET: &str = "home_inventory::service";

/// Format of the `created_at` stamp put on new inventories.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Inventory as listed to clients; the creation stamp stays server-side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub id: i64,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub id: i64,
    pub inventory_id: i64,
    pub name: String,
    pub count: i64,
}

impl From<Inventory> for InventoryRecord {
    fn from(row: Inventory) -> Self {
        InventoryRecord {
            id: row.id,
            name: row.name,
            description: row.description,
        }
    }
}

impl From<Item> for ItemRecord {
    fn from(row: Item) -> Self {
        ItemRecord {
            id: row.id,
            inventory_id: row.inventory_id,
            name: row.name,
            count: row.count,
        }
    }
}

/// Business operations shared by every connection handler.
///
/// Cloning is cheap: all clones point at the same store. Store failures are
/// logged here and handed back to the caller untouched.
#[derive(Clone)]
pub struct InventoryService {
    store: Arc<dyn InventoryStore>,
}

impl InventoryService {
    pub fn new(store: Arc<dyn InventoryStore>) -> InventoryService {
        InventoryService { store }
    }

    pub async fn create_inventory(&self, name: &str, description: &str) -> Result<i64, StoreError> {
        self.create_inventory_at(name, description, Local::now().naive_local())
            .await
    }

    pub async fn create_inventory_at(
        &self,
        name: &str,
        description: &str,
        created_at: NaiveDateTime,
    ) -> Result<i64, StoreError> {
        let created_at = created_at.format(TIMESTAMP_FORMAT).to_string();

        self.store
            .create_inventory(name, description, &created_at)
            .await
            .inspect_err(|err| warn!(target: SERVICE_TARGET, error = %err, "create_inventory failed"))
    }

    pub async fn list_inventories(&self) -> Result<Vec<InventoryRecord>, StoreError> {
        let rows = self
            .store
            .list_inventories()
            .await
            .inspect_err(|err| warn!(target: SERVICE_TARGET, error = %err, "list_inventories failed"))?;

        Ok(rows.into_iter().map(InventoryRecord::from).collect())
    }

    pub async fn list_items(&self, inventory_id: i64) -> Result<Vec<ItemRecord>, StoreError> {
        let rows = self.store.list_items(inventory_id).await.inspect_err(|err| {
            warn!(target: SERVICE_TARGET, inventory_id, error = %err, "list_items failed")
        })?;

        Ok(rows.into_iter().map(ItemRecord::from).collect())
    }

    pub async fn add_item(
        &self,
        inventory_id: i64,
        name: &str,
        count: i64,
    ) -> Result<i64, StoreError> {
        self.store
            .create_item(inventory_id, name, count)
            .await
            .inspect_err(|err| {
                warn!(target: SERVICE_TARGET, inventory_id, error = %err, "add_item failed")
            })
    }
}

impl std::fmt::Debug for InventoryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InventoryService").finish_non_exhaustive()
    }
}
