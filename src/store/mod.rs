//! Persistence port for inventories and their items.
//!
//! The service layer only talks to [`InventoryStore`]; [`SqliteStore`] is the
//! implementation the server runs with.

use async_trait::async_trait;

mod sqlite;

pub use sqlite::SqliteStore;

pub(crate) const STORE_TARGET: &str = "home_inventory::store";

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Inventory {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Item {
    pub id: i64,
    pub inventory_id: i64,
    pub name: String,
    pub count: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to open store at {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: sqlx::Error,
    },

    /// The row violates a schema constraint (unknown inventory, negative count).
    #[error("constraint violated: {0}")]
    Constraint(String),

    #[error("store query failed: {0}")]
    Query(#[from] sqlx::Error),
}

impl StoreError {
    pub(crate) fn from_query(err: sqlx::Error) -> StoreError {
        match err {
            sqlx::Error::Database(db) if !matches!(db.kind(), sqlx::error::ErrorKind::Other) => {
                StoreError::Constraint(db.message().to_string())
            }
            other => StoreError::Query(other),
        }
    }
}

/// Storage operations consumed by [`crate::service::InventoryService`].
///
/// Implementations are shared by every connection handler at once, so they
/// must be safe to call concurrently. Id assignment is the store's job.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// All inventories, ordered by id.
    async fn list_inventories(&self) -> Result<Vec<Inventory>, StoreError>;

    /// Inserts an inventory and returns its id.
    async fn create_inventory(
        &self,
        name: &str,
        description: &str,
        created_at: &str,
    ) -> Result<i64, StoreError>;

    /// Items belonging to `inventory_id`, ordered by id.
    async fn list_items(&self, inventory_id: i64) -> Result<Vec<Item>, StoreError>;

    /// Inserts an item and returns its id.
    async fn create_item(&self, inventory_id: i64, name: &str, count: i64)
        -> Result<i64, StoreError>;
}
