use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::{debug, info};

use super::{Inventory, InventoryStore, Item, StoreError, STORE_TARGET};

const SCHEMA: [&str; 3] = [
    r#"
    CREATE TABLE IF NOT EXISTS inventories (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        name        TEXT NOT NULL,
        description TEXT NOT NULL,
        created_at  TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS items (
        id           INTEGER PRIMARY KEY AUTOINCREMENT,
        inventory_id INTEGER NOT NULL REFERENCES inventories (id),
        name         TEXT NOT NULL,
        count        INTEGER NOT NULL CHECK (count >= 0)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS items_inventory_id ON items (inventory_id)",
];

/// SQLite-backed [`InventoryStore`].
///
/// `SqlitePool` is `Send + Sync` and cheap to clone, so one store is shared
/// by every connection handler; each call borrows a pooled connection.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if missing) the database at `url`, e.g.
    /// `sqlite://inventory.db`, and makes sure the tables exist.
    pub async fn connect(url: &str) -> Result<SqliteStore, StoreError> {
        let connect_err = |source| StoreError::Connect {
            url: url.to_string(),
            source,
        };

        let options = SqliteConnectOptions::from_str(url)
            .map_err(connect_err)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .map_err(connect_err)?;

        info!(target: STORE_TARGET, url, "sqlite store opened");

        SqliteStore::with_pool(pool).await
    }

    /// A private in-memory database, gone once the store is dropped.
    pub async fn in_memory() -> Result<SqliteStore, StoreError> {
        let url = "sqlite::memory:";
        let connect_err = |source| StoreError::Connect {
            url: url.to_string(),
            source,
        };

        let options = SqliteConnectOptions::from_str(url)
            .map_err(connect_err)?
            .foreign_keys(true);

        // Each connection to `:memory:` is its own database, so the pool must
        // hold exactly one connection and never recycle it.
        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(connect_err)?;

        SqliteStore::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<SqliteStore, StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&pool)
                .await
                .map_err(StoreError::from_query)?;
        }

        Ok(SqliteStore { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl InventoryStore for SqliteStore {
    async fn list_inventories(&self) -> Result<Vec<Inventory>, StoreError> {
        sqlx::query_as::<_, Inventory>(
            "SELECT id, name, description, created_at FROM inventories ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from_query)
    }

    async fn create_inventory(
        &self,
        name: &str,
        description: &str,
        created_at: &str,
    ) -> Result<i64, StoreError> {
        let id = sqlx::query(
            "INSERT INTO inventories (name, description, created_at) VALUES (?1, ?2, ?3)",
        )
        .bind(name)
        .bind(description)
        .bind(created_at)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from_query)?
        .last_insert_rowid();

        debug!(target: STORE_TARGET, id, name, "inventory inserted");

        Ok(id)
    }

    async fn list_items(&self, inventory_id: i64) -> Result<Vec<Item>, StoreError> {
        sqlx::query_as::<_, Item>(
            r#"
            SELECT id, inventory_id, name, count
            FROM items
            WHERE inventory_id = ?1
            ORDER BY id
            "#,
        )
        .bind(inventory_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from_query)
    }

    async fn create_item(
        &self,
        inventory_id: i64,
        name: &str,
        count: i64,
    ) -> Result<i64, StoreError> {
        let id = sqlx::query("INSERT INTO items (inventory_id, name, count) VALUES (?1, ?2, ?3)")
            .bind(inventory_id)
            .bind(name)
            .bind(count)
            .execute(&self.pool)
            .await
            .map_err(StoreError::from_query)?
            .last_insert_rowid();

        debug!(target: STORE_TARGET, id, inventory_id, name, "item inserted");

        Ok(id)
    }
}
