//! # Product Repository
//!
//! Products, their cached stock and the inventory movement audit trail.
//!
//! ## Stock Changes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  adjust_stock(product, +qty / -qty, movement)                           │
//! │       │                                                                 │
//! │       ├── read current_stock          (stock_before)                   │
//! │       ├── UPDATE current_stock += qty (stock_after)                    │
//! │       └── INSERT inventory_movements { before, after, reference }      │
//! │                                                                         │
//! │  Purchases add (+), sales subtract (-). The batches hold the real      │
//! │  quantities; current_stock is the fast-read copy.                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::DbResult;
use tally_core::types::{InventoryMovement, MovementType, Product};
use tally_core::CoreError;

const SELECT_PRODUCT: &str = "SELECT id, sku, name, current_stock, is_active, created_at, updated_at \
     FROM products";

/// What caused a stock change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockChange<'a> {
    pub product_id: i64,
    pub batch_id: Option<i64>,
    pub movement_type: MovementType,
    /// Signed quantity.
    pub quantity: i64,
    pub reference_type: &'a str,
    pub reference_id: i64,
    pub created_by: &'a str,
}

pub struct ProductRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> ProductRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        ProductRepository { conn }
    }

    /// Creates a product with zero stock.
    pub async fn create(&mut self, sku: &str, name: &str) -> DbResult<Product> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO products (sku, name, current_stock, is_active, created_at, updated_at) \
             VALUES (?1, ?2, 0, 1, ?3, ?3)",
        )
        .bind(sku)
        .bind(name)
        .bind(now)
        .execute(&mut *self.conn)
        .await?;

        debug!(id = result.last_insert_rowid(), sku = %sku, "Product created");
        self.get(result.last_insert_rowid()).await
    }

    pub async fn find(&mut self, id: i64) -> DbResult<Option<Product>> {
        let sql = format!("{} WHERE id = ?1", SELECT_PRODUCT);
        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(product)
    }

    /// Loads a product, `NotFound` if absent.
    pub async fn get(&mut self, id: i64) -> DbResult<Product> {
        self.find(id)
            .await?
            .ok_or_else(|| CoreError::not_found("Product", id).into())
    }

    pub async fn count(&mut self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&mut *self.conn)
            .await?;
        Ok(count)
    }

    /// Moves the cached stock and records the movement.
    pub async fn adjust_stock(&mut self, change: &StockChange<'_>) -> DbResult<InventoryMovement> {
        let product = self.get(change.product_id).await?;
        let stock_before = product.current_stock;
        let stock_after = stock_before + change.quantity;
        let now = Utc::now();

        sqlx::query("UPDATE products SET current_stock = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(stock_after)
            .bind(now)
            .bind(change.product_id)
            .execute(&mut *self.conn)
            .await?;

        let result = sqlx::query(
            "INSERT INTO inventory_movements ( \
                product_id, batch_id, movement_type, quantity, stock_before, stock_after, \
                reference_type, reference_id, created_by, created_at \
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )
        .bind(change.product_id)
        .bind(change.batch_id)
        .bind(change.movement_type)
        .bind(change.quantity)
        .bind(stock_before)
        .bind(stock_after)
        .bind(change.reference_type)
        .bind(change.reference_id)
        .bind(change.created_by)
        .bind(now)
        .execute(&mut *self.conn)
        .await?;

        debug!(
            product_id = change.product_id,
            quantity = change.quantity,
            stock_before,
            stock_after,
            "Stock adjusted"
        );

        Ok(InventoryMovement {
            id: result.last_insert_rowid(),
            product_id: change.product_id,
            batch_id: change.batch_id,
            movement_type: change.movement_type,
            quantity: change.quantity,
            stock_before,
            stock_after,
            reference_type: change.reference_type.to_string(),
            reference_id: change.reference_id,
            created_by: change.created_by.to_string(),
            created_at: now,
        })
    }

    /// Movement history of a product, oldest first.
    pub async fn movements(&mut self, product_id: i64) -> DbResult<Vec<InventoryMovement>> {
        let movements = sqlx::query_as::<_, InventoryMovement>(
            "SELECT id, product_id, batch_id, movement_type, quantity, stock_before, stock_after, \
                    reference_type, reference_id, created_by, created_at \
             FROM inventory_movements WHERE product_id = ?1 ORDER BY id",
        )
        .bind(product_id)
        .fetch_all(&mut *self.conn)
        .await?;
        Ok(movements)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
