//! # Batch Repository
//!
//! Applies FEFO depletion plans and purchase receipts to `product_batches`.
//!
//! ## Depletion
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  deplete(product, qty)                                                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SELECT active batches with stock  ──►  plan_depletion (tally-core)     │
//! │                                              │                          │
//! │                  InsufficientStock ◄─────────┤ nothing updated          │
//! │                                              ▼                          │
//! │  UPDATE quantity_on_hand, status = 'exhausted' when it hits 0          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The plan is computed before the first UPDATE, so a failed depletion
//! never leaves a batch partially decremented even before rollback.

use chrono::{NaiveDate, Utc};
use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::DbResult;
use tally_core::inventory::{plan_depletion, BatchDepletion, BatchStatus, DepletionPlan, ProductBatch};
use tally_core::CoreError;

const SELECT_BATCH: &str = "SELECT id, product_id, batch_number, expiry_date, quantity_received, \
     quantity_on_hand, cost_per_unit, status, created_at \
     FROM product_batches";

/// Input for a new batch. Quantities start at zero; stock arrives through
/// [`BatchRepository::receive`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBatch {
    pub product_id: i64,
    pub batch_number: String,
    pub expiry_date: Option<NaiveDate>,
    pub cost_per_unit: i64,
}

pub struct BatchRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> BatchRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        BatchRepository { conn }
    }

    /// Consumable batches of one product, in id order.
    pub async fn list_candidates(&mut self, product_id: i64) -> DbResult<Vec<ProductBatch>> {
        let sql = format!(
            "{} WHERE product_id = ?1 AND status = 'active' AND quantity_on_hand > 0 ORDER BY id",
            SELECT_BATCH
        );
        let batches = sqlx::query_as::<_, ProductBatch>(&sql)
            .bind(product_id)
            .fetch_all(&mut *self.conn)
            .await?;
        Ok(batches)
    }

    /// Every batch of a product, including exhausted ones.
    pub async fn list_for_product(&mut self, product_id: i64) -> DbResult<Vec<ProductBatch>> {
        let sql = format!("{} WHERE product_id = ?1 ORDER BY id", SELECT_BATCH);
        let batches = sqlx::query_as::<_, ProductBatch>(&sql)
            .bind(product_id)
            .fetch_all(&mut *self.conn)
            .await?;
        Ok(batches)
    }

    /// Sum of `quantity_on_hand` over active batches with stock.
    pub async fn get_available_stock(&mut self, product_id: i64) -> DbResult<i64> {
        let available: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(quantity_on_hand), 0) FROM product_batches \
             WHERE product_id = ?1 AND status = 'active' AND quantity_on_hand > 0",
        )
        .bind(product_id)
        .fetch_one(&mut *self.conn)
        .await?;
        Ok(available)
    }

    /// Depletes `quantity` units in FEFO order and returns the frozen costs.
    pub async fn deplete(&mut self, product_id: i64, quantity: i64) -> DbResult<DepletionPlan> {
        let candidates = self.list_candidates(product_id).await?;
        let plan = plan_depletion(product_id, &candidates, quantity)?;

        for step in &plan.depletions {
            self.apply_depletion(step).await?;
        }

        debug!(
            product_id,
            quantity,
            batches = plan.depletions.len(),
            total_cost = plan.total_cost,
            "Batches depleted"
        );
        Ok(plan)
    }

    /// Writes one planned step. The batch must still hold exactly the
    /// quantity the plan was computed from.
    async fn apply_depletion(&mut self, step: &BatchDepletion) -> DbResult<()> {
        let status = if step.exhausts_batch() {
            BatchStatus::Exhausted
        } else {
            BatchStatus::Active
        };
        let result = sqlx::query(
            "UPDATE product_batches SET quantity_on_hand = ?1, status = ?2 \
             WHERE id = ?3 AND quantity_on_hand = ?4",
        )
        .bind(step.remaining)
        .bind(status)
        .bind(step.batch_id)
        .bind(step.remaining + step.quantity)
        .execute(&mut *self.conn)
        .await?;

        if result.rows_affected() != 1 {
            return Err(CoreError::conflict(
                "ProductBatch",
                step.batch_id.to_string(),
                "on-hand quantity changed while depleting",
            )
            .into());
        }
        Ok(())
    }

    pub async fn get(&mut self, id: i64) -> DbResult<ProductBatch> {
        let sql = format!("{} WHERE id = ?1", SELECT_BATCH);
        sqlx::query_as::<_, ProductBatch>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?
            .ok_or_else(|| CoreError::not_found("ProductBatch", id).into())
    }

    pub async fn find_by_number(&mut self, product_id: i64, batch_number: &str) -> DbResult<Option<ProductBatch>> {
        let sql = format!("{} WHERE product_id = ?1 AND batch_number = ?2", SELECT_BATCH);
        let batch = sqlx::query_as::<_, ProductBatch>(&sql)
            .bind(product_id)
            .bind(batch_number)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(batch)
    }

    /// Creates an empty active batch.
    pub async fn create(&mut self, batch: &NewBatch) -> DbResult<ProductBatch> {
        let result = sqlx::query(
            "INSERT INTO product_batches ( \
                product_id, batch_number, expiry_date, quantity_received, \
                quantity_on_hand, cost_per_unit, status, created_at \
             ) VALUES (?1, ?2, ?3, 0, 0, ?4, 'active', ?5)",
        )
        .bind(batch.product_id)
        .bind(&batch.batch_number)
        .bind(batch.expiry_date)
        .bind(batch.cost_per_unit)
        .bind(Utc::now())
        .execute(&mut *self.conn)
        .await?;

        debug!(
            id = result.last_insert_rowid(),
            product_id = batch.product_id,
            batch_number = %batch.batch_number,
            "Batch created"
        );
        self.get(result.last_insert_rowid()).await
    }

    /// Adds received units. An exhausted batch becomes active again.
    pub async fn receive(&mut self, batch_id: i64, quantity: i64) -> DbResult<ProductBatch> {
        let result = sqlx::query(
            "UPDATE product_batches \
             SET quantity_received = quantity_received + ?1, \
                 quantity_on_hand = quantity_on_hand + ?1, \
                 status = 'active' \
             WHERE id = ?2",
        )
        .bind(quantity)
        .bind(batch_id)
        .execute(&mut *self.conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::not_found("ProductBatch", batch_id).into());
        }

        debug!(batch_id, quantity, "Batch received");
        self.get(batch_id).await
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use crate::pool::{Database, DbConfig};
    use crate::repository::product::ProductRepository;

    async fn setup() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    async fn stocked(conn: &mut SqliteConnection, product_id: i64, number: &str, expiry: Option<&str>, qty: i64, cost: i64) -> i64 {
        let mut repo = BatchRepository::new(conn);
        let batch = repo
            .create(&NewBatch {
                product_id,
                batch_number: number.to_string(),
                expiry_date: expiry.map(date),
                cost_per_unit: cost,
            })
            .await
            .unwrap();
        repo.receive(batch.id, qty).await.unwrap();
        batch.id
    }

    #[tokio::test]
    async fn test_fefo_depletion_against_stored_batches() {
        let db = setup().await;
        let mut conn = db.acquire().await.unwrap();
        let product = ProductRepository::new(&mut *conn)
            .create("MED-1", "Amoxicillin 500mg")
            .await
            .unwrap();

        let b1 = stocked(&mut *conn, product.id, "L1", None, 5, 100).await;
        let b2 = stocked(&mut *conn, product.id, "L2", Some("2025-01-01"), 3, 110).await;
        let b3 = stocked(&mut *conn, product.id, "L3", Some("2024-06-01"), 2, 120).await;

        let mut repo = BatchRepository::new(&mut *conn);
        let plan = repo.deplete(product.id, 4).await.unwrap();

        assert_eq!(plan.depletions[0].batch_id, b3);
        assert_eq!(plan.depletions[1].batch_id, b2);
        assert_eq!(plan.weighted_average_cost, 115);

        let third = repo.get(b3).await.unwrap();
        assert_eq!(third.quantity_on_hand, 0);
        assert_eq!(third.status, BatchStatus::Exhausted);
        assert_eq!(repo.get(b2).await.unwrap().quantity_on_hand, 1);
        assert_eq!(repo.get(b1).await.unwrap().quantity_on_hand, 5);
        assert_eq!(repo.get_available_stock(product.id).await.unwrap(), 6);
    }

    #[tokio::test]
    async fn test_insufficient_stock_leaves_batches_untouched() {
        let db = setup().await;
        let mut conn = db.acquire().await.unwrap();
        let product = ProductRepository::new(&mut *conn)
            .create("MED-2", "Paracetamol")
            .await
            .unwrap();
        let b1 = stocked(&mut *conn, product.id, "A", None, 2, 50).await;
        let b2 = stocked(&mut *conn, product.id, "B", Some("2027-01-01"), 1, 60).await;

        let mut repo = BatchRepository::new(&mut *conn);
        let err = repo.deplete(product.id, 10).await.unwrap_err();
        match err {
            DbError::Domain(CoreError::InsufficientStock {
                requested, available, ..
            }) => {
                assert_eq!(requested, 10);
                assert_eq!(available, 3);
            }
            other => panic!("expected InsufficientStock, got {:?}", other),
        }

        assert_eq!(repo.get(b1).await.unwrap().quantity_on_hand, 2);
        assert_eq!(repo.get(b2).await.unwrap().quantity_on_hand, 1);
    }

    #[tokio::test]
    async fn test_receive_reactivates_exhausted_batch() {
        let db = setup().await;
        let mut conn = db.acquire().await.unwrap();
        let product = ProductRepository::new(&mut *conn)
            .create("MED-3", "Ibuprofen")
            .await
            .unwrap();
        let id = stocked(&mut *conn, product.id, "X", None, 2, 10).await;

        let mut repo = BatchRepository::new(&mut *conn);
        repo.deplete(product.id, 2).await.unwrap();
        assert_eq!(repo.get(id).await.unwrap().status, BatchStatus::Exhausted);
        assert!(repo.list_candidates(product.id).await.unwrap().is_empty());

        let batch = repo.receive(id, 4).await.unwrap();
        assert_eq!(batch.status, BatchStatus::Active);
        assert_eq!(batch.quantity_on_hand, 4);
        assert_eq!(batch.quantity_received, 6);

        let found = repo.find_by_number(product.id, "X").await.unwrap();
        assert_eq!(found.map(|b| b.id), Some(id));
        assert_eq!(repo.list_for_product(product.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stale_plan_is_rejected() {
        let db = setup().await;
        let mut conn = db.acquire().await.unwrap();
        let product = ProductRepository::new(&mut *conn)
            .create("MED-4", "Cough Syrup")
            .await
            .unwrap();
        let id = stocked(&mut *conn, product.id, "S1", None, 5, 30).await;

        let mut repo = BatchRepository::new(&mut *conn);
        let candidates = repo.list_candidates(product.id).await.unwrap();
        let stale = plan_depletion(product.id, &candidates, 3).unwrap();

        // Someone else takes a unit after the plan was made
        repo.deplete(product.id, 1).await.unwrap();

        let err = repo.apply_depletion(&stale.depletions[0]).await.unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::Conflict { .. })));
        assert_eq!(repo.get(id).await.unwrap().quantity_on_hand, 4);
    }
}
