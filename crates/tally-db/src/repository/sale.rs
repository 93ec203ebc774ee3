//! # Sale Repository
//!
//! Sale headers, lines and per-batch depletion records.
//!
//! ## Rows Per Sale
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  sales (1)                                                              │
//! │   ├── sale_items (1 per line)                                           │
//! │   │     └── sale_item_batches (1 per consumed batch, frozen cost)       │
//! │   └── journal_entry_id ──► journal_entries (source_type = 'sale')       │
//! │                                                                         │
//! │  cogs(sale) = Σ sale_item_batches.total_cost                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::DbResult;
use tally_core::inventory::BatchDepletion;
use tally_core::money::{line_total, Currency};
use tally_core::types::{Sale, SaleItem, SaleItemBatch};
use tally_core::CoreError;

const SELECT_SALE: &str = "SELECT id, invoice_number, customer_id, idempotency_key, currency, exchange_rate, \
     subtotal, discount, tax, total, paid_amount, due_amount, cogs, profit, margin_bps, \
     journal_entry_id, created_by, created_at \
     FROM sales";

/// Header values of a sale, computed before anything is written.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSale {
    pub invoice_number: String,
    pub customer_id: Option<i64>,
    pub idempotency_key: Option<String>,
    pub currency: Currency,
    pub exchange_rate: f64,
    pub subtotal: i64,
    pub discount: i64,
    pub tax: i64,
    pub total: i64,
    pub paid_amount: i64,
    pub due_amount: i64,
    pub cogs: i64,
    pub profit: i64,
    pub margin_bps: i64,
    pub created_by: String,
}

pub struct SaleRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> SaleRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        SaleRepository { conn }
    }

    pub async fn find_by_idempotency_key(&mut self, key: &str) -> DbResult<Option<Sale>> {
        let sql = format!("{} WHERE idempotency_key = ?1", SELECT_SALE);
        let sale = sqlx::query_as::<_, Sale>(&sql)
            .bind(key)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(sale)
    }

    pub async fn get(&mut self, id: i64) -> DbResult<Sale> {
        let sql = format!("{} WHERE id = ?1", SELECT_SALE);
        sqlx::query_as::<_, Sale>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?
            .ok_or_else(|| CoreError::not_found("Sale", id).into())
    }

    pub async fn insert(&mut self, sale: &NewSale) -> DbResult<Sale> {
        let result = sqlx::query(
            "INSERT INTO sales ( \
                invoice_number, customer_id, idempotency_key, currency, exchange_rate, \
                subtotal, discount, tax, total, paid_amount, due_amount, \
                cogs, profit, margin_bps, created_by, created_at \
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
        )
        .bind(&sale.invoice_number)
        .bind(sale.customer_id)
        .bind(&sale.idempotency_key)
        .bind(sale.currency)
        .bind(sale.exchange_rate)
        .bind(sale.subtotal)
        .bind(sale.discount)
        .bind(sale.tax)
        .bind(sale.total)
        .bind(sale.paid_amount)
        .bind(sale.due_amount)
        .bind(sale.cogs)
        .bind(sale.profit)
        .bind(sale.margin_bps)
        .bind(&sale.created_by)
        .bind(Utc::now())
        .execute(&mut *self.conn)
        .await?;

        debug!(
            id = result.last_insert_rowid(),
            invoice_number = %sale.invoice_number,
            total = sale.total,
            cogs = sale.cogs,
            "Sale inserted"
        );
        self.get(result.last_insert_rowid()).await
    }

    pub async fn insert_item(
        &mut self,
        sale_id: i64,
        product_id: i64,
        quantity: i64,
        unit_price: i64,
        cogs: i64,
    ) -> DbResult<SaleItem> {
        let line_total = line_total(unit_price, quantity).map_err(CoreError::from)?;
        let result = sqlx::query(
            "INSERT INTO sale_items (sale_id, product_id, quantity, unit_price, line_total, cogs) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(sale_id)
        .bind(product_id)
        .bind(quantity)
        .bind(unit_price)
        .bind(line_total)
        .bind(cogs)
        .execute(&mut *self.conn)
        .await?;

        Ok(SaleItem {
            id: result.last_insert_rowid(),
            sale_id,
            product_id,
            quantity,
            unit_price,
            line_total,
            cogs,
        })
    }

    /// Records one consumed batch for a sale line.
    pub async fn insert_item_batch(
        &mut self,
        sale_id: i64,
        sale_item_id: i64,
        depletion: &BatchDepletion,
    ) -> DbResult<SaleItemBatch> {
        let result = sqlx::query(
            "INSERT INTO sale_item_batches ( \
                sale_id, sale_item_id, batch_id, quantity, cost_per_unit, total_cost \
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(sale_id)
        .bind(sale_item_id)
        .bind(depletion.batch_id)
        .bind(depletion.quantity)
        .bind(depletion.cost_per_unit)
        .bind(depletion.total_cost)
        .execute(&mut *self.conn)
        .await?;

        Ok(SaleItemBatch {
            id: result.last_insert_rowid(),
            sale_id,
            sale_item_id,
            batch_id: depletion.batch_id,
            quantity: depletion.quantity,
            cost_per_unit: depletion.cost_per_unit,
            total_cost: depletion.total_cost,
        })
    }

    pub async fn set_journal_entry(&mut self, sale_id: i64, journal_entry_id: i64) -> DbResult<()> {
        sqlx::query("UPDATE sales SET journal_entry_id = ?1 WHERE id = ?2")
            .bind(journal_entry_id)
            .bind(sale_id)
            .execute(&mut *self.conn)
            .await?;
        Ok(())
    }

    pub async fn items(&mut self, sale_id: i64) -> DbResult<Vec<SaleItem>> {
        let items = sqlx::query_as::<_, SaleItem>(
            "SELECT id, sale_id, product_id, quantity, unit_price, line_total, cogs \
             FROM sale_items WHERE sale_id = ?1 ORDER BY id",
        )
        .bind(sale_id)
        .fetch_all(&mut *self.conn)
        .await?;
        Ok(items)
    }

    pub async fn item_batches(&mut self, sale_id: i64) -> DbResult<Vec<SaleItemBatch>> {
        let batches = sqlx::query_as::<_, SaleItemBatch>(
            "SELECT id, sale_id, sale_item_id, batch_id, quantity, cost_per_unit, total_cost \
             FROM sale_item_batches WHERE sale_id = ?1 ORDER BY id",
        )
        .bind(sale_id)
        .fetch_all(&mut *self.conn)
        .await?;
        Ok(batches)
    }

    /// COGS rebuilt from depletion records.
    pub async fn reconstructed_cogs(&mut self, sale_id: i64) -> DbResult<i64> {
        let cogs: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(total_cost), 0) FROM sale_item_batches WHERE sale_id = ?1",
        )
        .bind(sale_id)
        .fetch_one(&mut *self.conn)
        .await?;
        Ok(cogs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::repository::batch::{BatchRepository, NewBatch};
    use crate::repository::product::ProductRepository;

    #[tokio::test]
    async fn test_sale_rows_and_reconstructed_cogs() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut conn = db.acquire().await.unwrap();

        let product = ProductRepository::new(&mut *conn)
            .create("TEA-1", "Black tea")
            .await
            .unwrap();
        let mut batches = BatchRepository::new(&mut *conn);
        let batch = batches
            .create(&NewBatch {
                product_id: product.id,
                batch_number: "T1".to_string(),
                expiry_date: None,
                cost_per_unit: 600,
            })
            .await
            .unwrap();
        batches.receive(batch.id, 10).await.unwrap();
        let plan = batches.deplete(product.id, 3).await.unwrap();

        let mut repo = SaleRepository::new(&mut *conn);
        let sale = repo
            .insert(&NewSale {
                invoice_number: "INV-1".to_string(),
                customer_id: None,
                idempotency_key: Some("sale-1".to_string()),
                currency: Currency::Iqd,
                exchange_rate: 1.0,
                subtotal: 3000,
                discount: 0,
                tax: 0,
                total: 3000,
                paid_amount: 3000,
                due_amount: 0,
                cogs: plan.total_cost,
                profit: 3000 - plan.total_cost,
                margin_bps: 4000,
                created_by: "u1".to_string(),
            })
            .await
            .unwrap();
        let item = repo
            .insert_item(sale.id, product.id, 3, 1000, plan.total_cost)
            .await
            .unwrap();
        for step in &plan.depletions {
            repo.insert_item_batch(sale.id, item.id, step).await.unwrap();
        }

        assert_eq!(item.line_total, 3000);
        assert_eq!(repo.reconstructed_cogs(sale.id).await.unwrap(), 1800);
        assert_eq!(repo.items(sale.id).await.unwrap().len(), 1);
        assert_eq!(repo.item_batches(sale.id).await.unwrap()[0].cost_per_unit, 600);

        let found = repo.find_by_idempotency_key("sale-1").await.unwrap().unwrap();
        assert_eq!(found.id, sale.id);
        assert_eq!(found.journal_entry_id, None);
    }
}
