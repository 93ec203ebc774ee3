//! # Purchase Repository
//!
//! Purchase headers and received lines. Each line lands in exactly one
//! batch; batch resolution lives in the posting use case.

use chrono::Utc;
use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::DbResult;
use tally_core::money::{line_total, Currency};
use tally_core::types::{Purchase, PurchaseItem};
use tally_core::CoreError;

const SELECT_PURCHASE: &str = "SELECT id, invoice_number, supplier_id, idempotency_key, currency, exchange_rate, \
     total, paid_amount, due_amount, journal_entry_id, created_by, created_at \
     FROM purchases";

#[derive(Debug, Clone, PartialEq)]
pub struct NewPurchase {
    pub invoice_number: String,
    pub supplier_id: i64,
    pub idempotency_key: Option<String>,
    pub currency: Currency,
    pub exchange_rate: f64,
    pub total: i64,
    pub paid_amount: i64,
    pub due_amount: i64,
    pub created_by: String,
}

pub struct PurchaseRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> PurchaseRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        PurchaseRepository { conn }
    }

    pub async fn find_by_idempotency_key(&mut self, key: &str) -> DbResult<Option<Purchase>> {
        let sql = format!("{} WHERE idempotency_key = ?1", SELECT_PURCHASE);
        let purchase = sqlx::query_as::<_, Purchase>(&sql)
            .bind(key)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(purchase)
    }

    pub async fn get(&mut self, id: i64) -> DbResult<Purchase> {
        let sql = format!("{} WHERE id = ?1", SELECT_PURCHASE);
        sqlx::query_as::<_, Purchase>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?
            .ok_or_else(|| CoreError::not_found("Purchase", id).into())
    }

    pub async fn insert(&mut self, purchase: &NewPurchase) -> DbResult<Purchase> {
        let result = sqlx::query(
            "INSERT INTO purchases ( \
                invoice_number, supplier_id, idempotency_key, currency, exchange_rate, \
                total, paid_amount, due_amount, created_by, created_at \
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )
        .bind(&purchase.invoice_number)
        .bind(purchase.supplier_id)
        .bind(&purchase.idempotency_key)
        .bind(purchase.currency)
        .bind(purchase.exchange_rate)
        .bind(purchase.total)
        .bind(purchase.paid_amount)
        .bind(purchase.due_amount)
        .bind(&purchase.created_by)
        .bind(Utc::now())
        .execute(&mut *self.conn)
        .await?;

        debug!(
            id = result.last_insert_rowid(),
            supplier_id = purchase.supplier_id,
            total = purchase.total,
            "Purchase inserted"
        );
        self.get(result.last_insert_rowid()).await
    }

    pub async fn insert_item(
        &mut self,
        purchase_id: i64,
        product_id: i64,
        batch_id: i64,
        quantity: i64,
        cost_per_unit: i64,
    ) -> DbResult<PurchaseItem> {
        let line_total = line_total(cost_per_unit, quantity).map_err(CoreError::from)?;
        let result = sqlx::query(
            "INSERT INTO purchase_items (purchase_id, product_id, batch_id, quantity, cost_per_unit, line_total) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(purchase_id)
        .bind(product_id)
        .bind(batch_id)
        .bind(quantity)
        .bind(cost_per_unit)
        .bind(line_total)
        .execute(&mut *self.conn)
        .await?;

        Ok(PurchaseItem {
            id: result.last_insert_rowid(),
            purchase_id,
            product_id,
            batch_id,
            quantity,
            cost_per_unit,
            line_total,
        })
    }

    pub async fn set_journal_entry(&mut self, purchase_id: i64, journal_entry_id: i64) -> DbResult<()> {
        sqlx::query("UPDATE purchases SET journal_entry_id = ?1 WHERE id = ?2")
            .bind(journal_entry_id)
            .bind(purchase_id)
            .execute(&mut *self.conn)
            .await?;
        Ok(())
    }

    pub async fn items(&mut self, purchase_id: i64) -> DbResult<Vec<PurchaseItem>> {
        let items = sqlx::query_as::<_, PurchaseItem>(
            "SELECT id, purchase_id, product_id, batch_id, quantity, cost_per_unit, line_total \
             FROM purchase_items WHERE purchase_id = ?1 ORDER BY id",
        )
        .bind(purchase_id)
        .fetch_all(&mut *self.conn)
        .await?;
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use crate::pool::{Database, DbConfig};
    use crate::repository::counterparty::CounterpartyRepository;
    use tally_core::ledger::CounterpartyKind;

    #[tokio::test]
    async fn test_insert_and_reload() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut conn = db.acquire().await.unwrap();
        let supplier = CounterpartyRepository::new(&mut *conn)
            .create(CounterpartyKind::Supplier, "Basra Foods", None, 0)
            .await
            .unwrap();

        let mut repo = PurchaseRepository::new(&mut *conn);
        let purchase = repo
            .insert(&NewPurchase {
                invoice_number: "SUP-881".to_string(),
                supplier_id: supplier.id,
                idempotency_key: Some("p-1".to_string()),
                currency: Currency::Usd,
                exchange_rate: 1310.0,
                total: 12_000,
                paid_amount: 2_000,
                due_amount: 10_000,
                created_by: "u1".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(purchase.currency, Currency::Usd);
        assert_eq!(purchase.exchange_rate, 1310.0);
        let found = repo.find_by_idempotency_key("p-1").await.unwrap().unwrap();
        assert_eq!(found.id, purchase.id);
        assert!(matches!(
            repo.get(999).await,
            Err(DbError::Domain(CoreError::NotFound { .. }))
        ));
    }
}
