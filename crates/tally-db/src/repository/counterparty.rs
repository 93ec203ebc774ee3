//! # Counterparty Repository
//!
//! Customers and suppliers share one shape: a name and a cached balance
//! (`customers.total_debt`, `suppliers.current_balance`). The cache is
//! written through by [`super::ledger::LedgerRepository`] and only ever
//! overwritten directly by reconciliation repair.

use chrono::Utc;
use sqlx::SqliteConnection;
use tracing::{debug, warn};

use crate::error::DbResult;
use tally_core::ledger::CounterpartyKind;
use tally_core::types::Counterparty;
use tally_core::CoreError;

fn select_counterparty(kind: CounterpartyKind) -> String {
    format!(
        "SELECT id, '{kind}' AS kind, name, phone, {balance} AS cached_balance, created_at FROM {table}",
        kind = kind,
        balance = kind.balance_column(),
        table = kind.table(),
    )
}

pub struct CounterpartyRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> CounterpartyRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        CounterpartyRepository { conn }
    }

    /// Creates a customer or supplier.
    ///
    /// `opening_balance` seeds the cache without a ledger row; the first
    /// ledger row builds on it. It is also kept unchanged in its own column
    /// as the starting point for chain verification.
    pub async fn create(
        &mut self,
        kind: CounterpartyKind,
        name: &str,
        phone: Option<&str>,
        opening_balance: i64,
    ) -> DbResult<Counterparty> {
        let sql = format!(
            "INSERT INTO {} (name, phone, {}, opening_balance, created_at) VALUES (?1, ?2, ?3, ?3, ?4)",
            kind.table(),
            kind.balance_column()
        );
        let result = sqlx::query(&sql)
            .bind(name)
            .bind(phone)
            .bind(opening_balance)
            .bind(Utc::now())
            .execute(&mut *self.conn)
            .await?;

        debug!(%kind, id = result.last_insert_rowid(), name = %name, "Counterparty created");
        self.get(kind, result.last_insert_rowid()).await
    }

    pub async fn find(&mut self, kind: CounterpartyKind, id: i64) -> DbResult<Option<Counterparty>> {
        let sql = format!("{} WHERE id = ?1", select_counterparty(kind));
        let counterparty = sqlx::query_as::<_, Counterparty>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(counterparty)
    }

    /// Loads a counterparty, `NotFound` if absent.
    pub async fn get(&mut self, kind: CounterpartyKind, id: i64) -> DbResult<Counterparty> {
        self.find(kind, id)
            .await?
            .ok_or_else(|| CoreError::not_found(kind.entity_name(), id).into())
    }

    pub async fn list(&mut self, kind: CounterpartyKind) -> DbResult<Vec<Counterparty>> {
        let sql = format!("{} ORDER BY id", select_counterparty(kind));
        let all = sqlx::query_as::<_, Counterparty>(&sql)
            .fetch_all(&mut *self.conn)
            .await?;
        Ok(all)
    }

    /// Overwrites the cached balance. Reconciliation repair only.
    pub async fn overwrite_cached_balance(&mut self, kind: CounterpartyKind, id: i64, balance: i64) -> DbResult<()> {
        let sql = format!(
            "UPDATE {} SET {} = ?1 WHERE id = ?2",
            kind.table(),
            kind.balance_column()
        );
        let result = sqlx::query(&sql)
            .bind(balance)
            .bind(id)
            .execute(&mut *self.conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::not_found(kind.entity_name(), id).into());
        }
        warn!(%kind, id, balance, "Cached balance overwritten");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use crate::pool::{Database, DbConfig};

    #[tokio::test]
    async fn test_create_and_load_both_kinds() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut conn = db.acquire().await.unwrap();
        let mut repo = CounterpartyRepository::new(&mut *conn);

        let customer = repo
            .create(CounterpartyKind::Customer, "Ali Hassan", Some("0770"), 0)
            .await
            .unwrap();
        let supplier = repo
            .create(CounterpartyKind::Supplier, "Baghdad Wholesale", None, 25_000)
            .await
            .unwrap();

        assert_eq!(customer.kind, CounterpartyKind::Customer);
        assert_eq!(supplier.kind, CounterpartyKind::Supplier);
        assert_eq!(supplier.cached_balance, 25_000);
        assert_eq!(repo.list(CounterpartyKind::Customer).await.unwrap().len(), 1);

        repo.overwrite_cached_balance(CounterpartyKind::Supplier, supplier.id, 100)
            .await
            .unwrap();
        let reloaded = repo.get(CounterpartyKind::Supplier, supplier.id).await.unwrap();
        assert_eq!(reloaded.cached_balance, 100);
    }

    #[tokio::test]
    async fn test_missing_counterparty_names_kind() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut conn = db.acquire().await.unwrap();
        let mut repo = CounterpartyRepository::new(&mut *conn);

        match repo.get(CounterpartyKind::Supplier, 9).await {
            Err(DbError::Domain(CoreError::NotFound { entity, id })) => {
                assert_eq!(entity, "Supplier");
                assert_eq!(id, "9");
            }
            other => panic!("expected NotFound, got {:?}", other),
        }
    }
}
