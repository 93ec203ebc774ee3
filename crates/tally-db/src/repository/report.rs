//! # Report Repository
//!
//! Read-side queries over the pool. Only posted journal lines count; draft
//! entries are invisible to every report.
//!
//! ## Query Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  accounts (active)                                                      │
//! │     LEFT JOIN ( posted lines within [from, to] grouped by account )     │
//! │                                                                         │
//! │  => one AccountTotals per active account, zero totals when idle         │
//! │  => TrialBalance / ProfitAndLoss / BalanceSheet derive in tally-core    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::NaiveDate;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use crate::repository::ledger::select_ledger;
use tally_core::ledger::{CounterpartyKind, LedgerEntry};
use tally_core::reports::{AccountTotals, BalanceSheet, ProfitAndLoss, TrialBalance};
use tally_core::CoreError;

/// Pool-backed reporting queries.
///
/// ## Example
/// ```rust,ignore
/// let trial = db.reports().trial_balance(None, None).await?;
/// assert!(trial.is_balanced);
/// ```
#[derive(Debug, Clone)]
pub struct ReportRepository {
    pool: SqlitePool,
}

impl ReportRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ReportRepository { pool }
    }

    /// Posted debit/credit totals per active account, bounded by entry date.
    ///
    /// Either bound may be `None` for an open interval.
    pub async fn account_totals(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> DbResult<Vec<AccountTotals>> {
        let totals = sqlx::query_as::<_, AccountTotals>(
            "SELECT a.id AS account_id, a.code, a.name, a.account_type, \
                    COALESCE(t.debit_total, 0) AS debit_total, \
                    COALESCE(t.credit_total, 0) AS credit_total \
             FROM accounts a \
             LEFT JOIN ( \
                 SELECT l.account_id, SUM(l.debit) AS debit_total, SUM(l.credit) AS credit_total \
                 FROM journal_lines l \
                 JOIN journal_entries e ON e.id = l.journal_entry_id \
                 WHERE e.is_posted = 1 \
                   AND (?1 IS NULL OR e.entry_date >= ?1) \
                   AND (?2 IS NULL OR e.entry_date <= ?2) \
                 GROUP BY l.account_id \
             ) t ON t.account_id = a.id \
             WHERE a.is_active = 1 \
             ORDER BY a.code",
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        debug!(accounts = totals.len(), ?from, ?to, "Account totals loaded");
        Ok(totals)
    }

    pub async fn trial_balance(&self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> DbResult<TrialBalance> {
        let totals = self.account_totals(from, to).await?;
        Ok(TrialBalance::derive(&totals, from, to))
    }

    pub async fn profit_and_loss(&self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> DbResult<ProfitAndLoss> {
        let totals = self.account_totals(from, to).await?;
        Ok(ProfitAndLoss::derive(&totals, from, to))
    }

    pub async fn balance_sheet(&self, as_of: NaiveDate) -> DbResult<BalanceSheet> {
        let totals = self.account_totals(None, Some(as_of)).await?;
        Ok(BalanceSheet::derive(&totals, as_of))
    }

    /// Ledger rows of one counterparty, oldest first.
    pub async fn ledger_listing(&self, kind: CounterpartyKind, counterparty_id: i64) -> DbResult<Vec<LedgerEntry>> {
        let mut conn = self.pool.acquire().await?;
        let exists: Option<i64> = sqlx::query_scalar(&format!("SELECT id FROM {} WHERE id = ?1", kind.table()))
            .bind(counterparty_id)
            .fetch_optional(&mut *conn)
            .await?;
        if exists.is_none() {
            return Err(CoreError::not_found(kind.entity_name(), counterparty_id).into());
        }
        drop(conn);

        let sql = format!("{} WHERE {} = ?1 ORDER BY id", select_ledger(kind), kind.id_column());
        let entries = sqlx::query_as::<_, LedgerEntry>(&sql)
            .bind(counterparty_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use crate::pool::{Database, DbConfig};
    use crate::repository::accounting::AccountingRepository;
    use crate::repository::counterparty::CounterpartyRepository;
    use crate::repository::ledger::LedgerRepository;
    use tally_core::accounting::{codes, NewJournalEntry, NewJournalLine};
    use tally_core::ledger::{LedgerTransactionType, NewLedgerEntry};
    use tally_core::money::Currency;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    async fn post_sale(db: &Database, day: u32, amount: i64, posted: bool) {
        let mut tx = db.begin().await.unwrap();
        let mut repo = AccountingRepository::new(&mut *tx);
        let cash = repo.account_id_for_code(codes::CASH).await.unwrap();
        let revenue = repo.account_id_for_code(codes::SALES_REVENUE).await.unwrap();
        let entry = NewJournalEntry::new(date(day), "Cash sale", "sale", Some(day as i64), Currency::Iqd, "u1")
            .posted(posted)
            .line(NewJournalLine::debit(cash, amount, "Cash"))
            .line(NewJournalLine::credit(revenue, amount, "Revenue"));
        repo.create_journal_entry(&entry).await.unwrap();
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_reports_count_posted_lines_only() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        post_sale(&db, 1, 10_000, true).await;
        post_sale(&db, 2, 4_000, false).await;

        let trial = db.reports().trial_balance(None, None).await.unwrap();
        assert!(trial.is_balanced);
        assert_eq!(trial.total_debit, 10_000);

        let pnl = db.reports().profit_and_loss(None, None).await.unwrap();
        assert_eq!(pnl.net_income, 10_000);

        let sheet = db.reports().balance_sheet(date(31)).await.unwrap();
        assert_eq!(sheet.total_assets, 10_000);
        assert_eq!(sheet.current_earnings, 10_000);
        assert!(sheet.is_balanced);
    }

    #[tokio::test]
    async fn test_date_bounds() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        post_sale(&db, 1, 1_000, true).await;
        post_sale(&db, 10, 2_000, true).await;

        let early = db.reports().trial_balance(None, Some(date(5))).await.unwrap();
        assert_eq!(early.total_debit, 1_000);
        let late = db.reports().trial_balance(Some(date(5)), None).await.unwrap();
        assert_eq!(late.total_debit, 2_000);
    }

    #[tokio::test]
    async fn test_ledger_listing() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut conn = db.acquire().await.unwrap();
        let customer = CounterpartyRepository::new(&mut *conn)
            .create(CounterpartyKind::Customer, "Zainab", None, 0)
            .await
            .unwrap();
        let mut ledger = LedgerRepository::customers(&mut *conn);
        ledger
            .create(&NewLedgerEntry::new(customer.id, LedgerTransactionType::Sale, 7_000, "u1"))
            .await
            .unwrap();
        ledger
            .create(&NewLedgerEntry::new(customer.id, LedgerTransactionType::Payment, 2_000, "u1"))
            .await
            .unwrap();
        drop(conn);

        let rows = db
            .reports()
            .ledger_listing(CounterpartyKind::Customer, customer.id)
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].balance_after, 5_000);

        assert!(matches!(
            db.reports().ledger_listing(CounterpartyKind::Supplier, 42).await,
            Err(DbError::Domain(CoreError::NotFound { .. }))
        ));
    }
}
