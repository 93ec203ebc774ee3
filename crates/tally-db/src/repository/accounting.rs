//! # Accounting Repository
//!
//! Chart of accounts and the journal engine.
//!
//! ## Entry Creation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  create_journal_entry(entry)            (inside caller's transaction)  │
//! │       │                                                                 │
//! │       ├── Σdebit != Σcredit ──► UnbalancedEntry, nothing written       │
//! │       ├── unknown account   ──► NotFound, nothing written              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  INSERT journal_entries (header) ──► id                                 │
//! │  INSERT journal_lines × n (journal_entry_id = id)                       │
//! │       │                                                                 │
//! │       └── is_posted? ──► accounts.balance += natural-side delta         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Lines are never edited. Reversal writes a mirror entry and flips the
//! original's `is_reversed` flag.

use chrono::{NaiveDate, Utc};
use sqlx::SqliteConnection;
use std::collections::HashMap;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use tally_core::accounting::{Account, AccountType, JournalEntry, JournalLine, NewAccount, NewJournalEntry};
use tally_core::CoreError;

const SELECT_ACCOUNT: &str = "SELECT id, code, name, account_type, parent_id, is_system, is_active, balance \
     FROM accounts";

const SELECT_ENTRY: &str = "SELECT id, entry_number, entry_date, description, source_type, source_id, \
     is_posted, is_reversed, reversal_of, total_amount, currency, created_by, created_at \
     FROM journal_entries";

/// Accounting operations bound to one connection, normally the open
/// transaction of a use case.
///
/// ## Usage
/// ```rust,ignore
/// let mut tx = db.begin().await?;
/// let cash = AccountingRepository::new(&mut *tx).account_id_for_code("1001").await?;
/// tx.commit().await?;
/// ```
pub struct AccountingRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> AccountingRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        AccountingRepository { conn }
    }

    // =========================================================================
    // Accounts
    // =========================================================================

    /// Idempotent creation keyed by `code`.
    ///
    /// An existing code returns the stored row untouched; the input's name
    /// and type are ignored in that case.
    pub async fn ensure_account(&mut self, account: &NewAccount) -> DbResult<Account> {
        account.validate()?;

        let result = sqlx::query(
            "INSERT INTO accounts (code, name, account_type, parent_id, is_system) \
             VALUES (?1, ?2, ?3, ?4, ?5) \
             ON CONFLICT(code) DO NOTHING",
        )
        .bind(&account.code)
        .bind(&account.name)
        .bind(account.account_type)
        .bind(account.parent_id)
        .bind(account.is_system)
        .execute(&mut *self.conn)
        .await?;

        if result.rows_affected() == 1 {
            debug!(code = %account.code, "Account created");
        }

        self.find_account_by_code(&account.code)
            .await?
            .ok_or_else(|| DbError::not_found("Account", &account.code))
    }

    /// Strict creation: a duplicate code is a `Conflict`.
    pub async fn create_account(&mut self, account: &NewAccount) -> DbResult<Account> {
        account.validate()?;

        if self.find_account_by_code(&account.code).await?.is_some() {
            return Err(CoreError::conflict("Account", &account.code, "account code already exists").into());
        }

        let result = sqlx::query(
            "INSERT INTO accounts (code, name, account_type, parent_id, is_system) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&account.code)
        .bind(&account.name)
        .bind(account.account_type)
        .bind(account.parent_id)
        .bind(account.is_system)
        .execute(&mut *self.conn)
        .await?;

        debug!(code = %account.code, id = result.last_insert_rowid(), "Account created");
        self.get_account(result.last_insert_rowid()).await
    }

    pub async fn find_account_by_code(&mut self, code: &str) -> DbResult<Option<Account>> {
        let sql = format!("{} WHERE code = ?1", SELECT_ACCOUNT);
        let account = sqlx::query_as::<_, Account>(&sql)
            .bind(code)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(account)
    }

    pub async fn get_account(&mut self, id: i64) -> DbResult<Account> {
        let sql = format!("{} WHERE id = ?1", SELECT_ACCOUNT);
        sqlx::query_as::<_, Account>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?
            .ok_or_else(|| CoreError::not_found("Account", id).into())
    }

    /// Resolves an account code to its id, `NotFound` if absent.
    pub async fn account_id_for_code(&mut self, code: &str) -> DbResult<i64> {
        self.find_account_by_code(code)
            .await?
            .map(|a| a.id)
            .ok_or_else(|| CoreError::not_found("Account", code).into())
    }

    pub async fn list_accounts(&mut self) -> DbResult<Vec<Account>> {
        let sql = format!("{} ORDER BY code", SELECT_ACCOUNT);
        let accounts = sqlx::query_as::<_, Account>(&sql)
            .fetch_all(&mut *self.conn)
            .await?;
        Ok(accounts)
    }

    // =========================================================================
    // Journal Entries
    // =========================================================================

    /// Writes a balanced entry and its lines.
    pub async fn create_journal_entry(&mut self, entry: &NewJournalEntry) -> DbResult<JournalEntry> {
        entry.validate()?;

        let account_types = self.account_types(entry.lines.iter().map(|l| l.account_id)).await?;
        let (total_debit, _) = entry.totals();

        let result = sqlx::query(
            "INSERT INTO journal_entries ( \
                entry_number, entry_date, description, source_type, source_id, \
                is_posted, is_reversed, reversal_of, total_amount, currency, \
                created_by, created_at \
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7, ?8, ?9, ?10, ?11)",
        )
        .bind(&entry.entry_number)
        .bind(entry.entry_date)
        .bind(&entry.description)
        .bind(&entry.source_type)
        .bind(entry.source_id)
        .bind(entry.is_posted)
        .bind(entry.reversal_of)
        .bind(total_debit)
        .bind(entry.currency)
        .bind(&entry.created_by)
        .bind(Utc::now())
        .execute(&mut *self.conn)
        .await?;

        let entry_id = result.last_insert_rowid();

        for line in &entry.lines {
            sqlx::query(
                "INSERT INTO journal_lines (journal_entry_id, account_id, debit, credit, description) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .bind(entry_id)
            .bind(line.account_id)
            .bind(line.debit)
            .bind(line.credit)
            .bind(&line.description)
            .execute(&mut *self.conn)
            .await?;
        }

        if entry.is_posted {
            for line in &entry.lines {
                self.apply_line(&account_types, line.account_id, line.debit, line.credit)
                    .await?;
            }
        }

        debug!(
            id = entry_id,
            entry_number = %entry.entry_number,
            source_type = %entry.source_type,
            total = total_debit,
            posted = entry.is_posted,
            "Journal entry created"
        );

        self.get_journal_entry(entry_id).await
    }

    /// Loads an entry with its lines.
    pub async fn get_journal_entry(&mut self, id: i64) -> DbResult<JournalEntry> {
        let sql = format!("{} WHERE id = ?1", SELECT_ENTRY);
        let mut entry = sqlx::query_as::<_, JournalEntry>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?
            .ok_or_else(|| CoreError::not_found("JournalEntry", id))?;

        entry.lines = self.lines_for(id).await?;
        Ok(entry)
    }

    /// Entries created for one source document, oldest first.
    pub async fn find_by_source(&mut self, source_type: &str, source_id: i64) -> DbResult<Vec<JournalEntry>> {
        let sql = format!(
            "{} WHERE source_type = ?1 AND source_id = ?2 ORDER BY id",
            SELECT_ENTRY
        );
        let mut entries = sqlx::query_as::<_, JournalEntry>(&sql)
            .bind(source_type)
            .bind(source_id)
            .fetch_all(&mut *self.conn)
            .await?;

        for entry in &mut entries {
            entry.lines = self.lines_for(entry.id).await?;
        }
        Ok(entries)
    }

    /// `unposted → posted`. Applies the entry to account balances.
    pub async fn post_journal_entry(&mut self, id: i64) -> DbResult<JournalEntry> {
        let entry = self.get_journal_entry(id).await?;
        entry.ensure_postable()?;

        let result = sqlx::query("UPDATE journal_entries SET is_posted = 1 WHERE id = ?1 AND is_posted = 0")
            .bind(id)
            .execute(&mut *self.conn)
            .await?;
        if result.rows_affected() != 1 {
            return Err(CoreError::invalid_state("JournalEntry", &entry.entry_number, "entry is already posted").into());
        }

        let account_types = self.account_types(entry.lines.iter().map(|l| l.account_id)).await?;
        for line in &entry.lines {
            self.apply_line(&account_types, line.account_id, line.debit, line.credit)
                .await?;
        }

        debug!(id, entry_number = %entry.entry_number, "Journal entry posted");
        self.get_journal_entry(id).await
    }

    /// Administrative period close: posts every unposted entry dated within
    /// `from..=to`. Returns how many were posted.
    pub async fn post_period(&mut self, from: NaiveDate, to: NaiveDate) -> DbResult<u64> {
        let ids: Vec<i64> = sqlx::query_scalar(
            "SELECT id FROM journal_entries \
             WHERE is_posted = 0 AND entry_date >= ?1 AND entry_date <= ?2 \
             ORDER BY id",
        )
        .bind(from)
        .bind(to)
        .fetch_all(&mut *self.conn)
        .await?;

        for id in &ids {
            self.post_journal_entry(*id).await?;
        }

        info!(%from, %to, posted = ids.len(), "Period posted");
        Ok(ids.len() as u64)
    }

    /// `posted → reversed`. Returns the new mirror entry.
    pub async fn reverse_journal_entry(&mut self, id: i64, reason: &str, created_by: &str) -> DbResult<JournalEntry> {
        let original = self.get_journal_entry(id).await?;
        original.ensure_reversible()?;

        let result = sqlx::query(
            "UPDATE journal_entries SET is_reversed = 1 \
             WHERE id = ?1 AND is_posted = 1 AND is_reversed = 0",
        )
        .bind(id)
        .execute(&mut *self.conn)
        .await?;
        if result.rows_affected() != 1 {
            return Err(CoreError::invalid_state("JournalEntry", &original.entry_number, "entry is already reversed").into());
        }

        let mirror = original.reversal(Utc::now().date_naive(), reason, created_by);
        let reversal = self.create_journal_entry(&mirror).await?;

        info!(
            original = %original.entry_number,
            reversal = %reversal.entry_number,
            "Journal entry reversed"
        );
        Ok(reversal)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn lines_for(&mut self, entry_id: i64) -> DbResult<Vec<JournalLine>> {
        let lines = sqlx::query_as::<_, JournalLine>(
            "SELECT id, journal_entry_id, account_id, debit, credit, description \
             FROM journal_lines WHERE journal_entry_id = ?1 ORDER BY id",
        )
        .bind(entry_id)
        .fetch_all(&mut *self.conn)
        .await?;
        Ok(lines)
    }

    /// Types of every referenced account; `NotFound` for the first missing one.
    async fn account_types(&mut self, ids: impl Iterator<Item = i64>) -> DbResult<HashMap<i64, AccountType>> {
        let mut types = HashMap::new();
        for id in ids {
            if types.contains_key(&id) {
                continue;
            }
            let account_type: Option<AccountType> =
                sqlx::query_scalar("SELECT account_type FROM accounts WHERE id = ?1")
                    .bind(id)
                    .fetch_optional(&mut *self.conn)
                    .await?;
            match account_type {
                Some(t) => {
                    types.insert(id, t);
                }
                None => return Err(CoreError::not_found("Account", id).into()),
            }
        }
        Ok(types)
    }

    async fn apply_line(
        &mut self,
        account_types: &HashMap<i64, AccountType>,
        account_id: i64,
        debit: i64,
        credit: i64,
    ) -> DbResult<()> {
        let account_type = account_types
            .get(&account_id)
            .ok_or_else(|| CoreError::not_found("Account", account_id))?;

        sqlx::query("UPDATE accounts SET balance = balance + ?1 WHERE id = ?2")
            .bind(account_type.balance_delta(debit, credit))
            .bind(account_id)
            .execute(&mut *self.conn)
            .await?;
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use tally_core::accounting::{codes, NewJournalLine};
    use tally_core::money::Currency;

    async fn setup() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 15).unwrap()
    }

    async fn count(db: &Database, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(db.pool())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_ensure_account_is_idempotent() {
        let db = setup().await;
        let mut conn = db.acquire().await.unwrap();
        let mut repo = AccountingRepository::new(&mut *conn);

        let first = repo
            .ensure_account(&NewAccount::new("1001", "Cash", AccountType::Asset))
            .await
            .unwrap();
        let second = repo
            .ensure_account(&NewAccount::new("1001", "Different Name", AccountType::Expense))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.name, "Cash");
        drop(conn);

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM accounts WHERE code = '1001'")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[tokio::test]
    async fn test_create_account_conflicts_on_duplicate_code() {
        let db = setup().await;
        let mut conn = db.acquire().await.unwrap();
        let mut repo = AccountingRepository::new(&mut *conn);

        let created = repo
            .create_account(&NewAccount::new("6001", "Rent", AccountType::Expense))
            .await
            .unwrap();
        assert_eq!(created.code, "6001");

        let err = repo
            .create_account(&NewAccount::new("6001", "Rent again", AccountType::Expense))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::Conflict { .. })));
    }

    #[tokio::test]
    async fn test_unbalanced_entry_writes_nothing() {
        let db = setup().await;
        let mut tx = db.begin().await.unwrap();
        let mut repo = AccountingRepository::new(&mut *tx);
        let cash = repo.account_id_for_code(codes::CASH).await.unwrap();
        let revenue = repo.account_id_for_code(codes::SALES_REVENUE).await.unwrap();

        let entry = NewJournalEntry::new(today(), "bad", "manual", None, Currency::Iqd, "u1")
            .line(NewJournalLine::debit(cash, 1000, "cash"))
            .line(NewJournalLine::credit(revenue, 750, "revenue"));

        let err = repo.create_journal_entry(&entry).await.unwrap_err();
        match err {
            DbError::Domain(CoreError::UnbalancedEntry {
                total_debit,
                total_credit,
                ..
            }) => {
                assert_eq!(total_debit, 1000);
                assert_eq!(total_credit, 750);
            }
            other => panic!("expected UnbalancedEntry, got {:?}", other),
        }
        tx.rollback().await.unwrap();

        assert_eq!(count(&db, "journal_entries").await, 0);
        assert_eq!(count(&db, "journal_lines").await, 0);
    }

    #[tokio::test]
    async fn test_unknown_account_is_not_found() {
        let db = setup().await;
        let mut conn = db.acquire().await.unwrap();
        let mut repo = AccountingRepository::new(&mut *conn);

        let entry = NewJournalEntry::new(today(), "x", "manual", None, Currency::Iqd, "u1")
            .line(NewJournalLine::debit(9999, 10, "a"))
            .line(NewJournalLine::credit(9998, 10, "b"));
        let err = repo.create_journal_entry(&entry).await.unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::NotFound { .. })));

        let err = repo.account_id_for_code("9999").await.unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_posting_moves_account_balances() {
        let db = setup().await;
        let mut conn = db.acquire().await.unwrap();
        let mut repo = AccountingRepository::new(&mut *conn);
        let cash = repo.account_id_for_code(codes::CASH).await.unwrap();
        let revenue = repo.account_id_for_code(codes::SALES_REVENUE).await.unwrap();

        let entry = NewJournalEntry::new(today(), "sale", "sale", Some(1), Currency::Iqd, "u1")
            .line(NewJournalLine::debit(cash, 5000, "cash"))
            .line(NewJournalLine::credit(revenue, 5000, "revenue"));
        let created = repo.create_journal_entry(&entry).await.unwrap();
        assert!(!created.is_posted);
        assert_eq!(created.total_amount, 5000);
        assert_eq!(created.lines.len(), 2);
        assert_eq!(repo.get_account(cash).await.unwrap().balance, 0);

        let posted = repo.post_journal_entry(created.id).await.unwrap();
        assert!(posted.is_posted);
        assert_eq!(repo.get_account(cash).await.unwrap().balance, 5000);
        assert_eq!(repo.get_account(revenue).await.unwrap().balance, 5000);

        let err = repo.post_journal_entry(created.id).await.unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::InvalidState { .. })));
    }

    #[tokio::test]
    async fn test_reversal_is_additive() {
        let db = setup().await;
        let mut conn = db.acquire().await.unwrap();
        let mut repo = AccountingRepository::new(&mut *conn);
        let a = repo.account_id_for_code(codes::CASH).await.unwrap();
        let b = repo.account_id_for_code(codes::SALES_REVENUE).await.unwrap();

        let original = repo
            .create_journal_entry(
                &NewJournalEntry::new(today(), "sale", "sale", Some(7), Currency::Iqd, "u1")
                    .posted(true)
                    .line(NewJournalLine::debit(a, 100, "a"))
                    .line(NewJournalLine::credit(b, 100, "b")),
            )
            .await
            .unwrap();

        let reversal = repo
            .reverse_journal_entry(original.id, "entered twice", "u2")
            .await
            .unwrap();

        assert_eq!(reversal.reversal_of, Some(original.id));
        assert_eq!(reversal.source_type, "reversal");
        assert!(reversal.is_posted);
        assert_eq!((reversal.lines[0].account_id, reversal.lines[0].credit), (a, 100));
        assert_eq!((reversal.lines[1].account_id, reversal.lines[1].debit), (b, 100));

        let reloaded = repo.get_journal_entry(original.id).await.unwrap();
        assert!(reloaded.is_reversed);
        assert_eq!(reloaded.lines, original.lines);

        // Mirror nets the balance cache back to zero
        assert_eq!(repo.get_account(a).await.unwrap().balance, 0);
        assert_eq!(repo.get_account(b).await.unwrap().balance, 0);

        let err = repo
            .reverse_journal_entry(original.id, "again", "u2")
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::InvalidState { .. })));
    }

    #[tokio::test]
    async fn test_unposted_entry_cannot_be_reversed() {
        let db = setup().await;
        let mut conn = db.acquire().await.unwrap();
        let mut repo = AccountingRepository::new(&mut *conn);
        let a = repo.account_id_for_code(codes::CASH).await.unwrap();
        let b = repo.account_id_for_code(codes::OWNER_EQUITY).await.unwrap();

        let entry = repo
            .create_journal_entry(
                &NewJournalEntry::new(today(), "capital", "manual", None, Currency::Iqd, "u1")
                    .line(NewJournalLine::debit(a, 100, "a"))
                    .line(NewJournalLine::credit(b, 100, "b")),
            )
            .await
            .unwrap();

        let err = repo.reverse_journal_entry(entry.id, "x", "u1").await.unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::InvalidState { .. })));
    }

    #[tokio::test]
    async fn test_post_period_only_touches_range() {
        let db = setup().await;
        let mut conn = db.acquire().await.unwrap();
        let mut repo = AccountingRepository::new(&mut *conn);
        let a = repo.account_id_for_code(codes::CASH).await.unwrap();
        let b = repo.account_id_for_code(codes::OWNER_EQUITY).await.unwrap();

        for day in [1, 10, 28] {
            let date = NaiveDate::from_ymd_opt(2026, 2, day).unwrap();
            repo.create_journal_entry(
                &NewJournalEntry::new(date, "capital", "manual", None, Currency::Iqd, "u1")
                    .line(NewJournalLine::debit(a, 100, "a"))
                    .line(NewJournalLine::credit(b, 100, "b")),
            )
            .await
            .unwrap();
        }

        let posted = repo
            .post_period(
                NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(),
                NaiveDate::from_ymd_opt(2026, 2, 10).unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(posted, 2);
        assert_eq!(repo.get_account(a).await.unwrap().balance, 200);

        let found = repo.find_by_source("manual", 0).await.unwrap();
        assert!(found.is_empty());
    }
}
