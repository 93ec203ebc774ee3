//! # Ledger Repository
//!
//! Append-only customer and supplier ledgers with a write-through cache.
//!
//! ## Append
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  create(entry)                                                          │
//! │       │                                                                 │
//! │       ├── last_balance(counterparty)                                    │
//! │       │     latest row's balance_after, or the cached field when the   │
//! │       │     counterparty has no rows yet                                │
//! │       │                                                                 │
//! │       ├── balance_after = prior + signed(amount)                        │
//! │       ├── INSERT ledger row                                             │
//! │       └── UPDATE counterparty cache := balance_after                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! One repository type serves both ledgers; [`CounterpartyKind`] picks the
//! tables and columns.

use chrono::Utc;
use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::DbResult;
use tally_core::ledger::{verify_chain, BalanceSnapshot, ChainReport, CounterpartyKind, LedgerEntry, NewLedgerEntry};
use tally_core::CoreError;

pub(crate) fn select_ledger(kind: CounterpartyKind) -> String {
    format!(
        "SELECT id, '{kind}' AS kind, {id_col} AS counterparty_id, transaction_type, amount, \
                balance_after, {doc_col} AS document_id, payment_id, journal_entry_id, notes, \
                created_by, created_at \
         FROM {ledger}",
        kind = kind,
        id_col = kind.id_column(),
        doc_col = kind.document_column(),
        ledger = kind.ledger_table(),
    )
}

pub struct LedgerRepository<'c> {
    conn: &'c mut SqliteConnection,
    kind: CounterpartyKind,
}

impl<'c> LedgerRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection, kind: CounterpartyKind) -> Self {
        LedgerRepository { conn, kind }
    }

    pub fn customers(conn: &'c mut SqliteConnection) -> Self {
        Self::new(conn, CounterpartyKind::Customer)
    }

    pub fn suppliers(conn: &'c mut SqliteConnection) -> Self {
        Self::new(conn, CounterpartyKind::Supplier)
    }

    pub fn kind(&self) -> CounterpartyKind {
        self.kind
    }

    /// Running balance before the next row.
    pub async fn last_balance(&mut self, counterparty_id: i64) -> DbResult<i64> {
        let sql = format!(
            "SELECT balance_after FROM {} WHERE {} = ?1 ORDER BY id DESC LIMIT 1",
            self.kind.ledger_table(),
            self.kind.id_column()
        );
        let last: Option<i64> = sqlx::query_scalar(&sql)
            .bind(counterparty_id)
            .fetch_optional(&mut *self.conn)
            .await?;

        if let Some(balance) = last {
            return Ok(balance);
        }

        self.cached_balance(counterparty_id).await
    }

    /// Appends a row and writes the new balance through to the cache.
    pub async fn create(&mut self, entry: &NewLedgerEntry) -> DbResult<LedgerEntry> {
        entry.validate_for(self.kind)?;

        let prior = self.last_balance(entry.counterparty_id).await?;
        let amount = entry.transaction_type.signed_amount(entry.amount);
        let balance_after = entry.balance_after(prior);
        let now = Utc::now();

        let sql = format!(
            "INSERT INTO {} ( \
                {}, transaction_type, amount, balance_after, {}, payment_id, \
                journal_entry_id, notes, created_by, created_at \
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            self.kind.ledger_table(),
            self.kind.id_column(),
            self.kind.document_column()
        );
        let result = sqlx::query(&sql)
            .bind(entry.counterparty_id)
            .bind(entry.transaction_type)
            .bind(amount)
            .bind(balance_after)
            .bind(entry.document_id)
            .bind(entry.payment_id)
            .bind(entry.journal_entry_id)
            .bind(&entry.notes)
            .bind(&entry.created_by)
            .bind(now)
            .execute(&mut *self.conn)
            .await?;

        let sql = format!(
            "UPDATE {} SET {} = ?1 WHERE id = ?2",
            self.kind.table(),
            self.kind.balance_column()
        );
        sqlx::query(&sql)
            .bind(balance_after)
            .bind(entry.counterparty_id)
            .execute(&mut *self.conn)
            .await?;

        debug!(
            kind = %self.kind,
            counterparty_id = entry.counterparty_id,
            transaction_type = ?entry.transaction_type,
            amount,
            prior,
            balance_after,
            "Ledger entry appended"
        );

        Ok(LedgerEntry {
            id: result.last_insert_rowid(),
            kind: self.kind,
            counterparty_id: entry.counterparty_id,
            transaction_type: entry.transaction_type,
            amount,
            balance_after,
            document_id: entry.document_id,
            payment_id: entry.payment_id,
            journal_entry_id: entry.journal_entry_id,
            notes: entry.notes.clone(),
            created_by: entry.created_by.clone(),
            created_at: now,
        })
    }

    /// The row written for a payment, if any.
    pub async fn find_by_payment_id(&mut self, payment_id: i64) -> DbResult<Option<LedgerEntry>> {
        let sql = format!("{} WHERE payment_id = ?1 ORDER BY id LIMIT 1", select_ledger(self.kind));
        let entry = sqlx::query_as::<_, LedgerEntry>(&sql)
            .bind(payment_id)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(entry)
    }

    /// Rows for a counterparty in creation order.
    pub async fn list(&mut self, counterparty_id: i64) -> DbResult<Vec<LedgerEntry>> {
        let sql = format!(
            "{} WHERE {} = ?1 ORDER BY id",
            select_ledger(self.kind),
            self.kind.id_column()
        );
        let entries = sqlx::query_as::<_, LedgerEntry>(&sql)
            .bind(counterparty_id)
            .fetch_all(&mut *self.conn)
            .await?;
        Ok(entries)
    }

    /// Replays the counterparty's rows and reports the first inconsistency.
    pub async fn verify_chain(&mut self, counterparty_id: i64) -> DbResult<ChainReport> {
        let sql = format!("SELECT opening_balance FROM {} WHERE id = ?1", self.kind.table());
        let opening: Option<i64> = sqlx::query_scalar(&sql)
            .bind(counterparty_id)
            .fetch_optional(&mut *self.conn)
            .await?;
        let opening = opening.ok_or_else(|| CoreError::not_found(self.kind.entity_name(), counterparty_id))?;

        let entries = self.list(counterparty_id).await?;
        Ok(verify_chain(self.kind, counterparty_id, opening, &entries))
    }

    /// Cached and latest ledger balance for every counterparty of this kind.
    pub async fn balance_snapshots(&mut self) -> DbResult<Vec<BalanceSnapshot>> {
        let sql = format!(
            "SELECT '{kind}' AS kind, c.id AS counterparty_id, c.name, c.{balance} AS cached_balance, \
                    (SELECT l.balance_after FROM {ledger} l \
                     WHERE l.{id_col} = c.id ORDER BY l.id DESC LIMIT 1) AS last_balance_after \
             FROM {table} c ORDER BY c.id",
            kind = self.kind,
            balance = self.kind.balance_column(),
            ledger = self.kind.ledger_table(),
            id_col = self.kind.id_column(),
            table = self.kind.table(),
        );
        let snapshots = sqlx::query_as::<_, BalanceSnapshot>(&sql)
            .fetch_all(&mut *self.conn)
            .await?;
        Ok(snapshots)
    }

    async fn cached_balance(&mut self, counterparty_id: i64) -> DbResult<i64> {
        let sql = format!(
            "SELECT {} FROM {} WHERE id = ?1",
            self.kind.balance_column(),
            self.kind.table()
        );
        let cached: Option<i64> = sqlx::query_scalar(&sql)
            .bind(counterparty_id)
            .fetch_optional(&mut *self.conn)
            .await?;

        cached.ok_or_else(|| CoreError::not_found(self.kind.entity_name(), counterparty_id).into())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
