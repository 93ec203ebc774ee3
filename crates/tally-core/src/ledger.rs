//! # Counterparty Ledgers
//!
//! Append-only running-balance ledgers for customers and suppliers.
//!
//! ## Balance Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  prior = balance_after of latest row                                    │
//! │          (or the cached total_debt / current_balance if no rows yet)    │
//! │                                                                         │
//! │  sale / purchase   ──►  prior + |amount|                                │
//! │  payment           ──►  prior - |amount|                                │
//! │  adjustment        ──►  prior + amount   (caller chooses the sign)      │
//! │                                                                         │
//! │  INSERT row (balance_after) ──► UPDATE cache := balance_after           │
//! │                                                                         │
//! │  The row is the truth. The cache only speeds up reads and is corrected │
//! │  by reconciliation, never by ordinary writes.                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::{CoreResult, ValidationError};

// =============================================================================
// Counterparty Kind
// =============================================================================

/// Which ledger a row belongs to.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum CounterpartyKind {
    Customer,
    Supplier,
}

impl CounterpartyKind {
    pub const ALL: [CounterpartyKind; 2] = [CounterpartyKind::Customer, CounterpartyKind::Supplier];

    /// Table holding the counterparty rows.
    pub const fn table(&self) -> &'static str {
        match self {
            CounterpartyKind::Customer => "customers",
            CounterpartyKind::Supplier => "suppliers",
        }
    }

    /// Table holding the ledger rows.
    pub const fn ledger_table(&self) -> &'static str {
        match self {
            CounterpartyKind::Customer => "customer_ledger",
            CounterpartyKind::Supplier => "supplier_ledger",
        }
    }

    /// Column carrying the cached balance.
    pub const fn balance_column(&self) -> &'static str {
        match self {
            CounterpartyKind::Customer => "total_debt",
            CounterpartyKind::Supplier => "current_balance",
        }
    }

    /// Ledger column linking to the originating document.
    pub const fn document_column(&self) -> &'static str {
        match self {
            CounterpartyKind::Customer => "sale_id",
            CounterpartyKind::Supplier => "purchase_id",
        }
    }

    /// Foreign key column in the ledger table.
    pub const fn id_column(&self) -> &'static str {
        match self {
            CounterpartyKind::Customer => "customer_id",
            CounterpartyKind::Supplier => "supplier_id",
        }
    }

    /// Transaction type that increases what this counterparty balance holds.
    pub const fn charge_type(&self) -> LedgerTransactionType {
        match self {
            CounterpartyKind::Customer => LedgerTransactionType::Sale,
            CounterpartyKind::Supplier => LedgerTransactionType::Purchase,
        }
    }

    pub const fn entity_name(&self) -> &'static str {
        match self {
            CounterpartyKind::Customer => "Customer",
            CounterpartyKind::Supplier => "Supplier",
        }
    }
}

impl fmt::Display for CounterpartyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CounterpartyKind::Customer => f.write_str("customer"),
            CounterpartyKind::Supplier => f.write_str("supplier"),
        }
    }
}

impl FromStr for CounterpartyKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "customer" => Ok(CounterpartyKind::Customer),
            "supplier" => Ok(CounterpartyKind::Supplier),
            other => Err(ValidationError::InvalidFormat {
                field: "counterparty".to_string(),
                reason: format!("expected 'customer' or 'supplier', got '{}'", other),
            }),
        }
    }
}

// =============================================================================
// Transaction Type
// =============================================================================

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum LedgerTransactionType {
    Sale,
    Purchase,
    Payment,
    Adjustment,
}

impl LedgerTransactionType {
    /// Applies the sign convention to a raw amount.
    ///
    /// ```rust
    /// use tally_core::ledger::LedgerTransactionType;
    ///
    /// assert_eq!(LedgerTransactionType::Sale.signed_amount(-500), 500);
    /// assert_eq!(LedgerTransactionType::Payment.signed_amount(500), -500);
    /// assert_eq!(LedgerTransactionType::Adjustment.signed_amount(-75), -75);
    /// ```
    pub const fn signed_amount(&self, amount: i64) -> i64 {
        match self {
            LedgerTransactionType::Sale | LedgerTransactionType::Purchase => amount.abs(),
            LedgerTransactionType::Payment => -amount.abs(),
            LedgerTransactionType::Adjustment => amount,
        }
    }
}

// =============================================================================
// Ledger Entry
// =============================================================================

/// A stored ledger row. `amount` is stored already signed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct LedgerEntry {
    pub id: i64,
    pub kind: CounterpartyKind,
    pub counterparty_id: i64,
    pub transaction_type: LedgerTransactionType,
    pub amount: i64,
    pub balance_after: i64,
    /// `sale_id` for customers, `purchase_id` for suppliers.
    pub document_id: Option<i64>,
    pub payment_id: Option<i64>,
    pub journal_entry_id: Option<i64>,
    pub notes: Option<String>,
    pub created_by: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// Input for appending a ledger row. `amount` is the raw amount; the sign
/// is applied from `transaction_type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLedgerEntry {
    pub counterparty_id: i64,
    pub transaction_type: LedgerTransactionType,
    pub amount: i64,
    pub document_id: Option<i64>,
    pub payment_id: Option<i64>,
    pub journal_entry_id: Option<i64>,
    pub notes: Option<String>,
    pub created_by: String,
}

impl NewLedgerEntry {
    pub fn new(
        counterparty_id: i64,
        transaction_type: LedgerTransactionType,
        amount: i64,
        created_by: impl Into<String>,
    ) -> Self {
        NewLedgerEntry {
            counterparty_id,
            transaction_type,
            amount,
            document_id: None,
            payment_id: None,
            journal_entry_id: None,
            notes: None,
            created_by: created_by.into(),
        }
    }

    /// Rejects rows that make no sense for the target ledger.
    pub fn validate_for(&self, kind: CounterpartyKind) -> CoreResult<()> {
        let foreign_charge = match kind {
            CounterpartyKind::Customer => LedgerTransactionType::Purchase,
            CounterpartyKind::Supplier => LedgerTransactionType::Sale,
        };
        if self.transaction_type == foreign_charge {
            return Err(ValidationError::InvalidFormat {
                field: "transaction_type".to_string(),
                reason: format!("{:?} rows do not belong in the {} ledger", foreign_charge, kind),
            }
            .into());
        }
        if self.amount == 0 {
            return Err(ValidationError::MustBePositive {
                field: "amount".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// `prior + signed amount`.
    pub fn balance_after(&self, prior_balance: i64) -> i64 {
        prior_balance + self.transaction_type.signed_amount(self.amount)
    }
}

// =============================================================================
// Chain Verification
// =============================================================================

/// First row whose `balance_after` disagrees with its predecessor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ChainBreak {
    pub entry_id: i64,
    pub expected_balance: i64,
    pub recorded_balance: i64,
}

/// Result of replaying one counterparty's ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ChainReport {
    pub kind: CounterpartyKind,
    pub counterparty_id: i64,
    pub rows: usize,
    /// Balance carried in before the first row.
    pub opening_balance: i64,
    /// `opening_balance + Σamount`.
    pub replayed_balance: i64,
    /// `balance_after` of the last row, if any.
    pub recorded_balance: Option<i64>,
    pub first_break: Option<ChainBreak>,
}

impl ChainReport {
    pub fn is_intact(&self) -> bool {
        self.first_break.is_none()
    }
}

/// Replays rows in id order, starting from the counterparty's recorded
/// opening balance. The first row is checked like every other row.
pub fn verify_chain(
    kind: CounterpartyKind,
    counterparty_id: i64,
    opening_balance: i64,
    entries: &[LedgerEntry],
) -> ChainReport {
    let mut ordered: Vec<&LedgerEntry> = entries.iter().collect();
    ordered.sort_by_key(|e| e.id);

    let mut running = opening_balance;
    let mut first_break = None;
    for entry in &ordered {
        running += entry.amount;
        if first_break.is_none() && entry.balance_after != running {
            first_break = Some(ChainBreak {
                entry_id: entry.id,
                expected_balance: running,
                recorded_balance: entry.balance_after,
            });
        }
    }

    ChainReport {
        kind,
        counterparty_id,
        rows: ordered.len(),
        opening_balance,
        replayed_balance: running,
        recorded_balance: ordered.last().map(|e| e.balance_after),
        first_break,
    }
}

// =============================================================================
// Drift
// =============================================================================

/// Cached balance next to the latest ledger balance for one counterparty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct BalanceSnapshot {
    pub kind: CounterpartyKind,
    pub counterparty_id: i64,
    pub name: String,
    pub cached_balance: i64,
    /// `None` when the counterparty has no ledger rows yet.
    pub last_balance_after: Option<i64>,
}

impl BalanceSnapshot {
    /// Latest ledger balance, falling back to the cache when there are no
    /// rows (so a never-transacted counterparty never drifts).
    pub fn ledger_balance(&self) -> i64 {
        self.last_balance_after.unwrap_or(self.cached_balance)
    }

    pub fn drift(&self) -> i64 {
        self.cached_balance - self.ledger_balance()
    }
}

/// A counterparty whose cache disagrees with its ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct DriftItem {
    pub kind: CounterpartyKind,
    pub counterparty_id: i64,
    pub name: String,
    pub cached_balance: i64,
    pub ledger_balance: i64,
    /// `cached - ledger`.
    pub drift: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ReconciliationStats {
    pub customers_checked: usize,
    pub suppliers_checked: usize,
    pub customers_drifted: usize,
    pub suppliers_drifted: usize,
    pub total_absolute_drift: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ReconciliationReport {
    pub items: Vec<DriftItem>,
    pub stats: ReconciliationStats,
    #[ts(as = "String")]
    pub checked_at: DateTime<Utc>,
}

impl ReconciliationReport {
    /// Keeps only non-zero drift and aggregates counts.
    pub fn from_snapshots(snapshots: &[BalanceSnapshot], checked_at: DateTime<Utc>) -> Self {
        let mut stats = ReconciliationStats::default();
        let mut items = Vec::new();

        for snapshot in snapshots {
            match snapshot.kind {
                CounterpartyKind::Customer => stats.customers_checked += 1,
                CounterpartyKind::Supplier => stats.suppliers_checked += 1,
            }

            let drift = snapshot.drift();
            if drift == 0 {
                continue;
            }
            match snapshot.kind {
                CounterpartyKind::Customer => stats.customers_drifted += 1,
                CounterpartyKind::Supplier => stats.suppliers_drifted += 1,
            }
            stats.total_absolute_drift += drift.abs();
            items.push(DriftItem {
                kind: snapshot.kind,
                counterparty_id: snapshot.counterparty_id,
                name: snapshot.name.clone(),
                cached_balance: snapshot.cached_balance,
                ledger_balance: snapshot.ledger_balance(),
                drift,
            });
        }

        ReconciliationReport {
            items,
            stats,
            checked_at,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.items.is_empty()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: i64, tx: LedgerTransactionType, amount: i64, balance_after: i64) -> LedgerEntry {
        LedgerEntry {
            id,
            kind: CounterpartyKind::Customer,
            counterparty_id: 1,
            transaction_type: tx,
            amount,
            balance_after,
            document_id: None,
            payment_id: None,
            journal_entry_id: None,
            notes: None,
            created_by: "u1".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_sign_convention() {
        assert_eq!(LedgerTransactionType::Sale.signed_amount(300), 300);
        assert_eq!(LedgerTransactionType::Purchase.signed_amount(-300), 300);
        assert_eq!(LedgerTransactionType::Payment.signed_amount(300), -300);
        assert_eq!(LedgerTransactionType::Payment.signed_amount(-300), -300);
        assert_eq!(LedgerTransactionType::Adjustment.signed_amount(-20), -20);
    }

    #[test]
    fn test_balance_after() {
        let payment = NewLedgerEntry::new(1, LedgerTransactionType::Payment, 250, "u1");
        assert_eq!(payment.balance_after(1000), 750);
        let sale = NewLedgerEntry::new(1, LedgerTransactionType::Sale, 250, "u1");
        assert_eq!(sale.balance_after(0), 250);
    }

    #[test]
    fn test_validate_for_rejects_foreign_charge() {
        let purchase = NewLedgerEntry::new(1, LedgerTransactionType::Purchase, 10, "u1");
        assert!(purchase.validate_for(CounterpartyKind::Customer).is_err());
        assert!(purchase.validate_for(CounterpartyKind::Supplier).is_ok());

        let zero = NewLedgerEntry::new(1, LedgerTransactionType::Adjustment, 0, "u1");
        assert!(zero.validate_for(CounterpartyKind::Supplier).is_err());
    }

    #[test]
    fn test_intact_chain_replays_to_last_balance() {
        let rows = vec![
            row(1, LedgerTransactionType::Sale, 1000, 1000),
            row(2, LedgerTransactionType::Payment, -400, 600),
            row(3, LedgerTransactionType::Adjustment, -50, 550),
        ];
        let report = verify_chain(CounterpartyKind::Customer, 1, 0, &rows);
        assert!(report.is_intact());
        assert_eq!(report.opening_balance, 0);
        assert_eq!(report.replayed_balance, 550);
        assert_eq!(report.recorded_balance, Some(550));
    }

    #[test]
    fn test_replay_starts_from_opening_balance() {
        let rows = vec![row(4, LedgerTransactionType::Payment, -100, 400)];
        let report = verify_chain(CounterpartyKind::Customer, 1, 500, &rows);
        assert_eq!(report.opening_balance, 500);
        assert!(report.is_intact());
    }

    #[test]
    fn test_bad_first_row_is_reported() {
        let rows = vec![
            row(1, LedgerTransactionType::Sale, 1000, 1300),
            row(2, LedgerTransactionType::Payment, -300, 1000),
        ];
        let report = verify_chain(CounterpartyKind::Customer, 1, 0, &rows);
        let brk = report.first_break.unwrap();
        assert_eq!(brk.entry_id, 1);
        assert_eq!(brk.expected_balance, 1000);
        assert_eq!(brk.recorded_balance, 1300);
        assert_eq!(report.replayed_balance, 700);
    }

    #[test]
    fn test_broken_chain_reports_first_break() {
        let rows = vec![
            row(3, LedgerTransactionType::Payment, -100, 800),
            row(1, LedgerTransactionType::Sale, 1000, 1000),
            row(2, LedgerTransactionType::Sale, 500, 1400),
        ];
        let report = verify_chain(CounterpartyKind::Customer, 1, 0, &rows);
        let brk = report.first_break.unwrap();
        assert_eq!(brk.entry_id, 2);
        assert_eq!(brk.expected_balance, 1500);
        assert_eq!(brk.recorded_balance, 1400);
    }

    #[test]
    fn test_report_keeps_only_drifted() {
        let snapshots = vec![
            BalanceSnapshot {
                kind: CounterpartyKind::Customer,
                counterparty_id: 1,
                name: "Ali".to_string(),
                cached_balance: 900,
                last_balance_after: Some(1000),
            },
            BalanceSnapshot {
                kind: CounterpartyKind::Customer,
                counterparty_id: 2,
                name: "Sara".to_string(),
                cached_balance: 300,
                last_balance_after: None,
            },
            BalanceSnapshot {
                kind: CounterpartyKind::Supplier,
                counterparty_id: 1,
                name: "Wholesale".to_string(),
                cached_balance: 50,
                last_balance_after: Some(0),
            },
        ];

        let report = ReconciliationReport::from_snapshots(&snapshots, Utc::now());
        assert_eq!(report.items.len(), 2);
        assert_eq!(report.items[0].drift, -100);
        assert_eq!(report.items[0].ledger_balance, 1000);
        assert_eq!(report.items[1].drift, 50);
        assert_eq!(report.stats.customers_checked, 2);
        assert_eq!(report.stats.suppliers_checked, 1);
        assert_eq!(report.stats.customers_drifted, 1);
        assert_eq!(report.stats.suppliers_drifted, 1);
        assert_eq!(report.stats.total_absolute_drift, 150);
        assert!(!report.is_clean());
    }
}
