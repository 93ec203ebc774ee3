//! # Accounting
//!
//! Chart of accounts and double-entry journal records.
//!
//! ## Journal Entry State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   ┌──────────┐  post   ┌──────────┐  reverse  ┌──────────────────────┐ │
//! │   │ unposted │ ──────► │  posted  │ ────────► │ posted + is_reversed │ │
//! │   └──────────┘         └──────────┘           └──────────────────────┘ │
//! │                             │                                           │
//! │                             └── reverse creates a NEW posted entry     │
//! │                                 with debit/credit swapped, linked back │
//! │                                 via `reversal_of`. The original lines  │
//! │                                 are never edited.                      │
//! │                                                                         │
//! │   Both transitions are one-way.                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The only write invariant enforced here is `Σdebit == Σcredit`; a line may
//! carry both a debit and a credit.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::{checked_sum, Currency};

// =============================================================================
// System Account Codes
// =============================================================================

/// Codes of the default chart of accounts seeded on first run.
pub mod codes {
    pub const CASH: &str = "1001";
    pub const ACCOUNTS_RECEIVABLE: &str = "1100";
    pub const INVENTORY: &str = "1200";
    pub const ACCOUNTS_PAYABLE: &str = "2001";
    pub const OWNER_EQUITY: &str = "3001";
    pub const RETAINED_EARNINGS: &str = "3100";
    pub const SALES_REVENUE: &str = "4001";
    pub const COST_OF_GOODS_SOLD: &str = "5001";
    pub const INVENTORY_ADJUSTMENTS: &str = "5100";
}

// =============================================================================
// Account
// =============================================================================

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    Asset,
    Liability,
    Equity,
    Revenue,
    Expense,
}

impl AccountType {
    /// Debit-normal accounts grow with debits.
    pub const fn is_debit_normal(&self) -> bool {
        matches!(self, AccountType::Asset | AccountType::Expense)
    }

    /// Change of this account's natural balance for one line.
    ///
    /// ```rust
    /// use tally_core::accounting::AccountType;
    ///
    /// assert_eq!(AccountType::Asset.balance_delta(100, 0), 100);
    /// assert_eq!(AccountType::Liability.balance_delta(100, 0), -100);
    /// ```
    pub const fn balance_delta(&self, debit: i64, credit: i64) -> i64 {
        if self.is_debit_normal() {
            debit - credit
        } else {
            credit - debit
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AccountType::Asset => "asset",
            AccountType::Liability => "liability",
            AccountType::Equity => "equity",
            AccountType::Revenue => "revenue",
            AccountType::Expense => "expense",
        };
        f.write_str(s)
    }
}

impl FromStr for AccountType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "asset" => Ok(AccountType::Asset),
            "liability" => Ok(AccountType::Liability),
            "equity" => Ok(AccountType::Equity),
            "revenue" => Ok(AccountType::Revenue),
            "expense" => Ok(AccountType::Expense),
            other => Err(ValidationError::InvalidFormat {
                field: "account_type".to_string(),
                reason: format!("unknown account type '{}'", other),
            }),
        }
    }
}

/// A ledger account. Identity is `code`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Account {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub account_type: AccountType,
    pub parent_id: Option<i64>,
    pub is_system: bool,
    pub is_active: bool,
    /// Natural-side balance cache, moved by posted lines.
    pub balance: i64,
}

/// Input for account creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAccount {
    pub code: String,
    pub name: String,
    pub account_type: AccountType,
    pub parent_id: Option<i64>,
    #[serde(default)]
    pub is_system: bool,
}

impl NewAccount {
    pub fn new(code: impl Into<String>, name: impl Into<String>, account_type: AccountType) -> Self {
        NewAccount {
            code: code.into(),
            name: name.into(),
            account_type,
            parent_id: None,
            is_system: false,
        }
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.code.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "code".to_string(),
            }
            .into());
        }
        if self.name.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "name".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

// =============================================================================
// Journal Entry
// =============================================================================

/// One debit/credit line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct JournalLine {
    pub id: i64,
    pub journal_entry_id: i64,
    pub account_id: i64,
    pub debit: i64,
    pub credit: i64,
    pub description: Option<String>,
}

/// A stored journal entry with its lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct JournalEntry {
    pub id: i64,
    pub entry_number: String,
    #[ts(as = "String")]
    pub entry_date: NaiveDate,
    pub description: String,
    pub source_type: String,
    pub source_id: Option<i64>,
    pub is_posted: bool,
    pub is_reversed: bool,
    /// Id of the entry this one reverses.
    pub reversal_of: Option<i64>,
    pub total_amount: i64,
    pub currency: Currency,
    pub created_by: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[cfg_attr(feature = "sqlx", sqlx(skip))]
    pub lines: Vec<JournalLine>,
}

impl JournalEntry {
    /// Guards the `unposted → posted` transition.
    pub fn ensure_postable(&self) -> CoreResult<()> {
        if self.is_posted {
            return Err(CoreError::invalid_state(
                "JournalEntry",
                &self.entry_number,
                "entry is already posted",
            ));
        }
        Ok(())
    }

    /// Guards the `posted → reversed` transition.
    pub fn ensure_reversible(&self) -> CoreResult<()> {
        if !self.is_posted {
            return Err(CoreError::invalid_state(
                "JournalEntry",
                &self.entry_number,
                "only posted entries can be reversed",
            ));
        }
        if self.is_reversed {
            return Err(CoreError::invalid_state(
                "JournalEntry",
                &self.entry_number,
                "entry is already reversed",
            ));
        }
        Ok(())
    }

    /// Builds the mirror entry: every line's debit and credit swapped.
    pub fn reversal(&self, entry_date: NaiveDate, reason: &str, created_by: &str) -> NewJournalEntry {
        NewJournalEntry {
            entry_number: generate_entry_number("RV", entry_date),
            entry_date,
            description: format!("Reversal of {}: {}", self.entry_number, reason),
            source_type: "reversal".to_string(),
            source_id: Some(self.id),
            is_posted: true,
            reversal_of: Some(self.id),
            currency: self.currency,
            created_by: created_by.to_string(),
            lines: self
                .lines
                .iter()
                .map(|line| NewJournalLine {
                    account_id: line.account_id,
                    debit: line.credit,
                    credit: line.debit,
                    description: line.description.clone(),
                })
                .collect(),
        }
    }
}

/// Line input; the account is already resolved to an id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewJournalLine {
    pub account_id: i64,
    pub debit: i64,
    pub credit: i64,
    pub description: Option<String>,
}

impl NewJournalLine {
    pub fn debit(account_id: i64, amount: i64, description: impl Into<String>) -> Self {
        NewJournalLine {
            account_id,
            debit: amount,
            credit: 0,
            description: Some(description.into()),
        }
    }

    pub fn credit(account_id: i64, amount: i64, description: impl Into<String>) -> Self {
        NewJournalLine {
            account_id,
            debit: 0,
            credit: amount,
            description: Some(description.into()),
        }
    }
}

/// Entry input for `create_journal_entry`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewJournalEntry {
    pub entry_number: String,
    pub entry_date: NaiveDate,
    pub description: String,
    pub source_type: String,
    pub source_id: Option<i64>,
    pub is_posted: bool,
    pub reversal_of: Option<i64>,
    pub currency: Currency,
    pub created_by: String,
    pub lines: Vec<NewJournalLine>,
}

impl NewJournalEntry {
    /// Starts an entry with a generated `JE-` number and no lines.
    pub fn new(
        entry_date: NaiveDate,
        description: impl Into<String>,
        source_type: impl Into<String>,
        source_id: Option<i64>,
        currency: Currency,
        created_by: impl Into<String>,
    ) -> Self {
        NewJournalEntry {
            entry_number: generate_entry_number("JE", entry_date),
            entry_date,
            description: description.into(),
            source_type: source_type.into(),
            source_id,
            is_posted: false,
            reversal_of: None,
            currency,
            created_by: created_by.into(),
            lines: Vec::new(),
        }
    }

    /// Sets the posted flag.
    pub fn posted(mut self, is_posted: bool) -> Self {
        self.is_posted = is_posted;
        self
    }

    /// Adds a line, skipping lines with nothing on either side.
    pub fn line(mut self, line: NewJournalLine) -> Self {
        if line.debit != 0 || line.credit != 0 {
            self.lines.push(line);
        }
        self
    }

    /// `(Σdebit, Σcredit)`, saturating. [`NewJournalEntry::validate`] rejects
    /// entries whose sums do not fit.
    pub fn totals(&self) -> (i64, i64) {
        self.lines.iter().fold((0i64, 0i64), |(d, c), line| {
            (d.saturating_add(line.debit), c.saturating_add(line.credit))
        })
    }

    /// Enforces the balance invariant before anything is written.
    pub fn validate(&self) -> CoreResult<()> {
        if self.lines.is_empty() {
            return Err(ValidationError::Required {
                field: "lines".to_string(),
            }
            .into());
        }
        if self.lines.iter().any(|l| l.debit < 0 || l.credit < 0) {
            return Err(ValidationError::MustNotBeNegative {
                field: "debit/credit".to_string(),
            }
            .into());
        }
        let total_debit = checked_sum("debit", self.lines.iter().map(|l| l.debit))?;
        let total_credit = checked_sum("credit", self.lines.iter().map(|l| l.credit))?;
        if total_debit != total_credit {
            return Err(CoreError::UnbalancedEntry {
                entry_number: self.entry_number.clone(),
                total_debit,
                total_credit,
            });
        }
        Ok(())
    }
}

/// `PREFIX-YYYYMMDD-XXXXXXXX` with a random hex suffix.
pub fn generate_entry_number(prefix: &str, date: NaiveDate) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "{}-{}-{}",
        prefix,
        date.format("%Y%m%d"),
        suffix[..8].to_uppercase()
    )
}

// =============================================================================
// Unit Tests
// =============================================================================
