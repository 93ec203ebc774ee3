//! # tally-core: Pure Financial Logic
//!
//! Everything that decides whether the books stay consistent, with zero I/O.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Tally Architecture                             │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │               tally-services (use cases)                        │   │
//! │  │   RecordPayment, PostSale, PostPurchase, Reconciliation         │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ tally-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────┐ ┌──────────┐ ┌────────────┐ ┌──────────┐        │   │
//! │  │   │  money   │ │inventory │ │ accounting │ │  ledger  │        │   │
//! │  │   │ rounding │ │   FEFO   │ │  Σd == Σc  │ │ running  │        │   │
//! │  │   │  totals  │ │ planning │ │  reversal  │ │ balances │        │   │
//! │  │   └──────────┘ └──────────┘ └────────────┘ └──────────┘        │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    tally-db (Database Layer)                    │   │
//! │  │              SQLite queries, migrations, repositories           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`money`] - Integer money, currency rounding, sale totals
//! - [`inventory`] - Batches and the FEFO depletion planner
//! - [`accounting`] - Accounts, journal entries, balance check, reversal
//! - [`ledger`] - Customer/supplier ledgers, chain verification, drift
//! - [`reports`] - Trial balance, profit & loss, balance sheet
//! - [`types`] - Products, payments, sales, purchases, movements
//! - [`validation`] - Field rules
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use tally_core::money::{round_by_currency, Currency};
//!
//! // IQD amounts round up to the next 250 fils
//! assert_eq!(round_by_currency(1001, Currency::Iqd), 1250);
//! assert_eq!(round_by_currency(1001, Currency::Usd), 1001);
//! ```
//!
//! The `sqlx` feature adds `sqlx::Type` / `sqlx::FromRow` derives so the
//! database layer can decode rows straight into these types.

// =============================================================================
// Module Declarations
// =============================================================================

pub mod accounting;
pub mod error;
pub mod inventory;
pub mod ledger;
pub mod money;
pub mod reports;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use accounting::{Account, AccountType, JournalEntry, JournalLine, NewJournalEntry, NewJournalLine};
pub use error::{CoreError, CoreResult, ValidationError};
pub use inventory::{BatchStatus, DepletionPlan, ProductBatch};
pub use ledger::{CounterpartyKind, LedgerEntry, LedgerTransactionType, NewLedgerEntry};
pub use money::{Currency, Money};
pub use types::*;
