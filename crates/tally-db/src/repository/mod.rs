//! # Repository Module
//!
//! Database repository implementations for Tally.
//!
//! ## Two Kinds of Repository
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Write Side vs Read Side                              │
//! │                                                                         │
//! │  Use case                                                               │
//! │       │  let mut tx = db.begin().await?;                                │
//! │       │  PaymentRepository::new(&mut *tx).create(..)                    │
//! │       │  AccountingRepository::new(&mut *tx).create_journal_entry(..)   │
//! │       │  LedgerRepository::customers(&mut *tx).create(..)               │
//! │       │  tx.commit().await?;                                            │
//! │       ▼                                                                 │
//! │  Write repositories borrow ONE connection (`&mut SqliteConnection`),    │
//! │  so every write of a use case lands in the same transaction.           │
//! │                                                                         │
//! │  db.reports().trial_balance(..)                                         │
//! │       ▼                                                                 │
//! │  ReportRepository owns a pool handle and never writes.                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`AccountingRepository`] - Chart of accounts and journal entries
//! - [`BatchRepository`] - Product batches and FEFO depletion
//! - [`CounterpartyRepository`] - Customers and suppliers
//! - [`LedgerRepository`] - Append-only counterparty ledgers
//! - [`PaymentRepository`] - Payments and idempotency lookup
//! - [`ProductRepository`] - Products and stock movements
//! - [`PurchaseRepository`] - Purchase headers and lines
//! - [`SaleRepository`] - Sale headers, lines and batch records
//! - [`ReportRepository`] - Trial balance, P&L, balance sheet

pub mod accounting;
pub mod batch;
pub mod counterparty;
pub mod ledger;
pub mod payment;
pub mod product;
pub mod purchase;
pub mod report;
pub mod sale;

pub use accounting::AccountingRepository;
pub use batch::{BatchRepository, NewBatch};
pub use counterparty::CounterpartyRepository;
pub use ledger::LedgerRepository;
pub use payment::{NewPayment, PaymentRepository};
pub use product::{ProductRepository, StockChange};
pub use purchase::{NewPurchase, PurchaseRepository};
pub use report::ReportRepository;
pub use sale::{NewSale, SaleRepository};
