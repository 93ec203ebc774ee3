//! # tally-db: Database Layer for Tally
//!
//! SQLite persistence for the financial core: schema, migrations and the
//! repositories the use cases compose inside one transaction.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           Tally Data Flow                               │
//! │                                                                         │
//! │  tally-services use case (record_payment, post_sale, ...)              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     tally-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐   ┌──────────────┐   │   │
//! │  │   │   Database    │    │  Repositories  │   │  Migrations  │   │   │
//! │  │   │   (pool.rs)   │    │                │   │  (embedded)  │   │   │
//! │  │   │               │    │ Accounting     │   │              │   │   │
//! │  │   │ SqlitePool    │    │ Ledger         │   │ 001_initial  │   │   │
//! │  │   │ begin()       │◄───│ Batch, Product │   │ 002_chart    │   │   │
//! │  │   │ acquire()     │    │ Payment, Sale  │   │              │   │   │
//! │  │   └───────────────┘    └────────────────┘   └──────────────┘   │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database (WAL)                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool, transaction boundary
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tally_db::{Database, DbConfig, LedgerRepository};
//!
//! let db = Database::new(DbConfig::new("path/to/tally.db")).await?;
//!
//! let mut tx = db.begin().await?;
//! let balance = LedgerRepository::customers(&mut *tx).last_balance(7).await?;
//! tx.commit().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::{
    AccountingRepository, BatchRepository, CounterpartyRepository, LedgerRepository, NewBatch, NewPayment,
    NewPurchase, NewSale, PaymentRepository, ProductRepository, PurchaseRepository, ReportRepository,
    SaleRepository, StockChange,
};
