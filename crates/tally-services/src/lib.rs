//! # tally-services: Use Cases for Tally
//!
//! The write paths of the financial core. Each use case composes the
//! repositories from `tally-db` inside a single transaction and publishes
//! notifications only after that transaction commits.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Use Case Layer                                   │
//! │                                                                         │
//! │  caller (UI bridge, `tally` binary)                                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │  usecase::execute                                                │  │
//! │  │                                                                  │  │
//! │  │   RecordPaymentUseCase   PostSaleUseCase   PostPurchaseUseCase   │  │
//! │  │   ReconciliationUseCase                                          │  │
//! │  └───────────────┬──────────────────────────────┬───────────────────┘  │
//! │                  │ commit phase                  │ side effects         │
//! │                  ▼                               ▼                      │
//! │  ┌───────────────────────────────┐   ┌────────────────────────────┐    │
//! │  │ tally-db repositories         │   │ Notifiers                  │    │
//! │  │ (one SqliteConnection, one tx)│   │ tracing, broadcast         │    │
//! │  └───────────────────────────────┘   └────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`usecase`] - Two-phase contract, transactional runner, use cases
//! - [`notify`] - Post-commit events and their sinks
//! - [`config`] - `tally.toml` loading with environment overrides
//! - [`error`] - Service errors and their stable kinds
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tally_core::ledger::CounterpartyKind;
//! use tally_services::{execute, Notifiers, RecordPaymentInput, RecordPaymentUseCase, TallyConfig};
//!
//! let config = TallyConfig::load_or_default(None);
//! let db = tally_db::Database::new(config.db_config()).await?;
//!
//! let use_case = RecordPaymentUseCase::customer(&config, Notifiers::tracing());
//! let result = execute(&db, &use_case, &input, "cashier-1").await?;
//! println!("Balance now {}", result.ledger_entry.balance_after);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod notify;
pub mod usecase;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{AccountCodes, TallyConfig};
pub use error::{ErrorKind, ServiceError, ServiceResult};
pub use notify::{BroadcastNotifier, Notifier, Notifiers, TallyEvent, TracingNotifier};
pub use usecase::{
    execute, run_in_transaction, PaymentResult, PostPurchaseInput, PostPurchaseUseCase, PostSaleInput,
    PostSaleUseCase, PurchaseLineInput, PurchaseResult, ReconciliationUseCase, RecordPaymentInput,
    RecordPaymentUseCase, RepairResult, SaleLineInput, SaleResult, TransactionalUseCase,
};
