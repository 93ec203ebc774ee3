//! # Use Cases
//!
//! Every write use case runs in two phases.
//!
//! ## Execution Contract
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Two-Phase Execution                                  │
//! │                                                                         │
//! │  execute(db, use_case, input, user_id)                                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  run_in_transaction                                                     │
//! │  ├── tx = db.begin()                                                    │
//! │  ├── commit_phase(&mut *tx, input, user_id)                             │
//! │  │     • receives ONLY the transaction's connection                     │
//! │  │     • every repository borrows that connection                       │
//! │  │     • first error → tx.rollback(), error returned unmodified         │
//! │  └── tx.commit()                                                        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  side_effects_phase(db, output, input, user_id)                         │
//! │     • runs after commit, may be skipped or retried                      │
//! │     • cannot fail the call; problems are logged                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The commit phase has no way to reach the pool, so every write it makes
//! belongs to the one transaction. A use case cannot hand an arbitrary
//! closure to the runner; it has to implement [`TransactionalUseCase`].

pub mod payment;
pub mod purchase;
pub mod reconciliation;
pub mod sale;

use sqlx::SqliteConnection;
use tally_db::{Database, DbError};
use tracing::{debug, warn};

use crate::error::ServiceResult;

pub use payment::{PaymentResult, RecordPaymentInput, RecordPaymentUseCase};
pub use purchase::{PostPurchaseInput, PostPurchaseUseCase, PurchaseLineInput, PurchaseResult};
pub use reconciliation::{ReconciliationUseCase, RepairResult};
pub use sale::{PostSaleInput, PostSaleUseCase, SaleLineInput, SaleResult};

/// A use case with a transactional commit phase and a post-commit
/// side-effects phase.
#[allow(async_fn_in_trait)]
pub trait TransactionalUseCase {
    type Input;
    type Output;

    /// All financial writes. Runs inside the caller's transaction and must
    /// write only through `conn`.
    async fn commit_phase(
        &self,
        conn: &mut SqliteConnection,
        input: &Self::Input,
        user_id: &str,
    ) -> ServiceResult<Self::Output>;

    /// Follow-ups that tolerate being skipped (notifications, low-stock
    /// checks). Runs after commit.
    async fn side_effects_phase(&self, db: &Database, output: &Self::Output, input: &Self::Input, user_id: &str);
}

/// Runs the commit phase inside one transaction.
///
/// Commits on success. On the first error the transaction is rolled back
/// and the error is returned as-is.
pub async fn run_in_transaction<U: TransactionalUseCase>(
    db: &Database,
    use_case: &U,
    input: &U::Input,
    user_id: &str,
) -> ServiceResult<U::Output> {
    let mut tx = db.begin().await?;

    match use_case.commit_phase(&mut *tx, input, user_id).await {
        Ok(output) => {
            tx.commit()
                .await
                .map_err(|e| DbError::TransactionFailed(e.to_string()))?;
            debug!("Transaction committed");
            Ok(output)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, "Rollback failed");
            }
            debug!(error = %err, "Transaction rolled back");
            Err(err)
        }
    }
}

/// Commit phase, then side effects.
pub async fn execute<U: TransactionalUseCase>(
    db: &Database,
    use_case: &U,
    input: &U::Input,
    user_id: &str,
) -> ServiceResult<U::Output> {
    let output = run_in_transaction(db, use_case, input, user_id).await?;
    use_case.side_effects_phase(db, &output, input, user_id).await;
    Ok(output)
}
