//! # Balance Reconciliation
//!
//! Compares every counterparty's cached balance with the `balance_after` of
//! its latest ledger row. The ledger is the source of truth; repair only
//! ever moves the cache toward it.
//!
//! ```text
//! customers ─┐                              ┌── cached == ledger ──► skip
//!            ├──► balance snapshots ──► drift
//! suppliers ─┘                              └── cached != ledger ──► DriftItem
//!                                                     │
//!                                              repair │ overwrite cache
//!                                                     ▼
//!                                           cached := last balance_after
//! ```
//!
//! A counterparty without ledger rows has nothing to compare against and is
//! never reported.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use tracing::{info, warn};
use ts_rs::TS;

use crate::error::ServiceResult;
use crate::notify::{Notifiers, TallyEvent};
use crate::usecase::{execute, TransactionalUseCase};
use tally_core::ledger::{BalanceSnapshot, ReconciliationReport};
use tally_db::{CounterpartyRepository, Database, LedgerRepository};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RepairResult {
    /// Counterparties whose cache was overwritten.
    pub repaired: usize,
    /// The drift found before repair.
    pub report: ReconciliationReport,
}

#[derive(Debug, Clone, Default)]
pub struct ReconciliationUseCase {
    notifiers: Notifiers,
}

impl ReconciliationUseCase {
    pub fn new(notifiers: Notifiers) -> Self {
        ReconciliationUseCase { notifiers }
    }

    /// Read-only drift report across customers and suppliers.
    ///
    /// Runs outside the two-phase runner since it writes nothing;
    /// [`ReconciliationUseCase::repair`] is the transactional counterpart.
    pub async fn execute(&self, db: &Database) -> ServiceResult<ReconciliationReport> {
        let mut conn = db.acquire().await?;
        let snapshots = snapshots(&mut *conn).await?;
        let report = ReconciliationReport::from_snapshots(&snapshots, Utc::now());

        if report.is_clean() {
            info!(
                customers = report.stats.customers_checked,
                suppliers = report.stats.suppliers_checked,
                "Balances reconciled, no drift"
            );
        } else {
            warn!(
                customers_drifted = report.stats.customers_drifted,
                suppliers_drifted = report.stats.suppliers_drifted,
                total_absolute_drift = report.stats.total_absolute_drift,
                "Balance drift detected"
            );
        }
        Ok(report)
    }

    /// Overwrites every drifted cache with its ledger balance in one
    /// transaction.
    pub async fn repair(&self, db: &Database, user_id: &str) -> ServiceResult<RepairResult> {
        execute(db, self, &(), user_id).await
    }
}

async fn snapshots(conn: &mut SqliteConnection) -> ServiceResult<Vec<BalanceSnapshot>> {
    let mut all = LedgerRepository::customers(conn).balance_snapshots().await?;
    all.extend(LedgerRepository::suppliers(conn).balance_snapshots().await?);
    Ok(all)
}

impl TransactionalUseCase for ReconciliationUseCase {
    type Input = ();
    type Output = RepairResult;

    async fn commit_phase(&self, conn: &mut SqliteConnection, _input: &(), user_id: &str) -> ServiceResult<RepairResult> {
        let snapshots = snapshots(conn).await?;
        let report = ReconciliationReport::from_snapshots(&snapshots, Utc::now());

        let mut counterparties = CounterpartyRepository::new(conn);
        for item in &report.items {
            counterparties
                .overwrite_cached_balance(item.kind, item.counterparty_id, item.ledger_balance)
                .await?;
            info!(
                kind = %item.kind,
                counterparty_id = item.counterparty_id,
                from = item.cached_balance,
                to = item.ledger_balance,
                user_id = %user_id,
                "Cached balance repaired"
            );
        }

        Ok(RepairResult {
            repaired: report.items.len(),
            report,
        })
    }

    async fn side_effects_phase(&self, _db: &Database, output: &RepairResult, _input: &(), _user_id: &str) {
        if output.repaired > 0 {
            self.notifiers.publish(&TallyEvent::BalancesRepaired {
                repaired: output.repaired,
            });
        }
    }
}
