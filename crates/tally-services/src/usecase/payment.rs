//! # Payment Recording
//!
//! Records a customer or supplier payment: the payment row, the journal
//! entry and the ledger row, all in one transaction.
//!
//! ## Journal Lines
//! ```text
//! ┌────────────┬──────────────────────────┬──────────────────────────┐
//! │ Payer      │ Debit                    │ Credit                   │
//! ├────────────┼──────────────────────────┼──────────────────────────┤
//! │ Customer   │ Cash                     │ Accounts Receivable      │
//! │ Supplier   │ Accounts Payable         │ Cash                     │
//! └────────────┴──────────────────────────┴──────────────────────────┘
//! ```
//!
//! ## Retry With the Same Idempotency Key
//! ```text
//! key seen? ──no──► payment → journal entry → ledger row
//!    │
//!   yes ──► same counterparty and amount? ──yes──► original result, no writes
//!                                          └─no──► Conflict
//! ```

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use tracing::info;
use ts_rs::TS;

use crate::config::{AccountCodes, TallyConfig};
use crate::error::ServiceResult;
use crate::notify::{Notifiers, TallyEvent};
use crate::usecase::TransactionalUseCase;
use tally_core::accounting::{NewJournalEntry, NewJournalLine};
use tally_core::ledger::{CounterpartyKind, LedgerEntry, LedgerTransactionType, NewLedgerEntry};
use tally_core::money::Currency;
use tally_core::types::{Payment, PaymentMethod};
use tally_core::validation::{validate_idempotency_key, validate_notes, validate_payment_amount};
use tally_core::CoreError;
use tally_db::{AccountingRepository, CounterpartyRepository, Database, LedgerRepository, NewPayment, PaymentRepository};

/// Input for recording a payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RecordPaymentInput {
    pub counterparty_id: i64,
    /// Minor units of the base currency.
    pub amount: i64,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub idempotency_key: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PaymentResult {
    pub payment: Payment,
    pub ledger_entry: LedgerEntry,
    pub journal_entry_id: Option<i64>,
    /// True when an earlier call with the same key produced this result.
    pub replayed: bool,
}

/// Records payments for one kind of counterparty.
#[derive(Debug, Clone)]
pub struct RecordPaymentUseCase {
    kind: CounterpartyKind,
    currency: Currency,
    auto_post: bool,
    accounts: AccountCodes,
    notifiers: Notifiers,
}

impl RecordPaymentUseCase {
    pub fn new(kind: CounterpartyKind, config: &TallyConfig, notifiers: Notifiers) -> Self {
        RecordPaymentUseCase {
            kind,
            currency: config.currency(),
            auto_post: config.accounting.auto_post,
            accounts: config.accounts().clone(),
            notifiers,
        }
    }

    /// Customer payments reduce receivables.
    pub fn customer(config: &TallyConfig, notifiers: Notifiers) -> Self {
        Self::new(CounterpartyKind::Customer, config, notifiers)
    }

    /// Supplier payments reduce payables.
    pub fn supplier(config: &TallyConfig, notifiers: Notifiers) -> Self {
        Self::new(CounterpartyKind::Supplier, config, notifiers)
    }

    pub fn kind(&self) -> CounterpartyKind {
        self.kind
    }

    /// Returns the original result for a reused key, or `Conflict` when
    /// the key belongs to a different request.
    async fn replay(
        &self,
        conn: &mut SqliteConnection,
        existing: Payment,
        input: &RecordPaymentInput,
    ) -> ServiceResult<PaymentResult> {
        let key = existing.idempotency_key.clone().unwrap_or_default();
        if existing.counterparty_kind != self.kind
            || existing.counterparty_id != input.counterparty_id
            || existing.amount != input.amount
        {
            return Err(CoreError::conflict(
                "Payment",
                key,
                "idempotency key was used for a different payment",
            )
            .into());
        }

        let ledger_entry = LedgerRepository::new(conn, self.kind)
            .find_by_payment_id(existing.id)
            .await?
            .ok_or_else(|| CoreError::not_found("LedgerEntry", format!("payment {}", existing.id)))?;

        info!(payment_id = existing.id, key = %key, "Payment replayed from idempotency key");
        Ok(PaymentResult {
            journal_entry_id: ledger_entry.journal_entry_id,
            payment: existing,
            ledger_entry,
            replayed: true,
        })
    }
}

impl TransactionalUseCase for RecordPaymentUseCase {
    type Input = RecordPaymentInput;
    type Output = PaymentResult;

    async fn commit_phase(
        &self,
        conn: &mut SqliteConnection,
        input: &RecordPaymentInput,
        user_id: &str,
    ) -> ServiceResult<PaymentResult> {
        validate_payment_amount(input.amount).map_err(CoreError::from)?;
        validate_idempotency_key(input.idempotency_key.as_deref()).map_err(CoreError::from)?;
        validate_notes(input.notes.as_deref()).map_err(CoreError::from)?;

        let counterparty = CounterpartyRepository::new(conn)
            .get(self.kind, input.counterparty_id)
            .await?;

        if let Some(key) = input.idempotency_key.as_deref() {
            if let Some(existing) = PaymentRepository::new(conn).find_by_idempotency_key(key).await? {
                return self.replay(conn, existing, input).await;
            }
        }

        let payment = PaymentRepository::new(conn)
            .create(&NewPayment {
                counterparty_kind: self.kind,
                counterparty_id: counterparty.id,
                amount: input.amount,
                currency: self.currency,
                payment_method: input.payment_method,
                idempotency_key: input.idempotency_key.clone(),
                notes: input.notes.clone(),
                created_by: user_id.to_string(),
            })
            .await?;

        let mut accounting = AccountingRepository::new(conn);
        let cash = accounting.account_id_for_code(&self.accounts.cash).await?;
        let (debit, credit, description) = match self.kind {
            CounterpartyKind::Customer => {
                let receivables = accounting.account_id_for_code(&self.accounts.receivables).await?;
                (cash, receivables, format!("Payment from {}", counterparty.name))
            }
            CounterpartyKind::Supplier => {
                let payables = accounting.account_id_for_code(&self.accounts.payables).await?;
                (payables, cash, format!("Payment to {}", counterparty.name))
            }
        };
        let entry = NewJournalEntry::new(
            Utc::now().date_naive(),
            description.as_str(),
            "payment",
            Some(payment.id),
            self.currency,
            user_id,
        )
        .posted(self.auto_post)
        .line(NewJournalLine::debit(debit, input.amount, description.as_str()))
        .line(NewJournalLine::credit(credit, input.amount, description.as_str()));
        let journal = accounting.create_journal_entry(&entry).await?;

        let mut ledger_row = NewLedgerEntry::new(counterparty.id, LedgerTransactionType::Payment, input.amount, user_id);
        ledger_row.payment_id = Some(payment.id);
        ledger_row.journal_entry_id = Some(journal.id);
        ledger_row.notes = input.notes.clone();
        let ledger_entry = LedgerRepository::new(conn, self.kind).create(&ledger_row).await?;

        info!(
            payment_id = payment.id,
            kind = %self.kind,
            counterparty_id = counterparty.id,
            amount = input.amount,
            balance_after = ledger_entry.balance_after,
            "Payment recorded"
        );

        Ok(PaymentResult {
            payment,
            ledger_entry,
            journal_entry_id: Some(journal.id),
            replayed: false,
        })
    }

    async fn side_effects_phase(
        &self,
        _db: &Database,
        output: &PaymentResult,
        _input: &RecordPaymentInput,
        _user_id: &str,
    ) {
        if output.replayed {
            return;
        }
        self.notifiers.publish(&TallyEvent::PaymentRecorded {
            payment_id: output.payment.id,
            kind: self.kind,
            counterparty_id: output.payment.counterparty_id,
            amount: output.payment.amount,
            balance_after: output.ledger_entry.balance_after,
        });
    }
}
