//! # Purchase Posting
//!
//! Receives a supplier invoice into stock. Each line lands in exactly one
//! batch: the named batch when it already exists for the product, a new one
//! otherwise.
//!
//! ```text
//! lines ──► resolve batch ──► receive (+on_hand, +received, reactivate)
//!                         └──► purchase_items row
//!                         └──► movement (+qty, stock before/after)
//!
//! journal (optional):  Dr Inventory (total)  Cr Cash (paid)  Cr Payables (due)
//! due > 0:             supplier ledger `purchase` row
//! ```

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use tracing::info;
use ts_rs::TS;
use uuid::Uuid;

use crate::config::{AccountCodes, TallyConfig};
use crate::error::ServiceResult;
use crate::notify::{Notifiers, TallyEvent};
use crate::usecase::TransactionalUseCase;
use tally_core::accounting::{NewJournalEntry, NewJournalLine};
use tally_core::ledger::{CounterpartyKind, LedgerEntry, LedgerTransactionType, NewLedgerEntry};
use tally_core::money::{checked_sum, line_total, Currency};
use tally_core::types::{MovementType, Purchase, PurchaseItem};
use tally_core::validation::{
    validate_exchange_rate, validate_idempotency_key, validate_non_negative, validate_paid_amount,
    validate_quantity, validate_required,
};
use tally_core::{CoreError, ValidationError};
use tally_db::{
    AccountingRepository, BatchRepository, CounterpartyRepository, Database, LedgerRepository, NewBatch,
    NewPurchase, ProductRepository, PurchaseRepository, StockChange,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PurchaseLineInput {
    pub product_id: i64,
    pub quantity: i64,
    pub cost_per_unit: i64,
    /// Matched against existing batches of the product; generated when absent.
    #[serde(default)]
    pub batch_number: Option<String>,
    #[serde(default)]
    #[ts(as = "Option<String>")]
    pub expiry_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PostPurchaseInput {
    pub supplier_id: i64,
    pub invoice_number: String,
    pub items: Vec<PurchaseLineInput>,
    pub paid_amount: i64,
    #[serde(default)]
    pub currency: Option<Currency>,
    #[serde(default)]
    pub exchange_rate: Option<f64>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PurchaseResult {
    pub purchase: Purchase,
    pub items: Vec<PurchaseItem>,
    pub ledger_entry: Option<LedgerEntry>,
    pub replayed: bool,
}

#[derive(Debug, Clone)]
pub struct PostPurchaseUseCase {
    currency: Currency,
    auto_post: bool,
    post_journal: bool,
    accounts: AccountCodes,
    notifiers: Notifiers,
}

impl PostPurchaseUseCase {
    pub fn new(config: &TallyConfig, notifiers: Notifiers) -> Self {
        PostPurchaseUseCase {
            currency: config.currency(),
            auto_post: config.accounting.auto_post,
            post_journal: config.accounting.post_purchase_journal,
            accounts: config.accounts().clone(),
            notifiers,
        }
    }

    fn validate(input: &PostPurchaseInput) -> Result<(), ValidationError> {
        validate_required("invoice_number", &input.invoice_number)?;
        if input.items.is_empty() {
            return Err(ValidationError::Required {
                field: "items".to_string(),
            });
        }
        for line in &input.items {
            validate_quantity(line.quantity)?;
            validate_non_negative("cost_per_unit", line.cost_per_unit)?;
            if let Some(number) = line.batch_number.as_deref() {
                validate_required("batch_number", number)?;
            }
        }
        validate_non_negative("paid_amount", input.paid_amount)?;
        validate_idempotency_key(input.idempotency_key.as_deref())?;
        if let Some(rate) = input.exchange_rate {
            validate_exchange_rate(rate)?;
        }
        Ok(())
    }

    /// A replayed key must describe the same document as the request that
    /// first used it. Line order does not matter.
    fn is_same_request(
        existing: &Purchase,
        items: &[PurchaseItem],
        input: &PostPurchaseInput,
        currency: Currency,
        total: i64,
    ) -> bool {
        let mut stored: Vec<(i64, i64, i64)> = items
            .iter()
            .map(|i| (i.product_id, i.quantity, i.cost_per_unit))
            .collect();
        let mut requested: Vec<(i64, i64, i64)> = input
            .items
            .iter()
            .map(|l| (l.product_id, l.quantity, l.cost_per_unit))
            .collect();
        stored.sort_unstable();
        requested.sort_unstable();

        existing.supplier_id == input.supplier_id
            && existing.invoice_number == input.invoice_number.trim()
            && existing.currency == currency
            && existing.total == total
            && existing.paid_amount == input.paid_amount
            && stored == requested
    }

    /// Finds the line's batch or opens a new one, then receives into it.
    async fn receive_line(conn: &mut SqliteConnection, line: &PurchaseLineInput) -> ServiceResult<i64> {
        let mut batches = BatchRepository::new(conn);
        let existing = match line.batch_number.as_deref() {
            Some(number) => batches.find_by_number(line.product_id, number).await?,
            None => None,
        };

        let batch = match existing {
            Some(batch) if batch.cost_per_unit != line.cost_per_unit => {
                return Err(CoreError::conflict(
                    "ProductBatch",
                    batch.batch_number,
                    "batch already exists with a different unit cost",
                )
                .into());
            }
            Some(batch) => batch,
            None => {
                let batch_number = line.batch_number.clone().unwrap_or_else(|| {
                    let suffix = Uuid::new_v4().simple().to_string();
                    format!("B-{}", suffix[..8].to_uppercase())
                });
                batches
                    .create(&NewBatch {
                        product_id: line.product_id,
                        batch_number,
                        expiry_date: line.expiry_date,
                        cost_per_unit: line.cost_per_unit,
                    })
                    .await?
            }
        };

        batches.receive(batch.id, line.quantity).await?;
        Ok(batch.id)
    }
}

impl TransactionalUseCase for PostPurchaseUseCase {
    type Input = PostPurchaseInput;
    type Output = PurchaseResult;

    async fn commit_phase(
        &self,
        conn: &mut SqliteConnection,
        input: &PostPurchaseInput,
        user_id: &str,
    ) -> ServiceResult<PurchaseResult> {
        Self::validate(input).map_err(CoreError::from)?;

        let line_totals = input
            .items
            .iter()
            .map(|l| line_total(l.cost_per_unit, l.quantity))
            .collect::<Result<Vec<_>, _>>()
            .map_err(CoreError::from)?;
        let total = checked_sum("total", line_totals).map_err(CoreError::from)?;
        validate_paid_amount(input.paid_amount, total).map_err(CoreError::from)?;
        let currency = input.currency.unwrap_or(self.currency);

        if let Some(key) = input.idempotency_key.as_deref() {
            let mut purchases = PurchaseRepository::new(conn);
            if let Some(existing) = purchases.find_by_idempotency_key(key).await? {
                let items = purchases.items(existing.id).await?;
                if !Self::is_same_request(&existing, &items, input, currency, total) {
                    return Err(
                        CoreError::conflict("Purchase", key, "idempotency key was used for a different purchase").into(),
                    );
                }
                let ledger_entry = if existing.due_amount > 0 {
                    LedgerRepository::suppliers(conn)
                        .list(existing.supplier_id)
                        .await?
                        .into_iter()
                        .find(|e| {
                            e.transaction_type == LedgerTransactionType::Purchase && e.document_id == Some(existing.id)
                        })
                } else {
                    None
                };
                info!(purchase_id = existing.id, key = %key, "Purchase replayed from idempotency key");
                return Ok(PurchaseResult {
                    purchase: existing,
                    items,
                    ledger_entry,
                    replayed: true,
                });
            }
        }

        let supplier = CounterpartyRepository::new(conn)
            .get(CounterpartyKind::Supplier, input.supplier_id)
            .await?;

        let due_amount = total - input.paid_amount;

        let purchase = PurchaseRepository::new(conn)
            .insert(&NewPurchase {
                invoice_number: input.invoice_number.trim().to_string(),
                supplier_id: supplier.id,
                idempotency_key: input.idempotency_key.clone(),
                currency,
                exchange_rate: input.exchange_rate.unwrap_or(1.0),
                total,
                paid_amount: input.paid_amount,
                due_amount,
                created_by: user_id.to_string(),
            })
            .await?;

        let mut items = Vec::with_capacity(input.items.len());
        for line in &input.items {
            ProductRepository::new(conn).get(line.product_id).await?;
            let batch_id = Self::receive_line(conn, line).await?;

            items.push(
                PurchaseRepository::new(conn)
                    .insert_item(purchase.id, line.product_id, batch_id, line.quantity, line.cost_per_unit)
                    .await?,
            );

            ProductRepository::new(conn)
                .adjust_stock(&StockChange {
                    product_id: line.product_id,
                    batch_id: Some(batch_id),
                    movement_type: MovementType::Purchase,
                    quantity: line.quantity,
                    reference_type: "purchase",
                    reference_id: purchase.id,
                    created_by: user_id,
                })
                .await?;
        }

        let mut journal_entry_id = None;
        if self.post_journal && total > 0 {
            let mut accounting = AccountingRepository::new(conn);
            let inventory = accounting.account_id_for_code(&self.accounts.inventory).await?;
            let cash = accounting.account_id_for_code(&self.accounts.cash).await?;
            let payables = accounting.account_id_for_code(&self.accounts.payables).await?;

            let description = format!("Purchase {} from {}", purchase.invoice_number, supplier.name);
            let entry = NewJournalEntry::new(
                Utc::now().date_naive(),
                description,
                "purchase",
                Some(purchase.id),
                currency,
                user_id,
            )
            .posted(self.auto_post)
            .line(NewJournalLine::debit(inventory, total, "Inventory received"))
            .line(NewJournalLine::credit(cash, input.paid_amount, "Cash paid"))
            .line(NewJournalLine::credit(payables, due_amount, "Amount owed"));

            let journal = accounting.create_journal_entry(&entry).await?;
            PurchaseRepository::new(conn).set_journal_entry(purchase.id, journal.id).await?;
            journal_entry_id = Some(journal.id);
        }

        let ledger_entry = if due_amount > 0 {
            let mut row = NewLedgerEntry::new(supplier.id, LedgerTransactionType::Purchase, due_amount, user_id);
            row.document_id = Some(purchase.id);
            row.journal_entry_id = journal_entry_id;
            Some(LedgerRepository::suppliers(conn).create(&row).await?)
        } else {
            None
        };

        let purchase = PurchaseRepository::new(conn).get(purchase.id).await?;
        info!(
            purchase_id = purchase.id,
            supplier_id = supplier.id,
            total,
            due = due_amount,
            items = items.len(),
            "Purchase posted"
        );

        Ok(PurchaseResult {
            purchase,
            items,
            ledger_entry,
            replayed: false,
        })
    }

    async fn side_effects_phase(
        &self,
        _db: &Database,
        output: &PurchaseResult,
        _input: &PostPurchaseInput,
        _user_id: &str,
    ) {
        if output.replayed {
            return;
        }
        self.notifiers.publish(&TallyEvent::PurchaseReceived {
            purchase_id: output.purchase.id,
            supplier_id: output.purchase.supplier_id,
            total: output.purchase.total,
        });
    }
}
