//! # Sale Posting
//!
//! Turns a cart into a posted sale in one transaction.
//!
//! ## Commit Phase
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. validate lines, totals, paid amount                                 │
//! │  2. idempotency key seen?  ──yes──► original sale, nothing written      │
//! │  3. per line: FEFO deplete ──► DepletionPlan (frozen batch costs)       │
//! │  4. sales row (cogs, profit, margin from the plans)                     │
//! │  5. per line: sale_items + sale_item_batches + stock movements          │
//! │  6. journal:  Dr Cash (paid)  Dr Receivables (due)  Cr Revenue (total)  │
//! │               Dr COGS         Cr Inventory          (FEFO cost)         │
//! │  7. due > 0:  customer ledger `sale` row                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Any `InsufficientStock` on any line rolls the whole sale back, including
//! batches already depleted for earlier lines.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use tracing::{info, warn};
use ts_rs::TS;

use crate::config::{AccountCodes, TallyConfig};
use crate::error::ServiceResult;
use crate::notify::{Notifiers, TallyEvent};
use crate::usecase::TransactionalUseCase;
use tally_core::accounting::{generate_entry_number, NewJournalEntry, NewJournalLine};
use tally_core::inventory::DepletionPlan;
use tally_core::ledger::{CounterpartyKind, LedgerEntry, LedgerTransactionType, NewLedgerEntry};
use tally_core::money::{checked_sum, margin_bps, Currency, Discount, SaleTotals};
use tally_core::types::{MovementType, Sale, SaleItem, SaleItemBatch, TaxRate};
use tally_core::validation::{
    validate_exchange_rate, validate_idempotency_key, validate_non_negative, validate_paid_amount,
    validate_quantity, validate_tax_rate_bps,
};
use tally_core::{CoreError, ValidationError};
use tally_db::{
    AccountingRepository, BatchRepository, CounterpartyRepository, Database, LedgerRepository, NewSale,
    ProductRepository, SaleRepository, StockChange,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SaleLineInput {
    pub product_id: i64,
    /// Base units.
    pub quantity: i64,
    pub unit_price: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PostSaleInput {
    /// Required when anything is left unpaid.
    #[serde(default)]
    pub customer_id: Option<i64>,
    pub items: Vec<SaleLineInput>,
    #[serde(default)]
    pub discount: Discount,
    #[serde(default)]
    pub tax_rate_bps: u32,
    pub paid_amount: i64,
    /// Defaults to the configured base currency.
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
pub struct SaleResult {
    pub sale: Sale,
    pub items: Vec<SaleItem>,
    pub batches: Vec<SaleItemBatch>,
    pub ledger_entry: Option<LedgerEntry>,
    pub replayed: bool,
}

#[derive(Debug, Clone)]
pub struct PostSaleUseCase {
    currency: Currency,
    auto_post: bool,
    accounts: AccountCodes,
    low_stock_threshold: i64,
    notifiers: Notifiers,
}

impl PostSaleUseCase {
    pub fn new(config: &TallyConfig, notifiers: Notifiers) -> Self {
        PostSaleUseCase {
            currency: config.currency(),
            auto_post: config.accounting.auto_post,
            accounts: config.accounts().clone(),
            low_stock_threshold: config.inventory.low_stock_threshold,
            notifiers,
        }
    }

    fn validate(input: &PostSaleInput) -> Result<(), ValidationError> {
        if input.items.is_empty() {
            return Err(ValidationError::Required {
                field: "items".to_string(),
            });
        }
        for line in &input.items {
            validate_quantity(line.quantity)?;
            validate_non_negative("unit_price", line.unit_price)?;
        }
        validate_tax_rate_bps(input.tax_rate_bps)?;
        validate_non_negative("paid_amount", input.paid_amount)?;
        validate_idempotency_key(input.idempotency_key.as_deref())?;
        if let Some(rate) = input.exchange_rate {
            validate_exchange_rate(rate)?;
        }
        Ok(())
    }

    /// A replayed key must describe the same sale as the request that first
    /// used it. Line order does not matter.
    fn is_same_request(stored: &SaleResult, input: &PostSaleInput, currency: Currency, totals: &SaleTotals) -> bool {
        let mut stored_lines: Vec<(i64, i64, i64)> = stored
            .items
            .iter()
            .map(|i| (i.product_id, i.quantity, i.unit_price))
            .collect();
        let mut requested: Vec<(i64, i64, i64)> = input
            .items
            .iter()
            .map(|l| (l.product_id, l.quantity, l.unit_price))
            .collect();
        stored_lines.sort_unstable();
        requested.sort_unstable();

        let sale = &stored.sale;
        sale.customer_id == input.customer_id
            && sale.currency == currency
            && sale.subtotal == totals.subtotal
            && sale.discount == totals.discount
            && sale.tax == totals.tax
            && sale.total == totals.total
            && sale.paid_amount == input.paid_amount
            && stored_lines == requested
    }

    async fn load(conn: &mut SqliteConnection, sale: Sale, replayed: bool) -> ServiceResult<SaleResult> {
        let mut sales = SaleRepository::new(conn);
        let items = sales.items(sale.id).await?;
        let batches = sales.item_batches(sale.id).await?;

        let ledger_entry = match sale.customer_id {
            Some(customer_id) if sale.due_amount > 0 => LedgerRepository::customers(conn)
                .list(customer_id)
                .await?
                .into_iter()
                .find(|e| e.transaction_type == LedgerTransactionType::Sale && e.document_id == Some(sale.id)),
            _ => None,
        };

        Ok(SaleResult {
            sale,
            items,
            batches,
            ledger_entry,
            replayed,
        })
    }
}

impl TransactionalUseCase for PostSaleUseCase {
    type Input = PostSaleInput;
    type Output = SaleResult;

    async fn commit_phase(
        &self,
        conn: &mut SqliteConnection,
        input: &PostSaleInput,
        user_id: &str,
    ) -> ServiceResult<SaleResult> {
        Self::validate(input).map_err(CoreError::from)?;

        let currency = input.currency.unwrap_or(self.currency);
        let lines: Vec<(i64, i64)> = input.items.iter().map(|l| (l.unit_price, l.quantity)).collect();
        let totals = SaleTotals::compute(&lines, input.discount, TaxRate::from_bps(input.tax_rate_bps), currency)?;
        validate_paid_amount(input.paid_amount, totals.total).map_err(CoreError::from)?;

        if let Some(key) = input.idempotency_key.as_deref() {
            if let Some(existing) = SaleRepository::new(conn).find_by_idempotency_key(key).await? {
                let replay = Self::load(conn, existing, true).await?;
                if !Self::is_same_request(&replay, input, currency, &totals) {
                    return Err(CoreError::conflict("Sale", key, "idempotency key was used for a different sale").into());
                }
                info!(sale_id = replay.sale.id, key = %key, "Sale replayed from idempotency key");
                return Ok(replay);
            }
        }

        let due_amount = totals.total - input.paid_amount;
        let customer = match input.customer_id {
            Some(id) => Some(CounterpartyRepository::new(conn).get(CounterpartyKind::Customer, id).await?),
            None if due_amount > 0 => {
                return Err(CoreError::from(ValidationError::Required {
                    field: "customer_id".to_string(),
                })
                .into());
            }
            None => None,
        };

        // Depletion first: cogs must be known before the header is written
        let mut plans: Vec<DepletionPlan> = Vec::with_capacity(input.items.len());
        for line in &input.items {
            ProductRepository::new(conn).get(line.product_id).await?;
            plans.push(BatchRepository::new(conn).deplete(line.product_id, line.quantity).await?);
        }

        let cogs = checked_sum("cogs", plans.iter().map(|p| p.total_cost)).map_err(CoreError::from)?;
        let profit = totals.total - cogs;
        let today = Utc::now().date_naive();

        let mut sales = SaleRepository::new(conn);
        let sale = sales
            .insert(&NewSale {
                invoice_number: generate_entry_number("INV", today),
                customer_id: customer.as_ref().map(|c| c.id),
                idempotency_key: input.idempotency_key.clone(),
                currency,
                exchange_rate: input.exchange_rate.unwrap_or(1.0),
                subtotal: totals.subtotal,
                discount: totals.discount,
                tax: totals.tax,
                total: totals.total,
                paid_amount: input.paid_amount,
                due_amount,
                cogs,
                profit,
                margin_bps: margin_bps(profit, totals.total),
                created_by: user_id.to_string(),
            })
            .await?;

        let mut items = Vec::with_capacity(input.items.len());
        let mut batches = Vec::new();
        for (line, plan) in input.items.iter().zip(&plans) {
            let mut sales = SaleRepository::new(conn);
            let item = sales
                .insert_item(sale.id, line.product_id, line.quantity, line.unit_price, plan.total_cost)
                .await?;
            for step in &plan.depletions {
                batches.push(sales.insert_item_batch(sale.id, item.id, step).await?);
            }

            let mut products = ProductRepository::new(conn);
            for step in &plan.depletions {
                products
                    .adjust_stock(&StockChange {
                        product_id: line.product_id,
                        batch_id: Some(step.batch_id),
                        movement_type: MovementType::Sale,
                        quantity: -step.quantity,
                        reference_type: "sale",
                        reference_id: sale.id,
                        created_by: user_id,
                    })
                    .await?;
            }
            items.push(item);
        }

        let mut accounting = AccountingRepository::new(conn);
        let cash = accounting.account_id_for_code(&self.accounts.cash).await?;
        let receivables = accounting.account_id_for_code(&self.accounts.receivables).await?;
        let revenue = accounting.account_id_for_code(&self.accounts.revenue).await?;
        let cogs_account = accounting.account_id_for_code(&self.accounts.cogs).await?;
        let inventory = accounting.account_id_for_code(&self.accounts.inventory).await?;

        let description = format!("Sale {}", sale.invoice_number);
        let entry = NewJournalEntry::new(today, description.as_str(), "sale", Some(sale.id), currency, user_id)
            .posted(self.auto_post)
            .line(NewJournalLine::debit(cash, input.paid_amount, "Cash received"))
            .line(NewJournalLine::debit(receivables, due_amount, "Amount due"))
            .line(NewJournalLine::credit(revenue, totals.total, "Sales revenue"))
            .line(NewJournalLine::debit(cogs_account, cogs, "Cost of goods sold"))
            .line(NewJournalLine::credit(inventory, cogs, "Inventory released"));

        let journal_entry_id = if entry.lines.is_empty() {
            None
        } else {
            let journal = accounting.create_journal_entry(&entry).await?;
            SaleRepository::new(conn).set_journal_entry(sale.id, journal.id).await?;
            Some(journal.id)
        };

        let ledger_entry = match &customer {
            Some(customer) if due_amount > 0 => {
                let mut row = NewLedgerEntry::new(customer.id, LedgerTransactionType::Sale, due_amount, user_id);
                row.document_id = Some(sale.id);
                row.journal_entry_id = journal_entry_id;
                Some(LedgerRepository::customers(conn).create(&row).await?)
            }
            _ => None,
        };

        let sale = SaleRepository::new(conn).get(sale.id).await?;
        info!(
            sale_id = sale.id,
            invoice_number = %sale.invoice_number,
            total = sale.total,
            cogs = sale.cogs,
            due = sale.due_amount,
            items = items.len(),
            "Sale posted"
        );

        Ok(SaleResult {
            sale,
            items,
            batches,
            ledger_entry,
            replayed: false,
        })
    }

    async fn side_effects_phase(&self, db: &Database, output: &SaleResult, _input: &PostSaleInput, _user_id: &str) {
        if output.replayed {
            return;
        }

        self.notifiers.publish(&TallyEvent::SaleCompleted {
            sale_id: output.sale.id,
            invoice_number: output.sale.invoice_number.clone(),
            total: output.sale.total,
            cogs: output.sale.cogs,
            profit: output.sale.profit,
        });

        let mut conn = match db.acquire().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!(error = %e, "Skipping low-stock check");
                return;
            }
        };
        let mut product_ids: Vec<i64> = output.items.iter().map(|i| i.product_id).collect();
        product_ids.sort_unstable();
        product_ids.dedup();

        for product_id in product_ids {
            match ProductRepository::new(&mut *conn).get(product_id).await {
                Ok(product) if product.current_stock <= self.low_stock_threshold => {
                    self.notifiers.publish(&TallyEvent::LowStock {
                        product_id,
                        sku: product.sku,
                        current_stock: product.current_stock,
                        threshold: self.low_stock_threshold,
                    });
                }
                Ok(_) => {}
                Err(e) => warn!(product_id, error = %e, "Low-stock check failed"),
            }
        }
    }
}
