//! End-to-end properties of the financial core, driven through the use
//! cases against an in-memory database.

use chrono::NaiveDate;

use tally_core::accounting::{codes, AccountType, NewAccount, NewJournalEntry, NewJournalLine};
use tally_core::ledger::{CounterpartyKind, LedgerTransactionType};
use tally_core::money::{Currency, Discount};
use tally_core::types::PaymentMethod;
use tally_core::CoreError;
use tally_db::{
    AccountingRepository, BatchRepository, CounterpartyRepository, Database, DbConfig, DbError, LedgerRepository,
    ProductRepository,
};
use tally_services::{
    execute, ErrorKind, Notifiers, PostPurchaseInput, PostPurchaseUseCase, PostSaleInput, PostSaleUseCase,
    PurchaseLineInput, ReconciliationUseCase, RecordPaymentInput, RecordPaymentUseCase, SaleLineInput, TallyConfig,
};

// =============================================================================
// Fixtures
// =============================================================================

struct Shop {
    db: Database,
    config: TallyConfig,
    product_id: i64,
    customer_id: i64,
    supplier_id: i64,
}

async fn shop() -> Shop {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    let mut config = TallyConfig::default();
    config.accounting.currency = Currency::Usd;

    let mut conn = db.acquire().await.unwrap();
    let product = ProductRepository::new(&mut *conn).create("TEA-500", "Black Tea 500g").await.unwrap();
    let customer = CounterpartyRepository::new(&mut *conn)
        .create(CounterpartyKind::Customer, "Hussein", Some("0770 000 0000"), 0)
        .await
        .unwrap();
    let supplier = CounterpartyRepository::new(&mut *conn)
        .create(CounterpartyKind::Supplier, "Baghdad Wholesale", None, 0)
        .await
        .unwrap();
    drop(conn);

    Shop {
        db,
        config,
        product_id: product.id,
        customer_id: customer.id,
        supplier_id: supplier.id,
    }
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn lot(product_id: i64, number: &str, expiry: Option<NaiveDate>, quantity: i64, cost: i64) -> PurchaseLineInput {
    PurchaseLineInput {
        product_id,
        quantity,
        cost_per_unit: cost,
        batch_number: Some(number.to_string()),
        expiry_date: expiry,
    }
}

async fn receive(shop: &Shop, invoice: &str, items: Vec<PurchaseLineInput>, paid: i64) {
    let use_case = PostPurchaseUseCase::new(&shop.config, Notifiers::new());
    let input = PostPurchaseInput {
        supplier_id: shop.supplier_id,
        invoice_number: invoice.to_string(),
        items,
        paid_amount: paid,
        currency: None,
        exchange_rate: None,
        idempotency_key: None,
    };
    execute(&shop.db, &use_case, &input, "clerk").await.unwrap();
}

fn sale_input(shop: &Shop, quantity: i64, unit_price: i64, paid: i64) -> PostSaleInput {
    PostSaleInput {
        customer_id: Some(shop.customer_id),
        items: vec![SaleLineInput {
            product_id: shop.product_id,
            quantity,
            unit_price,
        }],
        discount: Discount::None,
        tax_rate_bps: 0,
        paid_amount: paid,
        currency: None,
        exchange_rate: None,
        idempotency_key: None,
    }
}

fn payment_input(counterparty_id: i64, amount: i64, key: Option<&str>) -> RecordPaymentInput {
    RecordPaymentInput {
        counterparty_id,
        amount,
        payment_method: PaymentMethod::Cash,
        idempotency_key: key.map(str::to_string),
        notes: None,
    }
}

async fn count(db: &Database, sql: &str) -> i64 {
    sqlx::query_scalar(sql).fetch_one(db.pool()).await.unwrap()
}

// =============================================================================
// Balance Invariant
// =============================================================================

#[tokio::test]
async fn every_journal_entry_balances() {
    let shop = shop().await;
    receive(&shop, "P-1", vec![lot(shop.product_id, "L1", None, 20, 300)], 2_000).await;

    let sales = PostSaleUseCase::new(&shop.config, Notifiers::new());
    execute(&shop.db, &sales, &sale_input(&shop, 5, 1_000, 2_000), "cashier").await.unwrap();
    let payments = RecordPaymentUseCase::customer(&shop.config, Notifiers::new());
    execute(&shop.db, &payments, &payment_input(shop.customer_id, 1_500, None), "cashier")
        .await
        .unwrap();

    let unbalanced = count(
        &shop.db,
        "SELECT COUNT(*) FROM (SELECT journal_entry_id FROM journal_lines \
         GROUP BY journal_entry_id HAVING SUM(debit) != SUM(credit))",
    )
    .await;
    assert_eq!(unbalanced, 0);
    assert_eq!(count(&shop.db, "SELECT COUNT(*) FROM journal_entries").await, 3);

    let trial = shop.db.reports().trial_balance(None, None).await.unwrap();
    assert!(trial.is_balanced);
    let sheet = shop.db.reports().balance_sheet(date(2099, 12, 31)).await.unwrap();
    assert!(sheet.is_balanced);
}

#[tokio::test]
async fn unbalanced_entry_writes_nothing() {
    let shop = shop().await;
    let before = count(&shop.db, "SELECT COUNT(*) FROM journal_entries").await;

    let mut tx = shop.db.begin().await.unwrap();
    let mut accounting = AccountingRepository::new(&mut *tx);
    let cash = accounting.account_id_for_code(codes::CASH).await.unwrap();
    let revenue = accounting.account_id_for_code(codes::SALES_REVENUE).await.unwrap();
    let err = accounting
        .create_journal_entry(
            &NewJournalEntry::new(date(2025, 3, 1), "typo", "manual", None, Currency::Usd, "u1")
                .posted(true)
                .line(NewJournalLine::debit(cash, 1_000, "Cash"))
                .line(NewJournalLine::credit(revenue, 999, "Revenue")),
        )
        .await
        .unwrap_err();
    tx.rollback().await.unwrap();

    assert!(matches!(
        err,
        DbError::Domain(CoreError::UnbalancedEntry {
            total_debit: 1_000,
            total_credit: 999,
            ..
        })
    ));
    assert_eq!(count(&shop.db, "SELECT COUNT(*) FROM journal_entries").await, before);
    assert_eq!(count(&shop.db, "SELECT COUNT(*) FROM journal_lines").await, 0);
}

// =============================================================================
// Ledger Reconstruction
// =============================================================================

#[tokio::test]
async fn ledger_replays_to_last_balance() {
    let shop = shop().await;
    receive(&shop, "P-1", vec![lot(shop.product_id, "L1", None, 50, 200)], 0).await;

    let sales = PostSaleUseCase::new(&shop.config, Notifiers::new());
    let payments = RecordPaymentUseCase::customer(&shop.config, Notifiers::new());
    execute(&shop.db, &sales, &sale_input(&shop, 3, 1_000, 0), "cashier").await.unwrap();
    execute(&shop.db, &payments, &payment_input(shop.customer_id, 1_200, None), "cashier")
        .await
        .unwrap();
    execute(&shop.db, &sales, &sale_input(&shop, 2, 1_000, 500), "cashier").await.unwrap();
    execute(&shop.db, &payments, &payment_input(shop.customer_id, 800, None), "cashier")
        .await
        .unwrap();

    let mut conn = shop.db.acquire().await.unwrap();
    let mut ledger = LedgerRepository::customers(&mut *conn);
    let rows = ledger.list(shop.customer_id).await.unwrap();
    assert_eq!(rows.len(), 4);

    let replayed: i64 = rows.iter().map(|r| r.amount).sum();
    assert_eq!(replayed, rows.last().unwrap().balance_after);
    assert_eq!(replayed, 3_000 - 1_200 + 1_500 - 800);
    assert!(ledger.verify_chain(shop.customer_id).await.unwrap().is_intact());

    let customer = CounterpartyRepository::new(&mut *conn)
        .get(CounterpartyKind::Customer, shop.customer_id)
        .await
        .unwrap();
    assert_eq!(customer.cached_balance, replayed);

    // Supplier side: one unpaid purchase
    let supplier_rows = LedgerRepository::suppliers(&mut *conn).list(shop.supplier_id).await.unwrap();
    assert_eq!(supplier_rows.len(), 1);
    assert_eq!(supplier_rows[0].transaction_type, LedgerTransactionType::Purchase);
    assert_eq!(supplier_rows[0].balance_after, 10_000);
}

// =============================================================================
// FEFO
// =============================================================================

#[tokio::test]
async fn expiring_batches_drain_before_undated_ones() {
    let shop = shop().await;
    receive(
        &shop,
        "P-1",
        vec![
            lot(shop.product_id, "UNDATED", None, 5, 100),
            lot(shop.product_id, "JAN25", Some(date(2025, 1, 1)), 3, 200),
            lot(shop.product_id, "JUN24", Some(date(2024, 6, 1)), 2, 300),
        ],
        1_700,
    )
    .await;

    let sales = PostSaleUseCase::new(&shop.config, Notifiers::new());
    let result = execute(&shop.db, &sales, &sale_input(&shop, 4, 1_000, 4_000), "cashier")
        .await
        .unwrap();

    let mut conn = shop.db.acquire().await.unwrap();
    let batches = BatchRepository::new(&mut *conn).list_for_product(shop.product_id).await.unwrap();
    let on_hand: Vec<(&str, i64)> = batches
        .iter()
        .map(|b| (b.batch_number.as_str(), b.quantity_on_hand))
        .collect();
    assert_eq!(on_hand, vec![("UNDATED", 5), ("JAN25", 1), ("JUN24", 0)]);

    let consumed: Vec<(i64, i64)> = result.batches.iter().map(|b| (b.quantity, b.cost_per_unit)).collect();
    assert_eq!(consumed, vec![(2, 300), (2, 200)]);
    assert_eq!(result.sale.cogs, 1_000);
}

// =============================================================================
// Atomicity
// =============================================================================

#[tokio::test]
async fn insufficient_stock_changes_no_batch() {
    let shop = shop().await;
    receive(
        &shop,
        "P-1",
        vec![
            lot(shop.product_id, "A", Some(date(2026, 1, 1)), 4, 100),
            lot(shop.product_id, "B", None, 6, 100),
        ],
        1_000,
    )
    .await;

    let sales = PostSaleUseCase::new(&shop.config, Notifiers::new());
    let err = execute(&shop.db, &sales, &sale_input(&shop, 11, 1_000, 11_000), "cashier")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientStock);

    let mut conn = shop.db.acquire().await.unwrap();
    let batches = BatchRepository::new(&mut *conn).list_for_product(shop.product_id).await.unwrap();
    let on_hand: Vec<i64> = batches.iter().map(|b| b.quantity_on_hand).collect();
    assert_eq!(on_hand, vec![4, 6]);
    drop(conn);

    assert_eq!(count(&shop.db, "SELECT COUNT(*) FROM sales").await, 0);
    assert_eq!(
        count(&shop.db, "SELECT COUNT(*) FROM journal_entries WHERE source_type = 'sale'").await,
        0
    );
}

// =============================================================================
// Idempotency
// =============================================================================

#[tokio::test]
async fn repeated_payment_key_records_once() {
    let shop = shop().await;
    receive(&shop, "P-1", vec![lot(shop.product_id, "L1", None, 10, 100)], 0).await;

    let payments = RecordPaymentUseCase::supplier(&shop.config, Notifiers::new());
    let input = payment_input(shop.supplier_id, 400, Some("pay-supplier-1"));

    let first = execute(&shop.db, &payments, &input, "clerk").await.unwrap();
    let second = execute(&shop.db, &payments, &input, "clerk").await.unwrap();

    assert!(!first.replayed);
    assert!(second.replayed);
    assert_eq!(second.payment, first.payment);
    assert_eq!(second.ledger_entry, first.ledger_entry);

    assert_eq!(count(&shop.db, "SELECT COUNT(*) FROM payments").await, 1);
    assert_eq!(count(&shop.db, "SELECT COUNT(*) FROM supplier_ledger WHERE payment_id IS NOT NULL").await, 1);
    assert_eq!(
        count(&shop.db, "SELECT COUNT(*) FROM journal_entries WHERE source_type = 'payment'").await,
        1
    );
    assert_eq!(first.ledger_entry.balance_after, 600);
}

// =============================================================================
// Reconciliation
// =============================================================================

#[tokio::test]
async fn repair_converges_to_ledger() {
    let shop = shop().await;
    receive(&shop, "P-1", vec![lot(shop.product_id, "L1", None, 10, 100)], 0).await;
    let sales = PostSaleUseCase::new(&shop.config, Notifiers::new());
    execute(&shop.db, &sales, &sale_input(&shop, 2, 1_000, 0), "cashier").await.unwrap();

    {
        let mut conn = shop.db.acquire().await.unwrap();
        let mut counterparties = CounterpartyRepository::new(&mut *conn);
        counterparties
            .overwrite_cached_balance(CounterpartyKind::Customer, shop.customer_id, 0)
            .await
            .unwrap();
        counterparties
            .overwrite_cached_balance(CounterpartyKind::Supplier, shop.supplier_id, 99)
            .await
            .unwrap();
    }

    let reconciliation = ReconciliationUseCase::new(Notifiers::new());
    let before = reconciliation.execute(&shop.db).await.unwrap();
    assert_eq!(before.items.len(), 2);

    let repaired = reconciliation.repair(&shop.db, "admin").await.unwrap();
    assert_eq!(repaired.repaired, 2);

    let after = reconciliation.execute(&shop.db).await.unwrap();
    assert!(after.is_clean());
}

// =============================================================================
// Reversal
// =============================================================================

#[tokio::test]
async fn reversing_a_sale_entry_is_additive() {
    let shop = shop().await;
    receive(&shop, "P-1", vec![lot(shop.product_id, "L1", None, 10, 100)], 1_000).await;
    let sales = PostSaleUseCase::new(&shop.config, Notifiers::new());
    let result = execute(&shop.db, &sales, &sale_input(&shop, 1, 1_000, 1_000), "cashier")
        .await
        .unwrap();
    let entry_id = result.sale.journal_entry_id.unwrap();

    let lines_before = count(&shop.db, "SELECT COUNT(*) FROM journal_lines").await;

    let mut tx = shop.db.begin().await.unwrap();
    let mut accounting = AccountingRepository::new(&mut *tx);
    let original = accounting.get_journal_entry(entry_id).await.unwrap();
    let reversal = accounting
        .reverse_journal_entry(entry_id, "customer returned goods", "manager")
        .await
        .unwrap();
    let reloaded = accounting.get_journal_entry(entry_id).await.unwrap();
    tx.commit().await.unwrap();

    assert!(reloaded.is_reversed);
    assert_eq!(reloaded.lines, original.lines);
    assert_eq!(reversal.lines.len(), original.lines.len());
    for (mirror, line) in reversal.lines.iter().zip(&original.lines) {
        assert_eq!(mirror.account_id, line.account_id);
        assert_eq!((mirror.debit, mirror.credit), (line.credit, line.debit));
    }

    assert_eq!(
        count(&shop.db, "SELECT COUNT(*) FROM journal_lines").await,
        lines_before + original.lines.len() as i64
    );

    // Revenue nets back to zero; the purchase still sits in inventory and cash
    let trial = shop.db.reports().trial_balance(None, None).await.unwrap();
    assert!(trial.is_balanced);
    let revenue = trial.lines.iter().find(|l| l.code == codes::SALES_REVENUE).unwrap();
    assert_eq!(revenue.debit_total, revenue.credit_total);
}

// =============================================================================
// Chart of Accounts
// =============================================================================

#[tokio::test]
async fn ensure_account_returns_same_row() {
    let shop = shop().await;
    let mut tx = shop.db.begin().await.unwrap();
    let mut accounting = AccountingRepository::new(&mut *tx);

    let first = accounting
        .ensure_account(&NewAccount::new("1001", "Cash", AccountType::Asset))
        .await
        .unwrap();
    let second = accounting
        .ensure_account(&NewAccount::new("1001", "Cash drawer", AccountType::Asset))
        .await
        .unwrap();
    tx.commit().await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(count(&shop.db, "SELECT COUNT(*) FROM accounts WHERE code = '1001'").await, 1);
}
