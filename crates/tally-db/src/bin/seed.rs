//! # Seed Data Generator
//!
//! Populates the database with a small demo catalogue for development.
//!
//! ## Usage
//! ```bash
//! # Seed ./tally_dev.db
//! cargo run -p tally-db --bin seed
//!
//! # Specify database path and batches per product
//! cargo run -p tally-db --bin seed -- --db ./data/tally.db --batches 3
//! ```
//!
//! ## Generated Data
//! - Products per category, each with N batches staggered by expiry date
//! - Opening stock recorded as `purchase` movements (reference `seed`)
//! - A handful of customers and suppliers with zero balances
//!
//! Batch numbers: `SEED-{SKU}-{8 hex}`.

use chrono::{Duration, Utc};
use std::env;
use tally_core::ledger::CounterpartyKind;
use tally_core::types::MovementType;
use tally_db::{BatchRepository, CounterpartyRepository, Database, DbConfig, NewBatch, ProductRepository, StockChange};
use tracing::{info, warn};
use uuid::Uuid;

/// Product categories for demo data
const CATEGORIES: &[(&str, &[&str])] = &[
    ("BEV", &["Pepsi 330ml", "Mineral Water 1.5L", "Orange Juice 1L", "Laban 500ml"]),
    ("DRY", &["Fresh Milk 1L", "Yogurt 500g", "White Cheese 400g", "Butter 200g"]),
    ("GRO", &["Basmati Rice 5kg", "Sunflower Oil 1.8L", "Sugar 2kg", "Black Tea 500g"]),
    ("SNK", &["Potato Chips", "Date Biscuits", "Chocolate Wafer", "Roasted Seeds"]),
];

const CUSTOMERS: &[&str] = &["Ali Hassan", "Zainab Kareem", "Omar Saleh"];
const SUPPLIERS: &[&str] = &["Baghdad Wholesale", "Basra Foods", "Erbil Dairy"];

/// Unit costs in IQD, cycled across products
const COSTS: &[i64] = &[250, 750, 1_000, 1_500, 2_250, 4_000];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,sqlx=warn".into()),
        )
        .init();

    // Parse command line arguments
    let args: Vec<String> = env::args().collect();

    let mut batches_per_product: i64 = 2;
    let mut db_path = String::from("./tally_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--batches" | "-b" => {
                if i + 1 < args.len() {
                    batches_per_product = args[i + 1].parse().unwrap_or(2);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Tally Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -b, --batches <N>  Batches per product (default: 2)");
                println!("  -d, --db <PATH>    Database file path (default: ./tally_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    info!(db = %db_path, batches_per_product, "Seeding database");

    let db = Database::new(DbConfig::new(&db_path)).await?;
    let mut tx = db.begin().await?;

    let existing = ProductRepository::new(&mut *tx).count().await?;
    if existing > 0 {
        warn!(existing, "Database already has products, skipping seed");
        return Ok(());
    }

    let today = Utc::now().date_naive();
    let mut seeded = 0usize;

    for (category, names) in CATEGORIES {
        for (idx, name) in names.iter().enumerate() {
            let sku = format!("{}-{:03}", category, idx + 1);
            let product = ProductRepository::new(&mut *tx).create(&sku, name).await?;
            let cost = COSTS[seeded % COSTS.len()];

            for n in 0..batches_per_product {
                let mut batches = BatchRepository::new(&mut *tx);
                let batch = batches
                    .create(&NewBatch {
                        product_id: product.id,
                        batch_number: format!("SEED-{}-{}", sku, &Uuid::new_v4().simple().to_string()[..8]),
                        expiry_date: Some(today + Duration::days(30 * (n + 1))),
                        cost_per_unit: cost,
                    })
                    .await?;
                let quantity = 10 + 5 * n;
                batches.receive(batch.id, quantity).await?;

                ProductRepository::new(&mut *tx)
                    .adjust_stock(&StockChange {
                        product_id: product.id,
                        batch_id: Some(batch.id),
                        movement_type: MovementType::Purchase,
                        quantity,
                        reference_type: "seed",
                        reference_id: batch.id,
                        created_by: "seed",
                    })
                    .await?;
            }
            seeded += 1;
        }
    }

    let mut counterparties = CounterpartyRepository::new(&mut *tx);
    for name in CUSTOMERS {
        counterparties.create(CounterpartyKind::Customer, name, None, 0).await?;
    }
    for name in SUPPLIERS {
        counterparties.create(CounterpartyKind::Supplier, name, None, 0).await?;
    }

    tx.commit().await?;

    info!(
        products = seeded,
        customers = CUSTOMERS.len(),
        suppliers = SUPPLIERS.len(),
        "Seed complete"
    );

    db.close().await;
    Ok(())
}
