//! # Tally Maintenance CLI
//!
//! Operator commands against a Tally database.
//!
//! ## Usage
//! ```bash
//! # Report drift between cached and ledger balances
//! cargo run -p tally-services --bin tally -- reconcile
//!
//! # Overwrite drifted caches with ledger balances
//! cargo run -p tally-services --bin tally -- repair --user admin
//!
//! # Trial balance over posted entries, optionally bounded
//! cargo run -p tally-services --bin tally -- trial-balance --from 2025-01-01 --to 2025-01-31
//!
//! # Replay one ledger and check every balance_after
//! cargo run -p tally-services --bin tally -- verify-ledger customer 7
//! ```
//!
//! `--config <PATH>` selects a `tally.toml`; `--json` prints results as JSON.
//! Log verbosity follows `RUST_LOG`.

use chrono::NaiveDate;
use serde::Serialize;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

use tally_core::ledger::CounterpartyKind;
use tally_db::{Database, LedgerRepository};
use tally_services::{Notifiers, ReconciliationUseCase, TallyConfig};

#[derive(Debug)]
enum Command {
    Reconcile,
    Repair,
    TrialBalance { from: Option<NaiveDate>, to: Option<NaiveDate> },
    VerifyLedger { kind: CounterpartyKind, id: i64 },
}

#[derive(Debug)]
struct Options {
    command: Command,
    config: Option<PathBuf>,
    user: String,
    json: bool,
}

const HELP: &str = "Tally maintenance CLI

Usage: tally [OPTIONS] <COMMAND>

Commands:
  reconcile                          Report cached-balance drift
  repair                             Repair drifted cached balances
  trial-balance [--from D] [--to D]  Trial balance over posted entries
  verify-ledger <customer|supplier> <ID>
                                     Replay one ledger chain

Options:
  -c, --config <PATH>  Config file (default: platform config dir)
  -u, --user <ID>      User recorded on repairs (default: system)
      --json           Print results as JSON
  -h, --help           Show this help message";

fn parse_date(flag: &str, value: Option<&String>) -> Result<NaiveDate, String> {
    let value = value.ok_or_else(|| format!("{} needs a date", flag))?;
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|e| format!("{}: {} ({})", flag, value, e))
}

fn parse_args(args: &[String]) -> Result<Option<Options>, String> {
    let mut config = None;
    let mut user = String::from("system");
    let mut json = false;
    let mut from = None;
    let mut to = None;
    let mut positional: Vec<&str> = Vec::new();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                let path = args.get(i + 1).ok_or("--config needs a path")?;
                config = Some(PathBuf::from(path));
                i += 1;
            }
            "--user" | "-u" => {
                user = args.get(i + 1).ok_or("--user needs a value")?.clone();
                i += 1;
            }
            "--from" => {
                from = Some(parse_date("--from", args.get(i + 1))?);
                i += 1;
            }
            "--to" => {
                to = Some(parse_date("--to", args.get(i + 1))?);
                i += 1;
            }
            "--json" => json = true,
            "--help" | "-h" => return Ok(None),
            other => positional.push(other),
        }
        i += 1;
    }

    let command = match positional.as_slice() {
        ["reconcile"] => Command::Reconcile,
        ["repair"] => Command::Repair,
        ["trial-balance"] => Command::TrialBalance { from, to },
        ["verify-ledger", kind, id] => Command::VerifyLedger {
            kind: kind.parse().map_err(|e| format!("{}", e))?,
            id: id.parse().map_err(|_| format!("invalid id '{}'", id))?,
        },
        [] => return Ok(None),
        other => return Err(format!("unknown command: {}", other.join(" "))),
    };

    Ok(Some(Options {
        command,
        config,
        user,
        json,
    }))
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(options: Options) -> Result<bool, Box<dyn std::error::Error>> {
    let config = TallyConfig::load(options.config)?;
    let db = Database::new(config.db_config()).await?;
    info!(path = ?config.database.resolved_path(), "Database opened");

    let healthy = match options.command {
        Command::Reconcile => {
            let report = ReconciliationUseCase::default().execute(&db).await?;
            if options.json {
                print_json(&report)?;
            } else {
                println!(
                    "Checked {} customers, {} suppliers",
                    report.stats.customers_checked, report.stats.suppliers_checked
                );
                for item in &report.items {
                    println!(
                        "  {} #{} {}: cached {} ledger {} (drift {})",
                        item.kind, item.counterparty_id, item.name, item.cached_balance, item.ledger_balance, item.drift
                    );
                }
                if report.is_clean() {
                    println!("No drift");
                }
            }
            report.is_clean()
        }
        Command::Repair => {
            let result = ReconciliationUseCase::new(Notifiers::tracing())
                .repair(&db, &options.user)
                .await?;
            if options.json {
                print_json(&result)?;
            } else {
                println!("Repaired {} cached balances", result.repaired);
            }
            true
        }
        Command::TrialBalance { from, to } => {
            let trial = db.reports().trial_balance(from, to).await?;
            if options.json {
                print_json(&trial)?;
            } else {
                println!("{:<8} {:<32} {:>14} {:>14}", "Code", "Account", "Debit", "Credit");
                for line in &trial.lines {
                    println!(
                        "{:<8} {:<32} {:>14} {:>14}",
                        line.code, line.name, line.debit_total, line.credit_total
                    );
                }
                println!("{:<41} {:>14} {:>14}", "Total", trial.total_debit, trial.total_credit);
                if !trial.is_balanced {
                    println!("NOT BALANCED");
                }
            }
            trial.is_balanced
        }
        Command::VerifyLedger { kind, id } => {
            let mut conn = db.acquire().await?;
            let report = LedgerRepository::new(&mut *conn, kind).verify_chain(id).await?;
            if options.json {
                print_json(&report)?;
            } else {
                println!("{} #{}: {} rows", kind, id, report.rows);
                println!(
                    "  opening {} replayed {} recorded {}",
                    report.opening_balance,
                    report.replayed_balance,
                    report
                        .recorded_balance
                        .map(|b| b.to_string())
                        .unwrap_or_else(|| "-".to_string())
                );
                match &report.first_break {
                    Some(b) => println!(
                        "  BROKEN at row {}: expected {} recorded {}",
                        b.entry_id, b.expected_balance, b.recorded_balance
                    ),
                    None => println!("  Chain intact"),
                }
            }
            report.is_intact()
        }
    };

    db.close().await;
    Ok(healthy)
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tally=debug,sqlx=warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    let options = match parse_args(&args) {
        Ok(Some(options)) => options,
        Ok(None) => {
            println!("{}", HELP);
            return ExitCode::SUCCESS;
        }
        Err(message) => {
            eprintln!("error: {}\n\n{}", message, HELP);
            return ExitCode::from(2);
        }
    };

    match run(options).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            error!(error = %e, "Command failed");
            ExitCode::from(1)
        }
    }
}
