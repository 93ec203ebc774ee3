//! # Financial Reports
//!
//! Pure derivations over per-account totals. The database layer sums the
//! lines of posted entries per account; everything here is arithmetic.
//!
//! ```text
//! ┌──────────────────┬──────────────────────────────────────────────────┐
//! │ Report           │ Account contribution                             │
//! ├──────────────────┼──────────────────────────────────────────────────┤
//! │ Trial balance    │ every active account: debit - credit             │
//! │ Profit & loss    │ revenue: credit - debit, expense: debit - credit │
//! │ Balance sheet    │ asset: debit - credit                            │
//! │                  │ liability, equity: credit - debit                │
//! └──────────────────┴──────────────────────────────────────────────────┘
//! ```

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::accounting::AccountType;

/// Posted debit and credit totals for one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct AccountTotals {
    pub account_id: i64,
    pub code: String,
    pub name: String,
    pub account_type: AccountType,
    pub debit_total: i64,
    pub credit_total: i64,
}

/// One account with its derived balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ReportLine {
    pub account_id: i64,
    pub code: String,
    pub name: String,
    pub account_type: AccountType,
    pub debit_total: i64,
    pub credit_total: i64,
    pub balance: i64,
}

impl ReportLine {
    fn from_totals(totals: &AccountTotals, balance: i64) -> Self {
        ReportLine {
            account_id: totals.account_id,
            code: totals.code.clone(),
            name: totals.name.clone(),
            account_type: totals.account_type,
            debit_total: totals.debit_total,
            credit_total: totals.credit_total,
            balance,
        }
    }
}

// =============================================================================
// Trial Balance
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct TrialBalance {
    #[ts(as = "Option<String>")]
    pub from: Option<NaiveDate>,
    #[ts(as = "Option<String>")]
    pub to: Option<NaiveDate>,
    pub lines: Vec<ReportLine>,
    pub total_debit: i64,
    pub total_credit: i64,
    pub is_balanced: bool,
}

impl TrialBalance {
    pub fn derive(totals: &[AccountTotals], from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        let lines: Vec<ReportLine> = totals
            .iter()
            .map(|t| ReportLine::from_totals(t, t.debit_total - t.credit_total))
            .collect();
        let total_debit = lines.iter().map(|l| l.debit_total).sum();
        let total_credit = lines.iter().map(|l| l.credit_total).sum();

        TrialBalance {
            from,
            to,
            lines,
            total_debit,
            total_credit,
            is_balanced: total_debit == total_credit,
        }
    }
}

// =============================================================================
// Profit & Loss
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ProfitAndLoss {
    #[ts(as = "Option<String>")]
    pub from: Option<NaiveDate>,
    #[ts(as = "Option<String>")]
    pub to: Option<NaiveDate>,
    pub revenue: Vec<ReportLine>,
    pub expenses: Vec<ReportLine>,
    pub total_revenue: i64,
    pub total_expenses: i64,
    pub net_income: i64,
}

impl ProfitAndLoss {
    pub fn derive(totals: &[AccountTotals], from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        let revenue: Vec<ReportLine> = totals
            .iter()
            .filter(|t| t.account_type == AccountType::Revenue)
            .map(|t| ReportLine::from_totals(t, t.credit_total - t.debit_total))
            .collect();
        let expenses: Vec<ReportLine> = totals
            .iter()
            .filter(|t| t.account_type == AccountType::Expense)
            .map(|t| ReportLine::from_totals(t, t.debit_total - t.credit_total))
            .collect();

        let total_revenue: i64 = revenue.iter().map(|l| l.balance).sum();
        let total_expenses: i64 = expenses.iter().map(|l| l.balance).sum();

        ProfitAndLoss {
            from,
            to,
            revenue,
            expenses,
            total_revenue,
            total_expenses,
            net_income: total_revenue - total_expenses,
        }
    }
}

// =============================================================================
// Balance Sheet
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct BalanceSheet {
    #[ts(as = "String")]
    pub as_of: NaiveDate,
    pub assets: Vec<ReportLine>,
    pub liabilities: Vec<ReportLine>,
    pub equity: Vec<ReportLine>,
    pub total_assets: i64,
    pub total_liabilities: i64,
    pub total_equity: i64,
    /// Revenue minus expenses up to `as_of`, not yet closed into equity.
    pub current_earnings: i64,
    pub is_balanced: bool,
}

impl BalanceSheet {
    /// `totals` must already be limited to entries dated on or before `as_of`.
    pub fn derive(totals: &[AccountTotals], as_of: NaiveDate) -> Self {
        let section = |ty: AccountType| -> Vec<ReportLine> {
            totals
                .iter()
                .filter(|t| t.account_type == ty)
                .map(|t| {
                    let balance = match ty {
                        AccountType::Asset => t.debit_total - t.credit_total,
                        _ => t.credit_total - t.debit_total,
                    };
                    ReportLine::from_totals(t, balance)
                })
                .collect()
        };

        let assets = section(AccountType::Asset);
        let liabilities = section(AccountType::Liability);
        let equity = section(AccountType::Equity);

        let total_assets: i64 = assets.iter().map(|l| l.balance).sum();
        let total_liabilities: i64 = liabilities.iter().map(|l| l.balance).sum();
        let total_equity: i64 = equity.iter().map(|l| l.balance).sum();
        let current_earnings = ProfitAndLoss::derive(totals, None, Some(as_of)).net_income;

        BalanceSheet {
            as_of,
            assets,
            liabilities,
            equity,
            total_assets,
            total_liabilities,
            total_equity,
            current_earnings,
            is_balanced: total_assets == total_liabilities + total_equity + current_earnings,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn totals(code: &str, ty: AccountType, debit: i64, credit: i64) -> AccountTotals {
        AccountTotals {
            account_id: code.parse().unwrap(),
            code: code.to_string(),
            name: code.to_string(),
            account_type: ty,
            debit_total: debit,
            credit_total: credit,
        }
    }

    /// Owner puts in 10000, a sale of 3000 (COGS 1800) paid 2000 cash with
    /// 1000 on credit, and a 500 supplier purchase on credit.
    fn book() -> Vec<AccountTotals> {
        vec![
            totals("1001", AccountType::Asset, 12000, 0),
            totals("1100", AccountType::Asset, 1000, 0),
            totals("1200", AccountType::Asset, 500, 1800),
            totals("2001", AccountType::Liability, 0, 500),
            totals("3001", AccountType::Equity, 0, 10000),
            totals("4001", AccountType::Revenue, 0, 3000),
            totals("5001", AccountType::Expense, 1800, 0),
        ]
    }

    #[test]
    fn test_trial_balance_balances() {
        let tb = TrialBalance::derive(&book(), None, None);
        assert_eq!(tb.total_debit, 15300);
        assert_eq!(tb.total_credit, 15300);
        assert!(tb.is_balanced);
        assert_eq!(tb.lines[2].balance, -1300);
        assert_eq!(tb.lines[5].balance, -3000);
    }

    #[test]
    fn test_profit_and_loss() {
        let pl = ProfitAndLoss::derive(&book(), None, None);
        assert_eq!(pl.total_revenue, 3000);
        assert_eq!(pl.total_expenses, 1800);
        assert_eq!(pl.net_income, 1200);
        assert_eq!(pl.revenue.len(), 1);
        assert_eq!(pl.expenses.len(), 1);
    }

    #[test]
    fn test_balance_sheet_includes_current_earnings() {
        let as_of = NaiveDate::from_ymd_opt(2026, 3, 31).unwrap();
        let bs = BalanceSheet::derive(&book(), as_of);
        assert_eq!(bs.total_assets, 12000 + 1000 - 1300);
        assert_eq!(bs.total_liabilities, 500);
        assert_eq!(bs.total_equity, 10000);
        assert_eq!(bs.current_earnings, 1200);
        assert!(bs.is_balanced);
    }

    #[test]
    fn test_empty_book() {
        let tb = TrialBalance::derive(&[], None, None);
        assert!(tb.is_balanced);
        assert!(tb.lines.is_empty());
    }
}
