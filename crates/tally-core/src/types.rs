//! # Domain Types
//!
//! Operational records shared by the inventory, sales and purchasing flows.
//! Accounting records live in [`crate::accounting`], batch records in
//! [`crate::inventory`] and counterparty ledgers in [`crate::ledger`].
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Product      │   │      Sale       │   │    Purchase     │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id             │   │  invoice_number │   │  invoice_number │       │
//! │  │  sku            │   │  total / cogs   │   │  supplier_id    │       │
//! │  │  current_stock  │   │  paid / due     │   │  paid / due     │       │
//! │  └─────────────────┘   └────────┬────────┘   └────────┬────────┘       │
//! │                                 │                     │                 │
//! │                        SaleItem ─► SaleItemBatch   PurchaseItem         │
//! │                        (per consumed batch,        (one batch each)     │
//! │                         frozen cost)                                    │
//! │                                                                         │
//! │  InventoryMovement: stock_before / stock_after audit per change        │
//! │  Payment:           settles a customer or supplier balance             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::ledger::CounterpartyKind;
use crate::money::Currency;

// =============================================================================
// Tax Rate
// =============================================================================

/// Tax rate represented in basis points (825 = 8.25%).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaxRate(u32);

impl TaxRate {
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

// =============================================================================
// Product
// =============================================================================

/// A stocked product. `current_stock` is a cached sum of its batches,
/// maintained on every receipt and depletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Product {
    pub id: i64,
    pub sku: String,
    pub name: String,
    /// Cached stock in base units.
    pub current_stock: i64,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Counterparty
// =============================================================================

/// A customer or supplier.
///
/// `cached_balance` is the customer's `total_debt` or the supplier's
/// `current_balance`: a write-through copy of the last ledger row's
/// `balance_after`. The ledger is authoritative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Counterparty {
    pub id: i64,
    pub kind: CounterpartyKind,
    pub name: String,
    pub phone: Option<String>,
    pub cached_balance: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Payment
// =============================================================================

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[default]
    Cash,
    /// Card payment on an external terminal.
    ExternalCard,
    BankTransfer,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Recorded together with its ledger row and journal entry.
    #[default]
    Completed,
}

/// A payment that reduces a customer's debt or what we owe a supplier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Payment {
    pub id: i64,
    pub counterparty_kind: CounterpartyKind,
    pub counterparty_id: i64,
    /// Positive amount in minor units.
    pub amount: i64,
    pub currency: Currency,
    pub payment_method: PaymentMethod,
    /// Unique when present.
    pub idempotency_key: Option<String>,
    pub status: PaymentStatus,
    pub notes: Option<String>,
    pub created_by: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Sale
// =============================================================================

/// A posted sale.
///
/// `cogs` is the sum of its depletion records, so margin can always be
/// reconstructed from `sale_item_batches`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Sale {
    pub id: i64,
    pub invoice_number: String,
    pub customer_id: Option<i64>,
    pub idempotency_key: Option<String>,
    pub currency: Currency,
    /// Stored for reference; amounts are not converted.
    pub exchange_rate: f64,
    pub subtotal: i64,
    pub discount: i64,
    pub tax: i64,
    pub total: i64,
    pub paid_amount: i64,
    pub due_amount: i64,
    pub cogs: i64,
    pub profit: i64,
    pub margin_bps: i64,
    pub journal_entry_id: Option<i64>,
    pub created_by: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// A line of a sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SaleItem {
    pub id: i64,
    pub sale_id: i64,
    pub product_id: i64,
    /// Quantity in base units.
    pub quantity: i64,
    pub unit_price: i64,
    pub line_total: i64,
    pub cogs: i64,
}

/// One consumed batch for one sale line, with the cost frozen at the
/// moment of consumption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SaleItemBatch {
    pub id: i64,
    pub sale_id: i64,
    pub sale_item_id: i64,
    pub batch_id: i64,
    pub quantity: i64,
    pub cost_per_unit: i64,
    pub total_cost: i64,
}

// =============================================================================
// Purchase
// =============================================================================

/// A received purchase invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Purchase {
    pub id: i64,
    pub invoice_number: String,
    pub supplier_id: i64,
    pub idempotency_key: Option<String>,
    pub currency: Currency,
    pub exchange_rate: f64,
    pub total: i64,
    pub paid_amount: i64,
    pub due_amount: i64,
    pub journal_entry_id: Option<i64>,
    pub created_by: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// A received line; always lands in exactly one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PurchaseItem {
    pub id: i64,
    pub purchase_id: i64,
    pub product_id: i64,
    pub batch_id: i64,
    pub quantity: i64,
    pub cost_per_unit: i64,
    pub line_total: i64,
}

// =============================================================================
// Inventory Movement
// =============================================================================

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    Purchase,
    Sale,
}

/// Audit row for every change of a product's cached stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct InventoryMovement {
    pub id: i64,
    pub product_id: i64,
    pub batch_id: Option<i64>,
    pub movement_type: MovementType,
    /// Signed: positive for receipts, negative for sales.
    pub quantity: i64,
    pub stock_before: i64,
    pub stock_after: i64,
    pub reference_type: String,
    pub reference_id: i64,
    pub created_by: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================
