//! # Batch Inventory (FEFO)
//!
//! Batch records and the pure First-Expired-First-Out depletion planner.
//!
//! ## Depletion Order
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Candidates: same product, quantity_on_hand > 0, status = active       │
//! │                                                                         │
//! │  1. batches WITH an expiry date before batches without                 │
//! │  2. earliest expiry first                                               │
//! │  3. lowest batch id first (oldest received)                             │
//! │                                                                         │
//! │  [{exp:null,qty:5,id:1}, {exp:2025-01-01,qty:3,id:2},                  │
//! │   {exp:2024-06-01,qty:2,id:3}]                                          │
//! │                                                                         │
//! │  deplete 4 ──► id 3 takes 2 (exhausted) ──► id 2 takes 2 ──► done      │
//! │                id 1 untouched                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The planner never mutates anything. The database layer applies a plan
//! inside the caller's transaction, so an [`CoreError::InsufficientStock`]
//! leaves every batch as it was.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::{checked_sum, line_total};

// =============================================================================
// Batch Records
// =============================================================================

/// Lifecycle of a batch.
///
/// `Active → Exhausted` happens exactly when depletion brings
/// `quantity_on_hand` to zero. Only a purchase receipt moves it back.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    #[default]
    Active,
    Exhausted,
}

/// A received lot of one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ProductBatch {
    pub id: i64,
    pub product_id: i64,
    pub batch_number: String,
    #[ts(as = "Option<String>")]
    pub expiry_date: Option<NaiveDate>,
    pub quantity_received: i64,
    /// Never negative.
    pub quantity_on_hand: i64,
    /// Cost in minor units per base unit.
    pub cost_per_unit: i64,
    pub status: BatchStatus,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl ProductBatch {
    /// Whether this batch can be consumed by a depletion.
    pub fn is_candidate(&self) -> bool {
        self.status == BatchStatus::Active && self.quantity_on_hand > 0
    }
}

// =============================================================================
// Depletion Plan
// =============================================================================

/// Units taken from one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct BatchDepletion {
    pub batch_id: i64,
    pub quantity: i64,
    /// Historical cost, frozen at consumption time.
    pub cost_per_unit: i64,
    pub total_cost: i64,
    /// `quantity_on_hand` after this depletion.
    pub remaining: i64,
}

impl BatchDepletion {
    /// The batch flips to exhausted iff nothing remains.
    #[inline]
    pub fn exhausts_batch(&self) -> bool {
        self.remaining == 0
    }
}

/// Result of depleting one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct DepletionPlan {
    pub product_id: i64,
    pub depletions: Vec<BatchDepletion>,
    pub total_cost: i64,
    /// `total_cost / quantity`, rounded half up.
    pub weighted_average_cost: i64,
}

impl DepletionPlan {
    /// Total units consumed.
    pub fn quantity(&self) -> i64 {
        self.depletions.iter().map(|d| d.quantity).sum()
    }
}

// =============================================================================
// Planner
// =============================================================================

/// FEFO comparison: expiring before non-expiring, earliest expiry, lowest id.
pub fn fefo_cmp(a: &ProductBatch, b: &ProductBatch) -> Ordering {
    match (a.expiry_date, b.expiry_date) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| a.id.cmp(&b.id))
}

/// Sum of on-hand quantity over consumable batches.
pub fn available_stock(batches: &[ProductBatch]) -> i64 {
    batches
        .iter()
        .filter(|b| b.is_candidate())
        .map(|b| b.quantity_on_hand)
        .sum()
}

/// Plans a FEFO depletion of `quantity_needed` units of `product_id`.
///
/// Batches of other products, exhausted batches and empty batches are
/// ignored. Fails with `InsufficientStock` before producing any step when
/// the candidates cannot cover the request.
pub fn plan_depletion(
    product_id: i64,
    batches: &[ProductBatch],
    quantity_needed: i64,
) -> CoreResult<DepletionPlan> {
    if quantity_needed <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        }
        .into());
    }

    let mut candidates: Vec<&ProductBatch> = batches
        .iter()
        .filter(|b| b.product_id == product_id && b.is_candidate())
        .collect();
    candidates.sort_by(|a, b| fefo_cmp(a, b));

    // Only compared against the request, so saturating is exact enough
    let available = candidates
        .iter()
        .fold(0i64, |acc, b| acc.saturating_add(b.quantity_on_hand));
    if available < quantity_needed {
        return Err(CoreError::InsufficientStock {
            product_id,
            requested: quantity_needed,
            available,
        });
    }

    let mut remaining = quantity_needed;
    let mut depletions = Vec::new();
    for batch in candidates {
        if remaining == 0 {
            break;
        }
        let take = remaining.min(batch.quantity_on_hand);
        depletions.push(BatchDepletion {
            batch_id: batch.id,
            quantity: take,
            cost_per_unit: batch.cost_per_unit,
            total_cost: line_total(batch.cost_per_unit, take)?,
            remaining: batch.quantity_on_hand - take,
        });
        remaining -= take;
    }

    let total_cost = checked_sum("total_cost", depletions.iter().map(|d| d.total_cost))?;
    let weighted_average_cost =
        ((total_cost as i128 + quantity_needed as i128 / 2) / quantity_needed as i128) as i64;

    Ok(DepletionPlan {
        product_id,
        depletions,
        total_cost,
        weighted_average_cost,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
