//! # Validation Module
//!
//! Input checks that run before any write.
//!
//! ## Where Validation Happens
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Use case input ──► THIS MODULE (field rules) ──► commit phase         │
//! │                                                    │                    │
//! │                                                    ▼                    │
//! │                           SQLite: NOT NULL, UNIQUE, CHECK, FOREIGN KEY  │
//! │                                                                         │
//! │  A failure here never reaches the database, so nothing needs to be     │
//! │  rolled back.                                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Idempotency keys are client-generated tokens, typically UUIDs.
pub const MAX_IDEMPOTENCY_KEY_LENGTH: usize = 128;

/// Longest accepted free-text note.
pub const MAX_NOTES_LENGTH: usize = 1000;

// =============================================================================
// Amount Validators
// =============================================================================

/// Validates a payment amount in minor units.
///
/// ```rust
/// use tally_core::validation::validate_payment_amount;
///
/// assert!(validate_payment_amount(250).is_ok());
/// assert!(validate_payment_amount(0).is_err());
/// assert!(validate_payment_amount(-250).is_err());
/// ```
pub fn validate_payment_amount(amount: i64) -> ValidationResult<()> {
    if amount <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "amount".to_string(),
        });
    }
    Ok(())
}

/// Validates a non-negative money field (price, cost, paid amount).
pub fn validate_non_negative(field: &str, value: i64) -> ValidationResult<()> {
    if value < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Validates a quantity in base units.
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }
    Ok(())
}

/// Paid part of a document must lie within `0..=total`.
pub fn validate_paid_amount(paid: i64, total: i64) -> ValidationResult<()> {
    if paid < 0 || paid > total {
        return Err(ValidationError::OutOfRange {
            field: "paid_amount".to_string(),
            min: 0,
            max: total,
        });
    }
    Ok(())
}

/// Exchange rates are stored for reference and must be positive.
pub fn validate_exchange_rate(rate: f64) -> ValidationResult<()> {
    if !rate.is_finite() || rate <= 0.0 {
        return Err(ValidationError::MustBePositive {
            field: "exchange_rate".to_string(),
        });
    }
    Ok(())
}

/// Tax rate in basis points, 0% to 100%.
pub fn validate_tax_rate_bps(bps: u32) -> ValidationResult<()> {
    if bps > 10_000 {
        return Err(ValidationError::OutOfRange {
            field: "tax_rate".to_string(),
            min: 0,
            max: 10_000,
        });
    }
    Ok(())
}

// =============================================================================
// String Validators
// =============================================================================

/// Validates an optional idempotency key.
///
/// `None` is fine. A present key must be non-blank and reasonably short.
pub fn validate_idempotency_key(key: Option<&str>) -> ValidationResult<()> {
    let Some(key) = key else {
        return Ok(());
    };
    if key.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "idempotency_key".to_string(),
        });
    }
    if key.len() > MAX_IDEMPOTENCY_KEY_LENGTH {
        return Err(ValidationError::TooLong {
            field: "idempotency_key".to_string(),
            max: MAX_IDEMPOTENCY_KEY_LENGTH,
        });
    }
    Ok(())
}

pub fn validate_required(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    Ok(())
}

pub fn validate_notes(notes: Option<&str>) -> ValidationResult<()> {
    match notes {
        Some(n) if n.len() > MAX_NOTES_LENGTH => Err(ValidationError::TooLong {
            field: "notes".to_string(),
            max: MAX_NOTES_LENGTH,
        }),
        _ => Ok(()),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
