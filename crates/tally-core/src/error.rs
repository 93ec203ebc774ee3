//! # Error Types
//!
//! Domain-specific error types for tally-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  tally-core errors (this file)                                         │
//! │  ├── CoreError        - Financial integrity / domain failures          │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  tally-db errors (separate crate)                                      │
//! │  └── DbError          - Database failures, wraps CoreError             │
//! │                                                                         │
//! │  tally-services errors                                                 │
//! │  └── ServiceError     - What the IPC layer sees (ErrorKind + message)  │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → ServiceError → Caller   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every variant aborts the enclosing transaction. Idempotency hits are not
//! errors and never appear here.

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Financial-integrity and business-rule failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Malformed or out-of-range input.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A referenced account, counterparty, batch, product or entry is missing.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Requested depletion exceeds active-batch stock.
    ///
    /// ## User Workflow
    /// ```text
    /// Sell 5 units of product 42
    ///      │
    ///      ▼
    /// Active batches hold 3
    ///      │
    ///      ▼
    /// InsufficientStock { product_id: 42, requested: 5, available: 3 }
    ///      │
    ///      ▼
    /// Transaction rolls back, no batch is touched
    /// ```
    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: i64,
        requested: i64,
        available: i64,
    },

    /// Journal lines do not balance.
    #[error("Journal entry {entry_number} is unbalanced: debits {total_debit}, credits {total_credit}")]
    UnbalancedEntry {
        entry_number: String,
        total_debit: i64,
        total_credit: i64,
    },

    /// The entity's state forbids the operation (e.g. reversing twice).
    #[error("{entity} {id} cannot be changed: {reason}")]
    InvalidState {
        entity: String,
        id: String,
        reason: String,
    },

    /// Idempotency key reused with a different request, or a unique key
    /// would be duplicated.
    #[error("Conflict on {entity} '{key}': {reason}")]
    Conflict {
        entity: String,
        key: String,
        reason: String,
    },
}

impl CoreError {
    /// Creates a NotFound error.
    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        CoreError::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Creates an InvalidState error.
    pub fn invalid_state(
        entity: impl Into<String>,
        id: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        CoreError::InvalidState {
            entity: entity.into(),
            id: id.to_string(),
            reason: reason.into(),
        }
    }

    /// Creates a Conflict error.
    pub fn conflict(
        entity: impl Into<String>,
        key: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        CoreError::Conflict {
            entity: entity.into(),
            key: key.into(),
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors, raised before any write.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// Invalid format or combination of values.
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

impl ValidationError {
    /// Name of the offending field.
    pub fn field(&self) -> &str {
        match self {
            ValidationError::Required { field }
            | ValidationError::TooLong { field, .. }
            | ValidationError::OutOfRange { field, .. }
            | ValidationError::MustBePositive { field }
            | ValidationError::MustNotBeNegative { field }
            | ValidationError::InvalidFormat { field, .. } => field,
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InsufficientStock {
            product_id: 42,
            requested: 5,
            available: 3,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for product 42: requested 5, available 3"
        );

        let err = CoreError::UnbalancedEntry {
            entry_number: "JE-1".to_string(),
            total_debit: 100,
            total_credit: 90,
        };
        assert_eq!(
            err.to_string(),
            "Journal entry JE-1 is unbalanced: debits 100, credits 90"
        );
    }

    #[test]
    fn test_validation_error_field() {
        let err = ValidationError::MustBePositive {
            field: "amount".to_string(),
        };
        assert_eq!(err.field(), "amount");
        assert_eq!(err.to_string(), "amount must be positive");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "lines".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
