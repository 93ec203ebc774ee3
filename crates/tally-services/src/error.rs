//! # Service Error Type
//!
//! What a use case returns to the calling layer (IPC command, binary).
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Flow in Tally                                  │
//! │                                                                         │
//! │  tally-core            tally-db                 tally-services          │
//! │  ──────────            ────────                 ──────────────          │
//! │                                                                         │
//! │  CoreError ──────────► DbError::Domain ───────► ServiceError::Core      │
//! │                        DbError::NotFound ─────► ServiceError::Core      │
//! │                        DbError::Unique.. ─────► ServiceError::Core      │
//! │                                                 (Conflict)              │
//! │                        everything else ───────► ServiceError::Storage   │
//! │                                                                         │
//! │  Serialized for the caller as:                                          │
//! │  { "code": "INSUFFICIENT_STOCK", "message": "Insufficient stock ..." }  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A domain failure reaches the caller with its original variant and
//! fields; only storage failures are folded into one kind.

use serde::{Serialize, Serializer};
use tally_core::CoreError;
use tally_db::DbError;
use thiserror::Error;

/// Result type for use cases.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Machine-readable error kinds.
///
/// ## Usage in Frontend
/// ```typescript
/// try {
///   await invoke('record_customer_payment', { input });
/// } catch (e) {
///   switch (e.code) {
///     case 'NOT_FOUND':
///       showNotification('Customer not found');
///       break;
///     case 'VALIDATION':
///       showForm(e.message);
///       break;
///     default:
///       showError('An error occurred');
///   }
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Validation,
    NotFound,
    InsufficientStock,
    UnbalancedEntry,
    InvalidState,
    Conflict,
    Storage,
    Configuration,
}

#[derive(Debug, Error)]
pub enum ServiceError {
    /// Domain failure, carried unmodified.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Storage failure with no domain meaning.
    #[error("Storage error: {0}")]
    Storage(DbError),

    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Config file could not be read or written.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Core(err) => match err {
                CoreError::Validation(_) => ErrorKind::Validation,
                CoreError::NotFound { .. } => ErrorKind::NotFound,
                CoreError::InsufficientStock { .. } => ErrorKind::InsufficientStock,
                CoreError::UnbalancedEntry { .. } => ErrorKind::UnbalancedEntry,
                CoreError::InvalidState { .. } => ErrorKind::InvalidState,
                CoreError::Conflict { .. } => ErrorKind::Conflict,
            },
            ServiceError::Storage(_) => ErrorKind::Storage,
            ServiceError::InvalidConfig(_) | ServiceError::ConfigLoadFailed(_) => ErrorKind::Configuration,
        }
    }

    /// The domain error, when there is one.
    pub fn as_core(&self) -> Option<&CoreError> {
        match self {
            ServiceError::Core(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for ServiceError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Domain(core) => ServiceError::Core(core),
            DbError::NotFound { entity, id } => ServiceError::Core(CoreError::NotFound { entity, id }),
            DbError::UniqueViolation { field, value } => {
                ServiceError::Core(CoreError::conflict(field, value, "already exists"))
            }
            other => {
                tracing::error!(error = %other, "Storage failure");
                ServiceError::Storage(other)
            }
        }
    }
}

impl From<std::io::Error> for ServiceError {
    fn from(err: std::io::Error) -> Self {
        ServiceError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for ServiceError {
    fn from(err: toml::de::Error) -> Self {
        ServiceError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for ServiceError {
    fn from(err: toml::ser::Error) -> Self {
        ServiceError::ConfigLoadFailed(err.to_string())
    }
}

/// Serialized as `{ code, message }` for the calling layer.
impl Serialize for ServiceError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Payload<'a> {
            code: ErrorKind,
            message: &'a str,
        }

        let message = match self {
            // Storage details stay in the log
            ServiceError::Storage(_) => "Database operation failed".to_string(),
            other => other.to_string(),
        };
        Payload {
            code: self.kind(),
            message: &message,
        }
        .serialize(serializer)
    }
}
