//! # Error Types
//!
//! Domain-specific error types for store-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  store-core errors (this file)                                         │
//! │  ├── CoreError        - Registry / transaction rule violations         │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  store-broadcast errors (separate crate)                               │
//! │  └── BroadcastError   - Socket, config, encode/decode failures         │
//! │                                                                         │
//! │  console errors (app)                                                  │
//! │  └── AppError         - What the operator sees (code + message)        │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → AppError → status line            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Registry operations return these as values. Callers match on the variant
//! instead of catching opaque faults.

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Registry and transaction errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Customer id is not registered.
    #[error("Customer not found: {0}")]
    CustomerNotFound(String),

    /// Item id is not registered.
    ///
    /// ## When This Occurs
    /// - Item id typed incorrectly
    /// - Item list was restored from a backup taken before the item existed
    #[error("Item not found: {0}")]
    ItemNotFound(String),

    /// Transaction has no line entries.
    #[error("Transaction must contain at least one item")]
    EmptyTransaction,

    /// Transaction has more lines than allowed.
    #[error("Transaction cannot have more than {max} lines")]
    TooManyLines { max: usize },

    /// Restore was requested but no backup was ever taken.
    #[error("No item backup available to restore")]
    NoBackup,

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when user input doesn't meet requirements.
/// Used for early validation before a registry is touched.
#[derive(Debug, Error)]
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

    /// Invalid format (e.g., unknown item type).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
