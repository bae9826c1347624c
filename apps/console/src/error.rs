//! # Console Error Type
//!
//! Unified error type for console commands.
//!
//! ## Error Handling Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Flow in the Console                            │
//! │                                                                         │
//! │  stdin line ──► parse_command ──► execute ──► AppResult<Reply>          │
//! │                      │                │                                 │
//! │                      │                ├── CoreError ──────┐             │
//! │                      │                ├── BroadcastError ─┤             │
//! │                      ▼                ▼                   ▼             │
//! │               AppError::usage   AppError::not_found   AppError          │
//! │                      │                │                   │             │
//! │                      └────────────────┴───────────────────┘             │
//! │                                       │                                 │
//! │                                       ▼                                 │
//! │                 printed as a status line, loop continues                │
//! │                 "[NOT_FOUND] Customer not found: Bob"                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;

use store_broadcast::BroadcastError;
use store_core::{CoreError, ValidationError};
use thiserror::Error;

/// Error returned from console commands.
#[derive(Debug, Clone, Error)]
#[error("[{code}] {message}")]
pub struct AppError {
    /// Machine-readable error code
    pub code: ErrorCode,

    /// Human-readable error message for display
    pub message: String,
}

/// Error codes for command failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Command line could not be parsed
    Usage,

    /// Referenced customer or item does not exist
    NotFound,

    /// Input validation failed
    ValidationError,

    /// Operation not allowed in the current state
    BusinessLogic,

    /// Socket could not be bound or used
    SocketError,

    /// Configuration invalid or unreadable
    ConfigError,

    /// Anything else
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Usage => "USAGE",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::BusinessLogic => "BUSINESS_LOGIC",
            ErrorCode::SocketError => "SOCKET_ERROR",
            ErrorCode::ConfigError => "CONFIG_ERROR",
            ErrorCode::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AppError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        AppError {
            code,
            message: message.into(),
        }
    }

    /// Creates a not found error.
    pub fn not_found(resource: &str, id: &str) -> Self {
        AppError::new(ErrorCode::NotFound, format!("{} not found: {}", resource, id))
    }

    /// Creates a usage error pointing at the expected syntax.
    pub fn usage(syntax: &str) -> Self {
        AppError::new(ErrorCode::Usage, format!("Usage: {}", syntax))
    }

    pub fn validation(message: impl Into<String>) -> Self {
        AppError::new(ErrorCode::ValidationError, message)
    }

    pub fn business(message: impl Into<String>) -> Self {
        AppError::new(ErrorCode::BusinessLogic, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        AppError::new(ErrorCode::Internal, message)
    }
}

/// Converts core errors to console errors.
impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::CustomerNotFound(id) => AppError::not_found("Customer", &id),
            CoreError::ItemNotFound(id) => AppError::not_found("Item", &id),
            CoreError::EmptyTransaction | CoreError::TooManyLines { .. } => {
                AppError::validation(err.to_string())
            }
            CoreError::NoBackup => AppError::business(err.to_string()),
            CoreError::Validation(e) => AppError::from(e),
        }
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::validation(err.to_string())
    }
}

/// Converts broadcast errors to console errors.
impl From<BroadcastError> for AppError {
    fn from(err: BroadcastError) -> Self {
        if let BroadcastError::Core(core) = err {
            return AppError::from(core);
        }

        let code = if err.is_socket_error() {
            ErrorCode::SocketError
        } else if err.is_config_error() {
            ErrorCode::ConfigError
        } else {
            tracing::error!("Broadcast error: {}", err);
            ErrorCode::Internal
        };
        AppError::new(code, err.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    #[test]
    fn test_display_includes_code() {
        let err = AppError::not_found("Customer", "Bob");
        assert_eq!(err.to_string(), "[NOT_FOUND] Customer not found: Bob");
    }

    #[test]
    fn test_core_error_mapping() {
        assert_eq!(AppError::from(CoreError::NoBackup).code, ErrorCode::BusinessLogic);
        assert_eq!(
            AppError::from(CoreError::EmptyTransaction).code,
            ErrorCode::ValidationError
        );

        let err = AppError::from(CoreError::Validation(ValidationError::Required {
            field: "customer name".into(),
        }));
        assert_eq!(err.code, ErrorCode::ValidationError);
        assert_eq!(err.message, "customer name is required");
    }

    #[test]
    fn test_broadcast_error_mapping() {
        let err = AppError::from(BroadcastError::Core(CoreError::NoBackup));
        assert_eq!(err.code, ErrorCode::BusinessLogic);

        let err = AppError::from(BroadcastError::InvalidConfig("port".into()));
        assert_eq!(err.code, ErrorCode::ConfigError);

        let addr: SocketAddr = "0.0.0.0:45454".parse().unwrap();
        let err = AppError::from(BroadcastError::Bind {
            addr,
            reason: "address in use".into(),
        });
        assert_eq!(err.code, ErrorCode::SocketError);
        assert!(err.message.contains("0.0.0.0:45454"));

        let err = AppError::from(BroadcastError::ChannelError("task panicked".into()));
        assert_eq!(err.code, ErrorCode::Internal);
    }
}
