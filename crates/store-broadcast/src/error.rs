//! # Broadcast Error Types
//!
//! Error types for broadcasting, receiving and the wire codec.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Broadcast Error Categories                          │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │     Socket      │  │       Domain            │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Bind           │  │  Core (registries)      │ │
//! │  │  ConfigLoad     │  │                 │  │  ChannelError           │ │
//! │  │  ConfigSave     │  │                 │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  Per-cycle and per-datagram failures never surface as BroadcastError:  │
//! │  Sender side:   EncodingError / send error → Failed event              │
//! │  Receiver side: DecodeError → datagram dropped, Rejected event         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;

use thiserror::Error;

use store_core::CoreError;

/// Result type alias for broadcast operations.
pub type BroadcastResult<T> = Result<T, BroadcastError>;

// =============================================================================
// Broadcast Error
// =============================================================================

/// Errors returned by the broadcaster, receiver, controller and config.
#[derive(Debug, Error)]
pub enum BroadcastError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid broadcast configuration.
    #[error("Invalid broadcast configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Socket Errors
    // =========================================================================
    /// Could not open or configure a UDP socket.
    #[error("Failed to bind UDP socket on {addr}: {reason}")]
    Bind { addr: SocketAddr, reason: String },

    // =========================================================================
    // Domain Errors
    // =========================================================================
    /// A registry operation failed.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Background task ended unexpectedly.
    #[error("Channel error: {0}")]
    ChannelError(String),
}

// =============================================================================
// Encoding Error
// =============================================================================

/// Malformed source data found while building a datagram.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodingError {
    /// Transaction references a customer id that is not registered.
    #[error("Transaction {transaction_id} references unknown customer {customer_id}")]
    MissingCustomer {
        transaction_id: String,
        customer_id: String,
    },

    /// Referenced customer has an empty name.
    #[error("Customer {customer_id} has an empty name")]
    EmptyCustomerName { customer_id: String },

    /// Transaction line references an item id that is not registered.
    #[error("Transaction {transaction_id} references unknown item {item_id}")]
    MissingItem {
        transaction_id: String,
        item_id: String,
    },

    /// Referenced item has an empty name.
    #[error("Item {item_id} has an empty name")]
    EmptyItemName { item_id: String },

    /// Transaction has no lines.
    #[error("Transaction {transaction_id} has no lines")]
    NoLines { transaction_id: String },

    /// A single record does not fit in one datagram.
    #[error("Datagram of {size} bytes exceeds limit of {max} bytes")]
    Oversized { size: usize, max: usize },

    /// JSON serialization failed.
    #[error("Serialization failed: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for EncodingError {
    fn from(err: serde_json::Error) -> Self {
        EncodingError::Serialization(err.to_string())
    }
}

// =============================================================================
// Decode Error
// =============================================================================

/// Reasons a received datagram is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Fewer bytes than a header.
    #[error("Datagram too short: {len} bytes, header needs {needed}")]
    TooShort { len: usize, needed: usize },

    /// Magic bytes do not match.
    #[error("Bad magic bytes")]
    BadMagic,

    /// Header version is not understood.
    #[error("Unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// Header kind is not understood.
    #[error("Unknown datagram kind: {0}")]
    UnknownKind(u8),

    /// Declared payload length exceeds the bytes received.
    #[error("Truncated datagram: payload declares {declared} bytes, {actual} available")]
    Truncated { declared: usize, actual: usize },

    /// Bytes remain after the declared payload.
    #[error("{0} trailing bytes after payload")]
    TrailingBytes(usize),

    /// Payload is not valid JSON for its kind.
    #[error("Malformed payload: {0}")]
    Malformed(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<std::io::Error> for BroadcastError {
    fn from(err: std::io::Error) -> Self {
        BroadcastError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for BroadcastError {
    fn from(err: toml::de::Error) -> Self {
        BroadcastError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for BroadcastError {
    fn from(err: toml::ser::Error) -> Self {
        BroadcastError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl BroadcastError {
    /// Returns true when a socket could not be opened.
    pub fn is_socket_error(&self) -> bool {
        matches!(self, BroadcastError::Bind { .. })
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            BroadcastError::InvalidConfig(_)
                | BroadcastError::ConfigLoadFailed(_)
                | BroadcastError::ConfigSaveFailed(_)
        )
    }
}
