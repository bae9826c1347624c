//! # store-core: Domain Types and Registries
//!
//! Customers, inventory items and transactions for the store manager, plus
//! the append-only registries that hold them. Everything here is plain data
//! and in-memory bookkeeping; the broadcast crate and the console app build
//! on top of it.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Store Manager Architecture                          │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    store-console (app)                          │   │
//! │  │    customer / item / sale / start / stop / receiver commands    │   │
//! │  └──────────────┬───────────────────────────────┬──────────────────┘   │
//! │                 │                               │                       │
//! │  ┌──────────────▼──────────────┐  ┌─────────────▼───────────────────┐  │
//! │  │ ★ store-core (THIS CRATE) ★ │◄─│   store-broadcast               │  │
//! │  │                             │  │   encoder, broadcaster,         │  │
//! │  │  types     validation       │  │   receiver, controller          │  │
//! │  │  registry  error            │  │   (reads registries per cycle)  │  │
//! │  └─────────────────────────────┘  └─────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Customer, Item, Transaction)
//! - [`registry`] - Append-only registries with observer notifications
//! - [`error`] - Domain error types
//! - [`validation`] - Name and quantity rules
//!
//! ## Example Usage
//!
//! ```rust
//! use store_core::{ItemType, StoreRegistries};
//!
//! let store = StoreRegistries::new();
//! let alice = store.customers().add_customer("Alice").unwrap();
//! let book = store.items().add_item("Go Programming", ItemType::Book).unwrap();
//!
//! let tx = store
//!     .create_transaction(&alice.id, &[(book.id.as_str(), 2)])
//!     .unwrap();
//! assert_eq!(tx.lines[0].quantity, 2);
//! assert_eq!(store.transactions().len(), 1);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod registry;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use registry::{
    CustomerRegistry, ItemRegistry, RegistryEvent, RegistryObserver, StoreRegistries,
    TransactionRegistry,
};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum length of a customer or item name.
pub const MAX_NAME_LEN: usize = 200;

/// Maximum quantity of a single item on one transaction line.
///
/// Guards against typing 1000 instead of 10 at checkout.
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Maximum number of lines on a single transaction.
pub const MAX_TRANSACTION_LINES: usize = 100;
