//! # Domain Types
//!
//! Core domain types used throughout the store manager.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Customer     │   │   Transaction   │   │      Item       │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │◄──│  customer_id    │   │  id (UUID)      │       │
//! │  │  name           │   │  timestamp      │   │  name           │       │
//! │  └─────────────────┘   │  lines ─────────┼──►│  item_type      │       │
//! │                        └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │                        ┌─────────────────┐   ┌─────────────────┐       │
//! │                        │   LineEntry     │   │    ItemType     │       │
//! │                        │  item_id        │   │  Book           │       │
//! │                        │  quantity       │   │  Magazine       │       │
//! │                        └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Transactions reference customers and items by id. Names are resolved at
//! the point of use (rendering, broadcast encoding), so a restored item list
//! shows up as a missing reference rather than stale data.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

// =============================================================================
// Customer
// =============================================================================

/// A registered customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Display name.
    pub name: String,

    /// When the customer was registered.
    pub created_at: DateTime<Utc>,
}

impl Customer {
    /// Creates a customer with a fresh id. The name is stored as given;
    /// registries validate before calling this.
    pub fn new(name: impl Into<String>) -> Self {
        Customer {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            created_at: Utc::now(),
        }
    }
}

// =============================================================================
// Item Type
// =============================================================================

/// Kind of stock item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Book,
    Magazine,
}

impl std::fmt::Display for ItemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ItemType::Book => write!(f, "Book"),
            ItemType::Magazine => write!(f, "Magazine"),
        }
    }
}

impl std::str::FromStr for ItemType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "book" => Ok(ItemType::Book),
            "magazine" | "mag" => Ok(ItemType::Magazine),
            other => Err(ValidationError::InvalidFormat {
                field: "item type".to_string(),
                reason: format!("'{}' is not one of: book, magazine", other),
            }),
        }
    }
}

// =============================================================================
// Item
// =============================================================================

/// An inventory item available for sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Display name shown on receipts and broadcasts.
    pub name: String,

    /// Book or magazine.
    pub item_type: ItemType,

    /// When the item was registered.
    pub created_at: DateTime<Utc>,
}

impl Item {
    /// Creates an item with a fresh id.
    pub fn new(name: impl Into<String>, item_type: ItemType) -> Self {
        Item {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            item_type,
            created_at: Utc::now(),
        }
    }
}

// =============================================================================
// Transaction
// =============================================================================

/// One line of a transaction: an item and how many were sold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineEntry {
    /// Referenced item id.
    pub item_id: String,

    /// Quantity sold (1..=MAX_ITEM_QUANTITY).
    pub quantity: u32,
}

/// A completed sale. Immutable once registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Referenced customer id.
    pub customer_id: String,

    /// When the sale happened.
    pub timestamp: DateTime<Utc>,

    /// Ordered line entries.
    pub lines: Vec<LineEntry>,
}

impl Transaction {
    /// Creates a transaction stamped with the current time.
    pub fn new(customer_id: impl Into<String>, lines: Vec<LineEntry>) -> Self {
        Self::at(customer_id, Utc::now(), lines)
    }

    /// Creates a transaction with an explicit timestamp.
    pub fn at(
        customer_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        lines: Vec<LineEntry>,
    ) -> Self {
        Transaction {
            id: Uuid::new_v4().to_string(),
            customer_id: customer_id.into(),
            timestamp,
            lines,
        }
    }

    /// Total number of units across all lines.
    pub fn total_quantity(&self) -> u64 {
        self.lines.iter().map(|l| l.quantity as u64).sum()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_type_parsing() {
        assert_eq!("book".parse::<ItemType>().unwrap(), ItemType::Book);
        assert_eq!(" Magazine ".parse::<ItemType>().unwrap(), ItemType::Magazine);
        assert_eq!("mag".parse::<ItemType>().unwrap(), ItemType::Magazine);
        assert!("dvd".parse::<ItemType>().is_err());
    }

    #[test]
    fn test_item_type_display() {
        assert_eq!(ItemType::Book.to_string(), "Book");
        assert_eq!(ItemType::Magazine.to_string(), "Magazine");
    }

    #[test]
    fn test_item_type_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&ItemType::Magazine).unwrap(), "\"magazine\"");
        let parsed: ItemType = serde_json::from_str("\"book\"").unwrap();
        assert_eq!(parsed, ItemType::Book);
    }

    #[test]
    fn test_new_entities_get_distinct_ids() {
        let a = Customer::new("Alice");
        let b = Customer::new("Alice");
        assert_ne!(a.id, b.id);

        let item = Item::new("Go Programming", ItemType::Book);
        assert_eq!(item.name, "Go Programming");
        assert_eq!(item.item_type, ItemType::Book);
    }

    #[test]
    fn test_transaction_total_quantity() {
        let tx = Transaction::new(
            "customer-1",
            vec![
                LineEntry { item_id: "a".into(), quantity: 2 },
                LineEntry { item_id: "b".into(), quantity: 3 },
            ],
        );
        assert_eq!(tx.total_quantity(), 5);
    }
}
