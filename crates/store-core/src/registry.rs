//! # Registries
//!
//! Append-only, in-memory collections of customers, items and transactions.
//!
//! ## Ownership
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Registry Ownership                                │
//! │                                                                         │
//! │  console app ──owns──► Arc<StoreRegistries>                            │
//! │                              │                                          │
//! │          ┌───────────────────┼────────────────────┐                    │
//! │          ▼                   ▼                    ▼                     │
//! │  ┌────────────────┐ ┌────────────────┐ ┌────────────────────┐          │
//! │  │CustomerRegistry│ │  ItemRegistry  │ │TransactionRegistry │          │
//! │  │ RwLock<Vec<_>> │ │ RwLock<Vec<_>> │ │  RwLock<Vec<_>>    │          │
//! │  │                │ │ + backup slot  │ │                    │          │
//! │  └────────────────┘ └────────────────┘ └─────────┬──────────┘          │
//! │                                                   │ read at send time   │
//! │                                                   ▼                     │
//! │                                      broadcast timer (other thread)     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each registry is injected where it is needed; there is no global instance.
//! Appends are rare and reads are frequent (control thread plus broadcast
//! timer), so every collection sits behind a `std::sync::RwLock`.
//!
//! ## Notifications
//! Observers registered with `subscribe` are called synchronously, after the
//! write lock has been released, with a [`RegistryEvent`].

use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{CoreError, CoreResult};
use crate::types::{Customer, Item, ItemType, LineEntry, Transaction};
use crate::validation::{validate_name, validate_quantity};
use crate::MAX_TRANSACTION_LINES;

// =============================================================================
// Events & Observers
// =============================================================================

/// Change notification emitted by a registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    /// A customer was registered.
    CustomerAdded(Customer),
    /// An item was registered.
    ItemAdded(Item),
    /// The item list was replaced from a backup.
    ItemsRestored { count: usize },
    /// A transaction was registered.
    TransactionAdded(Transaction),
}

/// Receives registry change notifications.
pub trait RegistryObserver: Send + Sync {
    /// Called once per change, on the thread that made the change.
    fn on_registry_event(&self, event: &RegistryEvent);
}

#[derive(Default)]
struct Observers {
    list: RwLock<Vec<Arc<dyn RegistryObserver>>>,
}

impl Observers {
    fn subscribe(&self, observer: Arc<dyn RegistryObserver>) {
        write(&self.list).push(observer);
    }

    fn notify(&self, event: RegistryEvent) {
        // Clone the list so observers may subscribe or read registries.
        let observers: Vec<_> = read(&self.list).iter().cloned().collect();
        for observer in observers {
            observer.on_registry_event(&event);
        }
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// Customer Registry
// =============================================================================

/// Registered customers, in insertion order.
#[derive(Default)]
pub struct CustomerRegistry {
    customers: RwLock<Vec<Customer>>,
    observers: Observers,
}

impl CustomerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a customer. The name is trimmed and must be non-empty.
    pub fn add_customer(&self, name: &str) -> CoreResult<Customer> {
        let name = validate_name("customer name", name)?;
        let customer = Customer::new(name);

        write(&self.customers).push(customer.clone());
        self.observers
            .notify(RegistryEvent::CustomerAdded(customer.clone()));

        Ok(customer)
    }

    /// Returns a snapshot of all customers.
    pub fn customers(&self) -> Vec<Customer> {
        read(&self.customers).clone()
    }

    /// Looks up a customer by id.
    pub fn get(&self, id: &str) -> Option<Customer> {
        read(&self.customers).iter().find(|c| c.id == id).cloned()
    }

    /// Finds the first customer with the given name (case-insensitive).
    pub fn find_by_name(&self, name: &str) -> Option<Customer> {
        let name = name.trim();
        read(&self.customers)
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
            .cloned()
    }

    pub fn len(&self) -> usize {
        read(&self.customers).len()
    }

    pub fn is_empty(&self) -> bool {
        read(&self.customers).is_empty()
    }

    pub fn subscribe(&self, observer: Arc<dyn RegistryObserver>) {
        self.observers.subscribe(observer);
    }
}

// =============================================================================
// Item Registry
// =============================================================================

/// Registered items, with a single backup slot for restore.
#[derive(Default)]
pub struct ItemRegistry {
    items: RwLock<Vec<Item>>,
    backup: RwLock<Option<Vec<Item>>>,
    observers: Observers,
}

impl ItemRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an item. The name is trimmed and must be non-empty.
    pub fn add_item(&self, name: &str, item_type: ItemType) -> CoreResult<Item> {
        let name = validate_name("item name", name)?;
        let item = Item::new(name, item_type);

        write(&self.items).push(item.clone());
        self.observers.notify(RegistryEvent::ItemAdded(item.clone()));

        Ok(item)
    }

    /// Returns a snapshot of all items.
    pub fn items(&self) -> Vec<Item> {
        read(&self.items).clone()
    }

    /// Looks up an item by id.
    pub fn get(&self, id: &str) -> Option<Item> {
        read(&self.items).iter().find(|i| i.id == id).cloned()
    }

    /// Finds the first item with the given name (case-insensitive).
    pub fn find_by_name(&self, name: &str) -> Option<Item> {
        let name = name.trim();
        read(&self.items)
            .iter()
            .find(|i| i.name.eq_ignore_ascii_case(name))
            .cloned()
    }

    pub fn len(&self) -> usize {
        read(&self.items).len()
    }

    pub fn is_empty(&self) -> bool {
        read(&self.items).is_empty()
    }

    /// Saves the current item list into the backup slot, replacing any
    /// earlier backup. Returns the number of items saved.
    pub fn backup(&self) -> usize {
        let snapshot = read(&self.items).clone();
        let count = snapshot.len();
        *write(&self.backup) = Some(snapshot);
        count
    }

    /// Replaces the current item list with the last backup.
    ///
    /// Items added after the backup whose id is in `keep` survive, appended
    /// after the backed-up items in their current order. The backup itself
    /// is kept, so restoring twice yields the same list. Returns the new
    /// item count.
    pub fn restore_from_backup(&self, keep: &HashSet<String>) -> CoreResult<usize> {
        let mut restored = read(&self.backup).clone().ok_or(CoreError::NoBackup)?;

        let count = {
            let mut items = write(&self.items);
            let retained: Vec<Item> = items
                .iter()
                .filter(|item| keep.contains(&item.id))
                .filter(|item| !restored.iter().any(|r| r.id == item.id))
                .cloned()
                .collect();
            restored.extend(retained);
            *items = restored;
            items.len()
        };
        self.observers.notify(RegistryEvent::ItemsRestored { count });

        Ok(count)
    }

    pub fn has_backup(&self) -> bool {
        read(&self.backup).is_some()
    }

    pub fn subscribe(&self, observer: Arc<dyn RegistryObserver>) {
        self.observers.subscribe(observer);
    }
}

// =============================================================================
// Transaction Registry
// =============================================================================

/// Registered transactions, in insertion order.
#[derive(Default)]
pub struct TransactionRegistry {
    transactions: RwLock<Vec<Transaction>>,
    observers: Observers,
}

impl TransactionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a transaction.
    ///
    /// Only the line count is checked here; reference checks belong to
    /// [`StoreRegistries::create_transaction`], which sees all registries.
    pub fn add_transaction(&self, transaction: Transaction) -> CoreResult<Transaction> {
        if transaction.lines.is_empty() {
            return Err(CoreError::EmptyTransaction);
        }
        if transaction.lines.len() > MAX_TRANSACTION_LINES {
            return Err(CoreError::TooManyLines {
                max: MAX_TRANSACTION_LINES,
            });
        }

        write(&self.transactions).push(transaction.clone());
        self.observers
            .notify(RegistryEvent::TransactionAdded(transaction.clone()));

        Ok(transaction)
    }

    /// Returns a snapshot of all transactions.
    pub fn transactions(&self) -> Vec<Transaction> {
        read(&self.transactions).clone()
    }

    pub fn get(&self, id: &str) -> Option<Transaction> {
        read(&self.transactions).iter().find(|t| t.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        read(&self.transactions).len()
    }

    pub fn is_empty(&self) -> bool {
        read(&self.transactions).is_empty()
    }

    pub fn subscribe(&self, observer: Arc<dyn RegistryObserver>) {
        self.observers.subscribe(observer);
    }
}

// =============================================================================
// Store Registries
// =============================================================================

/// The three registries of one store, shared via `Arc`.
#[derive(Default)]
pub struct StoreRegistries {
    customers: CustomerRegistry,
    items: ItemRegistry,
    transactions: TransactionRegistry,
}

impl StoreRegistries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn customers(&self) -> &CustomerRegistry {
        &self.customers
    }

    pub fn items(&self) -> &ItemRegistry {
        &self.items
    }

    pub fn transactions(&self) -> &TransactionRegistry {
        &self.transactions
    }

    /// Registers the observer with all three registries.
    pub fn subscribe_all(&self, observer: Arc<dyn RegistryObserver>) {
        self.customers.subscribe(observer.clone());
        self.items.subscribe(observer.clone());
        self.transactions.subscribe(observer);
    }

    /// Restores items from the backup without orphaning any transaction.
    ///
    /// Items referenced by a registered transaction stay registered even
    /// when they were added after the backup, so every line keeps resolving.
    pub fn restore_items(&self) -> CoreResult<usize> {
        let referenced: HashSet<String> = read(&self.transactions.transactions)
            .iter()
            .flat_map(|t| t.lines.iter().map(|l| l.item_id.clone()))
            .collect();

        self.items.restore_from_backup(&referenced)
    }

    /// A transaction needs at least one customer and one item to pick from.
    pub fn can_create_transaction(&self) -> bool {
        !self.customers.is_empty() && !self.items.is_empty()
    }

    /// Builds and registers a checkout.
    ///
    /// ## Checks
    /// - customer id is registered
    /// - at least one line, at most MAX_TRANSACTION_LINES
    /// - every item id is registered
    /// - every quantity within 1..=MAX_ITEM_QUANTITY
    pub fn create_transaction(
        &self,
        customer_id: &str,
        lines: &[(&str, i64)],
    ) -> CoreResult<Transaction> {
        let customer = self
            .customers
            .get(customer_id)
            .ok_or_else(|| CoreError::CustomerNotFound(customer_id.to_string()))?;

        if lines.is_empty() {
            return Err(CoreError::EmptyTransaction);
        }

        let mut entries = Vec::with_capacity(lines.len());
        for (item_id, quantity) in lines {
            let item = self
                .items
                .get(item_id)
                .ok_or_else(|| CoreError::ItemNotFound(item_id.to_string()))?;
            let quantity = validate_quantity(*quantity)?;
            entries.push(LineEntry {
                item_id: item.id,
                quantity,
            });
        }

        self.transactions
            .add_transaction(Transaction::new(customer.id, entries))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<RegistryEvent>>,
    }

    impl RegistryObserver for Recorder {
        fn on_registry_event(&self, event: &RegistryEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    #[test]
    fn test_add_customer_trims_and_rejects_empty() {
        let registry = CustomerRegistry::new();
        let alice = registry.add_customer("  Alice ").unwrap();
        assert_eq!(alice.name, "Alice");
        assert_eq!(registry.len(), 1);

        let err = registry.add_customer("   ").unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_find_by_name_is_case_insensitive() {
        let registry = ItemRegistry::new();
        let item = registry.add_item("Go Programming", ItemType::Book).unwrap();

        assert_eq!(registry.find_by_name("go programming").unwrap().id, item.id);
        assert!(registry.find_by_name("Rust Programming").is_none());
    }

    #[test]
    fn test_restore_without_backup_fails() {
        let registry = ItemRegistry::new();
        assert!(matches!(
            registry.restore_from_backup(&HashSet::new()),
            Err(CoreError::NoBackup)
        ));
    }

    #[test]
    fn test_backup_and_restore() {
        let registry = ItemRegistry::new();
        registry.add_item("Go Programming", ItemType::Book).unwrap();
        assert_eq!(registry.backup(), 1);

        registry.add_item("Wired", ItemType::Magazine).unwrap();
        assert_eq!(registry.len(), 2);

        assert_eq!(registry.restore_from_backup(&HashSet::new()).unwrap(), 1);
        assert_eq!(registry.len(), 1);
        assert!(registry.find_by_name("Wired").is_none());
        assert!(registry.has_backup());
    }

    #[test]
    fn test_restore_keeps_requested_items() {
        let registry = ItemRegistry::new();
        let book = registry.add_item("Go Programming", ItemType::Book).unwrap();
        registry.backup();
        let wired = registry.add_item("Wired", ItemType::Magazine).unwrap();
        registry.add_item("Byte", ItemType::Magazine).unwrap();

        let keep: HashSet<String> = [wired.id.clone(), book.id.clone()].into_iter().collect();
        assert_eq!(registry.restore_from_backup(&keep).unwrap(), 2);

        let ids: Vec<String> = registry.items().into_iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![book.id, wired.id]);
        assert!(registry.find_by_name("Byte").is_none());
    }

    #[test]
    fn test_restore_items_keeps_items_sold_after_backup() {
        let store = StoreRegistries::new();
        let alice = store.customers().add_customer("Alice").unwrap();
        let book = store.items().add_item("Go Programming", ItemType::Book).unwrap();
        store
            .create_transaction(&alice.id, &[(book.id.as_str(), 2)])
            .unwrap();
        store.items().backup();

        let wired = store.items().add_item("Wired", ItemType::Magazine).unwrap();
        let unsold = store.items().add_item("Byte", ItemType::Magazine).unwrap();
        store
            .create_transaction(&alice.id, &[(wired.id.as_str(), 1)])
            .unwrap();

        assert_eq!(store.restore_items().unwrap(), 2);
        assert!(store.items().get(&unsold.id).is_none());
        for tx in store.transactions().transactions() {
            for line in &tx.lines {
                assert!(store.items().get(&line.item_id).is_some());
            }
        }
    }

    #[test]
    fn test_restore_items_without_backup_fails() {
        let store = StoreRegistries::new();
        assert!(matches!(store.restore_items(), Err(CoreError::NoBackup)));
    }

    #[test]
    fn test_create_transaction_happy_path() {
        let store = StoreRegistries::new();
        assert!(!store.can_create_transaction());

        let alice = store.customers().add_customer("Alice").unwrap();
        let book = store.items().add_item("Go Programming", ItemType::Book).unwrap();
        assert!(store.can_create_transaction());

        let tx = store
            .create_transaction(&alice.id, &[(book.id.as_str(), 2)])
            .unwrap();

        assert_eq!(tx.customer_id, alice.id);
        assert_eq!(tx.lines, vec![LineEntry { item_id: book.id, quantity: 2 }]);
        assert_eq!(store.transactions().get(&tx.id).unwrap(), tx);
    }

    #[test]
    fn test_create_transaction_rejections() {
        let store = StoreRegistries::new();
        let alice = store.customers().add_customer("Alice").unwrap();
        let book = store.items().add_item("Go Programming", ItemType::Book).unwrap();

        assert!(matches!(
            store.create_transaction("nobody", &[(book.id.as_str(), 1)]),
            Err(CoreError::CustomerNotFound(_))
        ));
        assert!(matches!(
            store.create_transaction(&alice.id, &[]),
            Err(CoreError::EmptyTransaction)
        ));
        assert!(matches!(
            store.create_transaction(&alice.id, &[("missing", 1)]),
            Err(CoreError::ItemNotFound(_))
        ));
        assert!(matches!(
            store.create_transaction(&alice.id, &[(book.id.as_str(), 0)]),
            Err(CoreError::Validation(_))
        ));
        assert!(store.transactions().is_empty());
    }

    #[test]
    fn test_add_transaction_rejects_empty_lines() {
        let registry = TransactionRegistry::new();
        let err = registry
            .add_transaction(Transaction::new("c", Vec::new()))
            .unwrap_err();
        assert!(matches!(err, CoreError::EmptyTransaction));
    }

    #[test]
    fn test_observers_receive_events_in_order() {
        let store = StoreRegistries::new();
        let recorder = Arc::new(Recorder::default());
        store.subscribe_all(recorder.clone());

        let alice = store.customers().add_customer("Alice").unwrap();
        let book = store.items().add_item("Go Programming", ItemType::Book).unwrap();
        store.items().backup();
        store.restore_items().unwrap();
        let tx = store
            .create_transaction(&alice.id, &[(book.id.as_str(), 1)])
            .unwrap();

        let events = recorder.events.lock().unwrap();
        assert_eq!(
            *events,
            vec![
                RegistryEvent::CustomerAdded(alice),
                RegistryEvent::ItemAdded(book),
                RegistryEvent::ItemsRestored { count: 1 },
                RegistryEvent::TransactionAdded(tx),
            ]
        );
    }

    #[test]
    fn test_failed_add_does_not_notify() {
        let registry = CustomerRegistry::new();
        let recorder = Arc::new(Recorder::default());
        registry.subscribe(recorder.clone());

        let _ = registry.add_customer("");
        assert!(recorder.events.lock().unwrap().is_empty());
    }
}
