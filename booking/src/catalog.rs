//! Item and availability collaborator.
//!
//! The booking component only reads items (price, availability) and tells the
//! catalog when a booking gives its dates back.

use crate::error::StorageError;
use crate::storage::{ITEMS, RecordStore};
use crate::types::{Item, ItemId};
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

/// Read access to listed items
pub trait ItemCatalog: Send + Sync {
    /// Looks up an item
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backing store can't be read.
    fn item(&self, item_id: ItemId) -> Result<Option<Item>, StorageError>;

    /// A booking on `item_id` no longer holds `start_date..=end_date`
    ///
    /// Availability is derived from bookings, so there is nothing to update by
    /// default.
    fn release_dates(&self, item_id: ItemId, start_date: NaiveDate, end_date: NaiveDate) {
        tracing::debug!(%item_id, %start_date, %end_date, "Dates released");
    }
}

/// A released date range
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReleasedRange {
    /// Item
    pub item_id: ItemId,
    /// First day
    pub start_date: NaiveDate,
    /// Last day
    pub end_date: NaiveDate,
}

/// Catalog held in memory
///
/// Keeps the ranges it was told about so callers can inspect them.
#[derive(Debug, Default)]
pub struct InMemoryItemCatalog {
    items: RwLock<HashMap<ItemId, Item>>,
    released: Mutex<Vec<ReleasedRange>>,
}

impl InMemoryItemCatalog {
    /// Creates an empty catalog
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an item
    pub fn insert(&self, item: Item) {
        match self.items.write() {
            Ok(mut items) => items.insert(item.id, item),
            Err(poisoned) => poisoned.into_inner().insert(item.id, item),
        };
    }

    /// Ranges released so far, oldest first
    #[must_use]
    pub fn released_ranges(&self) -> Vec<ReleasedRange> {
        match self.released.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl FromIterator<Item> for InMemoryItemCatalog {
    fn from_iter<I: IntoIterator<Item = Item>>(iter: I) -> Self {
        let catalog = Self::new();
        for item in iter {
            catalog.insert(item);
        }
        catalog
    }
}

impl ItemCatalog for InMemoryItemCatalog {
    fn item(&self, item_id: ItemId) -> Result<Option<Item>, StorageError> {
        let items = self.items.read().map_err(|_| StorageError::Poisoned)?;
        Ok(items.get(&item_id).cloned())
    }

    fn release_dates(&self, item_id: ItemId, start_date: NaiveDate, end_date: NaiveDate) {
        tracing::debug!(%item_id, %start_date, %end_date, "Dates released");
        let range = ReleasedRange {
            item_id,
            start_date,
            end_date,
        };
        match self.released.lock() {
            Ok(mut guard) => guard.push(range),
            Err(poisoned) => poisoned.into_inner().push(range),
        }
    }
}

/// Catalog reading the `items` collection of a record store
#[derive(Clone)]
pub struct StoredItemCatalog {
    store: Arc<dyn RecordStore>,
}

impl StoredItemCatalog {
    /// Wraps a record store
    #[must_use]
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Writes an item into the store
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if encoding or the write fails.
    pub fn save(&self, item: &Item) -> Result<(), StorageError> {
        let record = serde_json::to_value(item)?;
        self.store.put(ITEMS, &item.id.to_string(), record)
    }
}

impl ItemCatalog for StoredItemCatalog {
    fn item(&self, item_id: ItemId) -> Result<Option<Item>, StorageError> {
        for record in self.store.get(ITEMS)? {
            let item: Item = serde_json::from_value(record).map_err(|e| StorageError::Corrupt {
                collection: ITEMS.to_string(),
                reason: e.to_string(),
            })?;
            if item.id == item_id {
                return Ok(Some(item));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can unwrap
mod tests {
    use super::*;
    use crate::storage::InMemoryRecordStore;
    use crate::types::{Money, UserId};

    fn kayak() -> Item {
        Item::new(ItemId::new(), UserId::new(), "Kayak", Money::from_dollars(30))
    }

    #[test]
    fn in_memory_catalog_finds_inserted_items() {
        let item = kayak();
        let catalog: InMemoryItemCatalog = [item.clone()].into_iter().collect();
        assert_eq!(catalog.item(item.id).unwrap(), Some(item));
        assert_eq!(catalog.item(ItemId::new()).unwrap(), None);
    }

    #[test]
    fn in_memory_catalog_records_released_ranges() {
        let catalog = InMemoryItemCatalog::new();
        let item_id = ItemId::new();
        let start = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2025, 6, 5).unwrap();
        catalog.release_dates(item_id, start, end);
        assert_eq!(
            catalog.released_ranges(),
            vec![ReleasedRange {
                item_id,
                start_date: start,
                end_date: end
            }]
        );
    }

    #[test]
    fn stored_catalog_reads_back_saved_items() {
        let store = Arc::new(InMemoryRecordStore::new());
        let catalog = StoredItemCatalog::new(store);
        let item = kayak().with_available_dates([NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()]);
        catalog.save(&item).unwrap();
        assert_eq!(catalog.item(item.id).unwrap(), Some(item));
    }
}
