//! Booking lifecycle and availability-conflict rules for Kinship.
//!
//! Kinship is a peer-to-peer rental marketplace. This crate owns the part of
//! it with the most rules: creating bookings without double-booking an item,
//! moving them through their statuses, and telling the people involved.
//!
//! # Architecture
//!
//! 1. **Commands** (`CreateBooking`, `UpdateStatus`, `ReconcileByDate`) are
//!    validated by [`BookingReducer`] against the stored collection
//! 2. **Events** (`BookingCreated`, `StatusChanged`) update the state
//! 3. **Effects** describe notifications and released dates
//! 4. [`BookingManager`] stores changed bookings, then runs their effects
//!
//! Storage, items, notifications and time are injected ports
//! ([`RecordStore`], [`ItemCatalog`], [`Notifier`], [`Clock`]).
//!
//! # Example Usage
//!
//! ```
//! use kinship_booking::{
//!     BookingEnvironment, BookingManager, BookingRequest, BookingStatus, ChannelNotifier,
//!     InMemoryItemCatalog, InMemoryRecordStore, Item, ItemId, Money, UserId,
//! };
//! use kinship_core::environment::SystemClock;
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), kinship_booking::BookingError> {
//! let owner = UserId::new();
//! let item = Item::new(ItemId::new(), owner, "Camping tent", Money::from_dollars(25));
//! let catalog: InMemoryItemCatalog = [item.clone()].into_iter().collect();
//! let notifier = Arc::new(ChannelNotifier::new(16));
//! let mut inbox = notifier.subscribe();
//!
//! let env = BookingEnvironment::new(Arc::new(SystemClock), notifier, Arc::new(catalog));
//! let manager = BookingManager::new(env, Arc::new(InMemoryRecordStore::new()));
//!
//! let today = chrono::Utc::now().date_naive();
//! let start_date = today + chrono::Duration::days(7);
//! let end_date = start_date + chrono::Duration::days(3);
//! let booking = manager.create_booking(BookingRequest {
//!     item_id: item.id,
//!     renter_id: UserId::new(),
//!     owner_id: owner,
//!     start_date,
//!     end_date,
//!     total_price: manager.quote_price(item.id, start_date, end_date)?,
//! })?;
//! assert_eq!(booking.status(), BookingStatus::Pending);
//! assert_eq!(inbox.try_recv().map(|d| d.user_id).ok(), Some(owner));
//!
//! let booking = manager.confirm_booking(booking.id())?;
//! assert_eq!(booking.status(), BookingStatus::Confirmed);
//! # Ok(())
//! # }
//! ```
//!
//! [`Clock`]: kinship_core::environment::Clock

pub mod catalog;
pub mod config;
pub mod error;
pub mod manager;
pub mod notification;
pub mod reducer;
pub mod storage;
pub mod types;

// Re-export commonly used types
pub use catalog::{InMemoryItemCatalog, ItemCatalog, ReleasedRange, StoredItemCatalog};
pub use config::{Config, NotificationConfig, StorageConfig};
pub use error::{BookingError, ErrorKind, RuleViolation, StorageError};
pub use manager::BookingManager;
pub use notification::{
    ChannelNotifier, Delivery, Notification, NotificationKind, Notifier, RecordingNotifier,
    TracingNotifier,
};
pub use reducer::{BookingEnvironment, BookingReducer};
pub use storage::{BookingRepository, InMemoryRecordStore, JsonFileRecordStore, RecordStore};
pub use types::{
    Availability, Booking, BookingAction, BookingId, BookingRequest, BookingRole, BookingState,
    BookingStats, BookingStatus, Item, ItemId, Money, Pricing, StatusChange, UserBooking, UserId,
    UserRole,
};
