//! Error types for the booking component.
//!
//! Rule violations come out of the reducer and never involve I/O, so they are
//! cheap to clone into actions and state. Storage failures come from the ports
//! and are wrapped alongside them in [`BookingError`].

use crate::types::{BookingId, BookingStatus, ItemId, UserId};
use chrono::NaiveDate;
use std::path::PathBuf;
use thiserror::Error;

/// Broad class of a booking failure
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing or malformed input
    Validation,
    /// Date overlap with another active booking
    Conflict,
    /// Unknown booking or illegal status transition
    State,
    /// The store could not be read or written
    Persistence,
}

/// A booking command refused by the business rules
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum RuleViolation {
    /// Total price is zero
    #[error("Total price is required")]
    MissingPrice,

    /// Start date lies before today
    #[error("Start date {start_date} is in the past (today is {today})")]
    StartDateInPast {
        /// Requested start
        start_date: NaiveDate,
        /// Today
        today: NaiveDate,
    },

    /// End date not after start date
    #[error("End date {end_date} must be after start date {start_date}")]
    InvalidDateRange {
        /// Requested start
        start_date: NaiveDate,
        /// Requested end
        end_date: NaiveDate,
    },

    /// Renter and owner are the same user
    #[error("You cannot book your own item")]
    SelfBooking,

    /// Item unknown to the catalog
    #[error("Item {0} not found")]
    ItemNotFound(ItemId),

    /// Owner on the request isn't the item's owner
    #[error("User {owner_id} does not own item {item_id}")]
    OwnerMismatch {
        /// Item
        item_id: ItemId,
        /// Owner named on the request
        owner_id: UserId,
    },

    /// Item not offered on a requested date
    #[error("Item {item_id} is not available on {date}")]
    ItemUnavailable {
        /// Item
        item_id: ItemId,
        /// First unavailable date in the requested range
        date: NaiveDate,
    },

    /// Requested range overlaps an active booking
    #[error("Item {item_id} is already booked between {start_date} and {end_date}")]
    DateConflict {
        /// Item
        item_id: ItemId,
        /// Requested start
        start_date: NaiveDate,
        /// Requested end
        end_date: NaiveDate,
    },

    /// Price for the range doesn't fit in a `Money`
    #[error("Price of item {item_id} over {days} days is too large")]
    PriceOverflow {
        /// Item
        item_id: ItemId,
        /// Days quoted
        days: u64,
    },

    /// Booking ID already used
    #[error("Booking {0} already exists")]
    AlreadyExists(BookingId),

    /// Unknown booking
    #[error("Booking {0} not found")]
    NotFound(BookingId),

    /// Transition not in the status table
    #[error("Invalid status transition for booking {booking_id}: {from} -> {to}")]
    InvalidTransition {
        /// Booking
        booking_id: BookingId,
        /// Current status
        from: BookingStatus,
        /// Requested status
        to: BookingStatus,
    },
}

impl RuleViolation {
    /// Broad class of this violation
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingPrice
            | Self::StartDateInPast { .. }
            | Self::InvalidDateRange { .. }
            | Self::SelfBooking
            | Self::ItemNotFound(_)
            | Self::OwnerMismatch { .. }
            | Self::ItemUnavailable { .. }
            | Self::PriceOverflow { .. }
            | Self::AlreadyExists(_) => ErrorKind::Validation,
            Self::DateConflict { .. } => ErrorKind::Conflict,
            Self::NotFound(_) | Self::InvalidTransition { .. } => ErrorKind::State,
        }
    }
}

/// Errors raised by storage ports
#[derive(Error, Debug)]
pub enum StorageError {
    /// Filesystem failure
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Record could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Write would exceed the configured capacity
    #[error("Storage capacity exceeded: {needed} bytes needed, {capacity} bytes available")]
    CapacityExceeded {
        /// Bytes the store would hold after the write
        needed: usize,
        /// Configured limit
        capacity: usize,
    },

    /// Stored data doesn't have the expected shape
    #[error("Corrupt data in collection `{collection}`: {reason}")]
    Corrupt {
        /// Collection name
        collection: String,
        /// What was wrong
        reason: String,
    },

    /// Collection name outside `[a-z0-9_]+`
    #[error("Invalid collection name `{0}`")]
    InvalidCollection(String),

    /// A thread panicked while holding the store lock
    #[error("Storage lock poisoned")]
    Poisoned,
}

/// Errors returned by booking operations
#[derive(Error, Debug)]
pub enum BookingError {
    /// Refused by the business rules; nothing was written
    #[error(transparent)]
    Rejected(#[from] RuleViolation),

    /// Store failure; prior state is intact
    #[error("Persistence failed: {0}")]
    Storage(#[from] StorageError),
}

impl BookingError {
    /// Broad class of this error
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Rejected(violation) => violation.kind(),
            Self::Storage(_) => ErrorKind::Persistence,
        }
    }

    /// The rule violation, if this is one
    #[must_use]
    pub const fn violation(&self) -> Option<&RuleViolation> {
        match self {
            Self::Rejected(violation) => Some(violation),
            Self::Storage(_) => None,
        }
    }
}
