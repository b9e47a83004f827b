//! Domain types for Kinship bookings.
//!
//! A booking is a renter's request to use an owner's item for an inclusive
//! range of calendar dates. It moves through a small status machine and keeps
//! an append-only history of every status it has held.

use crate::error::RuleViolation;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::iter::Sum;
use std::ops::Add;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for a booking
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BookingId(Uuid);

impl BookingId {
    /// Creates a new random `BookingId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BookingId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BookingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a listed item
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemId(Uuid);

impl ItemId {
    /// Creates a new random `ItemId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a marketplace user (renter or owner)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(Uuid);

impl UserId {
    /// Creates a new random `UserId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Value Objects
// ============================================================================

/// Money amount in cents
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Money(u64);

impl Money {
    /// Zero
    pub const ZERO: Self = Self(0);

    /// Creates `Money` from cents
    #[must_use]
    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    /// Creates `Money` from whole dollars, saturating at the largest amount
    #[must_use]
    pub const fn from_dollars(dollars: u64) -> Self {
        Self(dollars.saturating_mul(100))
    }

    /// Returns the amount in cents
    #[must_use]
    pub const fn cents(&self) -> u64 {
        self.0
    }

    /// Returns true for a zero amount
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Multiplies by a count, `None` on overflow
    #[must_use]
    pub const fn checked_times(self, count: u64) -> Option<Self> {
        match self.0.checked_mul(count) {
            Some(cents) => Some(Self(cents)),
            None => None,
        }
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}.{:02}", self.0 / 100, self.0 % 100)
    }
}

// ============================================================================
// Booking Status
// ============================================================================

/// Lifecycle status of a booking
///
/// ```text
/// pending ──► confirmed ──► active ──► completed
///    │  │          │           │
///    │  └► rejected└► cancelled◄┘
///    └──────────────► cancelled
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    /// Requested by the renter, awaiting the owner
    Pending,
    /// Accepted by the owner
    Confirmed,
    /// Rental window in progress
    Active,
    /// Rental finished
    Completed,
    /// Withdrawn by either party
    Cancelled,
    /// Declined by the owner
    Rejected,
}

impl BookingStatus {
    /// All statuses, in lifecycle order
    pub const ALL: [Self; 6] = [
        Self::Pending,
        Self::Confirmed,
        Self::Active,
        Self::Completed,
        Self::Cancelled,
        Self::Rejected,
    ];

    /// Statuses reachable from this one in a single transition
    #[must_use]
    pub const fn allowed_transitions(self) -> &'static [Self] {
        match self {
            Self::Pending => &[Self::Confirmed, Self::Rejected, Self::Cancelled],
            Self::Confirmed => &[Self::Active, Self::Cancelled],
            Self::Active => &[Self::Completed, Self::Cancelled],
            Self::Completed | Self::Cancelled | Self::Rejected => &[],
        }
    }

    /// Returns true if `next` is a legal transition from this status
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        self.allowed_transitions().contains(&next)
    }

    /// Returns true if no transition leaves this status
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        self.allowed_transitions().is_empty()
    }

    /// Returns true if a booking in this status holds its dates
    ///
    /// Everything except `cancelled` and `rejected` counts toward conflicts.
    #[must_use]
    pub const fn blocks_dates(self) -> bool {
        !matches!(self, Self::Cancelled | Self::Rejected)
    }

    /// Returns true if entering this status gives the dates back to the item
    #[must_use]
    pub const fn releases_dates(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Rejected)
    }

    /// History message used when the caller doesn't supply one
    #[must_use]
    pub const fn default_message(self) -> &'static str {
        match self {
            Self::Pending => "Booking request created",
            Self::Confirmed => "Booking confirmed by owner",
            Self::Active => "Rental started",
            Self::Completed => "Rental completed",
            Self::Cancelled => "Booking cancelled",
            Self::Rejected => "Booking rejected by owner",
        }
    }

    /// Lowercase name, as stored
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a booking's status history
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    /// Status entered
    pub status: BookingStatus,
    /// When it was entered
    pub timestamp: DateTime<Utc>,
    /// Human-readable note
    pub message: String,
}

// ============================================================================
// Booking
// ============================================================================

/// Input for a new booking
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRequest {
    /// Item being rented
    pub item_id: ItemId,
    /// User renting the item
    pub renter_id: UserId,
    /// User who owns the item
    pub owner_id: UserId,
    /// First day of the rental
    pub start_date: NaiveDate,
    /// Last day of the rental
    pub end_date: NaiveDate,
    /// Price agreed at request time
    pub total_price: Money,
}

/// A booking record
///
/// Fields are read through accessors. The only mutation after creation is a
/// status transition, which appends to the history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    id: BookingId,
    item_id: ItemId,
    renter_id: UserId,
    owner_id: UserId,
    start_date: NaiveDate,
    end_date: NaiveDate,
    total_price: Money,
    status: BookingStatus,
    status_history: Vec<StatusChange>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Booking {
    /// Creates a pending booking from a request
    #[must_use]
    pub fn new(id: BookingId, request: BookingRequest, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            item_id: request.item_id,
            renter_id: request.renter_id,
            owner_id: request.owner_id,
            start_date: request.start_date,
            end_date: request.end_date,
            total_price: request.total_price,
            status: BookingStatus::Pending,
            status_history: vec![StatusChange {
                status: BookingStatus::Pending,
                timestamp: created_at,
                message: BookingStatus::Pending.default_message().to_string(),
            }],
            created_at,
            updated_at: created_at,
        }
    }

    /// Booking ID
    #[must_use]
    pub const fn id(&self) -> BookingId {
        self.id
    }

    /// Item being rented
    #[must_use]
    pub const fn item_id(&self) -> ItemId {
        self.item_id
    }

    /// Renter
    #[must_use]
    pub const fn renter_id(&self) -> UserId {
        self.renter_id
    }

    /// Owner
    #[must_use]
    pub const fn owner_id(&self) -> UserId {
        self.owner_id
    }

    /// First day
    #[must_use]
    pub const fn start_date(&self) -> NaiveDate {
        self.start_date
    }

    /// Last day
    #[must_use]
    pub const fn end_date(&self) -> NaiveDate {
        self.end_date
    }

    /// Price fixed at creation
    #[must_use]
    pub const fn total_price(&self) -> Money {
        self.total_price
    }

    /// Current status
    #[must_use]
    pub const fn status(&self) -> BookingStatus {
        self.status
    }

    /// Every status held so far, oldest first
    #[must_use]
    pub fn status_history(&self) -> &[StatusChange] {
        &self.status_history
    }

    /// Creation time
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Time of the last status change
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns true if the booking currently holds its dates
    #[must_use]
    pub const fn blocks_dates(&self) -> bool {
        self.status.blocks_dates()
    }

    /// Overlap test against a requested range
    ///
    /// `existing.start < requested.end && existing.end > requested.start`.
    /// A request starting on this booking's last day does not overlap.
    #[must_use]
    pub fn overlaps(&self, start_date: NaiveDate, end_date: NaiveDate) -> bool {
        self.start_date < end_date && self.end_date > start_date
    }

    /// Returns true if `date` falls inside the inclusive rental window
    #[must_use]
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }

    /// Days the booking holds, clipped to `from..=to`
    ///
    /// A booking holds `start_date` up to but not including `end_date`, the
    /// same half-open range [`overlaps`](Self::overlaps) tests. The end date
    /// stays free for the next booking to start on.
    pub fn held_dates(&self, from: NaiveDate, to: NaiveDate) -> impl Iterator<Item = NaiveDate> {
        let first = self.start_date.max(from);
        let last = self.end_date.pred_opt().unwrap_or(NaiveDate::MIN).min(to);
        first.iter_days().take_while(move |date| *date <= last)
    }

    /// Returns true if the user is the renter or the owner
    #[must_use]
    pub fn involves(&self, user_id: UserId) -> bool {
        self.renter_id == user_id || self.owner_id == user_id
    }

    /// Enter `status`, recording it in the history
    ///
    /// Callers check the transition first; this only records it.
    pub(crate) fn record_status(
        &mut self,
        status: BookingStatus,
        message: String,
        timestamp: DateTime<Utc>,
    ) {
        self.status = status;
        self.status_history.push(StatusChange {
            status,
            timestamp,
            message,
        });
        self.updated_at = timestamp;
    }
}

// ============================================================================
// Items
// ============================================================================

/// Item pricing
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pricing {
    /// Price per day
    pub daily: Money,
}

/// When an item can be rented
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "mode", content = "dates")]
pub enum Availability {
    /// Any date
    #[default]
    Always,
    /// Only the listed dates
    Dates(BTreeSet<NaiveDate>),
}

impl Availability {
    /// Returns true if the item can be rented on `date`
    #[must_use]
    pub fn is_available(&self, date: NaiveDate) -> bool {
        match self {
            Self::Always => true,
            Self::Dates(dates) => dates.contains(&date),
        }
    }
}

/// A listed item, as seen by the booking component (read-only)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Item ID
    pub id: ItemId,
    /// Listing owner
    pub owner_id: UserId,
    /// Listing title
    pub title: String,
    /// Pricing
    pub pricing: Pricing,
    /// Rentable dates
    #[serde(default)]
    pub availability: Availability,
}

impl Item {
    /// Creates an item that is always available
    #[must_use]
    pub fn new(id: ItemId, owner_id: UserId, title: impl Into<String>, daily: Money) -> Self {
        Self {
            id,
            owner_id,
            title: title.into(),
            pricing: Pricing { daily },
            availability: Availability::Always,
        }
    }

    /// Restricts the item to the given dates
    #[must_use]
    pub fn with_available_dates(mut self, dates: impl IntoIterator<Item = NaiveDate>) -> Self {
        self.availability = Availability::Dates(dates.into_iter().collect());
        self
    }

    /// First date in the inclusive range the item is not available, if any
    ///
    /// Walks only the listed dates that fall inside the range.
    #[must_use]
    pub fn first_unavailable(&self, start_date: NaiveDate, end_date: NaiveDate) -> Option<NaiveDate> {
        let Availability::Dates(dates) = &self.availability else {
            return None;
        };
        if end_date < start_date {
            return None;
        }
        let mut expected = start_date;
        for date in dates.range(start_date..=end_date) {
            if *date != expected {
                return Some(expected);
            }
            // Only NaiveDate::MAX has no successor, and then the range is covered
            expected = date.succ_opt()?;
        }
        (expected <= end_date).then_some(expected)
    }
}

// ============================================================================
// Queries
// ============================================================================

/// Which side of a booking to look at
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// Bookings the user made
    Renter,
    /// Bookings on the user's items
    Owner,
    /// Both
    Both,
}

/// The role a booking matched under
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingRole {
    /// User is the renter
    Renter,
    /// User is the owner
    Owner,
}

impl UserRole {
    /// Role the booking matched under, `None` if it doesn't match
    #[must_use]
    pub fn matches(self, booking: &Booking, user_id: UserId) -> Option<BookingRole> {
        let as_renter = booking.renter_id() == user_id;
        let as_owner = booking.owner_id() == user_id;
        match self {
            Self::Renter if as_renter => Some(BookingRole::Renter),
            Self::Owner if as_owner => Some(BookingRole::Owner),
            Self::Both if as_renter => Some(BookingRole::Renter),
            Self::Both if as_owner => Some(BookingRole::Owner),
            _ => None,
        }
    }
}

/// A booking tagged with the role it was matched under
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserBooking {
    /// Matched role
    pub role: BookingRole,
    /// The booking
    pub booking: Booking,
}

/// Per-user booking figures
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingStats {
    /// Bookings the user takes part in
    pub total: usize,
    /// Bookings made as renter
    pub as_renter: usize,
    /// Bookings received as owner
    pub as_owner: usize,
    /// Count per status
    pub by_status: BTreeMap<BookingStatus, usize>,
    /// Completed rentals of the user's items
    pub earned: Money,
    /// Completed rentals paid by the user
    pub spent: Money,
}

impl BookingStats {
    /// Tallies the bookings a user takes part in
    #[must_use]
    pub fn tally<'a>(user_id: UserId, bookings: impl IntoIterator<Item = &'a Booking>) -> Self {
        let mut stats = Self::default();
        for booking in bookings.into_iter().filter(|b| b.involves(user_id)) {
            stats.total += 1;
            *stats.by_status.entry(booking.status()).or_default() += 1;
            let completed = booking.status() == BookingStatus::Completed;
            if booking.renter_id() == user_id {
                stats.as_renter += 1;
                if completed {
                    stats.spent = stats.spent + booking.total_price();
                }
            }
            if booking.owner_id() == user_id {
                stats.as_owner += 1;
                if completed {
                    stats.earned = stats.earned + booking.total_price();
                }
            }
        }
        stats
    }

    /// Count for one status
    #[must_use]
    pub fn count(&self, status: BookingStatus) -> usize {
        self.by_status.get(&status).copied().unwrap_or(0)
    }
}

// ============================================================================
// Actions
// ============================================================================

/// Actions for the booking reducer
#[derive(Clone, Debug, PartialEq)]
pub enum BookingAction {
    // Commands
    /// Request a new booking
    CreateBooking {
        /// ID for the new booking
        booking_id: BookingId,
        /// Booking input
        request: BookingRequest,
        /// Item looked up from the catalog, `None` if unknown
        item: Option<Item>,
    },

    /// Move a booking to another status
    UpdateStatus {
        /// Booking to update
        booking_id: BookingId,
        /// Target status
        status: BookingStatus,
        /// History note, defaults per status
        message: Option<String>,
    },

    /// Apply date-driven transitions for today
    ReconcileByDate,

    // Events
    /// A booking was created
    BookingCreated {
        /// The new booking
        booking: Booking,
    },

    /// A booking entered a new status
    StatusChanged {
        /// Booking ID
        booking_id: BookingId,
        /// Status entered
        status: BookingStatus,
        /// History note
        message: String,
        /// When
        at: DateTime<Utc>,
    },

    /// A command was refused
    ValidationFailed {
        /// Why
        error: RuleViolation,
    },
}

// ============================================================================
// State
// ============================================================================

/// Booking collection state
///
/// Built from the storage port for each operation. `changed` lists bookings
/// modified since the last [`take_changed`](Self::take_changed), in the order
/// they were first modified.
#[derive(Clone, Debug, Default)]
pub struct BookingState {
    /// All bookings indexed by ID
    pub bookings: HashMap<BookingId, Booking>,
    /// Bookings modified and not yet persisted
    pub changed: Vec<BookingId>,
    /// Last refused command (if any)
    pub last_error: Option<RuleViolation>,
}

impl BookingState {
    /// Creates an empty state
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a state holding `bookings`, with nothing marked changed
    #[must_use]
    pub fn from_bookings(bookings: impl IntoIterator<Item = Booking>) -> Self {
        Self {
            bookings: bookings.into_iter().map(|b| (b.id(), b)).collect(),
            changed: Vec::new(),
            last_error: None,
        }
    }

    /// Number of bookings
    #[must_use]
    pub fn count(&self) -> usize {
        self.bookings.len()
    }

    /// Returns a booking by ID
    #[must_use]
    pub fn get(&self, id: &BookingId) -> Option<&Booking> {
        self.bookings.get(id)
    }

    /// Returns true if a booking with this ID exists
    #[must_use]
    pub fn exists(&self, id: &BookingId) -> bool {
        self.bookings.contains_key(id)
    }

    /// Returns true if an active booking on `item_id` overlaps the range
    #[must_use]
    pub fn has_conflict(&self, item_id: ItemId, start_date: NaiveDate, end_date: NaiveDate) -> bool {
        self.bookings.values().any(|b| {
            b.item_id() == item_id && b.blocks_dates() && b.overlaps(start_date, end_date)
        })
    }

    /// Bookings matching `filter`, newest first
    pub fn newest_first<F>(&self, filter: F) -> Vec<&Booking>
    where
        F: Fn(&Booking) -> bool,
    {
        let mut matches: Vec<&Booking> = self.bookings.values().filter(|b| filter(*b)).collect();
        matches.sort_by(|a, b| {
            b.created_at()
                .cmp(&a.created_at())
                .then_with(|| a.id().cmp(&b.id()))
        });
        matches
    }

    /// Days held by active bookings on `item_id`, within `from..=to`
    ///
    /// A requested range conflicts exactly when one of its days from
    /// `start_date` up to but not including `end_date` is in this set.
    #[must_use]
    pub fn booked_dates(
        &self,
        item_id: ItemId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> BTreeSet<NaiveDate> {
        self.bookings
            .values()
            .filter(|b| b.item_id() == item_id && b.blocks_dates())
            .flat_map(|b| b.held_dates(from, to))
            .collect()
    }

    /// Marks a booking as needing persistence
    pub fn mark_changed(&mut self, id: BookingId) {
        if !self.changed.contains(&id) {
            self.changed.push(id);
        }
    }

    /// Drains the list of changed bookings
    pub fn take_changed(&mut self) -> Vec<BookingId> {
        std::mem::take(&mut self.changed)
    }
}
