//! Booking lifecycle manager.
//!
//! The manager is the entry point for callers. Each operation loads the
//! current bookings through the storage port, runs the reducer, writes the
//! changed bookings back and only then executes the side effects.
//!
//! # Consistency
//!
//! Operations run to completion on the calling thread. The conflict check and
//! the write are not one atomic step, so two managers sharing a store can still
//! race each other into overlapping bookings.

use crate::error::{BookingError, RuleViolation};
use crate::reducer::{BookingEnvironment, BookingReducer};
use crate::storage::{BookingRepository, RecordStore};
use crate::types::{
    Booking, BookingAction, BookingId, BookingRequest, BookingState, BookingStats, BookingStatus,
    ItemId, Money, UserBooking, UserId, UserRole,
};
use chrono::NaiveDate;
use kinship_core::effect::Effect;
use kinship_core::reducer::Reducer;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Validates, stores and announces booking changes
#[derive(Clone)]
pub struct BookingManager {
    reducer: BookingReducer,
    env: BookingEnvironment,
    repository: BookingRepository,
}

impl BookingManager {
    /// Creates a manager over a record store
    #[must_use]
    pub fn new(env: BookingEnvironment, store: Arc<dyn RecordStore>) -> Self {
        Self {
            reducer: BookingReducer::new(),
            env,
            repository: BookingRepository::new(store),
        }
    }

    // ========== Commands ==========

    /// Requests a booking
    ///
    /// The new booking starts out `pending` and the owner is notified.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::Rejected`] if the request breaks a booking
    /// rule, or [`BookingError::Storage`] if the item lookup or the write fails.
    #[tracing::instrument(
        skip(self, request),
        fields(item_id = %request.item_id, start_date = %request.start_date, end_date = %request.end_date)
    )]
    pub fn create_booking(&self, request: BookingRequest) -> Result<Booking, BookingError> {
        let item = self.env.catalog.item(request.item_id)?;
        let booking_id = BookingId::new();
        let state = self.dispatch(BookingAction::CreateBooking {
            booking_id,
            request,
            item,
        })?;
        Self::found(&state, booking_id)
    }

    /// Moves a booking to `status`
    ///
    /// `message` is recorded in the history; each status has a default.
    ///
    /// # Errors
    ///
    /// Returns [`RuleViolation::NotFound`] or
    /// [`RuleViolation::InvalidTransition`] wrapped in
    /// [`BookingError::Rejected`], or [`BookingError::Storage`] if the write fails.
    #[tracing::instrument(skip(self, message))]
    pub fn update_booking_status(
        &self,
        booking_id: BookingId,
        status: BookingStatus,
        message: Option<String>,
    ) -> Result<Booking, BookingError> {
        let state = self.dispatch(BookingAction::UpdateStatus {
            booking_id,
            status,
            message,
        })?;
        Self::found(&state, booking_id)
    }

    /// Owner accepts a pending booking
    ///
    /// # Errors
    ///
    /// See [`update_booking_status`](Self::update_booking_status).
    pub fn confirm_booking(&self, booking_id: BookingId) -> Result<Booking, BookingError> {
        self.update_booking_status(booking_id, BookingStatus::Confirmed, None)
    }

    /// Owner declines a pending booking
    ///
    /// # Errors
    ///
    /// See [`update_booking_status`](Self::update_booking_status).
    pub fn reject_booking(
        &self,
        booking_id: BookingId,
        reason: Option<String>,
    ) -> Result<Booking, BookingError> {
        self.update_booking_status(booking_id, BookingStatus::Rejected, reason)
    }

    /// Either party withdraws a booking
    ///
    /// # Errors
    ///
    /// See [`update_booking_status`](Self::update_booking_status).
    pub fn cancel_booking(
        &self,
        booking_id: BookingId,
        reason: Option<String>,
    ) -> Result<Booking, BookingError> {
        self.update_booking_status(booking_id, BookingStatus::Cancelled, reason)
    }

    /// Marks a confirmed booking as in progress
    ///
    /// # Errors
    ///
    /// See [`update_booking_status`](Self::update_booking_status).
    pub fn start_rental(&self, booking_id: BookingId) -> Result<Booking, BookingError> {
        self.update_booking_status(booking_id, BookingStatus::Active, None)
    }

    /// Marks an active rental as finished
    ///
    /// # Errors
    ///
    /// See [`update_booking_status`](Self::update_booking_status).
    pub fn complete_rental(&self, booking_id: BookingId) -> Result<Booking, BookingError> {
        self.update_booking_status(booking_id, BookingStatus::Completed, None)
    }

    /// Applies date-driven transitions for today
    ///
    /// Confirmed bookings whose window contains today become active; active
    /// bookings that ended before today become completed. Each booking moves
    /// at most once per call. Returns the bookings that changed.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::Storage`] on the first failed write. Bookings
    /// written before it stay written.
    #[tracing::instrument(skip(self))]
    pub fn update_booking_statuses_by_date(&self) -> Result<Vec<Booking>, BookingError> {
        let mut state = self.load()?;
        let changed = self.commit(&mut state, BookingAction::ReconcileByDate)?;
        tracing::info!(count = changed.len(), "Reconciled bookings by date");
        changed
            .iter()
            .map(|id| Self::found(&state, *id))
            .collect()
    }

    // ========== Queries ==========

    /// Returns true if an active booking on the item overlaps the range
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::Storage`] if bookings can't be loaded.
    pub fn has_conflicting_bookings(
        &self,
        item_id: ItemId,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<bool, BookingError> {
        Ok(self.load()?.has_conflict(item_id, start_date, end_date))
    }

    /// Bookings a user takes part in, newest first, tagged with the role matched
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::Storage`] if bookings can't be loaded.
    pub fn get_user_bookings(
        &self,
        user_id: UserId,
        role: UserRole,
    ) -> Result<Vec<UserBooking>, BookingError> {
        let state = self.load()?;
        Ok(state
            .newest_first(|b| role.matches(b, user_id).is_some())
            .into_iter()
            .filter_map(|booking| {
                role.matches(booking, user_id).map(|role| UserBooking {
                    role,
                    booking: booking.clone(),
                })
            })
            .collect())
    }

    /// Looks up one booking
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::Storage`] if bookings can't be loaded.
    pub fn get_booking(&self, booking_id: BookingId) -> Result<Option<Booking>, BookingError> {
        Ok(self.load()?.get(&booking_id).cloned())
    }

    /// Bookings on an item, newest first
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::Storage`] if bookings can't be loaded.
    pub fn item_bookings(&self, item_id: ItemId) -> Result<Vec<Booking>, BookingError> {
        let state = self.load()?;
        Ok(state
            .newest_first(|b| b.item_id() == item_id)
            .into_iter()
            .cloned()
            .collect())
    }

    /// Bookings in one status, newest first
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::Storage`] if bookings can't be loaded.
    pub fn bookings_with_status(&self, status: BookingStatus) -> Result<Vec<Booking>, BookingError> {
        let state = self.load()?;
        Ok(state
            .newest_first(|b| b.status() == status)
            .into_iter()
            .cloned()
            .collect())
    }

    /// Days held by active bookings on an item, within `from..=to`
    ///
    /// A booking holds its start date up to but not including its end date,
    /// so the result greys out exactly the days a new request can't include
    /// before its own end date. An empty window yields an empty set.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::Storage`] if bookings can't be loaded.
    pub fn booked_dates(
        &self,
        item_id: ItemId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<BTreeSet<NaiveDate>, BookingError> {
        Ok(self.load()?.booked_dates(item_id, from, to))
    }

    /// Price of renting an item over a range
    ///
    /// Daily rate times the number of days between the dates.
    ///
    /// # Errors
    ///
    /// Returns [`RuleViolation::InvalidDateRange`] if `end_date` isn't after
    /// `start_date`, [`RuleViolation::ItemNotFound`] for an unknown item,
    /// [`RuleViolation::PriceOverflow`] if the total doesn't fit, or
    /// [`BookingError::Storage`] if the lookup fails.
    pub fn quote_price(
        &self,
        item_id: ItemId,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Money, BookingError> {
        if end_date <= start_date {
            return Err(RuleViolation::InvalidDateRange {
                start_date,
                end_date,
            }
            .into());
        }
        let item = self
            .env
            .catalog
            .item(item_id)?
            .ok_or(RuleViolation::ItemNotFound(item_id))?;
        let days = end_date.signed_duration_since(start_date).num_days().unsigned_abs();
        item.pricing
            .daily
            .checked_times(days)
            .ok_or_else(|| RuleViolation::PriceOverflow { item_id, days }.into())
    }

    /// Booking figures for a user across both roles
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::Storage`] if bookings can't be loaded.
    pub fn booking_stats(&self, user_id: UserId) -> Result<BookingStats, BookingError> {
        let state = self.load()?;
        Ok(BookingStats::tally(user_id, state.bookings.values()))
    }

    // ========== Internals ==========

    fn load(&self) -> Result<BookingState, BookingError> {
        let bookings = self.repository.load_all().inspect_err(|error| {
            tracing::error!(%error, "Failed to load bookings");
        })?;
        Ok(BookingState::from_bookings(bookings))
    }

    fn dispatch(&self, action: BookingAction) -> Result<BookingState, BookingError> {
        let mut state = self.load()?;
        self.commit(&mut state, action)?;
        Ok(state)
    }

    /// Reduces `action`, then stores each changed booking and runs its effect
    ///
    /// Stops at the first failed write; later bookings are neither stored nor
    /// announced.
    fn commit(
        &self,
        state: &mut BookingState,
        action: BookingAction,
    ) -> Result<Vec<BookingId>, BookingError> {
        let effects = self.reducer.reduce(state, action, &self.env);
        if let Some(error) = state.last_error.take() {
            return Err(error.into());
        }

        let changed = state.take_changed();
        let mut effects = effects.into_iter();
        for booking_id in &changed {
            let effect = effects.next().unwrap_or(Effect::None);
            if let Some(booking) = state.get(booking_id) {
                self.repository.save(booking).inspect_err(|error| {
                    tracing::error!(%booking_id, %error, "Failed to persist booking");
                })?;
            }
            tracing::trace!(%booking_id, tasks = effect.task_count(), "Executing effects");
            effect.execute(&mut |feedback| {
                tracing::debug!(?feedback, "Effect produced an action; ignored");
            });
        }
        Ok(changed)
    }

    fn found(state: &BookingState, booking_id: BookingId) -> Result<Booking, BookingError> {
        state
            .get(&booking_id)
            .cloned()
            .ok_or_else(|| RuleViolation::NotFound(booking_id).into())
    }
}
