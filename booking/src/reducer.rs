//! Booking reducer implementing the lifecycle rules.
//!
//! The reducer validates commands against the current collection, applies the
//! resulting events to state and returns the side effects (notifications,
//! released dates) for the caller to run once the changes are stored.
//!
//! # Effects
//!
//! A successful command yields exactly one effect per changed booking, in the
//! order the bookings appear in [`BookingState::changed`]. This lets the caller
//! persist a booking and run its effect before moving on to the next one.

use crate::catalog::ItemCatalog;
use crate::error::RuleViolation;
use crate::notification::{Notifier, deliveries_for};
use crate::types::{
    Booking, BookingAction, BookingId, BookingRequest, BookingState, BookingStatus, Item,
};
use chrono::NaiveDate;
use kinship_core::effect::Effect;
use kinship_core::environment::Clock;
use kinship_core::reducer::Reducer;
use kinship_core::{SmallVec, smallvec};
use std::sync::Arc;

/// Message recorded when reconciliation starts a rental
pub const AUTO_START_MESSAGE: &str = "Rental started automatically";

/// Message recorded when reconciliation completes a rental
pub const AUTO_COMPLETE_MESSAGE: &str = "Rental completed automatically";

/// Environment for the booking reducer
#[derive(Clone)]
pub struct BookingEnvironment {
    /// Source of "today" and timestamps
    pub clock: Arc<dyn Clock>,
    /// Receives status notifications
    pub notifier: Arc<dyn Notifier>,
    /// Item lookups and released dates
    pub catalog: Arc<dyn ItemCatalog>,
}

impl BookingEnvironment {
    /// Creates a new booking environment
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
        catalog: Arc<dyn ItemCatalog>,
    ) -> Self {
        Self {
            clock,
            notifier,
            catalog,
        }
    }
}

/// Reducer for the booking collection
#[derive(Clone, Copy, Debug, Default)]
pub struct BookingReducer;

impl BookingReducer {
    /// Creates a new booking reducer
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Applies an event to state
    ///
    /// Deterministic; commands are ignored. A status change that the table
    /// doesn't allow is dropped.
    pub fn apply_event(state: &mut BookingState, action: &BookingAction) {
        match action {
            BookingAction::BookingCreated { booking } => {
                state.bookings.insert(booking.id(), booking.clone());
                state.mark_changed(booking.id());
            },
            BookingAction::StatusChanged {
                booking_id,
                status,
                message,
                at,
            } => {
                let Some(booking) = state.bookings.get_mut(booking_id) else {
                    tracing::warn!(%booking_id, "Status change for unknown booking ignored");
                    return;
                };
                if !booking.status().can_transition_to(*status) {
                    tracing::warn!(
                        %booking_id,
                        from = %booking.status(),
                        to = %status,
                        "Illegal status change ignored"
                    );
                    return;
                }
                booking.record_status(*status, message.clone(), *at);
                state.mark_changed(*booking_id);
            },
            BookingAction::ValidationFailed { error } => {
                state.last_error = Some(error.clone());
            },
            BookingAction::CreateBooking { .. }
            | BookingAction::UpdateStatus { .. }
            | BookingAction::ReconcileByDate => {},
        }
    }

    /// Validates a `CreateBooking` command, checks run in a fixed order
    fn validate_create(
        state: &BookingState,
        booking_id: &BookingId,
        request: &BookingRequest,
        item: Option<&Item>,
        today: NaiveDate,
    ) -> Result<(), RuleViolation> {
        if state.exists(booking_id) {
            return Err(RuleViolation::AlreadyExists(*booking_id));
        }

        if request.total_price.is_zero() {
            return Err(RuleViolation::MissingPrice);
        }

        if request.start_date < today {
            return Err(RuleViolation::StartDateInPast {
                start_date: request.start_date,
                today,
            });
        }

        if request.end_date <= request.start_date {
            return Err(RuleViolation::InvalidDateRange {
                start_date: request.start_date,
                end_date: request.end_date,
            });
        }

        if request.renter_id == request.owner_id {
            return Err(RuleViolation::SelfBooking);
        }

        let Some(item) = item else {
            return Err(RuleViolation::ItemNotFound(request.item_id));
        };

        // With the owner pinned to the catalog, the self-booking check above
        // covers the real owner too
        if request.owner_id != item.owner_id {
            return Err(RuleViolation::OwnerMismatch {
                item_id: item.id,
                owner_id: request.owner_id,
            });
        }

        if let Some(date) = item.first_unavailable(request.start_date, request.end_date) {
            return Err(RuleViolation::ItemUnavailable {
                item_id: request.item_id,
                date,
            });
        }

        if state.has_conflict(request.item_id, request.start_date, request.end_date) {
            return Err(RuleViolation::DateConflict {
                item_id: request.item_id,
                start_date: request.start_date,
                end_date: request.end_date,
            });
        }

        Ok(())
    }

    /// Validates an `UpdateStatus` command
    fn validate_transition(
        state: &BookingState,
        booking_id: &BookingId,
        status: BookingStatus,
    ) -> Result<(), RuleViolation> {
        let booking = state
            .get(booking_id)
            .ok_or(RuleViolation::NotFound(*booking_id))?;

        if !booking.status().can_transition_to(status) {
            return Err(RuleViolation::InvalidTransition {
                booking_id: *booking_id,
                from: booking.status(),
                to: status,
            });
        }

        Ok(())
    }

    /// Status a booking moves to during reconciliation, if any
    fn scheduled_status(booking: &Booking, today: NaiveDate) -> Option<BookingStatus> {
        match booking.status() {
            BookingStatus::Confirmed if booking.covers(today) => Some(BookingStatus::Active),
            BookingStatus::Active if booking.end_date() < today => Some(BookingStatus::Completed),
            _ => None,
        }
    }

    /// Records a refused command and returns no effects
    fn reject(
        state: &mut BookingState,
        error: RuleViolation,
    ) -> SmallVec<[Effect<BookingAction>; 4]> {
        tracing::warn!(kind = ?error.kind(), "Booking command rejected: {error}");
        Self::apply_event(state, &BookingAction::ValidationFailed { error });
        smallvec![Effect::None]
    }

    /// Side effects for a booking that just entered its current status
    ///
    /// Notifications first, then released dates when the status frees them.
    fn status_effects(booking: &Booking, env: &BookingEnvironment) -> Effect<BookingAction> {
        let mut effects: Vec<Effect<BookingAction>> = deliveries_for(booking)
            .into_iter()
            .map(|delivery| {
                let notifier = Arc::clone(&env.notifier);
                Effect::run(move || notifier.notify(delivery.user_id, delivery.notification))
            })
            .collect();

        if booking.status().releases_dates() {
            let catalog = Arc::clone(&env.catalog);
            let (item_id, start_date, end_date) =
                (booking.item_id(), booking.start_date(), booking.end_date());
            effects.push(Effect::run(move || {
                catalog.release_dates(item_id, start_date, end_date);
            }));
        }

        Effect::chain(effects)
    }

    /// Applies a status change and returns its effect
    fn change_status(
        state: &mut BookingState,
        booking_id: BookingId,
        status: BookingStatus,
        message: String,
        env: &BookingEnvironment,
    ) -> Effect<BookingAction> {
        let event = BookingAction::StatusChanged {
            booking_id,
            status,
            message,
            at: env.clock.now(),
        };
        Self::apply_event(state, &event);
        state
            .get(&booking_id)
            .map_or(Effect::None, |booking| Self::status_effects(booking, env))
    }
}

impl Reducer for BookingReducer {
    type State = BookingState;
    type Action = BookingAction;
    type Environment = BookingEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            // ========== Commands ==========
            BookingAction::CreateBooking {
                booking_id,
                request,
                item,
            } => {
                let today = env.clock.today();
                if let Err(error) =
                    Self::validate_create(state, &booking_id, &request, item.as_ref(), today)
                {
                    return Self::reject(state, error);
                }

                let booking = Booking::new(booking_id, request, env.clock.now());
                let effect = Self::status_effects(&booking, env);
                Self::apply_event(state, &BookingAction::BookingCreated { booking });
                tracing::debug!(%booking_id, "Booking created");
                smallvec![effect]
            },

            BookingAction::UpdateStatus {
                booking_id,
                status,
                message,
            } => {
                if let Err(error) = Self::validate_transition(state, &booking_id, status) {
                    return Self::reject(state, error);
                }

                let message = message.unwrap_or_else(|| status.default_message().to_string());
                let effect = Self::change_status(state, booking_id, status, message, env);
                tracing::debug!(%booking_id, %status, "Booking status changed");
                smallvec![effect]
            },

            BookingAction::ReconcileByDate => {
                let today = env.clock.today();
                let mut due: Vec<(BookingId, BookingStatus)> = state
                    .bookings
                    .values()
                    .filter_map(|b| Self::scheduled_status(b, today).map(|s| (b.id(), s)))
                    .collect();
                due.sort_unstable();

                due.into_iter()
                    .map(|(booking_id, status)| {
                        let message = match status {
                            BookingStatus::Active => AUTO_START_MESSAGE,
                            _ => AUTO_COMPLETE_MESSAGE,
                        };
                        tracing::debug!(%booking_id, %status, %today, "Booking reconciled");
                        Self::change_status(state, booking_id, status, message.to_string(), env)
                    })
                    .collect()
            },

            // ========== Events ==========
            BookingAction::BookingCreated { .. }
            | BookingAction::StatusChanged { .. }
            | BookingAction::ValidationFailed { .. } => {
                Self::apply_event(state, &action);
                smallvec![Effect::None]
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can unwrap
mod tests {
    use super::*;
    use crate::catalog::InMemoryItemCatalog;
    use crate::notification::RecordingNotifier;
    use crate::types::{ItemId, Money, UserId};
    use chrono::{TimeZone, Utc};
    use kinship_testing::{ManualClock, ReducerTest, assertions, date};

    fn env_on(day: &str) -> BookingEnvironment {
        BookingEnvironment::new(
            Arc::new(ManualClock::at_date(date(day))),
            Arc::new(RecordingNotifier::new()),
            Arc::new(InMemoryItemCatalog::new()),
        )
    }

    fn drill() -> Item {
        Item::new(ItemId::new(), UserId::new(), "Drill", Money::from_dollars(10))
    }

    fn request_for(item: &Item, start: &str, end: &str) -> BookingRequest {
        BookingRequest {
            item_id: item.id,
            renter_id: UserId::new(),
            owner_id: item.owner_id,
            start_date: date(start),
            end_date: date(end),
            total_price: Money::from_dollars(40),
        }
    }

    fn create(item: &Item, start: &str, end: &str) -> BookingAction {
        BookingAction::CreateBooking {
            booking_id: BookingId::new(),
            request: request_for(item, start, end),
            item: Some(item.clone()),
        }
    }

    fn booking_in(item: &Item, start: &str, end: &str, status: BookingStatus) -> Booking {
        let created = Utc.with_ymd_and_hms(2025, 5, 1, 9, 0, 0).unwrap();
        let mut booking = Booking::new(BookingId::new(), request_for(item, start, end), created);
        let path: &[BookingStatus] = match status {
            BookingStatus::Pending => &[],
            BookingStatus::Confirmed => &[BookingStatus::Confirmed],
            BookingStatus::Active => &[BookingStatus::Confirmed, BookingStatus::Active],
            BookingStatus::Completed => &[
                BookingStatus::Confirmed,
                BookingStatus::Active,
                BookingStatus::Completed,
            ],
            BookingStatus::Cancelled => &[BookingStatus::Cancelled],
            BookingStatus::Rejected => &[BookingStatus::Rejected],
        };
        for next in path {
            booking.record_status(*next, next.default_message().to_string(), created);
        }
        booking
    }

    #[test]
    fn create_on_empty_item_is_pending_and_notifies_owner() {
        let item = drill();
        ReducerTest::new(BookingReducer::new())
            .with_env(env_on("2025-05-20"))
            .given_state(BookingState::new())
            .when_action(create(&item, "2025-06-01", "2025-06-05"))
            .then_state(|state| {
                assert_eq!(state.count(), 1);
                assert_eq!(state.changed.len(), 1);
                let booking = state.get(&state.changed[0]).unwrap();
                assert_eq!(booking.status(), BookingStatus::Pending);
                assert_eq!(booking.status_history().len(), 1);
                assert!(state.last_error.is_none());
            })
            .then_effects(|effects| {
                assertions::assert_effects_count(effects, 1);
                assertions::assert_task_count(effects, 1);
            })
            .run();
    }

    #[test]
    fn create_checks_run_in_order() {
        let state = BookingState::new();
        let today = date("2025-05-20");
        let item = drill();

        let mut request = request_for(&item, "2025-05-01", "2025-04-01");
        request.total_price = Money::ZERO;
        let id = BookingId::new();
        assert_eq!(
            BookingReducer::validate_create(&state, &id, &request, Some(&item), today),
            Err(RuleViolation::MissingPrice)
        );

        request.total_price = Money::from_dollars(1);
        assert!(matches!(
            BookingReducer::validate_create(&state, &id, &request, Some(&item), today),
            Err(RuleViolation::StartDateInPast { .. })
        ));

        request.start_date = date("2025-06-01");
        assert!(matches!(
            BookingReducer::validate_create(&state, &id, &request, Some(&item), today),
            Err(RuleViolation::InvalidDateRange { .. })
        ));

        request.end_date = date("2025-06-01");
        assert!(matches!(
            BookingReducer::validate_create(&state, &id, &request, Some(&item), today),
            Err(RuleViolation::InvalidDateRange { .. })
        ));

        request.end_date = date("2025-06-03");
        request.renter_id = request.owner_id;
        assert_eq!(
            BookingReducer::validate_create(&state, &id, &request, Some(&item), today),
            Err(RuleViolation::SelfBooking)
        );

        request.renter_id = UserId::new();
        assert_eq!(
            BookingReducer::validate_create(&state, &id, &request, None, today),
            Err(RuleViolation::ItemNotFound(item.id))
        );

        let stranger = UserId::new();
        request.owner_id = stranger;
        assert_eq!(
            BookingReducer::validate_create(&state, &id, &request, Some(&item), today),
            Err(RuleViolation::OwnerMismatch {
                item_id: item.id,
                owner_id: stranger,
            })
        );

        request.owner_id = item.owner_id;

        assert!(BookingReducer::validate_create(&state, &id, &request, Some(&item), today).is_ok());
    }

    #[test]
    fn owner_renting_their_own_item_under_another_owner_id_is_refused() {
        let item = drill();
        let mut request = request_for(&item, "2025-06-01", "2025-06-05");
        request.renter_id = item.owner_id;
        request.owner_id = UserId::new();
        let misnamed_owner = request.owner_id;
        let action = BookingAction::CreateBooking {
            booking_id: BookingId::new(),
            request,
            item: Some(item.clone()),
        };
        ReducerTest::new(BookingReducer::new())
            .with_env(env_on("2025-05-20"))
            .given_state(BookingState::new())
            .when_action(action)
            .then_state(move |state| {
                assert_eq!(
                    state.last_error,
                    Some(RuleViolation::OwnerMismatch {
                        item_id: item.id,
                        owner_id: misnamed_owner,
                    })
                );
                assert_eq!(state.count(), 0);
                assert!(state.changed.is_empty());
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn start_today_is_accepted() {
        let item = drill();
        ReducerTest::new(BookingReducer::new())
            .with_env(env_on("2025-06-01"))
            .given_state(BookingState::new())
            .when_action(create(&item, "2025-06-01", "2025-06-02"))
            .then_state(|state| {
                assert!(state.last_error.is_none());
                assert_eq!(state.count(), 1);
            })
            .run();
    }

    #[test]
    fn explicit_availability_must_cover_every_day() {
        let item = drill().with_available_dates([
            date("2025-06-01"),
            date("2025-06-02"),
            date("2025-06-04"),
        ]);
        ReducerTest::new(BookingReducer::new())
            .with_env(env_on("2025-05-20"))
            .given_state(BookingState::new())
            .when_action(create(&item, "2025-06-01", "2025-06-04"))
            .then_state(move |state| {
                assert_eq!(
                    state.last_error,
                    Some(RuleViolation::ItemUnavailable {
                        item_id: item.id,
                        date: date("2025-06-03"),
                    })
                );
                assert_eq!(state.count(), 0);
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn overlapping_request_conflicts_until_cancelled() {
        let item = drill();
        let held = booking_in(&item, "2025-06-01", "2025-06-05", BookingStatus::Confirmed);
        let cancelled = booking_in(&item, "2025-06-01", "2025-06-05", BookingStatus::Cancelled);

        ReducerTest::new(BookingReducer::new())
            .with_env(env_on("2025-05-20"))
            .given_state(BookingState::from_bookings([held]))
            .when_action(create(&item, "2025-06-03", "2025-06-04"))
            .then_state(|state| {
                assert!(matches!(
                    state.last_error,
                    Some(RuleViolation::DateConflict { .. })
                ));
                assert_eq!(state.count(), 1);
                assert!(state.changed.is_empty());
            })
            .then_effects(assertions::assert_no_effects)
            .run();

        ReducerTest::new(BookingReducer::new())
            .with_env(env_on("2025-05-20"))
            .given_state(BookingState::from_bookings([cancelled]))
            .when_action(create(&item, "2025-06-03", "2025-06-04"))
            .then_state(|state| {
                assert!(state.last_error.is_none());
                assert_eq!(state.count(), 2);
            })
            .run();
    }

    #[test]
    fn back_to_back_bookings_do_not_conflict() {
        let item = drill();
        let held = booking_in(&item, "2025-06-01", "2025-06-05", BookingStatus::Pending);
        ReducerTest::new(BookingReducer::new())
            .with_env(env_on("2025-05-20"))
            .given_state(BookingState::from_bookings([held]))
            .when_action(create(&item, "2025-06-05", "2025-06-08"))
            .then_state(|state| {
                assert!(state.last_error.is_none());
                assert_eq!(state.count(), 2);
            })
            .run();
    }

    #[test]
    fn confirm_uses_default_message_and_notifies_renter() {
        let item = drill();
        let booking = booking_in(&item, "2025-06-01", "2025-06-05", BookingStatus::Pending);
        let id = booking.id();
        ReducerTest::new(BookingReducer::new())
            .with_env(env_on("2025-05-20"))
            .given_state(BookingState::from_bookings([booking]))
            .when_action(BookingAction::UpdateStatus {
                booking_id: id,
                status: BookingStatus::Confirmed,
                message: None,
            })
            .then_state(move |state| {
                let booking = state.get(&id).unwrap();
                assert_eq!(booking.status(), BookingStatus::Confirmed);
                let last = booking.status_history().last().unwrap();
                assert_eq!(last.message, "Booking confirmed by owner");
                assert_eq!(state.changed, vec![id]);
            })
            .then_effects(|effects| assertions::assert_task_count(effects, 1))
            .run();
    }

    #[test]
    fn cancel_notifies_both_parties_and_releases_dates() {
        let item = drill();
        let booking = booking_in(&item, "2025-06-01", "2025-06-05", BookingStatus::Confirmed);
        let id = booking.id();
        ReducerTest::new(BookingReducer::new())
            .with_env(env_on("2025-05-20"))
            .given_state(BookingState::from_bookings([booking]))
            .when_action(BookingAction::UpdateStatus {
                booking_id: id,
                status: BookingStatus::Cancelled,
                message: Some("Plans changed".to_string()),
            })
            .then_effects(|effects| {
                assertions::assert_effects_count(effects, 1);
                assertions::assert_task_count(effects, 3);
            })
            .run();
    }

    #[test]
    fn invalid_transition_leaves_booking_untouched() {
        let item = drill();
        let booking = booking_in(&item, "2025-06-01", "2025-06-05", BookingStatus::Confirmed);
        let id = booking.id();
        let before = booking.clone();
        ReducerTest::new(BookingReducer::new())
            .with_env(env_on("2025-05-20"))
            .given_state(BookingState::from_bookings([booking]))
            .when_action(BookingAction::UpdateStatus {
                booking_id: id,
                status: BookingStatus::Rejected,
                message: None,
            })
            .then_state(move |state| {
                assert_eq!(state.get(&id), Some(&before));
                assert_eq!(
                    state.last_error,
                    Some(RuleViolation::InvalidTransition {
                        booking_id: id,
                        from: BookingStatus::Confirmed,
                        to: BookingStatus::Rejected,
                    })
                );
                assert!(state.changed.is_empty());
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn unknown_booking_is_not_found() {
        let id = BookingId::new();
        ReducerTest::new(BookingReducer::new())
            .with_env(env_on("2025-05-20"))
            .given_state(BookingState::new())
            .when_action(BookingAction::UpdateStatus {
                booking_id: id,
                status: BookingStatus::Confirmed,
                message: None,
            })
            .then_state(move |state| {
                assert_eq!(state.last_error, Some(RuleViolation::NotFound(id)));
            })
            .run();
    }

    #[test]
    fn reconcile_starts_and_completes_without_chaining() {
        let item = drill();
        let other = drill();
        let starting = booking_in(&item, "2025-06-01", "2025-06-05", BookingStatus::Confirmed);
        let ending = booking_in(&other, "2025-05-25", "2025-06-01", BookingStatus::Active);
        let untouched = booking_in(&other, "2025-06-10", "2025-06-12", BookingStatus::Confirmed);
        let (start_id, end_id, quiet_id) = (starting.id(), ending.id(), untouched.id());

        ReducerTest::new(BookingReducer::new())
            .with_env(env_on("2025-06-03"))
            .given_state(BookingState::from_bookings([starting, ending, untouched]))
            .when_action(BookingAction::ReconcileByDate)
            .then_state(move |state| {
                let started = state.get(&start_id).unwrap();
                assert_eq!(started.status(), BookingStatus::Active);
                assert_eq!(
                    started.status_history().last().unwrap().message,
                    AUTO_START_MESSAGE
                );
                assert_eq!(state.get(&end_id).unwrap().status(), BookingStatus::Completed);
                assert_eq!(
                    state.get(&quiet_id).unwrap().status(),
                    BookingStatus::Confirmed
                );
                assert_eq!(state.changed.len(), 2);
            })
            .then_effects(|effects| assertions::assert_effects_count(effects, 2))
            .run();
    }

    #[test]
    fn reconcile_does_not_complete_a_rental_it_just_started() {
        let item = drill();
        let past = booking_in(&item, "2025-06-01", "2025-06-05", BookingStatus::Confirmed);
        let id = past.id();
        ReducerTest::new(BookingReducer::new())
            .with_env(env_on("2025-06-05"))
            .given_state(BookingState::from_bookings([past]))
            .when_action(BookingAction::ReconcileByDate)
            .then_state(move |state| {
                assert_eq!(state.get(&id).unwrap().status(), BookingStatus::Active);
            })
            .run();
    }

    #[test]
    fn replayed_events_rebuild_state_without_effects() {
        let item = drill();
        let booking = booking_in(&item, "2025-06-01", "2025-06-05", BookingStatus::Pending);
        let id = booking.id();
        let at = Utc.with_ymd_and_hms(2025, 5, 2, 9, 0, 0).unwrap();
        ReducerTest::new(BookingReducer::new())
            .with_env(env_on("2025-05-20"))
            .given_state(BookingState::new())
            .when_action(BookingAction::BookingCreated { booking })
            .when_action(BookingAction::StatusChanged {
                booking_id: id,
                status: BookingStatus::Completed,
                message: "skipped ahead".to_string(),
                at,
            })
            .when_action(BookingAction::StatusChanged {
                booking_id: id,
                status: BookingStatus::Confirmed,
                message: "ok".to_string(),
                at,
            })
            .then_state(move |state| {
                let booking = state.get(&id).unwrap();
                assert_eq!(booking.status(), BookingStatus::Confirmed);
                assert_eq!(booking.status_history().len(), 2);
                assert_eq!(booking.updated_at(), at);
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }
}
