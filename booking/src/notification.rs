//! Notifications sent when bookings change.
//!
//! Delivery is fire-and-forget: a notifier never reports failure back to the
//! booking operation that triggered it. Consumers subscribe explicitly, either
//! by implementing [`Notifier`] or by listening on a [`ChannelNotifier`].

use crate::types::{Booking, BookingId, BookingStatus, UserId};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tokio::sync::broadcast;

/// What happened to the booking
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// A renter asked for one of the owner's items
    BookingRequest,
    /// The owner accepted
    BookingConfirmed,
    /// The owner declined
    BookingRejected,
    /// Either party withdrew
    BookingCancelled,
    /// The rental window began
    RentalStarted,
    /// The rental ended
    RentalCompleted,
}

impl NotificationKind {
    /// Kind announced when a booking enters `status`
    #[must_use]
    pub const fn for_status(status: BookingStatus) -> Self {
        match status {
            BookingStatus::Pending => Self::BookingRequest,
            BookingStatus::Confirmed => Self::BookingConfirmed,
            BookingStatus::Rejected => Self::BookingRejected,
            BookingStatus::Cancelled => Self::BookingCancelled,
            BookingStatus::Active => Self::RentalStarted,
            BookingStatus::Completed => Self::RentalCompleted,
        }
    }

    /// Short headline
    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Self::BookingRequest => "New booking request",
            Self::BookingConfirmed => "Booking confirmed",
            Self::BookingRejected => "Booking declined",
            Self::BookingCancelled => "Booking cancelled",
            Self::RentalStarted => "Rental started",
            Self::RentalCompleted => "Rental completed",
        }
    }
}

/// A message for one user about one booking
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// What happened
    pub kind: NotificationKind,
    /// Headline
    pub title: String,
    /// Body text
    pub message: String,
    /// Booking concerned
    pub booking_id: BookingId,
}

/// A notification together with its recipient
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    /// Recipient
    pub user_id: UserId,
    /// Payload
    pub notification: Notification,
}

/// Notifications due for a booking in its current status
///
/// | Status    | Recipients      |
/// |-----------|-----------------|
/// | pending   | owner           |
/// | confirmed | renter          |
/// | rejected  | renter          |
/// | cancelled | renter, owner   |
/// | active    | renter, owner   |
/// | completed | renter, owner   |
#[must_use]
pub fn deliveries_for(booking: &Booking) -> Vec<Delivery> {
    let status = booking.status();
    let kind = NotificationKind::for_status(status);
    let note = booking
        .status_history()
        .last()
        .map_or(status.default_message(), |change| change.message.as_str());
    let window = format!("{} to {}", booking.start_date(), booking.end_date());

    let message = match status {
        BookingStatus::Pending => {
            format!("New request for {window}, total {}", booking.total_price())
        },
        BookingStatus::Confirmed => format!("Your booking for {window} was confirmed"),
        BookingStatus::Rejected => format!("Your booking for {window} was declined: {note}"),
        BookingStatus::Cancelled => format!("The booking for {window} was cancelled: {note}"),
        BookingStatus::Active => format!("The rental for {window} has started"),
        BookingStatus::Completed => {
            format!("The rental for {window} is complete. Leave a review!")
        },
    };

    let recipients = match status {
        BookingStatus::Pending => vec![booking.owner_id()],
        BookingStatus::Confirmed | BookingStatus::Rejected => vec![booking.renter_id()],
        BookingStatus::Cancelled | BookingStatus::Active | BookingStatus::Completed => {
            vec![booking.renter_id(), booking.owner_id()]
        },
    };

    recipients
        .into_iter()
        .map(|user_id| Delivery {
            user_id,
            notification: Notification {
                kind,
                title: kind.title().to_string(),
                message: message.clone(),
                booking_id: booking.id(),
            },
        })
        .collect()
}

/// Receives booking notifications
pub trait Notifier: Send + Sync {
    /// Deliver `notification` to `user_id`
    fn notify(&self, user_id: UserId, notification: Notification);
}

/// Notifier backed by a broadcast channel
///
/// Every subscriber sees every delivery sent after it subscribed. Sending with
/// no subscribers drops the notification.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    sender: broadcast::Sender<Delivery>,
}

impl ChannelNotifier {
    /// Creates a channel holding up to `capacity` undelivered notifications
    /// per subscriber
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to future deliveries
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Delivery> {
        self.sender.subscribe()
    }

    /// Number of live subscribers
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, user_id: UserId, notification: Notification) {
        let booking_id = notification.booking_id;
        if self
            .sender
            .send(Delivery {
                user_id,
                notification,
            })
            .is_err()
        {
            tracing::trace!(%user_id, %booking_id, "No notification subscribers");
        }
    }
}

/// Notifier that keeps every delivery in memory
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    deliveries: Mutex<Vec<Delivery>>,
}

impl RecordingNotifier {
    /// Creates an empty recorder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything delivered so far, oldest first
    #[must_use]
    pub fn deliveries(&self) -> Vec<Delivery> {
        match self.deliveries.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Notifications delivered to one user
    #[must_use]
    pub fn for_user(&self, user_id: UserId) -> Vec<Notification> {
        self.deliveries()
            .into_iter()
            .filter(|d| d.user_id == user_id)
            .map(|d| d.notification)
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, user_id: UserId, notification: Notification) {
        let delivery = Delivery {
            user_id,
            notification,
        };
        match self.deliveries.lock() {
            Ok(mut guard) => guard.push(delivery),
            Err(poisoned) => poisoned.into_inner().push(delivery),
        }
    }
}

/// Notifier that only logs
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, user_id: UserId, notification: Notification) {
        tracing::info!(
            %user_id,
            booking_id = %notification.booking_id,
            kind = ?notification.kind,
            title = %notification.title,
            "{}",
            notification.message
        );
    }
}
