//! Booking lifecycle demo.
//!
//! Walks one item through a request, a refused double booking, confirmation,
//! cancellation and a date-driven rental, printing every notification.
//!
//! # Usage
//!
//! In memory:
//! ```bash
//! cargo run --bin kinship-booking-demo
//! ```
//!
//! Persisting to JSON files:
//! ```bash
//! KINSHIP_DATA_DIR=./data RUST_LOG=kinship_booking=debug cargo run --bin kinship-booking-demo
//! ```

use chrono::Duration;
use kinship_booking::{
    BookingEnvironment, BookingManager, BookingRequest, ChannelNotifier, Config, Item, ItemId,
    Money, StoredItemCatalog, UserId, UserRole,
};
use kinship_core::environment::{Clock, SystemClock};
use std::sync::Arc;
use tokio::sync::broadcast::Receiver;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> anyhow::Result<()> {
    let config = Config::from_env();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        data_dir = ?config.storage.data_dir,
        capacity_bytes = ?config.storage.capacity_bytes,
        "Starting booking demo"
    );

    let store = config.storage.open_store()?;
    let catalog = StoredItemCatalog::new(Arc::clone(&store));
    let notifier = Arc::new(ChannelNotifier::new(config.notifications.channel_capacity));
    let mut inbox = notifier.subscribe();
    let clock = Arc::new(SystemClock);

    let owner = UserId::new();
    let renter = UserId::new();
    let other_renter = UserId::new();
    let item = Item::new(ItemId::new(), owner, "Two-person kayak", Money::from_dollars(30));
    catalog.save(&item)?;

    let env = BookingEnvironment::new(clock.clone(), notifier, Arc::new(catalog));
    let manager = BookingManager::new(env, store);

    println!("=== Kinship Booking Demo ===\n");

    let today = clock.today();
    let start_date = today + Duration::days(10);
    let end_date = start_date + Duration::days(4);
    let total_price = manager.quote_price(item.id, start_date, end_date)?;
    println!("Quote for {start_date} to {end_date}: {total_price}");

    let booking = manager.create_booking(BookingRequest {
        item_id: item.id,
        renter_id: renter,
        owner_id: owner,
        start_date,
        end_date,
        total_price,
    })?;
    println!("Created booking {} ({})", booking.id(), booking.status());
    drain(&mut inbox);

    let overlapping = BookingRequest {
        item_id: item.id,
        renter_id: other_renter,
        owner_id: owner,
        start_date: start_date + Duration::days(2),
        end_date: start_date + Duration::days(3),
        total_price: Money::from_dollars(30),
    };
    match manager.create_booking(overlapping.clone()) {
        Ok(b) => println!("Unexpectedly booked {}", b.id()),
        Err(error) => println!("Second request refused: {error}"),
    }

    let booking = manager.confirm_booking(booking.id())?;
    println!("Booking is now {}", booking.status());
    drain(&mut inbox);

    if let Err(error) = manager.reject_booking(booking.id(), None) {
        println!("Reject after confirm refused: {error}");
    }

    let booking = manager.cancel_booking(booking.id(), Some("Trip postponed".to_string()))?;
    println!("Booking is now {}", booking.status());
    drain(&mut inbox);

    let retry = manager.create_booking(overlapping)?;
    println!("Second request accepted after cancellation: {}", retry.status());
    drain(&mut inbox);

    let changed = manager.update_booking_statuses_by_date()?;
    println!("Reconciliation changed {} booking(s)", changed.len());

    for entry in manager.get_user_bookings(owner, UserRole::Both)? {
        println!(
            "  {:?}: {} {} to {} [{}]",
            entry.role,
            entry.booking.id(),
            entry.booking.start_date(),
            entry.booking.end_date(),
            entry.booking.status()
        );
    }

    let stats = manager.booking_stats(owner)?;
    println!(
        "Owner stats: {} booking(s), earned {}",
        stats.total, stats.earned
    );

    println!("\n=== Demo Complete ===");
    Ok(())
}

/// Print every notification waiting in the inbox
fn drain(inbox: &mut Receiver<kinship_booking::Delivery>) {
    while let Ok(delivery) = inbox.try_recv() {
        println!(
            "  -> {} [{}] {}",
            delivery.user_id, delivery.notification.title, delivery.notification.message
        );
    }
}
