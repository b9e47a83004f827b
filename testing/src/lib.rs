//! # Kinship Testing
//!
//! Testing utilities and helpers for Kinship reducers.
//!
//! This crate provides:
//! - A settable [`Clock`] implementation
//! - The [`ReducerTest`] Given-When-Then harness
//! - Assertion helpers for effects
//!
//! ## Example
//!
//! ```
//! use kinship_core::environment::Clock;
//! use kinship_testing::mocks::ManualClock;
//! use chrono::{Duration, NaiveDate};
//!
//! let clock = ManualClock::at_date(NaiveDate::from_ymd_opt(2025, 6, 1).unwrap_or_default());
//! clock.advance(Duration::days(3));
//! assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2025, 6, 4).unwrap_or_default());
//! ```

use chrono::{DateTime, Utc};
use kinship_core::environment::Clock;

pub mod reducer_test;

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use chrono::{Duration, NaiveDate};
    use std::sync::RwLock;

    /// Clock that only moves when told to
    ///
    /// Shared behind an `Arc`, it lets a test move "today" between calls, for
    /// example to run date-driven reconciliation before and after a rental
    /// window.
    #[derive(Debug)]
    pub struct ManualClock {
        time: RwLock<DateTime<Utc>>,
    }

    impl ManualClock {
        /// Create a clock frozen at `time`
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: RwLock::new(time),
            }
        }

        /// Create a clock frozen at noon UTC on `date`
        #[must_use]
        pub fn at_date(date: NaiveDate) -> Self {
            Self::new(noon(date))
        }

        /// Replace the current time
        pub fn set(&self, time: DateTime<Utc>) {
            match self.time.write() {
                Ok(mut guard) => *guard = time,
                Err(poisoned) => *poisoned.into_inner() = time,
            }
        }

        /// Move the clock to noon UTC on `date`
        pub fn set_date(&self, date: NaiveDate) {
            self.set(noon(date));
        }

        /// Move the clock forward by `by`
        pub fn advance(&self, by: Duration) {
            let now = self.now();
            self.set(now + by);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            match self.time.read() {
                Ok(guard) => *guard,
                Err(poisoned) => *poisoned.into_inner(),
            }
        }
    }

    fn noon(date: NaiveDate) -> DateTime<Utc> {
        date.and_hms_opt(12, 0, 0).unwrap_or_default().and_utc()
    }
}

/// Date helpers shared by tests
pub mod helpers {
    use chrono::NaiveDate;

    /// Parse a `YYYY-MM-DD` literal
    ///
    /// # Panics
    ///
    /// Panics if `value` is not a valid ISO date. Meant for test literals.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn date(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").expect("test date literal should parse")
    }
}

// Re-export commonly used items
pub use helpers::date;
pub use mocks::ManualClock;
pub use reducer_test::{ReducerTest, assertions};
