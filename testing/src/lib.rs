//! # Chagua Testing
//!
//! Testing utilities and helpers for the Chagua marketplace engines.
//!
//! This crate provides:
//! - Mock implementations of Environment traits (clocks, notifiers)
//! - [`ReducerTest`], a Given-When-Then harness for reducers
//! - Assertion helpers for effects
//!
//! ## Example
//!
//! ```ignore
//! use chagua_testing::{test_clock, ReducerTest};
//!
//! ReducerTest::new(BookingReducer::new())
//!     .with_env(BookingEnvironment::new(Arc::new(test_clock())))
//!     .given_state(listing_state())
//!     .when_action(BookingAction::RecordView)
//!     .then_state(|state| assert_eq!(state.listing.view_count, 1))
//!     .run();
//! ```

pub mod reducer_test;

pub use reducer_test::{assertions, ReducerTest};

/// Mock implementations of Environment traits
pub mod mocks {
    use chagua_core::environment::Clock;
    use chagua_core::notify::{Notifier, NotifyError, NotifyFuture};
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::sync::{Mutex, PoisonError};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use chagua_testing::mocks::FixedClock;
    /// use chagua_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that only moves when told to.
    ///
    /// Used for time-based rules such as the one-year clean activity window of
    /// the trust badge.
    #[derive(Debug)]
    pub struct ManualClock {
        time: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        /// Create a clock starting at `time`
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Mutex::new(time),
            }
        }

        /// Move the clock forward
        pub fn advance(&self, by: Duration) {
            let mut time = self.time.lock().unwrap_or_else(PoisonError::into_inner);
            *time += by;
        }

        /// Jump to an absolute time
        pub fn set(&self, to: DateTime<Utc>) {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner) = to;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    /// The instant every test clock starts at: 2025-01-01 00:00:00 UTC
    ///
    /// # Panics
    ///
    /// Never in practice; the timestamp is a valid constant.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0)
            .single()
            .expect("hardcoded timestamp should always be valid")
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(test_time())
    }

    /// Notifier that keeps every notification it receives.
    #[derive(Debug, Default)]
    pub struct RecordingNotifier<N> {
        recorded: Mutex<Vec<N>>,
    }

    impl<N: Clone> RecordingNotifier<N> {
        /// Create an empty recorder
        #[must_use]
        pub const fn new() -> Self {
            Self {
                recorded: Mutex::new(Vec::new()),
            }
        }

        /// Everything received so far, in delivery order
        #[must_use]
        pub fn recorded(&self) -> Vec<N> {
            self.recorded
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        /// Drop everything received so far
        pub fn clear(&self) {
            self.recorded
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clear();
        }
    }

    impl<N> Notifier<N> for RecordingNotifier<N>
    where
        N: Send + 'static,
    {
        fn notify(&self, notification: N) -> NotifyFuture<'_> {
            self.recorded
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(notification);
            Box::pin(async { Ok(()) })
        }
    }

    /// Notifier whose transport is always down.
    #[derive(Debug, Clone)]
    pub struct FailingNotifier {
        reason: String,
    }

    impl FailingNotifier {
        /// Create a notifier that fails every delivery with `reason`
        #[must_use]
        pub fn new(reason: impl Into<String>) -> Self {
            Self {
                reason: reason.into(),
            }
        }
    }

    impl<N> Notifier<N> for FailingNotifier
    where
        N: Send + 'static,
    {
        fn notify(&self, _notification: N) -> NotifyFuture<'_> {
            let error = NotifyError::DeliveryFailed {
                subject: std::any::type_name::<N>().to_string(),
                reason: self.reason.clone(),
            };
            Box::pin(async move { Err(error) })
        }
    }
}

// Re-export commonly used items
pub use mocks::{test_clock, test_time, FailingNotifier, FixedClock, ManualClock, RecordingNotifier};
