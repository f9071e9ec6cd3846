//! Listing aggregate for the reservation engine.
//!
//! One [`ListingState`] owns a listing, its availability calendar, its
//! reservations and its booking queue. Every command that reads or writes
//! availability runs through [`BookingReducer`] under the listing's store
//! lock, which is what makes the availability check and the calendar update
//! a single atomic step.
//!
//! Reservation lifecycle:
//!
//! ```text
//! Pending ──ConfirmPayment──▶ Confirmed ──CompleteReservation──▶ Completed
//!    │                            │
//!    │                            └──ApprovePayment (payments moderator, once)
//!    └──CancelReservation──▶ Canceled   (covered days released)
//! ```

use crate::calendar::Calendar;
use crate::capability::{self, Capability};
use crate::error::MarketError;
use crate::notifications::Notification;
use crate::pricing;
use crate::types::{
    Actor, BookingQueueEntry, Listing, Money, PricingRule, QueueEntryId, RatingSummary,
    Reservation, ReservationId, ReservationStatus, UserId,
};
use chagua_core::environment::Clock;
use chagua_core::reducer::{Reduced, Reducer};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

// ============================================================================
// State
// ============================================================================

/// Everything guarded by one listing's lock
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ListingState {
    /// The listing itself
    pub listing: Listing,
    /// Booked days
    pub calendar: Calendar,
    /// Reservations made against this listing
    pub reservations: BTreeMap<ReservationId, Reservation>,
    /// Waiting requests, oldest first
    pub queue: Vec<BookingQueueEntry>,
    /// Version of the last rating sync applied to `listing`
    pub rating_version: u64,
}

impl ListingState {
    /// Fresh state for a newly created listing
    #[must_use]
    pub const fn new(listing: Listing) -> Self {
        Self {
            listing,
            calendar: Calendar::new(),
            reservations: BTreeMap::new(),
            queue: Vec::new(),
            rating_version: 0,
        }
    }

    /// Look up a reservation
    #[must_use]
    pub fn reservation(&self, id: ReservationId) -> Option<&Reservation> {
        self.reservations.get(&id)
    }

    fn reservation_or_not_found(&self, id: ReservationId) -> Result<&Reservation, MarketError> {
        self.reservations
            .get(&id)
            .ok_or_else(|| MarketError::not_found("reservation", id))
    }
}

// ============================================================================
// Actions
// ============================================================================

/// Commands accepted by the listing aggregate
#[derive(Clone, Debug)]
pub enum BookingAction {
    /// Reserve `[start, end)` for the renter, or fail on any booked day
    RequestBooking {
        /// Id for the new reservation
        reservation_id: ReservationId,
        /// Who is booking
        renter: Actor,
        /// Inclusive start
        start: DateTime<Utc>,
        /// Exclusive end
        end: DateTime<Utc>,
    },

    /// Append a waiting request without touching the calendar
    Enqueue {
        /// Id for the queue entry
        entry_id: QueueEntryId,
        /// Who is waiting
        requester: UserId,
        /// Requested start
        start: DateTime<Utc>,
        /// Requested end
        end: DateTime<Utc>,
    },

    /// Record offline payment proof for a pending reservation
    ConfirmPayment {
        /// Reservation being paid
        reservation_id: ReservationId,
        /// Payment reference supplied by the renter
        proof: String,
    },

    /// Sign off on the payment proof of a confirmed reservation
    ApprovePayment {
        /// Reservation whose payment is checked
        reservation_id: ReservationId,
        /// Moderator holding the `payments` capability
        moderator: Actor,
    },

    /// Withdraw a pending reservation
    CancelReservation {
        /// Reservation to cancel
        reservation_id: ReservationId,
        /// Renter or owner
        actor: UserId,
    },

    /// Close out a confirmed reservation
    CompleteReservation {
        /// Reservation to complete
        reservation_id: ReservationId,
        /// Must be the listing owner
        actor: UserId,
    },

    /// Count a detail page view
    RecordView,

    /// Replace base price and pricing rules
    UpdatePricing {
        /// Must be the listing owner
        actor: UserId,
        /// New base price
        base_price: Money,
        /// New ordered rules
        rules: Vec<PricingRule>,
    },

    /// Copy a recomputed rating onto the listing, unless a newer one landed first
    SyncRating {
        /// Output of the reputation recompute
        summary: RatingSummary,
    },

    /// Mark the listing verified after an on-site visit
    Verify {
        /// Moderator holding the `rentals` capability
        moderator: Actor,
    },
}

/// Result of a listing command
#[derive(Clone, Debug, PartialEq)]
pub enum BookingOutput {
    /// A reservation was created or changed
    Reservation(Reservation),
    /// A request was queued
    Queued(BookingQueueEntry),
    /// The listing itself changed
    Listing(Listing),
}

impl BookingOutput {
    /// Unwrap a reservation output.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::Internal`] for any other variant.
    pub fn into_reservation(self) -> Result<Reservation, MarketError> {
        match self {
            Self::Reservation(reservation) => Ok(reservation),
            other => Err(unexpected("reservation", &other)),
        }
    }

    /// Unwrap a queue entry output.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::Internal`] for any other variant.
    pub fn into_queue_entry(self) -> Result<BookingQueueEntry, MarketError> {
        match self {
            Self::Queued(entry) => Ok(entry),
            other => Err(unexpected("queue entry", &other)),
        }
    }

    /// Unwrap a listing output.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::Internal`] for any other variant.
    pub fn into_listing(self) -> Result<Listing, MarketError> {
        match self {
            Self::Listing(listing) => Ok(listing),
            other => Err(unexpected("listing", &other)),
        }
    }
}

fn unexpected(expected: &str, got: &BookingOutput) -> MarketError {
    MarketError::Internal(format!("listing store returned {got:?}, expected a {expected}"))
}

// ============================================================================
// Environment
// ============================================================================

/// Dependencies of the listing aggregate
#[derive(Clone)]
pub struct BookingEnvironment {
    /// Clock for "not in the past" checks and timestamps
    pub clock: Arc<dyn Clock>,
}

impl BookingEnvironment {
    /// Creates a new `BookingEnvironment`
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

// ============================================================================
// Reducer
// ============================================================================

type BookingResult = Result<Reduced<BookingOutput, Notification>, MarketError>;

/// Reducer for the listing aggregate
#[derive(Clone, Debug, Default)]
pub struct BookingReducer;

impl BookingReducer {
    /// Creates a new `BookingReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates the time range of a booking or queue request
    fn validate_range(
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), MarketError> {
        if start >= end {
            return Err(MarketError::Validation(format!(
                "start {start} must be before end {end}"
            )));
        }
        if start < now {
            return Err(MarketError::Validation(format!(
                "start {start} is in the past"
            )));
        }
        Ok(())
    }

    fn request_booking(
        state: &mut ListingState,
        reservation_id: ReservationId,
        renter: &Actor,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        env: &BookingEnvironment,
    ) -> BookingResult {
        let now = env.clock.now();
        Self::validate_range(start, end, now)?;

        if renter.id == state.listing.owner {
            return Err(MarketError::Validation(
                "owners cannot book their own listing".to_string(),
            ));
        }

        let conflicts = state.calendar.conflicts(start, end);
        if !conflicts.is_empty() {
            return Err(MarketError::BookingConflict { days: conflicts });
        }

        let quote = pricing::total_cost(&state.listing, start, end)?;

        // All checks passed; commit reservation and calendar together.
        let reservation = Reservation {
            id: reservation_id,
            renter: renter.id,
            listing: state.listing.id,
            start,
            end,
            total_cost: quote.total,
            currency: quote.currency,
            status: ReservationStatus::Pending,
            payment_proof: None,
            payment_approved_by: None,
            created_at: now,
        };
        state.calendar.mark_booked(start, end);
        state.reservations.insert(reservation_id, reservation.clone());

        tracing::info!(
            reservation_id = %reservation_id,
            listing_id = %state.listing.id,
            total = %reservation.total_cost,
            "Booking created"
        );

        let notification = Notification::booking_created(renter, &state.listing, &reservation);
        Ok(Reduced::new(BookingOutput::Reservation(reservation)).publish(notification))
    }

    fn enqueue(
        state: &mut ListingState,
        entry_id: QueueEntryId,
        requester: UserId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        env: &BookingEnvironment,
    ) -> BookingResult {
        if start >= end {
            return Err(MarketError::Validation(format!(
                "start {start} must be before end {end}"
            )));
        }

        let entry = BookingQueueEntry {
            id: entry_id,
            requester,
            listing: state.listing.id,
            start,
            end,
            created_at: env.clock.now(),
        };
        state.queue.push(entry.clone());

        tracing::info!(
            entry_id = %entry_id,
            listing_id = %state.listing.id,
            position = state.queue.len(),
            "Booking request queued"
        );
        Ok(Reduced::new(BookingOutput::Queued(entry)))
    }

    fn confirm_payment(
        state: &mut ListingState,
        reservation_id: ReservationId,
        proof: String,
    ) -> BookingResult {
        if proof.trim().is_empty() {
            return Err(MarketError::Validation(
                "payment proof is required".to_string(),
            ));
        }

        let reservation = state.reservation_or_not_found(reservation_id)?;
        if reservation.status != ReservationStatus::Pending {
            return Err(MarketError::InvalidState(format!(
                "cannot confirm payment for a {} reservation",
                reservation.status
            )));
        }

        let Some(reservation) = state.reservations.get_mut(&reservation_id) else {
            return Err(MarketError::not_found("reservation", reservation_id));
        };
        reservation.payment_proof = Some(proof);
        reservation.status = ReservationStatus::Confirmed;
        let reservation = reservation.clone();

        tracing::info!(reservation_id = %reservation_id, "Payment confirmed");

        let notification = Notification::payment_confirmed(
            reservation.renter,
            state.listing.owner,
            &state.listing,
            &reservation,
        );
        Ok(Reduced::new(BookingOutput::Reservation(reservation)).publish(notification))
    }

    fn approve_payment(
        state: &mut ListingState,
        reservation_id: ReservationId,
        moderator: &Actor,
    ) -> BookingResult {
        capability::require(moderator, Capability::Payments)?;

        let reservation = state.reservation_or_not_found(reservation_id)?;
        if reservation.status != ReservationStatus::Confirmed {
            return Err(MarketError::InvalidState(format!(
                "cannot approve payment for a {} reservation",
                reservation.status
            )));
        }
        if reservation.payment_approved_by.is_some() {
            return Err(MarketError::InvalidState(format!(
                "payment for reservation {reservation_id} is already approved"
            )));
        }

        let Some(reservation) = state.reservations.get_mut(&reservation_id) else {
            return Err(MarketError::not_found("reservation", reservation_id));
        };
        reservation.payment_approved_by = Some(moderator.id);
        let reservation = reservation.clone();

        tracing::info!(reservation_id = %reservation_id, moderator = %moderator.id, "Payment approved");
        Ok(Reduced::new(BookingOutput::Reservation(reservation)))
    }

    fn cancel(
        state: &mut ListingState,
        reservation_id: ReservationId,
        actor: UserId,
    ) -> BookingResult {
        let reservation = state.reservation_or_not_found(reservation_id)?;
        if actor != reservation.renter && actor != state.listing.owner {
            return Err(MarketError::Authorization(
                "only the renter or the listing owner can cancel a reservation".to_string(),
            ));
        }
        if reservation.status != ReservationStatus::Pending {
            return Err(MarketError::InvalidState(format!(
                "cannot cancel a {} reservation",
                reservation.status
            )));
        }
        let (start, end) = (reservation.start, reservation.end);

        let Some(reservation) = state.reservations.get_mut(&reservation_id) else {
            return Err(MarketError::not_found("reservation", reservation_id));
        };
        reservation.status = ReservationStatus::Canceled;
        let reservation = reservation.clone();
        state.calendar.release(start, end);

        tracing::info!(reservation_id = %reservation_id, "Reservation canceled");
        Ok(Reduced::new(BookingOutput::Reservation(reservation)))
    }

    fn complete(
        state: &mut ListingState,
        reservation_id: ReservationId,
        actor: UserId,
    ) -> BookingResult {
        let reservation = state.reservation_or_not_found(reservation_id)?;
        if actor != state.listing.owner {
            return Err(MarketError::Authorization(
                "only the listing owner can complete a reservation".to_string(),
            ));
        }
        if reservation.status != ReservationStatus::Confirmed {
            return Err(MarketError::InvalidState(format!(
                "cannot complete a {} reservation",
                reservation.status
            )));
        }

        let Some(reservation) = state.reservations.get_mut(&reservation_id) else {
            return Err(MarketError::not_found("reservation", reservation_id));
        };
        reservation.status = ReservationStatus::Completed;
        let reservation = reservation.clone();

        tracing::info!(reservation_id = %reservation_id, "Reservation completed");
        Ok(Reduced::new(BookingOutput::Reservation(reservation)))
    }

    fn update_pricing(
        state: &mut ListingState,
        actor: UserId,
        base_price: Money,
        rules: Vec<PricingRule>,
    ) -> BookingResult {
        if actor != state.listing.owner {
            return Err(MarketError::Authorization(
                "only the listing owner can edit pricing".to_string(),
            ));
        }
        for rule in &rules {
            rule.validate()?;
        }

        state.listing.base_price = base_price;
        state.listing.pricing_rules = rules;

        tracing::info!(listing_id = %state.listing.id, base_price = %base_price, "Pricing updated");
        Ok(Reduced::new(BookingOutput::Listing(state.listing.clone())))
    }

    fn sync_rating(state: &mut ListingState, summary: RatingSummary) -> BookingResult {
        if summary.version > state.rating_version {
            state.listing.rating = summary.rating;
            state.listing.review_count = summary.review_count;
            state.rating_version = summary.version;
        } else {
            tracing::debug!(
                listing_id = %state.listing.id,
                stale = summary.version,
                current = state.rating_version,
                "Ignoring stale rating sync"
            );
        }
        Ok(Reduced::new(BookingOutput::Listing(state.listing.clone())))
    }

    fn verify(state: &mut ListingState, moderator: &Actor) -> BookingResult {
        capability::require(moderator, Capability::Rentals)?;

        state.listing.verified = true;

        tracing::info!(listing_id = %state.listing.id, moderator = %moderator.id, "Listing verified");
        Ok(Reduced::new(BookingOutput::Listing(state.listing.clone())))
    }
}

impl Reducer for BookingReducer {
    type State = ListingState;
    type Action = BookingAction;
    type Environment = BookingEnvironment;
    type Output = BookingOutput;
    type Error = MarketError;
    type Notification = Notification;

    fn reduce(
        &self,
        state: &mut ListingState,
        action: BookingAction,
        env: &BookingEnvironment,
    ) -> BookingResult {
        let result = match action {
            BookingAction::RequestBooking {
                reservation_id,
                renter,
                start,
                end,
            } => Self::request_booking(state, reservation_id, &renter, start, end, env),

            BookingAction::Enqueue {
                entry_id,
                requester,
                start,
                end,
            } => Self::enqueue(state, entry_id, requester, start, end, env),

            BookingAction::ConfirmPayment {
                reservation_id,
                proof,
            } => Self::confirm_payment(state, reservation_id, proof),

            BookingAction::ApprovePayment {
                reservation_id,
                moderator,
            } => Self::approve_payment(state, reservation_id, &moderator),

            BookingAction::CancelReservation {
                reservation_id,
                actor,
            } => Self::cancel(state, reservation_id, actor),

            BookingAction::CompleteReservation {
                reservation_id,
                actor,
            } => Self::complete(state, reservation_id, actor),

            BookingAction::RecordView => {
                state.listing.view_count = state.listing.view_count.saturating_add(1);
                Ok(Reduced::new(BookingOutput::Listing(state.listing.clone())))
            },

            BookingAction::UpdatePricing {
                actor,
                base_price,
                rules,
            } => Self::update_pricing(state, actor, base_price, rules),

            BookingAction::SyncRating { summary } => Self::sync_rating(state, summary),

            BookingAction::Verify { moderator } => Self::verify(state, &moderator),
        };

        if let Err(error) = &result {
            tracing::debug!(listing_id = %state.listing.id, %error, "Listing command rejected");
        }
        result
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::capability::CapabilitySet;
    use crate::error::ErrorKind;
    use crate::notifications::NotificationKind;
    use crate::types::{Currency, ListingId, RuleCondition};
    use chagua_testing::{assertions, test_clock, test_time, ReducerTest};
    use chrono::{NaiveDate, TimeZone};

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).single().unwrap()
    }

    fn env() -> BookingEnvironment {
        BookingEnvironment::new(Arc::new(test_clock()))
    }

    fn owner() -> Actor {
        Actor::individual(UserId::new(), "olivia")
    }

    fn renter() -> Actor {
        Actor::individual(UserId::new(), "rafa")
    }

    fn listing_state(owner: &Actor) -> ListingState {
        ListingState::new(Listing {
            id: ListingId::new(),
            owner: owner.id,
            title: "Lakeside cabin".to_string(),
            base_price: Money::from_cents(10_000),
            currency: Currency::usd(),
            pricing_rules: vec![PricingRule::new(RuleCondition::Weekend, 1.5).unwrap()],
            rating: 0.0,
            review_count: 0,
            view_count: 0,
            verified: false,
            created_at: test_time(),
        })
    }

    /// Applies a booking directly so tests can start from a booked calendar
    fn with_booking(
        mut state: ListingState,
        renter: &Actor,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> (ListingState, ReservationId) {
        let reservation_id = ReservationId::new();
        BookingReducer::new()
            .reduce(
                &mut state,
                BookingAction::RequestBooking {
                    reservation_id,
                    renter: renter.clone(),
                    start,
                    end,
                },
                &env(),
            )
            .unwrap();
        (state, reservation_id)
    }

    fn with_status(
        mut state: ListingState,
        id: ReservationId,
        status: ReservationStatus,
    ) -> ListingState {
        if let Some(reservation) = state.reservations.get_mut(&id) {
            reservation.status = status;
        }
        state
    }

    #[test]
    fn test_request_booking_creates_pending_reservation() {
        let owner = owner();
        let renter = renter();
        let reservation_id = ReservationId::new();

        ReducerTest::new(BookingReducer::new())
            .with_env(env())
            .given_state(listing_state(&owner))
            .when_action(BookingAction::RequestBooking {
                reservation_id,
                renter: renter.clone(),
                // Saturday 00:00 to Sunday 00:00
                start: at(2025, 3, 1, 0),
                end: at(2025, 3, 2, 0),
            })
            .then_output(move |output| {
                let BookingOutput::Reservation(reservation) = output else {
                    panic!("expected a reservation, got {output:?}");
                };
                assert_eq!(reservation.id, reservation_id);
                assert_eq!(reservation.status, ReservationStatus::Pending);
                assert_eq!(reservation.total_cost, Money::from_cents(15_000));
            })
            .then_state(|state| {
                assert_eq!(state.reservations.len(), 1);
                assert_eq!(state.calendar.booked_count(), 1);
                assert!(state.calendar.is_booked(NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()));
            })
            .then_effects(move |effects| {
                assertions::assert_published_count(effects, 1);
                let notification = assertions::published(effects)[0];
                assert_eq!(notification.kind, NotificationKind::BookingCreated);
                assert_eq!(notification.recipient, owner.id);
                assert_eq!(notification.actor, renter.id);
                assert_eq!(notification.subject, "Lakeside cabin");
            })
            .run();
    }

    #[test]
    fn test_overlapping_booking_conflicts_and_names_days() {
        let owner = owner();
        let (state, _) = with_booking(
            listing_state(&owner),
            &renter(),
            at(2025, 3, 3, 0),
            at(2025, 3, 6, 0),
        );

        ReducerTest::new(BookingReducer::new())
            .with_env(env())
            .given_state(state)
            .when_action(BookingAction::RequestBooking {
                reservation_id: ReservationId::new(),
                renter: renter(),
                start: at(2025, 3, 5, 12),
                end: at(2025, 3, 7, 0),
            })
            .then_error(|error| {
                assert_eq!(
                    error,
                    &MarketError::BookingConflict {
                        days: vec![NaiveDate::from_ymd_opt(2025, 3, 5).unwrap()]
                    }
                );
            })
            .then_state_unchanged()
            .run();
    }

    #[test]
    fn test_adjacent_bookings_both_succeed() {
        let owner = owner();
        let (state, _) = with_booking(
            listing_state(&owner),
            &renter(),
            at(2025, 3, 3, 0),
            at(2025, 3, 5, 0),
        );

        ReducerTest::new(BookingReducer::new())
            .with_env(env())
            .given_state(state)
            .when_action(BookingAction::RequestBooking {
                reservation_id: ReservationId::new(),
                renter: renter(),
                start: at(2025, 3, 5, 0),
                end: at(2025, 3, 7, 0),
            })
            .then_state(|state| {
                assert_eq!(state.reservations.len(), 2);
                assert_eq!(state.calendar.booked_count(), 4);
            })
            .then_effects(|effects| assertions::assert_published_count(effects, 1))
            .run();
    }

    #[test]
    fn test_invalid_ranges_are_validation_errors() {
        let owner = owner();
        for (start, end) in [
            (at(2025, 3, 5, 0), at(2025, 3, 5, 0)),
            (at(2025, 3, 6, 0), at(2025, 3, 5, 0)),
            // before the test clock
            (at(2024, 12, 30, 0), at(2025, 1, 2, 0)),
        ] {
            ReducerTest::new(BookingReducer::new())
                .with_env(env())
                .given_state(listing_state(&owner))
                .when_action(BookingAction::RequestBooking {
                    reservation_id: ReservationId::new(),
                    renter: renter(),
                    start,
                    end,
                })
                .then_error(|error| assert_eq!(error.kind(), ErrorKind::Validation))
                .then_state_unchanged()
                .run();
        }
    }

    #[test]
    fn test_owner_cannot_book_own_listing() {
        let owner = owner();
        ReducerTest::new(BookingReducer::new())
            .with_env(env())
            .given_state(listing_state(&owner))
            .when_action(BookingAction::RequestBooking {
                reservation_id: ReservationId::new(),
                renter: owner.clone(),
                start: at(2025, 3, 3, 0),
                end: at(2025, 3, 4, 0),
            })
            .then_error(|error| assert_eq!(error.kind(), ErrorKind::Validation))
            .then_state_unchanged()
            .run();
    }

    #[test]
    fn test_enqueue_appends_even_when_booked() {
        let owner = owner();
        let waiting = renter();
        let (state, _) = with_booking(
            listing_state(&owner),
            &renter(),
            at(2025, 3, 3, 0),
            at(2025, 3, 6, 0),
        );

        ReducerTest::new(BookingReducer::new())
            .with_env(env())
            .given_state(state)
            .when_action(BookingAction::Enqueue {
                entry_id: QueueEntryId::new(),
                requester: waiting.id,
                start: at(2025, 3, 3, 0),
                end: at(2025, 3, 6, 0),
            })
            .then_state(move |state| {
                assert_eq!(state.queue.len(), 1);
                assert_eq!(state.queue[0].requester, waiting.id);
                // Queueing never touches the calendar
                assert_eq!(state.calendar.booked_count(), 3);
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn test_enqueue_rejects_inverted_range() {
        let owner = owner();
        ReducerTest::new(BookingReducer::new())
            .with_env(env())
            .given_state(listing_state(&owner))
            .when_action(BookingAction::Enqueue {
                entry_id: QueueEntryId::new(),
                requester: UserId::new(),
                start: at(2025, 3, 6, 0),
                end: at(2025, 3, 3, 0),
            })
            .then_error(|error| assert_eq!(error.kind(), ErrorKind::Validation))
            .then_state_unchanged()
            .run();
    }

    #[test]
    fn test_confirm_payment_moves_to_confirmed() {
        let owner = owner();
        let renter = renter();
        let (state, id) = with_booking(
            listing_state(&owner),
            &renter,
            at(2025, 3, 3, 0),
            at(2025, 3, 4, 0),
        );

        ReducerTest::new(BookingReducer::new())
            .with_env(env())
            .given_state(state)
            .when_action(BookingAction::ConfirmPayment {
                reservation_id: id,
                proof: "MPESA-QX81".to_string(),
            })
            .then_state(move |state| {
                let reservation = state.reservation(id).unwrap();
                assert_eq!(reservation.status, ReservationStatus::Confirmed);
                assert_eq!(reservation.payment_proof.as_deref(), Some("MPESA-QX81"));
            })
            .then_effects(move |effects| {
                let published = assertions::published(effects);
                assert_eq!(published.len(), 1);
                assert_eq!(published[0].kind, NotificationKind::PaymentConfirmed);
                assert_eq!(published[0].recipient, owner.id);
            })
            .run();
    }

    #[test]
    fn test_confirm_payment_twice_is_invalid_state() {
        let owner = owner();
        let (state, id) = with_booking(
            listing_state(&owner),
            &renter(),
            at(2025, 3, 3, 0),
            at(2025, 3, 4, 0),
        );
        let state = with_status(state, id, ReservationStatus::Confirmed);

        ReducerTest::new(BookingReducer::new())
            .with_env(env())
            .given_state(state)
            .when_action(BookingAction::ConfirmPayment {
                reservation_id: id,
                proof: "again".to_string(),
            })
            .then_error(|error| assert_eq!(error.kind(), ErrorKind::InvalidState))
            .then_state_unchanged()
            .run();
    }

    #[test]
    fn test_confirm_payment_requires_proof() {
        let owner = owner();
        let (state, id) = with_booking(
            listing_state(&owner),
            &renter(),
            at(2025, 3, 3, 0),
            at(2025, 3, 4, 0),
        );

        ReducerTest::new(BookingReducer::new())
            .with_env(env())
            .given_state(state)
            .when_action(BookingAction::ConfirmPayment {
                reservation_id: id,
                proof: "   ".to_string(),
            })
            .then_error(|error| assert_eq!(error.kind(), ErrorKind::Validation))
            .then_state_unchanged()
            .run();
    }

    #[test]
    fn test_confirm_unknown_reservation_is_not_found() {
        let owner = owner();
        ReducerTest::new(BookingReducer::new())
            .with_env(env())
            .given_state(listing_state(&owner))
            .when_action(BookingAction::ConfirmPayment {
                reservation_id: ReservationId::new(),
                proof: "ref".to_string(),
            })
            .then_error(|error| assert_eq!(error.kind(), ErrorKind::NotFound))
            .run();
    }

    #[test]
    fn test_approve_payment_records_moderator() {
        let owner = owner();
        let (state, id) = with_booking(
            listing_state(&owner),
            &renter(),
            at(2025, 3, 3, 0),
            at(2025, 3, 4, 0),
        );
        let state = with_status(state, id, ReservationStatus::Confirmed);
        let moderator = Actor::individual(UserId::new(), "treasurer")
            .with_capabilities(CapabilitySet::of([Capability::Payments]));
        let moderator_id = moderator.id;

        ReducerTest::new(BookingReducer::new())
            .with_env(env())
            .given_state(state)
            .when_action(BookingAction::ApprovePayment {
                reservation_id: id,
                moderator,
            })
            .then_state(move |state| {
                let reservation = state.reservation(id).unwrap();
                assert_eq!(reservation.payment_approved_by, Some(moderator_id));
                assert_eq!(reservation.status, ReservationStatus::Confirmed);
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn test_approve_payment_needs_confirmed_and_happens_once() {
        let owner = owner();
        let (state, id) = with_booking(
            listing_state(&owner),
            &renter(),
            at(2025, 3, 3, 0),
            at(2025, 3, 4, 0),
        );
        let moderator = Actor::individual(UserId::new(), "treasurer")
            .with_capabilities(CapabilitySet::of([Capability::Payments]));

        // Still pending
        ReducerTest::new(BookingReducer::new())
            .with_env(env())
            .given_state(state.clone())
            .when_action(BookingAction::ApprovePayment {
                reservation_id: id,
                moderator: moderator.clone(),
            })
            .then_error(|error| assert_eq!(error.kind(), ErrorKind::InvalidState))
            .then_state_unchanged()
            .run();

        let mut approved = with_status(state, id, ReservationStatus::Confirmed);
        BookingReducer::new()
            .reduce(
                &mut approved,
                BookingAction::ApprovePayment {
                    reservation_id: id,
                    moderator: moderator.clone(),
                },
                &env(),
            )
            .unwrap();

        ReducerTest::new(BookingReducer::new())
            .with_env(env())
            .given_state(approved)
            .when_action(BookingAction::ApprovePayment {
                reservation_id: id,
                moderator,
            })
            .then_error(|error| assert_eq!(error.kind(), ErrorKind::InvalidState))
            .then_state_unchanged()
            .run();
    }

    #[test]
    fn test_approve_payment_requires_payments_capability() {
        let owner = owner();
        let (state, id) = with_booking(
            listing_state(&owner),
            &renter(),
            at(2025, 3, 3, 0),
            at(2025, 3, 4, 0),
        );
        let state = with_status(state, id, ReservationStatus::Confirmed);
        let rentals_only = Actor::individual(UserId::new(), "mod")
            .with_capabilities(CapabilitySet::of([Capability::Rentals]));

        ReducerTest::new(BookingReducer::new())
            .with_env(env())
            .given_state(state)
            .when_action(BookingAction::ApprovePayment {
                reservation_id: id,
                moderator: rentals_only,
            })
            .then_error(|error| assert_eq!(error.kind(), ErrorKind::Authorization))
            .then_state_unchanged()
            .run();
    }

    #[test]
    fn test_cancel_releases_days() {
        let owner = owner();
        let renter = renter();
        let (state, id) = with_booking(
            listing_state(&owner),
            &renter,
            at(2025, 3, 3, 0),
            at(2025, 3, 6, 0),
        );

        ReducerTest::new(BookingReducer::new())
            .with_env(env())
            .given_state(state)
            .when_action(BookingAction::CancelReservation {
                reservation_id: id,
                actor: renter.id,
            })
            .then_state(move |state| {
                assert_eq!(state.reservation(id).unwrap().status, ReservationStatus::Canceled);
                assert_eq!(state.calendar.booked_count(), 0);
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn test_cancel_by_stranger_is_unauthorized() {
        let owner = owner();
        let (state, id) = with_booking(
            listing_state(&owner),
            &renter(),
            at(2025, 3, 3, 0),
            at(2025, 3, 6, 0),
        );

        ReducerTest::new(BookingReducer::new())
            .with_env(env())
            .given_state(state)
            .when_action(BookingAction::CancelReservation {
                reservation_id: id,
                actor: UserId::new(),
            })
            .then_error(|error| assert_eq!(error.kind(), ErrorKind::Authorization))
            .then_state_unchanged()
            .run();
    }

    #[test]
    fn test_cancel_confirmed_is_invalid_state() {
        let owner = owner();
        let (state, id) = with_booking(
            listing_state(&owner),
            &renter(),
            at(2025, 3, 3, 0),
            at(2025, 3, 6, 0),
        );
        let state = with_status(state, id, ReservationStatus::Confirmed);

        ReducerTest::new(BookingReducer::new())
            .with_env(env())
            .given_state(state)
            .when_action(BookingAction::CancelReservation {
                reservation_id: id,
                actor: owner.id,
            })
            .then_error(|error| assert_eq!(error.kind(), ErrorKind::InvalidState))
            .then_state_unchanged()
            .run();
    }

    #[test]
    fn test_complete_requires_owner_and_confirmed() {
        let owner = owner();
        let renter = renter();
        let (state, id) = with_booking(
            listing_state(&owner),
            &renter,
            at(2025, 3, 3, 0),
            at(2025, 3, 6, 0),
        );

        // Still pending
        ReducerTest::new(BookingReducer::new())
            .with_env(env())
            .given_state(state.clone())
            .when_action(BookingAction::CompleteReservation {
                reservation_id: id,
                actor: owner.id,
            })
            .then_error(|error| assert_eq!(error.kind(), ErrorKind::InvalidState))
            .then_state_unchanged()
            .run();

        let confirmed = with_status(state, id, ReservationStatus::Confirmed);

        ReducerTest::new(BookingReducer::new())
            .with_env(env())
            .given_state(confirmed.clone())
            .when_action(BookingAction::CompleteReservation {
                reservation_id: id,
                actor: renter.id,
            })
            .then_error(|error| assert_eq!(error.kind(), ErrorKind::Authorization))
            .run();

        ReducerTest::new(BookingReducer::new())
            .with_env(env())
            .given_state(confirmed)
            .when_action(BookingAction::CompleteReservation {
                reservation_id: id,
                actor: owner.id,
            })
            .then_output(|output| {
                assert!(matches!(
                    output,
                    BookingOutput::Reservation(r) if r.status == ReservationStatus::Completed
                ));
            })
            .run();
    }

    #[test]
    fn test_record_view_increments_counter() {
        let owner = owner();
        ReducerTest::new(BookingReducer::new())
            .with_env(env())
            .given_state(listing_state(&owner))
            .when_action(BookingAction::RecordView)
            .then_state(|state| assert_eq!(state.listing.view_count, 1))
            .run();
    }

    #[test]
    fn test_update_pricing_is_owner_only() {
        let owner = owner();
        ReducerTest::new(BookingReducer::new())
            .with_env(env())
            .given_state(listing_state(&owner))
            .when_action(BookingAction::UpdatePricing {
                actor: UserId::new(),
                base_price: Money::from_cents(1),
                rules: vec![],
            })
            .then_error(|error| assert_eq!(error.kind(), ErrorKind::Authorization))
            .then_state_unchanged()
            .run();

        ReducerTest::new(BookingReducer::new())
            .with_env(env())
            .given_state(listing_state(&owner))
            .when_action(BookingAction::UpdatePricing {
                actor: owner.id,
                base_price: Money::from_cents(8_000),
                rules: vec![],
            })
            .then_state(|state| {
                assert_eq!(state.listing.base_price, Money::from_cents(8_000));
                assert!(state.listing.pricing_rules.is_empty());
            })
            .run();
    }

    #[test]
    fn test_update_pricing_rejects_bad_multiplier() {
        let owner = owner();
        ReducerTest::new(BookingReducer::new())
            .with_env(env())
            .given_state(listing_state(&owner))
            .when_action(BookingAction::UpdatePricing {
                actor: owner.id,
                base_price: Money::from_cents(8_000),
                rules: vec![PricingRule {
                    condition: RuleCondition::Weekend,
                    multiplier: f64::NAN,
                }],
            })
            .then_error(|error| assert_eq!(error.kind(), ErrorKind::Validation))
            .run();
    }

    #[test]
    fn test_stale_rating_sync_is_ignored() {
        let owner = owner();
        let mut state = listing_state(&owner);
        state.listing.rating = 4.0;
        state.listing.review_count = 3;
        state.rating_version = 5;

        ReducerTest::new(BookingReducer::new())
            .with_env(env())
            .given_state(state)
            .when_action(BookingAction::SyncRating {
                summary: RatingSummary {
                    rating: 2.0,
                    review_count: 2,
                    negative_count: 1,
                    version: 4,
                },
            })
            .then_state_unchanged()
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn test_newer_rating_sync_applies() {
        let owner = owner();
        ReducerTest::new(BookingReducer::new())
            .with_env(env())
            .given_state(listing_state(&owner))
            .when_action(BookingAction::SyncRating {
                summary: RatingSummary {
                    rating: 4.5,
                    review_count: 2,
                    negative_count: 0,
                    version: 1,
                },
            })
            .then_state(|state| {
                assert!((state.listing.rating - 4.5).abs() < f64::EPSILON);
                assert_eq!(state.listing.review_count, 2);
                assert_eq!(state.rating_version, 1);
            })
            .run();
    }

    #[test]
    fn test_verify_requires_rentals_capability() {
        let owner = owner();
        let disputes_only = Actor::individual(UserId::new(), "mod")
            .with_capabilities(CapabilitySet::of([Capability::Disputes]));
        let rentals = Actor::individual(UserId::new(), "mod2")
            .with_capabilities(CapabilitySet::of([Capability::Rentals]));

        ReducerTest::new(BookingReducer::new())
            .with_env(env())
            .given_state(listing_state(&owner))
            .when_action(BookingAction::Verify {
                moderator: disputes_only,
            })
            .then_error(|error| assert_eq!(error.kind(), ErrorKind::Authorization))
            .then_state_unchanged()
            .run();

        ReducerTest::new(BookingReducer::new())
            .with_env(env())
            .given_state(listing_state(&owner))
            .when_action(BookingAction::Verify { moderator: rentals })
            .then_state(|state| assert!(state.listing.verified))
            .run();
    }

    #[test]
    fn test_output_accessors_report_internal_on_mismatch() {
        let error = BookingOutput::Queued(BookingQueueEntry {
            id: QueueEntryId::new(),
            requester: UserId::new(),
            listing: ListingId::new(),
            start: test_time(),
            end: test_time(),
            created_at: test_time(),
        })
        .into_reservation()
        .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Internal);
    }
}
