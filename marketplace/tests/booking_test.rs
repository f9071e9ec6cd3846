//! Integration tests for the reservation engine
//!
//! Drives bookings through [`Marketplace`] with real stores, including
//! concurrent requests against one listing.

#![allow(clippy::unwrap_used, clippy::panic)] // Test code can use unwrap/panic

use chagua_marketplace::calendar::DayStatus;
use chagua_marketplace::{
    Actor, Config, Currency, ErrorKind, MarketError, Marketplace, Money, NewListing, Notification,
    NotificationKind, PricingRule, ReservationStatus, RuleCondition, UserId,
};
use chagua_testing::{test_clock, FailingNotifier, RecordingNotifier};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use std::sync::Arc;

// ============================================================================
// Fixtures
// ============================================================================

fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).single().unwrap()
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn bike() -> NewListing {
    NewListing {
        title: "Trek mountain bike".to_string(),
        base_price: Money::from_cents(10_000),
        currency: Currency::usd(),
        pricing_rules: vec![PricingRule::new(RuleCondition::Weekend, 1.5).unwrap()],
    }
}

fn marketplace() -> (Arc<Marketplace>, Arc<RecordingNotifier<Notification>>) {
    let notifier = Arc::new(RecordingNotifier::new());
    let market = Marketplace::new(Config::default(), Arc::new(test_clock()), notifier.clone());
    (Arc::new(market), notifier)
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_for_one_window_book_exactly_once() {
    let (market, _) = marketplace();
    let owner = Actor::individual(UserId::new(), "owner");
    let listing = market.create_listing(&owner, bike()).await.unwrap();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let market = Arc::clone(&market);
            let renter = Actor::individual(UserId::new(), format!("renter-{i}"));
            tokio::spawn(async move {
                market
                    .request_booking(&renter, listing.id, at(2025, 3, 3), at(2025, 3, 6))
                    .await
            })
        })
        .collect();

    let mut created = Vec::new();
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(reservation) => created.push(reservation),
            Err(MarketError::BookingConflict { days }) => {
                assert_eq!(days, vec![date(2025, 3, 3), date(2025, 3, 4), date(2025, 3, 5)]);
                conflicts += 1;
            },
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(created.len(), 1);
    assert_eq!(conflicts, 7);
    assert_eq!(created[0].status, ReservationStatus::Pending);

    let calendar = market
        .availability(listing.id, date(2025, 3, 1), date(2025, 3, 8))
        .await
        .unwrap();
    let booked: Vec<_> = calendar
        .iter()
        .filter(|(_, status)| **status == DayStatus::Booked)
        .map(|(day, _)| *day)
        .collect();
    assert_eq!(booked, vec![date(2025, 3, 3), date(2025, 3, 4), date(2025, 3, 5)]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_disjoint_windows_all_succeed() {
    let (market, _) = marketplace();
    let owner = Actor::individual(UserId::new(), "owner");
    let listing = market.create_listing(&owner, bike()).await.unwrap();

    let handles: Vec<_> = (0..5_u32)
        .map(|week| {
            let market = Arc::clone(&market);
            let renter = Actor::individual(UserId::new(), format!("renter-{week}"));
            let start = at(2025, 4, 1 + week * 5);
            let end = at(2025, 4, 3 + week * 5);
            tokio::spawn(async move { market.request_booking(&renter, listing.id, start, end).await })
        })
        .collect();

    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }
}

#[tokio::test]
async fn conflicting_request_can_be_queued_instead() {
    let (market, _) = marketplace();
    let owner = Actor::individual(UserId::new(), "owner");
    let first = Actor::individual(UserId::new(), "first");
    let second = Actor::individual(UserId::new(), "second");
    let listing = market.create_listing(&owner, bike()).await.unwrap();

    market
        .request_booking(&first, listing.id, at(2025, 3, 3), at(2025, 3, 5))
        .await
        .unwrap();
    let err = market
        .request_booking(&second, listing.id, at(2025, 3, 4), at(2025, 3, 6))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(err.to_string(), "Booking conflict on 2025-03-04");

    let entry = market
        .enqueue(&second, listing.id, at(2025, 3, 4), at(2025, 3, 6))
        .await
        .unwrap();
    let queue = market.booking_queue(listing.id).await.unwrap();
    assert_eq!(queue, vec![entry]);
    assert!(market.is_available(listing.id, at(2025, 3, 5), at(2025, 3, 6)).await.unwrap());
}

#[tokio::test]
async fn payment_confirmation_notifies_owner_once() {
    let (market, notifier) = marketplace();
    let owner = Actor::individual(UserId::new(), "owner");
    let renter = Actor::individual(UserId::new(), "renter");
    let listing = market.create_listing(&owner, bike()).await.unwrap();

    let reservation = market
        .request_booking(&renter, listing.id, at(2025, 3, 1), at(2025, 3, 2))
        .await
        .unwrap();
    assert_eq!(reservation.total_cost, Money::from_cents(15_000));

    let confirmed = market
        .confirm_payment(reservation.id, "M-PESA QJK81XZ")
        .await
        .unwrap();
    assert_eq!(confirmed.status, ReservationStatus::Confirmed);
    assert_eq!(confirmed.payment_proof.as_deref(), Some("M-PESA QJK81XZ"));

    let err = market
        .confirm_payment(reservation.id, "again")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    let kinds: Vec<_> = notifier.recorded().iter().map(|n| n.kind).collect();
    assert_eq!(
        kinds,
        vec![NotificationKind::BookingCreated, NotificationKind::PaymentConfirmed]
    );
    assert!(notifier.recorded().iter().all(|n| n.recipient == owner.id));
}

#[tokio::test]
async fn canceled_reservation_frees_its_days() {
    let (market, _) = marketplace();
    let owner = Actor::individual(UserId::new(), "owner");
    let renter = Actor::individual(UserId::new(), "renter");
    let other = Actor::individual(UserId::new(), "other");
    let listing = market.create_listing(&owner, bike()).await.unwrap();

    let reservation = market
        .request_booking(&renter, listing.id, at(2025, 3, 3), at(2025, 3, 5))
        .await
        .unwrap();

    let err = market
        .cancel_reservation(&other, reservation.id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);

    let canceled = market
        .cancel_reservation(&renter, reservation.id)
        .await
        .unwrap();
    assert_eq!(canceled.status, ReservationStatus::Canceled);

    assert!(market
        .request_booking(&other, listing.id, at(2025, 3, 3), at(2025, 3, 5))
        .await
        .is_ok());
}

#[tokio::test]
async fn notification_failure_never_fails_the_booking() {
    let market = Marketplace::new(
        Config::default(),
        Arc::new(test_clock()),
        Arc::new(FailingNotifier::new("socket closed")),
    );
    let owner = Actor::individual(UserId::new(), "owner");
    let renter = Actor::individual(UserId::new(), "renter");
    let listing = market.create_listing(&owner, bike()).await.unwrap();

    let reservation = market
        .request_booking(&renter, listing.id, at(2025, 3, 3), at(2025, 3, 4))
        .await
        .unwrap();

    assert_eq!(market.reservation(reservation.id).await.unwrap(), reservation);
    assert!(!market
        .is_available(listing.id, at(2025, 3, 3), at(2025, 3, 4))
        .await
        .unwrap());
}

#[tokio::test]
async fn past_and_empty_ranges_are_rejected() {
    let (market, _) = marketplace();
    let owner = Actor::individual(UserId::new(), "owner");
    let renter = Actor::individual(UserId::new(), "renter");
    let listing = market.create_listing(&owner, bike()).await.unwrap();

    let past = market
        .request_booking(&renter, listing.id, at(2024, 12, 1), at(2024, 12, 3))
        .await
        .unwrap_err();
    assert_eq!(past.kind(), ErrorKind::Validation);

    let empty = market
        .request_booking(&renter, listing.id, at(2025, 3, 3), at(2025, 3, 3))
        .await
        .unwrap_err();
    assert_eq!(empty.kind(), ErrorKind::Validation);

    let own = market
        .request_booking(&owner, listing.id, at(2025, 3, 3), at(2025, 3, 4))
        .await
        .unwrap_err();
    assert_eq!(own.kind(), ErrorKind::Validation);
}
