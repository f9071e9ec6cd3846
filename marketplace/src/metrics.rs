//! Business metrics for the marketplace.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `chagua_bookings_total{outcome}` - Booking requests by outcome (created, conflict, queued, canceled, completed)
//! - `chagua_payments_confirmed_total` - Offline payments confirmed
//! - `chagua_payment_volume_cents_total` - Sum of confirmed reservation totals in cents
//! - `chagua_payments_approved_total` - Payments signed off by a moderator
//! - `chagua_reviews_total{target}` - Reviews recorded by target kind
//! - `chagua_trust_badges_total{change}` - Trust badge grants and revocations
//! - `chagua_contracts_total{status}` - Contract transitions
//! - `chagua_disputes_total{status}` - Dispute transitions
//! - `chagua_review_disputes_total{status}` - Review disputes opened and resolved
//! - `chagua_users_verified_total` - Accounts verified by a moderator
//! - `chagua_reports_total{status}` - Reports filed and resolved
//!
//! ## Histograms
//! - `chagua_booking_days` - Length of created reservations in days

use metrics::{counter, describe_counter, describe_histogram, histogram};

/// Initialize and register all business metrics descriptions.
///
/// This should be called once at application startup, before any metrics are recorded.
pub fn register_business_metrics() {
    describe_counter!(
        "chagua_bookings_total",
        "Booking requests by outcome (created, conflict, queued, canceled, completed)"
    );
    describe_histogram!(
        "chagua_booking_days",
        "Length of created reservations in days"
    );
    describe_counter!(
        "chagua_payments_confirmed_total",
        "Total number of offline payments confirmed"
    );
    describe_counter!(
        "chagua_payment_volume_cents_total",
        "Sum of confirmed reservation totals in cents"
    );
    describe_counter!(
        "chagua_payments_approved_total",
        "Payments signed off by a payments moderator"
    );
    describe_counter!("chagua_reviews_total", "Reviews recorded by target kind");
    describe_counter!(
        "chagua_trust_badges_total",
        "Trust badge grants and revocations"
    );
    describe_counter!("chagua_contracts_total", "Contract transitions by status");
    describe_counter!("chagua_disputes_total", "Dispute transitions by status");
    describe_counter!("chagua_reports_total", "Reports filed and resolved");
    describe_counter!(
        "chagua_review_disputes_total",
        "Review disputes opened and resolved"
    );
    describe_counter!("chagua_users_verified_total", "Accounts verified by a moderator");

    chagua_runtime::metrics::register_runtime_metrics();

    tracing::info!("Business metrics registered");
}

/// Record the outcome of a booking operation.
pub fn record_booking(outcome: &'static str) {
    counter!("chagua_bookings_total", "outcome" => outcome).increment(1);
}

/// Record a created reservation's length.
pub fn record_booking_days(days: f64) {
    histogram!("chagua_booking_days").record(days);
}

/// Record a confirmed payment.
///
/// # Arguments
///
/// * `amount_cents` - Reservation total in cents
pub fn record_payment_confirmed(amount_cents: u64) {
    counter!("chagua_payments_confirmed_total").increment(1);
    counter!("chagua_payment_volume_cents_total").increment(amount_cents);
    tracing::debug!(amount_cents, "Recorded payment_confirmed metric");
}

/// Record a review by target kind ("listing" or "user").
pub fn record_review(target: &'static str) {
    counter!("chagua_reviews_total", "target" => target).increment(1);
}

/// Record a trust badge change.
pub fn record_trust_badge(granted: bool) {
    let change = if granted { "granted" } else { "revoked" };
    counter!("chagua_trust_badges_total", "change" => change).increment(1);
}

/// Record a contract transition.
pub fn record_contract(status: &'static str) {
    counter!("chagua_contracts_total", "status" => status).increment(1);
}

/// Record a dispute transition.
pub fn record_dispute(status: &'static str) {
    counter!("chagua_disputes_total", "status" => status).increment(1);
}

/// Record a report being filed or resolved.
pub fn record_report(status: &'static str) {
    counter!("chagua_reports_total", "status" => status).increment(1);
}

/// Record a moderator approving a payment.
pub fn record_payment_approved() {
    counter!("chagua_payments_approved_total").increment(1);
}

/// Record a review dispute being opened or resolved.
pub fn record_review_dispute(status: &'static str) {
    counter!("chagua_review_disputes_total", "status" => status).increment(1);
}

/// Record a moderator verifying an account.
pub fn record_user_verified() {
    counter!("chagua_users_verified_total").increment(1);
}
