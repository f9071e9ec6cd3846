//! Chagua Marketplace Demo
//!
//! Walks one rental through the engines:
//! - Listing with a weekend pricing rule
//! - Booking, a conflicting booking, and a queued request
//! - Offline payment confirmation and completion
//! - Reviews, a contract, a dispute and its resolution
//! - Prometheus exposition of everything recorded
//!
//! # Usage
//!
//! ```bash
//! RUST_LOG=chagua_marketplace=debug cargo run --bin demo
//! ```

use anyhow::Context;
use chagua_core::environment::SystemClock;
use chagua_marketplace::{
    Actor, Capability, CapabilitySet, Config, Currency, Marketplace, Money, NewListing,
    Notification, PricingRule, ReviewTarget, Role, RuleCondition, UserId,
    currency::RateTable, metrics::register_business_metrics,
};
use chagua_runtime::notifiers::BroadcastNotifier;
use chrono::{DateTime, Datelike, Days, NaiveTime, Utc, Weekday};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Next Saturday at least a week away, at midnight UTC
fn next_saturday() -> anyhow::Result<DateTime<Utc>> {
    let mut day = Utc::now()
        .date_naive()
        .checked_add_days(Days::new(7))
        .context("date out of range")?;
    while day.weekday() != Weekday::Sat {
        day = day.succ_opt().context("date out of range")?;
    }
    Ok(day.and_time(NaiveTime::MIN).and_utc())
}

fn days_after(start: DateTime<Utc>, days: u64) -> anyhow::Result<DateTime<Utc>> {
    start
        .checked_add_days(Days::new(days))
        .context("date out of range")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file (if present)
    let _ = dotenvy::dotenv();
    let config = Config::from_env();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let prometheus = PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install Prometheus recorder")?;
    register_business_metrics();

    // Stand-in for the websocket transport: forward every notification to its channel group
    let notifier = Arc::new(BroadcastNotifier::<Notification>::new(
        config.notifications.capacity,
    ));
    let mut subscriber = notifier.subscribe();
    let transport = tokio::spawn(async move {
        while let Ok(notification) = subscriber.recv().await {
            match notification.to_channel_message() {
                Ok(message) => info!(group = %message.group, payload = %message.payload, "Delivered"),
                Err(error) => tracing::warn!(%error, "Undeliverable notification"),
            }
        }
    });

    let rates = RateTable::new().with_rate(Currency::usd(), Currency::new("KES")?, 129.5)?;
    let market = Marketplace::new(config, Arc::new(SystemClock), notifier.clone()).with_rates(rates);

    println!("\n============================================");
    println!("   Chagua Marketplace - Live Demo");
    println!("============================================\n");

    let owner = Actor::individual(UserId::new(), "wanjiru").with_role(Role::Business);
    let renter = Actor::individual(UserId::new(), "otieno");
    let late_renter = Actor::individual(UserId::new(), "amina");
    let moderator = Actor::individual(UserId::new(), "moderator")
        .with_capabilities(CapabilitySet::of([
            Capability::Disputes,
            Capability::Rentals,
            Capability::Payments,
            Capability::Users,
        ]));

    // 1. Listing
    let listing = market
        .create_listing(
            &owner,
            NewListing {
                title: "Sony A7 IV kit".to_string(),
                base_price: Money::from_cents(10_000),
                currency: Currency::usd(),
                pricing_rules: vec![PricingRule::new(RuleCondition::Weekend, 1.5)?],
            },
        )
        .await?;
    market.verify_listing(&moderator, listing.id).await?;
    market.verify_user(&moderator, owner.id).await?;
    println!("1. Listed '{}' at {} USD/day (+50% on weekends)", listing.title, listing.base_price);

    // 2. Booking, conflict, queue
    let start = next_saturday()?;
    let end = days_after(start, 3)?;
    let reservation = market.request_booking(&renter, listing.id, start, end).await?;
    println!(
        "2. {} booked {} → {} for {} USD",
        renter.username, start, end, reservation.total_cost
    );

    match market
        .request_booking(&late_renter, listing.id, days_after(start, 1)?, days_after(start, 2)?)
        .await
    {
        Ok(_) => println!("   unexpected: overlapping booking accepted"),
        Err(error) => println!("   {} was refused: {error}", late_renter.username),
    }
    let queued = market
        .enqueue(&late_renter, listing.id, days_after(start, 1)?, days_after(start, 2)?)
        .await?;
    println!("   {} joined the waiting list ({})", late_renter.username, queued.id);

    // 3. Payment and completion
    market.confirm_payment(reservation.id, "M-PESA QJK81XZ").await?;
    market.approve_payment(&moderator, reservation.id).await?;
    let shown = market
        .display_total(reservation.id, &Currency::new("KES")?)
        .await?;
    println!("3. Payment confirmed: {} {}", shown.money, shown.currency.code());
    market.complete_reservation(&owner, reservation.id).await?;

    // 4. Reviews and trust
    market
        .record_review(&renter, ReviewTarget::Listing(listing.id), 5, "Spotless kit", false)
        .await?;
    let owner_review = market
        .record_review(&renter, ReviewTarget::User(owner.id), 4, "Quick handover", true)
        .await?;
    let objection = market
        .dispute_review(&owner, owner_review.id, "Handover was on time, not just quick")
        .await?;
    market.resolve_review_dispute(&moderator, objection.id).await?;
    let listing = market.listing(listing.id).await?;
    let trust = market.evaluate_trust_badge(owner.id).await?;
    println!(
        "4. Listing rated {:.1} from {} review(s); owner trust badge: {} ({} completed)",
        listing.rating, listing.review_count, trust.trust_badge, trust.completed_transactions
    );

    // 5. Contract and dispute
    let contract = market
        .create_contract(
            &renter,
            listing.id,
            "Renter returns the camera body, two lenses and charger in working order.",
            BTreeMap::from([("deposit".to_string(), "50 USD".to_string())]),
        )
        .await?;
    market.agree_contract(&owner, contract.id).await?;
    let dispute = market
        .raise_dispute(&renter, listing.id, "Second battery missing from the kit")
        .await?;
    let dispute = market.resolve_dispute(&moderator, dispute.id).await?;
    println!("5. Dispute {} is {}", dispute.id, dispute.status);

    drop(market);
    drop(notifier);
    transport.await?;

    println!("\n--- Prometheus exposition ---\n{}", prometheus.render());
    Ok(())
}
