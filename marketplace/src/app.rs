//! The marketplace facade.
//!
//! [`Marketplace`] owns one store per aggregate instance and exposes every
//! operation as an async method. Each method is one logical transaction
//! against one aggregate; follow-up updates to other aggregates (listing
//! rating sync, trust re-evaluation, completed transaction counts, abuse
//! flags) are separate commits applied right after the first one succeeds.
//!
//! ```text
//!                ┌──────────────────────────── Marketplace ───────────────────────────┐
//!  request ──▶   │ capability pre-check ─▶ index lookup ─▶ Store::send ─▶ metrics     │
//!                │                                             │                      │
//!                │            listings / reputation / trust / agreements / moderation │
//!                └─────────────────────────────────────────────┼──────────────────────┘
//!                                                              ▼
//!                                                          Notifier
//! ```

use crate::aggregates::{
    AgreementAction, AgreementBook, AgreementEnvironment, AgreementReducer, BookingAction,
    BookingEnvironment, BookingReducer, ListingState, ModerationAction, ModerationEnvironment,
    ModerationReducer, ReportBook, ReputationAction, ReputationEnvironment, ReputationReducer,
    ReviewTargetState, TrustAction, TrustEnvironment, TrustOutcome, TrustReducer, TrustState,
};
use crate::calendar::DayStatus;
use crate::capability::{self, Capability};
use crate::config::Config;
use crate::currency::{Amount, RateTable};
use crate::error::MarketError;
use crate::metrics;
use crate::notifications::Notification;
use crate::pricing::{self, Quote};
use crate::types::{
    Actor, BookingQueueEntry, BusinessProfile, BusinessProfileId, Contract, ContractId, Currency,
    Dispute, DisputeId, FeedbackTrend, Listing, ListingId, Money, NewListing, PricingRule,
    QueueEntryId, Rating, RatingSummary, Report, ReportId, ReportTarget, Reservation,
    ReservationId, Review, ReviewDispute, ReviewDisputeId, ReviewId, ReviewTarget, UserId,
};
use chagua_core::environment::Clock;
use chagua_core::notify::Notifier;
use chagua_runtime::{Store, StoreMap};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Secondary keys: which aggregate owns an entity
#[derive(Debug, Default)]
struct Index {
    reservations: HashMap<ReservationId, ListingId>,
    contracts: HashMap<ContractId, ListingId>,
    disputes: HashMap<DisputeId, ListingId>,
    reviews: HashMap<ReviewId, ReviewTarget>,
    review_disputes: HashMap<ReviewDisputeId, ReviewTarget>,
}

/// Marketplace engines behind one handle.
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
pub struct Marketplace {
    config: Config,
    clock: Arc<dyn Clock>,
    listings: StoreMap<ListingId, BookingReducer>,
    reputation: StoreMap<ReviewTarget, ReputationReducer>,
    trust: StoreMap<UserId, TrustReducer>,
    agreements: StoreMap<ListingId, AgreementReducer>,
    moderation: Store<ModerationReducer>,
    index: RwLock<Index>,
    rates: RateTable,
}

impl Marketplace {
    /// Build a marketplace with an empty rate table.
    #[must_use]
    pub fn new(
        config: Config,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier<Notification>>,
    ) -> Self {
        let listings = StoreMap::new(
            BookingReducer::new(),
            BookingEnvironment::new(Arc::clone(&clock)),
            Arc::clone(&notifier),
        );
        let reputation = StoreMap::new(
            ReputationReducer::new(),
            ReputationEnvironment::new(Arc::clone(&clock)),
            Arc::clone(&notifier),
        );
        let trust = StoreMap::new(
            TrustReducer::new(),
            TrustEnvironment::new(Arc::clone(&clock), config.trust),
            Arc::clone(&notifier),
        );
        let agreements = StoreMap::new(
            AgreementReducer::new(),
            AgreementEnvironment::new(Arc::clone(&clock), config.rules.contract_min_terms),
            Arc::clone(&notifier),
        );
        let moderation = Store::new(
            ReportBook::new(),
            ModerationReducer::new(),
            ModerationEnvironment::new(Arc::clone(&clock)),
            notifier,
        );

        Self {
            config,
            clock,
            listings,
            reputation,
            trust,
            agreements,
            moderation,
            index: RwLock::new(Index::default()),
            rates: RateTable::new(),
        }
    }

    /// Replace the display conversion rates
    #[must_use]
    pub fn with_rates(mut self, rates: RateTable) -> Self {
        self.rates = rates;
        self
    }

    /// Active configuration
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    // ========================================================================
    // Listings and availability
    // ========================================================================

    /// Publish a new listing owned by `owner`.
    ///
    /// # Errors
    ///
    /// - [`MarketError::Validation`] for an empty title or an invalid pricing rule
    pub async fn create_listing(
        &self,
        owner: &Actor,
        new: NewListing,
    ) -> Result<Listing, MarketError> {
        if new.title.trim().is_empty() {
            return Err(MarketError::Validation("listing title is required".to_string()));
        }
        for rule in &new.pricing_rules {
            rule.validate()?;
        }

        let listing = Listing {
            id: ListingId::new(),
            owner: owner.id,
            title: new.title,
            base_price: new.base_price,
            currency: new.currency,
            pricing_rules: new.pricing_rules,
            rating: 0.0,
            review_count: 0,
            view_count: 0,
            verified: false,
            created_at: self.clock.now(),
        };

        let book = AgreementBook::new(listing.id, listing.owner, listing.title.clone());
        if self
            .listings
            .insert_new(listing.id, ListingState::new(listing.clone()))
            .await
            .is_none()
            || self.agreements.insert_new(listing.id, book).await.is_none()
        {
            return Err(MarketError::Internal(format!(
                "listing id {} is already in use",
                listing.id
            )));
        }

        tracing::info!(listing_id = %listing.id, owner = %owner.id, title = %listing.title, "Listing created");
        Ok(listing)
    }

    /// Current listing snapshot.
    ///
    /// # Errors
    ///
    /// - [`MarketError::NotFound`] if the listing does not exist
    pub async fn listing(&self, listing: ListingId) -> Result<Listing, MarketError> {
        let store = self.listing_store(listing).await?;
        Ok(store.state(|s| s.listing.clone()).await)
    }

    /// Whether every day covered by `[start, end)` is free.
    ///
    /// # Errors
    ///
    /// - [`MarketError::NotFound`] if the listing does not exist
    pub async fn is_available(
        &self,
        listing: ListingId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<bool, MarketError> {
        let store = self.listing_store(listing).await?;
        Ok(store.state(|s| s.calendar.is_available(start, end)).await)
    }

    /// Per-day free/booked map for `[from, to]`.
    ///
    /// # Errors
    ///
    /// - [`MarketError::NotFound`] if the listing does not exist
    pub async fn availability(
        &self,
        listing: ListingId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<BTreeMap<NaiveDate, DayStatus>, MarketError> {
        let store = self.listing_store(listing).await?;
        Ok(store.state(|s| s.calendar.snapshot(from, to)).await)
    }

    /// Price `[start, end)` without booking it.
    ///
    /// # Errors
    ///
    /// - [`MarketError::NotFound`] if the listing does not exist
    /// - [`MarketError::Validation`] if the range is empty
    pub async fn quote(
        &self,
        listing: ListingId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Quote, MarketError> {
        if start >= end {
            return Err(MarketError::Validation(format!(
                "start {start} must be before end {end}"
            )));
        }
        let store = self.listing_store(listing).await?;
        store
            .state(|s| pricing::total_cost(&s.listing, start, end))
            .await
    }

    /// Count a view of the listing detail page.
    ///
    /// # Errors
    ///
    /// - [`MarketError::NotFound`] if the listing does not exist
    pub async fn record_view(&self, listing: ListingId) -> Result<Listing, MarketError> {
        let store = self.listing_store(listing).await?;
        store.send(BookingAction::RecordView).await?.into_listing()
    }

    /// Replace the base price and pricing rules.
    ///
    /// # Errors
    ///
    /// - [`MarketError::NotFound`] if the listing does not exist
    /// - [`MarketError::Authorization`] if `owner` does not own the listing
    /// - [`MarketError::Validation`] for an invalid rule
    pub async fn update_pricing(
        &self,
        owner: &Actor,
        listing: ListingId,
        base_price: Money,
        rules: Vec<PricingRule>,
    ) -> Result<Listing, MarketError> {
        let store = self.listing_store(listing).await?;
        store
            .send(BookingAction::UpdatePricing {
                actor: owner.id,
                base_price,
                rules,
            })
            .await?
            .into_listing()
    }

    /// Mark a listing verified.
    ///
    /// # Errors
    ///
    /// - [`MarketError::Authorization`] without the `rentals` capability
    /// - [`MarketError::NotFound`] if the listing does not exist
    pub async fn verify_listing(
        &self,
        moderator: &Actor,
        listing: ListingId,
    ) -> Result<Listing, MarketError> {
        capability::require(moderator, Capability::Rentals)?;
        let store = self.listing_store(listing).await?;
        store
            .send(BookingAction::Verify {
                moderator: moderator.clone(),
            })
            .await?
            .into_listing()
    }

    // ========================================================================
    // Reservations
    // ========================================================================

    /// Reserve `[start, end)` on a listing.
    ///
    /// # Errors
    ///
    /// - [`MarketError::NotFound`] if the listing does not exist
    /// - [`MarketError::Validation`] for an empty or past range, or self-booking
    /// - [`MarketError::BookingConflict`] naming every already booked day
    #[tracing::instrument(skip(self, renter), fields(renter = %renter.id))]
    pub async fn request_booking(
        &self,
        renter: &Actor,
        listing: ListingId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Reservation, MarketError> {
        let store = self.listing_store(listing).await?;
        let result = store
            .send(BookingAction::RequestBooking {
                reservation_id: ReservationId::new(),
                renter: renter.clone(),
                start,
                end,
            })
            .await;

        let reservation = match result {
            Ok(output) => output.into_reservation()?,
            Err(error) => {
                if matches!(error, MarketError::BookingConflict { .. }) {
                    metrics::record_booking("conflict");
                }
                return Err(error);
            },
        };

        self.index
            .write()
            .await
            .reservations
            .insert(reservation.id, listing);
        metrics::record_booking("created");
        metrics::record_booking_days(pricing::duration_in_days(start, end));
        Ok(reservation)
    }

    /// Join the waiting list for `[start, end)`.
    ///
    /// # Errors
    ///
    /// - [`MarketError::NotFound`] if the listing does not exist
    /// - [`MarketError::Validation`] if `start >= end`
    pub async fn enqueue(
        &self,
        user: &Actor,
        listing: ListingId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<BookingQueueEntry, MarketError> {
        let store = self.listing_store(listing).await?;
        let entry = store
            .send(BookingAction::Enqueue {
                entry_id: QueueEntryId::new(),
                requester: user.id,
                start,
                end,
            })
            .await?
            .into_queue_entry()?;
        metrics::record_booking("queued");
        Ok(entry)
    }

    /// Waiting list of a listing, oldest first.
    ///
    /// # Errors
    ///
    /// - [`MarketError::NotFound`] if the listing does not exist
    pub async fn booking_queue(
        &self,
        listing: ListingId,
    ) -> Result<Vec<BookingQueueEntry>, MarketError> {
        let store = self.listing_store(listing).await?;
        Ok(store.state(|s| s.queue.clone()).await)
    }

    /// Record offline payment proof and confirm a pending reservation.
    ///
    /// # Errors
    ///
    /// - [`MarketError::NotFound`] if the reservation does not exist
    /// - [`MarketError::Validation`] for an empty proof
    /// - [`MarketError::InvalidState`] unless the reservation is pending
    pub async fn confirm_payment(
        &self,
        reservation: ReservationId,
        proof: impl Into<String>,
    ) -> Result<Reservation, MarketError> {
        let store = self.reservation_store(reservation).await?;
        let confirmed = store
            .send(BookingAction::ConfirmPayment {
                reservation_id: reservation,
                proof: proof.into(),
            })
            .await?
            .into_reservation()?;
        metrics::record_payment_confirmed(confirmed.total_cost.cents());
        Ok(confirmed)
    }

    /// Sign off on the payment proof of a confirmed reservation.
    ///
    /// # Errors
    ///
    /// - [`MarketError::Authorization`] without the `payments` capability
    /// - [`MarketError::NotFound`] if the reservation does not exist
    /// - [`MarketError::InvalidState`] unless the reservation is confirmed and
    ///   not yet approved
    pub async fn approve_payment(
        &self,
        moderator: &Actor,
        reservation: ReservationId,
    ) -> Result<Reservation, MarketError> {
        capability::require(moderator, Capability::Payments)?;
        let store = self.reservation_store(reservation).await?;
        let approved = store
            .send(BookingAction::ApprovePayment {
                reservation_id: reservation,
                moderator: moderator.clone(),
            })
            .await?
            .into_reservation()?;
        metrics::record_payment_approved();
        Ok(approved)
    }

    /// Cancel a pending reservation and free its days.
    ///
    /// # Errors
    ///
    /// - [`MarketError::NotFound`] if the reservation does not exist
    /// - [`MarketError::Authorization`] unless `actor` is the renter or owner
    /// - [`MarketError::InvalidState`] unless the reservation is pending
    pub async fn cancel_reservation(
        &self,
        actor: &Actor,
        reservation: ReservationId,
    ) -> Result<Reservation, MarketError> {
        let store = self.reservation_store(reservation).await?;
        let canceled = store
            .send(BookingAction::CancelReservation {
                reservation_id: reservation,
                actor: actor.id,
            })
            .await?
            .into_reservation()?;
        metrics::record_booking("canceled");
        Ok(canceled)
    }

    /// Complete a confirmed reservation and credit both parties with a
    /// completed transaction.
    ///
    /// # Errors
    ///
    /// - [`MarketError::NotFound`] if the reservation does not exist
    /// - [`MarketError::Authorization`] unless `actor` owns the listing
    /// - [`MarketError::InvalidState`] unless the reservation is confirmed
    pub async fn complete_reservation(
        &self,
        actor: &Actor,
        reservation: ReservationId,
    ) -> Result<Reservation, MarketError> {
        let store = self.reservation_store(reservation).await?;
        let completed = store
            .send(BookingAction::CompleteReservation {
                reservation_id: reservation,
                actor: actor.id,
            })
            .await?
            .into_reservation()?;
        metrics::record_booking("completed");

        let owner = store.state(|s| s.listing.owner).await;
        for party in [completed.renter, owner] {
            self.send_trust(party, TrustAction::RecordCompletedTransaction)
                .await?;
        }
        Ok(completed)
    }

    /// Current reservation snapshot.
    ///
    /// # Errors
    ///
    /// - [`MarketError::NotFound`] if the reservation does not exist
    pub async fn reservation(&self, reservation: ReservationId) -> Result<Reservation, MarketError> {
        let store = self.reservation_store(reservation).await?;
        store
            .state(|s| s.reservation(reservation).cloned())
            .await
            .ok_or_else(|| MarketError::not_found("reservation", reservation))
    }

    /// A reservation's total converted for display.
    ///
    /// # Errors
    ///
    /// - [`MarketError::NotFound`] if the reservation or the rate does not exist
    pub async fn display_total(
        &self,
        reservation: ReservationId,
        to: &Currency,
    ) -> Result<Amount, MarketError> {
        let reservation = self.reservation(reservation).await?;
        self.rates.convert(
            &Amount {
                money: reservation.total_cost,
                currency: reservation.currency,
            },
            to,
        )
    }

    // ========================================================================
    // Reviews and trust
    // ========================================================================

    /// Store a review and propagate the recomputed rating.
    ///
    /// # Errors
    ///
    /// - [`MarketError::Validation`] for a rating outside 1..=5, a self-review
    ///   or a review of one's own listing
    /// - [`MarketError::NotFound`] if a reviewed listing does not exist
    /// - [`MarketError::Authorization`] if the reviewer has no completed
    ///   transaction and the rule is enabled
    /// - [`MarketError::Conflict`] if the reviewer already reviewed the target
    #[tracing::instrument(skip(self, reviewer, target, comment), fields(reviewer = %reviewer.id, review_target = %target))]
    pub async fn record_review(
        &self,
        reviewer: &Actor,
        target: ReviewTarget,
        rating: u8,
        comment: impl Into<String>,
        anonymous: bool,
    ) -> Result<Review, MarketError> {
        let rating = Rating::new(rating)?;
        match target {
            ReviewTarget::Listing(listing) => {
                let owner = self
                    .listing_store(listing)
                    .await?
                    .state(|s| s.listing.owner)
                    .await;
                if owner == reviewer.id {
                    return Err(MarketError::Validation(
                        "owners cannot review their own listing".to_string(),
                    ));
                }
            },
            ReviewTarget::User(user) if user == reviewer.id => {
                return Err(MarketError::Validation(
                    "users cannot review themselves".to_string(),
                ));
            },
            ReviewTarget::User(_) => {},
        }
        if self.config.rules.review_requires_transaction
            && self.trust_state(reviewer.id).await.completed_transactions == 0
        {
            return Err(MarketError::Authorization(format!(
                "{} needs a completed transaction before reviewing",
                reviewer.username
            )));
        }

        let store = self
            .reputation
            .get_or_insert_with(target, || ReviewTargetState::new(target))
            .await;
        let outcome = store
            .send(ReputationAction::RecordReview {
                review_id: ReviewId::new(),
                reviewer: reviewer.clone(),
                rating,
                comment: comment.into(),
                anonymous,
            })
            .await?;
        let summary = outcome.summary;
        let review = outcome.into_review()?;

        self.index.write().await.reviews.insert(review.id, target);
        metrics::record_review(match target {
            ReviewTarget::Listing(_) => "listing",
            ReviewTarget::User(_) => "user",
        });

        self.propagate_summary(target, summary, Some(&review)).await?;
        Ok(review)
    }

    /// Rescan every review of a target and propagate the result.
    ///
    /// Idempotent. A target with no reviews yields the empty summary.
    ///
    /// # Errors
    ///
    /// - [`MarketError::NotFound`] if a listing target was removed
    pub async fn recompute(&self, target: ReviewTarget) -> Result<RatingSummary, MarketError> {
        let Some(store) = self.reputation.get(&target).await else {
            return Ok(RatingSummary::default());
        };
        let summary = store.send(ReputationAction::Recompute).await?.summary;
        self.propagate_summary(target, summary, None).await?;
        Ok(summary)
    }

    /// Add a like to a review.
    ///
    /// # Errors
    ///
    /// - [`MarketError::NotFound`] if the review does not exist
    pub async fn like_review(&self, review: ReviewId) -> Result<Review, MarketError> {
        let target = self.review_target(review).await?;
        let store = self
            .reputation
            .get(&target)
            .await
            .ok_or_else(|| MarketError::not_found("review", review))?;
        store
            .send(ReputationAction::LikeReview { review_id: review })
            .await?
            .into_review()
    }

    /// Object to a published review.
    ///
    /// # Errors
    ///
    /// - [`MarketError::NotFound`] if the review does not exist
    /// - [`MarketError::Validation`] for an empty reason
    /// - [`MarketError::Conflict`] if `user` already has an open dispute on it
    pub async fn dispute_review(
        &self,
        user: &Actor,
        review: ReviewId,
        reason: impl Into<String>,
    ) -> Result<ReviewDispute, MarketError> {
        let target = self.review_target(review).await?;
        let store = self
            .reputation
            .get(&target)
            .await
            .ok_or_else(|| MarketError::not_found("review", review))?;
        let dispute = store
            .send(ReputationAction::DisputeReview {
                dispute_id: ReviewDisputeId::new(),
                review_id: review,
                user: user.clone(),
                reason: reason.into(),
            })
            .await?
            .into_dispute()?;

        self.index
            .write()
            .await
            .review_disputes
            .insert(dispute.id, target);
        metrics::record_review_dispute("open");
        Ok(dispute)
    }

    /// Settle an open review dispute.
    ///
    /// # Errors
    ///
    /// - [`MarketError::Authorization`] without the `disputes` capability
    /// - [`MarketError::NotFound`] if the dispute does not exist
    /// - [`MarketError::InvalidState`] if it is already resolved
    pub async fn resolve_review_dispute(
        &self,
        moderator: &Actor,
        dispute: ReviewDisputeId,
    ) -> Result<ReviewDispute, MarketError> {
        capability::require(moderator, Capability::Disputes)?;
        let target = self
            .index
            .read()
            .await
            .review_disputes
            .get(&dispute)
            .copied()
            .ok_or_else(|| MarketError::not_found("review dispute", dispute))?;
        let store = self
            .reputation
            .get(&target)
            .await
            .ok_or_else(|| MarketError::not_found("review dispute", dispute))?;
        let resolved = store
            .send(ReputationAction::ResolveReviewDispute {
                dispute_id: dispute,
                moderator: moderator.clone(),
            })
            .await?
            .into_dispute()?;
        metrics::record_review_dispute("resolved");
        Ok(resolved)
    }

    /// Reviews of a target, oldest first
    pub async fn reviews(&self, target: ReviewTarget) -> Vec<Review> {
        match self.reputation.get(&target).await {
            Some(store) => store.state(|s| s.reviews.clone()).await,
            None => Vec::new(),
        }
    }

    /// Average rating per civil date for a target
    pub async fn feedback_trend(&self, target: ReviewTarget) -> FeedbackTrend {
        match self.reputation.get(&target).await {
            Some(store) => store.state(ReviewTargetState::feedback_trend).await,
            None => FeedbackTrend::new(),
        }
    }

    /// Recompute a user's trust badge.
    ///
    /// # Errors
    ///
    /// Never fails today; the signature leaves room for a persistent store.
    pub async fn evaluate_trust_badge(&self, user: UserId) -> Result<TrustState, MarketError> {
        Ok(self.send_trust(user, TrustAction::Evaluate).await?.state)
    }

    /// Current trust record, without evaluating it
    pub async fn trust_state(&self, user: UserId) -> TrustState {
        match self.trust.get(&user).await {
            Some(store) => store.state(TrustState::clone).await,
            None => TrustState::new(user),
        }
    }

    /// Register a business profile for a business account.
    ///
    /// # Errors
    ///
    /// - [`MarketError::Authorization`] unless `actor` has the business role
    /// - [`MarketError::Validation`] for an empty name
    /// - [`MarketError::Conflict`] if a profile already exists
    pub async fn register_business_profile(
        &self,
        actor: &Actor,
        business_name: impl Into<String>,
    ) -> Result<BusinessProfile, MarketError> {
        self.send_trust(
            actor.id,
            TrustAction::RegisterBusiness {
                actor: actor.clone(),
                profile_id: BusinessProfileId::new(),
                business_name: business_name.into(),
            },
        )
        .await?
        .into_business_profile()
    }

    /// Mark a user's identity as checked.
    ///
    /// # Errors
    ///
    /// - [`MarketError::Authorization`] without the `users` capability
    /// - [`MarketError::InvalidState`] if the user is already verified
    pub async fn verify_user(
        &self,
        moderator: &Actor,
        user: UserId,
    ) -> Result<TrustState, MarketError> {
        capability::require(moderator, Capability::Users)?;
        let outcome = self
            .send_trust(
                user,
                TrustAction::VerifyUser {
                    moderator: moderator.clone(),
                },
            )
            .await?;
        metrics::record_user_verified();
        Ok(outcome.state)
    }

    /// Award the site visit badge to a business.
    ///
    /// # Errors
    ///
    /// - [`MarketError::Authorization`] without the `users` capability
    /// - [`MarketError::NotFound`] if the user has no business profile
    /// - [`MarketError::InvalidState`] if the badge was already awarded
    pub async fn evaluate_site_badge(
        &self,
        moderator: &Actor,
        business_user: UserId,
        notes: Option<String>,
    ) -> Result<BusinessProfile, MarketError> {
        capability::require(moderator, Capability::Users)?;
        let store = self
            .trust
            .get(&business_user)
            .await
            .ok_or_else(|| MarketError::not_found("business profile", business_user))?;
        store
            .send(TrustAction::VerifySite {
                moderator: moderator.clone(),
                notes,
            })
            .await?
            .into_business_profile()
    }

    // ========================================================================
    // Contracts and disputes
    // ========================================================================

    /// Draft a contract with the listing owner.
    ///
    /// # Errors
    ///
    /// - [`MarketError::NotFound`] if the listing does not exist
    /// - [`MarketError::Validation`] for short terms or an owner drafting
    /// - [`MarketError::Conflict`] if the renter already has a pending contract
    pub async fn create_contract(
        &self,
        renter: &Actor,
        listing: ListingId,
        terms: impl Into<String>,
        custom_terms: BTreeMap<String, String>,
    ) -> Result<Contract, MarketError> {
        let store = self.agreement_store(listing).await?;
        let contract = store
            .send(AgreementAction::CreateContract {
                contract_id: ContractId::new(),
                renter: renter.clone(),
                terms: terms.into(),
                custom_terms,
            })
            .await?
            .into_contract()?;

        self.index.write().await.contracts.insert(contract.id, listing);
        metrics::record_contract("pending");
        Ok(contract)
    }

    /// Agree to a pending contract.
    ///
    /// # Errors
    ///
    /// - [`MarketError::NotFound`] if the contract does not exist
    /// - [`MarketError::Authorization`] unless `party` is owner or renter
    /// - [`MarketError::InvalidState`] unless the contract is pending
    pub async fn agree_contract(
        &self,
        party: &Actor,
        contract: ContractId,
    ) -> Result<Contract, MarketError> {
        let store = self.contract_store(contract).await?;
        let agreed = store
            .send(AgreementAction::AgreeContract {
                contract_id: contract,
                party: party.id,
            })
            .await?
            .into_contract()?;
        metrics::record_contract("agreed");
        Ok(agreed)
    }

    /// Mark an agreed contract fulfilled.
    ///
    /// # Errors
    ///
    /// - [`MarketError::NotFound`] if the contract does not exist
    /// - [`MarketError::Authorization`] unless `party` is owner or renter
    /// - [`MarketError::InvalidState`] unless the contract is agreed
    pub async fn complete_contract(
        &self,
        party: &Actor,
        contract: ContractId,
    ) -> Result<Contract, MarketError> {
        let store = self.contract_store(contract).await?;
        let completed = store
            .send(AgreementAction::CompleteContract {
                contract_id: contract,
                party: party.id,
            })
            .await?
            .into_contract()?;
        metrics::record_contract("completed");
        Ok(completed)
    }

    /// Withdraw a pending contract.
    ///
    /// # Errors
    ///
    /// - [`MarketError::Authorization`] without the `contracts` capability
    /// - [`MarketError::NotFound`] if the contract does not exist
    /// - [`MarketError::InvalidState`] unless the contract is pending
    pub async fn expire_contract(
        &self,
        moderator: &Actor,
        contract: ContractId,
    ) -> Result<Contract, MarketError> {
        capability::require(moderator, Capability::Contracts)?;
        let store = self.contract_store(contract).await?;
        let expired = store
            .send(AgreementAction::ExpireContract {
                contract_id: contract,
                moderator: moderator.clone(),
            })
            .await?
            .into_contract()?;
        metrics::record_contract("expired");
        Ok(expired)
    }

    /// Read a contract as one of its parties.
    ///
    /// # Errors
    ///
    /// - [`MarketError::NotFound`] if the contract does not exist
    /// - [`MarketError::Authorization`] unless `actor` is owner or renter
    pub async fn contract(
        &self,
        actor: &Actor,
        contract: ContractId,
    ) -> Result<Contract, MarketError> {
        let store = self.contract_store(contract).await?;
        store
            .state(|book| book.contract_for(actor, contract).cloned())
            .await
    }

    /// Open a dispute on the raiser's latest contract for a listing.
    ///
    /// # Errors
    ///
    /// - [`MarketError::NotFound`] if the listing does not exist
    /// - [`MarketError::Authorization`] if the raiser has no non-expired
    ///   contract on the listing
    /// - [`MarketError::Validation`] for an empty description
    /// - [`MarketError::Conflict`] if the contract already has an open dispute
    #[tracing::instrument(skip(self, raiser, description), fields(raiser = %raiser.id))]
    pub async fn raise_dispute(
        &self,
        raiser: &Actor,
        listing: ListingId,
        description: impl Into<String>,
    ) -> Result<Dispute, MarketError> {
        let store = self.agreement_store(listing).await?;
        let dispute = store
            .send(AgreementAction::RaiseDispute {
                dispute_id: DisputeId::new(),
                raiser: raiser.clone(),
                description: description.into(),
            })
            .await?
            .into_dispute()?;

        self.index.write().await.disputes.insert(dispute.id, listing);
        metrics::record_dispute("open");
        Ok(dispute)
    }

    /// Decide an open dispute.
    ///
    /// # Errors
    ///
    /// - [`MarketError::Authorization`] without the `disputes` capability
    /// - [`MarketError::NotFound`] if the dispute does not exist
    /// - [`MarketError::InvalidState`] unless the dispute is open
    pub async fn resolve_dispute(
        &self,
        moderator: &Actor,
        dispute: DisputeId,
    ) -> Result<Dispute, MarketError> {
        capability::require(moderator, Capability::Disputes)?;
        let store = self.dispute_store(dispute).await?;
        let resolved = store
            .send(AgreementAction::ResolveDispute {
                dispute_id: dispute,
                moderator: moderator.clone(),
            })
            .await?
            .into_dispute()?;
        metrics::record_dispute("resolved");
        Ok(resolved)
    }

    /// Close an open dispute without a decision.
    ///
    /// # Errors
    ///
    /// - [`MarketError::NotFound`] if the dispute does not exist
    /// - [`MarketError::Authorization`] unless `actor` is a party or a
    ///   `disputes` moderator
    /// - [`MarketError::InvalidState`] unless the dispute is open
    pub async fn close_dispute(
        &self,
        actor: &Actor,
        dispute: DisputeId,
    ) -> Result<Dispute, MarketError> {
        let store = self.dispute_store(dispute).await?;
        let closed = store
            .send(AgreementAction::CloseDispute {
                dispute_id: dispute,
                actor: actor.clone(),
            })
            .await?
            .into_dispute()?;
        metrics::record_dispute("closed");
        Ok(closed)
    }

    /// Every dispute raised on a listing, for moderators holding `disputes`.
    ///
    /// # Errors
    ///
    /// - [`MarketError::Authorization`] without the `disputes` capability
    /// - [`MarketError::NotFound`] if the listing does not exist
    pub async fn listing_disputes(
        &self,
        moderator: &Actor,
        listing: ListingId,
    ) -> Result<Vec<Dispute>, MarketError> {
        capability::require(moderator, Capability::Disputes)?;
        let store = self.agreement_store(listing).await?;
        Ok(store
            .state(|book| book.disputes.values().cloned().collect())
            .await)
    }

    // ========================================================================
    // Reports
    // ========================================================================

    /// File an abuse report; a reported user is flagged.
    ///
    /// # Errors
    ///
    /// - [`MarketError::Validation`] for an empty description or a self-report
    /// - [`MarketError::NotFound`] if a reported listing does not exist
    pub async fn file_report(
        &self,
        reporter: &Actor,
        target: ReportTarget,
        description: impl Into<String>,
    ) -> Result<Report, MarketError> {
        if let ReportTarget::Listing(listing) = target {
            self.listing_store(listing).await?;
        }

        let report = self
            .moderation
            .send(ModerationAction::FileReport {
                report_id: ReportId::new(),
                reporter: reporter.clone(),
                target,
                description: description.into(),
            })
            .await?;
        metrics::record_report("filed");

        if let ReportTarget::User(user) = target {
            self.send_trust(user, TrustAction::Flag { report_id: report.id })
                .await?;
        }
        Ok(report)
    }

    /// Resolve an open report.
    ///
    /// # Errors
    ///
    /// - [`MarketError::Authorization`] without the `reports` capability
    /// - [`MarketError::NotFound`] if the report does not exist
    /// - [`MarketError::InvalidState`] if it is already resolved
    pub async fn resolve_report(
        &self,
        moderator: &Actor,
        report: ReportId,
    ) -> Result<Report, MarketError> {
        let resolved = self
            .moderation
            .send(ModerationAction::ResolveReport {
                report_id: report,
                moderator: moderator.clone(),
            })
            .await?;
        metrics::record_report("resolved");
        Ok(resolved)
    }

    /// Reports not yet resolved, for moderators holding `reports`.
    ///
    /// # Errors
    ///
    /// - [`MarketError::Authorization`] without the `reports` capability
    pub async fn open_reports(&self, moderator: &Actor) -> Result<Vec<Report>, MarketError> {
        capability::require(moderator, Capability::Reports)?;
        Ok(self
            .moderation
            .state(|book| book.open_reports().cloned().collect())
            .await)
    }

    // ========================================================================
    // Store lookup
    // ========================================================================

    async fn listing_store(
        &self,
        listing: ListingId,
    ) -> Result<Arc<Store<BookingReducer>>, MarketError> {
        self.listings
            .get(&listing)
            .await
            .ok_or_else(|| MarketError::not_found("listing", listing))
    }

    async fn agreement_store(
        &self,
        listing: ListingId,
    ) -> Result<Arc<Store<AgreementReducer>>, MarketError> {
        self.agreements
            .get(&listing)
            .await
            .ok_or_else(|| MarketError::not_found("listing", listing))
    }

    async fn reservation_store(
        &self,
        reservation: ReservationId,
    ) -> Result<Arc<Store<BookingReducer>>, MarketError> {
        let listing = self.index.read().await.reservations.get(&reservation).copied();
        match listing {
            Some(listing) => self.listing_store(listing).await,
            None => Err(MarketError::not_found("reservation", reservation)),
        }
    }

    async fn contract_store(
        &self,
        contract: ContractId,
    ) -> Result<Arc<Store<AgreementReducer>>, MarketError> {
        let listing = self.index.read().await.contracts.get(&contract).copied();
        match listing {
            Some(listing) => self.agreement_store(listing).await,
            None => Err(MarketError::not_found("contract", contract)),
        }
    }

    async fn dispute_store(
        &self,
        dispute: DisputeId,
    ) -> Result<Arc<Store<AgreementReducer>>, MarketError> {
        let listing = self.index.read().await.disputes.get(&dispute).copied();
        match listing {
            Some(listing) => self.agreement_store(listing).await,
            None => Err(MarketError::not_found("dispute", dispute)),
        }
    }

    async fn review_target(&self, review: ReviewId) -> Result<ReviewTarget, MarketError> {
        self.index
            .read()
            .await
            .reviews
            .get(&review)
            .copied()
            .ok_or_else(|| MarketError::not_found("review", review))
    }

    async fn send_trust(
        &self,
        user: UserId,
        action: TrustAction,
    ) -> Result<TrustOutcome, MarketError> {
        let store = self
            .trust
            .get_or_insert_with(user, || TrustState::new(user))
            .await;
        let outcome = store.send(action).await?;
        if outcome.badge_changed {
            metrics::record_trust_badge(outcome.state.trust_badge);
        }
        Ok(outcome)
    }

    /// Copy a recomputed rating to whoever mirrors it
    async fn propagate_summary(
        &self,
        target: ReviewTarget,
        summary: RatingSummary,
        review: Option<&Review>,
    ) -> Result<(), MarketError> {
        match target {
            ReviewTarget::Listing(listing) => {
                self.listing_store(listing)
                    .await?
                    .send(BookingAction::SyncRating { summary })
                    .await?;
            },
            ReviewTarget::User(user) => {
                if let Some(review) = review {
                    self.send_trust(
                        user,
                        TrustAction::SyncReviews {
                            summary,
                            review: review.clone(),
                        },
                    )
                    .await?;
                }
            },
        }
        Ok(())
    }
}
