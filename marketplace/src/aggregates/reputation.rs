//! Review aggregate: one per review target.
//!
//! Ratings are always recomputed from every stored review (a full rescan),
//! so the aggregate is the exact mean no matter how many times it is
//! recomputed. Each recompute that changes the summary bumps its version;
//! consumers such as the listing aggregate use the version to drop syncs that
//! arrive out of order.
//!
//! Disputes against a review live next to it. A dispute never changes the
//! rating; a `disputes` moderator settles it and it stays resolved.

use crate::capability::{self, Capability};
use crate::error::MarketError;
use crate::notifications::Notification;
use crate::types::{
    Actor, FeedbackTrend, Rating, RatingSummary, Review, ReviewDispute, ReviewDisputeId,
    ReviewDisputeStatus, ReviewId, ReviewTarget, UserId,
};
use chagua_core::environment::Clock;
use chagua_core::reducer::{Reduced, Reducer};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Reviews about a single target, plus the derived rating
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReviewTargetState {
    /// What is being reviewed
    pub target: ReviewTarget,
    /// Reviews in the order they were written
    pub reviews: Vec<Review>,
    /// Derived rating
    pub summary: RatingSummary,
    /// Disputes filed against these reviews
    pub disputes: BTreeMap<ReviewDisputeId, ReviewDispute>,
}

impl ReviewTargetState {
    /// An unreviewed target
    #[must_use]
    pub const fn new(target: ReviewTarget) -> Self {
        Self {
            target,
            reviews: Vec::new(),
            summary: RatingSummary {
                rating: 0.0,
                review_count: 0,
                negative_count: 0,
                version: 0,
            },
            disputes: BTreeMap::new(),
        }
    }

    /// Disputes not yet resolved, oldest id order
    pub fn open_disputes(&self) -> impl Iterator<Item = &ReviewDispute> {
        self.disputes
            .values()
            .filter(|d| d.status == ReviewDisputeStatus::Open)
    }

    /// Average rating per civil date, oldest first
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn feedback_trend(&self) -> FeedbackTrend {
        let mut days: BTreeMap<NaiveDate, (u32, u32)> = BTreeMap::new();
        for review in &self.reviews {
            let (sum, count) = days.entry(review.created_at.date_naive()).or_default();
            *sum += u32::from(review.rating.stars());
            *count += 1;
        }
        days.into_iter()
            .map(|(day, (sum, count))| (day, f64::from(sum) / f64::from(count)))
            .collect()
    }

    /// Whether `reviewer` already reviewed this target
    #[must_use]
    pub fn has_review_by(&self, reviewer: UserId) -> bool {
        self.reviews.iter().any(|r| r.reviewer == reviewer)
    }

    /// Full rescan of every stored review
    #[must_use]
    fn rescan(&self) -> (f64, u32, u32) {
        let count = u32::try_from(self.reviews.len()).unwrap_or(u32::MAX);
        if count == 0 {
            return (0.0, 0, 0);
        }
        let total: u32 = self
            .reviews
            .iter()
            .map(|r| u32::from(r.rating.stars()))
            .sum();
        let negative = u32::try_from(self.reviews.iter().filter(|r| r.is_negative).count())
            .unwrap_or(u32::MAX);
        (f64::from(total) / f64::from(count), count, negative)
    }

    /// Recompute the summary; returns whether it changed
    fn recompute(&mut self) -> bool {
        let (rating, review_count, negative_count) = self.rescan();
        let changed = (rating - self.summary.rating).abs() > f64::EPSILON
            || review_count != self.summary.review_count
            || negative_count != self.summary.negative_count;
        if changed {
            self.summary = RatingSummary {
                rating,
                review_count,
                negative_count,
                version: self.summary.version + 1,
            };
        }
        changed
    }
}

/// Commands accepted by the review aggregate
#[derive(Clone, Debug)]
pub enum ReputationAction {
    /// Store a review and recompute the rating
    RecordReview {
        /// Id for the new review
        review_id: ReviewId,
        /// Author
        reviewer: Actor,
        /// Stars given
        rating: Rating,
        /// Free text
        comment: String,
        /// Hide the author's name
        anonymous: bool,
    },
    /// Rescan all reviews
    Recompute,
    /// Add a like to a review
    LikeReview {
        /// Review to like
        review_id: ReviewId,
    },
    /// Object to a review
    DisputeReview {
        /// Id for the new dispute
        dispute_id: ReviewDisputeId,
        /// Contested review
        review_id: ReviewId,
        /// Who objects
        user: Actor,
        /// Why
        reason: String,
    },
    /// Settle an open review dispute
    ResolveReviewDispute {
        /// Dispute to resolve
        dispute_id: ReviewDisputeId,
        /// Moderator holding the `disputes` capability
        moderator: Actor,
    },
}

/// Result of a review command
#[derive(Clone, Debug, PartialEq)]
pub struct ReputationOutcome {
    /// The review created or liked, if any
    pub review: Option<Review>,
    /// The review dispute filed or resolved, if any
    pub dispute: Option<ReviewDispute>,
    /// Summary after the command
    pub summary: RatingSummary,
}

impl ReputationOutcome {
    /// The review carried by this outcome.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::Internal`] when the command produced no review.
    pub fn into_review(self) -> Result<Review, MarketError> {
        self.review.ok_or_else(|| {
            MarketError::Internal("review store returned no review".to_string())
        })
    }

    /// The review dispute carried by this outcome.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::Internal`] when the command produced no dispute.
    pub fn into_dispute(self) -> Result<ReviewDispute, MarketError> {
        self.dispute.ok_or_else(|| {
            MarketError::Internal("review store returned no review dispute".to_string())
        })
    }
}

/// Dependencies of the review aggregate
#[derive(Clone)]
pub struct ReputationEnvironment {
    /// Timestamps for new reviews
    pub clock: Arc<dyn Clock>,
}

impl ReputationEnvironment {
    /// Creates a new `ReputationEnvironment`
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

/// Reducer for the review aggregate
#[derive(Clone, Debug, Default)]
pub struct ReputationReducer;

impl ReputationReducer {
    /// Creates a new `ReputationReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn record(
        state: &mut ReviewTargetState,
        review_id: ReviewId,
        reviewer: &Actor,
        rating: Rating,
        comment: String,
        anonymous: bool,
        env: &ReputationEnvironment,
    ) -> Result<ReputationOutcome, MarketError> {
        if state.target == ReviewTarget::User(reviewer.id) {
            return Err(MarketError::Validation(
                "users cannot review themselves".to_string(),
            ));
        }
        if state.has_review_by(reviewer.id) {
            return Err(MarketError::Conflict(format!(
                "{} already reviewed {}",
                reviewer.username, state.target
            )));
        }

        let review = Review {
            id: review_id,
            reviewer: reviewer.id,
            reviewer_name: reviewer.username.clone(),
            target: state.target,
            rating,
            comment,
            anonymous,
            is_negative: rating.is_negative(),
            likes: 0,
            created_at: env.clock.now(),
        };
        state.reviews.push(review.clone());
        state.recompute();

        tracing::info!(
            review_id = %review_id,
            review_target = %state.target,
            rating = rating.stars(),
            average = state.summary.rating,
            "Review recorded"
        );

        Ok(ReputationOutcome {
            review: Some(review),
            dispute: None,
            summary: state.summary,
        })
    }

    fn like(
        state: &mut ReviewTargetState,
        review_id: ReviewId,
    ) -> Result<ReputationOutcome, MarketError> {
        let Some(review) = state.reviews.iter_mut().find(|r| r.id == review_id) else {
            return Err(MarketError::not_found("review", review_id));
        };
        review.likes = review.likes.saturating_add(1);
        Ok(ReputationOutcome {
            review: Some(review.clone()),
            dispute: None,
            summary: state.summary,
        })
    }

    fn dispute(
        state: &mut ReviewTargetState,
        dispute_id: ReviewDisputeId,
        review_id: ReviewId,
        user: &Actor,
        reason: String,
        env: &ReputationEnvironment,
    ) -> Result<ReputationOutcome, MarketError> {
        if reason.trim().is_empty() {
            return Err(MarketError::Validation(
                "a reason is required to dispute a review".to_string(),
            ));
        }
        if !state.reviews.iter().any(|r| r.id == review_id) {
            return Err(MarketError::not_found("review", review_id));
        }
        if state
            .open_disputes()
            .any(|d| d.review == review_id && d.user == user.id)
        {
            return Err(MarketError::Conflict(format!(
                "{} already has an open dispute on review {review_id}",
                user.username
            )));
        }

        let dispute = ReviewDispute {
            id: dispute_id,
            review: review_id,
            user: user.id,
            reason,
            status: ReviewDisputeStatus::Open,
            created_at: env.clock.now(),
            resolved_by: None,
        };
        state.disputes.insert(dispute_id, dispute.clone());

        tracing::info!(
            dispute_id = %dispute_id,
            review_id = %review_id,
            review_target = %state.target,
            "Review disputed"
        );
        Ok(ReputationOutcome {
            review: None,
            dispute: Some(dispute),
            summary: state.summary,
        })
    }

    fn resolve_dispute(
        state: &mut ReviewTargetState,
        dispute_id: ReviewDisputeId,
        moderator: &Actor,
    ) -> Result<ReputationOutcome, MarketError> {
        capability::require(moderator, Capability::Disputes)?;

        let Some(dispute) = state.disputes.get_mut(&dispute_id) else {
            return Err(MarketError::not_found("review dispute", dispute_id));
        };
        if dispute.status != ReviewDisputeStatus::Open {
            return Err(MarketError::InvalidState(format!(
                "review dispute {dispute_id} is already {}",
                dispute.status
            )));
        }
        dispute.status = ReviewDisputeStatus::Resolved;
        dispute.resolved_by = Some(moderator.id);
        let dispute = dispute.clone();

        tracing::info!(dispute_id = %dispute_id, moderator = %moderator.id, "Review dispute resolved");
        Ok(ReputationOutcome {
            review: None,
            dispute: Some(dispute),
            summary: state.summary,
        })
    }
}

impl Reducer for ReputationReducer {
    type State = ReviewTargetState;
    type Action = ReputationAction;
    type Environment = ReputationEnvironment;
    type Output = ReputationOutcome;
    type Error = MarketError;
    type Notification = Notification;

    fn reduce(
        &self,
        state: &mut ReviewTargetState,
        action: ReputationAction,
        env: &ReputationEnvironment,
    ) -> Result<Reduced<ReputationOutcome, Notification>, MarketError> {
        let result = match action {
            ReputationAction::RecordReview {
                review_id,
                reviewer,
                rating,
                comment,
                anonymous,
            } => Self::record(state, review_id, &reviewer, rating, comment, anonymous, env),

            ReputationAction::Recompute => {
                if state.recompute() {
                    tracing::warn!(review_target = %state.target, "Recompute corrected a drifted rating");
                }
                Ok(ReputationOutcome {
                    review: None,
                    dispute: None,
                    summary: state.summary,
                })
            },

            ReputationAction::LikeReview { review_id } => Self::like(state, review_id),

            ReputationAction::DisputeReview {
                dispute_id,
                review_id,
                user,
                reason,
            } => Self::dispute(state, dispute_id, review_id, &user, reason, env),

            ReputationAction::ResolveReviewDispute {
                dispute_id,
                moderator,
            } => Self::resolve_dispute(state, dispute_id, &moderator),
        };

        match result {
            Ok(outcome) => Ok(Reduced::new(outcome)),
            Err(error) => {
                tracing::debug!(review_target = %state.target, %error, "Review command rejected");
                Err(error)
            },
        }
    }
}
