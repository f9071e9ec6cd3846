//! Per-user trust aggregate.
//!
//! Holds the trust badge inputs (clean activity start, negative reviews
//! received, completed transactions, abuse flag), the moderator-set identity
//! verification flag and the user's business profile. The badge is a pure function of those inputs and the clock, so
//! evaluating twice without a state change yields the same answer, and a badge
//! is revoked as soon as the user stops qualifying.

use crate::capability::{self, Capability};
use crate::config::TrustPolicy;
use crate::error::MarketError;
use crate::notifications::Notification;
use crate::types::{
    Actor, BusinessProfile, BusinessProfileId, RatingSummary, ReportId, Review, Role, SiteBadge,
    UserId,
};
use chagua_core::environment::Clock;
use chagua_core::reducer::{Reduced, Reducer};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Trust record of one user
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustState {
    /// The user
    pub user: UserId,
    /// Currently holds the badge
    pub trust_badge: bool,
    /// Start of the clean activity window, set on first evaluation
    pub perfect_activity_since: Option<DateTime<Utc>>,
    /// Reported for abuse
    pub flagged: bool,
    /// Identity checked by a `users` moderator
    pub verified: bool,
    /// Reservations completed as renter or owner
    pub completed_transactions: u32,
    /// Reviews with rating ≤ 2 received
    pub negative_reviews: u32,
    /// Version of the last review summary applied
    pub reviews_version: u64,
    /// Business profile, for business accounts
    pub business_profile: Option<BusinessProfile>,
}

impl TrustState {
    /// A user with no history
    #[must_use]
    pub const fn new(user: UserId) -> Self {
        Self {
            user,
            trust_badge: false,
            perfect_activity_since: None,
            flagged: false,
            verified: false,
            completed_transactions: 0,
            negative_reviews: 0,
            reviews_version: 0,
            business_profile: None,
        }
    }

    /// Whether the user qualifies for the badge at `now`
    #[must_use]
    pub fn is_eligible(&self, policy: &TrustPolicy, now: DateTime<Utc>) -> bool {
        let Some(since) = self.perfect_activity_since else {
            return false;
        };
        Duration::try_days(policy.min_clean_days).is_some_and(|window| now - since >= window)
            && self.negative_reviews == 0
            && self.completed_transactions >= policy.min_completed_transactions
            && !self.flagged
    }

    /// Start the clean window if needed and recompute the badge.
    ///
    /// Returns whether the badge changed.
    fn evaluate(&mut self, policy: &TrustPolicy, now: DateTime<Utc>) -> bool {
        if self.perfect_activity_since.is_none() {
            self.perfect_activity_since = Some(now);
        }
        let eligible = self.is_eligible(policy, now);
        let changed = eligible != self.trust_badge;
        self.trust_badge = eligible;
        changed
    }
}

/// Commands accepted by the trust aggregate
#[derive(Clone, Debug)]
pub enum TrustAction {
    /// Recompute the badge
    Evaluate,
    /// Count one more completed reservation
    RecordCompletedTransaction,
    /// Apply the latest review summary for this user
    SyncReviews {
        /// Output of the reputation recompute
        summary: RatingSummary,
        /// The review that triggered the recompute
        review: Review,
    },
    /// Mark the user as reported for abuse
    Flag {
        /// The report that flagged the user
        report_id: ReportId,
    },
    /// Create the business profile
    RegisterBusiness {
        /// Must be this user, with the business role
        actor: Actor,
        /// Id for the new profile
        profile_id: BusinessProfileId,
        /// Registered business name
        business_name: String,
    },
    /// Mark the account identity as checked
    VerifyUser {
        /// Moderator holding the `users` capability
        moderator: Actor,
    },
    /// Award the site visit badge
    VerifySite {
        /// Moderator holding the `users` capability
        moderator: Actor,
        /// Visit notes
        notes: Option<String>,
    },
}

/// Result of a trust command
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrustOutcome {
    /// State after the command
    pub state: TrustState,
    /// Whether the command granted or revoked the badge
    pub badge_changed: bool,
}

impl TrustOutcome {
    /// The business profile after the command.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::Internal`] when the command left no profile.
    pub fn into_business_profile(self) -> Result<BusinessProfile, MarketError> {
        self.state.business_profile.ok_or_else(|| {
            MarketError::Internal("trust store returned no business profile".to_string())
        })
    }
}

/// Dependencies of the trust aggregate
#[derive(Clone)]
pub struct TrustEnvironment {
    /// Clock for the clean activity window
    pub clock: Arc<dyn Clock>,
    /// Badge thresholds
    pub policy: TrustPolicy,
}

impl TrustEnvironment {
    /// Creates a new `TrustEnvironment`
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, policy: TrustPolicy) -> Self {
        Self { clock, policy }
    }
}

/// Reducer for the trust aggregate
#[derive(Clone, Debug, Default)]
pub struct TrustReducer;

impl TrustReducer {
    /// Creates a new `TrustReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn register_business(
        state: &mut TrustState,
        actor: &Actor,
        profile_id: BusinessProfileId,
        business_name: String,
    ) -> Result<(), MarketError> {
        if actor.id != state.user {
            return Err(MarketError::Authorization(
                "a business profile can only be registered by its own user".to_string(),
            ));
        }
        if actor.role != Role::Business {
            return Err(MarketError::Authorization(format!(
                "{} is not a business account",
                actor.username
            )));
        }
        if business_name.trim().is_empty() {
            return Err(MarketError::Validation(
                "business name is required".to_string(),
            ));
        }
        if state.business_profile.is_some() {
            return Err(MarketError::Conflict(format!(
                "{} already has a business profile",
                actor.username
            )));
        }

        state.business_profile = Some(BusinessProfile {
            id: profile_id,
            user: state.user,
            business_name,
            site_badge: SiteBadge::Unverified,
            verification_notes: None,
        });
        tracing::info!(user_id = %state.user, profile_id = %profile_id, "Business profile registered");
        Ok(())
    }

    fn verify_user(state: &mut TrustState, moderator: &Actor) -> Result<(), MarketError> {
        capability::require(moderator, Capability::Users)?;

        if state.verified {
            return Err(MarketError::InvalidState(format!(
                "user {} is already verified",
                state.user
            )));
        }
        state.verified = true;
        tracing::info!(user_id = %state.user, moderator = %moderator.id, "User verified");
        Ok(())
    }

    fn verify_site(
        state: &mut TrustState,
        moderator: &Actor,
        notes: Option<String>,
    ) -> Result<(), MarketError> {
        capability::require(moderator, Capability::Users)?;

        let Some(profile) = state.business_profile.as_mut() else {
            return Err(MarketError::not_found("business profile", state.user));
        };
        if profile.site_badge == SiteBadge::SiteVisitVerified {
            return Err(MarketError::InvalidState(format!(
                "{} is already site visit verified",
                profile.business_name
            )));
        }

        profile.site_badge = SiteBadge::SiteVisitVerified;
        profile.verification_notes = notes;
        tracing::info!(user_id = %state.user, moderator = %moderator.id, "Business site verified");
        Ok(())
    }
}

impl Reducer for TrustReducer {
    type State = TrustState;
    type Action = TrustAction;
    type Environment = TrustEnvironment;
    type Output = TrustOutcome;
    type Error = MarketError;
    type Notification = Notification;

    fn reduce(
        &self,
        state: &mut TrustState,
        action: TrustAction,
        env: &TrustEnvironment,
    ) -> Result<Reduced<TrustOutcome, Notification>, MarketError> {
        let now = env.clock.now();
        let mut notification = None;

        let badge_changed = match action {
            TrustAction::Evaluate => state.evaluate(&env.policy, now),

            TrustAction::RecordCompletedTransaction => {
                state.completed_transactions = state.completed_transactions.saturating_add(1);
                state.evaluate(&env.policy, now)
            },

            TrustAction::SyncReviews { summary, review } => {
                if summary.version > state.reviews_version {
                    state.negative_reviews = summary.negative_count;
                    state.reviews_version = summary.version;
                }
                let changed = state.evaluate(&env.policy, now);
                if changed {
                    notification = Some(Notification::review_recorded(
                        &review,
                        state.user,
                        state.trust_badge,
                    ));
                }
                changed
            },

            TrustAction::Flag { report_id } => {
                state.flagged = true;
                tracing::info!(user_id = %state.user, report_id = %report_id, "User flagged");
                state.evaluate(&env.policy, now)
            },

            TrustAction::RegisterBusiness {
                actor,
                profile_id,
                business_name,
            } => {
                if let Err(error) =
                    Self::register_business(state, &actor, profile_id, business_name)
                {
                    tracing::debug!(user_id = %state.user, %error, "Trust command rejected");
                    return Err(error);
                }
                false
            },

            TrustAction::VerifyUser { moderator } => {
                if let Err(error) = Self::verify_user(state, &moderator) {
                    tracing::debug!(user_id = %state.user, %error, "Trust command rejected");
                    return Err(error);
                }
                false
            },

            TrustAction::VerifySite { moderator, notes } => {
                if let Err(error) = Self::verify_site(state, &moderator, notes) {
                    tracing::debug!(user_id = %state.user, %error, "Trust command rejected");
                    return Err(error);
                }
                false
            },
        };

        if badge_changed {
            tracing::info!(user_id = %state.user, trust_badge = state.trust_badge, "Trust badge changed");
        }

        let reduced = Reduced::new(TrustOutcome {
            state: state.clone(),
            badge_changed,
        });
        Ok(match notification {
            Some(notification) => reduced.publish(notification),
            None => reduced,
        })
    }
}
