//! Domain types for the Chagua marketplace.
//!
//! This module contains the identifiers, value objects and entities shared by
//! the reservation, reputation, trust, agreement and moderation aggregates.

use crate::capability::CapabilitySet;
use crate::error::MarketError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            #[doc = concat!("Creates a new random `", stringify!($name), "`")]
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            #[doc = concat!("Create a `", stringify!($name), "` from a `Uuid`")]
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id!(
    /// Unique identifier for a user account
    UserId
);
define_id!(
    /// Unique identifier for a listing
    ListingId
);
define_id!(
    /// Unique identifier for a reservation
    ReservationId
);
define_id!(
    /// Unique identifier for a booking queue entry
    QueueEntryId
);
define_id!(
    /// Unique identifier for a review
    ReviewId
);
define_id!(
    /// Unique identifier for a dispute against a review
    ReviewDisputeId
);
define_id!(
    /// Unique identifier for a rental contract
    ContractId
);
define_id!(
    /// Unique identifier for a dispute
    DisputeId
);
define_id!(
    /// Unique identifier for an abuse report
    ReportId
);
define_id!(
    /// Unique identifier for a comment (owned by the social layer)
    CommentId
);
define_id!(
    /// Unique identifier for a business profile
    BusinessProfileId
);

// ============================================================================
// Money and Currency
// ============================================================================

/// Represents money in minor units (cents) to avoid floating-point drift
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money(u64);

impl Money {
    /// Creates a `Money` value from cents
    #[must_use]
    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    /// Rounds a real-valued cent amount to the nearest cent.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::Validation`] when the amount is negative, not
    /// finite, or does not fit in the representable range.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    pub fn from_cents_f64(cents: f64) -> Result<Self, MarketError> {
        let rounded = cents.round();
        if !rounded.is_finite() || rounded < 0.0 || rounded >= u64::MAX as f64 {
            return Err(MarketError::Validation(format!(
                "amount {cents} cents is out of range"
            )));
        }
        Ok(Self(rounded as u64))
    }

    /// Returns the amount in cents
    #[must_use]
    pub const fn cents(&self) -> u64 {
        self.0
    }

    /// Returns the amount as a real number of cents, for rate arithmetic
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub const fn as_f64_cents(&self) -> f64 {
        self.0 as f64
    }

    /// Adds two money amounts with overflow checking
    #[must_use]
    pub const fn checked_add(self, other: Self) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(result) => Some(Self(result)),
            None => None,
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

/// ISO-4217 style currency code, always three upper-case ASCII letters
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    /// Parses a currency code, normalising to upper case.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::Validation`] unless the code is three ASCII letters.
    pub fn new(code: &str) -> Result<Self, MarketError> {
        let code = code.trim();
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(MarketError::Validation(format!(
                "'{code}' is not a three-letter currency code"
            )));
        }
        Ok(Self(code.to_ascii_uppercase()))
    }

    /// US dollars, the marketplace default
    #[must_use]
    pub fn usd() -> Self {
        Self("USD".to_string())
    }

    /// The code as a string slice
    #[must_use]
    pub fn code(&self) -> &str {
        &self.0
    }
}

impl Default for Currency {
    fn default() -> Self {
        Self::usd()
    }
}

impl TryFrom<String> for Currency {
    type Error = MarketError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<Currency> for String {
    fn from(value: Currency) -> Self {
        value.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Identity
// ============================================================================

/// Account role
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Private person
    #[default]
    Individual,
    /// Registered business
    Business,
}

/// The authenticated caller of an operation.
///
/// Provided by the identity layer and trusted as given.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Account id
    pub id: UserId,
    /// Display name
    pub username: String,
    /// Account role
    pub role: Role,
    /// Premium subscription flag
    pub is_premium: bool,
    /// Moderation capabilities granted to this account
    pub capabilities: CapabilitySet,
}

impl Actor {
    /// An individual account without moderation capabilities
    #[must_use]
    pub fn individual(id: UserId, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            role: Role::Individual,
            is_premium: false,
            capabilities: CapabilitySet::none(),
        }
    }

    /// Replace the role
    #[must_use]
    pub const fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    /// Replace the capability set
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: CapabilitySet) -> Self {
        self.capabilities = capabilities;
        self
    }
}

// ============================================================================
// Listings and Reservations
// ============================================================================

/// Condition under which a pricing rule applies
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleCondition {
    /// The reservation starts on a Saturday or Sunday (UTC)
    Weekend,
}

/// A named condition with a price multiplier
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PricingRule {
    /// When the rule applies
    pub condition: RuleCondition,
    /// Factor applied to the running price
    pub multiplier: f64,
}

impl PricingRule {
    /// Builds a rule, rejecting multipliers that are not finite and positive.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::Validation`] for a non-finite or non-positive multiplier.
    pub fn new(condition: RuleCondition, multiplier: f64) -> Result<Self, MarketError> {
        let rule = Self {
            condition,
            multiplier,
        };
        rule.validate()?;
        Ok(rule)
    }

    /// Checks the multiplier of a rule that may have been deserialized
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::Validation`] for a non-finite or non-positive multiplier.
    pub fn validate(&self) -> Result<(), MarketError> {
        if self.multiplier.is_finite() && self.multiplier > 0.0 {
            Ok(())
        } else {
            Err(MarketError::Validation(format!(
                "pricing multiplier must be finite and positive, got {}",
                self.multiplier
            )))
        }
    }
}

/// A rentable item or service
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    /// Listing id
    pub id: ListingId,
    /// Owner of the listing
    pub owner: UserId,
    /// Title shown to renters
    pub title: String,
    /// Price per day before rules
    pub base_price: Money,
    /// Currency of `base_price`
    pub currency: Currency,
    /// Ordered multiplier rules
    pub pricing_rules: Vec<PricingRule>,
    /// Mean review rating, 0.0 when unreviewed
    pub rating: f64,
    /// Number of reviews behind `rating`
    pub review_count: u32,
    /// Number of detail page views
    pub view_count: u64,
    /// Set by a rentals moderator after an on-site visit
    pub verified: bool,
    /// When the listing was created
    pub created_at: DateTime<Utc>,
}

/// Input for creating a listing
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewListing {
    /// Title shown to renters
    pub title: String,
    /// Price per day before rules
    pub base_price: Money,
    /// Currency of `base_price`
    pub currency: Currency,
    /// Ordered multiplier rules
    pub pricing_rules: Vec<PricingRule>,
}

/// Reservation lifecycle: `Pending → Confirmed → Completed`, `Pending → Canceled`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    /// Created, days held, awaiting offline payment
    Pending,
    /// Payment proof recorded
    Confirmed,
    /// Rental period finished
    Completed,
    /// Withdrawn before payment
    Canceled,
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Completed => "completed",
            Self::Canceled => "canceled",
        };
        f.write_str(name)
    }
}

/// A renter's claim on a listing for a time range
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    /// Reservation id
    pub id: ReservationId,
    /// Who booked
    pub renter: UserId,
    /// What was booked
    pub listing: ListingId,
    /// Inclusive start
    pub start: DateTime<Utc>,
    /// Exclusive end
    pub end: DateTime<Utc>,
    /// Priced total
    pub total_cost: Money,
    /// Currency of `total_cost`
    pub currency: Currency,
    /// Lifecycle status
    pub status: ReservationStatus,
    /// Reference to the offline payment, once confirmed
    pub payment_proof: Option<String>,
    /// Payments moderator who checked the proof
    pub payment_approved_by: Option<UserId>,
    /// When the reservation was created
    pub created_at: DateTime<Utc>,
}

/// A request waiting for a contested slot. FIFO by `created_at`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingQueueEntry {
    /// Entry id
    pub id: QueueEntryId,
    /// Who is waiting
    pub requester: UserId,
    /// Listing waited on
    pub listing: ListingId,
    /// Requested start
    pub start: DateTime<Utc>,
    /// Requested end
    pub end: DateTime<Utc>,
    /// When the entry was queued
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Reviews and Trust
// ============================================================================

/// What a review or rating aggregate is about
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum ReviewTarget {
    /// A listing
    Listing(ListingId),
    /// A user
    User(UserId),
}

impl fmt::Display for ReviewTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Listing(id) => write!(f, "listing:{id}"),
            Self::User(id) => write!(f, "user:{id}"),
        }
    }
}

/// Star rating between 1 and 5 inclusive
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Rating(u8);

impl Rating {
    /// Lowest accepted rating
    pub const MIN: u8 = 1;
    /// Highest accepted rating
    pub const MAX: u8 = 5;

    /// Validates a raw star count.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::Validation`] outside `1..=5`.
    pub fn new(stars: u8) -> Result<Self, MarketError> {
        if (Self::MIN..=Self::MAX).contains(&stars) {
            Ok(Self(stars))
        } else {
            Err(MarketError::Validation(format!(
                "rating must be between {} and {}, got {stars}",
                Self::MIN,
                Self::MAX
            )))
        }
    }

    /// The star count
    #[must_use]
    pub const fn stars(self) -> u8 {
        self.0
    }

    /// Ratings of two stars or fewer count against the target
    #[must_use]
    pub const fn is_negative(self) -> bool {
        self.0 <= 2
    }
}

impl TryFrom<u8> for Rating {
    type Error = MarketError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Rating> for u8 {
    fn from(value: Rating) -> Self {
        value.0
    }
}

/// A review left by one user about a listing or another user
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    /// Review id
    pub id: ReviewId,
    /// Author
    pub reviewer: UserId,
    /// Author display name at the time of writing
    pub reviewer_name: String,
    /// Subject of the review
    pub target: ReviewTarget,
    /// Stars given
    pub rating: Rating,
    /// Free text
    pub comment: String,
    /// Hide the author's name
    pub anonymous: bool,
    /// `rating <= 2`
    pub is_negative: bool,
    /// Number of likes
    pub likes: u32,
    /// When the review was written
    pub created_at: DateTime<Utc>,
}

impl Review {
    /// Name to show next to the review
    #[must_use]
    pub fn display_name(&self) -> &str {
        if self.anonymous {
            "Anonymous"
        } else {
            &self.reviewer_name
        }
    }
}

/// Review dispute lifecycle: `Open → Resolved`, terminal
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDisputeStatus {
    /// Awaiting a moderator
    Open,
    /// Settled by a moderator
    Resolved,
}

impl fmt::Display for ReviewDisputeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Open => "open",
            Self::Resolved => "resolved",
        })
    }
}

/// A user's objection to a published review
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewDispute {
    /// Dispute id
    pub id: ReviewDisputeId,
    /// Contested review
    pub review: ReviewId,
    /// Who objected
    pub user: UserId,
    /// Why the review is wrong
    pub reason: String,
    /// Lifecycle status
    pub status: ReviewDisputeStatus,
    /// When it was filed
    pub created_at: DateTime<Utc>,
    /// Moderator who resolved it
    pub resolved_by: Option<UserId>,
}

/// Aggregate rating of a review target
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RatingSummary {
    /// Exact mean of all ratings, 0.0 without reviews
    pub rating: f64,
    /// Number of reviews
    pub review_count: u32,
    /// Reviews with `rating <= 2`
    pub negative_count: u32,
    /// Monotonic recompute counter, used to discard stale syncs
    pub version: u64,
}

/// Average rating per civil date, oldest first
pub type FeedbackTrend = BTreeMap<NaiveDate, f64>;

// ============================================================================
// Contracts and Disputes
// ============================================================================

/// Default emergency clause attached to new contracts
pub const DEFAULT_EMERGENCY_CLAUSE: &str =
    "In case of emergency, 10% of the total cost will be charged.";

/// Contract lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractStatus {
    /// Drafted by the renter, awaiting agreement
    Pending,
    /// Agreed by a party
    Agreed,
    /// Fulfilled
    Completed,
    /// Under dispute
    Disputed,
    /// Withdrawn by a moderator before agreement
    Expired,
}

impl fmt::Display for ContractStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Agreed => "agreed",
            Self::Completed => "completed",
            Self::Disputed => "disputed",
            Self::Expired => "expired",
        };
        f.write_str(name)
    }
}

/// A rental agreement between a listing owner and a renter
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    /// Contract id
    pub id: ContractId,
    /// Listing the contract covers
    pub listing: ListingId,
    /// Listing owner
    pub owner: UserId,
    /// Renter
    pub renter: UserId,
    /// Main terms
    pub terms: String,
    /// Additional named terms
    pub custom_terms: BTreeMap<String, String>,
    /// Emergency clause
    pub emergency_clause: String,
    /// Lifecycle status
    pub status: ContractStatus,
    /// When the contract was drafted
    pub created_at: DateTime<Utc>,
    /// When the contract was agreed
    pub agreed_at: Option<DateTime<Utc>>,
}

impl Contract {
    /// Whether the user is owner or renter
    #[must_use]
    pub fn is_party(&self, user: UserId) -> bool {
        self.owner == user || self.renter == user
    }

    /// The other party, if `user` is a party
    #[must_use]
    pub fn counterparty(&self, user: UserId) -> Option<UserId> {
        if user == self.owner {
            Some(self.renter)
        } else if user == self.renter {
            Some(self.owner)
        } else {
            None
        }
    }
}

/// Dispute lifecycle: `Open → Resolved` or `Open → Closed`, both terminal
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeStatus {
    /// Awaiting a decision
    Open,
    /// Decided by a moderator
    Resolved,
    /// Withdrawn or closed without decision
    Closed,
}

impl fmt::Display for DisputeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Open => "open",
            Self::Resolved => "resolved",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// A disagreement raised against a contract
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dispute {
    /// Dispute id
    pub id: DisputeId,
    /// Contested contract
    pub contract: ContractId,
    /// Who raised it
    pub raised_by: UserId,
    /// What happened
    pub description: String,
    /// Lifecycle status
    pub status: DisputeStatus,
    /// When it was raised
    pub created_at: DateTime<Utc>,
    /// Who resolved or closed it
    pub settled_by: Option<UserId>,
    /// When it was resolved or closed
    pub settled_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Reports and Business Profiles
// ============================================================================

/// What an abuse report is about
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum ReportTarget {
    /// A user account
    User(UserId),
    /// A listing
    Listing(ListingId),
    /// A comment
    Comment(CommentId),
}

/// A moderation flag
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    /// Report id
    pub id: ReportId,
    /// Who filed it
    pub reporter: UserId,
    /// What it is about
    pub target: ReportTarget,
    /// Why it was filed
    pub description: String,
    /// Terminal once set
    pub resolved: bool,
    /// When it was filed
    pub created_at: DateTime<Utc>,
    /// Moderator who resolved it
    pub resolved_by: Option<UserId>,
}

/// Verification level of a business
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SiteBadge {
    /// No visit yet
    #[default]
    Unverified,
    /// A moderator visited the premises
    SiteVisitVerified,
}

/// Business details of a user with the business role
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessProfile {
    /// Profile id
    pub id: BusinessProfileId,
    /// Owning user
    pub user: UserId,
    /// Registered business name
    pub business_name: String,
    /// Verification badge
    pub site_badge: SiteBadge,
    /// Notes left by the verifying moderator
    pub verification_notes: Option<String>,
}
