//! Aggregates of the marketplace.
//!
//! Each aggregate is a state value plus a reducer, run inside its own
//! [`chagua_runtime::Store`]:
//!
//! - [`booking`]: one per listing (calendar, reservations, queue)
//! - [`reputation`]: one per review target (reviews, derived rating)
//! - [`trust`]: one per user (trust badge inputs, business profile)
//! - [`agreements`]: one per listing (contracts, disputes)
//! - [`moderation`]: a single report book

pub mod agreements;
pub mod booking;
pub mod moderation;
pub mod reputation;
pub mod trust;

pub use agreements::{
    AgreementAction, AgreementBook, AgreementEnvironment, AgreementOutput, AgreementReducer,
};
pub use booking::{
    BookingAction, BookingEnvironment, BookingOutput, BookingReducer, ListingState,
};
pub use moderation::{ModerationAction, ModerationEnvironment, ModerationReducer, ReportBook};
pub use reputation::{
    ReputationAction, ReputationEnvironment, ReputationOutcome, ReputationReducer,
    ReviewTargetState,
};
pub use trust::{TrustAction, TrustEnvironment, TrustOutcome, TrustReducer, TrustState};
