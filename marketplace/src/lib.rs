//! Chagua marketplace engines.
//!
//! The core of a multi-tenant rental marketplace, built on the reducer/store
//! runtime from `chagua-core` and `chagua-runtime`:
//!
//! - **Availability and reservations**: a per-listing calendar of booked civil
//!   dates; booking checks and marks days under the listing's lock, so two
//!   overlapping requests can never both succeed
//! - **Pricing**: base price times ordered rule multipliers, times a real-valued
//!   duration with a one-day floor
//! - **Reputation**: reviews per target with a full-rescan exact mean, review
//!   disputes, and a trust badge per user
//! - **Agreements and moderation**: contracts, disputes and abuse reports,
//!   with moderator actions gated by a typed capability set
//! - **Notifications**: published after commit, never failing the operation
//!
//! # Architecture
//!
//! ```text
//!   Marketplace (app)
//!        │
//!        ├── StoreMap<ListingId, BookingReducer>        calendar, reservations, queue
//!        ├── StoreMap<ReviewTarget, ReputationReducer>  reviews, rating summary, review disputes
//!        ├── StoreMap<UserId, TrustReducer>             trust badge, verification, business profile
//!        ├── StoreMap<ListingId, AgreementReducer>      contracts, disputes
//!        └── Store<ModerationReducer>                   reports
//!                          │
//!                          ▼
//!                 Notifier<Notification>
//! ```
//!
//! # Usage
//!
//! ```ignore
//! let market = Marketplace::new(Config::from_env(), Arc::new(SystemClock), notifier);
//! let listing = market.create_listing(&owner, new_listing).await?;
//! let reservation = market.request_booking(&renter, listing.id, start, end).await?;
//! market.confirm_payment(reservation.id, "M-PESA QJK81XZ").await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod aggregates;
pub mod app;
pub mod calendar;
pub mod capability;
pub mod config;
pub mod currency;
pub mod error;
pub mod metrics;
pub mod notifications;
pub mod pricing;
pub mod types;

pub use app::Marketplace;
pub use capability::{has_capability, Capability, CapabilitySet};
pub use config::Config;
pub use error::{ErrorKind, MarketError};
pub use notifications::{Notification, NotificationKind};
pub use types::*;
