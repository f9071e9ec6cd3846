//! Error types for the marketplace engines.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Broad category of a [`MarketError`], for callers that branch on it
/// (for example a web layer choosing a status code).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed or out-of-range input
    Validation,
    /// The request collides with existing state
    Conflict,
    /// The actor may not perform the operation
    Authorization,
    /// A referenced entity does not exist
    NotFound,
    /// The entity is not in a state that allows the transition
    InvalidState,
    /// A broken engine invariant; never caused by caller input
    Internal,
}

/// Errors returned by marketplace operations.
///
/// No operation applies any of its changes when it returns one of these.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarketError {
    /// Malformed or out-of-range input
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Requested days are already booked
    #[error("Booking conflict on {}", format_days(.days))]
    BookingConflict {
        /// The covered days that are already booked, ascending
        days: Vec<NaiveDate>,
    },

    /// Any other uniqueness collision
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The actor lacks the capability or relationship required
    #[error("Not authorized: {0}")]
    Authorization(String),

    /// A referenced entity does not exist
    #[error("{entity} {id} not found")]
    NotFound {
        /// Entity kind, e.g. "listing"
        entity: &'static str,
        /// Identifier that was looked up
        id: String,
    },

    /// Transition not allowed from the current status
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Broken engine invariant
    #[error("Internal error: {0}")]
    Internal(String),
}

impl MarketError {
    /// Shorthand for [`MarketError::NotFound`]
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Category of this error
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::BookingConflict { .. } | Self::Conflict(_) => ErrorKind::Conflict,
            Self::Authorization(_) => ErrorKind::Authorization,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::InvalidState(_) => ErrorKind::InvalidState,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }
}

fn format_days(days: &[NaiveDate]) -> String {
    days.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
