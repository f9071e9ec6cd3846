//! Moderation capabilities.
//!
//! A moderator holds a set of administrative categories, or the wildcard
//! `all`. Accounts store the set as a JSON object of boolean flags
//! (`{"disputes": true, "reports": false}`); [`CapabilitySet::from_flags_json`]
//! turns that into the typed set.

use crate::error::MarketError;
use crate::types::Actor;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Administrative category a moderator may act on
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// User verification and business site badges
    Users,
    /// Listing verification
    Rentals,
    /// Payment approval
    Payments,
    /// Dispute resolution
    Disputes,
    /// Contract administration
    Contracts,
    /// Abuse report handling
    Reports,
}

impl Capability {
    /// Every category
    pub const ALL: [Self; 6] = [
        Self::Users,
        Self::Rentals,
        Self::Payments,
        Self::Disputes,
        Self::Contracts,
        Self::Reports,
    ];

    /// Flag name used in the stored JSON object
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Rentals => "rentals",
            Self::Payments => "payments",
            Self::Disputes => "disputes",
            Self::Contracts => "contracts",
            Self::Reports => "reports",
        }
    }

    fn from_flag(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The categories granted to one account
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySet {
    all: bool,
    granted: BTreeSet<Capability>,
}

impl CapabilitySet {
    /// No capabilities
    #[must_use]
    pub const fn none() -> Self {
        Self {
            all: false,
            granted: BTreeSet::new(),
        }
    }

    /// The wildcard: every category, including ones added later
    #[must_use]
    pub const fn all() -> Self {
        Self {
            all: true,
            granted: BTreeSet::new(),
        }
    }

    /// A set with exactly the given categories
    #[must_use]
    pub fn of(capabilities: impl IntoIterator<Item = Capability>) -> Self {
        Self {
            all: false,
            granted: capabilities.into_iter().collect(),
        }
    }

    /// Parse the stored flag object.
    ///
    /// Unknown keys are ignored; `false` flags grant nothing.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::Validation`] if the text is not a JSON object of
    /// booleans.
    pub fn from_flags_json(json: &str) -> Result<Self, MarketError> {
        let flags: serde_json::Map<String, serde_json::Value> = serde_json::from_str(json)
            .map_err(|e| MarketError::Validation(format!("invalid capability flags: {e}")))?;

        let mut set = Self::none();
        for (name, value) in flags {
            let Some(enabled) = value.as_bool() else {
                return Err(MarketError::Validation(format!(
                    "capability flag '{name}' must be a boolean"
                )));
            };
            if !enabled {
                continue;
            }
            if name == "all" {
                set.all = true;
            } else if let Some(capability) = Capability::from_flag(&name) {
                set.granted.insert(capability);
            } else {
                tracing::debug!(flag = %name, "Ignoring unknown capability flag");
            }
        }
        Ok(set)
    }

    /// `all || granted(capability)`
    #[must_use]
    pub fn has(&self, capability: Capability) -> bool {
        self.all || self.granted.contains(&capability)
    }

    /// Whether the set grants anything at all
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.all && self.granted.is_empty()
    }
}

/// Whether the actor may act on the given category
#[must_use]
pub fn has_capability(actor: &Actor, capability: Capability) -> bool {
    actor.capabilities.has(capability)
}

/// Gate an operation on a capability.
///
/// # Errors
///
/// Returns [`MarketError::Authorization`] when the actor lacks `capability`.
pub fn require(actor: &Actor, capability: Capability) -> Result<(), MarketError> {
    if has_capability(actor, capability) {
        Ok(())
    } else {
        Err(MarketError::Authorization(format!(
            "{} lacks the '{capability}' capability",
            actor.username
        )))
    }
}
