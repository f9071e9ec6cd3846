//! Pricing evaluator.
//!
//! The unit price is the listing's base price with every matching rule's
//! multiplier applied in insertion order. The total is the unit price times
//! the real-valued duration in days, floored at one day. Both the unit price
//! and the total are rounded to the nearest cent.

use crate::error::MarketError;
use crate::types::{Currency, Listing, Money, PricingRule, RuleCondition};
use chrono::{DateTime, Datelike, Utc, Weekday};
use serde::{Deserialize, Serialize};

const SECONDS_PER_DAY: f64 = 86_400.0;

impl RuleCondition {
    /// Whether the condition holds for a reservation starting at `start`
    #[must_use]
    pub fn matches(self, start: DateTime<Utc>) -> bool {
        match self {
            Self::Weekend => matches!(start.weekday(), Weekday::Sat | Weekday::Sun),
        }
    }
}

/// A priced interval
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    /// Price per day after rules
    pub unit_price: Money,
    /// Real-valued duration, at least 1.0
    pub days: f64,
    /// `unit_price * days`, rounded to the cent
    pub total: Money,
    /// Currency of both amounts
    pub currency: Currency,
}

/// Unit price for a reservation starting at `start`.
///
/// `base_currency` only labels the amount; rules never convert currency.
///
/// # Errors
///
/// Returns [`MarketError::Validation`] when a rule multiplier is not finite
/// and positive, or the result leaves the representable range.
pub fn price(
    base_price: Money,
    _base_currency: &Currency,
    rules: &[PricingRule],
    start: DateTime<Utc>,
) -> Result<Money, MarketError> {
    let mut running = base_price.as_f64_cents();
    for rule in rules {
        rule.validate()?;
        if rule.condition.matches(start) {
            running *= rule.multiplier;
        }
    }
    Money::from_cents_f64(running)
}

/// Length of `[start, end)` in days, never less than one
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn duration_in_days(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    let seconds = (end - start).num_milliseconds() as f64 / 1000.0;
    (seconds / SECONDS_PER_DAY).max(1.0)
}

/// Total cost of renting `listing` over `[start, end)`.
///
/// # Errors
///
/// See [`price`].
pub fn total_cost(
    listing: &Listing,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Quote, MarketError> {
    let unit_price = price(
        listing.base_price,
        &listing.currency,
        &listing.pricing_rules,
        start,
    )?;
    let days = duration_in_days(start, end);
    let total = Money::from_cents_f64(unit_price.as_f64_cents() * days)?;

    Ok(Quote {
        unit_price,
        days,
        total,
        currency: listing.currency.clone(),
    })
}
