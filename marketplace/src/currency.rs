//! Display conversion between currencies.
//!
//! Rates are supplied by an external lookup table and only used to show a
//! reservation total in the viewer's currency. Stored amounts are never
//! converted.

use crate::error::MarketError;
use crate::types::{Currency, Money};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An amount in a given currency
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amount {
    /// Value in minor units
    pub money: Money,
    /// Currency of `money`
    pub currency: Currency,
}

/// Table of `(from, to) → rate` conversions
#[derive(Clone, Debug, Default)]
pub struct RateTable {
    rates: HashMap<(Currency, Currency), f64>,
}

impl RateTable {
    /// An empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a rate.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::Validation`] for a rate that is not finite and positive.
    pub fn insert(&mut self, from: Currency, to: Currency, rate: f64) -> Result<(), MarketError> {
        if !(rate.is_finite() && rate > 0.0) {
            return Err(MarketError::Validation(format!(
                "exchange rate {from}->{to} must be finite and positive, got {rate}"
            )));
        }
        self.rates.insert((from, to), rate);
        Ok(())
    }

    /// Builder form of [`RateTable::insert`]
    ///
    /// # Errors
    ///
    /// See [`RateTable::insert`].
    pub fn with_rate(mut self, from: Currency, to: Currency, rate: f64) -> Result<Self, MarketError> {
        self.insert(from, to, rate)?;
        Ok(self)
    }

    /// Rate for a pair; identity for same-currency pairs
    #[must_use]
    pub fn rate(&self, from: &Currency, to: &Currency) -> Option<f64> {
        if from == to {
            return Some(1.0);
        }
        self.rates.get(&(from.clone(), to.clone())).copied()
    }

    /// Convert an amount for display, rounding to the nearest cent.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::NotFound`] when the table has no rate for the pair.
    pub fn convert(&self, amount: &Amount, to: &Currency) -> Result<Amount, MarketError> {
        let rate = self
            .rate(&amount.currency, to)
            .ok_or_else(|| MarketError::not_found("exchange rate", format!("{}->{to}", amount.currency)))?;

        Ok(Amount {
            money: Money::from_cents_f64(amount.money.as_f64_cents() * rate)?,
            currency: to.clone(),
        })
    }
}
