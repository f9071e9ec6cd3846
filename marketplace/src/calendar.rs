//! Per-listing availability calendar.
//!
//! The calendar stores the set of booked civil (UTC) dates. A time range
//! `[start, end)` covers every date whose span `[d 00:00, d+1 00:00)`
//! intersects it, so a range ending exactly at midnight does not claim the
//! date that midnight opens. A reservation ending at midnight therefore
//! releases that day for a back-to-back booking starting at the same instant.

use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Availability of one civil date
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayStatus {
    /// Can be booked
    Free,
    /// Held by a pending or confirmed reservation
    Booked,
}

/// Civil dates covered by `[start, end)`, ascending.
///
/// Empty when `start >= end`.
#[must_use]
pub fn covered_days(start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<NaiveDate> {
    if start >= end {
        return Vec::new();
    }

    let first = start.date_naive();
    let last = if end.time() == NaiveTime::MIN {
        end.date_naive().pred_opt().unwrap_or(first)
    } else {
        end.date_naive()
    };

    first.iter_days().take_while(|day| *day <= last).collect()
}

/// Booked days of a single listing
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Calendar {
    booked: BTreeSet<NaiveDate>,
}

impl Calendar {
    /// An empty calendar
    #[must_use]
    pub const fn new() -> Self {
        Self {
            booked: BTreeSet::new(),
        }
    }

    /// True iff no covered day of `[start, end)` is booked
    #[must_use]
    pub fn is_available(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        covered_days(start, end)
            .iter()
            .all(|day| !self.booked.contains(day))
    }

    /// Covered days of `[start, end)` that are already booked, ascending
    #[must_use]
    pub fn conflicts(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<NaiveDate> {
        covered_days(start, end)
            .into_iter()
            .filter(|day| self.booked.contains(day))
            .collect()
    }

    /// Mark every covered day booked
    pub fn mark_booked(&mut self, start: DateTime<Utc>, end: DateTime<Utc>) {
        self.booked.extend(covered_days(start, end));
    }

    /// Free every covered day
    pub fn release(&mut self, start: DateTime<Utc>, end: DateTime<Utc>) {
        for day in covered_days(start, end) {
            self.booked.remove(&day);
        }
    }

    /// Whether a single date is booked
    #[must_use]
    pub fn is_booked(&self, day: NaiveDate) -> bool {
        self.booked.contains(&day)
    }

    /// Number of booked dates
    #[must_use]
    pub fn booked_count(&self) -> usize {
        self.booked.len()
    }

    /// Status of every date in `from..=to`, for calendar rendering
    #[must_use]
    pub fn snapshot(&self, from: NaiveDate, to: NaiveDate) -> BTreeMap<NaiveDate, DayStatus> {
        from.iter_days()
            .take_while(|day| *day <= to)
            .map(|day| {
                let status = if self.booked.contains(&day) {
                    DayStatus::Booked
                } else {
                    DayStatus::Free
                };
                (day, status)
            })
            .collect()
    }

    /// Date `days` after `day`, saturating at the calendar's end
    #[must_use]
    pub fn add_days(day: NaiveDate, days: u64) -> NaiveDate {
        day.checked_add_days(Days::new(days)).unwrap_or(NaiveDate::MAX)
    }
}
