//! Store-level metrics.
//!
//! The runtime records two families of counters:
//!
//! - `chagua_store_actions_total{outcome}` - commands committed or rejected by a reducer
//! - `chagua_notifications_total{delivery}` - notifications delivered or dropped
//!
//! No recorder is installed here; binaries decide where metrics go.

use ::metrics::{counter, describe_counter};

/// Outcome label for a store command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    /// Reducer returned `Ok`
    Committed,
    /// Reducer returned `Err`
    Rejected,
}

impl ActionOutcome {
    const fn label(self) -> &'static str {
        match self {
            Self::Committed => "committed",
            Self::Rejected => "rejected",
        }
    }
}

/// Register descriptions for the runtime metrics.
pub fn register_runtime_metrics() {
    describe_counter!(
        "chagua_store_actions_total",
        "Commands processed by aggregate stores, by outcome (committed, rejected)"
    );
    describe_counter!(
        "chagua_notifications_total",
        "Notifications handed to the notifier, by delivery result (delivered, dropped)"
    );
}

pub(crate) fn record_action(outcome: ActionOutcome) {
    counter!("chagua_store_actions_total", "outcome" => outcome.label()).increment(1);
}

pub(crate) fn record_notification(delivered: bool) {
    let delivery = if delivered { "delivered" } else { "dropped" };
    counter!("chagua_notifications_total", "delivery" => delivery).increment(1);
}
