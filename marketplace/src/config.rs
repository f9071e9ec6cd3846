//! Configuration management for the marketplace engines.
//!
//! Loads configuration from environment variables with sensible defaults.

use serde::{Deserialize, Serialize};
use std::env;

/// Marketplace configuration loaded from environment variables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Trust badge thresholds
    pub trust: TrustPolicy,
    /// Contract and review rules
    pub rules: RulesConfig,
    /// Notification fan-out
    pub notifications: NotificationConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Thresholds for trust badge eligibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustPolicy {
    /// Days of clean activity required
    pub min_clean_days: i64,
    /// Completed transactions required
    pub min_completed_transactions: u32,
}

/// Contract and review rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RulesConfig {
    /// Minimum length of contract terms, in characters
    pub contract_min_terms: usize,
    /// Reviewers must have completed at least one transaction
    pub review_requires_transaction: bool,
}

/// Notification fan-out configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Broadcast buffer per subscriber
    pub capacity: usize,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (`RUST_LOG` syntax)
    pub level: String,
}

impl Default for TrustPolicy {
    fn default() -> Self {
        Self {
            min_clean_days: 365,
            min_completed_transactions: 5,
        }
    }
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            contract_min_terms: 50,
            review_requires_transaction: true,
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self { capacity: 256 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Unset or unparsable variables fall back to their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            trust: TrustPolicy {
                min_clean_days: env::var("CHAGUA_TRUST_MIN_CLEAN_DAYS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.trust.min_clean_days),
                min_completed_transactions: env::var("CHAGUA_TRUST_MIN_COMPLETED")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.trust.min_completed_transactions),
            },
            rules: RulesConfig {
                contract_min_terms: env::var("CHAGUA_CONTRACT_MIN_TERMS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.rules.contract_min_terms),
                review_requires_transaction: env::var("CHAGUA_REVIEW_REQUIRES_TRANSACTION")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.rules.review_requires_transaction),
            },
            notifications: NotificationConfig {
                capacity: env::var("CHAGUA_NOTIFICATION_CAPACITY")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.notifications.capacity),
            },
            logging: LoggingConfig {
                level: env::var("RUST_LOG").unwrap_or(defaults.logging.level),
            },
        }
    }
}
