//! Abuse reports.
//!
//! Reports are low-traffic and never contended with bookings, so all of them
//! live in one [`ReportBook`]. Flagging a reported user is done by the caller
//! against the user's trust store once the report is committed.

use crate::capability::{self, Capability};
use crate::error::MarketError;
use crate::notifications::Notification;
use crate::types::{Actor, Report, ReportId, ReportTarget};
use chagua_core::environment::Clock;
use chagua_core::reducer::{Reduced, Reducer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Every report filed
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportBook {
    /// Reports by id
    pub reports: BTreeMap<ReportId, Report>,
}

impl ReportBook {
    /// Empty book
    #[must_use]
    pub const fn new() -> Self {
        Self {
            reports: BTreeMap::new(),
        }
    }

    /// Reports not yet resolved
    pub fn open_reports(&self) -> impl Iterator<Item = &Report> {
        self.reports.values().filter(|r| !r.resolved)
    }
}

/// Commands accepted by the report book
#[derive(Clone, Debug)]
pub enum ModerationAction {
    /// File a new report
    FileReport {
        /// Id for the report
        report_id: ReportId,
        /// Who is reporting
        reporter: Actor,
        /// What is reported
        target: ReportTarget,
        /// Why
        description: String,
    },
    /// Resolve an open report
    ResolveReport {
        /// Report to resolve
        report_id: ReportId,
        /// Moderator holding the `reports` capability
        moderator: Actor,
    },
}

/// Dependencies of the report book
#[derive(Clone)]
pub struct ModerationEnvironment {
    /// Clock for timestamps
    pub clock: Arc<dyn Clock>,
}

impl ModerationEnvironment {
    /// Creates a new `ModerationEnvironment`
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

/// Reducer for the report book
#[derive(Clone, Debug, Default)]
pub struct ModerationReducer;

impl ModerationReducer {
    /// Creates a new `ModerationReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn file(
        book: &mut ReportBook,
        report_id: ReportId,
        reporter: &Actor,
        target: ReportTarget,
        description: String,
        env: &ModerationEnvironment,
    ) -> Result<Report, MarketError> {
        if description.trim().is_empty() {
            return Err(MarketError::Validation(
                "report description is required".to_string(),
            ));
        }
        if target == ReportTarget::User(reporter.id) {
            return Err(MarketError::Validation(
                "users cannot report themselves".to_string(),
            ));
        }
        if book.reports.contains_key(&report_id) {
            return Err(MarketError::Conflict(format!("report {report_id} already exists")));
        }

        let report = Report {
            id: report_id,
            reporter: reporter.id,
            target,
            description,
            resolved: false,
            created_at: env.clock.now(),
            resolved_by: None,
        };
        book.reports.insert(report_id, report.clone());

        tracing::info!(report_id = %report_id, reporter = %reporter.id, ?target, "Report filed");
        Ok(report)
    }

    fn resolve(
        book: &mut ReportBook,
        report_id: ReportId,
        moderator: &Actor,
    ) -> Result<Report, MarketError> {
        capability::require(moderator, Capability::Reports)?;

        let Some(report) = book.reports.get_mut(&report_id) else {
            return Err(MarketError::not_found("report", report_id));
        };
        if report.resolved {
            return Err(MarketError::InvalidState(format!(
                "report {report_id} is already resolved"
            )));
        }

        report.resolved = true;
        report.resolved_by = Some(moderator.id);

        tracing::info!(report_id = %report_id, moderator = %moderator.id, "Report resolved");
        Ok(report.clone())
    }
}

impl Reducer for ModerationReducer {
    type State = ReportBook;
    type Action = ModerationAction;
    type Environment = ModerationEnvironment;
    type Output = Report;
    type Error = MarketError;
    type Notification = Notification;

    fn reduce(
        &self,
        book: &mut ReportBook,
        action: ModerationAction,
        env: &ModerationEnvironment,
    ) -> Result<Reduced<Report, Notification>, MarketError> {
        let result = match action {
            ModerationAction::FileReport {
                report_id,
                reporter,
                target,
                description,
            } => Self::file(book, report_id, &reporter, target, description, env),
            ModerationAction::ResolveReport {
                report_id,
                moderator,
            } => Self::resolve(book, report_id, &moderator),
        };

        match result {
            Ok(report) => Ok(Reduced::new(report)),
            Err(error) => {
                tracing::debug!(%error, "Moderation command rejected");
                Err(error)
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::capability::CapabilitySet;
    use crate::error::ErrorKind;
    use crate::types::{CommentId, ListingId, UserId};
    use chagua_testing::{assertions, test_clock, ReducerTest};

    fn env() -> ModerationEnvironment {
        ModerationEnvironment::new(Arc::new(test_clock()))
    }

    fn reporter() -> Actor {
        Actor::individual(UserId::new(), "reporter")
    }

    fn file(reporter: &Actor, target: ReportTarget) -> ModerationAction {
        ModerationAction::FileReport {
            report_id: ReportId::new(),
            reporter: reporter.clone(),
            target,
            description: "Spam in the listing description".to_string(),
        }
    }

    fn book_with_report() -> (ReportBook, ReportId) {
        let mut book = ReportBook::new();
        let report = ModerationReducer::new()
            .reduce(
                &mut book,
                file(&reporter(), ReportTarget::Listing(ListingId::new())),
                &env(),
            )
            .unwrap()
            .output;
        (book, report.id)
    }

    #[test]
    fn test_file_report() {
        ReducerTest::new(ModerationReducer::new())
            .with_env(env())
            .given_state(ReportBook::new())
            .when_action(file(&reporter(), ReportTarget::Comment(CommentId::new())))
            .then_output(|report| {
                assert!(!report.resolved);
                assert!(report.resolved_by.is_none());
            })
            .then_state(|book| assert_eq!(book.open_reports().count(), 1))
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn test_description_required() {
        ReducerTest::new(ModerationReducer::new())
            .with_env(env())
            .given_state(ReportBook::new())
            .when_action(ModerationAction::FileReport {
                report_id: ReportId::new(),
                reporter: reporter(),
                target: ReportTarget::User(UserId::new()),
                description: "   ".to_string(),
            })
            .then_error(|error| assert_eq!(error.kind(), ErrorKind::Validation))
            .then_state_unchanged()
            .run();
    }

    #[test]
    fn test_self_report_rejected() {
        let me = reporter();
        let target = ReportTarget::User(me.id);

        ReducerTest::new(ModerationReducer::new())
            .with_env(env())
            .given_state(ReportBook::new())
            .when_action(file(&me, target))
            .then_error(|error| assert_eq!(error.kind(), ErrorKind::Validation))
            .run();
    }

    #[test]
    fn test_resolve_requires_reports_capability() {
        let (book, id) = book_with_report();
        let disputes_only = Actor::individual(UserId::new(), "mod")
            .with_capabilities(CapabilitySet::of([Capability::Disputes]));

        ReducerTest::new(ModerationReducer::new())
            .with_env(env())
            .given_state(book)
            .when_action(ModerationAction::ResolveReport {
                report_id: id,
                moderator: disputes_only,
            })
            .then_error(|error| assert_eq!(error.kind(), ErrorKind::Authorization))
            .then_state_unchanged()
            .run();
    }

    #[test]
    fn test_resolve_is_terminal() {
        let (mut book, id) = book_with_report();
        let moderator = Actor::individual(UserId::new(), "admin")
            .with_capabilities(CapabilitySet::all());
        let moderator_id = moderator.id;

        let resolved = ModerationReducer::new()
            .reduce(
                &mut book,
                ModerationAction::ResolveReport {
                    report_id: id,
                    moderator: moderator.clone(),
                },
                &env(),
            )
            .unwrap()
            .output;
        assert!(resolved.resolved);
        assert_eq!(resolved.resolved_by, Some(moderator_id));

        ReducerTest::new(ModerationReducer::new())
            .with_env(env())
            .given_state(book)
            .when_action(ModerationAction::ResolveReport {
                report_id: id,
                moderator,
            })
            .then_error(|error| assert_eq!(error.kind(), ErrorKind::InvalidState))
            .run();
    }

    #[test]
    fn test_missing_report_is_not_found() {
        let moderator = Actor::individual(UserId::new(), "admin")
            .with_capabilities(CapabilitySet::of([Capability::Reports]));

        ReducerTest::new(ModerationReducer::new())
            .with_env(env())
            .given_state(ReportBook::new())
            .when_action(ModerationAction::ResolveReport {
                report_id: ReportId::new(),
                moderator,
            })
            .then_error(|error| assert_eq!(error.kind(), ErrorKind::NotFound))
            .run();
    }
}
