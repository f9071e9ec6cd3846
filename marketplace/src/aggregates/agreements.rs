//! Per-listing contracts and disputes.
//!
//! A listing's contracts and the disputes raised against them share one
//! [`AgreementBook`], so "find the raiser's contract, open a dispute, mark the
//! contract disputed" is a single transaction.
//!
//! ```text
//! Contract: Pending ──agree──▶ Agreed ──complete──▶ Completed
//!              │                  │
//!              └──expire──▶ Expired   (any non-expired) ──dispute──▶ Disputed
//!
//! Dispute:  Open ──resolve──▶ Resolved
//!             └───close────▶ Closed
//! ```

use crate::capability::{self, Capability};
use crate::error::MarketError;
use crate::notifications::Notification;
use crate::types::{
    Actor, Contract, ContractId, ContractStatus, DEFAULT_EMERGENCY_CLAUSE, Dispute, DisputeId,
    DisputeStatus, ListingId, UserId,
};
use chagua_core::environment::Clock;
use chagua_core::reducer::{Reduced, Reducer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Contracts and disputes of one listing
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgreementBook {
    /// The listing
    pub listing: ListingId,
    /// Listing owner, party to every contract
    pub owner: UserId,
    /// Listing title, used in notifications
    pub title: String,
    /// Contracts by id
    pub contracts: BTreeMap<ContractId, Contract>,
    /// Disputes by id
    pub disputes: BTreeMap<DisputeId, Dispute>,
}

impl AgreementBook {
    /// Empty book for a listing
    #[must_use]
    pub fn new(listing: ListingId, owner: UserId, title: impl Into<String>) -> Self {
        Self {
            listing,
            owner,
            title: title.into(),
            contracts: BTreeMap::new(),
            disputes: BTreeMap::new(),
        }
    }

    /// A contract, readable only by its parties.
    ///
    /// # Errors
    ///
    /// - [`MarketError::NotFound`] if the contract does not exist
    /// - [`MarketError::Authorization`] if the actor is not a party
    pub fn contract_for(&self, actor: &Actor, id: ContractId) -> Result<&Contract, MarketError> {
        let contract = self.contract(id)?;
        if !contract.is_party(actor.id) {
            return Err(not_a_party(actor));
        }
        Ok(contract)
    }

    /// Disputes raised against a contract
    pub fn disputes_of(&self, contract: ContractId) -> impl Iterator<Item = &Dispute> {
        self.disputes
            .values()
            .filter(move |dispute| dispute.contract == contract)
    }

    fn contract(&self, id: ContractId) -> Result<&Contract, MarketError> {
        self.contracts
            .get(&id)
            .ok_or_else(|| MarketError::not_found("contract", id))
    }

    fn dispute(&self, id: DisputeId) -> Result<&Dispute, MarketError> {
        self.disputes
            .get(&id)
            .ok_or_else(|| MarketError::not_found("dispute", id))
    }

    /// Most recent non-expired contract the user is a party to
    fn latest_contract_of(&self, user: UserId) -> Option<&Contract> {
        self.contracts
            .values()
            .filter(|c| c.is_party(user) && c.status != ContractStatus::Expired)
            .max_by_key(|c| c.created_at)
    }
}

/// Commands accepted by the agreement book
#[derive(Clone, Debug)]
pub enum AgreementAction {
    /// Draft a contract between the renter and the listing owner
    CreateContract {
        /// Id for the new contract
        contract_id: ContractId,
        /// Renter drafting the contract
        renter: Actor,
        /// Main terms
        terms: String,
        /// Additional named terms
        custom_terms: BTreeMap<String, String>,
    },
    /// Agree to a pending contract
    AgreeContract {
        /// Contract to agree
        contract_id: ContractId,
        /// Owner or renter
        party: UserId,
    },
    /// Mark an agreed contract fulfilled
    CompleteContract {
        /// Contract to complete
        contract_id: ContractId,
        /// Owner or renter
        party: UserId,
    },
    /// Withdraw a pending contract
    ExpireContract {
        /// Contract to expire
        contract_id: ContractId,
        /// Moderator holding the `contracts` capability
        moderator: Actor,
    },
    /// Open a dispute on the raiser's contract for this listing
    RaiseDispute {
        /// Id for the new dispute
        dispute_id: DisputeId,
        /// Owner or renter
        raiser: Actor,
        /// What happened
        description: String,
    },
    /// Decide an open dispute
    ResolveDispute {
        /// Dispute to resolve
        dispute_id: DisputeId,
        /// Moderator holding the `disputes` capability
        moderator: Actor,
    },
    /// Close an open dispute without a decision
    CloseDispute {
        /// Dispute to close
        dispute_id: DisputeId,
        /// A party, or a `disputes` moderator
        actor: Actor,
    },
}

/// Result of an agreement command
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AgreementOutput {
    /// A contract was created or changed
    Contract(Contract),
    /// A dispute was created or changed
    Dispute(Dispute),
}

impl AgreementOutput {
    /// Unwrap a contract output.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::Internal`] for a dispute output.
    pub fn into_contract(self) -> Result<Contract, MarketError> {
        match self {
            Self::Contract(contract) => Ok(contract),
            Self::Dispute(_) => Err(MarketError::Internal(
                "agreement store returned a dispute where a contract was expected".to_string(),
            )),
        }
    }

    /// Unwrap a dispute output.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::Internal`] for a contract output.
    pub fn into_dispute(self) -> Result<Dispute, MarketError> {
        match self {
            Self::Dispute(dispute) => Ok(dispute),
            Self::Contract(_) => Err(MarketError::Internal(
                "agreement store returned a contract where a dispute was expected".to_string(),
            )),
        }
    }
}

/// Dependencies of the agreement book
#[derive(Clone)]
pub struct AgreementEnvironment {
    /// Clock for timestamps
    pub clock: Arc<dyn Clock>,
    /// Minimum length of contract terms, in characters
    pub contract_min_terms: usize,
}

impl AgreementEnvironment {
    /// Creates a new `AgreementEnvironment`
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, contract_min_terms: usize) -> Self {
        Self {
            clock,
            contract_min_terms,
        }
    }
}

/// Reducer for the agreement book
#[derive(Clone, Debug, Default)]
pub struct AgreementReducer;

fn not_a_party(actor: &Actor) -> MarketError {
    MarketError::Authorization(format!("{} is not a party to this contract", actor.username))
}

fn invalid_contract_transition(contract: &Contract, to: ContractStatus) -> MarketError {
    MarketError::InvalidState(format!(
        "contract {} is {}, cannot move to {to}",
        contract.id, contract.status
    ))
}

fn ensure_open(dispute: &Dispute) -> Result<(), MarketError> {
    if dispute.status == DisputeStatus::Open {
        Ok(())
    } else {
        Err(MarketError::InvalidState(format!(
            "dispute {} is already {}",
            dispute.id, dispute.status
        )))
    }
}

impl AgreementReducer {
    /// Creates a new `AgreementReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn create_contract(
        book: &mut AgreementBook,
        contract_id: ContractId,
        renter: &Actor,
        terms: String,
        custom_terms: BTreeMap<String, String>,
        env: &AgreementEnvironment,
    ) -> Result<Reduced<AgreementOutput, Notification>, MarketError> {
        if renter.id == book.owner {
            return Err(MarketError::Validation(
                "owners cannot draft a contract for their own listing".to_string(),
            ));
        }
        let length = terms.trim().chars().count();
        if length < env.contract_min_terms {
            return Err(MarketError::Validation(format!(
                "contract terms must be at least {} characters, got {length}",
                env.contract_min_terms
            )));
        }
        if book
            .contracts
            .values()
            .any(|c| c.renter == renter.id && c.status == ContractStatus::Pending)
        {
            return Err(MarketError::Conflict(format!(
                "{} already has a pending contract for {}",
                renter.username, book.title
            )));
        }

        let contract = Contract {
            id: contract_id,
            listing: book.listing,
            owner: book.owner,
            renter: renter.id,
            terms,
            custom_terms,
            emergency_clause: DEFAULT_EMERGENCY_CLAUSE.to_string(),
            status: ContractStatus::Pending,
            created_at: env.clock.now(),
            agreed_at: None,
        };
        book.contracts.insert(contract_id, contract.clone());

        tracing::info!(
            contract_id = %contract_id,
            listing_id = %book.listing,
            renter = %renter.id,
            "Contract created"
        );

        let notification = Notification::contract_created(renter, &book.title, &contract);
        Ok(Reduced::new(AgreementOutput::Contract(contract)).publish(notification))
    }

    fn transition_contract(
        book: &mut AgreementBook,
        contract_id: ContractId,
        party: UserId,
        from: ContractStatus,
        to: ContractStatus,
        env: &AgreementEnvironment,
    ) -> Result<Reduced<AgreementOutput, Notification>, MarketError> {
        let contract = book.contract(contract_id)?;
        if !contract.is_party(party) {
            return Err(MarketError::Authorization(format!(
                "user {party} is not a party to contract {contract_id}"
            )));
        }
        if contract.status != from {
            return Err(invalid_contract_transition(contract, to));
        }

        let now = env.clock.now();
        let Some(contract) = book.contracts.get_mut(&contract_id) else {
            return Err(MarketError::not_found("contract", contract_id));
        };
        contract.status = to;
        if to == ContractStatus::Agreed {
            contract.agreed_at = Some(now);
        }

        tracing::info!(contract_id = %contract_id, status = %to, "Contract updated");
        Ok(Reduced::new(AgreementOutput::Contract(contract.clone())))
    }

    fn expire_contract(
        book: &mut AgreementBook,
        contract_id: ContractId,
        moderator: &Actor,
    ) -> Result<Reduced<AgreementOutput, Notification>, MarketError> {
        capability::require(moderator, Capability::Contracts)?;
        let contract = book.contract(contract_id)?;
        if contract.status != ContractStatus::Pending {
            return Err(invalid_contract_transition(contract, ContractStatus::Expired));
        }

        let Some(contract) = book.contracts.get_mut(&contract_id) else {
            return Err(MarketError::not_found("contract", contract_id));
        };
        contract.status = ContractStatus::Expired;

        tracing::info!(contract_id = %contract_id, moderator = %moderator.id, "Contract expired");
        Ok(Reduced::new(AgreementOutput::Contract(contract.clone())))
    }

    fn raise_dispute(
        book: &mut AgreementBook,
        dispute_id: DisputeId,
        raiser: &Actor,
        description: String,
        env: &AgreementEnvironment,
    ) -> Result<Reduced<AgreementOutput, Notification>, MarketError> {
        let Some(contract) = book.latest_contract_of(raiser.id) else {
            return Err(not_a_party(raiser));
        };
        if description.trim().is_empty() {
            return Err(MarketError::Validation(
                "dispute description is required".to_string(),
            ));
        }
        if book
            .disputes_of(contract.id)
            .any(|d| d.status == DisputeStatus::Open)
        {
            return Err(MarketError::Conflict(format!(
                "contract {} already has an open dispute",
                contract.id
            )));
        }
        let Some(counterparty) = contract.counterparty(raiser.id) else {
            return Err(not_a_party(raiser));
        };

        let contract_id = contract.id;
        let dispute = Dispute {
            id: dispute_id,
            contract: contract_id,
            raised_by: raiser.id,
            description,
            status: DisputeStatus::Open,
            created_at: env.clock.now(),
            settled_by: None,
            settled_at: None,
        };

        if let Some(contract) = book.contracts.get_mut(&contract_id) {
            contract.status = ContractStatus::Disputed;
        }
        book.disputes.insert(dispute_id, dispute.clone());

        tracing::info!(
            dispute_id = %dispute_id,
            contract_id = %contract_id,
            raised_by = %raiser.id,
            "Dispute raised"
        );

        let notification = Notification::dispute_raised(raiser, counterparty, &book.title, &dispute);
        Ok(Reduced::new(AgreementOutput::Dispute(dispute)).publish(notification))
    }

    fn settle_dispute(
        book: &mut AgreementBook,
        dispute_id: DisputeId,
        actor: &Actor,
        to: DisputeStatus,
        env: &AgreementEnvironment,
    ) -> Result<Reduced<AgreementOutput, Notification>, MarketError> {
        if to == DisputeStatus::Resolved {
            capability::require(actor, Capability::Disputes)?;
        } else {
            let dispute = book.dispute(dispute_id)?;
            let is_party = book
                .contracts
                .get(&dispute.contract)
                .is_some_and(|c| c.is_party(actor.id));
            if !is_party && !capability::has_capability(actor, Capability::Disputes) {
                return Err(MarketError::Authorization(format!(
                    "{} may not close dispute {dispute_id}",
                    actor.username
                )));
            }
        }
        ensure_open(book.dispute(dispute_id)?)?;

        let now = env.clock.now();
        let Some(dispute) = book.disputes.get_mut(&dispute_id) else {
            return Err(MarketError::not_found("dispute", dispute_id));
        };
        dispute.status = to;
        dispute.settled_by = Some(actor.id);
        dispute.settled_at = Some(now);

        tracing::info!(dispute_id = %dispute_id, status = %to, settled_by = %actor.id, "Dispute settled");
        Ok(Reduced::new(AgreementOutput::Dispute(dispute.clone())))
    }
}

impl Reducer for AgreementReducer {
    type State = AgreementBook;
    type Action = AgreementAction;
    type Environment = AgreementEnvironment;
    type Output = AgreementOutput;
    type Error = MarketError;
    type Notification = Notification;

    fn reduce(
        &self,
        book: &mut AgreementBook,
        action: AgreementAction,
        env: &AgreementEnvironment,
    ) -> Result<Reduced<AgreementOutput, Notification>, MarketError> {
        let result = match action {
            AgreementAction::CreateContract {
                contract_id,
                renter,
                terms,
                custom_terms,
            } => Self::create_contract(book, contract_id, &renter, terms, custom_terms, env),

            AgreementAction::AgreeContract { contract_id, party } => Self::transition_contract(
                book,
                contract_id,
                party,
                ContractStatus::Pending,
                ContractStatus::Agreed,
                env,
            ),

            AgreementAction::CompleteContract { contract_id, party } => Self::transition_contract(
                book,
                contract_id,
                party,
                ContractStatus::Agreed,
                ContractStatus::Completed,
                env,
            ),

            AgreementAction::ExpireContract {
                contract_id,
                moderator,
            } => Self::expire_contract(book, contract_id, &moderator),

            AgreementAction::RaiseDispute {
                dispute_id,
                raiser,
                description,
            } => Self::raise_dispute(book, dispute_id, &raiser, description, env),

            AgreementAction::ResolveDispute {
                dispute_id,
                moderator,
            } => Self::settle_dispute(book, dispute_id, &moderator, DisputeStatus::Resolved, env),

            AgreementAction::CloseDispute { dispute_id, actor } => {
                Self::settle_dispute(book, dispute_id, &actor, DisputeStatus::Closed, env)
            },
        };

        if let Err(error) = &result {
            tracing::debug!(listing_id = %book.listing, %error, "Agreement command rejected");
        }
        result
    }
}
