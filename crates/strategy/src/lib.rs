// strategy/src/lib.rs

//! Strategy allocation for pooled custody
//!
//! This crate implements the allocator that moves the pooled funds of a
//! single base/quote pair between yield venues:
//! - A venue adapter capability with lending and market-making variants
//! - A per-user liability ledger independent of venue yield
//! - The orchestrator state machine with withdrawal gating and
//!   best-effort emergency recovery

pub mod events;
pub mod lending_venue;
pub mod market_making;
pub mod orchestrator;
pub mod user_ledger;
pub mod venue;

pub use events::{EventKind, OrchestratorEvent};
pub use lending_venue::LendingVenue;
pub use market_making::{
    MarketMakingConfig, MarketMakingParams, MarketMakingVenue, RestingOrder, Side,
    StrategyInstance, VaultFactory,
};
pub use orchestrator::{
    AssetBalances, EmergencyReport, OrchestratorConfig, OrchestratorPhase, PositionSummary,
    RecoveryAction, RecoveryStep, StepOutcome, StrategyOrchestrator, Venues,
};
pub use user_ledger::OrchestratorLedger;
pub use venue::{
    AssetPair, ProvisionRequest, RetractReceipt, VenueAdapter, VenueContext, VenueHandle,
    VenueKind, VenuePosition,
};

use custody_core::{Address, Amount, TokenError};
use lending_ledger::LedgerError;

/// Result type for venue calls
pub type VenueResult<T> = Result<T, VenueError>;

/// Result type for orchestrator operations
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

/// Errors raised by a venue adapter
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VenueError {
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Transfer failed: {0}")]
    Transfer(#[from] TokenError),

    #[error("Invalid strategy parameters: {0}")]
    InvalidParams(String),

    #[error("Amount must be greater than zero")]
    InvalidAmount,

    #[error("No custody vault for {0}")]
    NoVault(Address),

    #[error("Handle required to retract from {0}")]
    MissingHandle(VenueKind),

    #[error("Unknown or inactive strategy instance {0}")]
    UnknownHandle(Address),

    #[error("Handle belongs to {found}, expected {expected}")]
    WrongVenue { expected: VenueKind, found: VenueKind },

    #[error("Caller {0} does not own this position")]
    Unauthorized(Address),

    #[error("Insufficient funds in {asset}: required {required}, available {available}")]
    InsufficientFunds {
        asset: Address,
        required: Amount,
        available: Amount,
    },

    #[error("Venue unavailable: {0}")]
    Unavailable(String),
}

/// Error taxonomy used to classify orchestrator failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Configuration,
    Authorization,
    Accounting,
    Venue,
    Transfer,
}

/// Orchestrator errors; every one aborts the call without a state change
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrchestratorError {
    #[error("Zero or duplicate address")]
    InvalidAddress,

    #[error("Asset pair has not been configured")]
    AssetsNotSet,

    #[error("Asset pair is already configured")]
    AssetsAlreadySet,

    #[error("No {0} venue is wired to the orchestrator")]
    ContractNotSet(VenueKind),

    #[error("Caller {0} is not an authorized operator")]
    UnauthorizedOperator(Address),

    #[error("Amount must be greater than zero")]
    InvalidAmount,

    #[error("Insufficient custody balance of {asset}: required {required}, available {available}")]
    InsufficientBalance {
        asset: Address,
        required: Amount,
        available: Amount,
    },

    #[error("Insufficient deposit of {user} in {asset}: requested {requested}, recorded {available}")]
    InsufficientUserBalance {
        user: Address,
        asset: Address,
        requested: Amount,
        available: Amount,
    },

    #[error("Asset {0} is not part of the configured pair")]
    UnsupportedAsset(Address),

    #[error("Funds are deployed to the {0} venue")]
    FundsDeployed(VenueKind),

    #[error("{venue} venue error: {source}")]
    Venue {
        venue: VenueKind,
        #[source]
        source: VenueError,
    },

    #[error("Transfer failed: {0}")]
    Transfer(#[from] TokenError),
}

impl OrchestratorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidAddress
            | Self::AssetsNotSet
            | Self::AssetsAlreadySet
            | Self::ContractNotSet(_) => ErrorKind::Configuration,
            Self::UnauthorizedOperator(_) => ErrorKind::Authorization,
            Self::InvalidAmount
            | Self::InsufficientBalance { .. }
            | Self::InsufficientUserBalance { .. }
            | Self::UnsupportedAsset(_)
            | Self::FundsDeployed(_) => ErrorKind::Accounting,
            Self::Venue { .. } => ErrorKind::Venue,
            Self::Transfer(_) => ErrorKind::Transfer,
        }
    }

    pub(crate) fn venue(venue: VenueKind) -> impl FnOnce(VenueError) -> Self {
        move |source| Self::Venue { venue, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(OrchestratorError::AssetsNotSet.kind(), ErrorKind::Configuration);
        assert_eq!(
            OrchestratorError::UnauthorizedOperator(Address::from_label("mallory")).kind(),
            ErrorKind::Authorization
        );
        assert_eq!(
            OrchestratorError::FundsDeployed(VenueKind::Lending).kind(),
            ErrorKind::Accounting
        );
        let err = OrchestratorError::venue(VenueKind::MarketMaking)(VenueError::InvalidAmount);
        assert_eq!(err.kind(), ErrorKind::Venue);
        assert!(err.to_string().starts_with("market-making venue error"));
    }
}
