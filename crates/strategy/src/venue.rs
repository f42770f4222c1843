// strategy/src/venue.rs

use crate::{market_making::MarketMakingParams, VenueError, VenueResult};
use custody_core::{Address, Amount, AssetService, BasisPoints, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// External yield venues the orchestrator can allocate to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum VenueKind {
    /// Strategy instances quoting a ladder out of a custody vault
    MarketMaking,
    /// Deposits into the asset pool ledger
    Lending,
}

impl VenueKind {
    /// Whether retracted funds land in a vault and must be swept back
    pub fn requires_sweep(&self) -> bool {
        matches!(self, VenueKind::MarketMaking)
    }
}

impl fmt::Display for VenueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VenueKind::MarketMaking => write!(f, "market-making"),
            VenueKind::Lending => write!(f, "lending"),
        }
    }
}

/// The single base/quote pair managed by the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetPair {
    pub base: Address,
    pub quote: Address,
}

impl AssetPair {
    pub fn new(base: Address, quote: Address) -> Self {
        Self { base, quote }
    }

    pub fn assets(&self) -> [Address; 2] {
        [self.base, self.quote]
    }

    pub fn contains(&self, asset: &Address) -> bool {
        self.base == *asset || self.quote == *asset
    }
}

/// Opaque reference to a live deployment inside a venue
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VenueHandle {
    pub venue: VenueKind,
    pub id: Address,
}

impl VenueHandle {
    pub fn new(venue: VenueKind, id: Address) -> Self {
        Self { venue, id }
    }
}

/// Amounts to place into a venue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionRequest {
    pub pair: AssetPair,
    pub base_amount: Amount,
    pub quote_amount: Amount,
    /// Strategy parameters; only meaningful for market making
    pub params: Option<MarketMakingParams>,
}

impl ProvisionRequest {
    /// (asset, amount) legs with a non-zero amount
    pub fn legs(&self) -> impl Iterator<Item = (Address, &Amount)> + '_ {
        [
            (self.pair.base, &self.base_amount),
            (self.pair.quote, &self.quote_amount),
        ]
        .into_iter()
        .filter(|(_, amount)| !amount.is_zero())
    }

    pub fn is_empty(&self) -> bool {
        self.base_amount.is_zero() && self.quote_amount.is_zero()
    }
}

/// Collaborators lent to a venue for the duration of one call
pub struct VenueContext<'a> {
    pub bank: &'a mut dyn AssetService,
    /// Account the venue acts for
    pub caller: Address,
    pub now: Timestamp,
}

impl<'a> VenueContext<'a> {
    pub fn new(bank: &'a mut dyn AssetService, caller: Address, now: Timestamp) -> Self {
        Self { bank, caller, now }
    }
}

/// Amounts handed back by a retraction
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetractReceipt {
    pub returned: Vec<(Address, Amount)>,
}

impl RetractReceipt {
    pub fn amount_of(&self, asset: &Address) -> Amount {
        self.returned
            .iter()
            .filter(|(returned, _)| returned == asset)
            .map(|(_, amount)| amount)
            .sum()
    }
}

/// Projected holdings of one owner inside a venue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VenuePosition {
    pub venue: VenueKind,
    pub base: Amount,
    pub quote: Amount,
}

/// Capability set the orchestrator uses to drive one external venue
///
/// Every call either completes or returns an error having left the venue
/// and the asset service as it found them, so callers can catch failures
/// one call at a time. Emergency recovery relies on this: it catches each
/// failed call and moves on without undoing anything itself. An adapter
/// that moves funds in several transfers must either check every transfer
/// can succeed before making the first, or reverse the earlier ones when a
/// later one fails.
pub trait VenueAdapter {
    fn kind(&self) -> VenueKind;

    /// Reject a request `provision` would refuse, without touching state
    ///
    /// Called before any active deployment is unwound.
    fn check_provision(&self, request: &ProvisionRequest) -> VenueResult<()> {
        if request.is_empty() {
            return Err(VenueError::InvalidAmount);
        }
        Ok(())
    }

    /// Place the requested amounts and return a handle to the deployment
    fn provision(
        &mut self,
        ctx: &mut VenueContext<'_>,
        request: &ProvisionRequest,
    ) -> VenueResult<VenueHandle>;

    /// Unwind the caller's deployment in `assets`
    ///
    /// Lending returns funds straight to the caller. Market making returns
    /// them to the caller's vault, to be swept with `withdraw`.
    fn retract(
        &mut self,
        ctx: &mut VenueContext<'_>,
        handle: Option<&VenueHandle>,
        assets: &[Address],
    ) -> VenueResult<RetractReceipt>;

    /// Move `amount` of `asset` back to the caller; zero means everything
    fn withdraw(
        &mut self,
        ctx: &mut VenueContext<'_>,
        asset: &Address,
        amount: &Amount,
    ) -> VenueResult<Amount>;

    fn query_apy(&self, asset: &Address) -> VenueResult<BasisPoints>;

    fn query_position(
        &self,
        bank: &dyn AssetService,
        owner: &Address,
        pair: &AssetPair,
        now: Timestamp,
    ) -> VenueResult<VenuePosition>;
}
