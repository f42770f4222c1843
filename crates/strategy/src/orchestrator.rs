// strategy/src/orchestrator.rs

//! Strategy allocation orchestrator
//!
//! ```plain
//!                 set_assets
//! Uninitialized ─────────────► Idle ◄──────────────┐
//!                               │  ▲               │ retract
//!                     provision │  │ retract       │
//!                               ▼  │               │
//!                 InMarketMaking ◄───► InLending ──┘
//!
//! emergency_withdraw: any state ──► EmergencyIdle (behaves as Idle)
//! ```
//!
//! User withdrawals are only possible while no venue holds the funds.

use crate::{
    events::{EventKind, OrchestratorEvent},
    market_making::MarketMakingParams,
    user_ledger::OrchestratorLedger,
    venue::{
        AssetPair, ProvisionRequest, RetractReceipt, VenueAdapter, VenueContext, VenueHandle,
        VenueKind, VenuePosition,
    },
    OrchestratorError, OrchestratorResult,
};
use custody_core::{Address, Amount, AssetService, BasisPoints, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Protocol addresses of one orchestrator deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Custody account holding idle funds
    pub address: Address,
    pub owner: Address,
    /// Designated operator besides the owner; zero for none
    pub agent: Address,
}

impl OrchestratorConfig {
    pub fn validate(&self) -> OrchestratorResult<()> {
        if self.address.is_zero() || self.owner.is_zero() {
            return Err(OrchestratorError::InvalidAddress);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrchestratorPhase {
    Uninitialized,
    Idle,
    InMarketMaking,
    InLending,
    /// Idle after an emergency withdrawal
    EmergencyIdle,
}

impl fmt::Display for OrchestratorPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OrchestratorPhase::Uninitialized => "uninitialized",
            OrchestratorPhase::Idle => "idle",
            OrchestratorPhase::InMarketMaking => "in-market-making",
            OrchestratorPhase::InLending => "in-lending",
            OrchestratorPhase::EmergencyIdle => "emergency-idle",
        };
        f.write_str(name)
    }
}

/// The venue adapters lent to one orchestrator call
pub struct Venues<'a> {
    pub market_making: Option<&'a mut dyn VenueAdapter>,
    pub lending: Option<&'a mut dyn VenueAdapter>,
}

impl<'a> Venues<'a> {
    pub fn new(market_making: &'a mut dyn VenueAdapter, lending: &'a mut dyn VenueAdapter) -> Self {
        Self {
            market_making: Some(market_making),
            lending: Some(lending),
        }
    }

    fn get(&mut self, kind: VenueKind) -> OrchestratorResult<&mut (dyn VenueAdapter + 'a)> {
        let slot = match kind {
            VenueKind::MarketMaking => &mut self.market_making,
            VenueKind::Lending => &mut self.lending,
        };
        match slot.as_deref_mut() {
            Some(adapter) if adapter.kind() == kind => Ok(adapter),
            _ => Err(OrchestratorError::ContractNotSet(kind)),
        }
    }

    fn get_ref(&self, kind: VenueKind) -> OrchestratorResult<&(dyn VenueAdapter + 'a)> {
        let slot = match kind {
            VenueKind::MarketMaking => &self.market_making,
            VenueKind::Lending => &self.lending,
        };
        match slot.as_deref() {
            Some(adapter) if adapter.kind() == kind => Ok(adapter),
            _ => Err(OrchestratorError::ContractNotSet(kind)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetBalances {
    pub base: Amount,
    pub quote: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionSummary {
    pub phase: OrchestratorPhase,
    pub pair: AssetPair,
    pub current_venue: Option<VenueKind>,
    pub handle: Option<VenueHandle>,
    /// Funds sitting in custody
    pub idle: AssetBalances,
    /// Projected holdings inside the active venue
    pub deployed: Option<VenuePosition>,
    /// Liabilities recorded for users
    pub user_deposits: AssetBalances,
    /// Users with a recorded deposit in either asset
    pub depositors: usize,
    /// Current rate of the active venue on the base asset
    pub venue_apy: Option<BasisPoints>,
}

/// Emergency sub-steps, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecoveryAction {
    MarketMakingRetract,
    MarketMakingSweep(Address),
    LendingRetract(Address),
}

impl fmt::Display for RecoveryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecoveryAction::MarketMakingRetract => write!(f, "market-making retract"),
            RecoveryAction::MarketMakingSweep(asset) => write!(f, "market-making sweep {}", asset),
            RecoveryAction::LendingRetract(asset) => write!(f, "lending retract {}", asset),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepOutcome {
    /// Amount brought back (to custody, or to the vault for a retract)
    Recovered(Amount),
    /// Nothing to do
    Skipped,
    /// Error caught and recorded
    Failed(String),
}

impl From<OrchestratorResult<Amount>> for StepOutcome {
    fn from(result: OrchestratorResult<Amount>) -> Self {
        match result {
            Ok(amount) => StepOutcome::Recovered(amount),
            Err(err) => StepOutcome::Failed(err.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryStep {
    pub action: RecoveryAction,
    pub outcome: StepOutcome,
}

/// Outcome of every sub-step of an emergency withdrawal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyReport {
    pub previous_venue: Option<VenueKind>,
    pub steps: Vec<RecoveryStep>,
}

impl EmergencyReport {
    pub fn failures(&self) -> impl Iterator<Item = &RecoveryStep> {
        self.steps
            .iter()
            .filter(|step| matches!(step.outcome, StepOutcome::Failed(_)))
    }

    pub fn is_clean(&self) -> bool {
        self.failures().next().is_none()
    }

    pub fn outcome(&self, action: RecoveryAction) -> Option<&StepOutcome> {
        self.steps
            .iter()
            .find(|step| step.action == action)
            .map(|step| &step.outcome)
    }
}

/// Allocates the pooled funds of one asset pair to at most one venue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyOrchestrator {
    config: OrchestratorConfig,
    pair: Option<AssetPair>,
    current_venue: Option<VenueKind>,
    venue_handle: Option<VenueHandle>,
    /// Parameters of the active market-making deployment
    active_params: Option<MarketMakingParams>,
    after_emergency: bool,
    ledger: OrchestratorLedger,
    events: Vec<OrchestratorEvent>,
}

impl StrategyOrchestrator {
    pub fn new(config: OrchestratorConfig) -> OrchestratorResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            pair: None,
            current_venue: None,
            venue_handle: None,
            active_params: None,
            after_emergency: false,
            ledger: OrchestratorLedger::new(),
            events: Vec::new(),
        })
    }

    pub fn address(&self) -> Address {
        self.config.address
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn pair(&self) -> Option<AssetPair> {
        self.pair
    }

    pub fn current_venue(&self) -> Option<VenueKind> {
        self.current_venue
    }

    pub fn venue_handle(&self) -> Option<&VenueHandle> {
        self.venue_handle.as_ref()
    }

    pub fn phase(&self) -> OrchestratorPhase {
        match (self.pair, self.current_venue) {
            (None, _) => OrchestratorPhase::Uninitialized,
            (Some(_), Some(VenueKind::MarketMaking)) => OrchestratorPhase::InMarketMaking,
            (Some(_), Some(VenueKind::Lending)) => OrchestratorPhase::InLending,
            (Some(_), None) if self.after_emergency => OrchestratorPhase::EmergencyIdle,
            (Some(_), None) => OrchestratorPhase::Idle,
        }
    }

    /// Owner plus the designated agent, if any
    pub fn operators(&self) -> Vec<Address> {
        let mut operators = vec![self.config.owner];
        if !self.config.agent.is_zero() {
            operators.push(self.config.agent);
        }
        operators
    }

    pub fn is_operator(&self, account: &Address) -> bool {
        !account.is_zero() && (*account == self.config.owner || *account == self.config.agent)
    }

    pub fn events(&self) -> &[OrchestratorEvent] {
        &self.events
    }

    pub fn user_ledger(&self) -> &OrchestratorLedger {
        &self.ledger
    }

    /// Configure the base/quote pair, once
    pub fn set_assets(
        &mut self,
        caller: &Address,
        base: Address,
        quote: Address,
        now: Timestamp,
    ) -> OrchestratorResult<()> {
        self.ensure_owner(caller)?;
        if self.pair.is_some() {
            return Err(OrchestratorError::AssetsAlreadySet);
        }
        if base.is_zero() || quote.is_zero() || base == quote {
            return Err(OrchestratorError::InvalidAddress);
        }

        self.pair = Some(AssetPair::new(base, quote));
        self.emit(now, EventKind::AssetsConfigured { base, quote });
        tracing::info!(base = %base, quote = %quote, "asset pair configured");
        Ok(())
    }

    /// Replace the designated agent; zero revokes it
    pub fn set_operator(
        &mut self,
        caller: &Address,
        agent: Address,
        now: Timestamp,
    ) -> OrchestratorResult<()> {
        self.ensure_owner(caller)?;
        let previous = std::mem::replace(&mut self.config.agent, agent);
        self.emit(
            now,
            EventKind::OperatorSet {
                previous,
                operator: agent,
            },
        );
        tracing::info!(previous = %previous, agent = %agent, "operator updated");
        Ok(())
    }

    /// Pull `amount` from `user` into custody and record the liability
    pub fn deposit(
        &mut self,
        bank: &mut dyn AssetService,
        user: &Address,
        asset: &Address,
        amount: &Amount,
        now: Timestamp,
    ) -> OrchestratorResult<()> {
        self.ensure_supported(asset)?;
        if amount.is_zero() {
            return Err(OrchestratorError::InvalidAmount);
        }

        let custody = self.config.address;
        self.ledger.credit(user, asset, amount);
        if let Err(err) = bank.transfer_from(asset, &custody, user, &custody, amount) {
            self.ledger.debit(user, asset, amount)?;
            return Err(err.into());
        }

        self.emit(
            now,
            EventKind::Deposited {
                user: *user,
                asset: *asset,
                amount: amount.clone(),
            },
        );
        tracing::info!(user = %user, asset = %asset, amount = %amount, "user deposit");
        Ok(())
    }

    /// Return recorded funds to `user`; refused while funds are deployed
    pub fn withdraw(
        &mut self,
        bank: &mut dyn AssetService,
        user: &Address,
        asset: &Address,
        amount: &Amount,
        now: Timestamp,
    ) -> OrchestratorResult<()> {
        self.ensure_supported(asset)?;
        if amount.is_zero() {
            return Err(OrchestratorError::InvalidAmount);
        }
        if let Some(venue) = self.current_venue {
            return Err(OrchestratorError::FundsDeployed(venue));
        }

        let custody = self.config.address;
        self.ledger.debit(user, asset, amount)?;
        if let Err(err) = bank.transfer(asset, &custody, user, amount) {
            self.ledger.credit(user, asset, amount);
            return Err(err.into());
        }

        self.emit(
            now,
            EventKind::Withdrawn {
                user: *user,
                asset: *asset,
                amount: amount.clone(),
            },
        );
        tracing::info!(user = %user, asset = %asset, amount = %amount, "user withdrawal");
        Ok(())
    }

    /// Deploy custody funds into the market-making venue
    #[allow(clippy::too_many_arguments)]
    pub fn provision_to_market_making(
        &mut self,
        venues: &mut Venues<'_>,
        bank: &mut dyn AssetService,
        caller: &Address,
        base_amount: Amount,
        quote_amount: Amount,
        params: MarketMakingParams,
        now: Timestamp,
    ) -> OrchestratorResult<VenueHandle> {
        self.provision(
            venues,
            bank,
            caller,
            VenueKind::MarketMaking,
            base_amount,
            quote_amount,
            Some(params),
            now,
        )
    }

    /// Deploy custody funds into the lending venue
    pub fn provision_to_lending(
        &mut self,
        venues: &mut Venues<'_>,
        bank: &mut dyn AssetService,
        caller: &Address,
        base_amount: Amount,
        quote_amount: Amount,
        now: Timestamp,
    ) -> OrchestratorResult<VenueHandle> {
        self.provision(
            venues,
            bank,
            caller,
            VenueKind::Lending,
            base_amount,
            quote_amount,
            None,
            now,
        )
    }

    /// Pull everything back into custody, one independent step at a time
    ///
    /// Fails only for a non-operator caller or an unset pair. Venue failures
    /// are recorded in the report and the event log, and the orchestrator
    /// ends up idle anyway. A failed step is not undone here; adapters keep
    /// each call all-or-nothing (see [`VenueAdapter`]).
    pub fn emergency_withdraw(
        &mut self,
        venues: &mut Venues<'_>,
        bank: &mut dyn AssetService,
        caller: &Address,
        now: Timestamp,
    ) -> OrchestratorResult<EmergencyReport> {
        self.ensure_operator(caller)?;
        let pair = self.require_pair()?;
        let previous = self.current_venue;
        let market_making_handle = self
            .venue_handle
            .clone()
            .filter(|handle| handle.venue == VenueKind::MarketMaking);

        let mut report = EmergencyReport {
            previous_venue: previous,
            steps: Vec::new(),
        };
        let mut ctx = VenueContext::new(bank, self.config.address, now);

        let outcome = match market_making_handle.as_ref() {
            Some(handle) => Self::attempt_retract(
                venues,
                &mut ctx,
                VenueKind::MarketMaking,
                Some(handle),
                &pair.assets(),
            )
            .into(),
            None => StepOutcome::Skipped,
        };
        self.record(&mut report, RecoveryAction::MarketMakingRetract, outcome, now);

        for asset in pair.assets() {
            let outcome = Self::attempt_sweep(venues, &mut ctx, &asset).into();
            self.record(&mut report, RecoveryAction::MarketMakingSweep(asset), outcome, now);
        }

        for asset in pair.assets() {
            let outcome =
                Self::attempt_retract(venues, &mut ctx, VenueKind::Lending, None, &[asset]).into();
            self.record(&mut report, RecoveryAction::LendingRetract(asset), outcome, now);
        }

        self.current_venue = None;
        self.venue_handle = None;
        self.active_params = None;
        self.after_emergency = true;

        let failures = report.failures().count();
        self.emit(now, EventKind::EmergencyCompleted { previous, failures });
        if failures > 0 {
            tracing::warn!(failures, "emergency withdrawal completed with failures");
        } else {
            tracing::info!("emergency withdrawal completed");
        }
        Ok(report)
    }

    pub fn get_position_summary(
        &self,
        venues: &Venues<'_>,
        bank: &dyn AssetService,
        now: Timestamp,
    ) -> OrchestratorResult<PositionSummary> {
        let pair = self.require_pair()?;
        let (deployed, venue_apy) = match self.current_venue {
            Some(venue) => {
                let adapter = venues.get_ref(venue)?;
                let position = adapter
                    .query_position(bank, &self.config.address, &pair, now)
                    .map_err(OrchestratorError::venue(venue))?;
                (Some(position), adapter.query_apy(&pair.base).ok())
            }
            None => (None, None),
        };

        Ok(PositionSummary {
            phase: self.phase(),
            pair,
            current_venue: self.current_venue,
            handle: self.venue_handle.clone(),
            idle: self.get_contract_balances(bank)?,
            deployed,
            user_deposits: AssetBalances {
                base: self.ledger.total(&pair.base),
                quote: self.ledger.total(&pair.quote),
            },
            depositors: pair
                .assets()
                .iter()
                .flat_map(|asset| self.ledger.depositors(asset))
                .collect::<BTreeSet<_>>()
                .len(),
            venue_apy,
        })
    }

    /// Custody balances of the configured pair
    pub fn get_contract_balances(&self, bank: &dyn AssetService) -> OrchestratorResult<AssetBalances> {
        let pair = self.require_pair()?;
        Ok(AssetBalances {
            base: bank.balance_of(&pair.base, &self.config.address),
            quote: bank.balance_of(&pair.quote, &self.config.address),
        })
    }

    pub fn get_user_balance(&self, user: &Address, asset: &Address) -> Amount {
        self.ledger.balance_of(user, asset)
    }

    pub fn total_user_deposits(&self, asset: &Address) -> Amount {
        self.ledger.total(asset)
    }

    /// Current lending rate for `asset`
    pub fn lending_apy(&self, venues: &Venues<'_>, asset: &Address) -> OrchestratorResult<BasisPoints> {
        venues
            .get_ref(VenueKind::Lending)?
            .query_apy(asset)
            .map_err(OrchestratorError::venue(VenueKind::Lending))
    }

    /// Switch the pooled funds to `target`, all or nothing
    ///
    /// Everything checkable is checked before the active deployment is
    /// unwound. If the target still refuses the funds afterwards, what came
    /// back is redeployed into the previous venue and the orchestrator state
    /// is restored, so the caller only ever sees the old deployment or the
    /// new one.
    #[allow(clippy::too_many_arguments)]
    fn provision(
        &mut self,
        venues: &mut Venues<'_>,
        bank: &mut dyn AssetService,
        caller: &Address,
        target: VenueKind,
        base_amount: Amount,
        quote_amount: Amount,
        params: Option<MarketMakingParams>,
        now: Timestamp,
    ) -> OrchestratorResult<VenueHandle> {
        self.ensure_operator(caller)?;
        let pair = self.require_pair()?;
        let request = ProvisionRequest {
            pair,
            base_amount,
            quote_amount,
            params,
        };
        if request.is_empty() {
            return Err(OrchestratorError::InvalidAmount);
        }
        venues
            .get_ref(target)?
            .check_provision(&request)
            .map_err(OrchestratorError::venue(target))?;
        self.ensure_deployable(venues, &*bank, &request, now)?;

        let snapshot = self.clone();
        // the active deployment, even on the target venue, is unwound first
        let retracted = match self.current_venue {
            Some(active) => Some((active, self.retract_active(venues, bank, active, now)?)),
            None => None,
        };

        let handle = match self.deploy(venues, bank, target, &request, now) {
            Ok(handle) => handle,
            Err(err) => {
                if let Some((previous, receipt)) = retracted {
                    self.restore(snapshot, venues, bank, previous, &receipt, now);
                }
                return Err(err);
            }
        };

        self.current_venue = Some(target);
        self.venue_handle = Some(handle.clone());
        self.active_params = params.filter(|_| target == VenueKind::MarketMaking);
        self.after_emergency = false;
        self.emit(
            now,
            EventKind::Provisioned {
                venue: target,
                handle: handle.clone(),
                base: request.base_amount.clone(),
                quote: request.quote_amount.clone(),
            },
        );
        tracing::info!(
            venue = %target,
            handle = %handle.id,
            base = %request.base_amount,
            quote = %request.quote_amount,
            "funds provisioned"
        );
        Ok(handle)
    }

    /// Custody plus whatever the active venue would return must cover `request`
    fn ensure_deployable(
        &self,
        venues: &Venues<'_>,
        bank: &dyn AssetService,
        request: &ProvisionRequest,
        now: Timestamp,
    ) -> OrchestratorResult<()> {
        let custody = self.config.address;
        let deployed = match self.current_venue {
            Some(active) => Some(
                venues
                    .get_ref(active)?
                    .query_position(bank, &custody, &request.pair, now)
                    .map_err(OrchestratorError::venue(active))?,
            ),
            None => None,
        };

        for (asset, amount) in request.legs() {
            let mut available = bank.balance_of(&asset, &custody);
            if let Some(position) = &deployed {
                let held = if asset == request.pair.base {
                    &position.base
                } else {
                    &position.quote
                };
                available = available + held.clone();
            }
            if available < *amount {
                return Err(OrchestratorError::InsufficientBalance {
                    asset,
                    required: amount.clone(),
                    available,
                });
            }
        }
        Ok(())
    }

    /// Move custody funds into `target`
    fn deploy(
        &self,
        venues: &mut Venues<'_>,
        bank: &mut dyn AssetService,
        target: VenueKind,
        request: &ProvisionRequest,
        now: Timestamp,
    ) -> OrchestratorResult<VenueHandle> {
        let custody = self.config.address;
        for (asset, amount) in request.legs() {
            let available = bank.balance_of(&asset, &custody);
            if available < *amount {
                return Err(OrchestratorError::InsufficientBalance {
                    asset,
                    required: amount.clone(),
                    available,
                });
            }
        }

        let mut ctx = VenueContext::new(bank, custody, now);
        venues
            .get(target)?
            .provision(&mut ctx, request)
            .map_err(OrchestratorError::venue(target))
    }

    /// Put retracted funds back into `previous` after a failed switch
    ///
    /// On success the pre-switch state comes back with the new handle. If
    /// the previous venue refuses too, the orchestrator stays idle and the
    /// funds stay in custody, which is still a consistent state.
    fn restore(
        &mut self,
        snapshot: StrategyOrchestrator,
        venues: &mut Venues<'_>,
        bank: &mut dyn AssetService,
        previous: VenueKind,
        receipt: &RetractReceipt,
        now: Timestamp,
    ) {
        let Some(pair) = self.pair else {
            return;
        };
        let request = ProvisionRequest {
            pair,
            base_amount: receipt.amount_of(&pair.base),
            quote_amount: receipt.amount_of(&pair.quote),
            params: snapshot.active_params,
        };
        if request.is_empty() {
            tracing::warn!(venue = %previous, "switch failed; previous venue held nothing");
            return;
        }

        match self.deploy(venues, bank, previous, &request, now) {
            Ok(handle) => {
                *self = snapshot;
                self.venue_handle = Some(handle);
                tracing::warn!(
                    venue = %previous,
                    base = %request.base_amount,
                    quote = %request.quote_amount,
                    "switch failed; funds redeployed to previous venue"
                );
            }
            Err(err) => {
                tracing::error!(
                    venue = %previous,
                    error = %err,
                    "switch failed; funds left in custody"
                );
            }
        }
    }

    /// Fully unwind `venue` back into custody; any failure aborts
    fn retract_active(
        &mut self,
        venues: &mut Venues<'_>,
        bank: &mut dyn AssetService,
        venue: VenueKind,
        now: Timestamp,
    ) -> OrchestratorResult<RetractReceipt> {
        let pair = self.require_pair()?;
        let adapter = venues.get(venue)?;
        let mut ctx = VenueContext::new(bank, self.config.address, now);

        let mut receipt = adapter
            .retract(&mut ctx, self.venue_handle.as_ref(), &pair.assets())
            .map_err(OrchestratorError::venue(venue))?;
        if venue.requires_sweep() {
            receipt = RetractReceipt::default();
            for asset in pair.assets() {
                let swept = adapter
                    .withdraw(&mut ctx, &asset, &Amount::zero())
                    .map_err(OrchestratorError::venue(venue))?;
                receipt.returned.push((asset, swept));
            }
        }

        self.current_venue = None;
        self.venue_handle = None;
        self.active_params = None;
        let (base, quote) = (receipt.amount_of(&pair.base), receipt.amount_of(&pair.quote));
        tracing::info!(venue = %venue, base = %base, quote = %quote, "funds retracted");
        self.emit(now, EventKind::Retracted { venue, base, quote });
        Ok(receipt)
    }

    fn attempt_retract(
        venues: &mut Venues<'_>,
        ctx: &mut VenueContext<'_>,
        venue: VenueKind,
        handle: Option<&VenueHandle>,
        assets: &[Address],
    ) -> OrchestratorResult<Amount> {
        let receipt = venues
            .get(venue)?
            .retract(ctx, handle, assets)
            .map_err(OrchestratorError::venue(venue))?;
        Ok(receipt.returned.into_iter().map(|(_, amount)| amount).sum())
    }

    fn attempt_sweep(
        venues: &mut Venues<'_>,
        ctx: &mut VenueContext<'_>,
        asset: &Address,
    ) -> OrchestratorResult<Amount> {
        venues
            .get(VenueKind::MarketMaking)?
            .withdraw(ctx, asset, &Amount::zero())
            .map_err(OrchestratorError::venue(VenueKind::MarketMaking))
    }

    fn record(
        &mut self,
        report: &mut EmergencyReport,
        action: RecoveryAction,
        outcome: StepOutcome,
        now: Timestamp,
    ) {
        match &outcome {
            StepOutcome::Failed(reason) => {
                tracing::warn!(step = %action, reason = %reason, "recovery step failed")
            }
            _ => tracing::info!(step = %action, outcome = ?outcome, "recovery step"),
        }
        self.emit(
            now,
            EventKind::RecoveryStep {
                action,
                outcome: outcome.clone(),
            },
        );
        report.steps.push(RecoveryStep { action, outcome });
    }

    fn emit(&mut self, now: Timestamp, kind: EventKind) {
        self.events.push(OrchestratorEvent::new(now, kind));
    }

    fn require_pair(&self) -> OrchestratorResult<AssetPair> {
        self.pair.ok_or(OrchestratorError::AssetsNotSet)
    }

    fn ensure_supported(&self, asset: &Address) -> OrchestratorResult<()> {
        if !self.require_pair()?.contains(asset) {
            return Err(OrchestratorError::UnsupportedAsset(*asset));
        }
        Ok(())
    }

    fn ensure_owner(&self, caller: &Address) -> OrchestratorResult<()> {
        if *caller != self.config.owner {
            return Err(OrchestratorError::UnauthorizedOperator(*caller));
        }
        Ok(())
    }

    fn ensure_operator(&self, caller: &Address) -> OrchestratorResult<()> {
        if !self.is_operator(caller) {
            return Err(OrchestratorError::UnauthorizedOperator(*caller));
        }
        Ok(())
    }
}
