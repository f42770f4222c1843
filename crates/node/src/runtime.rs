// node/src/runtime.rs
use crate::{NodeConfig, RuntimeResult};
use custody_core::{
    Address, Amount, AssetService, BasisPoints, Clock, ManualClock, Shares, Timestamp, TokenBank,
};
use lending_ledger::AssetPoolLedger;
use serde::{Deserialize, Serialize};
use std::path::Path;
use strategy::{
    EmergencyReport, LendingVenue, MarketMakingConfig, MarketMakingParams, MarketMakingVenue,
    OrchestratorConfig, StrategyOrchestrator, VenueHandle, Venues,
};

/// Everything the allocator persists between runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct World {
    /// Time of the last committed transaction
    pub now: Timestamp,
    pub bank: TokenBank,
    pub lending: LendingVenue,
    pub market_making: MarketMakingVenue,
    pub orchestrator: StrategyOrchestrator,
}

impl World {
    /// Fresh world with pools opened and the asset pair configured
    pub fn genesis(config: &NodeConfig, clock: &dyn Clock) -> RuntimeResult<Self> {
        let accounts = config.resolve_accounts()?;
        let pair = config.asset_pair()?;
        let now = config.genesis_time.unwrap_or_else(|| clock.now());
        tracing::info!(clock = clock.name(), now, "building genesis state");

        let mut ledger = AssetPoolLedger::new(accounts.ledger, accounts.owner)?;
        for pool in &config.pools {
            let asset = crate::parse_account(&pool.asset)?;
            ledger.add_pool(&accounts.owner, asset, pool.base_apy, now)?;
            if pool.utilization > 0 {
                ledger.update_utilization(&accounts.owner, &asset, pool.utilization)?;
            }
        }

        let market_making = MarketMakingVenue::new(MarketMakingConfig {
            factory: accounts.vault_factory,
            yield_reserve: accounts.yield_reserve,
            yield_bps: config.market_making.yield_bps,
        })?;

        let mut orchestrator = StrategyOrchestrator::new(OrchestratorConfig {
            address: accounts.orchestrator,
            owner: accounts.owner,
            agent: accounts.agent,
        })?;
        orchestrator.set_assets(&accounts.owner, pair.base, pair.quote, now)?;

        Ok(Self {
            now,
            bank: TokenBank::new(),
            lending: LendingVenue::new(ledger),
            market_making,
            orchestrator,
        })
    }

    pub fn load(path: &Path) -> RuntimeResult<Self> {
        let bytes = std::fs::read(path)?;
        Ok(bincode::deserialize(&bytes)?)
    }

    pub fn save(&self, path: &Path) -> RuntimeResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let bytes = bincode::serialize(self)?;
        std::fs::write(path, &bytes)?;
        tracing::debug!(path = %path.display(), bytes = bytes.len(), "state saved");
        Ok(())
    }

    fn venues(&mut self) -> (Venues<'_>, &mut TokenBank, &mut StrategyOrchestrator) {
        (
            Venues::new(&mut self.market_making, &mut self.lending),
            &mut self.bank,
            &mut self.orchestrator,
        )
    }
}

/// Balances rendered as decimal strings
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceView {
    pub base: String,
    pub quote: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolView {
    pub asset: String,
    pub total_deposits: String,
    pub total_shares: String,
    pub current_apy_bps: BasisPoints,
    pub apy_percent: String,
    pub utilization_bps: BasisPoints,
    pub depositors: usize,
    pub available_liquidity: String,
}

/// Snapshot printed by `allocator-node status`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub now: Timestamp,
    pub phase: String,
    pub venue: Option<String>,
    pub handle: Option<String>,
    pub idle: BalanceView,
    pub deployed: Option<BalanceView>,
    pub user_deposits: BalanceView,
    pub depositors: usize,
    pub venue_apy_bps: Option<BasisPoints>,
    pub pools: Vec<PoolView>,
    pub total_value_locked: String,
    pub events: usize,
}

/// Serializes operations over a [`World`]
///
/// Each operation runs against a copy of the world that replaces the
/// committed one only when the operation succeeds.
pub struct Runtime {
    world: World,
    clock: ManualClock,
}

impl Runtime {
    pub fn new(world: World) -> Self {
        let clock = ManualClock::new(world.now);
        Self { world, clock }
    }

    pub fn genesis(config: &NodeConfig, clock: &dyn Clock) -> RuntimeResult<Self> {
        Ok(Self::new(World::genesis(config, clock)?))
    }

    pub fn load(path: &Path) -> RuntimeResult<Self> {
        Ok(Self::new(World::load(path)?))
    }

    pub fn save(&self, path: &Path) -> RuntimeResult<()> {
        self.world.save(path)
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Move simulated time forward
    pub fn advance(&mut self, seconds: u64) -> Timestamp {
        let now = self.clock.advance(seconds);
        self.world.now = now;
        tracing::info!(seconds, now, "clock advanced");
        now
    }

    /// Run `op` as one all-or-nothing transaction
    pub fn transact<T, F>(&mut self, op: F) -> RuntimeResult<T>
    where
        F: FnOnce(&mut World, Timestamp) -> RuntimeResult<T>,
    {
        let now = self.clock.now();
        let mut draft = self.world.clone();
        draft.now = now;
        match op(&mut draft, now) {
            Ok(output) => {
                self.world = draft;
                Ok(output)
            }
            Err(err) => {
                tracing::debug!(error = %err, "transaction reverted");
                Err(err)
            }
        }
    }

    /// Mint `amount` of `asset` to `account`
    pub fn fund(&mut self, account: Address, asset: Address, amount: Amount) -> RuntimeResult<()> {
        self.transact(|world, _| Ok(world.bank.mint(&asset, &account, &amount)?))
    }

    pub fn approve(
        &mut self,
        owner: Address,
        asset: Address,
        spender: Address,
        amount: Amount,
    ) -> RuntimeResult<()> {
        self.transact(|world, _| Ok(world.bank.approve(&asset, &owner, &spender, &amount)?))
    }

    /// Deposit into the orchestrator; needs a prior approval of its address
    pub fn deposit(&mut self, user: Address, asset: Address, amount: Amount) -> RuntimeResult<()> {
        self.transact(|world, now| {
            Ok(world
                .orchestrator
                .deposit(&mut world.bank, &user, &asset, &amount, now)?)
        })
    }

    pub fn withdraw(&mut self, user: Address, asset: Address, amount: Amount) -> RuntimeResult<()> {
        self.transact(|world, now| {
            Ok(world
                .orchestrator
                .withdraw(&mut world.bank, &user, &asset, &amount, now)?)
        })
    }

    /// Deposit straight into the lending ledger; needs a prior approval
    pub fn lend(&mut self, user: Address, asset: Address, amount: Amount) -> RuntimeResult<Shares> {
        self.transact(|world, now| {
            Ok(world
                .lending
                .ledger_mut()
                .deposit(&mut world.bank, &user, &asset, &amount, now)?)
        })
    }

    /// Withdraw from the lending ledger; zero redeems everything
    pub fn redeem(&mut self, user: Address, asset: Address, amount: Amount) -> RuntimeResult<Amount> {
        self.transact(|world, now| {
            Ok(world
                .lending
                .ledger_mut()
                .withdraw(&mut world.bank, &user, &asset, &amount, now)?)
        })
    }

    pub fn claim(&mut self, user: Address, asset: Address) -> RuntimeResult<Amount> {
        self.transact(|world, now| {
            Ok(world
                .lending
                .ledger_mut()
                .claim_interest(&mut world.bank, &user, &asset, now)?)
        })
    }

    pub fn provision_market_making(
        &mut self,
        caller: Address,
        base: Amount,
        quote: Amount,
        params: MarketMakingParams,
    ) -> RuntimeResult<VenueHandle> {
        self.transact(|world, now| {
            let (mut venues, bank, orchestrator) = world.venues();
            Ok(orchestrator.provision_to_market_making(
                &mut venues,
                bank,
                &caller,
                base,
                quote,
                params,
                now,
            )?)
        })
    }

    pub fn provision_lending(
        &mut self,
        caller: Address,
        base: Amount,
        quote: Amount,
    ) -> RuntimeResult<VenueHandle> {
        self.transact(|world, now| {
            let (mut venues, bank, orchestrator) = world.venues();
            Ok(orchestrator.provision_to_lending(&mut venues, bank, &caller, base, quote, now)?)
        })
    }

    pub fn emergency(&mut self, caller: Address) -> RuntimeResult<EmergencyReport> {
        self.transact(|world, now| {
            let (mut venues, bank, orchestrator) = world.venues();
            Ok(orchestrator.emergency_withdraw(&mut venues, bank, &caller, now)?)
        })
    }

    /// Read-only snapshot at the current simulated time
    pub fn status(&mut self) -> RuntimeResult<StatusReport> {
        let now = self.clock.now();
        let world = &mut self.world;
        let venues = Venues::new(&mut world.market_making, &mut world.lending);
        let summary = world
            .orchestrator
            .get_position_summary(&venues, &world.bank, now)?;
        drop(venues);

        let ledger = world.lending.ledger();
        let mut pools = Vec::new();
        for asset in ledger.supported_assets() {
            let info = ledger.get_pool_info(asset, now)?;
            pools.push(PoolView {
                asset: asset.to_hex(),
                total_deposits: info.total_deposits.to_string(),
                total_shares: info.total_shares.to_string(),
                current_apy_bps: info.current_apy,
                apy_percent: info.apy_percent.to_string(),
                utilization_bps: info.utilization_rate,
                depositors: info.depositors,
                available_liquidity: ledger.get_available_liquidity(asset, now)?.to_string(),
            });
        }

        Ok(StatusReport {
            now,
            phase: summary.phase.to_string(),
            venue: summary.current_venue.map(|venue| venue.to_string()),
            handle: summary.handle.map(|handle| handle.id.to_hex()),
            idle: BalanceView {
                base: summary.idle.base.to_string(),
                quote: summary.idle.quote.to_string(),
            },
            deployed: summary.deployed.map(|position| BalanceView {
                base: position.base.to_string(),
                quote: position.quote.to_string(),
            }),
            user_deposits: BalanceView {
                base: summary.user_deposits.base.to_string(),
                quote: summary.user_deposits.quote.to_string(),
            },
            depositors: summary.depositors,
            venue_apy_bps: summary.venue_apy,
            pools,
            total_value_locked: ledger.get_total_value_locked(now).to_string(),
            events: world.orchestrator.events().len(),
        })
    }

    /// Custody balance of `holder` in `asset`
    pub fn balance_of(&self, asset: &Address, holder: &Address) -> Amount {
        self.world.bank.balance_of(asset, holder)
    }
}
