// strategy/src/market_making.rs

//! Simulated market-making venue
//!
//! Funds travel caller -> custody vault -> strategy instance on provision,
//! and instance -> vault on retract. A sweep then moves them from the vault
//! back to the caller. Each vault is created once per owner by the
//! [`VaultFactory`], at a deterministic address.

use crate::{
    venue::{
        AssetPair, ProvisionRequest, RetractReceipt, VenueAdapter, VenueContext, VenueHandle,
        VenueKind, VenuePosition,
    },
    VenueError, VenueResult,
};
use custody_core::{Address, Amount, AssetService, BasisPoints, Timestamp, BPS_DENOMINATOR};
use lending_ledger::rates;
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Most price levels a ladder may quote per side
pub const MAX_LEVELS: u8 = 64;

/// Quoting parameters, opaque to the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketMakingParams {
    /// Distance between best bid and best ask (bp)
    pub spread_bps: BasisPoints,
    /// Price levels per side
    pub levels: u8,
    /// Distance between consecutive levels (bp)
    pub step_bps: BasisPoints,
}

impl Default for MarketMakingParams {
    fn default() -> Self {
        Self {
            spread_bps: 50,
            levels: 5,
            step_bps: 10,
        }
    }
}

impl MarketMakingParams {
    pub fn validate(&self) -> VenueResult<()> {
        if self.levels == 0 || self.levels > MAX_LEVELS {
            return Err(VenueError::InvalidParams(format!(
                "levels must be within 1..={}, got {}",
                MAX_LEVELS, self.levels
            )));
        }
        if self.spread_bps as u64 > BPS_DENOMINATOR {
            return Err(VenueError::InvalidParams(format!(
                "spread {} bp exceeds 10000",
                self.spread_bps
            )));
        }
        if self.step_bps as u64 > BPS_DENOMINATOR {
            return Err(VenueError::InvalidParams(format!(
                "step {} bp exceeds 10000",
                self.step_bps
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Bid,
    Ask,
}

/// One resting order of a ladder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestingOrder {
    pub side: Side,
    /// 0 is the innermost level
    pub level: u8,
    /// Distance from mid (bp)
    pub offset_bps: BasisPoints,
    /// Bids are sized in quote, asks in base
    pub size: Amount,
}

/// Symmetric ladder over `base` (asks) and `quote` (bids)
///
/// Each side is split evenly across the levels with the division remainder
/// on the innermost order, so order sizes sum exactly to the inputs.
pub fn build_ladder(params: &MarketMakingParams, base: &Amount, quote: &Amount) -> Vec<RestingOrder> {
    let mut orders = Vec::new();
    for (side, total) in [(Side::Bid, quote), (Side::Ask, base)] {
        if total.is_zero() {
            continue;
        }
        let levels = BigUint::from(params.levels);
        let per_level = Amount::new(total.inner() / &levels);
        let remainder = Amount::new(total.inner() % &levels);

        for level in 0..params.levels {
            let size = if level == 0 {
                per_level.clone() + remainder.clone()
            } else {
                per_level.clone()
            };
            if size.is_zero() {
                continue;
            }
            let offset_bps = (params.spread_bps / 2)
                .saturating_add(params.step_bps.saturating_mul(level as BasisPoints));
            orders.push(RestingOrder {
                side,
                level,
                offset_bps,
                size,
            });
        }
    }
    orders
}

/// A deployed quoting strategy holding base and quote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyInstance {
    pub id: Address,
    pub vault: Address,
    pub pair: AssetPair,
    pub params: MarketMakingParams,
    pub base_deployed: Amount,
    pub quote_deployed: Amount,
    pub deployed_at: Timestamp,
    pub orders: Vec<RestingOrder>,
    pub active: bool,
}

impl StrategyInstance {
    /// Yield earned so far on each side at `yield_bps` per year
    pub fn pending_yield(&self, yield_bps: BasisPoints, now: Timestamp) -> (Amount, Amount) {
        let elapsed = now.saturating_sub(self.deployed_at);
        (
            rates::accrued_interest(&self.base_deployed, yield_bps, elapsed),
            rates::accrued_interest(&self.quote_deployed, yield_bps, elapsed),
        )
    }
}

/// Creates one custody vault per owner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultFactory {
    address: Address,
    nonce: u64,
    /// owner -> vault
    vaults: BTreeMap<Address, Address>,
}

impl VaultFactory {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            nonce: 0,
            vaults: BTreeMap::new(),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn vault_of(&self, owner: &Address) -> Option<Address> {
        self.vaults.get(owner).copied()
    }

    /// Create a vault for `owner`, or return the existing one
    pub fn create_custody_vault(&mut self, owner: &Address) -> Address {
        if let Some(vault) = self.vault_of(owner) {
            return vault;
        }
        let vault = Address::derive(&self.address, self.nonce);
        self.nonce += 1;
        self.vaults.insert(*owner, vault);
        tracing::info!(owner = %owner, vault = %vault, "custody vault created");
        vault
    }
}

/// Static configuration of the market-making venue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketMakingConfig {
    pub factory: Address,
    /// Account funding simulated yield
    pub yield_reserve: Address,
    /// Simulated annual yield (bp)
    pub yield_bps: BasisPoints,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketMakingVenue {
    factory: VaultFactory,
    yield_reserve: Address,
    yield_bps: BasisPoints,
    /// instance id -> instance
    instances: BTreeMap<Address, StrategyInstance>,
    deployments: u64,
}

impl MarketMakingVenue {
    pub fn new(config: MarketMakingConfig) -> VenueResult<Self> {
        if config.factory.is_zero() || config.yield_reserve.is_zero() {
            return Err(VenueError::Unavailable(
                "factory and yield reserve must be set".into(),
            ));
        }
        Ok(Self {
            factory: VaultFactory::new(config.factory),
            yield_reserve: config.yield_reserve,
            yield_bps: config.yield_bps,
            instances: BTreeMap::new(),
            deployments: 0,
        })
    }

    pub fn factory(&self) -> &VaultFactory {
        &self.factory
    }

    pub fn yield_reserve(&self) -> Address {
        self.yield_reserve
    }

    pub fn instance(&self, id: &Address) -> Option<&StrategyInstance> {
        self.instances.get(id)
    }

    pub fn active_instances(&self) -> impl Iterator<Item = &StrategyInstance> {
        self.instances.values().filter(|instance| instance.active)
    }

    fn ensure_funds(
        bank: &dyn AssetService,
        asset: &Address,
        holder: &Address,
        required: &Amount,
    ) -> VenueResult<()> {
        let available = bank.balance_of(asset, holder);
        if available < *required {
            return Err(VenueError::InsufficientFunds {
                asset: *asset,
                required: required.clone(),
                available,
            });
        }
        Ok(())
    }
}

impl VenueAdapter for MarketMakingVenue {
    fn kind(&self) -> VenueKind {
        VenueKind::MarketMaking
    }

    fn check_provision(&self, request: &ProvisionRequest) -> VenueResult<()> {
        request.params.unwrap_or_default().validate()?;
        if request.is_empty() {
            return Err(VenueError::InvalidAmount);
        }
        Ok(())
    }

    fn provision(
        &mut self,
        ctx: &mut VenueContext<'_>,
        request: &ProvisionRequest,
    ) -> VenueResult<VenueHandle> {
        self.check_provision(request)?;
        let params = request.params.unwrap_or_default();
        for (asset, amount) in request.legs() {
            Self::ensure_funds(&*ctx.bank, &asset, &ctx.caller, amount)?;
        }

        let vault = self.factory.create_custody_vault(&ctx.caller);
        let id = Address::derive(&vault, self.deployments);
        for (asset, amount) in request.legs() {
            ctx.bank.transfer(&asset, &ctx.caller, &vault, amount)?;
            ctx.bank.transfer(&asset, &vault, &id, amount)?;
        }
        self.deployments += 1;

        let instance = StrategyInstance {
            id,
            vault,
            pair: request.pair,
            params,
            base_deployed: request.base_amount.clone(),
            quote_deployed: request.quote_amount.clone(),
            deployed_at: ctx.now,
            orders: build_ladder(&params, &request.base_amount, &request.quote_amount),
            active: true,
        };
        tracing::info!(
            instance = %id,
            vault = %vault,
            base = %instance.base_deployed,
            quote = %instance.quote_deployed,
            orders = instance.orders.len(),
            "strategy deployed"
        );
        self.instances.insert(id, instance);

        Ok(VenueHandle::new(VenueKind::MarketMaking, id))
    }

    /// Liquidate the instance; principal and yield land in the vault
    fn retract(
        &mut self,
        ctx: &mut VenueContext<'_>,
        handle: Option<&VenueHandle>,
        _assets: &[Address],
    ) -> VenueResult<RetractReceipt> {
        let handle = handle.ok_or(VenueError::MissingHandle(VenueKind::MarketMaking))?;
        if handle.venue != VenueKind::MarketMaking {
            return Err(VenueError::WrongVenue {
                expected: VenueKind::MarketMaking,
                found: handle.venue,
            });
        }
        let instance = self
            .instances
            .get(&handle.id)
            .filter(|instance| instance.active)
            .ok_or(VenueError::UnknownHandle(handle.id))?;
        if self.factory.vault_of(&ctx.caller) != Some(instance.vault) {
            return Err(VenueError::Unauthorized(ctx.caller));
        }

        let pair = instance.pair;
        let vault = instance.vault;
        let legs = [
            (pair.base, instance.base_deployed.clone()),
            (pair.quote, instance.quote_deployed.clone()),
        ];
        for (asset, amount) in &legs {
            Self::ensure_funds(&*ctx.bank, asset, &handle.id, amount)?;
        }
        let (base_yield, quote_yield) = instance.pending_yield(self.yield_bps, ctx.now);

        let mut receipt = RetractReceipt::default();
        for ((asset, principal), earned) in legs.into_iter().zip([base_yield, quote_yield]) {
            if !principal.is_zero() {
                ctx.bank.transfer(&asset, &handle.id, &vault, &principal)?;
            }
            // yield is capped by what the reserve can pay
            let reserve = ctx.bank.balance_of(&asset, &self.yield_reserve);
            let paid = earned.min(reserve);
            if !paid.is_zero() {
                ctx.bank.transfer(&asset, &self.yield_reserve, &vault, &paid)?;
            }
            receipt.returned.push((asset, principal + paid));
        }

        if let Some(instance) = self.instances.get_mut(&handle.id) {
            instance.active = false;
            instance.orders.clear();
        }
        tracing::info!(
            instance = %handle.id,
            base = %receipt.amount_of(&pair.base),
            quote = %receipt.amount_of(&pair.quote),
            "strategy liquidated"
        );
        Ok(receipt)
    }

    /// Sweep the caller's vault
    fn withdraw(
        &mut self,
        ctx: &mut VenueContext<'_>,
        asset: &Address,
        amount: &Amount,
    ) -> VenueResult<Amount> {
        let Some(vault) = self.factory.vault_of(&ctx.caller) else {
            if amount.is_zero() {
                return Ok(Amount::zero());
            }
            return Err(VenueError::NoVault(ctx.caller));
        };

        let available = ctx.bank.balance_of(asset, &vault);
        let swept = if amount.is_zero() {
            available
        } else {
            Self::ensure_funds(&*ctx.bank, asset, &vault, amount)?;
            amount.clone()
        };
        if swept.is_zero() {
            return Ok(swept);
        }

        ctx.bank.transfer(asset, &vault, &ctx.caller, &swept)?;
        tracing::info!(vault = %vault, asset = %asset, amount = %swept, "vault swept");
        Ok(swept)
    }

    fn query_apy(&self, _asset: &Address) -> VenueResult<BasisPoints> {
        Ok(self.yield_bps)
    }

    fn query_position(
        &self,
        bank: &dyn AssetService,
        owner: &Address,
        pair: &AssetPair,
        now: Timestamp,
    ) -> VenueResult<VenuePosition> {
        let mut position = VenuePosition {
            venue: VenueKind::MarketMaking,
            base: Amount::zero(),
            quote: Amount::zero(),
        };
        let Some(vault) = self.factory.vault_of(owner) else {
            return Ok(position);
        };

        position.base = bank.balance_of(&pair.base, &vault);
        position.quote = bank.balance_of(&pair.quote, &vault);
        for instance in self.active_instances().filter(|i| i.vault == vault) {
            let (base_yield, quote_yield) = instance.pending_yield(self.yield_bps, now);
            position.base = position.base + instance.base_deployed.clone() + base_yield;
            position.quote = position.quote + instance.quote_deployed.clone() + quote_yield;
        }
        Ok(position)
    }
}
