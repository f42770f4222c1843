// strategy/src/lending_venue.rs

use crate::{
    venue::{
        AssetPair, ProvisionRequest, RetractReceipt, VenueAdapter, VenueContext, VenueHandle,
        VenueKind, VenuePosition,
    },
    VenueError, VenueResult,
};
use custody_core::{Address, Amount, AssetService, BasisPoints, Timestamp};
use lending_ledger::AssetPoolLedger;
use serde::{Deserialize, Serialize};

/// Lending venue backed by the asset pool ledger
///
/// The caller becomes an ordinary depositor; yield accrues inside the
/// ledger under the caller's own position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LendingVenue {
    ledger: AssetPoolLedger,
}

impl LendingVenue {
    pub fn new(ledger: AssetPoolLedger) -> Self {
        Self { ledger }
    }

    pub fn ledger(&self) -> &AssetPoolLedger {
        &self.ledger
    }

    /// Direct access for pool administration and end-user deposits
    pub fn ledger_mut(&mut self) -> &mut AssetPoolLedger {
        &mut self.ledger
    }

    fn handle(&self) -> VenueHandle {
        VenueHandle::new(VenueKind::Lending, self.ledger.address())
    }

    /// Reverse a transfer made earlier in a call that is now failing
    fn move_back(ctx: &mut VenueContext<'_>, asset: &Address, from: &Address, to: &Address, amount: &Amount) {
        if amount.is_zero() {
            return;
        }
        if let Err(err) = ctx.bank.transfer(asset, from, to, amount) {
            tracing::error!(asset = %asset, amount = %amount, error = %err, "failed to reverse transfer");
        }
    }
}

impl VenueAdapter for LendingVenue {
    fn kind(&self) -> VenueKind {
        VenueKind::Lending
    }

    fn check_provision(&self, request: &ProvisionRequest) -> VenueResult<()> {
        if request.is_empty() {
            return Err(VenueError::InvalidAmount);
        }
        for (asset, _) in request.legs() {
            self.ledger.get_lending_apy(&asset)?;
        }
        Ok(())
    }

    /// Deposit every leg, or none of them
    fn provision(
        &mut self,
        ctx: &mut VenueContext<'_>,
        request: &ProvisionRequest,
    ) -> VenueResult<VenueHandle> {
        self.check_provision(request)?;

        let spender = self.ledger.address();
        let snapshot = self.ledger.clone();
        let mut allowances = Vec::new();
        let mut deposited = Vec::new();
        for (asset, amount) in request.legs() {
            allowances.push((asset, ctx.bank.allowance(&asset, &ctx.caller, &spender)));
            let result = match ctx.bank.approve(&asset, &ctx.caller, &spender, amount) {
                Ok(()) => self
                    .ledger
                    .deposit(ctx.bank, &ctx.caller, &asset, amount, ctx.now)
                    .map_err(VenueError::from),
                Err(err) => Err(err.into()),
            };
            if let Err(err) = result {
                self.ledger = snapshot;
                let caller = ctx.caller;
                for (asset, amount) in &deposited {
                    Self::move_back(ctx, asset, &spender, &caller, amount);
                }
                for (asset, allowance) in &allowances {
                    if let Err(err) = ctx.bank.approve(asset, &ctx.caller, &spender, allowance) {
                        tracing::error!(asset = %asset, error = %err, "failed to restore allowance");
                    }
                }
                return Err(err);
            }
            deposited.push((asset, amount.clone()));
        }

        tracing::info!(
            caller = %ctx.caller,
            base = %request.base_amount,
            quote = %request.quote_amount,
            "provisioned into lending"
        );
        Ok(self.handle())
    }

    /// Withdraw the caller's whole position in every asset, or in none
    fn retract(
        &mut self,
        ctx: &mut VenueContext<'_>,
        handle: Option<&VenueHandle>,
        assets: &[Address],
    ) -> VenueResult<RetractReceipt> {
        if let Some(handle) = handle {
            if handle.venue != VenueKind::Lending {
                return Err(VenueError::WrongVenue {
                    expected: VenueKind::Lending,
                    found: handle.venue,
                });
            }
        }

        let ledger = self.ledger.address();
        let snapshot = self.ledger.clone();
        let mut receipt = RetractReceipt::default();
        for asset in assets {
            if self.ledger.balance_of(&ctx.caller, asset, ctx.now).is_zero() {
                receipt.returned.push((*asset, Amount::zero()));
                continue;
            }
            let amount = match self
                .ledger
                .withdraw(ctx.bank, &ctx.caller, asset, &Amount::zero(), ctx.now)
            {
                Ok(amount) => amount,
                Err(err) => {
                    self.ledger = snapshot;
                    let caller = ctx.caller;
                    for (asset, amount) in &receipt.returned {
                        Self::move_back(ctx, asset, &caller, &ledger, amount);
                    }
                    return Err(err.into());
                }
            };
            tracing::info!(caller = %ctx.caller, asset = %asset, amount = %amount, "retracted from lending");
            receipt.returned.push((*asset, amount));
        }
        Ok(receipt)
    }

    fn withdraw(
        &mut self,
        ctx: &mut VenueContext<'_>,
        asset: &Address,
        amount: &Amount,
    ) -> VenueResult<Amount> {
        Ok(self
            .ledger
            .withdraw(ctx.bank, &ctx.caller, asset, amount, ctx.now)?)
    }

    fn query_apy(&self, asset: &Address) -> VenueResult<BasisPoints> {
        Ok(self.ledger.get_lending_apy(asset)?)
    }

    fn query_position(
        &self,
        _bank: &dyn AssetService,
        owner: &Address,
        pair: &AssetPair,
        now: Timestamp,
    ) -> VenueResult<VenuePosition> {
        Ok(VenuePosition {
            venue: VenueKind::Lending,
            base: self.ledger.balance_of(owner, &pair.base, now),
            quote: self.ledger.balance_of(owner, &pair.quote, now),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use custody_core::{TokenBank, SECONDS_PER_YEAR};
    use lending_ledger::LedgerError;

    const T0: Timestamp = 1_700_000_000;

    fn setup() -> (LendingVenue, TokenBank, AssetPair, Address) {
        let owner = Address::from_label("owner");
        let pair = AssetPair::new(Address::from_label("weth"), Address::from_label("usdc"));
        let mut ledger = AssetPoolLedger::new(Address::from_label("ledger"), owner).unwrap();
        ledger.add_pool(&owner, pair.base, 300, T0).unwrap();
        ledger.add_pool(&owner, pair.quote, 300, T0).unwrap();

        let caller = Address::from_label("orchestrator");
        let mut bank = TokenBank::new();
        for asset in pair.assets() {
            bank.mint(&asset, &caller, &Amount::from_u64(1_000)).unwrap();
            bank.mint(&asset, &ledger.address(), &Amount::from_u64(1_000))
                .unwrap();
        }
        (LendingVenue::new(ledger), bank, pair, caller)
    }

    fn request(pair: AssetPair, base: u64, quote: u64) -> ProvisionRequest {
        ProvisionRequest {
            pair,
            base_amount: Amount::from_u64(base),
            quote_amount: Amount::from_u64(quote),
            params: None,
        }
    }

    #[test]
    fn test_provision_deposits_each_leg() {
        let (mut venue, mut bank, pair, caller) = setup();
        let mut ctx = VenueContext::new(&mut bank, caller, T0);

        let handle = venue.provision(&mut ctx, &request(pair, 100, 0)).unwrap();

        assert_eq!(handle.venue, VenueKind::Lending);
        assert_eq!(venue.ledger().balance_of(&caller, &pair.base, T0), Amount::from_u64(100));
        assert!(venue.ledger().position(&caller, &pair.quote).is_none());
        assert_eq!(bank.balance_of(&pair.base, &caller), Amount::from_u64(900));
    }

    #[test]
    fn test_retract_returns_principal_with_yield() {
        let (mut venue, mut bank, pair, caller) = setup();
        venue
            .provision(&mut VenueContext::new(&mut bank, caller, T0), &request(pair, 100, 200))
            .unwrap();

        let later = T0 + SECONDS_PER_YEAR;
        let receipt = venue
            .retract(
                &mut VenueContext::new(&mut bank, caller, later),
                None,
                &pair.assets(),
            )
            .unwrap();

        assert_eq!(receipt.amount_of(&pair.base), Amount::from_u64(103));
        assert_eq!(receipt.amount_of(&pair.quote), Amount::from_u64(206));
        assert_eq!(bank.balance_of(&pair.base, &caller), Amount::from_u64(1_003));
    }

    #[test]
    fn test_retract_without_position_is_empty() {
        let (mut venue, mut bank, pair, caller) = setup();
        let receipt = venue
            .retract(&mut VenueContext::new(&mut bank, caller, T0), None, &pair.assets())
            .unwrap();
        assert!(receipt.amount_of(&pair.base).is_zero());
        assert!(receipt.amount_of(&pair.quote).is_zero());
    }

    #[test]
    fn test_retract_rejects_foreign_handle() {
        let (mut venue, mut bank, pair, caller) = setup();
        let handle = VenueHandle::new(VenueKind::MarketMaking, Address::from_label("instance"));
        let err = venue
            .retract(
                &mut VenueContext::new(&mut bank, caller, T0),
                Some(&handle),
                &pair.assets(),
            )
            .unwrap_err();
        assert!(matches!(err, VenueError::WrongVenue { .. }));
    }

    #[test]
    fn test_unknown_pool_surfaces_ledger_error() {
        let (venue, _, _, _) = setup();
        let dai = Address::from_label("dai");
        assert_eq!(
            venue.query_apy(&dai),
            Err(VenueError::Ledger(LedgerError::PoolNotActive(dai)))
        );
    }

    #[test]
    fn test_failed_leg_undoes_earlier_deposit() {
        let (mut venue, mut bank, pair, caller) = setup();
        let before = venue.clone();
        let spender = venue.ledger().address();

        // the quote leg exceeds what the caller holds
        let err = venue
            .provision(&mut VenueContext::new(&mut bank, caller, T0), &request(pair, 100, 5_000))
            .unwrap_err();

        assert!(matches!(err, VenueError::Ledger(LedgerError::Transfer(_))));
        assert_eq!(venue, before);
        assert_eq!(bank.balance_of(&pair.base, &caller), Amount::from_u64(1_000));
        assert_eq!(bank.balance_of(&pair.base, &spender), Amount::from_u64(1_000));
        assert!(bank.allowance(&pair.base, &caller, &spender).is_zero());
    }

    #[test]
    fn test_unknown_pool_rejected_before_any_deposit() {
        let (mut venue, mut bank, pair, caller) = setup();
        let dai = Address::from_label("dai");
        let request = request(AssetPair::new(pair.base, dai), 100, 100);

        assert!(venue.check_provision(&request).is_err());
        assert!(venue
            .provision(&mut VenueContext::new(&mut bank, caller, T0), &request)
            .is_err());
        assert!(venue.ledger().position(&caller, &pair.base).is_none());
        assert_eq!(bank.balance_of(&pair.base, &caller), Amount::from_u64(1_000));
    }

    #[test]
    fn test_failed_retract_restores_every_asset() {
        let (mut venue, mut bank, pair, caller) = setup();
        venue
            .provision(&mut VenueContext::new(&mut bank, caller, T0), &request(pair, 100, 200))
            .unwrap();
        let before = venue.clone();

        // drain the quote pool's liquidity so that leg cannot be paid
        let ledger = venue.ledger().address();
        let drained = bank.balance_of(&pair.quote, &ledger);
        bank.transfer(&pair.quote, &ledger, &Address::from_label("sink"), &drained)
            .unwrap();

        let later = T0 + SECONDS_PER_YEAR;
        let err = venue
            .retract(
                &mut VenueContext::new(&mut bank, caller, later),
                None,
                &pair.assets(),
            )
            .unwrap_err();

        assert!(matches!(err, VenueError::Ledger(_)));
        assert_eq!(venue, before);
        assert_eq!(bank.balance_of(&pair.base, &caller), Amount::from_u64(900));
        assert_eq!(bank.balance_of(&pair.base, &ledger), Amount::from_u64(1_100));
        assert_eq!(venue.ledger().balance_of(&caller, &pair.base, later), Amount::from_u64(103));
    }
}
