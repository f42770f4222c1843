// custody-core/src/token.rs

use crate::{Address, Amount};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Result type for asset transfers
pub type TokenResult<T> = Result<T, TokenError>;

/// Errors raised by the underlying asset service
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("Zero address used as asset or account")]
    ZeroAddress,

    #[error("Insufficient balance of {asset} for {holder}: required {required}, available {available}")]
    InsufficientBalance {
        asset: Address,
        holder: Address,
        required: Amount,
        available: Amount,
    },

    #[error("Insufficient allowance of {asset} from {owner} to {spender}: required {required}, available {available}")]
    InsufficientAllowance {
        asset: Address,
        owner: Address,
        spender: Address,
        required: Amount,
        available: Amount,
    },
}

/// Fungible asset transfer primitives consumed by the ledger and orchestrator
///
/// `transfer` moves the caller's own funds (transfer-out), `transfer_from`
/// is the allowance-gated pull (transfer-in).
pub trait AssetService {
    fn balance_of(&self, asset: &Address, holder: &Address) -> Amount;

    fn allowance(&self, asset: &Address, owner: &Address, spender: &Address) -> Amount;

    fn approve(
        &mut self,
        asset: &Address,
        owner: &Address,
        spender: &Address,
        amount: &Amount,
    ) -> TokenResult<()>;

    fn transfer(
        &mut self,
        asset: &Address,
        from: &Address,
        to: &Address,
        amount: &Amount,
    ) -> TokenResult<()>;

    fn transfer_from(
        &mut self,
        asset: &Address,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: &Amount,
    ) -> TokenResult<()>;
}

/// In-memory multi-asset balance sheet
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenBank {
    /// (asset, holder) -> balance
    balances: BTreeMap<(Address, Address), Amount>,
    /// (asset, owner, spender) -> remaining allowance
    allowances: BTreeMap<(Address, Address, Address), Amount>,
    /// asset -> circulating supply
    supply: BTreeMap<Address, Amount>,
}

impl TokenBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create new units of `asset` for `to`
    pub fn mint(&mut self, asset: &Address, to: &Address, amount: &Amount) -> TokenResult<()> {
        if asset.is_zero() || to.is_zero() {
            return Err(TokenError::ZeroAddress);
        }
        let balance = self.balances.entry((*asset, *to)).or_default();
        *balance = balance.clone() + amount.clone();
        let supply = self.supply.entry(*asset).or_default();
        *supply = supply.clone() + amount.clone();
        tracing::debug!(asset = %asset, to = %to, amount = %amount, "minted");
        Ok(())
    }

    pub fn total_supply(&self, asset: &Address) -> Amount {
        self.supply.get(asset).cloned().unwrap_or_default()
    }

    /// Every non-zero balance of `holder`
    pub fn holdings(&self, holder: &Address) -> Vec<(Address, Amount)> {
        self.balances
            .iter()
            .filter(|((_, h), amount)| h == holder && !amount.is_zero())
            .map(|((asset, _), amount)| (*asset, amount.clone()))
            .collect()
    }

    fn debit(&mut self, asset: &Address, holder: &Address, amount: &Amount) -> TokenResult<()> {
        let available = self.balance_of(asset, holder);
        let remaining = available
            .checked_sub(amount)
            .ok_or_else(|| TokenError::InsufficientBalance {
                asset: *asset,
                holder: *holder,
                required: amount.clone(),
                available: available.clone(),
            })?;
        self.balances.insert((*asset, *holder), remaining);
        Ok(())
    }

    fn credit(&mut self, asset: &Address, holder: &Address, amount: &Amount) {
        let balance = self.balances.entry((*asset, *holder)).or_default();
        *balance = balance.clone() + amount.clone();
    }
}

impl AssetService for TokenBank {
    fn balance_of(&self, asset: &Address, holder: &Address) -> Amount {
        self.balances
            .get(&(*asset, *holder))
            .cloned()
            .unwrap_or_default()
    }

    fn allowance(&self, asset: &Address, owner: &Address, spender: &Address) -> Amount {
        self.allowances
            .get(&(*asset, *owner, *spender))
            .cloned()
            .unwrap_or_default()
    }

    fn approve(
        &mut self,
        asset: &Address,
        owner: &Address,
        spender: &Address,
        amount: &Amount,
    ) -> TokenResult<()> {
        if asset.is_zero() || owner.is_zero() || spender.is_zero() {
            return Err(TokenError::ZeroAddress);
        }
        self.allowances
            .insert((*asset, *owner, *spender), amount.clone());
        Ok(())
    }

    fn transfer(
        &mut self,
        asset: &Address,
        from: &Address,
        to: &Address,
        amount: &Amount,
    ) -> TokenResult<()> {
        if to.is_zero() {
            return Err(TokenError::ZeroAddress);
        }
        self.debit(asset, from, amount)?;
        self.credit(asset, to, amount);
        tracing::trace!(asset = %asset, from = %from, to = %to, amount = %amount, "transfer");
        Ok(())
    }

    fn transfer_from(
        &mut self,
        asset: &Address,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: &Amount,
    ) -> TokenResult<()> {
        let allowed = self.allowance(asset, from, spender);
        let remaining_allowance =
            allowed
                .checked_sub(amount)
                .ok_or_else(|| TokenError::InsufficientAllowance {
                    asset: *asset,
                    owner: *from,
                    spender: *spender,
                    required: amount.clone(),
                    available: allowed.clone(),
                })?;

        self.transfer(asset, from, to, amount)?;
        self.allowances
            .insert((*asset, *from, *spender), remaining_allowance);
        Ok(())
    }
}
