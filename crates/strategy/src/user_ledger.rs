// strategy/src/user_ledger.rs

use crate::{OrchestratorError, OrchestratorResult};
use custody_core::{Address, Amount};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What the orchestrator owes each user, per asset
///
/// A pure liability record: venue yield never flows into it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorLedger {
    /// (user, asset) -> recorded deposit
    deposits: BTreeMap<(Address, Address), Amount>,
    /// asset -> sum of recorded deposits
    totals: BTreeMap<Address, Amount>,
}

impl OrchestratorLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn credit(&mut self, user: &Address, asset: &Address, amount: &Amount) {
        let deposit = self.deposits.entry((*user, *asset)).or_default();
        *deposit = deposit.clone() + amount.clone();
        let total = self.totals.entry(*asset).or_default();
        *total = total.clone() + amount.clone();
    }

    pub fn debit(&mut self, user: &Address, asset: &Address, amount: &Amount) -> OrchestratorResult<()> {
        let available = self.balance_of(user, asset);
        let remaining =
            available
                .checked_sub(amount)
                .ok_or_else(|| OrchestratorError::InsufficientUserBalance {
                    user: *user,
                    asset: *asset,
                    requested: amount.clone(),
                    available: available.clone(),
                })?;

        self.deposits.insert((*user, *asset), remaining);
        let total = self.totals.entry(*asset).or_default();
        *total = total.saturating_sub(amount);
        Ok(())
    }

    pub fn balance_of(&self, user: &Address, asset: &Address) -> Amount {
        self.deposits
            .get(&(*user, *asset))
            .cloned()
            .unwrap_or_default()
    }

    /// Sum of every user's recorded deposit in `asset`
    pub fn total(&self, asset: &Address) -> Amount {
        self.totals.get(asset).cloned().unwrap_or_default()
    }

    /// Users with a non-zero deposit in `asset`
    pub fn depositors(&self, asset: &Address) -> Vec<Address> {
        self.deposits
            .iter()
            .filter(|((_, a), amount)| a == asset && !amount.is_zero())
            .map(|((user, _), _)| *user)
            .collect()
    }
}
