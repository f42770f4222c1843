// lending-ledger/src/position.rs

use crate::rates;
use custody_core::{Amount, BasisPoints, Shares, Timestamp};
use serde::{Deserialize, Serialize};

/// One depositor's stake in one pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPosition {
    /// Deposited amount including interest compounded by past accruals
    pub principal: Amount,
    /// Shares held
    pub shares: Shares,
    /// Last time interest was folded into `principal`
    pub last_accrual_time: Timestamp,
    /// Interest accrued and not yet paid out by a claim
    pub unclaimed_interest: Amount,
}

impl UserPosition {
    pub fn new(now: Timestamp) -> Self {
        Self {
            principal: Amount::zero(),
            shares: Shares::zero(),
            last_accrual_time: now,
            unclaimed_interest: Amount::zero(),
        }
    }

    pub fn has_principal(&self) -> bool {
        !self.principal.is_zero()
    }

    /// Interest that the next accrual at `now` would add
    pub fn pending_interest(&self, apy: BasisPoints, now: Timestamp) -> Amount {
        let elapsed = now.saturating_sub(self.last_accrual_time);
        rates::accrued_interest(&self.principal, apy, elapsed)
    }

    /// Fold interest since the last accrual into the position
    ///
    /// No-op when no time has elapsed. Returns the interest added, which the
    /// caller must also add to the pool total.
    pub fn accrue(&mut self, apy: BasisPoints, now: Timestamp) -> Amount {
        let elapsed = now.saturating_sub(self.last_accrual_time);
        if elapsed == 0 {
            return Amount::zero();
        }
        let interest = rates::accrued_interest(&self.principal, apy, elapsed);
        self.principal = self.principal.clone() + interest.clone();
        self.unclaimed_interest = self.unclaimed_interest.clone() + interest.clone();
        self.last_accrual_time = now;
        interest
    }

    /// Copy of the position as an accrual at `now` would leave it
    pub fn projected(&self, apy: BasisPoints, now: Timestamp) -> Self {
        let mut projected = self.clone();
        projected.accrue(apy, now);
        projected
    }
}
