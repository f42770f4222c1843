// lending-ledger/src/pool.rs

use crate::{rates, LedgerError, LedgerResult};
use custody_core::{Address, Amount, BasisPoints, Shares, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Aggregate accounting for one asset
///
/// `total_deposits` and `total_shares` only move together through
/// deposit, withdraw and accrual; both are zero or both are non-zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolState {
    /// Deposits plus every interest amount that has been individually accrued
    pub total_deposits: Amount,
    /// Outstanding shares across all depositors
    pub total_shares: Shares,
    /// Base annual yield (basis points)
    pub base_apy: BasisPoints,
    /// Utilization (basis points, 0-10000)
    pub utilization_rate: BasisPoints,
    /// Accepts deposits and withdrawals
    pub active: bool,
    /// Creation timestamp
    pub created_at: Timestamp,
}

impl PoolState {
    /// Zeroed pool
    pub fn new(base_apy: BasisPoints, created_at: Timestamp) -> Self {
        Self {
            total_deposits: Amount::zero(),
            total_shares: Shares::zero(),
            base_apy,
            utilization_rate: 0,
            active: true,
            created_at,
        }
    }

    /// APY currently applied by accrual
    pub fn lending_apy(&self) -> BasisPoints {
        rates::lending_apy(self.base_apy, self.utilization_rate)
    }

    /// Shares minted for a deposit of `amount`
    ///
    /// 1:1 for the first deposit, otherwise priced against the current
    /// (possibly stale) aggregate totals.
    pub fn shares_for_deposit(&self, amount: &Amount) -> LedgerResult<Shares> {
        if self.total_shares.is_zero() {
            return Ok(amount.clone());
        }
        amount
            .mul_div_amount(&self.total_shares, &self.total_deposits)
            .ok_or_else(|| {
                LedgerError::Calculation("pool has shares but no deposits".into())
            })
    }

    /// Apply a deposit to the aggregate totals
    pub fn add_deposit(&mut self, amount: &Amount, shares: &Shares) {
        self.total_deposits = self.total_deposits.clone() + amount.clone();
        self.total_shares = self.total_shares.clone() + shares.clone();
    }

    /// Remove a withdrawal from the aggregate totals
    pub fn remove_deposit(&mut self, amount: &Amount, shares: &Shares) -> LedgerResult<()> {
        self.total_deposits = self
            .total_deposits
            .checked_sub(amount)
            .ok_or_else(|| LedgerError::Calculation("total deposits underflow".into()))?;
        self.total_shares = self
            .total_shares
            .checked_sub(shares)
            .ok_or_else(|| LedgerError::Calculation("total shares underflow".into()))?;
        Ok(())
    }
}

/// Read-only snapshot of a pool with interest projected to a point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolInfo {
    pub asset: Address,
    /// Stored total plus every depositor's pending interest
    pub total_deposits: Amount,
    pub total_shares: Shares,
    pub base_apy: BasisPoints,
    pub utilization_rate: BasisPoints,
    /// Rate after the utilization boost
    pub current_apy: BasisPoints,
    /// `current_apy` as a percentage
    pub apy_percent: Decimal,
    pub active: bool,
    /// Positions holding principal
    pub depositors: usize,
    pub created_at: Timestamp,
}
