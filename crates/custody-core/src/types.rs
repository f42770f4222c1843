// custody-core/src/types.rs

use crate::CoreError;
use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};
use serde::{Deserialize, Serialize};
use std::iter::Sum;
use std::ops::{Add, Sub};
use std::str::FromStr;

/// Timestamp in Unix epoch seconds
pub type Timestamp = u64;

/// Rate expressed in basis points (1 bp = 0.01%)
pub type BasisPoints = u32;

/// Denominator for every basis-point ratio
pub const BPS_DENOMINATOR: u64 = 10_000;

pub const SECONDS_PER_DAY: u64 = 24 * 3600;

/// Interest year used by the accrual formula (365 days, no leap handling)
pub const SECONDS_PER_YEAR: u64 = 365 * SECONDS_PER_DAY;

/// Decimals of the base unit used by `Amount::from_tokens`
pub const TOKEN_DECIMALS: u32 = 18;

/// Token amount in base units (arbitrary precision)
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Amount(BigUint);

impl Amount {
    pub fn new(value: BigUint) -> Self {
        Self(value)
    }

    pub fn zero() -> Self {
        Self(BigUint::zero())
    }

    pub fn from_u64(value: u64) -> Self {
        Self(BigUint::from(value))
    }

    pub fn from_u128(value: u128) -> Self {
        Self(BigUint::from(value))
    }

    /// Whole tokens scaled by `TOKEN_DECIMALS`
    pub fn from_tokens(tokens: u64) -> Self {
        Self(BigUint::from(tokens) * BigUint::from(10u64).pow(TOKEN_DECIMALS))
    }

    pub fn inner(&self) -> &BigUint {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Lossless narrowing, `None` when the value does not fit
    pub fn to_u64(&self) -> Option<u64> {
        self.0.to_u64()
    }

    pub fn to_u128(&self) -> Option<u128> {
        self.0.to_u128()
    }

    pub fn checked_add(&self, other: &Amount) -> Option<Amount> {
        Some(Amount(&self.0 + &other.0))
    }

    pub fn checked_sub(&self, other: &Amount) -> Option<Amount> {
        if self.0 < other.0 {
            None
        } else {
            Some(Amount(&self.0 - &other.0))
        }
    }

    pub fn saturating_sub(&self, other: &Amount) -> Amount {
        self.checked_sub(other).unwrap_or_else(Amount::zero)
    }

    /// `self * numerator / denominator`, floored. `None` on a zero denominator.
    pub fn mul_div(&self, numerator: &BigUint, denominator: &BigUint) -> Option<Amount> {
        if denominator.is_zero() {
            return None;
        }
        Some(Amount(&self.0 * numerator / denominator))
    }

    /// `self * numerator / denominator` over two amounts, floored
    pub fn mul_div_amount(&self, numerator: &Amount, denominator: &Amount) -> Option<Amount> {
        self.mul_div(&numerator.0, &denominator.0)
    }

    /// Apply a basis-point fraction, floored
    pub fn bps(&self, rate: BasisPoints) -> Amount {
        Amount(&self.0 * BigUint::from(rate) / BigUint::from(BPS_DENOMINATOR))
    }
}

impl Add for Amount {
    type Output = Amount;

    fn add(self, other: Amount) -> Amount {
        Amount(self.0 + other.0)
    }
}

impl Sub for Amount {
    type Output = Amount;

    fn sub(self, other: Amount) -> Amount {
        Amount(self.0 - other.0)
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Self {
        iter.fold(Amount::zero(), |acc, a| acc + a)
    }
}

impl<'a> Sum<&'a Amount> for Amount {
    fn sum<I: Iterator<Item = &'a Amount>>(iter: I) -> Self {
        iter.fold(Amount::zero(), |acc, a| Amount(acc.0 + &a.0))
    }
}

impl From<u64> for Amount {
    fn from(value: u64) -> Self {
        Self::from_u64(value)
    }
}

impl FromStr for Amount {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.trim().replace('_', "");
        BigUint::from_str(&digits)
            .map(Amount)
            .map_err(|e| CoreError::InvalidAmount(format!("{s}: {e}")))
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Proportional claim on a pool, same precision as `Amount`
pub type Shares = Amount;
