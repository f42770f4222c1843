// lending-ledger/src/rates.rs

//! Rate model and the accrual formula
//!
//! Both functions are pure: every projected read and every lazy accrual
//! goes through them, so a read at time `t` and a write at time `t` agree.

use custody_core::{Amount, BasisPoints, BPS_DENOMINATOR, SECONDS_PER_YEAR};
use num_bigint::BigUint;
use rust_decimal::Decimal;

/// Utilization multiplier, bp-scaled
pub const UTILIZATION_MULTIPLIER: u64 = 200;

/// Current lending APY for a pool
///
/// `base + base * (utilization * 200 / 10000) / 10000`, each division floored
/// in that order.
pub fn lending_apy(base_apy: BasisPoints, utilization: BasisPoints) -> BasisPoints {
    let base = base_apy as u64;
    let boost = utilization as u64 * UTILIZATION_MULTIPLIER / BPS_DENOMINATOR;
    let apy = base + base * boost / BPS_DENOMINATOR;
    BasisPoints::try_from(apy).unwrap_or(BasisPoints::MAX)
}

/// Simple interest owed on `principal` over `elapsed` seconds
///
/// `principal * apy * elapsed / (10000 * SECONDS_PER_YEAR)`, floored. The
/// truncated remainder is lost for good.
pub fn accrued_interest(principal: &Amount, apy: BasisPoints, elapsed: u64) -> Amount {
    if elapsed == 0 || apy == 0 {
        return Amount::zero();
    }
    let numerator = BigUint::from(apy) * BigUint::from(elapsed);
    let denominator = BigUint::from(BPS_DENOMINATOR) * BigUint::from(SECONDS_PER_YEAR);
    principal
        .mul_div(&numerator, &denominator)
        .unwrap_or_else(Amount::zero)
}

/// Basis points as a percentage (`300` -> `3.00`)
pub fn apy_percent(apy: BasisPoints) -> Decimal {
    Decimal::new(apy as i64, 2)
}
