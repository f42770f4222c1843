// lending-ledger/src/lib.rs

//! Share-based multi-asset lending ledger
//!
//! Each asset gets an isolated pool. Depositors receive shares priced
//! against the pool's last-written totals and earn simple interest that is
//! folded into their principal lazily, whenever they touch their position.

pub mod ledger;
pub mod pool;
pub mod position;
pub mod rates;

pub use ledger::{AssetPoolLedger, MAX_UTILIZATION};
pub use pool::{PoolInfo, PoolState};
pub use position::UserPosition;

use custody_core::{Address, Amount, BasisPoints, TokenError};

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Ledger errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("Pool already exists for asset {0}")]
    PoolAlreadyExists(Address),

    #[error("No active pool for asset {0}")]
    PoolNotActive(Address),

    #[error("Amount must be greater than zero")]
    InvalidAmount,

    #[error("Invalid rate: {0} bp exceeds 10000")]
    InvalidRate(BasisPoints),

    #[error("Insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: Amount, available: Amount },

    #[error("No deposit for {user} in {asset}")]
    NoDeposit { user: Address, asset: Address },

    #[error("Caller {0} is not the ledger owner")]
    Unauthorized(Address),

    #[error("Zero address")]
    InvalidAddress,

    #[error("Transfer failed: {0}")]
    Transfer(#[from] TokenError),

    #[error("Calculation error: {0}")]
    Calculation(String),
}
