// custody-core/src/lib.rs

//! Shared kernel for the pooled custody allocator
//!
//! This crate provides:
//! - Arbitrary precision token amounts and basis-point helpers
//! - Account and asset addresses
//! - The clock port used by interest accrual
//! - The asset transfer port and an in-memory token bank

pub mod address;
pub mod clock;
pub mod token;
pub mod types;

pub use address::Address;
pub use clock::{Clock, ManualClock, SystemClock};
pub use token::{AssetService, TokenBank, TokenError, TokenResult};
pub use types::*;

/// Result type for core parsing and validation
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised while parsing or validating core values
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
}
