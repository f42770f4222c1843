// node/src/lib.rs
pub mod config;
pub mod runtime;

pub use config::{parse_account, NodeConfig};
pub use runtime::{Runtime, StatusReport, World};

use custody_core::{CoreError, TokenError};
use lending_ledger::LedgerError;
use strategy::{OrchestratorError, VenueError};

pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Errors surfaced by a runtime transaction or state file access
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("Invalid input: {0}")]
    Core(#[from] CoreError),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Venue(#[from] VenueError),

    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),

    #[error("State file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("State encoding error: {0}")]
    Codec(#[from] bincode::Error),
}
