use alloy::primitives::{Address, B256, U256};
use thiserror::Error;

use crate::account::AccountKind;

/// Top-level error type. Every variant here aborts the run; recoverable
/// per-operation failures are carried by [`OperationError`] instead and never
/// bubble up through this type.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unsupported chain ID: {0}")]
    UnsupportedChain(u64),

    #[error("Provider connected to chain {actual} but expected {expected}")]
    ChainIdMismatch { expected: u64, actual: u64 },

    #[error("No wallet configured but dry-run is disabled; writes cannot be signed")]
    WalletUnavailable,

    #[error("No Safe address configured for network '{network}'")]
    SafeNotConfigured { network: String },

    #[error("Treasury top-up failed: {0}")]
    TopUp(String),

    #[error("Ledger error: {0}")]
    Ledger(String),

    #[error("Store row decode error: {0}")]
    Decode(String),
}

/// Failures isolated at the (account, asset) granularity. The orchestrator
/// catches these, records them in the run report, and moves on to the next
/// unit of work.
#[derive(Error, Debug)]
pub enum OperationError {
    #[error(
        "The sum of weights for {kind} {account_id} is {total}, but it should be {expected}"
    )]
    InvalidWeightSum {
        kind: AccountKind,
        account_id: U256,
        total: u64,
        expected: u64,
    },

    #[error("Failed to load splits receivers for account {account_id}: {message}")]
    ReceiverLookup { account_id: U256, message: String },

    #[error("'{call}' submission failed for account {account_id}, token {token}: {message}")]
    Submission {
        call: &'static str,
        account_id: U256,
        token: Address,
        message: String,
    },

    #[error("Transaction {tx_hash} not confirmed after {attempts} attempts")]
    ConfirmationTimeout { tx_hash: B256, attempts: u32 },
}

/// Result type alias for the application
pub type AppResult<T> = Result<T, AppError>;

/// Result alias for work units that fail without aborting the run.
pub type OpResult<T> = Result<T, OperationError>;
