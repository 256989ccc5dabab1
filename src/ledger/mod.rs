pub mod drips;
pub mod retry;

use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;

use crate::error::AppResult;
use crate::splits::SplitsReceiver;

pub use drips::{DripsLedger, RpcWallet};
pub use retry::{await_confirmation, RetryPolicy};

/// A transaction that has been broadcast but not necessarily included yet.
///
/// Once broadcast, a transaction must never be broadcast twice — duplicate
/// submission could double-spend gas or leave the on-chain state ambiguous.
/// Only the confirmation wait is retryable, which is why this trait exposes a
/// probe and no way to re-send.
#[async_trait]
pub trait PendingTx: Send + Sync {
    fn hash(&self) -> B256;

    /// One confirmation probe. `Ok(true)` once at least one block has
    /// confirmed the transaction, `Ok(false)` while it is still pending, and
    /// `Err` for transient lookup failures.
    async fn check_confirmed(&self) -> AppResult<bool>;
}

/// Typed calls against the Drips ledger contract.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Value receivable for the account/token, bounded by `max_cycles`.
    async fn receivable(
        &self,
        account_id: U256,
        token: Address,
        max_cycles: u32,
    ) -> AppResult<U256>;

    /// Value currently splittable for the account/token.
    async fn splittable(&self, account_id: U256, token: Address) -> AppResult<U256>;

    async fn receive_streams(
        &self,
        account_id: U256,
        token: Address,
        max_cycles: u32,
    ) -> AppResult<Box<dyn PendingTx>>;

    /// Receivers must already be deduplicated and ordered ascending by
    /// account id; the contract rejects anything else.
    async fn split(
        &self,
        account_id: U256,
        token: Address,
        receivers: &[SplitsReceiver],
    ) -> AppResult<Box<dyn PendingTx>>;
}

/// The operating wallet, as far as the core needs to know it: an address to
/// top up and a native balance to account fees against.
#[async_trait]
pub trait ChainWallet: Send + Sync {
    fn address(&self) -> Address;

    async fn balance(&self) -> AppResult<U256>;
}
