pub mod repository;

use alloy::primitives::{Address, U256};
use async_trait::async_trait;

use crate::account::{Account, AccountKind};
use crate::error::AppResult;
use crate::splits::SplitsReceiver;

pub use repository::StoreRepository;

/// Read-only view of the indexer database this agent works from.
///
/// One implementation per schema generation lives in [`repository`]; the rest
/// of the crate never sees table shapes. The orchestrator treats the returned
/// listings as work sets that may go stale mid-run — later passes re-read.
#[async_trait]
pub trait DistributionStore: Send + Sync {
    /// All drip lists, most-recently-created first.
    async fn drip_lists(&self) -> AppResult<Vec<Account>>;

    /// Claimed projects only, most-recently-created first. Unclaimed projects
    /// cannot legally receive distributions and are excluded entirely.
    async fn claimed_projects(&self) -> AppResult<Vec<Account>>;

    /// Every token that has ever appeared across the four ledger event
    /// categories. Unordered work set.
    async fn distinct_tokens(&self) -> AppResult<Vec<Address>>;

    /// Raw split-receiver rows for a funder, normalized to one shape across
    /// the underlying relation tables. Not deduplicated, not ordered, not
    /// validated — that is the resolver's job.
    async fn splits_receiver_rows(
        &self,
        funder: U256,
        kind: AccountKind,
    ) -> AppResult<Vec<SplitsReceiver>>;
}
