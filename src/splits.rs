use std::sync::Arc;

use alloy::primitives::U256;
use serde::{Deserialize, Serialize};

use crate::account::AccountKind;
use crate::error::OperationError;
use crate::store::DistributionStore;

/// Splits weights are fixed-point fractions of this total. The ledger rejects
/// receiver lists whose weights do not sum to exactly this value.
pub const TOTAL_SPLITS_WEIGHT: u64 = 1_000_000;

/// One split recipient: `account_id` receives `weight / TOTAL_SPLITS_WEIGHT`
/// of the distributable value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitsReceiver {
    pub account_id: U256,
    pub weight: u32,
}

/// Resolves the current, validated receiver list for an account.
///
/// The store adapter is the only place schema shape is known; rows arrive
/// here already normalized to `(account_id, weight)`. The list is recomputed
/// fresh for every processing pass — underlying relations can change between
/// passes, so it is never cached.
pub struct SplitsReceiverResolver {
    store: Arc<dyn DistributionStore>,
}

impl SplitsReceiverResolver {
    pub fn new(store: Arc<dyn DistributionStore>) -> Self {
        Self { store }
    }

    pub async fn resolve(
        &self,
        account_id: U256,
        kind: AccountKind,
    ) -> Result<Vec<SplitsReceiver>, OperationError> {
        let rows = self
            .store
            .splits_receiver_rows(account_id, kind)
            .await
            .map_err(|e| OperationError::ReceiverLookup {
                account_id,
                message: e.to_string(),
            })?;

        normalize_receivers(rows, account_id, kind)
    }
}

/// Deduplicates, orders and validates raw receiver rows.
///
/// Deduplication compares the full `(account_id, weight)` pair — two rows with
/// the same recipient but different weights are distinct allocations and must
/// have been combined upstream; if they were not, the weight-sum check below
/// catches it. Receivers are sorted strictly ascending by numeric account id,
/// the canonical order the ledger requires.
pub fn normalize_receivers(
    rows: Vec<SplitsReceiver>,
    account_id: U256,
    kind: AccountKind,
) -> Result<Vec<SplitsReceiver>, OperationError> {
    let mut receivers: Vec<SplitsReceiver> = Vec::with_capacity(rows.len());
    for row in rows {
        if !receivers.contains(&row) {
            receivers.push(row);
        }
    }

    receivers.sort_by(|a, b| a.account_id.cmp(&b.account_id));

    let total: u64 = receivers.iter().map(|r| u64::from(r.weight)).sum();
    if total != TOTAL_SPLITS_WEIGHT {
        return Err(OperationError::InvalidWeightSum {
            kind,
            account_id,
            total,
            expected: TOTAL_SPLITS_WEIGHT,
        });
    }

    Ok(receivers)
}
