use std::time::Duration;

use alloy::primitives::B256;
use tracing::{debug, warn};

use crate::error::{OpResult, OperationError};
use crate::ledger::PendingTx;

/// Bounded-attempt confirmation wait with exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

/// Waits for a broadcast transaction to be confirmed by at least one block.
///
/// Retries the *wait*, never the submission: transient probe failures and
/// still-pending probes both count against the attempt budget, and budget
/// exhaustion fails with `ConfirmationTimeout` — a per-operation recoverable
/// condition, distinct from a submission failure.
pub async fn await_confirmation(tx: &dyn PendingTx, policy: &RetryPolicy) -> OpResult<B256> {
    let hash = tx.hash();
    let mut delay = policy.base_delay;

    for attempt in 1..=policy.max_attempts {
        match tx.check_confirmed().await {
            Ok(true) => {
                debug!("Transaction {hash} confirmed on attempt {attempt}");
                return Ok(hash);
            }
            Ok(false) => {
                debug!("Transaction {hash} still pending (attempt {attempt}/{})",
                    policy.max_attempts);
            }
            Err(e) => {
                warn!("Confirmation probe for {hash} failed (attempt {attempt}/{}): {e}",
                    policy.max_attempts);
            }
        }

        if attempt < policy.max_attempts {
            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(policy.max_delay);
        }
    }

    Err(OperationError::ConfirmationTimeout {
        tx_hash: hash,
        attempts: policy.max_attempts,
    })
}
