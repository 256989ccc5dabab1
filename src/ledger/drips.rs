use alloy::primitives::{Address, B256, U256};
use alloy::providers::{DynProvider, Provider};
use alloy::sol;
use async_trait::async_trait;

use crate::error::{AppError, AppResult};
use crate::ledger::{ChainWallet, LedgerClient, PendingTx};
use crate::splits::SplitsReceiver;

sol! {
    #[sol(rpc)]
    interface IDrips {
        struct SplitsReceiver {
            uint256 accountId;
            uint32 weight;
        }

        function receiveStreamsResult(uint256 accountId, address erc20, uint32 maxCycles)
            external view returns (uint128 receivableAmt);

        function receiveStreams(uint256 accountId, address erc20, uint32 maxCycles)
            external returns (uint128 receivedAmt);

        function splittable(uint256 accountId, address erc20)
            external view returns (uint128 amt);

        function split(uint256 accountId, address erc20, SplitsReceiver[] calldata currReceivers)
            external returns (uint128 collectableAmt, uint128 splitAmt);
    }
}

/// Drips contract client over a JSON-RPC provider. Constructed eagerly at
/// startup and injected where needed; writes require the provider to carry a
/// signer.
pub struct DripsLedger {
    contract: IDrips::IDripsInstance<DynProvider>,
    provider: DynProvider,
}

impl DripsLedger {
    pub fn new(provider: DynProvider, address: Address) -> Self {
        Self {
            contract: IDrips::new(address, provider.clone()),
            provider,
        }
    }
}

#[async_trait]
impl LedgerClient for DripsLedger {
    async fn receivable(
        &self,
        account_id: U256,
        token: Address,
        max_cycles: u32,
    ) -> AppResult<U256> {
        let amount = self
            .contract
            .receiveStreamsResult(account_id, token, max_cycles)
            .call()
            .await
            .map_err(|e| AppError::Ledger(format!("Read 'receiveStreamsResult' failed: {e}")))?;

        Ok(U256::from(amount))
    }

    async fn splittable(&self, account_id: U256, token: Address) -> AppResult<U256> {
        let amount = self
            .contract
            .splittable(account_id, token)
            .call()
            .await
            .map_err(|e| AppError::Ledger(format!("Read 'splittable' failed: {e}")))?;

        Ok(U256::from(amount))
    }

    async fn receive_streams(
        &self,
        account_id: U256,
        token: Address,
        max_cycles: u32,
    ) -> AppResult<Box<dyn PendingTx>> {
        let pending = self
            .contract
            .receiveStreams(account_id, token, max_cycles)
            .send()
            .await
            .map_err(|e| AppError::Ledger(format!("Write 'receiveStreams' failed: {e}")))?;

        Ok(Box::new(RpcPendingTx {
            provider: self.provider.clone(),
            hash: *pending.tx_hash(),
        }))
    }

    async fn split(
        &self,
        account_id: U256,
        token: Address,
        receivers: &[SplitsReceiver],
    ) -> AppResult<Box<dyn PendingTx>> {
        let receivers: Vec<IDrips::SplitsReceiver> = receivers
            .iter()
            .map(|r| IDrips::SplitsReceiver {
                accountId: r.account_id,
                weight: r.weight,
            })
            .collect();

        let pending = self
            .contract
            .split(account_id, token, receivers)
            .send()
            .await
            .map_err(|e| AppError::Ledger(format!("Write 'split' failed: {e}")))?;

        Ok(Box::new(RpcPendingTx {
            provider: self.provider.clone(),
            hash: *pending.tx_hash(),
        }))
    }
}

/// Wraps an already-broadcast transaction hash in a confirmation probe.
/// Shared with the treasury client, which awaits Safe executions the same way.
pub(crate) fn receipt_probe(provider: DynProvider, hash: B256) -> Box<dyn PendingTx> {
    Box::new(RpcPendingTx { provider, hash })
}

/// Broadcast transaction identified by hash; confirmation is probed through
/// receipt lookups so a retry never touches the mempool again.
struct RpcPendingTx {
    provider: DynProvider,
    hash: B256,
}

#[async_trait]
impl PendingTx for RpcPendingTx {
    fn hash(&self) -> B256 {
        self.hash
    }

    async fn check_confirmed(&self) -> AppResult<bool> {
        let receipt = self
            .provider
            .get_transaction_receipt(self.hash)
            .await
            .map_err(|e| AppError::Ledger(format!("Receipt lookup for {} failed: {e}", self.hash)))?;

        Ok(receipt.is_some_and(|r| r.block_number.is_some()))
    }
}

/// Provider-backed view of the operating wallet.
pub struct RpcWallet {
    provider: DynProvider,
    address: Address,
}

impl RpcWallet {
    pub fn new(provider: DynProvider, address: Address) -> Self {
        Self { provider, address }
    }
}

#[async_trait]
impl ChainWallet for RpcWallet {
    fn address(&self) -> Address {
        self.address
    }

    async fn balance(&self) -> AppResult<U256> {
        self.provider
            .get_balance(self.address)
            .await
            .map_err(|e| AppError::Ledger(format!("Balance lookup failed: {e}")))
    }
}
