use std::sync::Arc;

use alloy::primitives::{utils::format_ether, Address, Bytes, B256, U256};
use alloy::providers::DynProvider;
use alloy::sol;
use async_trait::async_trait;
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::ledger::{await_confirmation, ChainWallet, RetryPolicy};

sol! {
    #[sol(rpc)]
    interface ISafe {
        function execTransaction(
            address to,
            uint256 value,
            bytes calldata data,
            uint8 operation,
            uint256 safeTxGas,
            uint256 baseGas,
            uint256 gasPrice,
            address gasToken,
            address refundReceiver,
            bytes memory signatures
        ) external payable returns (bool success);
    }
}

/// Treasury multisig seam: request a native transfer and block until the
/// multisig's transaction executes.
#[async_trait]
pub trait TreasuryClient: Send + Sync {
    async fn propose_and_execute_transfer(&self, to: Address, amount: U256) -> AppResult<B256>;
}

/// Safe multisig client for a 1-of-n treasury where the operating wallet is
/// itself an owner: `execTransaction` with the pre-validated signature
/// encoding (r = sender address, s = 0, v = 1), so no off-chain signature
/// collection is involved.
pub struct SafeTreasury {
    contract: ISafe::ISafeInstance<DynProvider>,
    provider: DynProvider,
    sender: Address,
    retry: RetryPolicy,
}

impl SafeTreasury {
    pub fn new(provider: DynProvider, safe_address: Address, sender: Address) -> Self {
        Self {
            contract: ISafe::new(safe_address, provider.clone()),
            provider,
            sender,
            retry: RetryPolicy::default(),
        }
    }

    fn pre_validated_signature(&self) -> Bytes {
        let mut signature = [0u8; 65];
        signature[12..32].copy_from_slice(self.sender.as_slice());
        signature[64] = 1;
        Bytes::copy_from_slice(&signature)
    }
}

#[async_trait]
impl TreasuryClient for SafeTreasury {
    async fn propose_and_execute_transfer(&self, to: Address, amount: U256) -> AppResult<B256> {
        let pending = self
            .contract
            .execTransaction(
                to,
                amount,
                Bytes::new(),
                0, // CALL
                U256::ZERO,
                U256::ZERO,
                U256::ZERO,
                Address::ZERO,
                Address::ZERO,
                self.pre_validated_signature(),
            )
            .send()
            .await
            .map_err(|e| AppError::TopUp(format!("Safe execTransaction failed: {e}")))?;

        let tx = crate::ledger::drips::receipt_probe(self.provider.clone(), *pending.tx_hash());
        let hash = await_confirmation(tx.as_ref(), &self.retry)
            .await
            .map_err(|e| AppError::TopUp(e.to_string()))?;

        Ok(hash)
    }
}

/// Keeps the operating wallet funded: below the minimum, requests a transfer
/// of exactly `target − current` from the treasury Safe and re-checks.
///
/// The check-then-request sequence assumes a single agent instance per
/// network; concurrent invocations could both request a top-up.
pub struct TreasuryBalancer {
    wallet: Arc<dyn ChainWallet>,
    treasury: Option<Arc<dyn TreasuryClient>>,
    network_name: String,
    symbol: String,
    min_balance: U256,
    target_balance: U256,
}

impl TreasuryBalancer {
    pub fn new(
        wallet: Arc<dyn ChainWallet>,
        treasury: Option<Arc<dyn TreasuryClient>>,
        network_name: &str,
        symbol: &str,
        min_balance: U256,
        target_balance: U256,
    ) -> Self {
        Self {
            wallet,
            treasury,
            network_name: network_name.to_string(),
            symbol: symbol.to_string(),
            min_balance,
            target_balance,
        }
    }

    /// Top-up failures are fatal to the run: with an underfunded wallet every
    /// subsequent write would fail on gas anyway.
    pub async fn ensure_sufficient_balance(&self) -> AppResult<()> {
        info!("Trying to auto top up wallet balance...");

        let balance = self.wallet.balance().await?;
        info!(
            "Current wallet balance: {} {}",
            format_ether(balance),
            self.symbol
        );

        let Some(needed) = top_up_amount(balance, self.min_balance, self.target_balance) else {
            info!("Wallet balance is sufficient.");
            return Ok(());
        };

        let treasury = self
            .treasury
            .as_ref()
            .ok_or_else(|| AppError::SafeNotConfigured {
                network: self.network_name.clone(),
            })?;

        info!(
            "Low balance (target is {} {}), withdrawing {} {} from Safe...",
            format_ether(self.target_balance),
            self.symbol,
            format_ether(needed),
            self.symbol
        );

        let tx_hash = treasury
            .propose_and_execute_transfer(self.wallet.address(), needed)
            .await?;
        info!("Top-up transaction executed. Hash: {tx_hash}");

        let new_balance = self.wallet.balance().await?;
        info!(
            "New wallet balance: {} {}",
            format_ether(new_balance),
            self.symbol
        );

        Ok(())
    }
}

/// Exact amount to request, or `None` when the balance is at or above the
/// minimum.
fn top_up_amount(current: U256, min: U256, target: U256) -> Option<U256> {
    if current < min {
        Some(target.saturating_sub(current))
    } else {
        None
    }
}
