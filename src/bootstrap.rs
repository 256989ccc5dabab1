use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use alloy::network::EthereumWallet;
use alloy::primitives::{utils::parse_ether, Address};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::signers::local::PrivateKeySigner;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use crate::config::AppSettings;
use crate::error::{AppError, AppResult};
use crate::ledger::{ChainWallet, DripsLedger, RetryPolicy, RpcWallet};
use crate::notify::Notifier;
use crate::orchestrator::{DistributionOrchestrator, RunSettings};
use crate::report::RunReporter;
use crate::store::StoreRepository;
use crate::treasury::{SafeTreasury, TreasuryBalancer, TreasuryClient};

/// Fully wired application. Every collaborator is constructed eagerly here
/// and injected — no lazily initialized globals — so a misconfiguration
/// fails at startup, not mid-run.
pub struct App {
    pub pool: PgPool,
    pub orchestrator: DistributionOrchestrator,
    /// Present only when an operating wallet is configured.
    pub balancer: Option<TreasuryBalancer>,
    pub reporter: RunReporter,
}

pub async fn initialize(settings: &AppSettings) -> AppResult<App> {
    info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&settings.connection_string)
        .await?;
    info!("Connected to database.");

    wire_or_close(pool, settings).await
}

/// A wiring failure must not leak the already-connected pool, so it is
/// closed before the error propagates.
async fn wire_or_close(pool: PgPool, settings: &AppSettings) -> AppResult<App> {
    match wire(pool.clone(), settings).await {
        Ok(app) => Ok(app),
        Err(e) => {
            pool.close().await;
            Err(e)
        }
    }
}

async fn wire(pool: PgPool, settings: &AppSettings) -> AppResult<App> {
    let network = &settings.network;

    let rpc_url = settings
        .rpc_url
        .parse()
        .map_err(|e| AppError::Config(format!("RPC_URL is not a valid URL: {e}")))?;

    let (provider, wallet_address): (DynProvider, Option<Address>) =
        match &settings.wallet_private_key {
            Some(key) => {
                let signer = PrivateKeySigner::from_str(key)
                    .map_err(|e| AppError::Config(format!("Invalid wallet private key: {e}")))?;
                let address = signer.address();
                let provider = ProviderBuilder::new()
                    .wallet(EthereumWallet::from(signer))
                    .connect_http(rpc_url)
                    .erased();
                (provider, Some(address))
            }
            // Without a signer only reads are possible; that is only a valid
            // mode when dry-run is on.
            None if settings.dry_run => {
                (ProviderBuilder::new().connect_http(rpc_url).erased(), None)
            }
            None => return Err(AppError::WalletUnavailable),
        };

    // Readiness check: the provider must serve the configured chain.
    let reported_chain = provider
        .get_chain_id()
        .await
        .map_err(|e| AppError::Ledger(format!("Chain ID probe failed: {e}")))?;
    if reported_chain != network.chain_id {
        return Err(AppError::ChainIdMismatch {
            expected: network.chain_id,
            actual: reported_chain,
        });
    }
    info!(
        "Provider ready on {} (chain {}), Drips contract {}",
        network.name, network.chain_id, network.drips
    );

    let store = Arc::new(StoreRepository::new(pool.clone(), network.name));
    let ledger = Arc::new(DripsLedger::new(provider.clone(), network.drips));
    let notifier = Arc::new(Notifier::new(
        settings.discord_webhook_url.clone(),
        network.name,
        settings.dry_run,
    ));

    let wallet: Option<Arc<dyn ChainWallet>> = wallet_address.map(|address| {
        info!("Operating wallet: {address}");
        Arc::new(RpcWallet::new(provider.clone(), address)) as Arc<dyn ChainWallet>
    });

    let balancer = match &wallet {
        Some(wallet) => {
            let min_balance = parse_ether(network.min_balance_eth)
                .map_err(|e| AppError::Config(format!("Bad min balance: {e}")))?;
            let target_balance = parse_ether(network.target_balance_eth)
                .map_err(|e| AppError::Config(format!("Bad target balance: {e}")))?;

            let treasury = settings.safe_address().map(|safe| {
                Arc::new(SafeTreasury::new(provider.clone(), safe, wallet.address()))
                    as Arc<dyn TreasuryClient>
            });

            Some(TreasuryBalancer::new(
                wallet.clone(),
                treasury,
                network.name,
                network.symbol,
                min_balance,
                target_balance,
            ))
        }
        None => None,
    };

    let orchestrator = DistributionOrchestrator::new(
        store,
        ledger,
        wallet,
        notifier.clone(),
        RetryPolicy::default(),
        RunSettings {
            iterations: settings.run_iterations,
            max_receive_cycles: settings.max_receive_cycles,
            dry_run: settings.dry_run,
        },
        network.name,
        network.symbol,
    );

    info!(
        "Initialized: {} iterations, max {} receive cycles",
        settings.run_iterations, settings.max_receive_cycles
    );

    Ok(App {
        pool,
        orchestrator,
        balancer,
        reporter: RunReporter::new(notifier),
    })
}
