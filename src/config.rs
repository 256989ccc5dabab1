use std::collections::HashMap;

use alloy::primitives::Address;

use crate::error::{AppError, AppResult};
use crate::network::Network;

/// Receive calls are bounded to this many ledger cycles to cap gas cost.
pub const DEFAULT_MAX_RECEIVE_CYCLES: u32 = 1000;

/// A receive in one pass can unlock value only splittable in the next, so a
/// single pass never drains everything.
pub const DEFAULT_RUN_ITERATIONS: u32 = 3;

#[derive(Debug, Clone)]
pub struct AppSettings {
    pub connection_string: String,
    pub rpc_url: String,
    pub network: Network,
    /// 32-byte signing key, hex without `0x`. `None` means no wallet: reads
    /// still work, writes are impossible.
    pub wallet_private_key: Option<String>,
    pub discord_webhook_url: Option<String>,
    /// Treasury Safe address per network name.
    pub safes: HashMap<String, Address>,
    pub should_run: bool,
    pub dry_run: bool,
    pub should_try_auto_top_up: bool,
    pub max_receive_cycles: u32,
    pub run_iterations: u32,
}

impl AppSettings {
    pub fn from_env() -> AppResult<Self> {
        let chain_id: u64 = required("CHAIN_ID")?
            .parse()
            .map_err(|_| AppError::Config("CHAIN_ID is not a number".into()))?;

        let wallet_private_key = match std::env::var("WALLET_PRIVATE_KEY") {
            Ok(key) if !key.is_empty() => Some(validate_private_key(&key)?),
            _ => None,
        };

        let safes = match std::env::var("SAFES") {
            Ok(raw) if !raw.is_empty() => serde_json::from_str(&raw)
                .map_err(|e| AppError::Config(format!("SAFES is not a valid JSON map: {e}")))?,
            _ => HashMap::new(),
        };

        Ok(Self {
            connection_string: required("POSTGRES_CONNECTION_STRING")?,
            rpc_url: required("RPC_URL")?,
            network: Network::for_chain(chain_id)?,
            wallet_private_key,
            discord_webhook_url: std::env::var("DISCORD_WEBHOOK_URL").ok().filter(|v| !v.is_empty()),
            safes,
            should_run: flag("SHOULD_RUN"),
            dry_run: flag("DRY_RUN"),
            should_try_auto_top_up: flag("SHOULD_TRY_AUTO_TOP_UP"),
            max_receive_cycles: tunable("MAX_RECEIVE_CYCLES", DEFAULT_MAX_RECEIVE_CYCLES)?,
            run_iterations: tunable("RUN_ITERATIONS", DEFAULT_RUN_ITERATIONS)?,
        })
    }

    /// Safe address registered for the active network, if any.
    pub fn safe_address(&self) -> Option<Address> {
        self.safes.get(self.network.name).copied()
    }
}

fn required(name: &str) -> AppResult<String> {
    std::env::var(name).map_err(|_| AppError::Config(format!("Missing {name} in environment")))
}

fn flag(name: &str) -> bool {
    std::env::var(name).map(|v| v == "true").unwrap_or(false)
}

fn tunable(name: &str, default: u32) -> AppResult<u32> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| AppError::Config(format!("{name} is not a number"))),
        Err(_) => Ok(default),
    }
}

fn validate_private_key(key: &str) -> AppResult<String> {
    let hex = key.strip_prefix("0x").unwrap_or(key);

    if hex.len() != 64 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(AppError::Config(
            "Invalid wallet private key format".into(),
        ));
    }

    Ok(hex.to_string())
}
