use alloy::primitives::{address, Address};

use crate::error::{AppError, AppResult};

/// Static per-network registry. One process serves exactly one network; the
/// chain id selects the entry at startup and an unsupported id is fatal.
#[derive(Debug, Clone)]
pub struct Network {
    pub chain_id: u64,
    /// Network name; doubles as the Postgres schema name and the key into the
    /// configured Safe address map.
    pub name: &'static str,
    /// Native currency symbol used in logs and reports.
    pub symbol: &'static str,
    /// Deployed Drips contract address.
    pub drips: Address,
    /// Wallet balance below this triggers a treasury top-up request.
    pub min_balance_eth: &'static str,
    /// Top-ups bring the wallet back to this balance.
    pub target_balance_eth: &'static str,
}

impl Network {
    pub fn for_chain(chain_id: u64) -> AppResult<Self> {
        let network = match chain_id {
            1 => Network {
                chain_id: 1,
                name: "mainnet",
                symbol: "ETH",
                drips: address!("d0dd053392db676d57317cd4fe96fc2ccf42d0b4"),
                min_balance_eth: "0.15",
                target_balance_eth: "0.5",
            },
            10 => Network {
                chain_id: 10,
                name: "optimism",
                symbol: "ETH",
                drips: address!("d320f59f109c618b19707ea5c5f068020ea333b3"),
                min_balance_eth: "0.05",
                target_balance_eth: "0.15",
            },
            314 => Network {
                chain_id: 314,
                name: "filecoin",
                symbol: "FIL",
                drips: address!("d320f59f109c618b19707ea5c5f068020ea333b3"),
                min_balance_eth: "5",
                target_balance_eth: "15",
            },
            1088 => Network {
                chain_id: 1088,
                name: "metis",
                symbol: "METIS",
                drips: address!("d320f59f109c618b19707ea5c5f068020ea333b3"),
                min_balance_eth: "1",
                target_balance_eth: "3",
            },
            11155111 => Network {
                chain_id: 11155111,
                name: "sepolia",
                symbol: "SepoliaETH",
                drips: address!("74a32a38d945b9527524900429b083547deb9bf4"),
                min_balance_eth: "0.5",
                target_balance_eth: "1",
            },
            31337 => Network {
                chain_id: 31337,
                name: "localtestnet",
                symbol: "ETH",
                drips: address!("7cbbd3fdf9e5eb359e6d9b12848c5faa81629944"),
                min_balance_eth: "1",
                target_balance_eth: "2",
            },
            other => return Err(AppError::UnsupportedChain(other)),
        };

        Ok(network)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_supported_networks() {
        let mainnet = Network::for_chain(1).unwrap();
        assert_eq!(mainnet.name, "mainnet");
        assert_eq!(mainnet.symbol, "ETH");

        let filecoin = Network::for_chain(314).unwrap();
        assert_eq!(filecoin.symbol, "FIL");
        assert_ne!(filecoin.drips, mainnet.drips);
    }

    #[test]
    fn unsupported_chain_is_an_error() {
        assert!(matches!(
            Network::for_chain(42),
            Err(AppError::UnsupportedChain(42))
        ));
    }
}
