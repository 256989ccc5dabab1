use std::fmt;

use alloy::primitives::U256;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The two account kinds this agent distributes for. Unclaimed projects are
/// excluded at the query layer and never reach the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountKind {
    DripList,
    Project,
}

impl AccountKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountKind::DripList => "drip list",
            AccountKind::Project => "project",
        }
    }
}

impl fmt::Display for AccountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A ledger-addressable entity as enumerated from the store. `created_at` is
/// used only for processing order (most-recently-created first).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: U256,
    pub created_at: DateTime<Utc>,
}

/// The driver that issued an account id, encoded in its top 32 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriverKind {
    Address,
    Nft,
    ImmutableSplits,
    Repo,
    RepoSubAccount,
}

impl DriverKind {
    /// Decodes the issuing driver from bits 224..256 of an account id.
    /// Total over the unknown case: an unrecognized driver value is an error,
    /// never a silent misclassification.
    pub fn decode(account_id: U256) -> Result<Self, UnknownDriverKind> {
        let bits: u32 = (account_id >> 224usize).to::<u32>();

        match bits {
            0 => Ok(DriverKind::Address),
            1 => Ok(DriverKind::Nft),
            2 => Ok(DriverKind::ImmutableSplits),
            3 => Ok(DriverKind::Repo),
            4 => Ok(DriverKind::RepoSubAccount),
            other => Err(UnknownDriverKind {
                account_id,
                driver_bits: other,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown driver {driver_bits} for account ID {account_id}")]
pub struct UnknownDriverKind {
    pub account_id: U256,
    pub driver_bits: u32,
}
