use std::collections::HashSet;
use std::str::FromStr;

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::prelude::FromRow;
use sqlx::PgPool;

use crate::account::{Account, AccountKind, DriverKind};
use crate::error::{AppError, AppResult};
use crate::splits::SplitsReceiver;
use crate::store::DistributionStore;

/// Postgres adapter over the per-network indexer schema.
///
/// Account ids are stored as decimal strings and cast to text on the way out;
/// they are parsed into `U256` here so parse failures surface as decode
/// errors rather than corrupt ids.
pub struct StoreRepository {
    pool: PgPool,
    schema: String,
}

#[derive(FromRow)]
struct AccountRecord {
    id: String,
    created_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct ReceiverRecord {
    fundee: String,
    weight: i64,
}

#[derive(FromRow)]
struct TokenRecord {
    erc20: String,
}

impl StoreRepository {
    pub fn new(pool: PgPool, schema: &str) -> Self {
        Self {
            pool,
            schema: schema.to_string(),
        }
    }

    async fn receiver_rows_from(
        &self,
        table: &str,
        funder_column: &str,
        fundee_column: &str,
        funder: U256,
    ) -> AppResult<Vec<SplitsReceiver>> {
        let sql = format!(
            r#"
            SELECT "{fundee_column}"::text AS fundee, "weight"::int8 AS weight
            FROM "{schema}"."{table}"
            WHERE "{funder_column}" = $1
            "#,
            schema = self.schema,
        );

        let rows = sqlx::query_as::<_, ReceiverRecord>(&sql)
            .bind(funder.to_string())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(receiver_from_record).collect()
    }
}

#[async_trait]
impl DistributionStore for StoreRepository {
    async fn drip_lists(&self) -> AppResult<Vec<Account>> {
        let sql = format!(
            r#"
            SELECT dl.account_id::text AS id, dl.created_at AS created_at
            FROM "{schema}"."drip_lists" dl
            ORDER BY dl.created_at DESC
            "#,
            schema = self.schema,
        );

        let rows = sqlx::query_as::<_, AccountRecord>(&sql)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(account_from_record).collect()
    }

    async fn claimed_projects(&self) -> AppResult<Vec<Account>> {
        let sql = format!(
            r#"
            SELECT gp."id"::text AS id, gp."createdAt" AS created_at
            FROM "{schema}"."GitProjects" gp
            WHERE gp."verificationStatus" = 'Claimed'
            ORDER BY gp."createdAt" DESC
            "#,
            schema = self.schema,
        );

        let rows = sqlx::query_as::<_, AccountRecord>(&sql)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(account_from_record).collect()
    }

    async fn distinct_tokens(&self) -> AppResult<Vec<Address>> {
        // Union, not sum: the same token typically shows up in several event
        // categories.
        let tables = [
            "GivenEvents",
            "SplitEvents",
            "StreamsSetEvents",
            "SqueezedStreamsEvents",
        ];

        let mut tokens: HashSet<Address> = HashSet::new();

        for table in tables {
            let sql = format!(
                r#"SELECT DISTINCT ON ("erc20") "erc20" FROM "{schema}"."{table}""#,
                schema = self.schema,
            );

            let rows = sqlx::query_as::<_, TokenRecord>(&sql)
                .fetch_all(&self.pool)
                .await?;

            for row in rows {
                tokens.insert(parse_address(&row.erc20)?);
            }
        }

        Ok(tokens.into_iter().collect())
    }

    async fn splits_receiver_rows(
        &self,
        funder: U256,
        kind: AccountKind,
    ) -> AppResult<Vec<SplitsReceiver>> {
        let funder_column = match kind {
            AccountKind::DripList => "funderDripListId",
            AccountKind::Project => "funderProjectId",
        };

        // Three receiver tables, one per recipient kind, all normalized to
        // the same (account_id, weight) shape before merging.
        let mut rows = self
            .receiver_rows_from(
                "AddressDriverSplitReceivers",
                funder_column,
                "fundeeAccountId",
                funder,
            )
            .await?;
        rows.extend(
            self.receiver_rows_from(
                "DripListSplitReceivers",
                funder_column,
                "fundeeDripListId",
                funder,
            )
            .await?,
        );
        rows.extend(
            self.receiver_rows_from(
                "RepoDriverSplitReceivers",
                funder_column,
                "fundeeProjectId",
                funder,
            )
            .await?,
        );

        Ok(rows)
    }
}

fn account_from_record(record: AccountRecord) -> AppResult<Account> {
    let id = parse_account_id(&record.id)?;

    // A row whose id does not decode to a known driver is corrupt indexer
    // data; refuse it rather than hand an unaddressable account downstream.
    DriverKind::decode(id).map_err(|e| AppError::Decode(e.to_string()))?;

    Ok(Account {
        id,
        created_at: record.created_at,
    })
}

fn receiver_from_record(record: ReceiverRecord) -> AppResult<SplitsReceiver> {
    let weight = u32::try_from(record.weight)
        .map_err(|_| AppError::Decode(format!("weight {} out of range", record.weight)))?;

    Ok(SplitsReceiver {
        account_id: parse_account_id(&record.fundee)?,
        weight,
    })
}

fn parse_account_id(raw: &str) -> AppResult<U256> {
    U256::from_str(raw)
        .map_err(|_| AppError::Decode(format!("'{raw}' is not a valid uint256 account ID")))
}

fn parse_address(raw: &str) -> AppResult<Address> {
    Address::from_str(raw)
        .map_err(|_| AppError::Decode(format!("'{raw}' is not a valid token address")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_decimal_account_ids() {
        assert_eq!(parse_account_id("42").unwrap(), U256::from(42u64));

        let huge = "80920512628727448869129807339056465411962625977268430562219028432305210720256";
        assert!(parse_account_id(huge).is_ok());

        assert!(parse_account_id("not-a-number").is_err());
    }

    #[test]
    fn rejects_out_of_range_weights() {
        let record = ReceiverRecord {
            fundee: "5".into(),
            weight: -1,
        };
        assert!(receiver_from_record(record).is_err());

        let record = ReceiverRecord {
            fundee: "5".into(),
            weight: 300_000,
        };
        assert_eq!(receiver_from_record(record).unwrap().weight, 300_000);
    }

    #[test]
    fn rejects_accounts_with_unknown_drivers() {
        // Driver 9 in the top 32 bits is not a known driver.
        let bad_id = (alloy::primitives::U256::from(9u32) << 224usize).to_string();
        let record = AccountRecord {
            id: bad_id,
            created_at: Utc::now(),
        };
        assert!(account_from_record(record).is_err());

        // NFT driver (1) is fine.
        let good_id = (alloy::primitives::U256::from(1u32) << 224usize).to_string();
        let record = AccountRecord {
            id: good_id,
            created_at: Utc::now(),
        };
        assert!(account_from_record(record).is_ok());
    }

    #[test]
    fn parses_token_addresses() {
        assert!(parse_address("0x6b175474e89094c44da98b954eedeac495271d0f").is_ok());
        assert!(parse_address("0x123").is_err());
    }
}
