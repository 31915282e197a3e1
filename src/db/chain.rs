// Per-chain tables read by single-chain search. Hashes and addresses are
// stored hex-normalized: lowercase, no 0x prefix.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::db::query::{Select, Table};
use crate::db::Store;
use crate::models::normalize_hex;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct BlockRow {
    pub blockchain: String,
    pub number: i64,
    pub hash: String,
    pub parent_hash: Option<String>,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct TransactionRow {
    pub blockchain: String,
    pub hash: String,
    pub block_number: i64,
    pub from_address: Option<String>,
    pub to_address: Option<String>,
    pub value: Option<String>,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct AddressRow {
    pub blockchain: String,
    pub address: String,
    pub created_at: i64,
    pub updated_at: i64,
}

const BLOCK_COLUMNS: &str = "blockchain, number, hash, parent_hash, timestamp";
const TRANSACTION_COLUMNS: &str =
    "blockchain, hash, block_number, from_address, to_address, value, timestamp";
const ADDRESS_COLUMNS: &str = "blockchain, address, created_at, updated_at";

/// How a hash or address column is matched.
#[derive(Debug, Clone, Copy)]
pub enum Lookup<'a> {
    /// Equal to the normalized value.
    Exact(&'a str),
    /// Contains every pattern as a literal substring.
    ContainsAll(&'a [String]),
}

impl Lookup<'_> {
    fn apply(self, select: Select, column: &'static str) -> Select {
        match self {
            Lookup::Exact(value) => select.eq(column, value),
            Lookup::ContainsAll(patterns) => select.contains_all(column, patterns),
        }
    }
}

pub async fn upsert_block(store: &Store, block: &BlockRow) -> Result<(), sqlx::Error> {
    store.record_statement();
    sqlx::query(
        "INSERT INTO blocks (blockchain, number, hash, parent_hash, timestamp, created_at)
         VALUES (?, ?, ?, ?, ?, ?)
         ON CONFLICT(blockchain, number, hash) DO UPDATE SET
            parent_hash = excluded.parent_hash,
            timestamp = excluded.timestamp",
    )
    .bind(block.blockchain.to_lowercase())
    .bind(block.number)
    .bind(normalize_hex(&block.hash))
    .bind(block.parent_hash.as_deref().map(normalize_hex))
    .bind(block.timestamp)
    .bind(Utc::now().timestamp())
    .execute(store.pool())
    .await?;

    Ok(())
}

pub async fn upsert_transaction(store: &Store, tx: &TransactionRow) -> Result<(), sqlx::Error> {
    store.record_statement();
    sqlx::query(
        "INSERT INTO transactions
            (blockchain, hash, block_number, from_address, to_address, value, timestamp, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(blockchain, hash) DO UPDATE SET
            block_number = excluded.block_number,
            from_address = excluded.from_address,
            to_address = excluded.to_address,
            value = excluded.value,
            timestamp = excluded.timestamp",
    )
    .bind(tx.blockchain.to_lowercase())
    .bind(normalize_hex(&tx.hash))
    .bind(tx.block_number)
    .bind(tx.from_address.as_deref().map(normalize_hex))
    .bind(tx.to_address.as_deref().map(normalize_hex))
    .bind(tx.value.as_deref())
    .bind(tx.timestamp)
    .bind(Utc::now().timestamp())
    .execute(store.pool())
    .await?;

    Ok(())
}

/// `created_at` keeps the first sighting, `updated_at` the latest.
pub async fn upsert_address(
    store: &Store,
    blockchain: &str,
    address: &str,
    seen_at: i64,
) -> Result<(), sqlx::Error> {
    store.record_statement();
    sqlx::query(
        "INSERT INTO addresses (blockchain, address, created_at, updated_at)
         VALUES (?, ?, ?, ?)
         ON CONFLICT(blockchain, address) DO UPDATE SET
            updated_at = MAX(addresses.updated_at, excluded.updated_at)",
    )
    .bind(blockchain.to_lowercase())
    .bind(normalize_hex(address))
    .bind(seen_at)
    .bind(seen_at)
    .execute(store.pool())
    .await?;

    Ok(())
}

pub async fn find_blocks(
    store: &Store,
    lookup: Lookup<'_>,
    blockchain: Option<&str>,
    limit: i64,
) -> Result<Vec<BlockRow>, sqlx::Error> {
    let select = Select::new(BLOCK_COLUMNS, Table::Blocks);
    lookup
        .apply(select, "hash")
        .optional(blockchain, |select, chain| select.eq("blockchain", chain))
        .order_by("timestamp DESC, hash")
        .limit(limit)
        .fetch_all(store)
        .await
}

pub async fn find_transactions(
    store: &Store,
    lookup: Lookup<'_>,
    blockchain: Option<&str>,
    limit: i64,
) -> Result<Vec<TransactionRow>, sqlx::Error> {
    let select = Select::new(TRANSACTION_COLUMNS, Table::Transactions);
    lookup
        .apply(select, "hash")
        .optional(blockchain, |select, chain| select.eq("blockchain", chain))
        .order_by("timestamp DESC, hash")
        .limit(limit)
        .fetch_all(store)
        .await
}

pub async fn find_addresses(
    store: &Store,
    lookup: Lookup<'_>,
    blockchain: Option<&str>,
    limit: i64,
) -> Result<Vec<AddressRow>, sqlx::Error> {
    let select = Select::new(ADDRESS_COLUMNS, Table::Addresses);
    lookup
        .apply(select, "address")
        .optional(blockchain, |select, chain| select.eq("blockchain", chain))
        .order_by("updated_at DESC, address")
        .limit(limit)
        .fetch_all(store)
        .await
}

pub async fn get_block(
    store: &Store,
    hash: &str,
    blockchain: Option<&str>,
) -> Result<Option<BlockRow>, sqlx::Error> {
    Ok(find_blocks(store, Lookup::Exact(hash), blockchain, 1)
        .await?
        .into_iter()
        .next())
}

pub async fn get_transaction(
    store: &Store,
    hash: &str,
    blockchain: Option<&str>,
) -> Result<Option<TransactionRow>, sqlx::Error> {
    Ok(find_transactions(store, Lookup::Exact(hash), blockchain, 1)
        .await?
        .into_iter()
        .next())
}

pub async fn get_address(
    store: &Store,
    address: &str,
    blockchain: Option<&str>,
) -> Result<Option<AddressRow>, sqlx::Error> {
    Ok(find_addresses(store, Lookup::Exact(address), blockchain, 1)
        .await?
        .into_iter()
        .next())
}
