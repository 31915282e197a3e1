// Global transaction index: one row per (tx_hash, blockchain), written once
// and overwritten with identical content on retry.

use crate::db::query::{Select, Table};
use crate::db::Store;
use crate::models::{normalize_address, GlobalTransactionEntry};

const ENTRY_COLUMNS: &str =
    "tx_hash, blockchain, block_number, from_address, to_address, timestamp";

pub async fn index_transaction_globally(
    store: &Store,
    entry: &GlobalTransactionEntry,
) -> Result<(), sqlx::Error> {
    let from = entry.from_address.as_deref().map(normalize_address);
    let to = entry.to_address.as_deref().map(normalize_address);

    store.record_statement();
    sqlx::query(
        "INSERT INTO global_transaction_index
            (tx_hash, blockchain, block_number, from_address, to_address, timestamp)
         VALUES (?, ?, ?, ?, ?, ?)
         ON CONFLICT(tx_hash, blockchain) DO UPDATE SET
            block_number = excluded.block_number,
            from_address = excluded.from_address,
            to_address = excluded.to_address,
            timestamp = excluded.timestamp",
    )
    .bind(normalize_address(&entry.tx_hash))
    .bind(entry.blockchain.to_lowercase())
    .bind(entry.block_number)
    .bind(from)
    .bind(to)
    .bind(entry.timestamp)
    .execute(store.pool())
    .await?;

    Ok(())
}

/// Transactions sent from or to any of `addresses`, newest first.
pub async fn find_for_addresses(
    store: &Store,
    addresses: &[String],
    chains: Option<&[String]>,
    limit: i64,
    offset: i64,
) -> Result<Vec<GlobalTransactionEntry>, sqlx::Error> {
    if addresses.is_empty() {
        return Ok(Vec::new());
    }

    Select::new(ENTRY_COLUMNS, Table::GlobalTransactionIndex)
        .either_in("from_address", "to_address", addresses)
        .optional(chains, |select, chains| select.is_in("blockchain", chains))
        .order_by("timestamp DESC, tx_hash, blockchain")
        .limit(limit)
        .offset(offset)
        .fetch_all(store)
        .await
}

pub async fn get_entry(
    store: &Store,
    tx_hash: &str,
    blockchain: &str,
) -> Result<Option<GlobalTransactionEntry>, sqlx::Error> {
    Select::new(ENTRY_COLUMNS, Table::GlobalTransactionIndex)
        .eq("tx_hash", &normalize_address(tx_hash))
        .eq("blockchain", &blockchain.to_lowercase())
        .fetch_optional(store)
        .await
}
