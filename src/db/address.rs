// Global address index:
// - index_address_globally: counter upsert + set-once first_seen + fragments
// - candidate lookup by substring, enrichment by exact key
// - distinct chains seen so far

use tracing::debug;

use crate::db::fragment::{insert_fragments, FragmentScheme};
use crate::db::query::{Select, Table};
use crate::db::Store;
use crate::models::{normalize_address, GlobalAddressEntry};

const ENTRY_COLUMNS: &str = "address, blockchain, first_seen, last_seen, tx_count";

/// Record one sighting of `address` on `blockchain` at `timestamp`.
///
/// Safe to retry: `last_seen` only moves forward, `first_seen` is written
/// once and fragments are inserted idempotently. A retry does count the
/// sighting twice in `tx_count`.
pub async fn index_address_globally(
    store: &Store,
    scheme: &FragmentScheme,
    address: &str,
    blockchain: &str,
    timestamp: i64,
) -> Result<(), sqlx::Error> {
    index_address_sightings(store, scheme, address, blockchain, timestamp, 1).await
}

/// Same as `index_address_globally` for `sightings` occurrences at once.
pub async fn index_address_sightings(
    store: &Store,
    scheme: &FragmentScheme,
    address: &str,
    blockchain: &str,
    timestamp: i64,
    sightings: i64,
) -> Result<(), sqlx::Error> {
    let address = normalize_address(address);
    if address.is_empty() || sightings < 1 {
        return Ok(());
    }
    let blockchain = blockchain.to_lowercase();

    record_sighting(store, &address, &blockchain, timestamp, sightings).await?;
    if set_first_seen_if_null(store, &address, &blockchain, timestamp).await? {
        debug!("First sighting of {} on {}", address, blockchain);
    }
    insert_fragments(store, &address, &blockchain, &scheme.fragments(&address)).await
}

/// Create the row on first sighting, otherwise advance `last_seen` and bump
/// `tx_count`. Both happen in one statement.
pub async fn record_sighting(
    store: &Store,
    address: &str,
    blockchain: &str,
    timestamp: i64,
    sightings: i64,
) -> Result<(), sqlx::Error> {
    store.record_statement();
    sqlx::query(
        "INSERT INTO global_address_index (address, blockchain, first_seen, last_seen, tx_count)
         VALUES (?, ?, NULL, ?, ?)
         ON CONFLICT(address, blockchain) DO UPDATE SET
            last_seen = MAX(global_address_index.last_seen, excluded.last_seen),
            tx_count = global_address_index.tx_count + excluded.tx_count",
    )
    .bind(address)
    .bind(blockchain)
    .bind(timestamp)
    .bind(sightings)
    .execute(store.pool())
    .await?;

    Ok(())
}

/// Compare-and-set on `first_seen`: writes only while it is still NULL.
/// Returns whether this call won.
pub async fn set_first_seen_if_null(
    store: &Store,
    address: &str,
    blockchain: &str,
    timestamp: i64,
) -> Result<bool, sqlx::Error> {
    store.record_statement();
    let result = sqlx::query(
        "UPDATE global_address_index SET first_seen = ?
         WHERE address = ? AND blockchain = ? AND first_seen IS NULL",
    )
    .bind(timestamp)
    .bind(address)
    .bind(blockchain)
    .execute(store.pool())
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Distinct addresses containing every one of `needles`, in address order.
pub async fn find_candidates(
    store: &Store,
    needles: &[String],
    chains: Option<&[String]>,
    limit: i64,
) -> Result<Vec<String>, sqlx::Error> {
    let rows: Vec<(String,)> = Select::new("DISTINCT address", Table::GlobalAddressIndex)
        .contains_all("address", needles)
        .optional(chains, |select, chains| select.is_in("blockchain", chains))
        .order_by("address")
        .limit(limit)
        .fetch_all(store)
        .await?;
    Ok(rows.into_iter().map(|(address,)| address).collect())
}

pub async fn get_entries(
    store: &Store,
    addresses: &[String],
    chains: Option<&[String]>,
) -> Result<Vec<GlobalAddressEntry>, sqlx::Error> {
    if addresses.is_empty() {
        return Ok(Vec::new());
    }

    Select::new(ENTRY_COLUMNS, Table::GlobalAddressIndex)
        .is_in("address", addresses)
        .optional(chains, |select, chains| select.is_in("blockchain", chains))
        .order_by("address, blockchain")
        .fetch_all(store)
        .await
}

pub async fn distinct_blockchains(store: &Store, scan_limit: i64) -> Result<Vec<String>, sqlx::Error> {
    let rows: Vec<(String,)> = Select::new("DISTINCT blockchain", Table::GlobalAddressIndex)
        .order_by("blockchain")
        .limit(scan_limit)
        .fetch_all(store)
        .await?;
    Ok(rows.into_iter().map(|(blockchain,)| blockchain).collect())
}
