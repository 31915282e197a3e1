use chrono::Utc;
use futures::future::FutureExt;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, warn};

use crate::blockchain::client::{ChainClient, ClientError};
use crate::blockchain::models::{BlockData, ExtractedBlock, ExtractedTransaction, TransactionData};
use crate::db::chain::{self, BlockRow, TransactionRow};
use crate::db::fragment::FragmentScheme;
use crate::db::{address, transaction, Store};
use crate::models::GlobalTransactionEntry;

/// Addresses written concurrently per block.
const ADDRESS_WRITE_CONCURRENCY: usize = 8;

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("Index store error: {0}")]
    Store(#[from] sqlx::Error),
}

impl ProcessError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ProcessError::Client(e) if e.is_rate_limited())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSummary {
    pub number: u64,
    pub addresses: usize,
    pub transactions: usize,
}

/// Writes extracted chain data into the per-chain tables and the global index.
#[derive(Clone)]
pub struct BlockIndexer {
    store: Store,
    scheme: FragmentScheme,
}

impl BlockIndexer {
    pub fn new(store: Store, scheme: FragmentScheme) -> Self {
        Self { store, scheme }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Index one block. Returns only after every write has landed, so a
    /// caller may treat `Ok` as "block processed".
    pub async fn index_block(&self, block: &ExtractedBlock) -> Result<BlockSummary, sqlx::Error> {
        let blockchain = block.blockchain.as_str();
        let number = block.number as i64;

        chain::upsert_block(
            &self.store,
            &BlockRow {
                blockchain: blockchain.to_string(),
                number,
                hash: block.hash.clone(),
                parent_hash: block.parent_hash.clone(),
                timestamp: block.timestamp,
            },
        )
        .await?;

        // One sighting per transaction touching the address; block-level
        // addresses such as the fee recipient count once.
        let mut sightings: BTreeMap<&str, i64> = BTreeMap::new();
        for tx in &block.transactions {
            for addr in &tx.addresses {
                *sightings.entry(addr.as_str()).or_default() += 1;
            }
        }
        for addr in &block.addresses {
            sightings.entry(addr.as_str()).or_insert(1);
        }

        let address_writes: Vec<_> = sightings
            .iter()
            .map(|(addr, count)| self.index_address(blockchain, addr, block.timestamp, *count).boxed())
            .collect();
        stream::iter(address_writes)
            .buffer_unordered(ADDRESS_WRITE_CONCURRENCY)
            .try_collect::<Vec<()>>()
            .await?;

        for tx in &block.transactions {
            self.write_transaction(blockchain, number, block.timestamp, tx).await?;
        }

        debug!(
            "Indexed {} block {}: {} addresses, {} transactions",
            blockchain,
            block.number,
            sightings.len(),
            block.transactions.len()
        );

        Ok(BlockSummary {
            number: block.number,
            addresses: sightings.len(),
            transactions: block.transactions.len(),
        })
    }

    /// Index a single transaction outside of its block.
    pub async fn index_transaction(
        &self,
        blockchain: &str,
        block_number: u64,
        timestamp: i64,
        tx: &ExtractedTransaction,
    ) -> Result<(), sqlx::Error> {
        for addr in &tx.addresses {
            self.index_address(blockchain, addr, timestamp, 1).await?;
        }
        self.write_transaction(blockchain, block_number as i64, timestamp, tx).await
    }

    async fn index_address(
        &self,
        blockchain: &str,
        addr: &str,
        timestamp: i64,
        sightings: i64,
    ) -> Result<(), sqlx::Error> {
        chain::upsert_address(&self.store, blockchain, addr, timestamp).await?;
        address::index_address_sightings(&self.store, &self.scheme, addr, blockchain, timestamp, sightings)
            .await
    }

    async fn write_transaction(
        &self,
        blockchain: &str,
        block_number: i64,
        timestamp: i64,
        tx: &ExtractedTransaction,
    ) -> Result<(), sqlx::Error> {
        chain::upsert_transaction(
            &self.store,
            &TransactionRow {
                blockchain: blockchain.to_string(),
                hash: tx.hash.clone(),
                block_number,
                from_address: tx.from.clone(),
                to_address: tx.to.clone(),
                value: tx.value.clone(),
                timestamp,
            },
        )
        .await?;

        transaction::index_transaction_globally(
            &self.store,
            &GlobalTransactionEntry {
                tx_hash: tx.hash.clone(),
                blockchain: blockchain.to_string(),
                block_number,
                from_address: tx.from.clone(),
                to_address: tx.to.clone(),
                timestamp,
            },
        )
        .await
    }
}

/// Fetch one transaction by hash and index it. Unknown and unconfirmed
/// transactions are skipped with `Ok(None)`.
pub async fn index_transaction_by_hash<C: ChainClient>(
    client: &C,
    indexer: &BlockIndexer,
    hash: &str,
) -> Result<Option<ExtractedTransaction>, ProcessError> {
    let Some(raw) = client.get_transaction(hash).await? else {
        warn!("Transaction {} not found on {}", hash, client.blockchain());
        return Ok(None);
    };
    let Some(block_number) = raw.block_number() else {
        warn!("Transaction {} on {} is not confirmed yet", raw.hash(), client.blockchain());
        return Ok(None);
    };

    let timestamp = match client.get_block(block_number, false).await? {
        Some(block) => block.timestamp(),
        None => Utc::now().timestamp(),
    };

    let tx = raw.extract();
    indexer
        .index_transaction(client.blockchain(), block_number, timestamp, &tx)
        .await?;
    Ok(Some(tx))
}
