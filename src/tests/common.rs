//! Shared fixtures: in-memory store, block builders and a scripted chain client.

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::blockchain::client::{ChainClient, ClientError, RetryPolicy};
use crate::blockchain::models::{BlockData, ExtractedBlock, ExtractedTransaction, TransactionData};
use crate::blockchain::{BlockIndexer, PollerConfig};
use crate::cache::SearchCache;
use crate::config::Config;
use crate::db::connection::connect_in_memory;
use crate::db::fragment::FragmentScheme;
use crate::db::Store;
use crate::search::{ChainSearch, CrossChainSearch, SearchLimits};
use crate::state::AppState;

pub const ETHEREUM: &str = "ethereum";

pub async fn test_store() -> Store {
    connect_in_memory().await.expect("Failed to open in-memory store")
}

pub fn scheme() -> FragmentScheme {
    FragmentScheme::new(8, 4)
}

pub fn test_cache() -> SearchCache {
    SearchCache::new(1_000, Duration::from_secs(60))
}

pub fn indexer(store: &Store) -> BlockIndexer {
    BlockIndexer::new(store.clone(), scheme())
}

pub fn cross_chain(store: &Store) -> CrossChainSearch {
    CrossChainSearch::new(store.clone(), test_cache(), scheme(), SearchLimits::default())
}

pub fn chain_search(store: &Store) -> ChainSearch {
    ChainSearch::new(store.clone(), test_cache())
}

pub fn test_state(store: &Store, config: Config) -> Arc<AppState> {
    Arc::new(AppState::new(config, store.clone()))
}

pub fn tx(hash: &str, from: &str, to: &str) -> ExtractedTransaction {
    ExtractedTransaction::new(hash, [from.to_string()], [to.to_string()], Some("1000".into()))
}

pub fn block_hash(number: u64) -> String {
    format!("0x{:064x}", number + 0xb000)
}

/// Block whose touched addresses are the miner (if any) plus every
/// transaction participant.
pub fn block(
    number: u64,
    timestamp: i64,
    miner: Option<&str>,
    transactions: Vec<ExtractedTransaction>,
) -> ExtractedBlock {
    let mut addresses: BTreeSet<String> = transactions
        .iter()
        .flat_map(|tx| tx.addresses.iter().cloned())
        .collect();
    if let Some(miner) = miner {
        addresses.insert(miner.to_lowercase());
    }

    ExtractedBlock {
        blockchain: ETHEREUM.to_string(),
        number,
        hash: block_hash(number),
        parent_hash: Some(format!("0x{:064x}", number + 0xb000 - 1)),
        timestamp,
        addresses,
        transactions,
    }
}

/// Index a lone address through a one-transaction block on `blockchain`.
pub async fn index_address_on(store: &Store, blockchain: &str, address: &str, timestamp: i64) {
    let mut block = block(timestamp as u64, timestamp, Some(address), Vec::new());
    block.blockchain = blockchain.to_string();
    indexer(store)
        .index_block(&block)
        .await
        .expect("Failed to index block");
}

pub fn poller_config(start_block: Option<u64>, batch_size: u64) -> PollerConfig {
    PollerConfig {
        poll_interval: Duration::from_secs(12),
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(80),
        delay_multiplier: 2,
        batch_size,
        start_block,
        retry: RetryPolicy::none(),
    }
}

pub struct MockBlock(pub ExtractedBlock);

impl BlockData for MockBlock {
    fn number(&self) -> u64 {
        self.0.number
    }

    fn timestamp(&self) -> i64 {
        self.0.timestamp
    }

    fn extract(&self, blockchain: &str) -> ExtractedBlock {
        ExtractedBlock {
            blockchain: blockchain.to_string(),
            ..self.0.clone()
        }
    }
}

pub struct MockTransaction {
    tx: ExtractedTransaction,
    block_number: Option<u64>,
}

impl TransactionData for MockTransaction {
    fn hash(&self) -> &str {
        &self.tx.hash
    }

    fn block_number(&self) -> Option<u64> {
        self.block_number
    }

    fn extract(&self) -> ExtractedTransaction {
        self.tx.clone()
    }
}

/// Chain client serving blocks and transactions from memory. Calls to
/// `get_block` can be made to fail with a throttling or RPC error.
#[derive(Default)]
pub struct MockChainClient {
    head: AtomicU64,
    blocks: Mutex<HashMap<u64, ExtractedBlock>>,
    transactions: Mutex<HashMap<String, (ExtractedTransaction, Option<u64>)>>,
    throttled: AtomicUsize,
    failing: Mutex<HashSet<u64>>,
    pub head_calls: AtomicUsize,
    pub block_calls: AtomicUsize,
}

impl MockChainClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks `1..=count`, each with one transaction.
    pub fn with_chain(count: u64) -> Self {
        let client = Self::new();
        for number in 1..=count {
            client.add_block(block(
                number,
                1_700_000_000 + number as i64,
                Some(&format!("0xminer{:02}", number)),
                vec![tx(
                    &format!("0xtx{:04}", number),
                    &format!("0xfrom{:02}", number),
                    &format!("0xto{:02}", number),
                )],
            ));
        }
        client
    }

    pub fn add_block(&self, block: ExtractedBlock) {
        self.head.fetch_max(block.number, Ordering::SeqCst);
        self.blocks.lock().unwrap().insert(block.number, block);
    }

    pub fn set_head(&self, head: u64) {
        self.head.store(head, Ordering::SeqCst);
    }

    pub fn add_transaction(&self, tx: ExtractedTransaction, block_number: Option<u64>) {
        self.transactions
            .lock()
            .unwrap()
            .insert(tx.hash.clone(), (tx, block_number));
    }

    /// Fail every fetch of `number` with a non-throttling RPC error.
    pub fn fail_block(&self, number: u64) {
        self.failing.lock().unwrap().insert(number);
    }

    /// Fail the next `count` block fetches as rate limited.
    pub fn throttle_next(&self, count: usize) {
        self.throttled.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    type Block = MockBlock;
    type Transaction = MockTransaction;

    fn blockchain(&self) -> &str {
        ETHEREUM
    }

    async fn get_latest_block_number(&self) -> Result<u64, ClientError> {
        self.head_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.head.load(Ordering::SeqCst))
    }

    async fn get_block(
        &self,
        number: u64,
        _include_transactions: bool,
    ) -> Result<Option<MockBlock>, ClientError> {
        self.block_calls.fetch_add(1, Ordering::SeqCst);
        let throttled = self
            .throttled
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if throttled {
            return Err(ClientError::RateLimited("Too Many Requests".into()));
        }
        if self.failing.lock().unwrap().contains(&number) {
            return Err(ClientError::Rpc {
                code: -32000,
                message: "header not found".into(),
            });
        }
        Ok(self.blocks.lock().unwrap().get(&number).cloned().map(MockBlock))
    }

    async fn get_transaction(&self, hash: &str) -> Result<Option<MockTransaction>, ClientError> {
        Ok(self
            .transactions
            .lock()
            .unwrap()
            .get(&hash.to_lowercase())
            .map(|(tx, block_number)| MockTransaction {
                tx: tx.clone(),
                block_number: *block_number,
            }))
    }
}
