// Exact and multi-pattern search over the per-chain blocks, transactions
// and addresses tables, plus single-hash detail lookups.

use std::cmp::Ordering;
use tracing::debug;

use crate::cache::{CacheKey, SearchCache};
use crate::db::chain::{self, AddressRow, BlockRow, Lookup, TransactionRow};
use crate::db::Store;
use crate::models::{normalize_hex, DetailResult, EntityKind, SearchOptions, SearchResult};

/// Characters of a hash kept in result ids.
const ID_HASH_PREFIX: usize = 10;

#[derive(Clone)]
pub struct ChainSearch {
    store: Store,
    cache: SearchCache,
}

impl ChainSearch {
    pub fn new(store: Store, cache: SearchCache) -> Self {
        Self { store, cache }
    }

    /// Whitespace-separated patterns. A single pattern or `exact` runs an
    /// exact lookup; a non-exact single pattern with no exact hit falls back
    /// to substring matching.
    pub async fn search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<SearchResult>, sqlx::Error> {
        let patterns = parse_patterns(query);
        let Some(first) = patterns.first() else {
            return Ok(Vec::new());
        };

        let key = CacheKey::search(&patterns.join(" "), options);
        self.cache
            .get_or_compute(&key, || async {
                if options.exact {
                    return self.exact_search(first, options).await;
                }
                if patterns.len() == 1 {
                    let hits = self.exact_search(first, options).await?;
                    if !hits.is_empty() {
                        return Ok(hits);
                    }
                }
                self.substring_search(&patterns, options).await
            })
            .await
    }

    /// Multi-pattern search that never falls back to exact matching.
    pub async fn search_patterns(
        &self,
        patterns: &[String],
        options: &SearchOptions,
    ) -> Result<Vec<SearchResult>, sqlx::Error> {
        let patterns = parse_patterns(&patterns.join(" "));
        if patterns.is_empty() {
            return Ok(Vec::new());
        }

        let key = CacheKey::pattern_search(&patterns, options);
        self.cache
            .get_or_compute(&key, || self.substring_search(&patterns, options))
            .await
    }

    pub async fn exact_search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<SearchResult>, sqlx::Error> {
        let query = normalize_hex(query);
        self.lookup_all(Lookup::Exact(&query), options).await
    }

    /// Every pattern must appear in the hash or address.
    pub async fn substring_search(
        &self,
        patterns: &[String],
        options: &SearchOptions,
    ) -> Result<Vec<SearchResult>, sqlx::Error> {
        self.lookup_all(Lookup::ContainsAll(patterns), options).await
    }

    /// Resolve one hash. With no `kind`, blocks win over transactions and
    /// transactions over addresses. Misses are not cached.
    pub async fn get_details(
        &self,
        hash: &str,
        kind: Option<EntityKind>,
    ) -> Result<Option<DetailResult>, sqlx::Error> {
        let hash = normalize_hex(hash);
        if hash.is_empty() {
            return Ok(None);
        }

        let key = CacheKey::details(&hash, kind);
        if let Some(cached) = self.cache.get_json(&key).await {
            return Ok(Some(cached));
        }

        let detail = match kind {
            Some(EntityKind::Block) => self.block_detail(&hash).await?,
            Some(EntityKind::Transaction) => self.transaction_detail(&hash).await?,
            Some(EntityKind::Address) => self.address_detail(&hash).await?,
            None => match self.block_detail(&hash).await? {
                Some(detail) => Some(detail),
                None => match self.transaction_detail(&hash).await? {
                    Some(detail) => Some(detail),
                    None => self.address_detail(&hash).await?,
                },
            },
        };

        if let Some(detail) = &detail {
            self.cache.set_json(&key, detail).await;
        }
        Ok(detail)
    }

    async fn block_detail(&self, hash: &str) -> Result<Option<DetailResult>, sqlx::Error> {
        Ok(chain::get_block(&self.store, hash, None).await?.map(|b| DetailResult::Block {
            blockchain: b.blockchain,
            hash: b.hash,
            number: b.number,
            parent_hash: b.parent_hash,
            timestamp: b.timestamp,
        }))
    }

    async fn transaction_detail(&self, hash: &str) -> Result<Option<DetailResult>, sqlx::Error> {
        Ok(chain::get_transaction(&self.store, hash, None)
            .await?
            .map(|tx| DetailResult::Transaction {
                blockchain: tx.blockchain,
                hash: tx.hash,
                block_number: tx.block_number,
                from: tx.from_address,
                to: tx.to_address,
                value: tx.value,
                timestamp: tx.timestamp,
            }))
    }

    async fn address_detail(&self, address: &str) -> Result<Option<DetailResult>, sqlx::Error> {
        Ok(chain::get_address(&self.store, address, None)
            .await?
            .map(|a| DetailResult::Address {
                blockchain: a.blockchain,
                hash: a.address.clone(),
                address: a.address,
                created_at: a.created_at,
                updated_at: a.updated_at,
            }))
    }

    /// Query the three tables concurrently, merge, sort and page.
    async fn lookup_all(
        &self,
        lookup: Lookup<'_>,
        options: &SearchOptions,
    ) -> Result<Vec<SearchResult>, sqlx::Error> {
        let fetch = options.offset as i64 + options.limit as i64;
        let blockchain = options.blockchain.as_deref();

        let (blocks, transactions, addresses) = tokio::try_join!(
            async {
                if options.includes(EntityKind::Block) {
                    chain::find_blocks(&self.store, lookup, blockchain, fetch).await
                } else {
                    Ok(Vec::new())
                }
            },
            async {
                if options.includes(EntityKind::Transaction) {
                    chain::find_transactions(&self.store, lookup, blockchain, fetch).await
                } else {
                    Ok(Vec::new())
                }
            },
            async {
                if options.includes(EntityKind::Address) {
                    chain::find_addresses(&self.store, lookup, blockchain, fetch).await
                } else {
                    Ok(Vec::new())
                }
            },
        )?;

        debug!(
            "{:?}: {} blocks, {} transactions, {} addresses",
            lookup,
            blocks.len(),
            transactions.len(),
            addresses.len()
        );

        let results = blocks
            .into_iter()
            .map(block_result)
            .chain(transactions.into_iter().map(transaction_result))
            .chain(addresses.into_iter().map(address_result))
            .collect();
        Ok(paginate(results, options))
    }
}

fn parse_patterns(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .map(normalize_hex)
        .filter(|pattern| !pattern.is_empty())
        .collect()
}

fn id_prefix(hash: &str) -> &str {
    match hash.char_indices().nth(ID_HASH_PREFIX) {
        Some((end, _)) => &hash[..end],
        None => hash,
    }
}

fn block_result(block: BlockRow) -> SearchResult {
    SearchResult {
        id: format!("{}-block-{}", block.blockchain, block.number),
        hash: block.hash,
        kind: EntityKind::Block,
        blockchain: block.blockchain,
        block_number: Some(block.number),
        timestamp: block.timestamp,
        parent_hash: block.parent_hash,
        from: None,
        to: None,
        value: None,
    }
}

fn transaction_result(tx: TransactionRow) -> SearchResult {
    SearchResult {
        id: format!("{}-tx-{}", tx.blockchain, id_prefix(&tx.hash)),
        hash: tx.hash,
        kind: EntityKind::Transaction,
        blockchain: tx.blockchain,
        block_number: Some(tx.block_number),
        timestamp: tx.timestamp,
        parent_hash: None,
        from: tx.from_address,
        to: tx.to_address,
        value: tx.value,
    }
}

fn address_result(address: AddressRow) -> SearchResult {
    SearchResult {
        id: format!("{}-addr-{}", address.blockchain, id_prefix(&address.address)),
        hash: address.address,
        kind: EntityKind::Address,
        blockchain: address.blockchain,
        block_number: None,
        timestamp: address.updated_at,
        parent_hash: None,
        from: None,
        to: None,
        value: None,
    }
}

/// Newest first; ties broken by id then hash so pages are stable.
fn compare_results(a: &SearchResult, b: &SearchResult) -> Ordering {
    b.timestamp
        .cmp(&a.timestamp)
        .then_with(|| a.id.cmp(&b.id))
        .then_with(|| a.hash.cmp(&b.hash))
}

fn paginate(mut results: Vec<SearchResult>, options: &SearchOptions) -> Vec<SearchResult> {
    results.sort_by(compare_results);
    results
        .into_iter()
        .skip(options.offset as usize)
        .take(options.limit as usize)
        .collect()
}
