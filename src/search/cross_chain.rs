// Cross-chain fragment search over the global index:
// candidates matching every fragment in SQL, AND-verification in memory,
// enrichment grouped per address, then transaction expansion.

use tracing::debug;

use crate::cache::{CacheKey, SearchCache};
use crate::db::fragment::FragmentScheme;
use crate::db::{address, fragment, transaction, Store};
use crate::models::{
    normalize_address, AddressResult, AddressTransactions, CrossChainOptions, CrossChainSearchResult,
    GlobalAddressEntry, TransactionResult,
};
use crate::search::SearchLimits;

#[derive(Clone)]
pub struct CrossChainSearch {
    store: Store,
    cache: SearchCache,
    scheme: FragmentScheme,
    limits: SearchLimits,
}

impl CrossChainSearch {
    pub fn new(store: Store, cache: SearchCache, scheme: FragmentScheme, limits: SearchLimits) -> Self {
        Self {
            store,
            cache,
            scheme,
            limits,
        }
    }

    /// Addresses containing every fragment, with their related transactions.
    /// Results are cached per fragment set and options.
    pub async fn search_address_fragments(
        &self,
        fragments: &[String],
        options: &CrossChainOptions,
    ) -> Result<CrossChainSearchResult, sqlx::Error> {
        let fragments = normalize_fragments(fragments);
        if fragments.is_empty() {
            return Ok(CrossChainSearchResult::default());
        }

        let key = CacheKey::cross_chain_search(&fragments, options);
        self.cache
            .get_or_compute(&key, || async {
                let addresses = self.find_addresses_with_all_fragments(&fragments, options).await?;
                if addresses.is_empty() {
                    return Ok(CrossChainSearchResult::default());
                }

                let page: Vec<String> = addresses.iter().map(|a| a.address.clone()).collect();
                let transactions = self
                    .find_transactions_for_addresses(&page, &CrossChainOptions {
                        offset: 0,
                        ..options.clone()
                    })
                    .await?;

                Ok(CrossChainSearchResult {
                    addresses,
                    transactions,
                })
            })
            .await
    }

    /// One page of grouped addresses containing all `fragments`.
    pub async fn find_addresses_with_all_fragments(
        &self,
        fragments: &[String],
        options: &CrossChainOptions,
    ) -> Result<Vec<AddressResult>, sqlx::Error> {
        let fragments = normalize_fragments(fragments);
        let Some(driver) = fragments.first() else {
            return Ok(Vec::new());
        };

        let chains = options.chain_filter();
        let chains = chains.as_deref();
        let fetch = (options.offset as i64 + options.limit as i64)
            * self.limits.candidate_multiplier as i64;

        let candidates = if fragments.len() == 1 && driver.chars().count() <= self.scheme.size() {
            let prefix = self.scheme.lookup_prefix(driver);
            fragment::find_candidates(&self.store, prefix, driver, chains, fetch).await?
        } else {
            address::find_candidates(&self.store, &fragments, chains, fetch).await?
        };

        let mut matching: Vec<String> = candidates
            .into_iter()
            .filter(|address| fragments.iter().all(|f| address.contains(f.as_str())))
            .collect();
        matching.sort();
        matching.dedup();

        debug!(
            "Fragments {:?}: {} matching addresses",
            fragments,
            matching.len()
        );
        if matching.is_empty() {
            return Ok(Vec::new());
        }

        let entries = address::get_entries(&self.store, &matching, chains).await?;
        Ok(group_by_address(entries)
            .into_iter()
            .skip(options.offset as usize)
            .take(options.limit as usize)
            .collect())
    }

    /// Transactions sent from or to any of `addresses`, newest first.
    ///
    /// Fetches `limit × transaction_multiplier` rows from `offset` and keeps the
    /// first `limit`. Each (tx_hash, blockchain) pair comes back once, so the
    /// extra rows are only the configured over-fetch.
    pub async fn find_transactions_for_addresses(
        &self,
        addresses: &[String],
        options: &CrossChainOptions,
    ) -> Result<Vec<TransactionResult>, sqlx::Error> {
        let addresses: Vec<String> = addresses.iter().map(|a| normalize_address(a)).collect();
        let chains = options.chain_filter();
        let fetch = options.limit as i64 * self.limits.transaction_multiplier as i64;

        let mut transactions = transaction::find_for_addresses(
            &self.store,
            &addresses,
            chains.as_deref(),
            fetch,
            options.offset as i64,
        )
        .await?;
        transactions.truncate(options.limit as usize);
        Ok(transactions)
    }

    /// Exact-match lookup of one full address across chains.
    pub async fn find_address(
        &self,
        address: &str,
        options: &CrossChainOptions,
    ) -> Result<Option<AddressResult>, sqlx::Error> {
        let chains = options.chain_filter();
        let entries =
            address::get_entries(&self.store, &[normalize_address(address)], chains.as_deref()).await?;
        Ok(group_by_address(entries).into_iter().next())
    }

    /// Address details plus a page of its transactions, or `None` when the
    /// address has never been indexed.
    pub async fn address_transactions(
        &self,
        address: &str,
        options: &CrossChainOptions,
    ) -> Result<Option<AddressTransactions>, sqlx::Error> {
        let address = normalize_address(address);
        let key = CacheKey::address_transactions(&address, options);
        if let Some(cached) = self.cache.get_json(&key).await {
            return Ok(Some(cached));
        }

        let addresses = [address.clone()];
        let (details, transactions) = tokio::try_join!(
            self.find_address(&address, options),
            self.find_transactions_for_addresses(&addresses, options),
        )?;

        let Some(address_details) = details else {
            return Ok(None);
        };
        let result = AddressTransactions {
            address,
            address_details,
            transactions,
        };
        self.cache.set_json(&key, &result).await;
        Ok(Some(result))
    }

    /// Distinct chains present in the global address index.
    pub async fn get_supported_blockchains(&self) -> Result<Vec<String>, sqlx::Error> {
        self.cache
            .get_or_compute(&CacheKey::SupportedChains, || {
                address::distinct_blockchains(&self.store, self.limits.chain_scan_limit as i64)
            })
            .await
    }
}

/// Lowercase, trim and drop empty fragments, keeping request order.
fn normalize_fragments(fragments: &[String]) -> Vec<String> {
    fragments
        .iter()
        .map(|f| f.trim().to_lowercase())
        .filter(|f| !f.is_empty())
        .collect()
}

/// Fold per-chain rows into one result per address. Rows must arrive
/// ordered by address.
fn group_by_address(entries: Vec<GlobalAddressEntry>) -> Vec<AddressResult> {
    let mut grouped: Vec<AddressResult> = Vec::new();

    for entry in entries {
        match grouped.last_mut() {
            Some(current) if current.address == entry.address => {
                current.blockchains.push(entry.blockchain);
                current.first_seen = match (current.first_seen, entry.first_seen) {
                    (Some(a), Some(b)) => Some(a.min(b)),
                    (a, b) => a.or(b),
                };
                current.last_seen = current.last_seen.max(entry.last_seen);
                current.tx_count += entry.tx_count;
            }
            _ => grouped.push(AddressResult {
                address: entry.address,
                blockchains: vec![entry.blockchain],
                first_seen: entry.first_seen,
                last_seen: entry.last_seen,
                tx_count: entry.tx_count,
            }),
        }
    }

    grouped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(address: &str, blockchain: &str, first: Option<i64>, last: i64, count: i64) -> GlobalAddressEntry {
        GlobalAddressEntry {
            address: address.into(),
            blockchain: blockchain.into(),
            first_seen: first,
            last_seen: last,
            tx_count: count,
        }
    }

    #[test]
    fn groups_chains_per_address() {
        let grouped = group_by_address(vec![
            entry("0xabc", "ethereum", Some(20), 50, 2),
            entry("0xabc", "polygon", Some(10), 40, 3),
            entry("0xdef", "ethereum", None, 5, 1),
        ]);

        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[0].blockchains, vec!["ethereum", "polygon"]);
        assert_eq!(grouped[0].first_seen, Some(10));
        assert_eq!(grouped[0].last_seen, 50);
        assert_eq!(grouped[0].tx_count, 5);
        assert_eq!(grouped[1].first_seen, None);
    }

    #[test]
    fn fragments_are_lowercased_and_blank_ones_dropped() {
        let fragments = normalize_fragments(&["06E3".into(), " ".into(), "13D0 ".into()]);
        assert_eq!(fragments, vec!["06e3", "13d0"]);
    }
}
