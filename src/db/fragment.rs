//! Address fragments: an inverted index of fixed-size windows over each
//! normalized address, so "contains" queries hit a small table instead of
//! scanning every address.

use sqlx::{QueryBuilder, Sqlite};
use tracing::debug;

use crate::db::query::{Select, Table};
use crate::db::Store;
use crate::models::AddressFragment;

/// Window size and stride used to cut addresses into fragments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentScheme {
    size: usize,
    stride: usize,
}

impl Default for FragmentScheme {
    fn default() -> Self {
        Self { size: 8, stride: 4 }
    }
}

impl FragmentScheme {
    pub fn new(size: usize, stride: usize) -> Self {
        let size = size.max(1);
        Self {
            size,
            stride: stride.clamp(1, size),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Longest query that is guaranteed to sit inside a single stored window,
    /// wherever it occurs in the address.
    pub fn covered_len(&self) -> usize {
        self.size - self.stride + 1
    }

    /// Windows starting at 0 and every `stride` characters, plus the final
    /// window ending at the last character. Addresses shorter than a window
    /// are stored whole.
    pub fn fragments(&self, address: &str) -> Vec<String> {
        let chars: Vec<char> = address.chars().collect();
        if chars.is_empty() {
            return Vec::new();
        }
        if chars.len() <= self.size {
            return vec![address.to_string()];
        }

        let last_start = chars.len() - self.size;
        let mut starts: Vec<usize> = (0..=last_start).step_by(self.stride).collect();
        if starts.last() != Some(&last_start) {
            starts.push(last_start);
        }

        starts
            .into_iter()
            .map(|start| chars[start..start + self.size].iter().collect())
            .collect()
    }

    /// The part of `query` to look up in the fragment table. Anything longer
    /// than `covered_len` may straddle two windows, so only its head is used
    /// and callers check the full query against the candidate address.
    pub fn lookup_prefix<'a>(&self, query: &'a str) -> &'a str {
        match query.char_indices().nth(self.covered_len()) {
            Some((end, _)) => &query[..end],
            None => query,
        }
    }
}

pub async fn insert_fragments(
    store: &Store,
    address: &str,
    blockchain: &str,
    fragments: &[String],
) -> Result<(), sqlx::Error> {
    if fragments.is_empty() {
        return Ok(());
    }

    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
        "INSERT OR IGNORE INTO address_fragments (fragment, address, blockchain) ",
    );
    builder.push_values(fragments, |mut row, fragment| {
        row.push_bind(fragment.clone())
            .push_bind(address.to_string())
            .push_bind(blockchain.to_string());
    });

    store.record_statement();
    builder.build().execute(store.pool()).await?;

    debug!("Stored {} fragments for {} on {}", fragments.len(), address, blockchain);
    Ok(())
}

/// Distinct addresses with a stored fragment containing `prefix` whose full
/// address also contains `needle`. `LIMIT` counts only real matches.
pub async fn find_candidates(
    store: &Store,
    prefix: &str,
    needle: &str,
    chains: Option<&[String]>,
    limit: i64,
) -> Result<Vec<String>, sqlx::Error> {
    let rows: Vec<(String,)> = Select::new("DISTINCT address", Table::AddressFragments)
        .contains("fragment", prefix)
        .optional((prefix != needle).then_some(needle), |select, needle| {
            select.contains("address", needle)
        })
        .optional(chains, |select, chains| select.is_in("blockchain", chains))
        .order_by("address")
        .limit(limit)
        .fetch_all(store)
        .await?;
    Ok(rows.into_iter().map(|(address,)| address).collect())
}

pub async fn fragments_for(
    store: &Store,
    address: &str,
    blockchain: &str,
) -> Result<Vec<AddressFragment>, sqlx::Error> {
    Select::new("fragment, address, blockchain", Table::AddressFragments)
        .eq("address", address)
        .eq("blockchain", blockchain)
        .order_by("fragment")
        .fetch_all(store)
        .await
}
