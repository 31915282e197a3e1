//! Cache key generation

use std::fmt;

use crate::models::{CrossChainOptions, EntityKind, SearchOptions};

/// A structured cache key that renders to the string stored in the cache.
/// Equal queries always render to equal strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Fragment search results
    CrossChainSearch {
        fragments: Vec<String>,
        options: String,
    },
    /// Transactions of one address across chains
    AddressTransactions { address: String, options: String },
    /// Distinct chains in the global index
    SupportedChains,
    /// Single-chain search results
    Search { query: String, options: String },
    /// Single-chain multi-pattern results, always substring
    PatternSearch {
        patterns: Vec<String>,
        options: String,
    },
    /// Detail lookup of one hash
    Details {
        hash: String,
        kind: Option<EntityKind>,
    },
}

impl CacheKey {
    /// Fragments are sorted so their order in the request does not matter.
    pub fn cross_chain_search(fragments: &[String], options: &CrossChainOptions) -> Self {
        let mut fragments = fragments.to_vec();
        fragments.sort();
        Self::CrossChainSearch {
            fragments,
            options: options.canonical(),
        }
    }

    pub fn address_transactions(address: &str, options: &CrossChainOptions) -> Self {
        Self::AddressTransactions {
            address: address.to_string(),
            options: options.canonical(),
        }
    }

    pub fn search(query: &str, options: &SearchOptions) -> Self {
        Self::Search {
            query: query.to_string(),
            options: options.canonical(),
        }
    }

    pub fn pattern_search(patterns: &[String], options: &SearchOptions) -> Self {
        Self::PatternSearch {
            patterns: patterns.to_vec(),
            options: options.canonical(),
        }
    }

    pub fn details(hash: &str, kind: Option<EntityKind>) -> Self {
        Self::Details {
            hash: hash.to_string(),
            kind,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CrossChainSearch { fragments, options } => {
                write!(f, "cross-chain:{}:{}", fragments.join("+"), options)
            }
            Self::AddressTransactions { address, options } => {
                write!(f, "cross-chain-address:{}:{}", address, options)
            }
            Self::SupportedChains => write!(f, "cross-chain:chains"),
            Self::Search { query, options } => write!(f, "search:{}:{}", query, options),
            Self::PatternSearch { patterns, options } => {
                write!(f, "search-multi:{}:{}", patterns.join(" "), options)
            }
            Self::Details { hash, kind } => match kind {
                Some(kind) => write!(f, "details:{}:{}", hash, kind),
                None => write!(f, "details:{}:*", hash),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragment_order_does_not_change_the_key() {
        let options = CrossChainOptions::new(10, 0);
        let a = CacheKey::cross_chain_search(&["13d0".into(), "06e3".into()], &options);
        let b = CacheKey::cross_chain_search(&["06e3".into(), "13d0".into()], &options);
        assert_eq!(a.to_string(), b.to_string());
        assert!(a.to_string().starts_with("cross-chain:06e3+13d0:"));
    }

    #[test]
    fn options_are_part_of_the_key() {
        let fragments = vec!["aaa".to_string()];
        let first = CacheKey::cross_chain_search(&fragments, &CrossChainOptions::new(10, 0));
        let second = CacheKey::cross_chain_search(&fragments, &CrossChainOptions::new(10, 10));
        assert_ne!(first.to_string(), second.to_string());
    }

    #[test]
    fn pattern_search_never_renders_like_a_query() {
        let options = SearchOptions::new(10, 0);
        let patterns = CacheKey::pattern_search(&["abc".into()], &options);
        let query = CacheKey::search("multi:abc", &options);
        assert_ne!(patterns.to_string(), query.to_string());
        assert!(patterns.to_string().starts_with("search-multi:abc:"));
    }

    #[test]
    fn details_key_names_the_kind() {
        assert_eq!(CacheKey::details("ab", None).to_string(), "details:ab:*");
        assert_eq!(
            CacheKey::details("ab", Some(EntityKind::Block)).to_string(),
            "details:ab:block"
        );
    }
}
