pub mod cross_chain;
pub mod single_chain;

pub use cross_chain::CrossChainSearch;
pub use single_chain::ChainSearch;

/// Over-fetch factors and scan caps used by the search engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchLimits {
    /// Candidate rows fetched per requested address.
    pub candidate_multiplier: u32,
    /// Transaction rows fetched per requested transaction.
    pub transaction_multiplier: u32,
    /// Rows scanned when listing distinct chains.
    pub chain_scan_limit: u32,
}

impl Default for SearchLimits {
    fn default() -> Self {
        Self {
            candidate_multiplier: 10,
            transaction_multiplier: 2,
            chain_scan_limit: 1000,
        }
    }
}
