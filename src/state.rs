use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;

use crate::cache::SearchCache;
use crate::config::Config;
use crate::db::Store;
use crate::search::{ChainSearch, CrossChainSearch};

/// Process-wide context shared by every handler and poller.
pub struct AppState {
    pub config: Config,
    pub store: Store,
    pub cache: SearchCache,
    pub cross_chain: CrossChainSearch,
    pub search: ChainSearch,
    pub limiter: DefaultDirectRateLimiter,
}

impl AppState {
    pub fn new(config: Config, store: Store) -> Self {
        let cache = SearchCache::new(config.cache_max_capacity, config.cache_ttl);
        let cross_chain = CrossChainSearch::new(
            store.clone(),
            cache.clone(),
            config.fragment_scheme(),
            config.search_limits(),
        );
        let search = ChainSearch::new(store.clone(), cache.clone());
        let limiter = RateLimiter::direct(api_quota(&config));

        Self {
            config,
            store,
            cache,
            cross_chain,
            search,
            limiter,
        }
    }
}

/// `rate_limit_max` requests per `rate_limit_window`, all available as a burst.
fn api_quota(config: &Config) -> Quota {
    let max = NonZeroU32::new(config.rate_limit_max).unwrap_or(NonZeroU32::MIN);
    Quota::with_period(config.rate_limit_window / max.get())
        .unwrap_or_else(|| Quota::per_second(max))
        .allow_burst(max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn quota_allows_the_configured_burst() {
        let config = Config {
            rate_limit_max: 3,
            rate_limit_window: Duration::from_secs(60),
            ..Config::default()
        };
        let limiter = RateLimiter::direct(api_quota(&config));

        assert!((0..3).all(|_| limiter.check().is_ok()));
        assert!(limiter.check().is_err());
    }
}
