// Configuration for:
// - Index store connection string
// - Server listening address/port and API quota
// - Cache settings (size, TTL)
// - Per-chain RPC endpoints and poller throttling
// - Fragment scheme and over-fetch multipliers

use dotenv::dotenv;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::blockchain::client::RetryPolicy;
use crate::blockchain::polling::PollerConfig;
use crate::db::fragment::FragmentScheme;
use crate::search::SearchLimits;

/// Chains a poller can be started for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainKind {
    Ethereum,
    Bitcoin,
}

impl ChainKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChainKind::Ethereum => "ethereum",
            ChainKind::Bitcoin => "bitcoin",
        }
    }
}

impl FromStr for ChainKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ethereum" | "eth" => Ok(ChainKind::Ethereum),
            "bitcoin" | "btc" => Ok(ChainKind::Bitcoin),
            other => Err(format!("unsupported chain: {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EthereumConfig {
    pub rpc_url: String,
    pub start_block: Option<u64>,
    pub batch_size: u64,
}

#[derive(Debug, Clone)]
pub struct BitcoinConfig {
    pub rpc_url: String,
    pub rpc_user: Option<String>,
    pub rpc_password: Option<String>,
    pub start_block: Option<u64>,
    pub batch_size: u64,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub server_host: String,
    pub server_port: u16,
    pub cache_ttl: Duration,
    pub cache_max_capacity: u64,
    pub query_timeout: Duration,
    pub rate_limit_max: u32,
    pub rate_limit_window: Duration,
    pub cors_origin: String,
    pub chains: Vec<ChainKind>,
    pub ethereum: EthereumConfig,
    pub bitcoin: BitcoinConfig,
    pub poll_interval: Duration,
    pub crawler_base_delay: Duration,
    pub crawler_max_delay: Duration,
    pub crawler_delay_multiplier: u32,
    pub rpc_timeout_secs: u64,
    pub fragment_size: usize,
    pub fragment_stride: usize,
    pub candidate_multiplier: u32,
    pub transaction_multiplier: u32,
    pub chain_scan_limit: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite:hexsearch.db".to_string(),
            server_host: "127.0.0.1".to_string(),
            server_port: 3001,
            cache_ttl: Duration::from_secs(3600),
            cache_max_capacity: 10_000,
            query_timeout: Duration::from_millis(10_000),
            rate_limit_max: 100,
            rate_limit_window: Duration::from_secs(60),
            cors_origin: "*".to_string(),
            chains: vec![ChainKind::Ethereum],
            ethereum: EthereumConfig {
                rpc_url: "https://ethereum-rpc.publicnode.com".to_string(),
                start_block: None,
                batch_size: 10,
            },
            bitcoin: BitcoinConfig {
                rpc_url: "http://127.0.0.1:8332".to_string(),
                rpc_user: None,
                rpc_password: None,
                start_block: None,
                batch_size: 10,
            },
            poll_interval: Duration::from_secs(12),
            crawler_base_delay: Duration::from_millis(500),
            crawler_max_delay: Duration::from_millis(2000),
            crawler_delay_multiplier: 2,
            rpc_timeout_secs: 30,
            fragment_size: 8,
            fragment_stride: 4,
            candidate_multiplier: 10,
            transaction_multiplier: 2,
            chain_scan_limit: 1000,
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

// A start block of 0 (or an unset variable) means "follow the chain head".
fn start_block(key: &str) -> Option<u64> {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|block| *block > 0)
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();
        let defaults = Self::default();

        let chains = env::var("CHAINS")
            .map(|value| {
                value
                    .split(',')
                    .filter(|chain| !chain.trim().is_empty())
                    .filter_map(|chain| chain.parse().ok())
                    .collect()
            })
            .unwrap_or(defaults.chains);

        Self {
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            server_host: env::var("SERVER_HOST").unwrap_or(defaults.server_host),
            server_port: env_or("SERVER_PORT", defaults.server_port),
            cache_ttl: Duration::from_secs(env_or("CACHE_TTL", defaults.cache_ttl.as_secs())),
            cache_max_capacity: env_or("CACHE_MAX_CAPACITY", defaults.cache_max_capacity),
            query_timeout: Duration::from_millis(env_or(
                "QUERY_TIMEOUT_MS",
                defaults.query_timeout.as_millis() as u64,
            )),
            rate_limit_max: env_or("RATE_LIMIT_MAX", defaults.rate_limit_max),
            rate_limit_window: Duration::from_secs(env_or(
                "RATE_LIMIT_WINDOW",
                defaults.rate_limit_window.as_secs(),
            )),
            cors_origin: env::var("CORS_ORIGIN").unwrap_or(defaults.cors_origin),
            chains,
            ethereum: EthereumConfig {
                rpc_url: env::var("ETH_RPC_URL").unwrap_or(defaults.ethereum.rpc_url),
                start_block: start_block("ETH_START_BLOCK"),
                batch_size: env_or("ETH_BATCH_SIZE", defaults.ethereum.batch_size),
            },
            bitcoin: BitcoinConfig {
                rpc_url: env::var("BTC_RPC_URL").unwrap_or(defaults.bitcoin.rpc_url),
                rpc_user: env::var("BTC_RPC_USER").ok(),
                rpc_password: env::var("BTC_RPC_PASSWORD").ok(),
                start_block: start_block("BTC_START_BLOCK"),
                batch_size: env_or("BTC_BATCH_SIZE", defaults.bitcoin.batch_size),
            },
            poll_interval: Duration::from_secs(env_or(
                "POLL_INTERVAL",
                defaults.poll_interval.as_secs(),
            )),
            crawler_base_delay: Duration::from_millis(env_or(
                "CRAWLER_BASE_DELAY_MS",
                defaults.crawler_base_delay.as_millis() as u64,
            )),
            crawler_max_delay: Duration::from_millis(env_or(
                "CRAWLER_MAX_DELAY_MS",
                defaults.crawler_max_delay.as_millis() as u64,
            )),
            crawler_delay_multiplier: env_or(
                "CRAWLER_DELAY_MULTIPLIER",
                defaults.crawler_delay_multiplier,
            ),
            rpc_timeout_secs: env_or("RPC_TIMEOUT_SECS", defaults.rpc_timeout_secs),
            fragment_size: env_or("FRAGMENT_SIZE", defaults.fragment_size),
            fragment_stride: env_or("FRAGMENT_STRIDE", defaults.fragment_stride),
            candidate_multiplier: env_or("CANDIDATE_MULTIPLIER", defaults.candidate_multiplier),
            transaction_multiplier: env_or(
                "TRANSACTION_MULTIPLIER",
                defaults.transaction_multiplier,
            ),
            chain_scan_limit: env_or("CHAIN_SCAN_LIMIT", defaults.chain_scan_limit),
        }
    }

    pub fn fragment_scheme(&self) -> FragmentScheme {
        FragmentScheme::new(self.fragment_size, self.fragment_stride)
    }

    pub fn search_limits(&self) -> SearchLimits {
        SearchLimits {
            candidate_multiplier: self.candidate_multiplier.max(1),
            transaction_multiplier: self.transaction_multiplier.max(1),
            chain_scan_limit: self.chain_scan_limit.max(1),
        }
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }

    /// Poller settings for one chain; throttle state is never shared between them.
    pub fn poller_config(&self, chain: ChainKind) -> PollerConfig {
        let (start_block, batch_size) = match chain {
            ChainKind::Ethereum => (self.ethereum.start_block, self.ethereum.batch_size),
            ChainKind::Bitcoin => (self.bitcoin.start_block, self.bitcoin.batch_size),
        };

        PollerConfig {
            poll_interval: self.poll_interval,
            base_delay: self.crawler_base_delay,
            max_delay: self.crawler_max_delay.max(self.crawler_base_delay),
            delay_multiplier: self.crawler_delay_multiplier.max(1),
            batch_size: batch_size.max(1),
            start_block,
            retry: RetryPolicy::default(),
        }
    }
}
