pub mod bitcoin;
pub mod client;
pub mod ethereum;
pub mod models;
pub mod polling;
pub mod processor;
pub mod throttle;

// Re-exports for convenience
pub use bitcoin::BitcoinClient;
pub use client::{ChainClient, ClientError};
pub use ethereum::EthereumClient;
pub use polling::{ChainPoller, PollerConfig};
pub use processor::{index_transaction_by_hash, BlockIndexer};
