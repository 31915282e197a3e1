pub mod api;
pub mod blockchain;
pub mod cache;
pub mod config;
pub mod db;
pub mod models;
pub mod search;
pub mod state;
pub mod validation;

#[cfg(test)]
pub mod tests;

pub use api::{create_router, ApiError};
pub use cache::{CacheKey, SearchCache};
pub use config::Config;
pub use db::Store;
pub use search::{ChainSearch, CrossChainSearch};
pub use state::AppState;
