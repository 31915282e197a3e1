pub mod address;
pub mod chain;
pub mod connection;
pub mod fragment;
pub mod migration;
pub mod query;
pub mod transaction;

pub use connection::Store;

/// Schema statements, applied in order by `migration::run_migrations`.
pub const INIT_SCHEMA: &[&str] = &[
    // Cross-chain address index; tx_count is a counter, first_seen is set once
    r#"CREATE TABLE IF NOT EXISTS global_address_index (
        address TEXT NOT NULL,
        blockchain TEXT NOT NULL,
        first_seen INTEGER,
        last_seen INTEGER NOT NULL,
        tx_count INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (address, blockchain)
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_global_address_blockchain ON global_address_index(blockchain)",
    // Inverted index of fixed-size address windows
    r#"CREATE TABLE IF NOT EXISTS address_fragments (
        fragment TEXT NOT NULL,
        address TEXT NOT NULL,
        blockchain TEXT NOT NULL,
        PRIMARY KEY (fragment, address, blockchain)
    )"#,
    r#"CREATE TABLE IF NOT EXISTS global_transaction_index (
        tx_hash TEXT NOT NULL,
        blockchain TEXT NOT NULL,
        block_number INTEGER NOT NULL,
        from_address TEXT,
        to_address TEXT,
        timestamp INTEGER NOT NULL,
        PRIMARY KEY (tx_hash, blockchain)
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_global_tx_from ON global_transaction_index(from_address)",
    "CREATE INDEX IF NOT EXISTS idx_global_tx_to ON global_transaction_index(to_address)",
    "CREATE INDEX IF NOT EXISTS idx_global_tx_time ON global_transaction_index(timestamp)",
    // Per-chain tables used by single-chain search
    r#"CREATE TABLE IF NOT EXISTS blocks (
        blockchain TEXT NOT NULL,
        number INTEGER NOT NULL,
        hash TEXT NOT NULL,
        parent_hash TEXT,
        timestamp INTEGER NOT NULL,
        created_at INTEGER NOT NULL,
        PRIMARY KEY (blockchain, number, hash)
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_blocks_hash ON blocks(hash)",
    r#"CREATE TABLE IF NOT EXISTS transactions (
        blockchain TEXT NOT NULL,
        hash TEXT NOT NULL,
        block_number INTEGER NOT NULL,
        from_address TEXT,
        to_address TEXT,
        value TEXT,
        timestamp INTEGER NOT NULL,
        created_at INTEGER NOT NULL,
        PRIMARY KEY (blockchain, hash)
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_transactions_hash ON transactions(hash)",
    "CREATE INDEX IF NOT EXISTS idx_transactions_block ON transactions(block_number)",
    r#"CREATE TABLE IF NOT EXISTS addresses (
        blockchain TEXT NOT NULL,
        address TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL,
        PRIMARY KEY (blockchain, address)
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_addresses_address ON addresses(address)",
];
