// SQLite-backed index store shared by ingestion and query paths.

use sqlx::{
    migrate::MigrateDatabase,
    sqlite::SqlitePoolOptions,
    Sqlite, SqlitePool,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

use crate::db::migration::run_migrations;

/// Handle to the index store. Cheap to clone; every clone shares the pool
/// and the statement counter.
#[derive(Clone, Debug)]
pub struct Store {
    pool: SqlitePool,
    statements: Arc<AtomicU64>,
}

impl Store {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            statements: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub(crate) fn record_statement(&self) {
        self.statements.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of statements issued through this store since it was opened.
    pub fn statement_count(&self) -> u64 {
        self.statements.load(Ordering::Relaxed)
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!("Index store closed");
    }
}

pub async fn establish_connection(database_url: &str) -> Result<Store, sqlx::Error> {
    // Create database if it doesn't exist
    if !Sqlite::database_exists(database_url).await.unwrap_or(false) {
        Sqlite::create_database(database_url).await?;
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(num_cpus::get().max(4) as u32)
        .connect(database_url)
        .await?;

    // Enable WAL mode for better concurrency
    sqlx::query("PRAGMA journal_mode=WAL").execute(&pool).await?;

    run_migrations(&pool).await?;
    info!("Index store ready at {}", database_url);

    Ok(Store::new(pool))
}

/// In-memory store. A single connection is kept open for the lifetime of the
/// pool; an in-memory SQLite database lives only as long as its connection.
pub async fn connect_in_memory() -> Result<Store, sqlx::Error> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;

    run_migrations(&pool).await?;
    Ok(Store::new(pool))
}
