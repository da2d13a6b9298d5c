use anyhow::{Context, Result};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Transaction, TransactionBehavior};

pub type DbPool = r2d2::Pool<SqliteConnectionManager>;
pub type DbConn = r2d2::PooledConnection<SqliteConnectionManager>;

const FILE_PRAGMAS: &str = "
    PRAGMA journal_mode = WAL;
    PRAGMA foreign_keys = ON;
    PRAGMA busy_timeout = 5000;
";

pub fn create_pool(database_path: &str) -> Result<DbPool> {
    let manager = build_manager(database_path);
    build_pool(manager, None)
}

/// Private in-memory database. Limited to one connection since every
/// SQLite memory connection is its own database.
pub fn create_memory_pool() -> Result<DbPool> {
    let manager = SqliteConnectionManager::memory()
        .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));
    build_pool(manager, Some(1))
}

fn build_manager(path: &str) -> SqliteConnectionManager {
    SqliteConnectionManager::file(path).with_init(|conn| conn.execute_batch(FILE_PRAGMAS))
}

fn build_pool(manager: SqliteConnectionManager, max_size: Option<u32>) -> Result<DbPool> {
    let mut builder = r2d2::Pool::builder();
    if let Some(size) = max_size {
        builder = builder.max_size(size).idle_timeout(None).max_lifetime(None);
    }

    builder
        .build(manager)
        .context("Failed to create database connection pool")
}

pub fn get_connection(pool: &DbPool) -> Result<DbConn> {
    pool.get()
        .context("Failed to get database connection from pool")
}

/// Runs `f` in a write transaction, committing only if it succeeds.
///
/// The write lock is taken up front so concurrent writers queue instead of
/// failing halfway through.
pub fn with_transaction<T>(pool: &DbPool, f: impl FnOnce(&Transaction) -> Result<T>) -> Result<T> {
    run_in_transaction(pool, TransactionBehavior::Immediate, f)
}

/// Runs `f` against a single consistent snapshot of committed data.
pub fn with_read_transaction<T>(
    pool: &DbPool,
    f: impl FnOnce(&Transaction) -> Result<T>,
) -> Result<T> {
    run_in_transaction(pool, TransactionBehavior::Deferred, f)
}

fn run_in_transaction<T>(
    pool: &DbPool,
    behavior: TransactionBehavior,
    f: impl FnOnce(&Transaction) -> Result<T>,
) -> Result<T> {
    let mut conn = get_connection(pool)?;
    let tx = conn
        .transaction_with_behavior(behavior)
        .context("Failed to begin transaction")?;

    // Dropping an uncommitted transaction rolls it back.
    let value = f(&tx)?;
    tx.commit().context("Failed to commit transaction")?;

    Ok(value)
}
