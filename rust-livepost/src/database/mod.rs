//! SQLite persistence layer.
//!
//! Connection pool setup, embedded migrations, row models and repositories.

pub mod models;
pub mod repositories;
pub mod retry;
pub mod time;

pub use retry::retry_on_sqlite_busy;

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use tracing::{info, warn};

use crate::Result;

pub type DbPool = Pool<Sqlite>;

pub const DEFAULT_MAX_CONNECTIONS: u32 = 4;
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(30);
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Where and how to open the video database.
#[derive(Debug, Clone)]
pub struct DbSettings {
    pub url: String,
    pub max_connections: u32,
    /// How long SQLite itself waits on a locked database before
    /// [`retry_on_sqlite_busy`] takes over.
    pub busy_timeout: Duration,
}

impl DbSettings {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }

    /// Private in-memory database. A single connection, since every
    /// connection would otherwise open its own empty database.
    pub fn in_memory() -> Self {
        Self {
            max_connections: 1,
            ..Self::new("sqlite::memory:")
        }
    }
}

/// Open the pool and apply migrations.
///
/// File databases run in WAL mode so the poller, prefetch jobs and feed
/// ingestion can read while one of them writes.
pub async fn connect(settings: &DbSettings) -> Result<DbPool> {
    let options = SqliteConnectOptions::from_str(&settings.url)?
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(settings.busy_timeout)
        .foreign_keys(true)
        .pragma("temp_store", "memory")
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(settings.max_connections.max(1))
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect_with(options)
        .await?;

    let (journal_mode,): (String,) = sqlx::query_as("PRAGMA journal_mode")
        .fetch_one(&pool)
        .await?;
    if journal_mode != "wal" && journal_mode != "memory" {
        warn!(journal_mode = %journal_mode, "Database is not in WAL mode; concurrent polling may stall");
    }

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!(
        max_connections = settings.max_connections,
        journal_mode = %journal_mode,
        "Video database ready"
    );
    Ok(pool)
}
