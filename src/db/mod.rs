//! Database Access Layer
//!
//! Embedded SQLite store via sqlx. The schema is created at startup and
//! evolved by additive column migration so old databases keep working.

pub mod calls;
pub mod tasks;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use std::time::Duration;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS calls (
    id TEXT PRIMARY KEY,
    caller_id TEXT,
    started_at TEXT NOT NULL,
    ended_at TEXT,
    duration_seconds INTEGER,
    cost_cents REAL NOT NULL DEFAULT 0,
    transcript TEXT NOT NULL DEFAULT '[]',
    logs TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS blacklist (
    caller_id TEXT PRIMARY KEY,
    reason TEXT NOT NULL DEFAULT '',
    blocked_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS whitelist (
    caller_id TEXT PRIMARY KEY,
    note TEXT,
    added_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS failed_unlock_calls (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    caller_id TEXT NOT NULL,
    failed_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_failed_unlock_caller
    ON failed_unlock_calls (caller_id, failed_at);

CREATE TABLE IF NOT EXISTS tasks (
    id TEXT PRIMARY KEY,
    agent_name TEXT NOT NULL,
    description TEXT,
    status TEXT NOT NULL DEFAULT 'pending',
    result TEXT,
    error TEXT,
    caller_id TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

/// Columns added after the initial schema shipped.
/// (table, column, declaration) — applied only when missing.
const ADDITIVE_COLUMNS: &[(&str, &str, &str)] = &[
    ("calls", "cost_cents", "REAL NOT NULL DEFAULT 0"),
    ("calls", "logs", "TEXT NOT NULL DEFAULT ''"),
    ("tasks", "caller_id", "TEXT"),
];

/// Open (or create) the database and bring the schema up to date
pub async fn init_pool(database_path: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", database_path))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(5))
        .connect_with(options)
        .await?;

    migrate(&pool).await?;
    tracing::info!("database ready: {}", database_path);
    Ok(pool)
}

/// In-memory database for tests
pub async fn init_memory_pool() -> Result<SqlitePool, sqlx::Error> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    migrate(&pool).await?;
    Ok(pool)
}

async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(SCHEMA_SQL).execute(pool).await?;

    for (table, column, declaration) in ADDITIVE_COLUMNS {
        if !column_exists(pool, table, column).await? {
            tracing::info!("migrating: adding {}.{}", table, column);
            sqlx::query(&format!(
                "ALTER TABLE {} ADD COLUMN {} {}",
                table, column, declaration
            ))
            .execute(pool)
            .await?;
        }
    }
    Ok(())
}

async fn column_exists(pool: &SqlitePool, table: &str, column: &str) -> Result<bool, sqlx::Error> {
    let rows = sqlx::query(&format!("PRAGMA table_info({})", table))
        .fetch_all(pool)
        .await?;
    Ok(rows
        .iter()
        .any(|row| row.get::<String, _>("name") == column))
}
