//! Database initialization functions
//!
//! Opens the SQLite database, creates the schema and fills in default
//! settings for anything missing.

use crate::db::settings::keys;
use crate::error::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use tracing::info;

/// Open (creating if needed) the database file and prepare the schema
pub async fn open_database(path: &Path) -> Result<Pool<Sqlite>> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    info!("Opened database at {}", path.display());

    create_schema(&pool).await?;
    init_settings_defaults(&pool).await?;
    Ok(pool)
}

/// Open a private in-memory database with the full schema
///
/// The pool is pinned to a single connection that never expires, since each
/// SQLite memory connection is its own database.
pub async fn open_in_memory() -> Result<Pool<Sqlite>> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;

    create_schema(&pool).await?;
    init_settings_defaults(&pool).await?;
    Ok(pool)
}

/// Create all tables if they do not exist yet
pub async fn create_schema(pool: &Pool<Sqlite>) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS play_queue (
            position INTEGER PRIMARY KEY,
            platform TEXT NOT NULL,
            media_id TEXT NOT NULL,
            title TEXT NOT NULL DEFAULT '',
            artist TEXT NOT NULL DEFAULT '',
            album TEXT NOT NULL DEFAULT '',
            duration REAL,
            inserted_at INTEGER NOT NULL,
            order_index INTEGER NOT NULL,
            UNIQUE (platform, media_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS media_library (
            platform TEXT NOT NULL,
            media_id TEXT NOT NULL,
            title TEXT NOT NULL DEFAULT '',
            artist TEXT NOT NULL DEFAULT '',
            album TEXT NOT NULL DEFAULT '',
            duration REAL,
            ref_count INTEGER NOT NULL CHECK (ref_count > 0),
            download_path TEXT,
            download_quality TEXT,
            PRIMARY KEY (platform, media_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS library_batches (
            batch_id TEXT PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Initialize settings table with default values
///
/// Existing values are left untouched.
pub async fn init_settings_defaults(pool: &Pool<Sqlite>) -> Result<()> {
    let defaults = [
        (keys::DEFAULT_QUALITY, "standard"),
        (keys::WHEN_QUALITY_MISSING, "lower"),
        (keys::PLAY_ERROR, "skip"),
        (keys::ERROR_SKIP_COOLDOWN_MS, "500"),
        (keys::RESTART_ON_SAME_MEDIA, "true"),
    ];

    for (key, default_value) in defaults {
        let result = sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(default_value)
            .execute(pool)
            .await?;

        if result.rows_affected() > 0 {
            info!("Initialized setting '{}' with default value: {}", key, default_value);
        }
    }

    Ok(())
}
