//! Storage layer: SQLite pool setup, schema migrations and row models for the
//! file catalog.

pub mod models;

use anyhow::Context;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Executor, SqlitePool};
use std::path::Path;
use std::str::FromStr;

/// Turns a bare filesystem path into a `sqlite:` URL; URLs pass through.
pub fn database_url(database: &str) -> String {
    if database.starts_with("sqlite:") {
        return database.to_string();
    }
    let path = std::path::PathBuf::from(database);
    let norm = path.to_string_lossy().replace('\\', "/");
    if path.is_absolute() {
        format!("sqlite:///{}", norm.trim_start_matches('/'))
    } else {
        format!("sqlite://{}", norm)
    }
}

pub async fn connect(database: &str) -> anyhow::Result<SqlitePool> {
    if !database.starts_with("sqlite:") {
        if let Some(parent) = Path::new(database).parent() {
            let _ = std::fs::create_dir_all(parent);
        }
    }
    let url = database_url(database);
    let options = SqliteConnectOptions::from_str(&url)
        .with_context(|| format!("invalid database url {url}"))?
        .create_if_missing(true)
        .foreign_keys(true);
    let mut opts = SqlitePoolOptions::new();
    if url.contains("memory") {
        opts = opts.max_connections(1);
    } else {
        opts = opts.max_connections(5);
    }
    let pool = opts.connect_with(options).await?;
    tracing::debug!(%url, "catalog database connected");
    Ok(pool)
}

pub async fn migrate(pool: &SqlitePool) -> anyhow::Result<()> {
    // Applies SQLx migrations located in crates/storage/migrations.
    // Safe to run multiple times (idempotent).
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Executes an external schema script (several `;`-separated statements).
pub async fn run_init_script(pool: &SqlitePool, script: &Path) -> anyhow::Result<()> {
    let sql = std::fs::read_to_string(script)
        .with_context(|| format!("read init script {}", script.display()))?;
    pool.execute(sql.as_str())
        .await
        .with_context(|| format!("apply init script {}", script.display()))?;
    Ok(())
}
