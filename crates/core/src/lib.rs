//! Core library: directory exploration, content hashing, the file catalog and
//! the sync engine.

pub mod catalog;
pub mod config;
pub mod error;
pub mod explorer;
pub mod fs;
pub mod hasher;
pub mod mime;
pub mod models;
pub mod sync;

pub use catalog::{Catalog, SqliteCatalog};
pub use error::{CatalogError, ExploreError, SyncError, SyncFailure};
pub use explorer::ListOptions;
pub use fs::{FileSystem, OsFs};
#[cfg(any(test, feature = "test-util"))]
pub use fs::MemFs;
pub use sync::{SyncEngine, SyncReport};

/// Connects to the catalog database and brings its schema up to date.
pub async fn open_catalog(cfg: &config::DatabaseConfig) -> anyhow::Result<SqliteCatalog> {
    use anyhow::Context;

    let pool = storage::connect(&cfg.path).await.context("db connect")?;
    storage::migrate(&pool).await.context("db migrate")?;
    if let Some(script) = &cfg.init_sql {
        storage::run_init_script(&pool, std::path::Path::new(script))
            .await
            .context("db init script")?;
    }
    Ok(SqliteCatalog::new(pool))
}
