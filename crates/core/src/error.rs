//! Error taxonomy shared by the explorer, the catalog and the sync engine.

use crate::models::JobStatus;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExploreError {
    #[error("invalid path")]
    InvalidPath,
    #[error("path not found: {0}")]
    PathNotFound(PathBuf),
    #[error("permission denied: {0}")]
    PermissionDenied(PathBuf),
    #[error("invalid pattern: {0}")]
    PatternInvalid(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ExploreError {
    /// Classifies an error from reading the listing root.
    pub fn from_io(path: impl Into<PathBuf>, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => ExploreError::PathNotFound(path.into()),
            io::ErrorKind::PermissionDenied => ExploreError::PermissionDenied(path.into()),
            _ => ExploreError::Io(err),
        }
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("storage error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("already exists: {0}")]
    Duplicate(String),
    #[error("sync job {0} not found")]
    JobNotFound(i64),
    #[error("sync job {job_id} cannot move from {from} to {to}")]
    InvalidTransition {
        job_id: i64,
        from: JobStatus,
        to: JobStatus,
    },
    #[error("unknown job status {0:?}")]
    UnknownStatus(String),
}

impl CatalogError {
    pub(crate) fn from_insert(err: sqlx::Error, what: impl Into<String>) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                CatalogError::Duplicate(what.into())
            }
            _ => CatalogError::Database(err),
        }
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("source and destination cannot be the same")]
    SameSourceDestination,
    #[error("sync pair {source_dir} -> {dest_dir} is not known; confirm with force")]
    Conflict { source_dir: String, dest_dir: String },
    #[error("listing source failed: {0}")]
    List(#[from] ExploreError),
    #[error("hashing {path} failed: {source}")]
    Hash { path: PathBuf, source: io::Error },
    #[error("copying {path} failed: {source}")]
    Copy { path: PathBuf, source: io::Error },
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// A sync that stopped early. `copied` lists what reached the destination
/// before the failure; those files stay in place.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct SyncFailure {
    pub job_id: Option<i64>,
    pub copied: Vec<String>,
    #[source]
    pub error: SyncError,
}

impl SyncFailure {
    pub fn before_job(error: SyncError) -> Self {
        Self {
            job_id: None,
            copied: Vec::new(),
            error,
        }
    }
}
