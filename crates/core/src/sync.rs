//! One-shot synchronization of a source directory's immediate children into a
//! destination directory. A file is copied when the catalog has no record of
//! its path or the recorded content hash differs.

use crate::catalog::Catalog;
use crate::error::{SyncError, SyncFailure};
use crate::explorer;
use crate::fs::FileSystem;
use crate::hasher;
use crate::models::JobStatus;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub job_id: i64,
    /// Base names of the copied files, in source listing order.
    pub copied: Vec<String>,
}

#[derive(Clone)]
pub struct SyncEngine {
    fs: Arc<dyn FileSystem>,
    catalog: Arc<dyn Catalog>,
}

/// Strips trailing separators; a bare root stays as it is.
pub fn normalize_dir(dir: &str) -> String {
    let trimmed = dir.trim_end_matches(std::path::is_separator);
    if trimmed.is_empty() && !dir.is_empty() {
        dir[..1].to_string()
    } else {
        trimmed.to_string()
    }
}

impl SyncEngine {
    pub fn new(fs: Arc<dyn FileSystem>, catalog: Arc<dyn Catalog>) -> Self {
        Self { fs, catalog }
    }

    pub fn catalog(&self) -> &Arc<dyn Catalog> {
        &self.catalog
    }

    /// Resolves the pair for `source -> dest` and runs [`SyncEngine::sync`].
    /// An unknown pair is only created when `force` is set.
    pub async fn sync_dirs(
        &self,
        source_dir: &str,
        dest_dir: &str,
        force: bool,
    ) -> Result<SyncReport, SyncFailure> {
        let source = normalize_dir(source_dir);
        let dest = normalize_dir(dest_dir);
        if source == dest {
            return Err(SyncFailure::before_job(SyncError::SameSourceDestination));
        }
        let known = self
            .catalog
            .find_pair(&source, &dest)
            .await
            .map_err(|e| SyncFailure::before_job(e.into()))?;
        let pair = match known {
            Some(pair) => pair,
            None if force => self
                .catalog
                .get_or_create_pair(&source, &dest)
                .await
                .map_err(|e| SyncFailure::before_job(e.into()))?,
            None => {
                return Err(SyncFailure::before_job(SyncError::Conflict {
                    source_dir: source,
                    dest_dir: dest,
                }))
            }
        };
        self.sync(&source, &dest, pair.id).await
    }

    pub async fn sync(
        &self,
        source_dir: &str,
        dest_dir: &str,
        pair_id: i64,
    ) -> Result<SyncReport, SyncFailure> {
        let source = normalize_dir(source_dir);
        let dest = normalize_dir(dest_dir);
        if source == dest {
            return Err(SyncFailure::before_job(SyncError::SameSourceDestination));
        }

        let job_id = self
            .catalog
            .create_job(pair_id)
            .await
            .map_err(|e| SyncFailure::before_job(e.into()))?;
        info!(job_id, pair_id, %source, %dest, "sync job started");

        let mut copied = Vec::new();
        match self.run(job_id, &source, &dest, &mut copied).await {
            Ok(()) => {
                if let Err(e) = self
                    .catalog
                    .set_job_status(job_id, JobStatus::Completed)
                    .await
                {
                    return Err(SyncFailure {
                        job_id: Some(job_id),
                        copied,
                        error: e.into(),
                    });
                }
                info!(job_id, copied = copied.len(), "sync job completed");
                Ok(SyncReport { job_id, copied })
            }
            Err(error) => {
                warn!(job_id, copied = copied.len(), error = %error, "sync job failed");
                if let Err(e) = self.catalog.set_job_status(job_id, JobStatus::Failed).await {
                    warn!(job_id, error = %e, "could not mark sync job failed");
                }
                Err(SyncFailure {
                    job_id: Some(job_id),
                    copied,
                    error,
                })
            }
        }
    }

    async fn run(
        &self,
        job_id: i64,
        source: &str,
        dest: &str,
        copied: &mut Vec<String>,
    ) -> Result<(), SyncError> {
        let fs = self.fs.clone();
        let listing_root = PathBuf::from(source);
        let children =
            task::spawn_blocking(move || explorer::list_children(fs.as_ref(), &listing_root))
                .await??;

        // Only the top level of the source is synchronized.
        for child in children.into_iter().filter(|c| !c.is_dir) {
            let src_path = PathBuf::from(&child.path);
            let hash = self.hash(&src_path).await?;

            let known = self.catalog.find_file_by_path(&child.path).await?;
            if known.as_ref().is_some_and(|record| record.hash == hash) {
                debug!(path = %child.path, "unchanged, skipping");
                continue;
            }

            let dst_path = Path::new(dest).join(&child.name);
            let size = self.copy(&src_path, &dst_path).await?;
            let file_id = self
                .catalog
                .upsert_file_record(&child.path, &hash, size)
                .await?;
            self.catalog.link_synced_file(job_id, file_id).await?;
            debug!(path = %child.path, to = %dst_path.display(), size, "copied");
            copied.push(child.name);
        }
        Ok(())
    }

    async fn hash(&self, path: &Path) -> Result<String, SyncError> {
        let fs = self.fs.clone();
        let owned = path.to_path_buf();
        task::spawn_blocking(move || hasher::hash(fs.as_ref(), &owned))
            .await?
            .map_err(|source| SyncError::Hash {
                path: path.to_path_buf(),
                source,
            })
    }

    async fn copy(&self, from: &Path, to: &Path) -> Result<u64, SyncError> {
        let fs = self.fs.clone();
        let (src, dst) = (from.to_path_buf(), to.to_path_buf());
        task::spawn_blocking(move || copy_file(fs.as_ref(), &src, &dst))
            .await?
            .map_err(|source| SyncError::Copy {
                path: from.to_path_buf(),
                source,
            })
    }
}

/// Streams `from` into a sibling partial file of `to`, then renames it into
/// place. Returns the number of bytes copied.
pub fn copy_file(fs: &dyn FileSystem, from: &Path, to: &Path) -> io::Result<u64> {
    let name = to
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "destination has no file name"))?;
    let partial = to.with_file_name(format!(".{}.partial", name.to_string_lossy()));

    let result: io::Result<u64> = (|| {
        let mut reader = fs.open(from)?;
        let mut writer = fs.create(&partial)?;
        let n = io::copy(&mut reader, &mut writer)?;
        writer.flush()?;
        drop(writer);
        fs.rename(&partial, to)?;
        Ok(n)
    })();

    if result.is_err() && fs.metadata(&partial).is_ok() {
        let _ = fs.remove_file(&partial);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemFs;

    #[test]
    fn normalizes_trailing_separators() {
        assert_eq!(normalize_dir("/src/"), "/src");
        assert_eq!(normalize_dir("/src///"), "/src");
        assert_eq!(normalize_dir("/src"), "/src");
        assert_eq!(normalize_dir("/"), "/");
        assert_eq!(normalize_dir(""), "");
    }

    #[test]
    fn copy_leaves_no_partial_file() {
        let fs = MemFs::new();
        fs.write("/src/a.txt", "x");
        fs.mkdir_all("/dst");
        let n = copy_file(&fs, Path::new("/src/a.txt"), Path::new("/dst/a.txt")).unwrap();
        assert_eq!(n, 1);
        assert_eq!(fs.read("/dst/a.txt").unwrap(), b"x");
        assert!(!fs.exists("/dst/.a.txt.partial"));
    }

    #[test]
    fn failed_copy_cleans_up() {
        let fs = MemFs::new();
        fs.write("/src/a.txt", "x");
        fs.mkdir_all("/dst");
        fs.deny("/dst/a.txt");
        assert!(copy_file(&fs, Path::new("/src/a.txt"), Path::new("/dst/a.txt")).is_err());
        assert!(!fs.exists("/dst/.a.txt.partial"));
        assert!(!fs.exists("/dst/a.txt"));
    }
}
