//! Durable catalog of file fingerprints, sync pairs and sync job history.

use crate::error::CatalogError;
use crate::models::{FileRecord, JobStatus, SyncJob, SyncPair};
use sqlx::SqlitePool;
use storage::models::{FileRow, SyncJobRow, SyncPairRow};

pub type CatalogResult<T> = Result<T, CatalogError>;

/// Attempts for `get_or_create_pair` when a concurrent insert wins the race.
const PAIR_RETRIES: usize = 3;

#[async_trait::async_trait]
pub trait Catalog: Send + Sync {
    async fn find_pair(&self, source_dir: &str, dest_dir: &str) -> CatalogResult<Option<SyncPair>>;

    /// Fails with [`CatalogError::Duplicate`] when the pair already exists.
    async fn create_pair(&self, source_dir: &str, dest_dir: &str) -> CatalogResult<i64>;

    async fn get_or_create_pair(&self, source_dir: &str, dest_dir: &str)
        -> CatalogResult<SyncPair>;

    async fn list_pairs(&self) -> CatalogResult<Vec<SyncPair>>;

    /// New job in the `running` state.
    async fn create_job(&self, pair_id: i64) -> CatalogResult<i64>;

    /// Moves a running job to `completed` or `failed` and stamps its end time.
    async fn set_job_status(&self, job_id: i64, status: JobStatus) -> CatalogResult<()>;

    async fn find_job(&self, job_id: i64) -> CatalogResult<Option<SyncJob>>;

    async fn jobs_for_pair(&self, pair_id: i64) -> CatalogResult<Vec<SyncJob>>;

    async fn find_file_by_path(&self, path: &str) -> CatalogResult<Option<FileRecord>>;

    async fn create_file_record(&self, path: &str, hash: &str, size: u64) -> CatalogResult<i64>;

    /// Inserts the record, or refreshes hash and size of the existing one.
    async fn upsert_file_record(&self, path: &str, hash: &str, size: u64) -> CatalogResult<i64>;

    async fn link_synced_file(&self, job_id: i64, file_id: i64) -> CatalogResult<()>;

    async fn synced_files(&self, job_id: i64) -> CatalogResult<Vec<FileRecord>>;
}

#[derive(Clone)]
pub struct SqliteCatalog {
    pool: SqlitePool,
}

impl SqliteCatalog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl From<SyncPairRow> for SyncPair {
    fn from(row: SyncPairRow) -> Self {
        SyncPair {
            id: row.id,
            source_dir: row.source_dir,
            dest_dir: row.dest_dir,
            created_at: row.created_at,
        }
    }
}

impl From<FileRow> for FileRecord {
    fn from(row: FileRow) -> Self {
        FileRecord {
            id: row.id,
            path: row.path,
            hash: row.hash,
            size: row.size.max(0) as u64,
            created_at: row.created_at,
            modified_at: row.modified_at,
        }
    }
}

impl TryFrom<SyncJobRow> for SyncJob {
    type Error = CatalogError;

    fn try_from(row: SyncJobRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<JobStatus>()
            .map_err(CatalogError::UnknownStatus)?;
        Ok(SyncJob {
            id: row.id,
            pair_id: row.sync_pair_id,
            status,
            started_at: row.started_at,
            completed_at: row.completed_at,
        })
    }
}

#[async_trait::async_trait]
impl Catalog for SqliteCatalog {
    async fn find_pair(&self, source_dir: &str, dest_dir: &str) -> CatalogResult<Option<SyncPair>> {
        let row = sqlx::query_as::<_, SyncPairRow>(
            "SELECT id, source_dir, dest_dir, created_at FROM sync_pairs WHERE source_dir = ?1 AND dest_dir = ?2",
        )
        .bind(source_dir)
        .bind(dest_dir)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(SyncPair::from))
    }

    async fn create_pair(&self, source_dir: &str, dest_dir: &str) -> CatalogResult<i64> {
        let res = sqlx::query("INSERT INTO sync_pairs (source_dir, dest_dir) VALUES (?1, ?2)")
            .bind(source_dir)
            .bind(dest_dir)
            .execute(&self.pool)
            .await
            .map_err(|e| CatalogError::from_insert(e, format!("{source_dir} -> {dest_dir}")))?;
        Ok(res.last_insert_rowid())
    }

    async fn get_or_create_pair(
        &self,
        source_dir: &str,
        dest_dir: &str,
    ) -> CatalogResult<SyncPair> {
        for _ in 0..PAIR_RETRIES {
            if let Some(pair) = self.find_pair(source_dir, dest_dir).await? {
                return Ok(pair);
            }
            match self.create_pair(source_dir, dest_dir).await {
                Ok(id) => {
                    tracing::info!(pair_id = id, source_dir, dest_dir, "created sync pair");
                    if let Some(pair) = self.find_pair(source_dir, dest_dir).await? {
                        return Ok(pair);
                    }
                }
                // Lost the race to another request; the row exists now.
                Err(CatalogError::Duplicate(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        self.find_pair(source_dir, dest_dir)
            .await?
            .ok_or_else(|| CatalogError::Database(sqlx::Error::RowNotFound))
    }

    async fn list_pairs(&self) -> CatalogResult<Vec<SyncPair>> {
        let rows = sqlx::query_as::<_, SyncPairRow>(
            "SELECT id, source_dir, dest_dir, created_at FROM sync_pairs ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(SyncPair::from).collect())
    }

    async fn create_job(&self, pair_id: i64) -> CatalogResult<i64> {
        let res = sqlx::query("INSERT INTO sync_jobs (sync_pair_id, status) VALUES (?1, ?2)")
            .bind(pair_id)
            .bind(JobStatus::Running.as_str())
            .execute(&self.pool)
            .await?;
        Ok(res.last_insert_rowid())
    }

    async fn set_job_status(&self, job_id: i64, status: JobStatus) -> CatalogResult<()> {
        if !JobStatus::Running.can_transition_to(status) {
            return Err(CatalogError::InvalidTransition {
                job_id,
                from: JobStatus::Running,
                to: status,
            });
        }
        let res = sqlx::query(
            r#"
            UPDATE sync_jobs
            SET status = ?2, completed_at = strftime('%s','now')
            WHERE id = ?1 AND status = 'running'
            "#,
        )
        .bind(job_id)
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;
        if res.rows_affected() == 1 {
            return Ok(());
        }
        match self.find_job(job_id).await? {
            Some(job) => Err(CatalogError::InvalidTransition {
                job_id,
                from: job.status,
                to: status,
            }),
            None => Err(CatalogError::JobNotFound(job_id)),
        }
    }

    async fn find_job(&self, job_id: i64) -> CatalogResult<Option<SyncJob>> {
        let row = sqlx::query_as::<_, SyncJobRow>(
            "SELECT id, sync_pair_id, status, started_at, completed_at FROM sync_jobs WHERE id = ?1",
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(SyncJob::try_from).transpose()
    }

    async fn jobs_for_pair(&self, pair_id: i64) -> CatalogResult<Vec<SyncJob>> {
        let rows = sqlx::query_as::<_, SyncJobRow>(
            "SELECT id, sync_pair_id, status, started_at, completed_at FROM sync_jobs WHERE sync_pair_id = ?1 ORDER BY id",
        )
        .bind(pair_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(SyncJob::try_from).collect()
    }

    async fn find_file_by_path(&self, path: &str) -> CatalogResult<Option<FileRecord>> {
        let row = sqlx::query_as::<_, FileRow>(
            "SELECT id, path, hash, size, created_at, modified_at FROM files WHERE path = ?1",
        )
        .bind(path)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(FileRecord::from))
    }

    async fn create_file_record(&self, path: &str, hash: &str, size: u64) -> CatalogResult<i64> {
        let res = sqlx::query("INSERT INTO files (path, hash, size) VALUES (?1, ?2, ?3)")
            .bind(path)
            .bind(hash)
            .bind(size as i64)
            .execute(&self.pool)
            .await
            .map_err(|e| CatalogError::from_insert(e, path))?;
        Ok(res.last_insert_rowid())
    }

    async fn upsert_file_record(&self, path: &str, hash: &str, size: u64) -> CatalogResult<i64> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO files (path, hash, size)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(path) DO UPDATE SET
                hash = excluded.hash,
                size = excluded.size,
                modified_at = strftime('%s','now')
            RETURNING id
            "#,
        )
        .bind(path)
        .bind(hash)
        .bind(size as i64)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn link_synced_file(&self, job_id: i64, file_id: i64) -> CatalogResult<()> {
        sqlx::query("INSERT INTO synced_files (sync_job_id, file_id) VALUES (?1, ?2)")
            .bind(job_id)
            .bind(file_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn synced_files(&self, job_id: i64) -> CatalogResult<Vec<FileRecord>> {
        let rows = sqlx::query_as::<_, FileRow>(
            r#"
            SELECT f.id, f.path, f.hash, f.size, f.created_at, f.modified_at
            FROM synced_files sf
            JOIN files f ON f.id = sf.file_id
            WHERE sf.sync_job_id = ?1
            ORDER BY sf.id
            "#,
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(FileRecord::from).collect())
    }
}
