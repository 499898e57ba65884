use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct FileRow {
    pub id: i64,
    pub path: String,
    pub hash: String,
    pub size: i64,
    pub created_at: i64,
    pub modified_at: i64,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SyncPairRow {
    pub id: i64,
    pub source_dir: String,
    pub dest_dir: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SyncJobRow {
    pub id: i64,
    pub sync_pair_id: i64,
    pub status: String,
    pub started_at: i64,
    pub completed_at: Option<i64>,
}
