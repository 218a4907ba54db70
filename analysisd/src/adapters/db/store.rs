// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use sqlx::{
    QueryBuilder, Row, Sqlite, SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
};
use std::{path::Path, str::FromStr, time::Duration};
use thiserror::Error;
use time::OffsetDateTime;

use crate::adapters::time::rfc3339;
use crate::app::ports::ActiveJob;
use crate::app::types::{JobFilters, JobMetadata, JobStatus};

#[derive(Debug, Error)]
pub enum JobStoreError {
    #[error("sqlx error: {0}")]
    Sqlx(sqlx::Error),
    #[error("job not found: {0}")]
    NotFound(String),
    #[error("job {0} has no scheduler mapping")]
    NoMapping(String),
    #[error("job store is closed")]
    Closed,
    #[error("empty job id")]
    EmptyJobId,
    #[error("empty owner")]
    EmptyOwner,
    #[error("job {0} is owned by another user")]
    OwnerMismatch(String),
    #[error("job {job_id} has unreadable status '{status}'")]
    InvalidStatus { job_id: String, status: String },
}

impl From<sqlx::Error> for JobStoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolClosed => JobStoreError::Closed,
            other => JobStoreError::Sqlx(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, JobStoreError>;

const METADATA_COLUMNS: &str =
    "job_id, owner, alignment_id, tree_id, method_type, status, created_at, updated_at";

/// SQLite-backed job tracker. Mapping, owner and metadata share one row keyed
/// by the internal job id, so every write touches exactly one row.
#[derive(Clone)]
pub struct JobStore {
    pool: SqlitePool,
}

impl JobStore {
    /// Open (or create) a file-backed SQLite DB.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let url = format!("sqlite://{}", path_ref.to_string_lossy());
        let opts = SqliteConnectOptions::from_str(&url)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(opts)
            .await?;
        let store = Self { pool };
        store.bootstrap().await?;
        Ok(store)
    }

    /// Open an in-memory store (handy for tests).
    pub async fn open_memory() -> Result<Self> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;
        let store = Self { pool };
        store.bootstrap().await?;
        Ok(store)
    }

    async fn bootstrap(&self) -> Result<()> {
        let _ = sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
              job_id TEXT PRIMARY KEY,
              scheduler_job_id TEXT,            -- NULL once the mapping is deleted
              owner TEXT,
              alignment_id TEXT,
              tree_id TEXT,
              method_type TEXT,
              status TEXT,                      -- last observed, not authoritative
              created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
              updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now'))
            );
            CREATE INDEX IF NOT EXISTS idx_jobs_owner ON jobs(owner);
            CREATE INDEX IF NOT EXISTS idx_jobs_scheduler_job_id ON jobs(scheduler_job_id);
            CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.pool.is_closed() {
            return Err(JobStoreError::Closed);
        }
        Ok(())
    }

    pub async fn store_job_mapping(&self, job_id: &str, scheduler_job_id: &str) -> Result<()> {
        self.ensure_open()?;
        require_job_id(job_id)?;
        let now = now_rfc3339();
        sqlx::query(
            r#"
            insert into jobs (job_id, scheduler_job_id, created_at, updated_at)
            values (?1, ?2, ?3, ?3)
            on conflict(job_id) do update set
              scheduler_job_id = excluded.scheduler_job_id,
              updated_at = excluded.updated_at
            "#,
        )
        .bind(job_id)
        .bind(scheduler_job_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn store_job_with_user(
        &self,
        job_id: &str,
        scheduler_job_id: &str,
        owner: &str,
    ) -> Result<()> {
        self.ensure_open()?;
        require_job_id(job_id)?;
        require_owner(owner)?;
        let now = now_rfc3339();
        // an owned row only accepts its own owner; an unowned row is claimed
        let result = sqlx::query(
            r#"
            insert into jobs (job_id, scheduler_job_id, owner, created_at, updated_at)
            values (?1, ?2, ?3, ?4, ?4)
            on conflict(job_id) do update set
              scheduler_job_id = excluded.scheduler_job_id,
              owner = excluded.owner,
              updated_at = excluded.updated_at
            where coalesce(jobs.owner, '') in ('', excluded.owner)
            "#,
        )
        .bind(job_id)
        .bind(scheduler_job_id)
        .bind(owner)
        .bind(now)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(JobStoreError::OwnerMismatch(job_id.to_string()));
        }
        Ok(())
    }

    pub async fn get_scheduler_job_id(&self, job_id: &str) -> Result<String> {
        self.ensure_open()?;
        let row = sqlx::query("select scheduler_job_id from jobs where job_id = ?1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| JobStoreError::NotFound(job_id.to_string()))?;
        mapping_from_row(job_id, &row)
    }

    /// Clears the scheduler mapping. The row and its metadata stay.
    pub async fn delete_job_mapping(&self, job_id: &str) -> Result<()> {
        self.ensure_open()?;
        let result = sqlx::query(
            r#"
            update jobs
            set scheduler_job_id = NULL,
                updated_at = ?1
            where job_id = ?2
            "#,
        )
        .bind(now_rfc3339())
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(JobStoreError::NotFound(job_id.to_string()));
        }
        Ok(())
    }

    pub async fn get_job_owner(&self, job_id: &str) -> Result<Option<String>> {
        self.ensure_open()?;
        let row = sqlx::query("select owner from jobs where job_id = ?1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| JobStoreError::NotFound(job_id.to_string()))?;
        let owner: Option<String> = row.try_get("owner")?;
        Ok(owner.filter(|o| !o.is_empty()))
    }

    /// Resolves the mapping only when `owner` owns the job. A job owned by
    /// someone else is reported exactly like a missing one.
    pub async fn get_scheduler_job_id_by_user(&self, job_id: &str, owner: &str) -> Result<String> {
        self.ensure_open()?;
        require_owner(owner)?;
        let row =
            sqlx::query("select scheduler_job_id from jobs where job_id = ?1 and owner = ?2")
                .bind(job_id)
                .bind(owner)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| JobStoreError::NotFound(job_id.to_string()))?;
        mapping_from_row(job_id, &row)
    }

    pub async fn delete_job_mapping_by_user(&self, job_id: &str, owner: &str) -> Result<()> {
        self.ensure_open()?;
        require_owner(owner)?;
        let result = sqlx::query(
            r#"
            update jobs
            set scheduler_job_id = NULL,
                updated_at = ?1
            where job_id = ?2 and owner = ?3
            "#,
        )
        .bind(now_rfc3339())
        .bind(job_id)
        .bind(owner)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(JobStoreError::NotFound(job_id.to_string()));
        }
        Ok(())
    }

    pub async fn list_jobs_by_user(&self, owner: &str) -> Result<Vec<String>> {
        self.ensure_open()?;
        require_owner(owner)?;
        let rows = sqlx::query(
            r#"
            select job_id from jobs
            where owner = ?1
            order by created_at, job_id
            "#,
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|row| -> Result<String> { Ok(row.try_get("job_id")?) })
            .collect()
    }

    pub async fn store_job_metadata(
        &self,
        job_id: &str,
        alignment_id: Option<&str>,
        tree_id: Option<&str>,
        method_type: &str,
        status: JobStatus,
    ) -> Result<()> {
        self.ensure_open()?;
        require_job_id(job_id)?;
        let now = now_rfc3339();
        sqlx::query(
            r#"
            insert into jobs (job_id, alignment_id, tree_id, method_type, status, created_at, updated_at)
            values (?1, ?2, ?3, ?4, ?5, ?6, ?6)
            on conflict(job_id) do update set
              alignment_id = excluded.alignment_id,
              tree_id = excluded.tree_id,
              method_type = excluded.method_type,
              status = excluded.status,
              updated_at = excluded.updated_at
            "#,
        )
        .bind(job_id)
        .bind(alignment_id)
        .bind(tree_id)
        .bind(method_type)
        .bind(status.as_str())
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn update_job_status(&self, job_id: &str, status: JobStatus) -> Result<()> {
        self.ensure_open()?;
        let result = sqlx::query(
            r#"
            update jobs
            set status = ?1,
                updated_at = ?2
            where job_id = ?3
            "#,
        )
        .bind(status.as_str())
        .bind(now_rfc3339())
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(JobStoreError::NotFound(job_id.to_string()));
        }
        Ok(())
    }

    pub async fn get_job_metadata(&self, job_id: &str) -> Result<JobMetadata> {
        self.ensure_open()?;
        let sql = format!("select {METADATA_COLUMNS} from jobs where job_id = ?1");
        let row = sqlx::query(&sql)
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| JobStoreError::NotFound(job_id.to_string()))?;
        row_to_metadata(row)
    }

    pub async fn list_jobs_with_filters(&self, filters: &JobFilters) -> Result<Vec<JobMetadata>> {
        self.ensure_open()?;
        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("select {METADATA_COLUMNS} from jobs where 1 = 1"));
        if let Some(owner) = &filters.owner {
            query.push(" and owner = ").push_bind(owner.clone());
        }
        if let Some(alignment_id) = &filters.alignment_id {
            query.push(" and alignment_id = ").push_bind(alignment_id.clone());
        }
        if let Some(tree_id) = &filters.tree_id {
            query.push(" and tree_id = ").push_bind(tree_id.clone());
        }
        if let Some(method_type) = &filters.method_type {
            query.push(" and method_type = ").push_bind(method_type.clone());
        }
        if let Some(status) = filters.status {
            query.push(" and status = ").push_bind(status.as_str());
        }
        query.push(" order by created_at, job_id");

        let rows = query.build().fetch_all(&self.pool).await?;
        rows.into_iter().map(row_to_metadata).collect()
    }

    pub async fn list_active_jobs(&self) -> Result<Vec<ActiveJob>> {
        self.ensure_open()?;
        let rows = sqlx::query(
            r#"
            select job_id, scheduler_job_id, owner from jobs
            where scheduler_job_id is not null
            order by created_at, job_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|row| -> Result<ActiveJob> {
                Ok(ActiveJob {
                    job_id: row.try_get("job_id")?,
                    scheduler_job_id: row.try_get("scheduler_job_id")?,
                    owner: row
                        .try_get::<Option<String>, _>("owner")?
                        .filter(|o| !o.is_empty()),
                })
            })
            .collect()
    }
}

fn require_job_id(job_id: &str) -> Result<()> {
    if job_id.trim().is_empty() {
        return Err(JobStoreError::EmptyJobId);
    }
    Ok(())
}

fn require_owner(owner: &str) -> Result<()> {
    if owner.trim().is_empty() {
        return Err(JobStoreError::EmptyOwner);
    }
    Ok(())
}

fn mapping_from_row(job_id: &str, row: &SqliteRow) -> Result<String> {
    let mapping: Option<String> = row.try_get("scheduler_job_id")?;
    mapping
        .filter(|m| !m.is_empty())
        .ok_or_else(|| JobStoreError::NoMapping(job_id.to_string()))
}

fn now_rfc3339() -> String {
    rfc3339(OffsetDateTime::now_utc())
}

fn row_to_metadata(row: SqliteRow) -> Result<JobMetadata> {
    let job_id: String = row.try_get("job_id")?;
    let raw_status: Option<String> = row.try_get("status")?;
    let status = match raw_status.as_deref() {
        None | Some("") => JobStatus::Pending,
        Some(raw) => raw
            .parse::<JobStatus>()
            .map_err(|_| JobStoreError::InvalidStatus {
                job_id: job_id.clone(),
                status: raw.to_string(),
            })?,
    };
    Ok(JobMetadata {
        owner: row
            .try_get::<Option<String>, _>("owner")?
            .filter(|o| !o.is_empty()),
        alignment_id: row.try_get("alignment_id")?,
        tree_id: row.try_get("tree_id")?,
        method_type: row
            .try_get::<Option<String>, _>("method_type")?
            .unwrap_or_default(),
        status,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        job_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn seeded() -> JobStore {
        let db = JobStore::open_memory().await.unwrap();
        db.store_job_with_user("job-a", "100", "alice").await.unwrap();
        db.store_job_metadata("job-a", Some("aln-1"), None, "fel", JobStatus::Pending)
            .await
            .unwrap();
        db.store_job_with_user("job-b", "101", "bob").await.unwrap();
        db.store_job_metadata("job-b", Some("aln-1"), Some("tree-1"), "busted", JobStatus::Running)
            .await
            .unwrap();
        db.store_job_mapping("job-c", "102").await.unwrap();
        db.store_job_metadata("job-c", Some("aln-2"), None, "fel", JobStatus::Complete)
            .await
            .unwrap();
        db
    }

    #[tokio::test]
    async fn owned_row_keeps_its_owner() {
        let db = seeded().await;
        let err = db.store_job_with_user("job-a", "200", "bob").await.unwrap_err();
        assert!(matches!(err, JobStoreError::OwnerMismatch(ref id) if id == "job-a"));
        assert_eq!(db.get_job_owner("job-a").await.unwrap().as_deref(), Some("alice"));
        assert_eq!(db.get_scheduler_job_id("job-a").await.unwrap(), "100");

        // same owner may remap, an unowned row may be claimed
        db.store_job_with_user("job-a", "300", "alice").await.unwrap();
        assert_eq!(db.get_scheduler_job_id("job-a").await.unwrap(), "300");
        db.store_job_with_user("job-c", "301", "carol").await.unwrap();
        assert_eq!(db.get_job_owner("job-c").await.unwrap().as_deref(), Some("carol"));
    }

    #[tokio::test]
    async fn mapping_round_trip() {
        let db = JobStore::open_memory().await.unwrap();
        db.store_job_mapping("job-1", "123456").await.unwrap();
        assert_eq!(db.get_scheduler_job_id("job-1").await.unwrap(), "123456");

        // remapping replaces the scheduler id on the same row
        db.store_job_mapping("job-1", "123457").await.unwrap();
        assert_eq!(db.get_scheduler_job_id("job-1").await.unwrap(), "123457");
        assert!(db.get_job_owner("job-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unknown_job_is_not_found() {
        let db = JobStore::open_memory().await.unwrap();
        assert!(matches!(
            db.get_scheduler_job_id("nope").await,
            Err(JobStoreError::NotFound(_))
        ));
        assert!(matches!(
            db.delete_job_mapping("nope").await,
            Err(JobStoreError::NotFound(_))
        ));
        assert!(matches!(
            db.update_job_status("nope", JobStatus::Running).await,
            Err(JobStoreError::NotFound(_))
        ));
        assert!(matches!(
            db.get_job_metadata("nope").await,
            Err(JobStoreError::NotFound(_))
        ));
        assert!(matches!(
            db.get_job_owner("nope").await,
            Err(JobStoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn deleting_mapping_keeps_metadata() {
        let db = seeded().await;
        db.delete_job_mapping("job-a").await.unwrap();
        assert!(matches!(
            db.get_scheduler_job_id("job-a").await,
            Err(JobStoreError::NoMapping(_))
        ));
        let meta = db.get_job_metadata("job-a").await.unwrap();
        assert_eq!(meta.method_type, "fel");
        assert_eq!(meta.owner.as_deref(), Some("alice"));
        assert_eq!(meta.alignment_id.as_deref(), Some("aln-1"));
    }

    #[tokio::test]
    async fn tenant_isolation() {
        let db = seeded().await;
        assert_eq!(db.list_jobs_by_user("alice").await.unwrap(), vec!["job-a"]);
        assert_eq!(db.list_jobs_by_user("bob").await.unwrap(), vec!["job-b"]);
        assert_eq!(
            db.get_scheduler_job_id_by_user("job-a", "alice").await.unwrap(),
            "100"
        );
        assert!(matches!(
            db.get_scheduler_job_id_by_user("job-a", "bob").await,
            Err(JobStoreError::NotFound(_))
        ));
        assert!(matches!(
            db.delete_job_mapping_by_user("job-a", "bob").await,
            Err(JobStoreError::NotFound(_))
        ));
        // alice's mapping survived bob's attempt
        assert_eq!(db.get_scheduler_job_id("job-a").await.unwrap(), "100");
        db.delete_job_mapping_by_user("job-a", "alice").await.unwrap();
        assert!(db.get_scheduler_job_id("job-a").await.is_err());
    }

    #[tokio::test]
    async fn empty_identifiers_are_rejected() {
        let db = JobStore::open_memory().await.unwrap();
        assert!(matches!(
            db.store_job_mapping("", "1").await,
            Err(JobStoreError::EmptyJobId)
        ));
        assert!(matches!(
            db.store_job_with_user("job", "1", " ").await,
            Err(JobStoreError::EmptyOwner)
        ));
        assert!(matches!(
            db.list_jobs_by_user("").await,
            Err(JobStoreError::EmptyOwner)
        ));
    }

    #[tokio::test]
    async fn metadata_upsert_does_not_clobber_mapping() {
        let db = seeded().await;
        db.store_job_metadata("job-b", Some("aln-1"), Some("tree-1"), "busted", JobStatus::Pending)
            .await
            .unwrap();
        assert_eq!(db.get_scheduler_job_id("job-b").await.unwrap(), "101");
        assert_eq!(db.get_job_owner("job-b").await.unwrap().as_deref(), Some("bob"));

        db.update_job_status("job-b", JobStatus::Complete).await.unwrap();
        let meta = db.get_job_metadata("job-b").await.unwrap();
        assert_eq!(meta.status, JobStatus::Complete);
        assert_eq!(meta.tree_id.as_deref(), Some("tree-1"));
    }

    #[tokio::test]
    async fn filters_combine() {
        let db = seeded().await;
        let all = db.list_jobs_with_filters(&JobFilters::default()).await.unwrap();
        assert_eq!(all.len(), 3);

        let fel = db
            .list_jobs_with_filters(&JobFilters::default().method("fel"))
            .await
            .unwrap();
        let ids: Vec<_> = fel.iter().map(|m| m.job_id.as_str()).collect();
        assert_eq!(ids, vec!["job-a", "job-c"]);

        let complete_fel = db
            .list_jobs_with_filters(
                &JobFilters::default()
                    .method("fel")
                    .status(JobStatus::Complete),
            )
            .await
            .unwrap();
        assert_eq!(complete_fel.len(), 1);
        assert_eq!(complete_fel[0].job_id, "job-c");

        let bob_on_aln = db
            .list_jobs_with_filters(&JobFilters::default().owner("bob").alignment("aln-1"))
            .await
            .unwrap();
        assert_eq!(bob_on_aln.len(), 1);
        assert_eq!(bob_on_aln[0].job_id, "job-b");

        let by_tree = db
            .list_jobs_with_filters(&JobFilters::default().tree("tree-1"))
            .await
            .unwrap();
        assert_eq!(by_tree.len(), 1);

        let none = db
            .list_jobs_with_filters(&JobFilters::default().owner("carol"))
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn active_jobs_are_those_with_a_mapping() {
        let db = seeded().await;
        db.delete_job_mapping("job-b").await.unwrap();
        let active = db.list_active_jobs().await.unwrap();
        let ids: Vec<_> = active.iter().map(|j| j.job_id.as_str()).collect();
        assert_eq!(ids, vec!["job-a", "job-c"]);
        assert_eq!(active[0].owner.as_deref(), Some("alice"));
        assert_eq!(active[1].owner, None);
        assert_eq!(active[1].scheduler_job_id, "102");
    }

    #[tokio::test]
    async fn operations_after_close_fail_with_closed() {
        let db = seeded().await;
        db.close().await;
        assert!(db.is_closed());
        assert!(matches!(
            db.get_scheduler_job_id("job-a").await,
            Err(JobStoreError::Closed)
        ));
        assert!(matches!(
            db.store_job_mapping("job-x", "1").await,
            Err(JobStoreError::Closed)
        ));
        assert!(matches!(
            db.list_jobs_with_filters(&JobFilters::default()).await,
            Err(JobStoreError::Closed)
        ));
    }

    #[tokio::test]
    async fn file_store_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("jobs.sqlite");
        {
            let db = JobStore::open(&path).await.unwrap();
            db.store_job_with_user("job-1", "55", "alice").await.unwrap();
            db.store_job_metadata("job-1", Some("aln"), None, "meme", JobStatus::Running)
                .await
                .unwrap();
            db.close().await;
        }
        let db = JobStore::open(&path).await.unwrap();
        assert_eq!(db.get_scheduler_job_id("job-1").await.unwrap(), "55");
        let meta = db.get_job_metadata("job-1").await.unwrap();
        assert_eq!(meta.method_type, "meme");
        assert_eq!(meta.status, JobStatus::Running);
    }
}
