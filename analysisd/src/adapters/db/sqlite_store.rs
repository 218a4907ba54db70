// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::sync::Arc;

use async_trait::async_trait;

use crate::adapters::db::{JobStore, JobStoreError};
use crate::app::errors::{AppError, AppErrorKind, AppResult, codes};
use crate::app::ports::{ActiveJob, JobTrackerPort};
use crate::app::types::{JobFilters, JobMetadata, JobStatus};

#[derive(Clone)]
pub struct SqliteJobTracker {
    store: Arc<JobStore>,
}

impl SqliteJobTracker {
    pub fn new(store: JobStore) -> Self {
        Self {
            store: Arc::new(store),
        }
    }
}

/// Persistence errors stop here; the core only sees `AppError`.
fn map_store_error(err: JobStoreError) -> AppError {
    match err {
        JobStoreError::EmptyJobId | JobStoreError::EmptyOwner => AppError::with_message(
            AppErrorKind::InvalidArgument,
            codes::INVALID_ARGUMENT,
            err.to_string(),
        ),
        JobStoreError::NotFound(_) | JobStoreError::NoMapping(_) => {
            AppError::not_found(err.to_string())
        }
        JobStoreError::OwnerMismatch(_) => AppError::conflict(err.to_string()),
        JobStoreError::Closed => AppError::with_message(
            AppErrorKind::Unavailable,
            codes::STORE_CLOSED,
            "job tracker is closed",
        ),
        JobStoreError::InvalidStatus { .. } | JobStoreError::Sqlx(_) => {
            AppError::internal(err.to_string())
        }
    }
}

#[async_trait]
impl JobTrackerPort for SqliteJobTracker {
    #[tracing::instrument(name = "tracker", level = "debug", skip(self), fields(op = "store_job_mapping"))]
    async fn store_job_mapping(&self, job_id: &str, scheduler_job_id: &str) -> AppResult<()> {
        self.store
            .store_job_mapping(job_id, scheduler_job_id)
            .await
            .map_err(map_store_error)
    }

    async fn get_scheduler_job_id(&self, job_id: &str) -> AppResult<String> {
        self.store
            .get_scheduler_job_id(job_id)
            .await
            .map_err(map_store_error)
    }

    #[tracing::instrument(name = "tracker", level = "debug", skip(self), fields(op = "delete_job_mapping"))]
    async fn delete_job_mapping(&self, job_id: &str) -> AppResult<()> {
        self.store
            .delete_job_mapping(job_id)
            .await
            .map_err(map_store_error)
    }

    #[tracing::instrument(name = "tracker", level = "debug", skip(self), fields(op = "store_job_with_user"))]
    async fn store_job_with_user(
        &self,
        job_id: &str,
        scheduler_job_id: &str,
        owner: &str,
    ) -> AppResult<()> {
        self.store
            .store_job_with_user(job_id, scheduler_job_id, owner)
            .await
            .map_err(map_store_error)
    }

    async fn get_job_owner(&self, job_id: &str) -> AppResult<Option<String>> {
        self.store
            .get_job_owner(job_id)
            .await
            .map_err(map_store_error)
    }

    async fn get_scheduler_job_id_by_user(
        &self,
        job_id: &str,
        owner: &str,
    ) -> AppResult<String> {
        self.store
            .get_scheduler_job_id_by_user(job_id, owner)
            .await
            .map_err(map_store_error)
    }

    #[tracing::instrument(name = "tracker", level = "debug", skip(self), fields(op = "delete_job_mapping_by_user"))]
    async fn delete_job_mapping_by_user(&self, job_id: &str, owner: &str) -> AppResult<()> {
        self.store
            .delete_job_mapping_by_user(job_id, owner)
            .await
            .map_err(map_store_error)
    }

    async fn list_jobs_by_user(&self, owner: &str) -> AppResult<Vec<String>> {
        self.store
            .list_jobs_by_user(owner)
            .await
            .map_err(map_store_error)
    }

    #[tracing::instrument(name = "tracker", level = "debug", skip(self), fields(op = "store_job_metadata"))]
    async fn store_job_metadata(
        &self,
        job_id: &str,
        alignment_id: Option<&str>,
        tree_id: Option<&str>,
        method_type: &str,
        status: JobStatus,
    ) -> AppResult<()> {
        self.store
            .store_job_metadata(job_id, alignment_id, tree_id, method_type, status)
            .await
            .map_err(map_store_error)
    }

    #[tracing::instrument(name = "tracker", level = "debug", skip(self), fields(op = "update_job_status"))]
    async fn update_job_status(&self, job_id: &str, status: JobStatus) -> AppResult<()> {
        self.store
            .update_job_status(job_id, status)
            .await
            .map_err(map_store_error)
    }

    async fn get_job_metadata(&self, job_id: &str) -> AppResult<JobMetadata> {
        self.store
            .get_job_metadata(job_id)
            .await
            .map_err(map_store_error)
    }

    async fn list_jobs_with_filters(&self, filters: &JobFilters) -> AppResult<Vec<JobMetadata>> {
        self.store
            .list_jobs_with_filters(filters)
            .await
            .map_err(map_store_error)
    }

    async fn list_active_jobs(&self) -> AppResult<Vec<ActiveJob>> {
        self.store.list_active_jobs().await.map_err(map_store_error)
    }

    async fn close(&self) {
        self.store.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn errors_surface_as_app_errors() {
        let tracker = SqliteJobTracker::new(JobStore::open_memory().await.unwrap());
        let err = tracker.get_scheduler_job_id("missing").await.unwrap_err();
        assert_eq!(err.kind(), AppErrorKind::NotFound);
        assert_eq!(err.code(), codes::NOT_FOUND);

        let err = tracker.store_job_mapping("", "1").await.unwrap_err();
        assert_eq!(err.kind(), AppErrorKind::InvalidArgument);

        tracker.store_job_with_user("owned", "1", "alice").await.unwrap();
        let err = tracker
            .store_job_with_user("owned", "2", "bob")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), AppErrorKind::Conflict);
        assert_eq!(err.code(), codes::CONFLICT);

        tracker.close().await;
        let err = tracker.list_active_jobs().await.unwrap_err();
        assert_eq!(err.kind(), AppErrorKind::Unavailable);
        assert_eq!(err.code(), codes::STORE_CLOSED);
    }

    #[tokio::test]
    async fn owner_mismatch_is_not_found() {
        let tracker = SqliteJobTracker::new(JobStore::open_memory().await.unwrap());
        tracker.store_job_with_user("j", "7", "alice").await.unwrap();
        let err = tracker
            .get_scheduler_job_id_by_user("j", "mallory")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), AppErrorKind::NotFound);
        assert_eq!(
            tracker.get_job_owner("j").await.unwrap().as_deref(),
            Some("alice")
        );
    }
}
