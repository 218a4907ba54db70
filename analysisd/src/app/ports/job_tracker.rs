// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use async_trait::async_trait;

use crate::app::errors::AppResult;
use crate::app::types::{JobFilters, JobMetadata, JobStatus};

/// A job that still has a live scheduler mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveJob {
    pub job_id: String,
    pub scheduler_job_id: String,
    pub owner: Option<String>,
}

#[async_trait]
/// Durable job id mapping, ownership and metadata.
/// Unknown ids yield `NotFound`; every call after `close` yields `Unavailable`.
pub trait JobTrackerPort: Send + Sync {
    async fn store_job_mapping(&self, job_id: &str, scheduler_job_id: &str) -> AppResult<()>;
    async fn get_scheduler_job_id(&self, job_id: &str) -> AppResult<String>;
    async fn delete_job_mapping(&self, job_id: &str) -> AppResult<()>;

    async fn store_job_with_user(
        &self,
        job_id: &str,
        scheduler_job_id: &str,
        owner: &str,
    ) -> AppResult<()>;
    async fn get_job_owner(&self, job_id: &str) -> AppResult<Option<String>>;
    async fn get_scheduler_job_id_by_user(&self, job_id: &str, owner: &str)
    -> AppResult<String>;
    async fn delete_job_mapping_by_user(&self, job_id: &str, owner: &str) -> AppResult<()>;
    async fn list_jobs_by_user(&self, owner: &str) -> AppResult<Vec<String>>;

    async fn store_job_metadata(
        &self,
        job_id: &str,
        alignment_id: Option<&str>,
        tree_id: Option<&str>,
        method_type: &str,
        status: JobStatus,
    ) -> AppResult<()>;
    async fn update_job_status(&self, job_id: &str, status: JobStatus) -> AppResult<()>;
    async fn get_job_metadata(&self, job_id: &str) -> AppResult<JobMetadata>;
    async fn list_jobs_with_filters(&self, filters: &JobFilters) -> AppResult<Vec<JobMetadata>>;

    async fn list_active_jobs(&self) -> AppResult<Vec<ActiveJob>>;
    async fn close(&self);
}
