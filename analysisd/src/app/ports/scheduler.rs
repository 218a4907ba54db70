// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use async_trait::async_trait;

use crate::app::errors::{AppError, AppResult};
use crate::app::job::JobAccess;
use crate::app::types::JobStatus;

/// Outcome of a backend health probe. `detail` describes the failed check
/// even when `error` is absent.
#[derive(Debug, Clone)]
pub struct HealthReport {
    pub healthy: bool,
    pub detail: String,
    pub error: Option<AppError>,
}

impl HealthReport {
    pub fn healthy(detail: impl Into<String>) -> Self {
        Self {
            healthy: true,
            detail: detail.into(),
            error: None,
        }
    }

    pub fn unhealthy(detail: impl Into<String>, error: Option<AppError>) -> Self {
        Self {
            healthy: false,
            detail: detail.into(),
            error,
        }
    }
}

#[async_trait]
/// Batch scheduler boundary. Implementations own the mapping lifecycle in
/// the job tracker: `submit` writes it, terminal `get_status` and `cancel`
/// remove it.
pub trait SchedulerPort: Send + Sync {
    async fn submit(&self, job: &dyn JobAccess) -> AppResult<()>;
    async fn cancel(&self, job: &dyn JobAccess) -> AppResult<()>;
    async fn get_status(&self, job: &dyn JobAccess) -> AppResult<JobStatus>;
    async fn check_health(&self) -> HealthReport;
}
