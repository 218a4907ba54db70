// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::app::errors::{AppError, AppErrorKind, AppResult};
use crate::app::job::{AnalysisJob, Job};
use crate::app::ports::{
    ClockPort, ComputeMethod, DatasetStorePort, HealthReport, JobTrackerPort, LocalFilesystemPort,
    MethodProviderPort, SchedulerPort,
};
use crate::app::services::request::{AdaptRequest, AnalysisRequest};
use crate::app::types::{JobFilters, JobMetadata, JobStatus, MethodType};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StartedAnalysis {
    pub job_id: String,
    pub status: JobStatus,
}

/// What `get_analysis` found. "Not finished yet" and "finished badly" are
/// separate variants; errors are reserved for "could not tell".
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AnalysisOutcome {
    Complete {
        job_id: String,
        results: Value,
    },
    InProgress {
        job_id: String,
        status: JobStatus,
    },
    Failed {
        job_id: String,
        status: JobStatus,
        reason: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileSummary {
    pub checked: usize,
    pub changed: usize,
    pub errors: usize,
}

/// Orchestration facade. Tracked-job operations need only the scheduler and
/// tracker; starting or resolving analyses also needs the dataset store and
/// method provider supplied through `with_inputs`.
#[derive(Clone)]
pub struct UseCases {
    pub(crate) scheduler: Arc<dyn SchedulerPort>,
    pub(crate) tracker: Arc<dyn JobTrackerPort>,
    pub(crate) local_fs: Arc<dyn LocalFilesystemPort>,
    pub(crate) clock: Arc<dyn ClockPort>,
    pub(crate) datasets: Option<Arc<dyn DatasetStorePort>>,
    pub(crate) methods: Option<Arc<dyn MethodProviderPort>>,
}

impl UseCases {
    pub fn new(
        scheduler: Arc<dyn SchedulerPort>,
        tracker: Arc<dyn JobTrackerPort>,
        local_fs: Arc<dyn LocalFilesystemPort>,
        clock: Arc<dyn ClockPort>,
    ) -> Self {
        Self {
            scheduler,
            tracker,
            local_fs,
            clock,
            datasets: None,
            methods: None,
        }
    }

    pub fn with_inputs(
        mut self,
        datasets: Arc<dyn DatasetStorePort>,
        methods: Arc<dyn MethodProviderPort>,
    ) -> Self {
        self.datasets = Some(datasets);
        self.methods = Some(methods);
        self
    }

    /// Normalize, validate and submit. A request that resolves to a job the
    /// tracker already knows returns that job's status instead of submitting
    /// again; only failed or cancelled jobs are resubmitted.
    pub async fn start_analysis<R>(
        &self,
        request: R,
        method_type: MethodType,
        user: &str,
    ) -> AppResult<StartedAnalysis>
    where
        R: AdaptRequest + Send,
    {
        let analysis = self.prepare(request, method_type, user).await?;
        let job_id = analysis.job.id.clone();

        if let Some(status) = self.existing_status(&analysis.job, user).await? {
            tracing::info!("analysis {job_id} already known with status {status}");
            return Ok(StartedAnalysis { job_id, status });
        }

        if let Err(err) = self.scheduler.submit(&analysis).await {
            if err.kind() == AppErrorKind::Configuration {
                tracing::error!("cannot submit {method_type} analysis {job_id}: {err}");
            }
            return Err(err);
        }
        let job = &analysis.job;
        if let Err(err) = self
            .tracker
            .store_job_metadata(
                &job.id,
                job.alignment_id.as_deref(),
                job.tree_id.as_deref(),
                analysis.method_type.as_str(),
                JobStatus::Pending,
            )
            .await
        {
            tracing::warn!("failed to record metadata for job {job_id}: {err}");
        }
        tracing::info!(
            "started {method_type} analysis {job_id} for user '{}'",
            if user.is_empty() { "-" } else { user }
        );
        Ok(StartedAnalysis {
            job_id,
            status: JobStatus::Pending,
        })
    }

    /// Resolve the request to its job, poll it, and fetch results once done.
    pub async fn get_analysis<R>(
        &self,
        request: R,
        method_type: MethodType,
        user: &str,
    ) -> AppResult<AnalysisOutcome>
    where
        R: AdaptRequest + Send,
    {
        let analysis = self.prepare(request, method_type, user).await?;
        let job_id = analysis.job.id.clone();
        let status = self.job_status(&job_id, user).await?;
        match status {
            JobStatus::Pending | JobStatus::Running => {
                Ok(AnalysisOutcome::InProgress { job_id, status })
            }
            JobStatus::Failed | JobStatus::Cancelled => Ok(AnalysisOutcome::Failed {
                reason: format!("job {job_id} finished as {status}"),
                job_id,
                status,
            }),
            JobStatus::Complete => {
                let Some(method) = analysis.job.method.as_ref() else {
                    return Err(AppError::internal("job has no compute method"));
                };
                let results = self.read_results(method.as_ref(), &job_id).await?;
                Ok(AnalysisOutcome::Complete { job_id, results })
            }
        }
    }

    /// Current status of a tracked job. Polls the scheduler while a mapping
    /// exists and falls back to the last recorded status afterwards.
    pub async fn job_status(&self, job_id: &str, user: &str) -> AppResult<JobStatus> {
        let owner = self.authorized_owner(job_id, user).await?;
        match self.tracker.get_scheduler_job_id(job_id).await {
            Ok(_) => {}
            Err(err) if err.kind() == AppErrorKind::NotFound => {
                return Ok(self.tracker.get_job_metadata(job_id).await?.status);
            }
            Err(err) => return Err(err),
        }

        let handle = Job::tracked(job_id, owner.unwrap_or_default(), self.scheduler.clone());
        let (status, err) = handle.status().await;
        match err {
            None => {}
            // mapping dropped by a concurrent poll since the lookup above
            Some(err) if err.kind() == AppErrorKind::NotFound => {
                tracing::debug!("mapping for job {job_id} vanished while polling: {err}");
                return Ok(self.tracker.get_job_metadata(job_id).await?.status);
            }
            Some(err) => return Err(err),
        }
        self.record_status(job_id, status).await;
        Ok(status)
    }

    pub async fn cancel_analysis(&self, job_id: &str, user: &str) -> AppResult<JobStatus> {
        let owner = self.authorized_owner(job_id, user).await?;
        let handle = Job::tracked(job_id, owner.unwrap_or_default(), self.scheduler.clone());
        self.scheduler.cancel(&handle).await?;
        self.record_status(job_id, JobStatus::Cancelled).await;
        tracing::info!("cancelled analysis {job_id}");
        Ok(JobStatus::Cancelled)
    }

    /// Lists recorded analyses. A non-empty `user` always scopes the listing
    /// to that user's jobs, whatever the filters say.
    pub async fn list_analyses(
        &self,
        user: &str,
        mut filters: JobFilters,
    ) -> AppResult<Vec<JobMetadata>> {
        if !user.is_empty() {
            filters.owner = Some(user.to_string());
        }
        self.tracker.list_jobs_with_filters(&filters).await
    }

    pub async fn analysis_metadata(&self, job_id: &str, user: &str) -> AppResult<JobMetadata> {
        self.authorized_owner(job_id, user).await?;
        self.tracker.get_job_metadata(job_id).await
    }

    pub async fn check_health(&self) -> HealthReport {
        let report = self.scheduler.check_health().await;
        if let Some(err) = &report.error
            && err.kind() == AppErrorKind::Configuration
        {
            tracing::error!("scheduler misconfigured: {} ({err})", report.detail);
        }
        report
    }

    /// Polls every job that still has a scheduler mapping and refreshes its
    /// recorded status. One job failing to poll does not stop the sweep.
    pub async fn reconcile_tracked_jobs(&self) -> AppResult<ReconcileSummary> {
        let active = self.tracker.list_active_jobs().await?;
        let mut summary = ReconcileSummary::default();
        for entry in active {
            summary.checked += 1;
            let before = match self.tracker.get_job_metadata(&entry.job_id).await {
                Ok(meta) => Some(meta.status),
                Err(err) => {
                    tracing::debug!("no metadata for job {}: {err}", entry.job_id);
                    None
                }
            };
            let handle = Job::tracked(
                entry.job_id.clone(),
                entry.owner.clone().unwrap_or_default(),
                self.scheduler.clone(),
            );
            let (status, err) = handle.status().await;
            if let Some(err) = err {
                tracing::warn!("job check failed for {}: {err}", entry.job_id);
                summary.errors += 1;
                continue;
            }
            if before != Some(status) {
                summary.changed += 1;
            }
            self.record_status(&entry.job_id, status).await;
        }
        Ok(summary)
    }

    async fn prepare<R>(
        &self,
        request: R,
        method_type: MethodType,
        user: &str,
    ) -> AppResult<AnalysisJob>
    where
        R: AdaptRequest + Send,
    {
        let (Some(datasets), Some(methods)) = (&self.datasets, &self.methods) else {
            return Err(AppError::configuration(
                "no dataset store or compute methods registered",
            ));
        };
        let request = request.adapt(method_type)?;
        let method = methods.method_for(method_type, &request)?;
        validate_inputs(datasets.as_ref(), &request, method_type, method.as_ref()).await?;

        let mut analysis = AnalysisJob::new(&request, method, self.scheduler.clone());
        analysis.job = analysis.job.with_owner(user).at(self.clock.now_utc());
        analysis.job.validate()?;
        Ok(analysis)
    }

    /// Returns `Some(status)` when the job should not be submitted again.
    async fn existing_status(&self, job: &Job, user: &str) -> AppResult<Option<JobStatus>> {
        let owner = match self.tracker.get_job_owner(&job.id).await {
            Ok(owner) => owner,
            Err(err) if err.kind() == AppErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err),
        };
        if let Some(owner) = &owner
            && !user.is_empty()
            && owner != user
        {
            return Err(AppError::conflict(format!(
                "job {} belongs to another user",
                job.id
            )));
        }

        let status = self.job_status(&job.id, user).await?;
        match status {
            JobStatus::Failed | JobStatus::Cancelled => {
                tracing::info!("resubmitting job {} after it {status}", job.id);
                Ok(None)
            }
            JobStatus::Pending | JobStatus::Running => {
                if self.tracker.get_scheduler_job_id(&job.id).await.is_ok() {
                    Ok(Some(status))
                } else {
                    // recorded as live but nothing tracks it on the scheduler
                    tracing::warn!("job {} lost its scheduler mapping; resubmitting", job.id);
                    Ok(None)
                }
            }
            JobStatus::Complete => Ok(Some(status)),
        }
    }

    /// A job owned by somebody else is reported as missing.
    async fn authorized_owner(&self, job_id: &str, user: &str) -> AppResult<Option<String>> {
        let owner = self.tracker.get_job_owner(job_id).await?;
        if let Some(owner) = &owner
            && !user.is_empty()
            && owner != user
        {
            return Err(AppError::not_found(format!("job not found: {job_id}")));
        }
        Ok(owner)
    }

    /// Records the last observed status; illegal moves out of a terminal
    /// state are dropped. Failures are logged only.
    async fn record_status(&self, job_id: &str, status: JobStatus) {
        match self.tracker.get_job_metadata(job_id).await {
            Ok(meta) if meta.status == status => return,
            Ok(meta) if !meta.status.can_transition_to(status) => {
                tracing::debug!(
                    "ignoring status {status} for job {job_id} already {}",
                    meta.status
                );
                return;
            }
            Ok(_) => {}
            Err(err) => {
                tracing::warn!("failed to read metadata for job {job_id}: {err}");
                return;
            }
        }
        if let Err(err) = self.tracker.update_job_status(job_id, status).await {
            tracing::warn!("failed to record status {status} for job {job_id}: {err}");
        }
    }

    async fn read_results(&self, method: &dyn ComputeMethod, job_id: &str) -> AppResult<Value> {
        let path = method.output_path(job_id);
        if !self.local_fs.exists(&path).await {
            return Err(AppError::not_found(format!(
                "job {job_id} completed but wrote no results at {}",
                path.display()
            )));
        }
        let raw = self
            .local_fs
            .read_to_string(&path)
            .await
            .map_err(|err| err.with_context(format!("results for job {job_id}")))?;
        method.parse_result(&raw)
    }
}

async fn validate_inputs(
    datasets: &dyn DatasetStorePort,
    request: &AnalysisRequest,
    method_type: MethodType,
    method: &dyn ComputeMethod,
) -> AppResult<()> {
    if request.is_alignment_set() {
        let alignment = datasets
            .get(request.alignment())
            .await
            .map_err(|err| dataset_error(err, "alignment", request.alignment()))?;
        alignment.validate().map_err(|err| {
            AppError::validation(format!("alignment {} is invalid: {}", alignment.id(), err))
        })?;
        method.validate_input(alignment.as_ref())?;
    } else if method_type.requires_alignment() {
        return Err(AppError::validation(format!(
            "{method_type} requires an alignment"
        )));
    }
    if request.is_tree_set() {
        let tree = datasets
            .get(request.tree())
            .await
            .map_err(|err| dataset_error(err, "tree", request.tree()))?;
        tree.validate().map_err(|err| {
            AppError::validation(format!("tree {} is invalid: {}", tree.id(), err))
        })?;
    }
    Ok(())
}

fn dataset_error(err: AppError, role: &str, reference: &str) -> AppError {
    if err.kind() == AppErrorKind::NotFound {
        AppError::validation(format!("{role} {reference} is not a known dataset"))
    } else {
        err
    }
}
