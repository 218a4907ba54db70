// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::app::errors::{AppError, AppErrorKind, AppResult, codes};
use crate::app::job::{Job, JobAccess, metadata_keys};
use crate::app::ports::{CommandExecPort, HealthReport, JobTrackerPort, SchedulerPort};
use crate::app::services::slurm::{
    self, exit_code_status, is_invalid_job_id, map_slurm_state, parse_sacct_exit_code,
    parse_squeue_state, parse_submission_output,
};
use crate::app::types::{
    FALLBACK_CORES_PER_NODE, FALLBACK_MEMORY, FALLBACK_NODES, FALLBACK_TIME_LIMIT, JobStatus,
    ResourceDefaults, ResourceRequest,
};

pub const NO_PARTITION: &str = "No partition specified";

/// Names (or paths) of the Slurm client programs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SlurmPrograms {
    pub sbatch: String,
    pub scancel: String,
    pub squeue: String,
    pub sacct: String,
    pub scontrol: String,
}

impl Default for SlurmPrograms {
    fn default() -> Self {
        Self {
            sbatch: "sbatch".into(),
            scancel: "scancel".into(),
            squeue: "squeue".into(),
            sacct: "sacct".into(),
            scontrol: "scontrol".into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlurmConfig {
    pub partition: Option<String>,
    pub defaults: ResourceDefaults,
    pub programs: SlurmPrograms,
}

impl SlurmConfig {
    fn partition(&self) -> Option<&str> {
        self.partition
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }
}

/// Scheduler backed by the Slurm command line tools.
pub struct SlurmScheduler {
    config: SlurmConfig,
    exec: Arc<dyn CommandExecPort>,
    tracker: Arc<dyn JobTrackerPort>,
}

impl SlurmScheduler {
    pub fn new(
        config: SlurmConfig,
        exec: Arc<dyn CommandExecPort>,
        tracker: Arc<dyn JobTrackerPort>,
    ) -> Self {
        Self {
            config,
            exec,
            tracker,
        }
    }

    /// Job metadata wins over the configured default, which wins over the
    /// built-in fallback. Unparseable metadata values are ignored.
    pub fn resolve_resources(&self, job: &Job) -> ResourceRequest {
        let defaults = &self.config.defaults;
        let number = |key: &str| {
            job.metadata_value(key)
                .and_then(|raw| match raw.trim().parse::<u32>() {
                    Ok(n) if n > 0 => Some(n),
                    _ => {
                        tracing::warn!("ignoring invalid {key}={raw} on job {}", job.id);
                        None
                    }
                })
        };
        ResourceRequest {
            nodes: number(metadata_keys::SLURM_NODES)
                .or(defaults.nodes)
                .unwrap_or(FALLBACK_NODES),
            cores_per_node: number(metadata_keys::SLURM_CORES_PER_NODE)
                .or(defaults.cores_per_node)
                .unwrap_or(FALLBACK_CORES_PER_NODE),
            memory: job
                .metadata_value(metadata_keys::SLURM_MEMORY)
                .map(str::to_string)
                .or_else(|| defaults.memory.clone())
                .unwrap_or_else(|| FALLBACK_MEMORY.to_string()),
            time_limit: job
                .metadata_value(metadata_keys::SLURM_TIME_LIMIT)
                .map(str::to_string)
                .or_else(|| defaults.time_limit.clone())
                .unwrap_or_else(|| FALLBACK_TIME_LIMIT.to_string()),
        }
    }

    async fn lookup_scheduler_id(&self, job: &Job) -> AppResult<String> {
        if job.has_owner() {
            self.tracker
                .get_scheduler_job_id_by_user(&job.id, &job.owner)
                .await
        } else {
            self.tracker.get_scheduler_job_id(&job.id).await
        }
    }

    async fn forget_mapping(&self, job: &Job, reason: &str) {
        if let Err(err) = self.tracker.delete_job_mapping(&job.id).await {
            tracing::warn!("failed to delete mapping for job {} after {reason}: {err}", job.id);
        }
    }

    /// Status of a job squeue no longer knows, from its accounting exit code.
    async fn status_from_accounting(&self, job_id: &str, scheduler_id: &str) -> JobStatus {
        let capture = match self
            .exec
            .exec(&self.config.programs.sacct, &slurm::sacct_args(scheduler_id))
            .await
        {
            Ok(capture) => capture,
            Err(err) => {
                tracing::warn!("sacct failed for job {job_id} ({scheduler_id}): {err}");
                return JobStatus::Failed;
            }
        };
        if !capture.success() {
            tracing::warn!(
                "sacct returned {} for job {job_id} ({scheduler_id}): {}",
                capture.exit_code,
                capture.stderr_lossy().trim()
            );
            return JobStatus::Failed;
        }
        let exit_code = parse_sacct_exit_code(&capture.stdout_lossy());
        tracing::debug!("job {job_id} ({scheduler_id}) exit code {exit_code:?}");
        exit_code_status(exit_code.as_deref())
    }
}

#[async_trait]
impl SchedulerPort for SlurmScheduler {
    #[tracing::instrument(
        name = "slurm",
        level = "debug",
        skip(self, job),
        fields(op = "submit", job_id = %job.base().id)
    )]
    async fn submit(&self, job: &dyn JobAccess) -> AppResult<()> {
        let job = job.base();
        job.validate()?;
        let Some(partition) = self.config.partition() else {
            tracing::error!("refusing to submit job {}: {NO_PARTITION}", job.id);
            return Err(AppError::configuration(NO_PARTITION).with_context("submit"));
        };

        let resources = self.resolve_resources(job);
        let args = slurm::sbatch_args(partition, &resources, &job.log_path, &job.id, &job.command);
        let capture = self
            .exec
            .exec(&self.config.programs.sbatch, &args)
            .await
            .map_err(|err| {
                AppError::submission(format!("could not run sbatch: {}", err.message()))
                    .with_context(format!("submit job={}", job.id))
            })?;
        if !capture.success() {
            return Err(AppError::submission(format!(
                "sbatch exited with {}: {}",
                capture.exit_code,
                capture.stderr_lossy().trim()
            ))
            .with_context(format!("submit job={}", job.id)));
        }

        let stdout = capture.stdout_lossy();
        let scheduler_id = parse_submission_output(&stdout).ok_or_else(|| {
            AppError::submission(format!("unexpected sbatch output: '{}'", stdout.trim()))
                .with_context(format!("submit job={}", job.id))
        })?;

        let stored = if job.has_owner() {
            self.tracker
                .store_job_with_user(&job.id, &scheduler_id, &job.owner)
                .await
        } else {
            self.tracker.store_job_mapping(&job.id, &scheduler_id).await
        };
        if let Err(err) = stored {
            tracing::error!(
                "slurm job {scheduler_id} for job {} is untracked: {err}",
                job.id
            );
            return Err(AppError::submission(format!(
                "slurm accepted job {scheduler_id} but its mapping was not recorded: {}",
                err.message()
            ))
            .with_context(format!("submit job={}", job.id)));
        }
        tracing::info!(
            "submitted job {} as slurm job {scheduler_id} on partition {partition}",
            job.id
        );
        Ok(())
    }

    #[tracing::instrument(
        name = "slurm",
        level = "debug",
        skip(self, job),
        fields(op = "cancel", job_id = %job.base().id)
    )]
    async fn cancel(&self, job: &dyn JobAccess) -> AppResult<()> {
        let job = job.base();
        let scheduler_id = self.lookup_scheduler_id(job).await?;
        let capture = self
            .exec
            .exec(&self.config.programs.scancel, &[scheduler_id.clone()])
            .await
            .map_err(|err| {
                AppError::with_message(
                    AppErrorKind::Submission,
                    codes::CANCEL_ERROR,
                    format!("could not run scancel: {}", err.message()),
                )
                .with_context(format!("cancel job={}", job.id))
            })?;
        if !capture.success() {
            return Err(AppError::with_message(
                AppErrorKind::Submission,
                codes::CANCEL_ERROR,
                format!(
                    "scancel exited with {}: {}",
                    capture.exit_code,
                    capture.stderr_lossy().trim()
                ),
            )
            .with_context(format!("cancel job={}", job.id)));
        }
        tracing::info!("cancelled job {} (slurm job {scheduler_id})", job.id);
        self.forget_mapping(job, "cancel").await;
        Ok(())
    }

    #[tracing::instrument(
        name = "slurm",
        level = "debug",
        skip(self, job),
        fields(op = "get_status", job_id = %job.base().id)
    )]
    async fn get_status(&self, job: &dyn JobAccess) -> AppResult<JobStatus> {
        let job = job.base();
        let scheduler_id = self.lookup_scheduler_id(job).await?;
        let capture = self
            .exec
            .exec(&self.config.programs.squeue, &slurm::squeue_args(&scheduler_id))
            .await
            .map_err(|err| {
                AppError::poll(format!("unable to determine status: {}", err.message()))
                    .with_context(format!("get_status job={}", job.id))
            })?;

        let status = if !capture.success() {
            let stderr = capture.stderr_lossy();
            if !is_invalid_job_id(&stderr) {
                return Err(AppError::poll(format!(
                    "unable to determine status: squeue exited with {}: {}",
                    capture.exit_code,
                    stderr.trim()
                ))
                .with_context(format!("get_status job={}", job.id)));
            }
            self.status_from_accounting(&job.id, &scheduler_id).await
        } else {
            match parse_squeue_state(&capture.stdout_lossy()) {
                // the job already left the queue
                None => self.status_from_accounting(&job.id, &scheduler_id).await,
                Some(state) => map_slurm_state(&state).ok_or_else(|| {
                    AppError::poll(format!("unable to determine status: unknown state '{state}'"))
                        .with_context(format!("get_status job={}", job.id))
                })?,
            }
        };

        if status.is_terminal() {
            self.forget_mapping(job, "terminal status").await;
        }
        Ok(status)
    }

    #[tracing::instrument(name = "slurm", level = "debug", skip(self), fields(op = "check_health"))]
    async fn check_health(&self) -> HealthReport {
        let Some(partition) = self.config.partition() else {
            tracing::error!("slurm health check: {NO_PARTITION}");
            return HealthReport::unhealthy(
                NO_PARTITION,
                Some(AppError::configuration(NO_PARTITION)),
            );
        };

        let program = &self.config.programs.scontrol;
        let capture = match self
            .exec
            .exec(program, &slurm::scontrol_partition_args(partition))
            .await
        {
            Ok(capture) => capture,
            Err(err) => {
                return HealthReport::unhealthy(format!("{program} is not available"), Some(err));
            }
        };
        if !capture.success() {
            let stderr = capture.stderr_lossy();
            if stderr.to_ascii_lowercase().contains("not found") {
                return HealthReport::unhealthy(
                    format!("Partition '{partition}' not found"),
                    Some(AppError::configuration(format!(
                        "partition '{partition}' does not exist"
                    ))),
                );
            }
            return HealthReport::unhealthy(
                format!("{program} exited with {}", capture.exit_code),
                Some(AppError::with_message(
                    AppErrorKind::Unavailable,
                    codes::COMMAND_UNAVAILABLE,
                    stderr.trim().to_string(),
                )),
            );
        }

        let partitions = match slurm::parse_scontrol_partitions(&capture.stdout_lossy()) {
            Ok(parts) => parts,
            Err(err) => {
                return HealthReport::unhealthy(
                    format!("unreadable {program} output"),
                    Some(AppError::internal(err.to_string())),
                );
            }
        };
        let Some(found) = partitions.iter().find(|p| p.name == partition) else {
            return HealthReport::unhealthy(
                format!("Partition '{partition}' not found"),
                Some(AppError::configuration(format!(
                    "partition '{partition}' does not exist"
                ))),
            );
        };
        if !found.is_up() {
            let state = found.get("State").unwrap_or("UNKNOWN");
            return HealthReport::unhealthy(format!("Partition '{partition}' is {state}"), None);
        }
        HealthReport::healthy(format!("Partition '{partition}' is UP"))
    }
}
