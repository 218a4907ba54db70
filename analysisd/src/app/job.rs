// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use time::OffsetDateTime;

use crate::app::errors::{AppError, AppResult};
use crate::app::ports::{ComputeMethod, SchedulerPort};
use crate::app::services::request::AnalysisRequest;
use crate::app::types::{JobStatus, MethodType};

pub mod metadata_keys {
    pub const SLURM_NODES: &str = "slurm_nodes";
    pub const SLURM_CORES_PER_NODE: &str = "slurm_cores_per_node";
    pub const SLURM_MEMORY: &str = "slurm_memory";
    pub const SLURM_TIME_LIMIT: &str = "slurm_time_limit";
    pub const ALIGNMENT_ID: &str = "alignment_id";
    pub const TREE_ID: &str = "tree_id";
    pub const METHOD_TYPE: &str = "method_type";
    pub const STATUS: &str = "status";
}

/// Lower-case hex sha256 of a resolved command line.
pub fn job_id_for_command(command: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(command.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// One submitted unit of work. Identity is derived from the resolved command,
/// so equal commands always name the same job.
#[derive(Clone)]
pub struct Job {
    pub id: String,
    pub owner: String,
    pub output_path: String,
    pub log_path: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub metadata: HashMap<String, String>,
    pub alignment_id: Option<String>,
    pub tree_id: Option<String>,
    pub command: String,
    pub scheduler: Option<Arc<dyn SchedulerPort>>,
    pub method: Option<Arc<dyn ComputeMethod>>,
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("owner", &self.owner)
            .field("output_path", &self.output_path)
            .field("log_path", &self.log_path)
            .field("alignment_id", &self.alignment_id)
            .field("tree_id", &self.tree_id)
            .field("metadata", &self.metadata)
            .field("scheduler", &self.scheduler.is_some())
            .field("method", &self.method.is_some())
            .finish()
    }
}

impl Job {
    pub fn new(
        request: &AnalysisRequest,
        method: Arc<dyn ComputeMethod>,
        scheduler: Arc<dyn SchedulerPort>,
    ) -> Self {
        let command = method.command();
        let id = job_id_for_command(&command);
        let alignment_id = request
            .is_alignment_set()
            .then(|| request.alignment().to_string());
        let tree_id = request.is_tree_set().then(|| request.tree().to_string());

        let mut metadata = HashMap::new();
        metadata.insert(
            metadata_keys::METHOD_TYPE.to_string(),
            method.method_type().as_str().to_string(),
        );
        metadata.insert(
            metadata_keys::STATUS.to_string(),
            JobStatus::Pending.as_str().to_string(),
        );
        if let Some(alignment) = &alignment_id {
            metadata.insert(metadata_keys::ALIGNMENT_ID.to_string(), alignment.clone());
        }
        if let Some(tree) = &tree_id {
            metadata.insert(metadata_keys::TREE_ID.to_string(), tree.clone());
        }
        let resources = method.resources();
        if let Some(nodes) = resources.nodes {
            metadata.insert(metadata_keys::SLURM_NODES.to_string(), nodes.to_string());
        }
        if let Some(cores) = resources.cores_per_node {
            metadata.insert(
                metadata_keys::SLURM_CORES_PER_NODE.to_string(),
                cores.to_string(),
            );
        }
        if let Some(memory) = resources.memory {
            metadata.insert(metadata_keys::SLURM_MEMORY.to_string(), memory);
        }
        if let Some(time_limit) = resources.time_limit {
            metadata.insert(metadata_keys::SLURM_TIME_LIMIT.to_string(), time_limit);
        }

        let now = OffsetDateTime::now_utc();
        Self {
            output_path: method.output_path(&id).display().to_string(),
            log_path: method.log_path(&id).display().to_string(),
            id,
            owner: String::new(),
            created_at: now,
            updated_at: now,
            metadata,
            alignment_id,
            tree_id,
            command,
            scheduler: Some(scheduler),
            method: Some(method),
        }
    }

    /// A handle for a job known only by id, used to poll or cancel it.
    pub fn tracked(
        id: impl Into<String>,
        owner: impl Into<String>,
        scheduler: Arc<dyn SchedulerPort>,
    ) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: id.into(),
            owner: owner.into(),
            output_path: String::new(),
            log_path: String::new(),
            created_at: now,
            updated_at: now,
            metadata: HashMap::new(),
            alignment_id: None,
            tree_id: None,
            command: String::new(),
            scheduler: Some(scheduler),
            method: None,
        }
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = owner.into();
        self
    }

    pub fn at(mut self, now: OffsetDateTime) -> Self {
        self.created_at = now;
        self.updated_at = now;
        self
    }

    pub fn has_owner(&self) -> bool {
        !self.owner.is_empty()
    }

    pub fn method_type(&self) -> Option<MethodType> {
        self.method.as_ref().map(|m| m.method_type())
    }

    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.id.is_empty() {
            return Err(AppError::validation("job id is empty"));
        }
        if self.alignment_id.is_none() && self.tree_id.is_none() {
            return Err(AppError::validation(
                "job has neither an alignment nor a tree",
            ));
        }
        if self.log_path.is_empty() {
            return Err(AppError::validation("job log path is empty"));
        }
        if self.scheduler.is_none() {
            return Err(AppError::validation("job has no scheduler"));
        }
        if self.method.is_none() {
            return Err(AppError::validation("job has no compute method"));
        }
        if self.command.trim().is_empty() {
            return Err(AppError::validation("job command is empty"));
        }
        Ok(())
    }

    /// Asks the scheduler for the current status. A scheduler error is folded
    /// into `Failed` alongside the error that caused it.
    pub async fn status(&self) -> (JobStatus, Option<AppError>) {
        let Some(scheduler) = &self.scheduler else {
            return (
                JobStatus::Failed,
                Some(AppError::validation("job has no scheduler")),
            );
        };
        match scheduler.get_status(self).await {
            Ok(status) => (status, None),
            Err(err) => (JobStatus::Failed, Some(err)),
        }
    }
}

/// Anything a scheduler can operate on: the bare job or a richer wrapper.
pub trait JobAccess: Send + Sync {
    fn base(&self) -> &Job;
}

impl JobAccess for Job {
    fn base(&self) -> &Job {
        self
    }
}

/// A job tagged with the analysis method that produced its command.
#[derive(Debug, Clone)]
pub struct AnalysisJob {
    pub job: Job,
    pub method_type: MethodType,
}

impl AnalysisJob {
    pub fn new(
        request: &AnalysisRequest,
        method: Arc<dyn ComputeMethod>,
        scheduler: Arc<dyn SchedulerPort>,
    ) -> Self {
        let method_type = method.method_type();
        let job = Job::new(request, method, scheduler);
        Self { job, method_type }
    }
}

impl JobAccess for AnalysisJob {
    fn base(&self) -> &Job {
        &self.job
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::path::PathBuf;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::Value;

    use super::*;
    use crate::app::errors::AppErrorKind;
    use crate::app::ports::{Dataset, HealthReport};
    use crate::app::types::ResourceDefaults;

    pub(crate) struct FixedMethod {
        pub method_type: MethodType,
        pub command: String,
        pub resources: ResourceDefaults,
    }

    impl FixedMethod {
        pub(crate) fn fel(command: &str) -> Self {
            Self {
                method_type: MethodType::Fel,
                command: command.to_string(),
                resources: ResourceDefaults::default(),
            }
        }
    }

    impl ComputeMethod for FixedMethod {
        fn method_type(&self) -> MethodType {
            self.method_type
        }

        fn command(&self) -> String {
            self.command.clone()
        }

        fn validate_input(&self, _dataset: &dyn Dataset) -> AppResult<()> {
            Ok(())
        }

        fn parse_result(&self, raw: &str) -> AppResult<Value> {
            serde_json::from_str(raw).map_err(|err| AppError::internal(err.to_string()))
        }

        fn output_path(&self, job_id: &str) -> PathBuf {
            PathBuf::from(format!("/results/{job_id}.json"))
        }

        fn log_path(&self, job_id: &str) -> PathBuf {
            PathBuf::from(format!("/results/{job_id}.log"))
        }

        fn resources(&self) -> ResourceDefaults {
            self.resources.clone()
        }
    }

    /// Returns scripted statuses in order; panics on submit and cancel.
    pub(crate) struct ScriptedScheduler {
        statuses: Mutex<Vec<AppResult<JobStatus>>>,
    }

    impl ScriptedScheduler {
        pub(crate) fn new(mut statuses: Vec<AppResult<JobStatus>>) -> Self {
            statuses.reverse();
            Self {
                statuses: Mutex::new(statuses),
            }
        }
    }

    #[async_trait]
    impl SchedulerPort for ScriptedScheduler {
        async fn submit(&self, _job: &dyn JobAccess) -> AppResult<()> {
            panic!("submit should not be called");
        }

        async fn cancel(&self, _job: &dyn JobAccess) -> AppResult<()> {
            panic!("cancel should not be called");
        }

        async fn get_status(&self, _job: &dyn JobAccess) -> AppResult<JobStatus> {
            self.statuses
                .lock()
                .unwrap()
                .pop()
                .expect("no scripted status left")
        }

        async fn check_health(&self) -> HealthReport {
            HealthReport::healthy("scripted")
        }
    }

    fn fel_request() -> AnalysisRequest {
        AnalysisRequest {
            alignment: Some("x.fas".into()),
            ..AnalysisRequest::default()
        }
    }

    fn scheduler() -> Arc<dyn SchedulerPort> {
        Arc::new(ScriptedScheduler::new(Vec::new()))
    }

    #[test]
    fn identity_is_sha256_of_command() {
        let method = Arc::new(FixedMethod::fel("hyphy fel --alignment x.fas"));
        let job = Job::new(&fel_request(), method, scheduler());
        assert_eq!(job.id, job_id_for_command("hyphy fel --alignment x.fas"));
        assert_eq!(job.id.len(), 64);
        assert!(job.id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(
            job_id_for_command(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn same_command_gives_same_job_across_requests() {
        let first = Job::new(
            &fel_request(),
            Arc::new(FixedMethod::fel("cmd")),
            scheduler(),
        );
        let other_request = AnalysisRequest {
            alignment: Some("x.fas".into()),
            ci: Some("Yes".into()),
            ..AnalysisRequest::default()
        };
        let second = Job::new(&other_request, Arc::new(FixedMethod::fel("cmd")), scheduler());
        assert_eq!(first.id, second.id);
        assert_eq!(first.log_path, second.log_path);

        let different = Job::new(
            &fel_request(),
            Arc::new(FixedMethod::fel("cmd --other")),
            scheduler(),
        );
        assert_ne!(first.id, different.id);
    }

    #[test]
    fn new_job_records_summary_metadata() {
        let method = FixedMethod {
            method_type: MethodType::Busted,
            command: "busted".into(),
            resources: ResourceDefaults {
                nodes: Some(2),
                memory: Some("8G".into()),
                ..ResourceDefaults::default()
            },
        };
        let request = AnalysisRequest {
            alignment: Some("x.fas".into()),
            tree: Some("t.nwk".into()),
            ..AnalysisRequest::default()
        };
        let job = Job::new(&request, Arc::new(method), scheduler());
        assert_eq!(job.metadata_value(metadata_keys::METHOD_TYPE), Some("busted"));
        assert_eq!(job.metadata_value(metadata_keys::STATUS), Some("pending"));
        assert_eq!(job.metadata_value(metadata_keys::TREE_ID), Some("t.nwk"));
        assert_eq!(job.metadata_value(metadata_keys::SLURM_NODES), Some("2"));
        assert_eq!(job.metadata_value(metadata_keys::SLURM_MEMORY), Some("8G"));
        assert_eq!(job.metadata_value(metadata_keys::SLURM_TIME_LIMIT), None);
    }

    #[test]
    fn validation_messages_are_distinct() {
        let valid = Job::new(
            &fel_request(),
            Arc::new(FixedMethod::fel("cmd")),
            scheduler(),
        );
        assert!(valid.validate().is_ok());

        let mut no_id = valid.clone();
        no_id.id.clear();
        let mut no_inputs = valid.clone();
        no_inputs.alignment_id = None;
        no_inputs.tree_id = None;
        let mut no_log = valid.clone();
        no_log.log_path.clear();
        let mut no_scheduler = valid.clone();
        no_scheduler.scheduler = None;
        let mut no_method = valid.clone();
        no_method.method = None;
        let mut no_command = valid.clone();
        no_command.command = "  ".into();

        let messages: Vec<String> = [no_id, no_inputs, no_log, no_scheduler, no_method, no_command]
            .iter()
            .map(|job| {
                let err = job.validate().unwrap_err();
                assert_eq!(err.kind(), AppErrorKind::Validation);
                assert!(!err.message().is_empty());
                err.message().to_string()
            })
            .collect();
        for (i, a) in messages.iter().enumerate() {
            for b in messages.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn tree_only_job_is_valid() {
        let request = AnalysisRequest {
            tree: Some("t.nwk".into()),
            ..AnalysisRequest::default()
        };
        let job = Job::new(&request, Arc::new(FixedMethod::fel("cmd")), scheduler());
        assert!(job.alignment_id.is_none());
        assert!(job.validate().is_ok());
    }

    #[tokio::test]
    async fn status_folds_scheduler_errors_into_failed() {
        let sched: Arc<dyn SchedulerPort> = Arc::new(ScriptedScheduler::new(vec![
            Ok(JobStatus::Running),
            Err(AppError::poll("squeue unreachable")),
        ]));
        let job = Job::tracked("abc", "", sched);
        assert_eq!(job.status().await.0, JobStatus::Running);
        let (status, err) = job.status().await;
        assert_eq!(status, JobStatus::Failed);
        assert_eq!(err.unwrap().kind(), AppErrorKind::Poll);
    }

    #[tokio::test]
    async fn status_without_scheduler_is_failed() {
        let mut job = Job::tracked("abc", "", scheduler());
        job.scheduler = None;
        let (status, err) = job.status().await;
        assert_eq!(status, JobStatus::Failed);
        assert!(err.is_some());
    }

    #[test]
    fn analysis_job_exposes_base_job() {
        let wrapper = AnalysisJob::new(
            &fel_request(),
            Arc::new(FixedMethod::fel("cmd")),
            scheduler(),
        );
        let access: &dyn JobAccess = &wrapper;
        assert_eq!(access.base().id, job_id_for_command("cmd"));
        assert_eq!(wrapper.method_type, MethodType::Fel);
    }
}
