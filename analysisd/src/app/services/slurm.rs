// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::collections::HashMap;

use crate::app::types::{JobStatus, ResourceRequest};

/// Minimum whitespace tokens in sbatch acceptance output ("Submitted batch job N").
pub const MIN_SUBMISSION_TOKENS: usize = 4;

/// Exit code reported by sacct for a job that finished cleanly.
pub const SUCCESS_EXIT_CODE: &str = "0:0";

/// A single partition line from `scontrol show partition -o`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub name: String,
    pub fields: HashMap<String, String>,
}

impl Partition {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(|s| s.as_str())
    }

    pub fn is_up(&self) -> bool {
        self.get("State")
            .is_some_and(|state| state.trim().eq_ignore_ascii_case("UP"))
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("partition is missing required key: {0}")]
    MissingField(&'static str),
}

/// Parses `key=value` tokens per line. Only the first '=' splits, so values
/// like `TRESBillingWeights=CPU=1.0,Mem=0` survive.
pub fn parse_scontrol_partitions(input: &str) -> Result<Vec<Partition>, ParseError> {
    let mut parts = Vec::new();
    for line in input.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let mut fields = HashMap::new();
        for token in line.split_whitespace() {
            if let Some((key, value)) = token.split_once('=') {
                fields.insert(key.to_string(), value.to_string());
            }
        }
        let name = fields
            .remove("PartitionName")
            .ok_or(ParseError::MissingField("PartitionName"))?;
        parts.push(Partition { name, fields });
    }
    Ok(parts)
}

/// Extracts the scheduler id from sbatch output. The first non-empty line must
/// carry at least `MIN_SUBMISSION_TOKENS` tokens; the last one is the id, with
/// any federation suffix (`123;cluster`) stripped.
pub fn parse_submission_output(output: &str) -> Option<String> {
    let line = output.lines().map(str::trim).find(|l| !l.is_empty())?;
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < MIN_SUBMISSION_TOKENS {
        return None;
    }
    let last = tokens[tokens.len() - 1];
    let id = last.split(';').next().unwrap_or(last).trim();
    if id.is_empty() || !id.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(id.to_string())
}

/// First non-empty line of `squeue -h -o %T`, uppercased.
pub fn parse_squeue_state(output: &str) -> Option<String> {
    output
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(normalize_slurm_state)
}

/// First non-empty `ExitCode` field from `sacct -n -P -o ExitCode`. The first
/// row is the allocation itself; step rows follow it.
pub fn parse_sacct_exit_code(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let field = line.split('|').next().unwrap_or(line).trim();
        (!field.is_empty()).then(|| field.to_string())
    })
}

pub fn exit_code_status(exit_code: Option<&str>) -> JobStatus {
    match exit_code {
        Some(code) if code.trim() == SUCCESS_EXIT_CODE => JobStatus::Complete,
        _ => JobStatus::Failed,
    }
}

pub fn is_invalid_job_id(stderr: &str) -> bool {
    stderr.to_ascii_lowercase().contains("invalid job id")
}

pub fn normalize_slurm_state(state: &str) -> String {
    let token = state
        .trim()
        .split(['+', ':', '(', ' '])
        .next()
        .unwrap_or(state)
        .trim();
    token.to_ascii_uppercase()
}

/// Maps a Slurm state token to a job status. Unknown tokens yield `None` so
/// the caller can report "unable to determine status" instead of guessing.
pub fn map_slurm_state(state: &str) -> Option<JobStatus> {
    let state = normalize_slurm_state(state);
    match state.as_str() {
        "PENDING" | "CONFIGURING" | "REQUEUED" | "REQUEUE_HOLD" | "REQUEUE_FED" | "RESV_DEL_HOLD" => {
            Some(JobStatus::Pending)
        }
        "RUNNING" | "COMPLETING" | "SUSPENDED" | "RESIZING" | "STAGE_OUT" | "STAGE_IN"
        | "SIGNALING" | "STOPPED" => Some(JobStatus::Running),
        "COMPLETED" => Some(JobStatus::Complete),
        "CANCELLED" => Some(JobStatus::Cancelled),
        "FAILED" | "TIMEOUT" | "NODE_FAIL" | "PREEMPTED" | "BOOT_FAIL" | "OUT_OF_MEMORY"
        | "DEADLINE" | "SPECIAL_EXIT" | "REVOKED" => Some(JobStatus::Failed),
        _ => None,
    }
}

/// Arguments for `sbatch`. The command is handed over as a single `--wrap`
/// value so no shell quoting happens on this side.
pub fn sbatch_args(
    partition: &str,
    resources: &ResourceRequest,
    output_path: &str,
    job_name: &str,
    command: &str,
) -> Vec<String> {
    vec![
        format!("--partition={partition}"),
        format!("--nodes={}", resources.nodes),
        format!("--ntasks-per-node={}", resources.cores_per_node),
        format!("--mem={}", resources.memory),
        format!("--time={}", resources.time_limit),
        format!("--output={output_path}"),
        format!("--job-name={job_name}"),
        format!("--wrap={command}"),
    ]
}

pub fn squeue_args(scheduler_id: &str) -> Vec<String> {
    vec![
        "-h".to_string(),
        "-j".to_string(),
        scheduler_id.to_string(),
        "-o".to_string(),
        "%T".to_string(),
    ]
}

pub fn sacct_args(scheduler_id: &str) -> Vec<String> {
    vec![
        "-j".to_string(),
        scheduler_id.to_string(),
        "-n".to_string(),
        "-P".to_string(),
        "-o".to_string(),
        "ExitCode".to_string(),
    ]
}

pub fn scontrol_partition_args(partition: &str) -> Vec<String> {
    vec![
        "show".to_string(),
        "partition".to_string(),
        partition.to_string(),
        "-o".to_string(),
    ]
}
