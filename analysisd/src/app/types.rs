// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle of a job as reported by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Complete,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Complete => "complete",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Complete | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Legal moves: pending -> running -> terminal, pending -> terminal.
    /// Terminal states have no successors; staying in place is always allowed.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        if self == next {
            return true;
        }
        match self {
            JobStatus::Pending => true,
            JobStatus::Running => next.is_terminal(),
            JobStatus::Complete | JobStatus::Failed | JobStatus::Cancelled => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown job status: {0}")]
pub struct ParseJobStatusError(pub String);

impl FromStr for JobStatus {
    type Err = ParseJobStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "complete" | "completed" => Ok(JobStatus::Complete),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" | "canceled" => Ok(JobStatus::Cancelled),
            other => Err(ParseJobStatusError(other.to_string())),
        }
    }
}

/// Analysis method families understood by the orchestration core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MethodType {
    Absrel,
    Bgm,
    Busted,
    ContrastFel,
    Fade,
    Fel,
    Fubar,
    Gard,
    Meme,
    Multihit,
    Nrm,
    Relax,
    Slac,
    /// Summarises a tree on its own; the only method without an alignment.
    TreeStats,
}

impl MethodType {
    pub const ALL: [MethodType; 14] = [
        MethodType::Absrel,
        MethodType::Bgm,
        MethodType::Busted,
        MethodType::ContrastFel,
        MethodType::Fade,
        MethodType::Fel,
        MethodType::Fubar,
        MethodType::Gard,
        MethodType::Meme,
        MethodType::Multihit,
        MethodType::Nrm,
        MethodType::Relax,
        MethodType::Slac,
        MethodType::TreeStats,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MethodType::Absrel => "absrel",
            MethodType::Bgm => "bgm",
            MethodType::Busted => "busted",
            MethodType::ContrastFel => "contrast-fel",
            MethodType::Fade => "fade",
            MethodType::Fel => "fel",
            MethodType::Fubar => "fubar",
            MethodType::Gard => "gard",
            MethodType::Meme => "meme",
            MethodType::Multihit => "multihit",
            MethodType::Nrm => "nrm",
            MethodType::Relax => "relax",
            MethodType::Slac => "slac",
            MethodType::TreeStats => "treestats",
        }
    }

    pub fn requires_alignment(self) -> bool {
        !matches!(self, MethodType::TreeStats)
    }
}

impl fmt::Display for MethodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown method type: {0}")]
pub struct ParseMethodTypeError(pub String);

impl FromStr for MethodType {
    type Err = ParseMethodTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        let normalized = if normalized == "cfel" {
            "contrast-fel".to_string()
        } else {
            normalized
        };
        MethodType::ALL
            .into_iter()
            .find(|method| method.as_str() == normalized)
            .ok_or_else(|| ParseMethodTypeError(s.to_string()))
    }
}

/// Descriptive record kept by the job tracker. Survives mapping deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobMetadata {
    pub job_id: String,
    pub owner: Option<String>,
    pub alignment_id: Option<String>,
    pub tree_id: Option<String>,
    pub method_type: String,
    /// Last status observed by this process; the scheduler is authoritative.
    pub status: JobStatus,
    pub created_at: String,
    pub updated_at: String,
}

/// Predicates for `list_jobs_with_filters`. Unset fields do not filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobFilters {
    pub owner: Option<String>,
    pub alignment_id: Option<String>,
    pub tree_id: Option<String>,
    pub method_type: Option<String>,
    pub status: Option<JobStatus>,
}

impl JobFilters {
    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn alignment(mut self, alignment_id: impl Into<String>) -> Self {
        self.alignment_id = Some(alignment_id.into());
        self
    }

    pub fn tree(mut self, tree_id: impl Into<String>) -> Self {
        self.tree_id = Some(tree_id.into());
        self
    }

    pub fn method(mut self, method_type: impl Into<String>) -> Self {
        self.method_type = Some(method_type.into());
        self
    }

    pub fn status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn is_empty(&self) -> bool {
        self == &JobFilters::default()
    }
}

pub const FALLBACK_NODES: u32 = 1;
pub const FALLBACK_CORES_PER_NODE: u32 = 1;
pub const FALLBACK_MEMORY: &str = "900M";
pub const FALLBACK_TIME_LIMIT: &str = "01:00:00";

/// Backend-level resource defaults, built once from configuration.
/// Unset values fall through to the hard-coded fallbacks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ResourceDefaults {
    pub nodes: Option<u32>,
    pub cores_per_node: Option<u32>,
    pub memory: Option<String>,
    pub time_limit: Option<String>,
}

/// Fully resolved resources for a single submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRequest {
    pub nodes: u32,
    pub cores_per_node: u32,
    pub memory: String,
    pub time_limit: String,
}
