// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;

use crate::app::errors::AppResult;
use crate::app::ports::Dataset;
use crate::app::services::request::AnalysisRequest;
use crate::app::types::{MethodType, ResourceDefaults};

/// An external analysis program bound to one request.
///
/// The command it resolves is the job's identity, so it must be a pure
/// function of the request and the datasets it references.
pub trait ComputeMethod: Send + Sync {
    fn method_type(&self) -> MethodType;
    fn command(&self) -> String;
    fn validate_input(&self, dataset: &dyn Dataset) -> AppResult<()>;
    fn parse_result(&self, raw: &str) -> AppResult<Value>;
    fn output_path(&self, job_id: &str) -> PathBuf;
    fn log_path(&self, job_id: &str) -> PathBuf;

    /// Per-method scheduler resource overrides, copied into job metadata.
    fn resources(&self) -> ResourceDefaults {
        ResourceDefaults::default()
    }
}

pub trait MethodProviderPort: Send + Sync {
    fn method_for(
        &self,
        method_type: MethodType,
        request: &AnalysisRequest,
    ) -> AppResult<Arc<dyn ComputeMethod>>;
}
