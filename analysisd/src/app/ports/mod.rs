// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

pub mod clock;
pub mod command_exec;
pub mod compute_method;
pub mod dataset_store;
pub mod job_tracker;
pub mod local_fs;
pub mod scheduler;

pub use clock::ClockPort;
pub use command_exec::{CommandExecPort, ExecCapture};
pub use compute_method::{ComputeMethod, MethodProviderPort};
pub use dataset_store::{Dataset, DatasetStorePort};
pub use job_tracker::{ActiveJob, JobTrackerPort};
pub use local_fs::LocalFilesystemPort;
pub use scheduler::{HealthReport, SchedulerPort};
