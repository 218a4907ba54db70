// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::app::errors::AppResult;

/// A stored input (alignment or tree) addressed by content id.
pub trait Dataset: Send + Sync {
    fn id(&self) -> &str;
    fn validate(&self) -> AppResult<()>;
}

#[async_trait]
pub trait DatasetStorePort: Send + Sync {
    async fn get(&self, reference: &str) -> AppResult<Arc<dyn Dataset>>;
    fn dataset_dir(&self) -> &Path;
}
