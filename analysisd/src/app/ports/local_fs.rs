// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::path::Path;

use async_trait::async_trait;

use crate::app::errors::AppResult;

#[async_trait]
/// Reads finished job output from the shared filesystem.
pub trait LocalFilesystemPort: Send + Sync {
    async fn read_to_string(&self, path: &Path) -> AppResult<String>;
    async fn exists(&self, path: &Path) -> bool;
}
