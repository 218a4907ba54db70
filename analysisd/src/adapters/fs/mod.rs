// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::path::Path;

use async_trait::async_trait;

use crate::app::errors::{AppError, AppErrorKind, AppResult, codes};
use crate::app::ports::LocalFilesystemPort;

#[derive(Clone, Default)]
pub struct LocalFilesystem;

impl LocalFilesystem {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl LocalFilesystemPort for LocalFilesystem {
    #[tracing::instrument(name = "fs", level = "debug", skip(self, path), fields(op = "read_to_string", path = %path.display()))]
    async fn read_to_string(&self, path: &Path) -> AppResult<String> {
        tokio::fs::read_to_string(path).await.map_err(|err| {
            let kind = if err.kind() == std::io::ErrorKind::NotFound {
                AppErrorKind::NotFound
            } else {
                AppErrorKind::Internal
            };
            AppError::with_message(
                kind,
                codes::LOCAL_ERROR,
                format!("failed to read {}: {err}", path.display()),
            )
        })
    }

    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn reads_existing_and_reports_missing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("result.json");
        std::fs::write(&path, "{\"ok\":true}").unwrap();

        let fs = LocalFilesystem::new();
        assert!(fs.exists(&path).await);
        assert_eq!(fs.read_to_string(&path).await.unwrap(), "{\"ok\":true}");

        let missing = dir.path().join("missing.json");
        assert!(!fs.exists(&missing).await);
        let err = fs.read_to_string(&missing).await.unwrap_err();
        assert_eq!(err.kind(), AppErrorKind::NotFound);
    }
}
