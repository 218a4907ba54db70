// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use async_trait::async_trait;
use tokio::process::Command;

use crate::app::errors::{AppError, AppErrorKind, AppResult, codes};
use crate::app::ports::{CommandExecPort, ExecCapture};

/// Runs programs directly on this host, without a shell.
#[derive(Clone, Default)]
pub struct LocalCommandExec;

impl LocalCommandExec {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandExecPort for LocalCommandExec {
    #[tracing::instrument(name = "process", level = "debug", skip(self, args), fields(op = "exec", program = %program))]
    async fn exec(&self, program: &str, args: &[String]) -> AppResult<ExecCapture> {
        let output = Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|err| {
                AppError::with_message(
                    AppErrorKind::Unavailable,
                    codes::COMMAND_UNAVAILABLE,
                    format!("failed to run {program}: {err}"),
                )
            })?;
        // killed by a signal: no exit code
        let exit_code = output.status.code().unwrap_or(-1);
        tracing::debug!("{program} exited with {exit_code}");
        Ok(ExecCapture {
            stdout: output.stdout,
            stderr: output.stderr,
            exit_code,
        })
    }
}
