// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::fmt;

pub mod codes {
    pub const ADAPTATION_ERROR: &str = "adaptation_error";
    pub const VALIDATION_ERROR: &str = "validation_error";
    pub const CONFIGURATION_ERROR: &str = "configuration_error";
    pub const SUBMISSION_ERROR: &str = "submission_error";
    pub const POLL_ERROR: &str = "poll_error";
    pub const CANCEL_ERROR: &str = "cancel_error";
    pub const NOT_FOUND: &str = "not_found";
    pub const CONFLICT: &str = "conflict";
    pub const INVALID_ARGUMENT: &str = "invalid_argument";
    pub const STORE_CLOSED: &str = "store_closed";
    pub const COMMAND_UNAVAILABLE: &str = "command_unavailable";
    pub const INTERNAL_ERROR: &str = "internal_error";
    pub const LOCAL_ERROR: &str = "local_error";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppErrorKind {
    /// The request value could not be normalized (missing or empty alignment).
    Adaptation,
    /// A job or dataset invariant is violated.
    Validation,
    /// The backend is missing required operator setup, e.g. no partition.
    Configuration,
    /// The backend rejected the job or produced unparseable output.
    Submission,
    /// The backend could not be asked for a status.
    Poll,
    NotFound,
    Conflict,
    InvalidArgument,
    /// The store was closed or a required CLI is not reachable.
    Unavailable,
    Internal,
}

impl AppErrorKind {
    /// Whether the kind points at operator misconfiguration or infrastructure
    /// rather than the caller's input.
    pub fn is_server_side(self) -> bool {
        matches!(
            self,
            AppErrorKind::Configuration
                | AppErrorKind::Submission
                | AppErrorKind::Poll
                | AppErrorKind::Unavailable
                | AppErrorKind::Internal
        )
    }
}

#[derive(Debug, Clone)]
pub struct AppError {
    kind: AppErrorKind,
    code: &'static str,
    message: String,
    context: Option<String>,
}

impl AppError {
    pub fn new(kind: AppErrorKind, code: &'static str) -> Self {
        Self {
            kind,
            code,
            message: code.to_string(),
            context: None,
        }
    }

    pub fn with_message(
        kind: AppErrorKind,
        code: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            code,
            message: message.into(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn kind(&self) -> AppErrorKind {
        self.kind
    }

    pub fn code(&self) -> &'static str {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    pub fn adaptation(message: impl Into<String>) -> Self {
        Self::with_message(AppErrorKind::Adaptation, codes::ADAPTATION_ERROR, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::with_message(AppErrorKind::Validation, codes::VALIDATION_ERROR, message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::with_message(
            AppErrorKind::Configuration,
            codes::CONFIGURATION_ERROR,
            message,
        )
    }

    pub fn submission(message: impl Into<String>) -> Self {
        Self::with_message(AppErrorKind::Submission, codes::SUBMISSION_ERROR, message)
    }

    pub fn poll(message: impl Into<String>) -> Self {
        Self::with_message(AppErrorKind::Poll, codes::POLL_ERROR, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::with_message(AppErrorKind::NotFound, codes::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::with_message(AppErrorKind::Conflict, codes::CONFLICT, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::with_message(
            AppErrorKind::InvalidArgument,
            codes::INVALID_ARGUMENT,
            message,
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::with_message(AppErrorKind::Internal, codes::INTERNAL_ERROR, message)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ctx) = &self.context {
            write!(f, "{} ({})", self.message, ctx)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_appends_context() {
        let err = AppError::poll("squeue failed").with_context("get_status job=abc");
        assert_eq!(err.to_string(), "squeue failed (get_status job=abc)");
        assert_eq!(err.kind(), AppErrorKind::Poll);
        assert_eq!(err.code(), codes::POLL_ERROR);
    }

    #[test]
    fn new_uses_code_as_message() {
        let err = AppError::new(AppErrorKind::Unavailable, codes::STORE_CLOSED);
        assert_eq!(err.message(), "store_closed");
        assert!(err.context().is_none());
    }

    #[test]
    fn server_side_kinds_exclude_caller_errors() {
        assert!(AppErrorKind::Configuration.is_server_side());
        assert!(AppErrorKind::Poll.is_server_side());
        assert!(!AppErrorKind::Validation.is_server_side());
        assert!(!AppErrorKind::Adaptation.is_server_side());
        assert!(!AppErrorKind::NotFound.is_server_side());
    }
}
