//! Error taxonomy for a single execution. Mirrors the category split in
//! `original_source/sandbox/executor.py`'s worker: syntax failures never
//! reach this crate (they are rejected at `core_lang::compile` time),
//! security violations are distinguished from ordinary runtime exceptions,
//! and a resource-limit trip is layered on from `core-guardian` rather
//! than re-invented here.

use thiserror::Error;

use core_guardian::GuardianError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SecurityViolation {
    #[error("name '{0}' is not available in this sandbox")]
    DisallowedName(String),
    #[error("module '{0}' is not available in this sandbox")]
    BlockedImport(String),
    #[error("attribute '{0}' is not accessible in this sandbox")]
    DisallowedAttribute(String),
    #[error("'{name}' is blocked in this sandbox: {explanation}")]
    BlockedOperation { name: String, explanation: String },
}

#[derive(Debug, Error, Clone)]
pub enum ExecutionError {
    #[error(transparent)]
    Security(#[from] SecurityViolation),
    /// Any runtime exception a submission's own code can raise or trigger
    /// (`NameError`, `TypeError`, `ZeroDivisionError`, user `raise`
    /// statements, ...). Carries only a learner-facing message — never a
    /// host path or internal detail.
    #[error("{0}")]
    Runtime(String),
    #[error(transparent)]
    Resource(#[from] GuardianError),
    /// The submission called `exit()`/`quit()` or raised `SystemExit`.
    #[error("submission requested process exit")]
    ProcessExitRequested,
}

impl ExecutionError {
    pub fn runtime(exc_type: &str, message: impl std::fmt::Display) -> Self {
        ExecutionError::Runtime(format!("{exc_type}: {message}"))
    }

    /// The bare exception-type name, used to match `except <Name>` clauses.
    /// For `Runtime`, this is the `Type` half of the `Type: message` text
    /// `runtime()` always constructs.
    pub fn exc_type(&self) -> &str {
        match self {
            ExecutionError::Security(_) => "SecurityViolation",
            ExecutionError::Runtime(s) => s.split(':').next().unwrap_or("Exception").trim(),
            ExecutionError::Resource(_) => "ResourceLimitError",
            ExecutionError::ProcessExitRequested => "SystemExit",
        }
    }

    /// Security violations, resource-limit trips, and a requested process
    /// exit are not catchable by the sandboxed program's own `try/except`
    /// — only genuine language exceptions are, matching the original
    /// engine's categorization.
    pub fn is_catchable(&self) -> bool {
        matches!(self, ExecutionError::Runtime(_))
    }
}
