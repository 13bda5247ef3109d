//! Runs a lesson's validator against a completed submission's scope.
//!
//! Validators are themselves small `core-lang` programs (§4.5, §9): rather
//! than modeling a host-callable `validate(scope, stdout)` function — this
//! language has no way to pass a live scope or string buffer as a call
//! argument — a validator runs as a top-level script sharing the
//! submission's own [`ExecutionScope`], with the captured stdout injected
//! as a pre-bound `stdout` string. The validator is expected to leave a
//! `passed` (bool) binding, and may optionally leave a `message` (str)
//! explaining the verdict.

use core_guardian::{ExecutionHooks, GuardianError};
use core_interp::{CapturedStdout, ExecutionError, ExecutionScope, Interpreter, Value};
use core_lang::{compile, LangError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidatorError {
    #[error("validator script failed to parse: {0}")]
    Syntax(#[from] LangError),
    #[error("validator script failed to run: {0}")]
    Execution(#[from] ExecutionError),
    #[error("validator did not set a 'passed' boolean")]
    MissingVerdict,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorVerdict {
    pub passed: bool,
    pub message: Option<String>,
}

struct NullHooks;
impl ExecutionHooks for NullHooks {
    fn on_operation(&mut self) -> Result<(), GuardianError> {
        Ok(())
    }
    fn on_call_depth(&mut self, _depth: u32) -> Result<(), GuardianError> {
        Ok(())
    }
}

/// Runs `source` (the compiled `validation.lang` body) against `scope`,
/// which already holds the submission's completed bindings. Validators
/// run with no resource ceiling of their own — they share the worker's
/// single wall-clock budget enforced one layer up by the Executor.
pub fn run_validator(
    source: &str,
    scope: &ExecutionScope,
    stdout: &CapturedStdout,
) -> Result<ValidatorVerdict, ValidatorError> {
    let program = compile(source)?;
    let mut scope = scope.clone();
    scope.insert("stdout", Value::str(stdout.clone()));

    let mut hooks = NullHooks;
    Interpreter::exec(&program, &scope, &mut hooks, None)?;

    match scope.get("passed") {
        Some(Value::Bool(passed)) => {
            let message = match scope.get("message") {
                Some(Value::Str(s)) => Some(s.to_string()),
                _ => None,
            };
            Ok(ValidatorVerdict { passed, message })
        }
        _ => Err(ValidatorError::MissingVerdict),
    }
}
