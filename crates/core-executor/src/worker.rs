//! The in-process worker side of the Executor's protocol (§4.4 steps
//! 2-6): reads one [`WorkerRequest`] from `reader`, runs it to completion
//! inside a [`core_guardian::ResourceGuardian`] session, and writes one
//! [`WorkerResponse`] to `writer`. Invoked from `sim-bin`'s `--worker`
//! branch — this module itself knows nothing about process spawning.

use std::io::{Read, Write};

use tracing::info;

use core_guardian::ResourceGuardian;
use core_interp::{ExecutionError, Interpreter, RestrictedEnvironment};
use core_lang::compile;
use core_vfs::Vfs;

use crate::validate::run_validator;
use crate::{ExecutionResult, Outcome, WorkerRequest, WorkerResponse};

pub fn run_worker(reader: &mut impl Read, writer: &mut impl Write) -> std::io::Result<()> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf)?;
    let request: WorkerRequest = match serde_json::from_slice(&buf) {
        Ok(r) => r,
        Err(e) => {
            let result = ExecutionResult {
                outcome: Outcome::RuntimeFailure,
                stdout: String::new(),
                diagnostic: Some(format!("malformed worker request: {e}")),
                validator: None,
            };
            return write_response(writer, result);
        }
    };

    let result = execute(&request);
    write_response(writer, result)
}

fn write_response(writer: &mut impl Write, result: ExecutionResult) -> std::io::Result<()> {
    let response = WorkerResponse(result);
    let payload = serde_json::to_vec(&response).expect("ExecutionResult always serializes");
    writer.write_all(&payload)
}

fn execute(request: &WorkerRequest) -> ExecutionResult {
    let program = match compile(&request.source) {
        Ok(program) => program,
        Err(e) => {
            return ExecutionResult {
                outcome: Outcome::SyntacticFailure,
                stdout: String::new(),
                diagnostic: Some(e.to_string()),
                validator: None,
            }
        }
    };

    let vfs = if request.grant_file_access { Some(Vfs::new()) } else { None };
    let scope = RestrictedEnvironment::bindings(vfs.as_ref());

    info!(target: "executor", max_operations = request.budget.max_operations, "entering guardian session");
    let mut session = ResourceGuardian::enter(request.budget);

    match run_on_grown_stack(&program, &scope, &mut session, vfs.clone()) {
        Ok(stdout) => {
            drop(session);
            let validator = run_validator(&load_validator_source(&request.validator_path), &scope, &stdout);
            match validator {
                Ok(verdict) => ExecutionResult {
                    outcome: Outcome::Success,
                    stdout,
                    diagnostic: None,
                    validator: Some(verdict),
                },
                Err(e) => ExecutionResult {
                    outcome: Outcome::RuntimeFailure,
                    stdout,
                    diagnostic: Some(format!("validator error: {e}")),
                    validator: None,
                },
            }
        }
        Err(err) => classify_failure(err),
    }
}

/// The tree-walking evaluator recurses one native stack frame per nested
/// call/expression; a learner's recursive function can reach the
/// RecursionGuard's logical depth ceiling only if the real OS stack
/// survives that long. `stacker::maybe_grow` transparently grows the
/// stack in 8 MiB increments so the logical guard, not a native SIGSEGV,
/// is what stops a deep-but-still-in-budget recursion (§4.3 RecursionGuard).
const STACK_RED_ZONE: usize = 256 * 1024;
const STACK_GROWTH_INCREMENT: usize = 8 * 1024 * 1024;

fn run_on_grown_stack(
    program: &core_lang::Program,
    scope: &core_interp::ExecutionScope,
    session: &mut core_guardian::GuardianSession,
    vfs: Option<Vfs>,
) -> Result<core_interp::CapturedStdout, ExecutionError> {
    stacker::maybe_grow(STACK_RED_ZONE, STACK_GROWTH_INCREMENT, || {
        Interpreter::exec(program, scope, session, vfs)
    })
}

fn classify_failure(err: ExecutionError) -> ExecutionResult {
    let outcome = match &err {
        ExecutionError::Security(_) => Outcome::SecurityViolation,
        ExecutionError::Resource(_) => Outcome::ResourceExceeded,
        ExecutionError::ProcessExitRequested => Outcome::ProcessExit,
        ExecutionError::Runtime(_) => Outcome::RuntimeFailure,
    };
    ExecutionResult {
        outcome,
        stdout: String::new(),
        diagnostic: Some(err.to_string()),
        validator: None,
    }
}

fn load_validator_source(path: &std::path::Path) -> String {
    std::fs::read_to_string(path).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_guardian::ResourceBudget;
    use std::io::Write as _;

    fn validator_file(src: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(src.as_bytes()).unwrap();
        file
    }

    #[test]
    fn successful_submission_runs_the_validator() {
        let validator = validator_file("passed = result == 42\nmessage = 'ok'\n");
        let request = WorkerRequest {
            source: "result = 6 * 7".to_string(),
            validator_path: validator.path().to_path_buf(),
            budget: ResourceBudget::default(),
            grant_file_access: false,
        };
        let result = execute(&request);
        assert_eq!(result.outcome, Outcome::Success);
        assert!(result.passed());
    }

    #[test]
    fn syntax_error_is_classified_before_execution() {
        let validator = validator_file("passed = True\n");
        let request = WorkerRequest {
            source: "def f(:\n    pass\n".to_string(),
            validator_path: validator.path().to_path_buf(),
            budget: ResourceBudget::default(),
            grant_file_access: false,
        };
        let result = execute(&request);
        assert_eq!(result.outcome, Outcome::SyntacticFailure);
    }

    #[test]
    fn blocked_import_is_a_security_violation() {
        let validator = validator_file("passed = True\n");
        let request = WorkerRequest {
            source: "import os".to_string(),
            validator_path: validator.path().to_path_buf(),
            budget: ResourceBudget::default(),
            grant_file_access: false,
        };
        let result = execute(&request);
        assert_eq!(result.outcome, Outcome::SecurityViolation);
    }

    #[test]
    fn runaway_loop_trips_the_operation_budget() {
        let validator = validator_file("passed = True\n");
        let request = WorkerRequest {
            source: "n = 0\nwhile True:\n    n += 1\n".to_string(),
            validator_path: validator.path().to_path_buf(),
            budget: ResourceBudget { max_operations: 50, ..ResourceBudget::default() },
            grant_file_access: false,
        };
        let result = execute(&request);
        assert_eq!(result.outcome, Outcome::ResourceExceeded);
    }

    #[test]
    fn response_round_trips_through_json() {
        let mut input = std::io::Cursor::new(b"not json".to_vec());
        let mut output = Vec::new();
        run_worker(&mut input, &mut output).unwrap();
        let WorkerResponse(result): WorkerResponse = serde_json::from_slice(&output).unwrap();
        assert_eq!(result.outcome, Outcome::RuntimeFailure);
    }
}
