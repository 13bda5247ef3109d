//! Executor (§4.4): runs one submission in an isolated child process and
//! classifies the result into the category table the Curriculum Provider
//! and Simulation Engine react to. Spawn-style, never fork — the worker
//! gets a fresh address space and inherits none of the parent's state,
//! grounded in the same "always restore, never assume" RAII discipline
//! `core-guardian` takes from `core-terminal::TerminalGuard`, here applied
//! to "always kill the child, even on the unhappy path."

mod validate;
mod worker;

pub use validate::{run_validator, ValidatorVerdict};
pub use worker::run_worker;

use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use core_guardian::ResourceBudget;

/// A deferred reference to a lesson's validator source. Only the path is
/// held at curriculum-load time (§4.5, §9 "dynamic validator loading") —
/// the `core-lang` source behind it is compiled lazily, on first
/// submission, and cached for the life of the worker process.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValidatorHandle {
    pub path: PathBuf,
}

impl ValidatorHandle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("failed to spawn worker process: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("failed to write request to worker stdin: {0}")]
    WriteRequest(#[source] std::io::Error),
    #[error("failed to read worker response: {0}")]
    ReadResponse(#[source] std::io::Error),
    #[error("worker response was not valid JSON: {0}")]
    MalformedResponse(#[source] serde_json::Error),
    #[error("worker exceeded its wall-clock budget of {0:?} and was killed")]
    Timeout(Duration),
    #[error("worker process exited without producing a response")]
    WorkerCrashed,
}

/// The outcome category a single run is classified into (§4.4 step 4, §7).
/// `Success`/`Failed` both mean the submission ran to completion; whether
/// the learner's code "passed" is a separate `ValidatorVerdict` carried
/// alongside, since a submission can run cleanly and still be wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Success,
    SyntacticFailure,
    SecurityViolation,
    ResourceExceeded,
    RuntimeFailure,
    ProcessExit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub outcome: Outcome,
    pub stdout: String,
    /// Learner-facing description of what happened — never a host path or
    /// internal detail (§7).
    pub diagnostic: Option<String>,
    /// Present only when `outcome == Success` and a validator ran.
    pub validator: Option<ValidatorVerdict>,
}

impl ExecutionResult {
    pub fn passed(&self) -> bool {
        matches!(&self.validator, Some(v) if v.passed)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WorkerRequest {
    pub source: String,
    pub validator_path: PathBuf,
    pub budget: ResourceBudget,
    pub grant_file_access: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WorkerResponse(pub ExecutionResult);

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Executor {
    /// Path to re-invoke for the worker side (`current_exe()` in
    /// production; overridable in tests so they don't need a real
    /// `--worker` binary).
    worker_exe: PathBuf,
    timeout: Duration,
}

impl Executor {
    pub fn new(worker_exe: PathBuf) -> Self {
        Self { worker_exe, timeout: DEFAULT_TIMEOUT }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Runs `source` against `budget`, dispatching to `validator` only
    /// when the submission itself completed successfully (§4.4 step 6).
    pub fn run(
        &self,
        source: &str,
        validator: &ValidatorHandle,
        budget: ResourceBudget,
        grant_file_access: bool,
    ) -> Result<ExecutionResult, ExecutorError> {
        let request = WorkerRequest {
            source: source.to_string(),
            validator_path: validator.path.clone(),
            budget,
            grant_file_access,
        };
        let payload = serde_json::to_vec(&request).expect("WorkerRequest always serializes");

        let mut child = Command::new(&self.worker_exe)
            .arg("--worker")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(ExecutorError::Spawn)?;

        let mut guard = ChildGuard::new(child);
        guard
            .child
            .stdin
            .take()
            .expect("stdin was piped")
            .write_all(&payload)
            .map_err(ExecutorError::WriteRequest)?;

        let (tx, rx) = mpsc::channel();
        let mut stdout = guard.child.stdout.take().expect("stdout was piped");
        thread::spawn(move || {
            let mut buf = Vec::new();
            let result = stdout.read_to_end(&mut buf).map(|_| buf);
            let _ = tx.send(result);
        });

        let started = Instant::now();
        match rx.recv_timeout(self.timeout) {
            Ok(Ok(buf)) => {
                guard.disarm();
                let elapsed = started.elapsed();
                info!(target: "executor", elapsed_ms = elapsed.as_millis() as u64, "worker completed");
                let WorkerResponse(result) =
                    serde_json::from_slice(&buf).map_err(ExecutorError::MalformedResponse)?;
                Ok(result)
            }
            Ok(Err(e)) => Err(ExecutorError::ReadResponse(e)),
            Err(mpsc::RecvTimeoutError::Timeout) => {
                warn!(target: "executor", timeout_ms = self.timeout.as_millis() as u64, "worker exceeded wall-clock budget, killing");
                Err(ExecutorError::Timeout(self.timeout))
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(ExecutorError::WorkerCrashed),
        }
    }
}

/// Kills the child on drop unless [`ChildGuard::disarm`] was called — the
/// "always kill, even on the unhappy path" counterpart to
/// `core-guardian`'s "always restore" RAII sessions.
struct ChildGuard {
    child: Child,
    armed: bool,
}

impl ChildGuard {
    fn new(child: Child) -> Self {
        Self { child, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if self.armed {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}
