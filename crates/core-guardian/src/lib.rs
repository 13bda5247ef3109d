//! Resource Guardian: the composed set of guards a worker process enters
//! before running untrusted source and leaves (restoring whatever it
//! changed) no matter how execution ends.
//!
//! Grounded in `core-terminal::TerminalGuard`'s enter/leave-on-drop shape,
//! generalized from one guard (raw terminal mode) to four, entered in a
//! fixed order and torn down in the reverse order.

mod cpu;
mod memory;

use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;
use tracing::{info, warn};

pub use cpu::CpuGuard;
pub use memory::{current_allocated_bytes, MemoryGuard, TrackingAllocator};

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum GuardianError {
    #[error("memory budget of {0} bytes exceeded")]
    MemoryExceeded(u64),
    #[error("cpu time budget of {0}s exceeded")]
    CpuExceeded(u64),
    #[error("operation budget of {0} exceeded")]
    OperationsExceeded(u64),
    #[error("recursion depth budget of {0} exceeded")]
    RecursionExceeded(u32),
}

/// The seam `core-interp`'s evaluator calls into on every statement and
/// every function/method call. Implemented by `GuardianSession`; kept as
/// a trait so `core-interp` never needs to know this crate's internals,
/// only this contract.
pub trait ExecutionHooks {
    fn on_operation(&mut self) -> Result<(), GuardianError>;
    fn on_call_depth(&mut self, depth: u32) -> Result<(), GuardianError>;
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ResourceBudget {
    pub memory_bytes: u64,
    pub cpu_seconds: u64,
    pub max_operations: u64,
    pub recursion_depth: u32,
}

impl Default for ResourceBudget {
    fn default() -> Self {
        Self {
            memory_bytes: 100 * 1024 * 1024,
            cpu_seconds: 5,
            max_operations: 2_000_000,
            recursion_depth: 500,
        }
    }
}

struct RecursionGuard {
    limit: u32,
}

impl RecursionGuard {
    fn check(&self, depth: u32) -> Result<(), GuardianError> {
        if depth > self.limit {
            Err(GuardianError::RecursionExceeded(self.limit))
        } else {
            Ok(())
        }
    }
}

struct OperationGuard {
    limit: u64,
    count: AtomicU64,
}

impl OperationGuard {
    fn tick(&self) -> Result<(), GuardianError> {
        let n = self.count.fetch_add(1, Ordering::Relaxed) + 1;
        if n > self.limit {
            Err(GuardianError::OperationsExceeded(self.limit))
        } else {
            Ok(())
        }
    }
}

/// RAII session covering one worker execution. Guards are entered
/// Recursion -> Memory -> Cpu -> Operation and torn down in reverse;
/// recursion and operation checks are pure bookkeeping so they always
/// succeed to "enter", while memory and cpu may install and later
/// restore a platform limit.
pub struct GuardianSession {
    recursion: RecursionGuard,
    memory: MemoryGuard,
    cpu: CpuGuard,
    operation: OperationGuard,
}

pub struct ResourceGuardian;

impl ResourceGuardian {
    pub fn enter(budget: ResourceBudget) -> GuardianSession {
        info!(
            target: "guardian",
            memory_bytes = budget.memory_bytes,
            cpu_seconds = budget.cpu_seconds,
            max_operations = budget.max_operations,
            recursion_depth = budget.recursion_depth,
            "entering resource guardian session"
        );
        let recursion = RecursionGuard { limit: budget.recursion_depth };
        let memory = MemoryGuard::enable(budget.memory_bytes);
        let cpu = CpuGuard::enable(budget.cpu_seconds);
        let operation = OperationGuard { limit: budget.max_operations, count: AtomicU64::new(0) };
        GuardianSession { recursion, memory, cpu, operation }
    }
}

impl ExecutionHooks for GuardianSession {
    fn on_operation(&mut self) -> Result<(), GuardianError> {
        self.operation.tick()?;
        self.memory.check()?;
        self.cpu.check()
    }

    fn on_call_depth(&mut self, depth: u32) -> Result<(), GuardianError> {
        self.recursion.check(depth)
    }
}

impl Drop for GuardianSession {
    fn drop(&mut self) {
        // Field drop order (operation, cpu, memory, recursion) runs in
        // declaration-reverse automatically; memory/cpu restore their own
        // platform state in their own Drop impls. This log line is the
        // only extra teardown step the session itself performs.
        warn!(target: "guardian", "resource guardian session ended");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_budget_trips_past_limit() {
        let mut session = ResourceGuardian::enter(ResourceBudget {
            max_operations: 3,
            ..Default::default()
        });
        assert!(session.on_operation().is_ok());
        assert!(session.on_operation().is_ok());
        assert!(session.on_operation().is_ok());
        assert!(matches!(
            session.on_operation(),
            Err(GuardianError::OperationsExceeded(3))
        ));
    }

    #[test]
    fn recursion_budget_trips_past_limit() {
        let mut session = ResourceGuardian::enter(ResourceBudget {
            recursion_depth: 2,
            ..Default::default()
        });
        assert!(session.on_call_depth(1).is_ok());
        assert!(session.on_call_depth(2).is_ok());
        assert!(matches!(
            session.on_call_depth(3),
            Err(GuardianError::RecursionExceeded(2))
        ));
    }

    #[test]
    fn default_budget_matches_documented_values() {
        let budget = ResourceBudget::default();
        assert_eq!(budget.memory_bytes, 100 * 1024 * 1024);
        assert_eq!(budget.cpu_seconds, 5);
        assert_eq!(budget.max_operations, 2_000_000);
        assert_eq!(budget.recursion_depth, 500);
    }
}
