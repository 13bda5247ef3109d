//! CPU-time enforcement. `SIGXCPU`'s default disposition (process
//! termination) is ignored so a trip is observed and reported as a normal
//! `GuardianError` instead of the worker simply vanishing; actual
//! enforcement is a cooperative `getrusage` poll on every operation tick,
//! backed up by the Executor's wall-clock watchdog for anything that
//! never calls back into the interpreter at all.

use crate::GuardianError;

#[cfg(unix)]
mod imp {
    use nix::sys::resource::{getrusage, UsageWho};
    use nix::sys::signal::{signal, SigHandler, Signal};
    use tracing::warn;

    pub struct CpuGuardImpl {
        limit_secs: u64,
        previous_handler: Option<SigHandler>,
    }

    impl CpuGuardImpl {
        pub fn enable(limit_secs: u64) -> Self {
            let previous_handler = unsafe { signal(Signal::SIGXCPU, SigHandler::SigIgn) }
                .map_err(|e| warn!(target: "guardian", error = %e, "failed to install SIGXCPU handler"))
                .ok();
            Self { limit_secs, previous_handler }
        }

        pub fn check(&self) -> Result<(), super::GuardianError> {
            let usage = match getrusage(UsageWho::RUSAGE_SELF) {
                Ok(u) => u,
                Err(_) => return Ok(()), // best-effort; the watchdog still bounds wall time
            };
            let user = usage.user_time().tv_sec() as u64;
            let sys = usage.system_time().tv_sec() as u64;
            if user + sys >= self.limit_secs {
                Err(super::GuardianError::CpuExceeded(self.limit_secs))
            } else {
                Ok(())
            }
        }
    }

    impl Drop for CpuGuardImpl {
        fn drop(&mut self) {
            if let Some(prev) = self.previous_handler {
                let _ = unsafe { signal(Signal::SIGXCPU, prev) };
            }
        }
    }
}

#[cfg(not(unix))]
mod imp {
    pub struct CpuGuardImpl {
        limit_secs: u64,
        started: std::time::Instant,
    }

    impl CpuGuardImpl {
        pub fn enable(limit_secs: u64) -> Self {
            Self { limit_secs, started: std::time::Instant::now() }
        }

        pub fn check(&self) -> Result<(), super::GuardianError> {
            if self.started.elapsed().as_secs() >= self.limit_secs {
                Err(super::GuardianError::CpuExceeded(self.limit_secs))
            } else {
                Ok(())
            }
        }
    }
}

pub struct CpuGuard(imp::CpuGuardImpl);

impl CpuGuard {
    pub fn enable(limit_secs: u64) -> Self {
        Self(imp::CpuGuardImpl::enable(limit_secs))
    }

    pub fn check(&self) -> Result<(), GuardianError> {
        self.0.check()
    }
}
