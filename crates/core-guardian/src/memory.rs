//! Address-space limit enforcement. On `cfg(unix)` a hard `RLIMIT_AS` cap
//! is the primary backstop; cross-platform, a process-wide allocation
//! counter (`TrackingAllocator`, installed by the worker binary as its
//! `#[global_allocator]`) is sampled at each `on_operation` poll and fails
//! fast with `GuardianError::MemoryExceeded` — the faster-failing path on
//! platforms where `RLIMIT_AS` isn't available or isn't precise enough to
//! stop a single huge allocation before the OS would OOM-kill.

use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::GuardianError;

static ALLOCATED: AtomicUsize = AtomicUsize::new(0);

/// Drop-in `#[global_allocator]` that wraps `System`, adding nothing but a
/// running byte count so `MemoryGuard::check` has something to poll
/// regardless of platform. The worker binary installs this once for the
/// whole process; this crate only reads the counter it maintains.
pub struct TrackingAllocator;

unsafe impl GlobalAlloc for TrackingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = System.alloc(layout);
        if !ptr.is_null() {
            ALLOCATED.fetch_add(layout.size(), Ordering::Relaxed);
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        System.dealloc(ptr, layout);
        ALLOCATED.fetch_sub(layout.size(), Ordering::Relaxed);
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let new_ptr = System.realloc(ptr, layout, new_size);
        if !new_ptr.is_null() {
            ALLOCATED.fetch_sub(layout.size(), Ordering::Relaxed);
            ALLOCATED.fetch_add(new_size, Ordering::Relaxed);
        }
        new_ptr
    }
}

/// Current process-wide byte count, as tracked by whichever allocator
/// instance is actually installed as `#[global_allocator]`. Zero in a
/// process that never installed `TrackingAllocator`.
pub fn current_allocated_bytes() -> u64 {
    ALLOCATED.load(Ordering::Relaxed) as u64
}

#[cfg(unix)]
mod imp {
    use rlimit::Resource;
    use tracing::warn;

    pub struct MemoryGuardImpl {
        prior: Option<(u64, u64)>,
    }

    impl MemoryGuardImpl {
        pub fn enable(bytes: u64) -> Self {
            let prior = Resource::AS.get().ok();
            if let Err(e) = Resource::AS.set(bytes, bytes) {
                warn!(target: "guardian", error = %e, "failed to install RLIMIT_AS, relying on allocation sampling");
            }
            Self { prior }
        }
    }

    impl Drop for MemoryGuardImpl {
        fn drop(&mut self) {
            if let Some((soft, hard)) = self.prior {
                let _ = Resource::AS.set(soft, hard);
            }
        }
    }
}

#[cfg(not(unix))]
mod imp {
    pub struct MemoryGuardImpl;

    impl MemoryGuardImpl {
        pub fn enable(_bytes: u64) -> Self {
            Self
        }
    }
}

pub struct MemoryGuard {
    budget_bytes: u64,
    _imp: imp::MemoryGuardImpl,
}

impl MemoryGuard {
    pub fn enable(budget_bytes: u64) -> Self {
        Self { budget_bytes, _imp: imp::MemoryGuardImpl::enable(budget_bytes) }
    }

    /// Polled from `GuardianSession::on_operation` on every platform: the
    /// allocator counter is the only check here that can fail fast on one
    /// huge allocation before `RLIMIT_AS` (where present) or the OS's own
    /// OOM killer would act.
    pub fn check(&self) -> Result<(), GuardianError> {
        if current_allocated_bytes() > self.budget_bytes {
            Err(GuardianError::MemoryExceeded(self.budget_bytes))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracking_allocator_counts_allocations_and_trips_the_budget() {
        let allocator = TrackingAllocator;
        let layout = Layout::from_size_align(4096, 8).unwrap();
        let baseline = current_allocated_bytes();

        let ptr = unsafe { allocator.alloc(layout) };
        assert!(!ptr.is_null());
        assert_eq!(current_allocated_bytes(), baseline + 4096);

        let guard = MemoryGuard::enable(baseline);
        assert!(matches!(guard.check(), Err(GuardianError::MemoryExceeded(_))));

        unsafe { allocator.dealloc(ptr, layout) };
        assert_eq!(current_allocated_bytes(), baseline);
        assert!(guard.check().is_ok());
    }
}
