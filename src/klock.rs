//! CPU Lock: the kernel's sole mutual-exclusion mechanism.
//!
//! §5 ("Concurrency & resource model") gives each object a single owning
//! CPU and forbids cross-core synchronous access, so there is no need for a
//! cross-core lock. Within one CPU, the kernel still needs to protect its
//! ready/timeout/deadline queues against being re-entered by an interrupt
//! handler while a system call is mutating them; CPU Lock is that protection.
//!
//! Objects here are described by runtime configuration tables rather than by
//! the type system, and there can be several independent CPUs alive at once,
//! so a single global singleton token doesn't fit: each CPU gets its own lock
//! state, determined at boot, not compile time. [`CpuLockCell`] is a small
//! hand-rolled guard: a [`core::cell::UnsafeCell`] that can only be read or
//! written while holding a [`CpuLockToken`], obtained by
//! [`CpuLockToken::acquire`] and consumed by [`CpuLockToken::release`],
//! mirroring the acquire/release pair exposed as
//! [`crate::kernel::Kernel::acquire_cpu_lock`].
use core::{cell::UnsafeCell, fmt, sync::atomic::{AtomicBool, Ordering}};

/// Per-CPU "is CPU Lock active" flag. One of these lives in each
/// [`crate::sched::PerCpu`].
#[derive(Default)]
pub struct CpuLockState {
    active: AtomicBool,
}

impl CpuLockState {
    pub const fn new() -> Self {
        Self {
            active: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

/// Proof that CPU Lock is held on the current CPU. Cannot be cloned or
/// copied; `CpuLockCell::{read,write}` require a reference to one.
pub struct CpuLockToken<'a> {
    state: &'a CpuLockState,
}

impl<'a> CpuLockToken<'a> {
    /// Disable interrupts and mark CPU Lock active. Mirrors
    /// `PortThreading::enter_cpu_lock`, except the "disable interrupts" half
    /// is the caller's (the port's) responsibility — this only tracks the
    /// logical state.
    pub fn acquire(state: &'a CpuLockState) -> Result<Self, crate::error::ErrorKind> {
        if state
            .active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(crate::error::ErrorKind::State);
        }
        Ok(Self { state })
    }

    /// Borrow an already-active lock without re-acquiring it, for contexts
    /// (a syscall handler, `choose_next_running_task`) that are reached with
    /// CPU Lock already active.
    ///
    /// # Safety
    /// The caller must guarantee CPU Lock is presently active on this CPU.
    pub unsafe fn assume_active(state: &'a CpuLockState) -> Self {
        debug_assert!(state.is_active());
        Self { state }
    }

    pub fn release(self) {
        // `Drop` does the actual clearing; this just makes the intent explicit
        // at call sites, matching `release_cpu_lock`.
    }
}

impl Drop for CpuLockToken<'_> {
    fn drop(&mut self) {
        self.state.active.store(false, Ordering::Release);
    }
}

/// A cell that may only be read or written while the matching CPU's
/// [`CpuLockToken`] is held.
pub struct CpuLockCell<T> {
    inner: UnsafeCell<T>,
}

// Safety: access is gated by `CpuLockToken`, which is only held by the one
// CPU context that disabled its interrupts to get it.
unsafe impl<T: Send> Sync for CpuLockCell<T> {}

impl<T> CpuLockCell<T> {
    pub const fn new(value: T) -> Self {
        Self {
            inner: UnsafeCell::new(value),
        }
    }

    #[inline]
    pub fn read<'a>(&'a self, _token: &CpuLockToken<'a>) -> &'a T {
        // Safety: holding a live `CpuLockToken` for this CPU means no other
        // code on this CPU can be concurrently mutating the cell, and cross-
        // core access to this cell never happens (§5: single owning CPU).
        unsafe { &*self.inner.get() }
    }

    #[inline]
    pub fn write<'a>(&'a self, _token: &mut CpuLockToken<'a>) -> &'a mut T {
        unsafe { &mut *self.inner.get() }
    }

    /// Escape hatch for initialization code that runs before any CPU Lock
    /// token exists (boot-time table population).
    ///
    /// # Safety
    /// The caller must guarantee no other reference to the cell is alive.
    pub unsafe fn get_mut_unchecked(&self) -> &mut T {
        &mut *self.inner.get()
    }
}

impl<T: fmt::Debug> fmt::Debug for CpuLockCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CpuLockCell(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn double_acquire_fails() {
        let state = CpuLockState::new();
        let tok1 = CpuLockToken::acquire(&state).unwrap();
        assert!(CpuLockToken::acquire(&state).is_err());
        tok1.release();
        assert!(CpuLockToken::acquire(&state).is_ok());
    }

    #[test]
    fn cell_roundtrip() {
        let state = CpuLockState::new();
        let cell = CpuLockCell::new(41);
        let mut tok = CpuLockToken::acquire(&state).unwrap();
        *cell.write(&mut tok) += 1;
        assert_eq!(*cell.read(&tok), 42);
    }
}
