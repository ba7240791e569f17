//! Task lifecycle and state machine (C10).
//!
//! A task moves between dormant, waiting (split into the distinct wait
//! reasons of §3/§4.10 — activation, wait queue, event, RPC send, RPC
//! receive), ready, and running. Activation counting and deadline tracking
//! ride alongside the state byte rather than being derived from it.
use core::cell::Cell;

use crate::{
    board::Board,
    cfg::TaskKind,
    error::{ErrorKind, KResult, OutRegs},
    id::{TaskId, ID_NONE},
    kernel::Kernel,
    list::Link,
    time::Time,
};

/// A task's current state (§3, §4.10).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Suspended,
    WaitAct,
    WaitWq,
    WaitEv,
    WaitSend,
    WaitRecv,
    Ready,
    Running,
}

impl TaskState {
    pub const fn is_waiting(self) -> bool {
        matches!(
            self,
            Self::WaitAct | Self::WaitWq | Self::WaitEv | Self::WaitSend | Self::WaitRecv
        )
    }
}

/// Per-task runtime state (§3). Every field is a [`Cell`] because all
/// mutation happens on the task's single owning CPU while CPU Lock is held
/// (see [`crate::klock`]); the containing array of `TaskRt` is declared
/// `'static` by the integrator, which requires `Sync` even though nothing
/// here is actually accessed concurrently.
pub struct TaskRt {
    pub state: Cell<TaskState>,
    /// Queued re-activations beyond the one currently running, capped at
    /// the task's configured `max_activations` (§3, invariant: `0..=255`).
    pub pending_activations: Cell<u8>,
    pub current_prio: Cell<u8>,
    /// The priority at which the task is recorded as sleeping in a wait
    /// queue or RPC send queue (§3); distinct from `current_prio` so that a
    /// woken task resumes at its un-elevated priority unless a resource is
    /// still held.
    pub wait_prio: Cell<u8>,
    /// Linked into exactly one of {ready queue, timeout queue} at a time.
    pub primary_link: Cell<Link>,
    /// Linked into at most one wait queue (or RPC queue) at a time.
    pub wait_link: Cell<Link>,
    pub deadline_link: Cell<Link>,
    pub expiry_time: Cell<Time>,
    pub last_activation: Cell<Time>,
    pub deadline_time: Cell<Time>,
    pub deadline_active: Cell<bool>,
    pub ev_pending: Cell<u32>,
    pub ev_wait_mask: Cell<u32>,
    pub ev_clear_mask: Cell<u32>,
    /// The caller awaiting an RPC reply from this task (`ID_NONE` if none).
    pub rpc_peer: Cell<u16>,
    /// Which wait/RPC queue this task is presently enqueued in, or
    /// `ID_NONE`.
    pub blocked_on: Cell<u16>,
    /// Set by [`crate::sched::PerCpu`]'s timeout expiry when this task's
    /// wait was ended by its timeout rather than a wake; cleared on entry to
    /// every wait.
    pub wait_timed_out: Cell<bool>,
    /// Set when a wait was ended by a forced release — `wq_unblock` or an
    /// RPC port's sender queue being drained because its receiver
    /// terminated (§4.8, §4.11) — rather than a normal wake or timeout;
    /// the woken task's syscall return should report
    /// [`crate::ErrorKind::State`]. Cleared on entry to every wait.
    pub wait_state_error: Cell<bool>,
    /// Up to three simulated OUT registers (§4.14), e.g. the event snapshot
    /// delivered by `ev_wait_get_clear` or the RPC `(reply_id, send_arg)`
    /// pair.
    pub out: Cell<OutRegs>,
}

// Safety: every field is only touched by the task's owning CPU while that
// CPU's CpuLockToken is held (§5); see `crate::klock`.
unsafe impl Sync for TaskRt {}

impl TaskRt {
    pub const INIT: Self = Self {
        state: Cell::new(TaskState::Suspended),
        pending_activations: Cell::new(0),
        current_prio: Cell::new(0),
        wait_prio: Cell::new(0),
        primary_link: Cell::new(Link::UNLINKED),
        wait_link: Cell::new(Link::UNLINKED),
        deadline_link: Cell::new(Link::UNLINKED),
        expiry_time: Cell::new(0),
        last_activation: Cell::new(0),
        deadline_time: Cell::new(0),
        deadline_active: Cell::new(false),
        ev_pending: Cell::new(0),
        ev_wait_mask: Cell::new(0),
        ev_clear_mask: Cell::new(0),
        rpc_peer: Cell::new(ID_NONE),
        blocked_on: Cell::new(ID_NONE),
        wait_timed_out: Cell::new(false),
        wait_state_error: Cell::new(false),
        out: Cell::new(OutRegs::NONE),
    };
}

impl Default for TaskRt {
    fn default() -> Self {
        Self::INIT
    }
}

impl<B: Board> Kernel<B> {
    #[inline]
    pub fn task_rt(&self, id: TaskId) -> Option<&TaskRt> {
        self.tasks.get(id.index())
    }

    /// `task_activate(task_id)` (§4.10, §4.14): activate a task, or queue a
    /// re-activation if it is already live. Cross-core targets are expected
    /// to be forwarded by the caller via [`crate::ipi`] before reaching this
    /// function, which always executes on the target's owning CPU.
    pub fn task_activate(&self, now: Time, id: TaskId) -> KResult {
        let cfg = self.cfg.task(id).ok_or(ErrorKind::Id)?;
        let rt = self.task_rt(id).ok_or(ErrorKind::Id)?;

        let pending = rt.pending_activations.get();
        if pending >= cfg.max_activations {
            return Err(ErrorKind::Limit);
        }
        rt.pending_activations.set(pending + 1);

        if rt.state.get() == TaskState::Suspended {
            self.prepare_task_for_run(now, id);
        }
        Ok(())
    }

    /// Reset a dormant task to its configured entry point and put it on the
    /// ready queue (§4.10). The caller (`task_activate`, partition cold
    /// start, an alarm/schedule-table `TASK` action, IPI delivery) has
    /// already incremented `pending_activations` and confirmed the task was
    /// `Suspended`.
    pub(crate) fn prepare_task_for_run(&self, now: Time, id: TaskId) {
        let cfg = self.cfg.task(id).expect("valid task id");
        let rt = self.task_rt(id).expect("valid task id");

        let prio = if cfg.flags.contains(crate::cfg::TaskFlags::ELEVATE_ON_ACT) {
            cfg.elevated_prio
        } else {
            cfg.base_prio
        };
        rt.current_prio.set(prio);
        rt.wait_prio.set(prio);
        rt.last_activation.set(now);
        self.deadline_start(now, id);

        rt.state.set(TaskState::Ready);
        self.ready_queue_push(cfg.cpu, id);
        self.fast_sync_bind(id);
    }

    pub(crate) fn deadline_start(&self, now: Time, id: TaskId) {
        let cfg = self.cfg.task(id).expect("valid task id");
        let rt = self.task_rt(id).expect("valid task id");
        if cfg.capacity == crate::time::Duration::ZERO {
            rt.deadline_active.set(false);
            return;
        }
        let deadline = now.wrapping_add(cfg.capacity.as_nanos() as u64);
        rt.deadline_time.set(deadline);
        rt.deadline_active.set(true);
        self.deadline_queue_insert(cfg.cpu, id);
    }

    pub(crate) fn deadline_cancel(&self, id: TaskId) {
        let cfg = self.cfg.task(id).expect("valid task id");
        let rt = self.task_rt(id).expect("valid task id");
        if rt.deadline_active.get() {
            self.deadline_queue_remove(cfg.cpu, id);
            rt.deadline_active.set(false);
        }
    }

    /// `task_terminate()` (§4.10): terminate the calling task, re-activating
    /// it in place if a pending activation remains.
    pub fn task_terminate_self(&self, now: Time, id: TaskId) -> KResult {
        let cfg = self.cfg.task(id).ok_or(ErrorKind::Id)?;
        let rt = self.task_rt(id).ok_or(ErrorKind::Id)?;
        if rt.state.get() != TaskState::Running {
            return Err(ErrorKind::State);
        }

        self.deadline_cancel(id);

        let pending = rt.pending_activations.get();
        if pending > 0 {
            rt.pending_activations.set(pending - 1);
            self.prepare_task_for_run(now, id);
        } else {
            rt.state.set(TaskState::Suspended);
        }

        if cfg.kind == TaskKind::Isr {
            if let Some(line) = cfg.irq_line {
                B::irq_enable(line);
            }
        }

        if cfg.rpc.is_some() {
            self.rpc_drain_sendq(id);
        }

        Ok(())
    }

    /// `task_chain(task_id)` (§4.14): atomically terminate the caller and
    /// activate another task.
    pub fn task_chain(&self, now: Time, caller: TaskId, next: TaskId) -> KResult {
        self.task_terminate_self(now, caller)?;
        self.task_activate(now, next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{test_kernel, TestBoard};

    #[test]
    fn activation_limit_returns_limit() {
        let k = test_kernel();
        let t = TaskId::new(0);
        assert_eq!(k.task_activate(0, t), Ok(()));
        assert_eq!(k.task_activate(0, t), Ok(()));
        assert_eq!(k.task_activate(0, t), Ok(()));
        assert_eq!(k.task_activate(0, t), Err(ErrorKind::Limit));
        let _ = TestBoard::get_time();
    }

    #[test]
    fn first_activation_moves_suspended_to_ready() {
        let k = test_kernel();
        let t = TaskId::new(0);
        let rt = k.task_rt(t).unwrap();
        assert_eq!(rt.state.get(), TaskState::Suspended);
        k.task_activate(0, t).unwrap();
        assert_eq!(rt.state.get(), TaskState::Ready);
    }

    #[test]
    fn deadline_is_activation_time_plus_capacity() {
        let k = test_kernel();
        let t = TaskId::new(0);
        k.task_activate(1_000, t).unwrap();
        let rt = k.task_rt(t).unwrap();
        let cfg = k.cfg.task(t).unwrap();
        assert_eq!(rt.deadline_time.get(), 1_000 + cfg.capacity.as_nanos() as u64);
    }
}
