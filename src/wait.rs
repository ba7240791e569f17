//! Wait queues (C6): the blocking primitive underneath events, RPC and
//! application-level synchronization, with a configurable FIFO-or-priority
//! wake order (§4.6). A waiter's resumption status — normal wake, timeout,
//! or forced release — is communicated back to it through
//! [`crate::task::TaskRt::wait_timed_out`]/[`crate::task::TaskRt::wait_state_error`]
//! rather than a payload carried on the wake call itself.
use core::cell::Cell;

use crate::{
    cfg::QueueDiscipline,
    error::{ErrorKind, KResult},
    id::{CpuId, TaskId, WaitQueueId, ID_NONE},
    kernel::Kernel,
    list::{Accessor, Index, Link, ListHead},
    task::TaskState,
    time::{Time, Timeout},
};

pub struct WaitQueueRt {
    pub head: Cell<ListHead>,
    /// Seeded from [`crate::cfg::WaitQueueCfg::discipline`] at boot
    /// ([`crate::kernel::Kernel::new`]); overridable at runtime by
    /// `wq_set_discipline` (§4.14).
    pub discipline: Cell<QueueDiscipline>,
}

unsafe impl Sync for WaitQueueRt {}

impl WaitQueueRt {
    pub const INIT: Self = Self {
        head: Cell::new(ListHead::EMPTY),
        discipline: Cell::new(QueueDiscipline::Fifo),
    };
}

impl Default for WaitQueueRt {
    fn default() -> Self {
        Self::INIT
    }
}

impl<B: crate::board::Board> Kernel<B> {
    #[inline]
    pub fn wait_queue_rt(&self, id: WaitQueueId) -> Option<&WaitQueueRt> {
        self.wait_queues.get(id.index())
    }

    fn wq_accessor<'a>(&'a self, id: WaitQueueId) -> Accessor<'a, impl Fn(Index) -> &'a Cell<Link> + 'a> {
        let head = &self.wait_queues[id.index()].head;
        Accessor::new(head, move |i| &self.tasks[i as usize].wait_link)
    }

    /// `wq_wait(wq_id, timeout)` (§4.6, §4.14): block the calling task on a
    /// wait queue. A zero timeout fails immediately rather than enqueue,
    /// matching the non-blocking convention in §5.
    pub fn wq_wait(&self, now: Time, cpu: CpuId, task: TaskId, wq: WaitQueueId, timeout: Timeout) -> KResult {
        if timeout.is_non_blocking() {
            return Err(ErrorKind::Timeout);
        }
        let wq_rt = self.wait_queue_rt(wq).ok_or(ErrorKind::Id)?;
        let rt = self.task_rt(task).ok_or(ErrorKind::Id)?;

        rt.wait_timed_out.set(false);
        rt.wait_state_error.set(false);
        rt.blocked_on.set(wq.0);
        rt.wait_prio.set(rt.current_prio.get());
        rt.state.set(TaskState::WaitWq);

        match wq_rt.discipline.get() {
            QueueDiscipline::Prio => {
                let tasks = self.tasks;
                self.wq_accessor(wq)
                    .insert_sorted(task.0, |a, b| {
                        tasks[a as usize].wait_prio.get() < tasks[b as usize].wait_prio.get()
                    });
            }
            QueueDiscipline::Fifo => self.wq_accessor(wq).push_back(task.0),
        }

        if let Some(expiry) = timeout.absolute(now) {
            rt.expiry_time.set(expiry);
            self.timeout_queue_insert(cpu, task);
        }
        Ok(())
    }

    /// `wq_set_discipline(wq_id, discipline)` (§4.14): change a wait queue's
    /// wake order. Rejected while tasks are already queued, since
    /// re-ordering a live queue would require re-sorting it against a
    /// discipline its current members never observed.
    pub fn wq_set_discipline(&self, wq: WaitQueueId, discipline: QueueDiscipline) -> KResult {
        let rt = self.wait_queue_rt(wq).ok_or(ErrorKind::Id)?;
        if !rt.head.get().is_empty() {
            return Err(ErrorKind::State);
        }
        rt.discipline.set(discipline);
        Ok(())
    }

    /// `wq_wake(wq_id)` (§4.14): wake the queue's front waiter (FIFO
    /// discipline) or highest-priority waiter (priority discipline).
    /// `NoFunc` if nobody is waiting, matching the idempotent-no-op
    /// convention.
    pub fn wq_wake(&self, wq: WaitQueueId) -> KResult {
        let Some(head) = self.wq_accessor(wq).first() else {
            return Err(ErrorKind::NoFunc);
        };
        self.wake_waiting_task(TaskId::new(head), false);
        Ok(())
    }

    /// `wq_unblock(task_id)` (§4.14, §5): force-wake a specific task
    /// regardless of its queue position, e.g. for application-directed
    /// cancellation. The sleeper resumes with
    /// [`crate::ErrorKind::State`] rather than a normal wake result.
    pub fn wq_unblock(&self, task: TaskId) -> KResult {
        let rt = self.task_rt(task).ok_or(ErrorKind::Id)?;
        if rt.blocked_on.get() == ID_NONE {
            return Err(ErrorKind::State);
        }
        self.wake_waiting_task(task, true);
        Ok(())
    }

    fn wake_waiting_task(&self, task: TaskId, state_error: bool) {
        let rt = self.task_rt(task).expect("valid task id");
        let wq = WaitQueueId::new(rt.blocked_on.get());
        let cfg = self.cfg.task(task).expect("valid task id");

        self.wq_accessor(wq).remove(task.0);
        rt.blocked_on.set(ID_NONE);
        // A waiting task's primary hook, if linked at all, can only be
        // linked into the timeout queue (it can't be ready while `WaitWq`).
        if rt.primary_link.get().is_linked() {
            self.timeout_queue_remove(cfg.cpu, task);
        }
        rt.current_prio.set(rt.wait_prio.get());
        rt.wait_state_error.set(state_error);
        rt.state.set(TaskState::Ready);
        self.ready_queue_push(cfg.cpu, task);
    }

    /// Timeout-queue expiry callback (§4.3): end a wait with
    /// [`crate::ErrorKind::Timeout`] instead of a wake.
    pub(crate) fn wait_timeout_fire(&self, task: TaskId) {
        let rt = self.task_rt(task).expect("valid task id");
        rt.wait_timed_out.set(true);
        if rt.blocked_on.get() != ID_NONE {
            let wq = WaitQueueId::new(rt.blocked_on.get());
            self.wq_accessor(wq).remove(task.0);
            rt.blocked_on.set(ID_NONE);
        }
        rt.current_prio.set(rt.wait_prio.get());
        rt.state.set(TaskState::Ready);
        let cfg = self.cfg.task(task).expect("valid task id");
        self.ready_queue_push(cfg.cpu, task);
    }

    /// `wq_sleep(ticks)` / `sys_wait_periodic` support (§4.14): block the
    /// calling task on no object at all, purely for the timeout to expire.
    pub fn wq_sleep(&self, now: Time, cpu: CpuId, task: TaskId, timeout: Timeout) -> KResult {
        if timeout.is_non_blocking() {
            return Ok(());
        }
        let rt = self.task_rt(task).ok_or(ErrorKind::Id)?;
        rt.wait_timed_out.set(false);
        rt.wait_state_error.set(false);
        rt.state.set(TaskState::WaitWq);
        if let Some(expiry) = timeout.absolute(now) {
            rt.expiry_time.set(expiry);
            self.timeout_queue_insert(cpu, task);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_kernel;

    #[test]
    fn wake_moves_waiter_back_to_ready() {
        let k = test_kernel();
        let t = TaskId::new(0);
        k.task_activate(0, t).unwrap();
        k.reschedule(0);
        let wq = WaitQueueId::new(0);
        k.wq_wait(0, 0, t, wq, Timeout::INFINITE).unwrap();
        assert_eq!(k.task_rt(t).unwrap().state.get(), TaskState::WaitWq);
        k.wq_wake(wq).unwrap();
        assert_eq!(k.task_rt(t).unwrap().state.get(), TaskState::Ready);
    }

    #[test]
    fn wake_on_empty_queue_is_nofunc() {
        let k = test_kernel();
        assert_eq!(k.wq_wake(WaitQueueId::new(0)), Err(ErrorKind::NoFunc));
    }

    #[test]
    fn zero_timeout_never_blocks() {
        let k = test_kernel();
        let t = TaskId::new(0);
        k.task_activate(0, t).unwrap();
        assert_eq!(
            k.wq_wait(0, 0, t, WaitQueueId::new(0), Timeout::NON_BLOCKING),
            Err(ErrorKind::Timeout)
        );
    }
}
