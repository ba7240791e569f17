//! Events (C7): a per-task 32-bit pending/wait mask, the lightest blocking
//! primitive in the core (§4.7). Unlike a wait queue, an event is owned by
//! exactly the task that waits on it, so there is no shared queue to manage
//! — just the task's own [`crate::task::TaskRt`] fields.
use crate::{
    error::{ErrorKind, KResult},
    id::{CpuId, TaskId},
    kernel::Kernel,
    task::TaskState,
    time::{Time, Timeout},
};

impl<B: crate::board::Board> Kernel<B> {
    /// `ev_set(task_id, mask)` (§4.14): raise bits in `task`'s pending mask,
    /// waking it if it is currently waiting on any of them.
    pub fn event_set(&self, task: TaskId, mask: u32) -> KResult {
        let rt = self.task_rt(task).ok_or(ErrorKind::Id)?;
        rt.ev_pending.set(rt.ev_pending.get() | mask);

        if rt.state.get() == TaskState::WaitEv && rt.ev_pending.get() & rt.ev_wait_mask.get() != 0 {
            let cfg = self.cfg.task(task).ok_or(ErrorKind::Id)?;
            let result = rt.ev_pending.get() & rt.ev_wait_mask.get();
            rt.ev_pending.set(rt.ev_pending.get() & !rt.ev_clear_mask.get());
            rt.out.set(crate::error::OutRegs::one(result as usize));
            if rt.primary_link.get().is_linked() {
                self.timeout_queue_remove(cfg.cpu, task);
            }
            rt.current_prio.set(rt.wait_prio.get());
            rt.state.set(TaskState::Ready);
            self.ready_queue_push(cfg.cpu, task);
        }
        Ok(())
    }

    pub fn event_get(&self, task: TaskId) -> KResult<u32> {
        Ok(self.task_rt(task).ok_or(ErrorKind::Id)?.ev_pending.get())
    }

    /// `ev_clear(task_id, mask)` (§4.14).
    pub fn event_clear(&self, task: TaskId, mask: u32) -> KResult {
        let rt = self.task_rt(task).ok_or(ErrorKind::Id)?;
        rt.ev_pending.set(rt.ev_pending.get() & !mask);
        Ok(())
    }

    /// `ev_wait_get_clear(wait_mask, clear_mask, timeout)` (§4.14): block
    /// the calling task until any bit in `wait_mask` becomes pending, then
    /// return the masked snapshot and clear `clear_mask` from the pending
    /// set. If a bit is already pending, this returns immediately instead
    /// of blocking.
    pub fn event_wait_get_clear(
        &self,
        now: Time,
        cpu: CpuId,
        task: TaskId,
        wait_mask: u32,
        clear_mask: u32,
        timeout: Timeout,
    ) -> KResult<u32> {
        let rt = self.task_rt(task).ok_or(ErrorKind::Id)?;

        if rt.ev_pending.get() & wait_mask != 0 {
            let result = rt.ev_pending.get() & wait_mask;
            rt.ev_pending.set(rt.ev_pending.get() & !clear_mask);
            return Ok(result);
        }
        if timeout.is_non_blocking() {
            return Err(ErrorKind::Timeout);
        }

        rt.wait_timed_out.set(false);
        rt.wait_state_error.set(false);
        rt.ev_wait_mask.set(wait_mask);
        rt.ev_clear_mask.set(clear_mask);
        rt.wait_prio.set(rt.current_prio.get());
        rt.state.set(TaskState::WaitEv);
        if let Some(expiry) = timeout.absolute(now) {
            rt.expiry_time.set(expiry);
            self.timeout_queue_insert(cpu, task);
        }
        // The caller resumes here on a later scheduler pass; `rt.out` then
        // holds the snapshot `event_set` computed, or `wait_timed_out` is
        // set if the timeout fired first.
        Ok(rt.out.get().0 as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_kernel;

    #[test]
    fn set_wakes_matching_waiter() {
        let k = test_kernel();
        let t = TaskId::new(0);
        k.task_activate(0, t).unwrap();
        k.reschedule(0);
        k.event_wait_get_clear(0, 0, t, 0b0010, 0b0010, Timeout::INFINITE)
            .unwrap();
        assert_eq!(k.task_rt(t).unwrap().state.get(), TaskState::WaitEv);
        k.event_set(t, 0b0010).unwrap();
        assert_eq!(k.task_rt(t).unwrap().state.get(), TaskState::Ready);
        assert_eq!(k.event_get(t).unwrap(), 0);
    }

    #[test]
    fn already_pending_bit_returns_without_blocking() {
        let k = test_kernel();
        let t = TaskId::new(0);
        k.event_set(t, 0b0001).unwrap();
        let result = k
            .event_wait_get_clear(0, 0, t, 0b0001, 0b0001, Timeout::INFINITE)
            .unwrap();
        assert_eq!(result, 0b0001);
        assert_eq!(k.event_get(t).unwrap(), 0);
    }
}
