//! RPC channels (C8): a synchronous call/reply port backed by a single
//! serializing Hook task, with a bounded queue of outstanding calls and
//! priority-floor elevation while a call is in flight (§4.8).
use core::cell::Cell;

use crate::{
    error::{ErrorKind, KResult},
    id::{CpuId, RpcId, TaskId, ID_NONE},
    kernel::Kernel,
    list::{Accessor, Index, Link, ListHead},
    task::TaskState,
    time::{Time, Timeout},
};

pub struct RpcRt {
    /// Calls waiting for the receiver to become free, ordered by the
    /// caller's elevated priority.
    queue: Cell<ListHead>,
    /// The caller presently being served, or `ID_NONE`.
    in_service: Cell<u16>,
    pending: Cell<u16>,
}

unsafe impl Sync for RpcRt {}

impl RpcRt {
    pub const INIT: Self = Self {
        queue: Cell::new(ListHead::EMPTY),
        in_service: Cell::new(ID_NONE),
        pending: Cell::new(0),
    };
}

impl Default for RpcRt {
    fn default() -> Self {
        Self::INIT
    }
}

impl<B: crate::board::Board> Kernel<B> {
    #[inline]
    pub fn rpc_rt(&self, id: RpcId) -> Option<&RpcRt> {
        self.rpcs.get(id.index())
    }

    fn rpc_queue_accessor<'a>(&'a self, id: RpcId) -> Accessor<'a, impl Fn(Index) -> &'a Cell<Link> + 'a> {
        let head = &self.rpcs[id.index()].queue;
        Accessor::new(head, move |i| &self.tasks[i as usize].wait_link)
    }

    /// `rpc_call(rpc_id, arg, timeout)` (§4.8, §4.14): queue a call and
    /// block the caller (`WaitSend`) until the receiver replies. The call's
    /// argument is delivered to the receiver through its `out` register the
    /// same way an event snapshot is (§4.7) — both are "data the kernel
    /// hands a newly-runnable task on its next dispatch".
    pub fn rpc_call(
        &self,
        now: Time,
        cpu: CpuId,
        caller: TaskId,
        rpc: RpcId,
        arg: usize,
        timeout: Timeout,
    ) -> KResult {
        let cfg = self.cfg.rpc(rpc).ok_or(ErrorKind::Id)?;
        let rt = self.rpc_rt(rpc).ok_or(ErrorKind::Id)?;
        if rt.pending.get() >= cfg.send_capacity as u16 {
            return Err(ErrorKind::Limit);
        }

        let receiver = self.cfg.rpc_receiver(rpc).ok_or(ErrorKind::Id)?;
        let receiver_cfg = self.cfg.task(receiver).ok_or(ErrorKind::Id)?;

        let caller_rt = self.task_rt(caller).ok_or(ErrorKind::Id)?;
        caller_rt.wait_timed_out.set(false);
        caller_rt.wait_state_error.set(false);
        caller_rt.out.set(crate::error::OutRegs::one(arg));
        caller_rt.wait_prio.set(caller_rt.current_prio.get());
        caller_rt.current_prio.set(
            caller_rt
                .current_prio
                .get()
                .max(cfg.floor_prio)
                .max(receiver_cfg.base_prio),
        );
        caller_rt.state.set(TaskState::WaitSend);

        let tasks = self.tasks;
        self.rpc_queue_accessor(rpc)
            .insert_sorted(caller.0, |a, b| {
                tasks[a as usize].current_prio.get() > tasks[b as usize].current_prio.get()
            });
        rt.pending.set(rt.pending.get() + 1);

        if let Some(expiry) = timeout.absolute(now) {
            caller_rt.expiry_time.set(expiry);
            self.timeout_queue_insert(cpu, caller);
        }

        if rt.in_service.get() == ID_NONE {
            self.rpc_dispatch_next(now, rpc);
        }
        Ok(())
    }

    fn rpc_dispatch_next(&self, now: Time, rpc: RpcId) {
        let rt = self.rpc_rt(rpc).expect("valid rpc id");
        let Some(next) = self.rpc_queue_accessor(rpc).first() else {
            return;
        };
        self.rpc_queue_accessor(rpc).remove(next);
        rt.in_service.set(next);

        let receiver = self.cfg.rpc_receiver(rpc).expect("valid rpc id");
        let caller_rt = self.task_rt(TaskId::new(next)).expect("valid task id");
        let receiver_rt = self.task_rt(receiver).expect("valid task id");
        receiver_rt.out.set(caller_rt.out.get());
        receiver_rt.rpc_peer.set(next);

        if receiver_rt.state.get() == TaskState::Suspended {
            let _ = self.task_activate(now, receiver);
        }
    }

    /// `rpc_reply(value, terminate)` (§4.14, §4.8): called by the receiving
    /// Hook task to answer the call presently in service, waking its caller
    /// with `value` in its `out` register. When `terminate` is set the
    /// receiver self-terminates (returns to `Suspended`) before the next
    /// queued call, if any, is dispatched, re-arming it for a fresh
    /// activation rather than running `task_terminate_self`'s general path
    /// — which would also drop the channel's queued callers (§9: terminate
    /// must preserve RPC queue identity).
    pub fn rpc_reply(&self, now: Time, receiver: TaskId, rpc: RpcId, value: usize, terminate: bool) -> KResult {
        let receiver_cfg = self.cfg.task(receiver).ok_or(ErrorKind::Id)?;
        if receiver_cfg.rpc.map(|r| r.id) != Some(rpc) {
            return Err(ErrorKind::Access);
        }
        let rt = self.rpc_rt(rpc).ok_or(ErrorKind::Id)?;
        let serving = rt.in_service.get();
        if serving == ID_NONE {
            return Err(ErrorKind::State);
        }

        let caller = TaskId::new(serving);
        let caller_rt = self.task_rt(caller).expect("valid task id");
        let caller_cfg = self.cfg.task(caller).expect("valid task id");

        if caller_rt.primary_link.get().is_linked() {
            self.timeout_queue_remove(caller_cfg.cpu, caller);
        }
        caller_rt.out.set(crate::error::OutRegs::one(value));
        caller_rt.current_prio.set(caller_rt.wait_prio.get());
        caller_rt.state.set(TaskState::Ready);
        self.ready_queue_push(caller_cfg.cpu, caller);

        rt.in_service.set(ID_NONE);
        rt.pending.set(rt.pending.get() - 1);

        if terminate {
            let receiver_rt = self.task_rt(receiver).expect("valid task id");
            receiver_rt.state.set(TaskState::Suspended);
        }

        self.rpc_dispatch_next(now, rpc);
        Ok(())
    }

    /// Drop every call still queued for `receiver`'s RPC port when it
    /// terminates unexpectedly (§4.10), delivering
    /// [`crate::ErrorKind::State`] to each stranded caller instead of
    /// leaving them blocked forever.
    pub(crate) fn rpc_drain_sendq(&self, receiver: TaskId) {
        let Some(cfg) = self.cfg.task(receiver) else { return };
        let Some(rpc_cfg) = cfg.rpc else { return };
        let rt = self.rpc_rt(rpc_cfg.id).expect("valid rpc id");

        while let Some(raw) = self.rpc_queue_accessor(rpc_cfg.id).pop_front() {
            let caller = TaskId::new(raw);
            let caller_rt = self.task_rt(caller).expect("valid task id");
            let caller_cfg = self.cfg.task(caller).expect("valid task id");
            if caller_rt.primary_link.get().is_linked() {
                self.timeout_queue_remove(caller_cfg.cpu, caller);
            }
            caller_rt.current_prio.set(caller_rt.wait_prio.get());
            caller_rt.wait_state_error.set(true);
            caller_rt.state.set(TaskState::Ready);
            self.ready_queue_push(caller_cfg.cpu, caller);
        }
        rt.pending.set(0);
        rt.in_service.set(ID_NONE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_kernel;

    #[test]
    fn call_activates_suspended_receiver() {
        let k = test_kernel();
        let rpc = RpcId::new(0);
        let caller = TaskId::new(0);
        let receiver = k.cfg.rpc_receiver(rpc).unwrap();
        k.rpc_call(0, 0, caller, rpc, 7, Timeout::INFINITE).unwrap();
        assert_eq!(k.task_rt(receiver).unwrap().state.get(), TaskState::Ready);
        assert_eq!(k.task_rt(caller).unwrap().state.get(), TaskState::WaitSend);
    }

    #[test]
    fn reply_wakes_caller_with_value() {
        let k = test_kernel();
        let rpc = RpcId::new(0);
        let caller = TaskId::new(0);
        let receiver = k.cfg.rpc_receiver(rpc).unwrap();
        k.rpc_call(0, 0, caller, rpc, 7, Timeout::INFINITE).unwrap();
        k.rpc_reply(0, receiver, rpc, 99, false).unwrap();
        assert_eq!(k.task_rt(caller).unwrap().state.get(), TaskState::Ready);
        assert_eq!(k.task_rt(caller).unwrap().out.get().0, 99);
        // `terminate=false` leaves the receiver exactly as `rpc_reply` found
        // it, free to serve another call in the same activation.
        assert_eq!(k.task_rt(receiver).unwrap().state.get(), TaskState::Ready);
    }

    #[test]
    fn terminate_reply_rearms_for_next_caller() {
        let k = test_kernel();
        let rpc = RpcId::new(0);
        let receiver = k.cfg.rpc_receiver(rpc).unwrap();
        let first = TaskId::new(0);
        let second = TaskId::new(1);
        k.rpc_call(0, 0, first, rpc, 1, Timeout::INFINITE).unwrap();
        k.rpc_call(0, 0, second, rpc, 2, Timeout::INFINITE).unwrap();
        k.task_rt(receiver).unwrap().state.set(TaskState::Running);
        k.rpc_reply(0, receiver, rpc, 10, true).unwrap();
        // The channel immediately re-armed for `second` instead of staying
        // `Suspended`, since a call was already queued.
        assert_eq!(k.task_rt(receiver).unwrap().state.get(), TaskState::Ready);
        assert_eq!(k.task_rt(receiver).unwrap().out.get().0, 2);
    }

    #[test]
    fn terminate_reply_suspends_with_no_next_caller() {
        let k = test_kernel();
        let rpc = RpcId::new(0);
        let caller = TaskId::new(0);
        let receiver = k.cfg.rpc_receiver(rpc).unwrap();
        k.rpc_call(0, 0, caller, rpc, 7, Timeout::INFINITE).unwrap();
        k.task_rt(receiver).unwrap().state.set(TaskState::Running);
        k.rpc_reply(0, receiver, rpc, 99, true).unwrap();
        assert_eq!(k.task_rt(receiver).unwrap().state.get(), TaskState::Suspended);
    }

    #[test]
    fn drain_sendq_marks_stranded_callers_with_state_error() {
        let k = test_kernel();
        let rpc = RpcId::new(0);
        let caller = TaskId::new(0);
        let receiver = k.cfg.rpc_receiver(rpc).unwrap();
        k.rpc_call(0, 0, caller, rpc, 7, Timeout::INFINITE).unwrap();
        // `caller` was dispatched straight to `recvq` (fast path); queue a
        // second caller so `rpc_drain_sendq` has something to actually drain.
        let second = TaskId::new(1);
        k.rpc_call(0, 0, second, rpc, 8, Timeout::INFINITE).unwrap();
        k.rpc_drain_sendq(receiver);
        assert!(k.task_rt(second).unwrap().wait_state_error.get());
        assert_eq!(k.task_rt(second).unwrap().state.get(), TaskState::Ready);
    }
}
