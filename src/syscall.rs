//! System-call dispatch (C14, §4.14): one entry point that validates a
//! call's identifier and access rights before running it, and returns the
//! unified `(status, OUT regs)` convention every other module already
//! speaks through [`crate::error::KResult`]/[`crate::error::OutRegs`].
use crate::{
    cfg::{HmAction, OperatingMode, QueueDiscipline, StartCondition},
    error::{ErrorKind, KResult, OutRegs},
    id::{AlarmId, CounterId, CpuId, HmErrorId, KlddId, PartitionId, RpcId, ScheduleTableId, ShmId, TaskId, WaitQueueId},
    kernel::Kernel,
    time::{Time, Timeout},
};

/// Every system call the core exposes (§4.14). Each carries exactly the
/// arguments its handler needs; the caller's identity and current time are
/// threaded through [`Kernel::syscall`] separately since every call needs
/// them for validation.
#[derive(Debug, Clone, Copy)]
pub enum Syscall {
    TaskActivate(TaskId),
    TaskTerminate,
    TaskChain(TaskId),
    EvSet(TaskId, u32),
    EvGet(TaskId),
    EvClear(TaskId, u32),
    EvWaitGetClear { wait_mask: u32, clear_mask: u32, timeout: Timeout },
    IpevSet(TaskId, u32),
    AlarmBase(CounterId),
    AlarmGet(AlarmId),
    AlarmSetRel(AlarmId, u64, u64),
    AlarmSetAbs(AlarmId, u64, u64),
    AlarmCancel(AlarmId),
    CtrIncrement(CounterId, u64),
    CtrGet(CounterId),
    CtrElapsed(CounterId, u64),
    SchedTabStartRel(ScheduleTableId, u64),
    SchedTabStartAbs(ScheduleTableId, u64),
    SchedTabSync(ScheduleTableId, i64),
    SchedTabNext(ScheduleTableId),
    SchedTabStop(ScheduleTableId),
    SchedTabGetState(ScheduleTableId),
    WqSetDiscipline(WaitQueueId, QueueDiscipline),
    WqWait(WaitQueueId, Timeout),
    WqWake(WaitQueueId),
    WqUnblock(TaskId),
    WqSleep(Timeout),
    RpcCall(RpcId, usize, Timeout),
    RpcReply(RpcId, usize, bool),
    ShmIterate(ShmId),
    KlddCall(KlddId, usize, usize, usize),
    HmInject(HmErrorId),
    HmChange(HmErrorId, HmAction),
    HmLog,
    Shutdown,
    GetTime,
    WaitPeriodic,
    Replenish,
    PartSelf,
    PartGetOperatingMode(PartitionId),
    PartSetOperatingMode(PartitionId, OperatingMode),
    PartSetOperatingModeEx(PartitionId, OperatingMode, StartCondition),
    PartGetStartCondition(PartitionId),
    FastPrioSync,
}

impl<B: crate::board::Board> Kernel<B> {
    /// Dispatch one system call on behalf of `caller`, running on `cpu` at
    /// time `now`. Identifier and access validation (§4.14 step order:
    /// identifier, then access, then value) happens inside each handler,
    /// since what counts as "access" differs per object kind; this entry
    /// point only fixes the calling convention.
    pub fn syscall(&self, now: Time, cpu: CpuId, caller: TaskId, call: Syscall) -> KResult<OutRegs> {
        // §4.16: every kernel entry implicitly adopts whatever priority the
        // caller last wrote to its fast-sync block, not only the explicit
        // `FastPrioSync` call. A task with no bound block (or one not yet
        // bound to it) just has nothing to adopt.
        let _ = self.fast_prio_sync(caller);

        match call {
            Syscall::TaskActivate(t) => self.task_activate(now, t).map(|()| OutRegs::NONE),
            Syscall::TaskTerminate => self.task_terminate_self(now, caller).map(|()| OutRegs::NONE),
            Syscall::TaskChain(t) => self.task_chain(now, caller, t).map(|()| OutRegs::NONE),

            Syscall::EvSet(t, mask) => self.event_set(t, mask).map(|()| OutRegs::NONE),
            Syscall::EvGet(t) => self.event_get(t).map(|v| OutRegs::one(v as usize)),
            Syscall::EvClear(t, mask) => self.event_clear(t, mask).map(|()| OutRegs::NONE),
            Syscall::EvWaitGetClear { wait_mask, clear_mask, timeout } => self
                .event_wait_get_clear(now, cpu, caller, wait_mask, clear_mask, timeout)
                .map(|v| OutRegs::one(v as usize)),

            Syscall::IpevSet(target, bit) => self.ipev_set(caller, target, bit).map(|()| OutRegs::NONE),

            Syscall::AlarmBase(c) => self.alarm_base(c),
            Syscall::AlarmGet(a) => self.alarm_get(a).map(|v| OutRegs::one(v as usize)),
            Syscall::AlarmSetRel(a, inc, cycle) => self.alarm_set_rel(a, inc, cycle).map(|()| OutRegs::NONE),
            Syscall::AlarmSetAbs(a, start, cycle) => self.alarm_set_abs(a, start, cycle).map(|()| OutRegs::NONE),
            Syscall::AlarmCancel(a) => self.alarm_cancel(a).map(|()| OutRegs::NONE),

            Syscall::CtrIncrement(c, ticks) => self.counter_increment(cpu, c, ticks).map(|()| OutRegs::NONE),
            Syscall::CtrGet(c) => self.counter_get(c).map(|v| OutRegs::one(v as usize)),
            Syscall::CtrElapsed(c, since) => self.counter_elapsed(c, since).map(|v| OutRegs::one(v as usize)),

            Syscall::SchedTabStartRel(s, offset) => self.schedtab_start_rel(s, offset).map(|()| OutRegs::NONE),
            Syscall::SchedTabStartAbs(s, at) => self.schedtab_start(cpu, s, at).map(|()| OutRegs::NONE),
            Syscall::SchedTabSync(s, dev) => self.schedtab_sync(s, dev).map(|()| OutRegs::NONE),
            Syscall::SchedTabNext(s) => self.schedtab_next(s),
            Syscall::SchedTabStop(s) => self.schedtab_stop(s).map(|()| OutRegs::NONE),
            Syscall::SchedTabGetState(s) => self.schedtab_get_state(s).map(|st| OutRegs::one(st as usize)),

            Syscall::WqSetDiscipline(wq, d) => self.wq_set_discipline(wq, d).map(|()| OutRegs::NONE),
            Syscall::WqWait(wq, timeout) => {
                self.wq_wait(now, cpu, caller, wq, timeout).map(|()| OutRegs::NONE)
            }
            Syscall::WqWake(wq) => self.wq_wake(wq).map(|()| OutRegs::NONE),
            Syscall::WqUnblock(t) => self.wq_unblock(t).map(|()| OutRegs::NONE),
            Syscall::WqSleep(timeout) => self.wq_sleep(now, cpu, caller, timeout).map(|()| OutRegs::NONE),

            Syscall::RpcCall(rpc, arg, timeout) => {
                self.rpc_call(now, cpu, caller, rpc, arg, timeout).map(|()| OutRegs::NONE)
            }
            Syscall::RpcReply(rpc, value, terminate) => {
                self.rpc_reply(now, caller, rpc, value, terminate).map(|()| OutRegs::NONE)
            }

            Syscall::ShmIterate(shm) => self.shm_iterate(caller, shm),
            Syscall::KlddCall(kldd, a, b, c) => self.kldd_call(caller, kldd, a, b, c),

            Syscall::HmInject(id) => {
                let part = self.partition_self(caller).ok();
                self.hm_inject(now, cpu, id, part);
                Ok(OutRegs::NONE)
            }
            Syscall::HmChange(id, action) => self.hm_change(id, action).map(|()| OutRegs::NONE),
            Syscall::HmLog => {
                self.hm_log("application request");
                Ok(OutRegs::NONE)
            }

            Syscall::Shutdown => B::halt(crate::board::HaltMode::Shutdown),
            Syscall::GetTime => Ok(OutRegs::one(B::get_time() as usize)),
            Syscall::WaitPeriodic => self.wait_periodic(now, cpu, caller).map(|()| OutRegs::NONE),
            Syscall::Replenish => self.replenish(now, caller).map(|()| OutRegs::NONE),

            Syscall::PartSelf => self.partition_self(caller).map(|p| OutRegs::one(p.index())),
            Syscall::PartGetOperatingMode(p) => {
                self.partition_get_operating_mode(p).map(|m| OutRegs::one(m as usize))
            }
            Syscall::PartSetOperatingMode(p, m) => {
                self.partition_set_operating_mode(now, p, m).map(|()| OutRegs::NONE)
            }
            Syscall::PartSetOperatingModeEx(p, m, cond) => {
                self.partition_set_operating_mode_ex(p, m, cond).map(|()| OutRegs::NONE)
            }
            Syscall::PartGetStartCondition(p) => {
                self.partition_get_start_condition(p).map(|c| OutRegs::one(c as usize))
            }

            Syscall::FastPrioSync => self.fast_prio_sync(caller).map(|()| OutRegs::NONE),
        }
    }

    /// `ipev_set(target, bit)` (§4.14): raise an inter-partition event bit,
    /// permitted only when `target` is listed in the caller's partition's
    /// configured `ipev_targets` (§3) — the cross-partition analogue of the
    /// access check every other handler does against its own object kind.
    fn ipev_set(&self, caller: TaskId, target: TaskId, bit: u32) -> KResult {
        let caller_cfg = self.cfg.task(caller).ok_or(ErrorKind::Id)?;
        let part_cfg = self.cfg.partition(caller_cfg.partition).ok_or(ErrorKind::Id)?;
        if !part_cfg.ipev_targets.contains(&target) {
            return Err(ErrorKind::Access);
        }
        self.event_set(target, bit)
    }

    /// `alarm_base(counter_id)` (§4.14): publish a counter's static
    /// parameters (ticks-per-base, modulus, minimum cycle) for application
    /// code to compute alarm offsets against.
    fn alarm_base(&self, id: CounterId) -> KResult<OutRegs> {
        let cfg = self.cfg.counter(id).ok_or(ErrorKind::Id)?;
        Ok(OutRegs(cfg.ticks_per_base as usize, cfg.max_allowed as usize, cfg.min_cycle as usize))
    }

    /// `schedtab_next(table_id)` (§4.14): the table chained after this one
    /// completes, if any.
    fn schedtab_next(&self, id: ScheduleTableId) -> KResult<OutRegs> {
        let cfg = self.cfg.schedule_table(id).ok_or(ErrorKind::Id)?;
        Ok(match cfg.next {
            Some(next) => OutRegs::one(next.index()),
            None => OutRegs::NONE,
        })
    }

    /// `shm_iterate(shm_id)` (§4.14): look up a shared-memory window's
    /// `(base, size)`, permitted only for partitions the offline toolchain
    /// granted access to it.
    fn shm_iterate(&self, caller: TaskId, shm: ShmId) -> KResult<OutRegs> {
        let caller_cfg = self.cfg.task(caller).ok_or(ErrorKind::Id)?;
        let part_cfg = self.cfg.partition(caller_cfg.partition).ok_or(ErrorKind::Id)?;
        if !part_cfg.shm_accesses.contains(&shm) {
            return Err(ErrorKind::Access);
        }
        let cfg = self.cfg.shms.get(shm.index()).ok_or(ErrorKind::Id)?;
        Ok(OutRegs::two(cfg.base, cfg.size))
    }

    /// `kldd_call(kldd_id, a, b, c)` (§4.14): invoke a kernel-level device
    /// driver entry point on the caller's behalf.
    fn kldd_call(&self, caller: TaskId, kldd: KlddId, a: usize, b: usize, c: usize) -> KResult<OutRegs> {
        let caller_cfg = self.cfg.task(caller).ok_or(ErrorKind::Id)?;
        let part_cfg = self.cfg.partition(caller_cfg.partition).ok_or(ErrorKind::Id)?;
        if !part_cfg.kldd_entries.contains(&kldd) {
            return Err(ErrorKind::Access);
        }
        let cfg = self.cfg.kldds.get(kldd.index()).ok_or(ErrorKind::Id)?;
        Ok(OutRegs::one((cfg.entry)(a, b, c)))
    }

    /// `sys_wait_periodic()` (§4.14): sleep until this task's next periodic
    /// release, `last_activation + period`, rather than for a caller-given
    /// duration — the deadline-driven equivalent of `wq_sleep`.
    fn wait_periodic(&self, now: Time, cpu: CpuId, caller: TaskId) -> KResult {
        let cfg = self.cfg.task(caller).ok_or(ErrorKind::Id)?;
        let rt = self.task_rt(caller).ok_or(ErrorKind::Id)?;
        let next = rt.last_activation.get().wrapping_add(cfg.period.as_nanos() as u64);
        let remaining = next.saturating_sub(now);
        self.wq_sleep(now, cpu, caller, Timeout::from_nanos(remaining as i64))
    }

    /// `sys_replenish()` (§4.14): restart the caller's deadline monitor from
    /// now using its configured capacity, e.g. after an application-level
    /// checkpoint that wants a fresh deadline window.
    fn replenish(&self, now: Time, caller: TaskId) -> KResult {
        self.deadline_cancel(caller);
        let rt = self.task_rt(caller).ok_or(ErrorKind::Id)?;
        let cfg = self.cfg.task(caller).ok_or(ErrorKind::Id)?;
        rt.deadline_time.set(now.wrapping_add(cfg.capacity.as_nanos() as u64));
        rt.deadline_active.set(true);
        self.deadline_queue_insert(cfg.cpu, caller);
        Ok(())
    }
}
