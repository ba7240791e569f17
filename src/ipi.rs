//! Cross-core IPI job queue (C9): every object has exactly one owning CPU
//! (§5), so an operation targeting a remote CPU's object is never performed
//! directly — it is encoded as a small action and posted onto a bounded
//! per-(source, destination) ring for the destination to drain and apply
//! itself. Grounded on the original hypervisor's `ipi_state.h`, which pairs
//! a fixed `MAX_IPI_ACTIONS` ring with a tagged union per action; the ring
//! here is a safe `Cell`-array equivalent and the union becomes a Rust enum.
use core::cell::Cell;

use crate::{
    cfg::OperatingMode,
    error::{ErrorKind, KResult},
    id::{AlarmId, CounterId, CpuId, PartitionId, ScheduleTableId, TaskId, WaitQueueId},
    kernel::Kernel,
    time::Time,
};

/// Upper bound on simultaneously configured CPUs. Real boards in this
/// design's size class (embedded multicore, not a data-center host) stay
/// well under this.
pub const MAX_CPUS: usize = 8;

/// Physical ring depth; a link's *logical* capacity
/// ([`crate::cfg::IpiLinkCfg::capacity`]) must not exceed this.
const RING_LEN: usize = 64;

/// One remote action (§4.9), mirroring the original `IPI_ACTION_*` tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpiAction {
    None,
    Event { task: TaskId, bits: u32 },
    TaskActivate(TaskId),
    WqWake(WaitQueueId),
    CounterIncrement(CounterId, u64),
    AlarmFire(AlarmId),
    SchedTabSync(ScheduleTableId, i64),
    PartitionSetMode(PartitionId, OperatingMode),
    ScheduleChange(CpuId, ScheduleTableId),
}

impl Default for IpiAction {
    fn default() -> Self {
        Self::None
    }
}

struct Ring {
    buf: [Cell<IpiAction>; RING_LEN],
    write: Cell<u16>,
    read: Cell<u16>,
}

impl Ring {
    const INIT: Self = Self {
        buf: [const { Cell::new(IpiAction::None) }; RING_LEN],
        write: Cell::new(0),
        read: Cell::new(0),
    };

    fn occupancy(&self) -> u16 {
        self.write.get().wrapping_sub(self.read.get())
    }
}

unsafe impl Sync for Ring {}

pub struct IpiRt {
    rings: [[Ring; MAX_CPUS]; MAX_CPUS],
}

unsafe impl Sync for IpiRt {}

impl IpiRt {
    pub const INIT: Self = Self {
        rings: [const { [const { Ring::INIT }; MAX_CPUS] }; MAX_CPUS],
    };
}

impl Default for IpiRt {
    fn default() -> Self {
        Self::INIT
    }
}

impl<B: crate::board::Board> Kernel<B> {
    fn ipi_capacity(&self, src: CpuId, dst: CpuId) -> u16 {
        self.cfg
            .ipi_links
            .get(src as usize)
            .and_then(|row| row.get(dst as usize))
            .map(|link| link.capacity)
            .unwrap_or(0)
    }

    /// `ipi_post(src, dst, action)` (§4.9): enqueue a remote action, or
    /// apply it immediately if `dst` is the local CPU (the common case at
    /// call sites that don't yet know whether their target is local).
    pub fn ipi_post(&self, now: Time, src: CpuId, dst: CpuId, action: IpiAction) -> KResult {
        if src == dst {
            self.ipi_apply(now, action);
            return Ok(());
        }

        let cap = self.ipi_capacity(src, dst).min(RING_LEN as u16);
        if cap == 0 {
            return Err(ErrorKind::Access);
        }
        let ring = &self.ipi.rings[src as usize][dst as usize];
        if ring.occupancy() >= cap {
            return Err(ErrorKind::Limit);
        }
        let slot = (ring.write.get() as usize) % RING_LEN;
        ring.buf[slot].set(action);
        ring.write.set(ring.write.get().wrapping_add(1));
        B::ipi_broadcast(1u64 << dst);
        Ok(())
    }

    /// `kernel_ipi_handle(cpu)`: drain every inbound ring addressed to
    /// `cpu` and apply each action in arrival order. Called from the
    /// board's IPI interrupt handler.
    pub fn ipi_drain(&self, now: Time, cpu: CpuId) {
        for src in 0..self.cfg.num_cpus {
            if src == cpu {
                continue;
            }
            let ring = &self.ipi.rings[src as usize][cpu as usize];
            while ring.read.get() != ring.write.get() {
                let slot = (ring.read.get() as usize) % RING_LEN;
                let action = ring.buf[slot].get();
                ring.read.set(ring.read.get().wrapping_add(1));
                self.ipi_apply(now, action);
            }
        }
    }

    fn ipi_apply(&self, now: Time, action: IpiAction) {
        match action {
            IpiAction::None => {}
            IpiAction::Event { task, bits } => {
                let _ = self.event_set(task, bits);
            }
            IpiAction::TaskActivate(task) => {
                let _ = self.task_activate(now, task);
            }
            IpiAction::WqWake(wq) => {
                let _ = self.wq_wake(wq);
            }
            IpiAction::CounterIncrement(counter, ticks) => {
                if let Some(cfg) = self.cfg.counter(counter) {
                    let _ = self.counter_increment(cfg.cpu, counter, ticks);
                }
            }
            IpiAction::AlarmFire(alarm) => {
                if let Some(cfg) = self.cfg.alarm(alarm) {
                    self.alarm_fire(cfg.cpu, alarm);
                }
            }
            IpiAction::SchedTabSync(table, deviation) => {
                let _ = self.schedtab_sync(table, deviation);
            }
            IpiAction::PartitionSetMode(part, mode) => {
                let _ = self.partition_set_operating_mode(now, part, mode);
            }
            IpiAction::ScheduleChange(cpu, _table) => {
                self.reschedule(cpu);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_kernel;

    #[test]
    fn same_cpu_post_applies_immediately() {
        let k = test_kernel();
        let t = TaskId::new(0);
        k.ipi_post(0, 0, 0, IpiAction::TaskActivate(t)).unwrap();
        assert_eq!(k.task_rt(t).unwrap().state.get(), crate::task::TaskState::Ready);
    }

    #[test]
    fn cross_cpu_post_queues_until_drained() {
        let k = test_kernel();
        if k.cfg.num_cpus < 2 {
            return;
        }
        let t = TaskId::new(0);
        k.ipi_post(0, 0, 1, IpiAction::TaskActivate(t)).unwrap();
        assert_eq!(k.task_rt(t).unwrap().state.get(), crate::task::TaskState::Suspended);
        k.ipi_drain(0, 1);
        assert_eq!(k.task_rt(t).unwrap().state.get(), crate::task::TaskState::Ready);
    }
}
