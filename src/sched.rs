//! Two-level scheduler: a cyclic time-partition schedule gates which
//! partition's tasks may run at all, and within the active window a
//! fixed-priority ready queue picks which task runs (§4.11).
//!
//! The ready queue pairs a [`PrioBitmap`] with one list per priority level so
//! that both "is anything ready" and "what's the highest ready priority" are
//! O(1).
use core::cell::Cell;

use crate::{
    board::Board,
    cfg::WindowFlags,
    id::{CpuId, TaskId, ID_NONE},
    klock::CpuLockState,
    list::{Accessor, Index, Link, ListHead, NIL},
    prio_bitmap::PrioBitmap,
    task::TaskState,
    time::Time,
    kernel::Kernel,
};

/// Per-CPU scheduling state (§3, "Per-CPU scheduling state").
pub struct PerCpu {
    pub lock: CpuLockState,
    ready_bitmap: Cell<PrioBitmap>,
    ready_heads: [Cell<ListHead>; 256],
    timeout_head: Cell<ListHead>,
    deadline_head: Cell<ListHead>,
    /// The task presently in [`TaskState::Running`] on this CPU, or
    /// `ID_NONE` while idling.
    pub running: Cell<u16>,
    tp_window: Cell<u16>,
    tp_window_expiry: Cell<Time>,
}

unsafe impl Sync for PerCpu {}

impl PerCpu {
    pub const INIT: Self = Self {
        lock: CpuLockState::new(),
        ready_bitmap: Cell::new(PrioBitmap::EMPTY),
        ready_heads: [const { Cell::new(ListHead::EMPTY) }; 256],
        timeout_head: Cell::new(ListHead::EMPTY),
        deadline_head: Cell::new(ListHead::EMPTY),
        running: Cell::new(ID_NONE),
        tp_window: Cell::new(0),
        tp_window_expiry: Cell::new(0),
    };

    pub fn running_task(&self) -> Option<TaskId> {
        let raw = self.running.get();
        (raw != ID_NONE).then(|| TaskId::new(raw))
    }
}

impl Default for PerCpu {
    fn default() -> Self {
        Self::INIT
    }
}

impl<B: Board> Kernel<B> {
    #[inline]
    pub fn per_cpu(&self, cpu: CpuId) -> &PerCpu {
        &self.cpus[cpu as usize]
    }

    fn ready_accessor<'a>(&'a self, cpu: CpuId, prio: u8) -> Accessor<'a, impl Fn(Index) -> &'a Cell<Link> + 'a> {
        let head = &self.per_cpu(cpu).ready_heads[prio as usize];
        Accessor::new(head, move |i| &self.tasks[i as usize].primary_link)
    }

    fn timeout_accessor<'a>(&'a self, cpu: CpuId) -> Accessor<'a, impl Fn(Index) -> &'a Cell<Link> + 'a> {
        let head = &self.per_cpu(cpu).timeout_head;
        Accessor::new(head, move |i| &self.tasks[i as usize].primary_link)
    }

    fn deadline_accessor<'a>(&'a self, cpu: CpuId) -> Accessor<'a, impl Fn(Index) -> &'a Cell<Link> + 'a> {
        let head = &self.per_cpu(cpu).deadline_head;
        Accessor::new(head, move |i| &self.tasks[i as usize].deadline_link)
    }

    pub(crate) fn ready_queue_push(&self, cpu: CpuId, task: TaskId) {
        let prio = self.tasks[task.index()].current_prio.get();
        self.ready_accessor(cpu, prio).push_back(task.0);
        let pc = self.per_cpu(cpu);
        let mut bm = pc.ready_bitmap.get();
        bm.set(prio);
        pc.ready_bitmap.set(bm);
    }

    pub(crate) fn ready_queue_remove(&self, cpu: CpuId, task: TaskId) {
        let prio = self.tasks[task.index()].current_prio.get();
        self.ready_accessor(cpu, prio).remove(task.0);
        if self.ready_accessor(cpu, prio).is_empty() {
            let pc = self.per_cpu(cpu);
            let mut bm = pc.ready_bitmap.get();
            bm.clear(prio);
            pc.ready_bitmap.set(bm);
        }
    }

    pub(crate) fn timeout_queue_insert(&self, cpu: CpuId, task: TaskId) {
        let tasks = self.tasks;
        self.timeout_accessor(cpu)
            .insert_sorted(task.0, |a, b| {
                tasks[a as usize].expiry_time.get() < tasks[b as usize].expiry_time.get()
            });
    }

    pub(crate) fn timeout_queue_remove(&self, cpu: CpuId, task: TaskId) {
        self.timeout_accessor(cpu).remove(task.0);
    }

    pub(crate) fn deadline_queue_insert(&self, cpu: CpuId, task: TaskId) {
        let tasks = self.tasks;
        self.deadline_accessor(cpu)
            .insert_sorted(task.0, |a, b| {
                tasks[a as usize].deadline_time.get() < tasks[b as usize].deadline_time.get()
            });
    }

    pub(crate) fn deadline_queue_remove(&self, cpu: CpuId, task: TaskId) {
        self.deadline_accessor(cpu).remove(task.0);
    }

    /// Pop every timeout that has expired by `now`, in expiry order,
    /// delivering [`crate::ErrorKind::Timeout`] to each waiter and moving it
    /// back onto the ready queue. Driven by [`crate::kernel::Kernel::tick`].
    pub(crate) fn expire_timeouts(&self, cpu: CpuId, now: Time) {
        loop {
            let Some(head) = self.timeout_accessor(cpu).first() else {
                break;
            };
            let task = TaskId::new(head);
            let rt = &self.tasks[head as usize];
            if rt.expiry_time.get() > now {
                break;
            }
            self.timeout_queue_remove(cpu, task);
            self.wait_timeout_fire(task);
        }
    }

    /// Run every deadline-monitoring check due by `now`: a task whose
    /// capacity has been exceeded without completing is an application
    /// error (§4.13) dispatched to the health monitor, not a scheduler
    /// decision.
    pub(crate) fn expire_deadlines(&self, cpu: CpuId, now: Time) {
        loop {
            let Some(head) = self.deadline_accessor(cpu).first() else {
                break;
            };
            let rt = &self.tasks[head as usize];
            if rt.deadline_time.get() > now {
                break;
            }
            rt.deadline_active.set(false);
            self.deadline_accessor(cpu).remove(head);
            self.hm_raise_task_error(TaskId::new(head), crate::error::ErrorKind::TaskActivationError);
        }
    }

    /// `sched_schedule()`: pick the next task to run on `cpu` and perform the
    /// context switch bookkeeping (state transitions, MPU programming). The
    /// actual register-context swap is the architecture layer's job; this
    /// only decides *which* task and updates kernel state accordingly.
    pub fn reschedule(&self, cpu: CpuId) {
        let pc = self.per_cpu(cpu);
        let tp_ok = self.tp_window_partition(cpu).is_some();
        let next = if tp_ok {
            pc.ready_bitmap.get().highest()
        } else {
            None
        };

        let prev = pc.running_task();
        let next_id = next.and_then(|prio| self.ready_accessor(cpu, prio).first());

        if prev.map(|p| p.0) == next_id {
            return;
        }

        if let Some(prev) = prev {
            let rt = &self.tasks[prev.index()];
            if rt.state.get() == TaskState::Running {
                rt.state.set(TaskState::Ready);
                self.ready_queue_push(cpu, prev);
            }
        }

        match next_id {
            Some(raw) => {
                let task = TaskId::new(raw);
                self.ready_queue_remove(cpu, task);
                self.tasks[task.index()].state.set(TaskState::Running);
                pc.running.set(raw);
                let cfg = self.cfg.task(task).expect("valid task id");
                B::mpu_task_switch(&cfg.region_set);
            }
            None => pc.running.set(ID_NONE),
        }
    }

    /// Which time partition is active in `cpu`'s current schedule window,
    /// given a cyclic schedule with at least one window; `None` if the CPU
    /// has no configured schedule (idle).
    pub fn tp_window_partition(&self, cpu: CpuId) -> Option<crate::id::TimePartitionId> {
        let sched = self.cfg.tp_schedules.get(cpu as usize)?;
        let window = sched.windows.get(self.per_cpu(cpu).tp_window.get() as usize)?;
        Some(window.time_partition)
    }

    /// Advance the time-partition window if `now` has reached the current
    /// window's expiry, wrapping back to the first window after the last.
    /// Returns `true` if a window boundary was crossed.
    pub fn tp_advance(&self, cpu: CpuId, now: Time) -> bool {
        let Some(sched) = self.cfg.tp_schedules.get(cpu as usize) else {
            return false;
        };
        if sched.windows.is_empty() {
            return false;
        }
        let pc = self.per_cpu(cpu);
        if now < pc.tp_window_expiry.get() {
            return false;
        }

        let prev_window = sched.windows[pc.tp_window.get() as usize];
        let next_idx = if prev_window.flags.contains(WindowFlags::LAST) {
            0
        } else {
            pc.tp_window.get() + 1
        };
        let next_window = sched.windows[next_idx as usize];

        pc.tp_window.set(next_idx);
        pc.tp_window_expiry
            .set(now.wrapping_add(next_window.duration.as_nanos() as u64));

        B::tp_switch(prev_window.time_partition, next_window.time_partition, next_window.flags.bits() as u32);
        if next_window.flags.contains(WindowFlags::RELEASE) {
            self.partition_release_window(next_window.time_partition);
        }
        true
    }

    /// `sched_init()`: seed every CPU's first time-partition window.
    pub fn sched_init(&self, now: Time) {
        for cpu in 0..self.cfg.num_cpus {
            if let Some(sched) = self.cfg.tp_schedules.get(cpu as usize) {
                if let Some(first) = sched.windows.first() {
                    self.per_cpu(cpu).tp_window.set(0);
                    self.per_cpu(cpu)
                        .tp_window_expiry
                        .set(now.wrapping_add(first.duration.as_nanos() as u64));
                }
            }
        }
    }

    /// One tick of the system timer (§4.3): expire timeouts and deadlines,
    /// advance the time-partition schedule, and reschedule if anything
    /// changed. Matches `kernel_timer()` in shape: a single entry point the
    /// board's timer interrupt calls on every underlying hardware tick.
    pub fn tick(&self, cpu: CpuId, now: Time) {
        self.expire_timeouts(cpu, now);
        self.expire_deadlines(cpu, now);
        self.kernel_increment_free_counters(cpu, now);
        let crossed = self.tp_advance(cpu, now);
        if crossed || !self.per_cpu(cpu).ready_bitmap.get().is_empty() {
            self.reschedule(cpu);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_kernel;

    #[test]
    fn reschedule_picks_highest_numeric_priority() {
        let k = test_kernel();
        k.task_activate(0, TaskId::new(0)).unwrap();
        k.task_activate(0, TaskId::new(1)).unwrap();
        k.reschedule(0);
        let running = k.per_cpu(0).running_task().unwrap();
        let other = if running == TaskId::new(0) { TaskId::new(1) } else { TaskId::new(0) };
        let running_prio = k.tasks[running.index()].current_prio.get();
        let other_prio = k.tasks[other.index()].current_prio.get();
        assert!(running_prio >= other_prio);
    }

    #[test]
    fn idle_cpu_has_no_running_task() {
        let k = test_kernel();
        k.reschedule(0);
        assert!(k.per_cpu(0).running_task().is_none());
    }
}
