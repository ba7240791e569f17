//! The top-level kernel object (§3): owns every runtime-state table and
//! ties the per-module operations together. The tables it owns are plain
//! `'static` slices sized by the integrator (e.g. a board crate's `static`
//! arrays) rather than by a const-eval config builder, since that builder is
//! the offline toolchain's job here (§1, §9).
use core::marker::PhantomData;

use crate::{
    alarm::AlarmRt, board::Board, cfg::SystemCfg, counter::CounterRt, fastsync::FastBlock, hm::HmRt,
    ipi::IpiRt, partition::PartitionRt, rpc::RpcRt, schedtab::ScheduleTableRt, sched::PerCpu,
    task::TaskRt, time::Time, wait::WaitQueueRt,
};

/// The kernel core, generic over the board/architecture contract it
/// consumes (§6). Every table is `'static` and sized exactly to its
/// matching `SystemCfg` table; mismatched lengths are a configuration bug
/// caught by `debug_assert!` in [`Kernel::new`], not a runtime error path
/// (the offline toolchain is expected to never produce one).
pub struct Kernel<B: Board> {
    pub cfg: &'static SystemCfg,
    pub(crate) tasks: &'static [TaskRt],
    pub(crate) counters: &'static [CounterRt],
    pub(crate) alarms: &'static [AlarmRt],
    pub(crate) schedule_tables: &'static [ScheduleTableRt],
    pub(crate) wait_queues: &'static [WaitQueueRt],
    pub(crate) rpcs: &'static [RpcRt],
    pub(crate) partitions: &'static [PartitionRt],
    pub(crate) cpus: &'static [PerCpu],
    pub(crate) hm: &'static HmRt,
    pub(crate) ipi: &'static IpiRt,
    pub(crate) fast_blocks: &'static [FastBlock],
    _board: PhantomData<fn() -> B>,
}

impl<B: Board> Kernel<B> {
    /// Wire a kernel instance to its configuration and the `'static`
    /// runtime-state tables the integrator allocated to match it. Table
    /// lengths are expected to equal the corresponding `cfg` table's length;
    /// a mismatch is a configuration-generation bug, checked in debug
    /// builds only (§9: the tables are produced offline and trusted at
    /// runtime).
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cfg: &'static SystemCfg,
        tasks: &'static [TaskRt],
        counters: &'static [CounterRt],
        alarms: &'static [AlarmRt],
        schedule_tables: &'static [ScheduleTableRt],
        wait_queues: &'static [WaitQueueRt],
        rpcs: &'static [RpcRt],
        partitions: &'static [PartitionRt],
        cpus: &'static [PerCpu],
        hm: &'static HmRt,
        ipi: &'static IpiRt,
        fast_blocks: &'static [FastBlock],
    ) -> Self {
        debug_assert_eq!(tasks.len(), cfg.tasks.len());
        debug_assert_eq!(counters.len(), cfg.counters.len());
        debug_assert_eq!(alarms.len(), cfg.alarms.len());
        debug_assert_eq!(schedule_tables.len(), cfg.schedule_tables.len());
        debug_assert_eq!(wait_queues.len(), cfg.wait_queues.len());
        debug_assert_eq!(partitions.len(), cfg.partitions.len());
        debug_assert_eq!(cpus.len(), cfg.num_cpus as usize);
        debug_assert_eq!(fast_blocks.len(), cfg.partitions.len());

        for (idx, wq_cfg) in cfg.wait_queues.iter().enumerate() {
            wait_queues[idx].discipline.set(wq_cfg.discipline);
        }

        Self {
            cfg,
            tasks,
            counters,
            alarms,
            schedule_tables,
            wait_queues,
            rpcs,
            partitions,
            cpus,
            hm,
            ipi,
            fast_blocks,
            _board: PhantomData,
        }
    }

    /// `kernel_main()` / boot (§4.11, §4.12): program the MPU, seed every
    /// CPU's time-partition schedule, then cold-start every partition whose
    /// configured [`crate::cfg::StartCondition`] is `NormalStart`.
    pub fn boot(&self, now: Time) {
        B::mpu_init();
        self.sched_init(now);
        for (idx, cfg) in self.cfg.partitions.iter().enumerate() {
            let id = crate::id::PartitionId::new(idx as u16);
            self.partitions[idx].start_condition.set(crate::cfg::StartCondition::NormalStart);
            let _ = self.partition_set_operating_mode_ex(
                id,
                cfg.initial_mode,
                crate::cfg::StartCondition::NormalStart,
            );
        }
        for cpu in 0..self.cfg.num_cpus {
            self.partition_release_window(self.tp_window_partition(cpu).unwrap_or(crate::id::TimePartitionId::new(0)));
        }
        B::startup_complete();
    }

    /// `kernel_timer(cpu)`: the board's periodic timer interrupt entry
    /// point.
    pub fn kernel_timer(&self, cpu: crate::id::CpuId) {
        self.tick(cpu, B::get_time());
    }

    /// `kernel_ipi_handle(cpu)`: the board's inter-processor interrupt entry
    /// point.
    pub fn kernel_ipi_handle(&self, cpu: crate::id::CpuId) {
        self.ipi_drain(B::get_time(), cpu);
        self.reschedule(cpu);
    }
}
