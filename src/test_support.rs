//! Fixture kernel used only by `#[cfg(test)]` modules across the crate:
//! one small but complete [`crate::cfg::SystemCfg`] (two CPUs, one
//! partition, three tasks, one each of counter/alarm/schedule-table/wait
//! queue/RPC channel) plus its matching `'static` runtime-state tables and a
//! [`Board`] stub that never blocks and never reports real time on its own.
#![cfg(test)]
use core::cell::Cell;

use crate::{
    alarm::AlarmRt,
    board::{Board, HaltMode, RegisterFrame},
    cfg::{
        AlarmAction, AlarmCfg, CounterCfg, CounterKind, HmAction, HmTableCfg, IpiLinkCfg,
        OperatingMode, PartitionCfg, QueueDiscipline, RpcCfg, ScheduleTableCfg, SchedTabFlags,
        SchedTabOp, SystemCfg, TaskCfg, TaskFlags, TaskKind, TimePartitionScheduleCfg,
        TimePartitionWindow, WaitQueueCfg, WindowFlags,
    },
    counter::CounterRt,
    fastsync::FastBlock,
    hm::HmRt,
    id::{PartitionId, RpcId, TaskId, TimePartitionId},
    ipi::IpiRt,
    kernel::Kernel,
    partition::PartitionRt,
    rpc::RpcRt,
    sched::PerCpu,
    schedtab::ScheduleTableRt,
    task::TaskRt,
    time::{Duration, Time},
    wait::WaitQueueRt,
};

/// Number of `ErrorKind` variants (§4.13); the HM table and its runtime
/// override array are sized to cover every one of them.
const HM_ENTRIES: usize = 32;

static TASKS: [TaskCfg; 3] = [
    TaskCfg {
        id: TaskId::new(0),
        partition: PartitionId::new(0),
        cpu: 0,
        kind: TaskKind::Task,
        base_prio: 50,
        elevated_prio: 50,
        max_activations: 3,
        stack: 0x2000..0x3000,
        region_set: crate::mpu::RegionSet::NONE,
        capacity: Duration::from_nanos(10_000),
        period: Duration::from_nanos(100_000),
        entry_point: 0,
        initial_arg: 0,
        flags: TaskFlags::from_bits_truncate(0b001),
        irq_line: None,
        rpc: None,
    },
    TaskCfg {
        id: TaskId::new(1),
        partition: PartitionId::new(0),
        cpu: 0,
        kind: TaskKind::Task,
        base_prio: 80,
        elevated_prio: 80,
        max_activations: 250,
        stack: 0x3000..0x4000,
        region_set: crate::mpu::RegionSet::NONE,
        capacity: Duration::ZERO,
        period: Duration::from_nanos(100_000),
        entry_point: 0,
        initial_arg: 0,
        flags: TaskFlags::from_bits_truncate(0b001),
        irq_line: None,
        rpc: None,
    },
    TaskCfg {
        id: TaskId::new(2),
        partition: PartitionId::new(0),
        cpu: 0,
        kind: TaskKind::Hook,
        base_prio: 5,
        elevated_prio: 5,
        max_activations: 1,
        stack: 0x4000..0x4800,
        region_set: crate::mpu::RegionSet::NONE,
        capacity: Duration::ZERO,
        period: Duration::ZERO,
        entry_point: 0,
        initial_arg: 0,
        flags: TaskFlags::empty(),
        irq_line: None,
        rpc: Some(RpcCfg {
            id: RpcId::new(0),
            send_capacity: 4,
            recv_capacity: 4,
            floor_prio: 5,
        }),
    },
];

static TASK_IDS: [TaskId; 3] = [TaskId::new(0), TaskId::new(1), TaskId::new(2)];
static ALARM_IDS: [crate::id::AlarmId; 1] = [crate::id::AlarmId::new(0)];
static SCHEDTAB_IDS: [crate::id::ScheduleTableId; 1] = [crate::id::ScheduleTableId::new(0)];
static WAIT_QUEUE_IDS: [crate::id::WaitQueueId; 1] = [crate::id::WaitQueueId::new(0)];
static RPC_TARGETS: [RpcId; 1] = [RpcId::new(0)];
static COUNTER_ACCESSES: [crate::id::CounterId; 1] = [crate::id::CounterId::new(0)];
static MEM_RANGES: [core::ops::Range<usize>; 1] = [0x1000..0x9000];

static PARTITIONS: [PartitionCfg; 1] = [PartitionCfg {
    id: PartitionId::new(0),
    cpu: 0,
    time_partition: TimePartitionId::new(0),
    initial_mode: OperatingMode::Idle,
    max_prio: 100,
    privileged: false,
    restartable: true,
    mem_ranges: &MEM_RANGES,
    region_set: crate::mpu::RegionSet::NONE,
    init_hook: None,
    error_hook: Some(TaskId::new(2)),
    exception_hook: Some(TaskId::new(2)),
    tasks: &TASK_IDS,
    alarms: &ALARM_IDS,
    schedule_tables: &SCHEDTAB_IDS,
    wait_queues: &WAIT_QUEUE_IDS,
    rpc_targets: &RPC_TARGETS,
    kldd_entries: &[],
    counter_accesses: &COUNTER_ACCESSES,
    shm_accesses: &[],
    ipev_targets: &TASK_IDS,
}];

static COUNTERS: [CounterCfg; 1] = [CounterCfg {
    id: crate::id::CounterId::new(0),
    partition: PartitionId::new(0),
    cpu: 0,
    kind: CounterKind::Software,
    max_allowed: 99,
    ticks_per_base: 1,
    min_cycle: 1,
    max_alarms: 4,
}];

static ALARMS: [AlarmCfg; 1] = [AlarmCfg {
    id: crate::id::AlarmId::new(0),
    counter: crate::id::CounterId::new(0),
    cpu: 0,
    action: AlarmAction::Task(TaskId::new(1)),
}];

static SCHEDTAB_ACTIONS: [SchedTabOp; 1] = [SchedTabOp::Wait(100)];

static SCHEDULE_TABLES: [ScheduleTableCfg; 1] = [ScheduleTableCfg {
    id: crate::id::ScheduleTableId::new(0),
    counter: crate::id::CounterId::new(0),
    cpu: 0,
    flags: SchedTabFlags::from_bits_truncate(0b010),
    actions: &SCHEDTAB_ACTIONS,
    duration: 100,
    precision: 1,
    next: None,
}];

static WAIT_QUEUES: [WaitQueueCfg; 1] = [WaitQueueCfg {
    id: crate::id::WaitQueueId::new(0),
    partition: PartitionId::new(0),
    cpu: 0,
    discipline: QueueDiscipline::Fifo,
    link: None,
}];

static TP_WINDOWS: [TimePartitionWindow; 1] = [TimePartitionWindow {
    time_partition: TimePartitionId::new(0),
    flags: WindowFlags::from_bits_truncate(0b111),
    duration: Duration::from_nanos(1_000_000_000_000),
}];

static TP_SCHEDULES: [TimePartitionScheduleCfg; 2] = [
    TimePartitionScheduleCfg { windows: &TP_WINDOWS },
    TimePartitionScheduleCfg { windows: &TP_WINDOWS },
];

static RPC_RECEIVERS: [TaskId; 1] = [TaskId::new(2)];

static HM_ACTIONS: [HmAction; HM_ENTRIES] = [HmAction::Ignore; HM_ENTRIES];

static IPI_LINKS_ROW0: [IpiLinkCfg; 2] = [IpiLinkCfg { capacity: 0 }, IpiLinkCfg { capacity: 8 }];
static IPI_LINKS_ROW1: [IpiLinkCfg; 2] = [IpiLinkCfg { capacity: 8 }, IpiLinkCfg { capacity: 0 }];
static IPI_LINKS: [&[IpiLinkCfg]; 2] = [&IPI_LINKS_ROW0, &IPI_LINKS_ROW1];

static CFG: SystemCfg = SystemCfg {
    num_cpus: 2,
    partitions: &PARTITIONS,
    tasks: &TASKS,
    counters: &COUNTERS,
    alarms: &ALARMS,
    schedule_tables: &SCHEDULE_TABLES,
    wait_queues: &WAIT_QUEUES,
    kldds: &[],
    shms: &[],
    tp_schedules: &TP_SCHEDULES,
    rpc_receivers: &RPC_RECEIVERS,
    hm_table: HmTableCfg { actions: &HM_ACTIONS },
    ipi_links: &IPI_LINKS,
};

static TASK_RT: [TaskRt; 3] = [TaskRt::INIT, TaskRt::INIT, TaskRt::INIT];
static COUNTER_RT: [CounterRt; 1] = [CounterRt::INIT];
static ALARM_RT: [AlarmRt; 1] = [AlarmRt::INIT];
static SCHEDTAB_RT: [ScheduleTableRt; 1] = [ScheduleTableRt::INIT];
static WAIT_QUEUE_RT: [WaitQueueRt; 1] = [WaitQueueRt::INIT];
static RPC_RT: [RpcRt; 1] = [RpcRt::INIT];
static PARTITION_RT: [PartitionRt; 1] = [PartitionRt::INIT];
static CPU_RT: [PerCpu; 2] = [PerCpu::INIT, PerCpu::INIT];
static FAST_BLOCKS: [FastBlock; 1] = [FastBlock::INIT];
struct HmOverrides([Cell<Option<HmAction>>; HM_ENTRIES]);
unsafe impl Sync for HmOverrides {}
static HM_OVERRIDES: HmOverrides = HmOverrides([const { Cell::new(None) }; HM_ENTRIES]);
static HM_RT: HmRt = HmRt::new(&HM_OVERRIDES.0);
static IPI_RT: IpiRt = IpiRt::INIT;

/// Opaque register frame; the fixture never inspects it.
#[derive(Default)]
pub(crate) struct TestRegs;
impl RegisterFrame for TestRegs {}

/// A [`Board`] that never blocks and reports a fixed clock; every fixture
/// test drives time explicitly through its own `now` argument instead of
/// relying on this clock advancing.
pub(crate) struct TestBoard;

impl Board for TestBoard {
    type Regs = TestRegs;

    fn get_time() -> Time {
        0
    }

    fn timer_resolution_ns() -> u32 {
        1_000
    }

    fn putc(_c: u8) -> bool {
        true
    }

    fn mpu_init() {}

    fn mpu_part_switch(_regions: &crate::mpu::RegionSet) {}

    fn mpu_task_switch(_regions: &crate::mpu::RegionSet) {}

    fn irq_enable(_id: u32) {}

    fn irq_disable(_id: u32) {}

    fn unhandled_irq_handler(_id: u32) {}

    fn halt(mode: HaltMode) -> ! {
        panic!("test board halted: {mode:?}");
    }
}

pub(crate) fn test_kernel() -> Kernel<TestBoard> {
    Kernel::new(
        &CFG,
        &TASK_RT,
        &COUNTER_RT,
        &ALARM_RT,
        &SCHEDTAB_RT,
        &WAIT_QUEUE_RT,
        &RPC_RT,
        &PARTITION_RT,
        &CPU_RT,
        &HM_RT,
        &IPI_RT,
        &FAST_BLOCKS,
    )
}
