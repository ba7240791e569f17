//! Immutable configuration tables (§3, §9).
//!
//! Everything here is produced offline by the configuration toolchain (out
//! of scope, §1) and is expected to show up as a `'static` value baked into
//! the image; the core only ever reads it. Generating these tables from
//! application source via some const-eval builder DSL is itself the offline
//! toolchain's job, so no such builder is carried here — only the *shape* of
//! what it would produce is, as plain structs.
use crate::{
    id::{
        AlarmId, CounterId, CpuId, HmErrorId, KlddId, PartitionId, RpcId, ScheduleTableId, ShmId,
        TaskId, TimePartitionId, WaitQueueId,
    },
    mpu::{MemRange, RegionSet},
    time::Duration,
};

/// Operating mode a partition starts and may return to (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatingMode {
    Idle,
    ColdStart,
    WarmStart,
    Normal,
}

/// What caused the most recent entry into `ColdStart`/`WarmStart` (§3, §4.12).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartCondition {
    NormalStart,
    PartitionRestart,
    HmModuleRestart,
    HmPartitionRestart,
}

/// A partition: an isolated address space with its own tasks, alarms,
/// schedule tables, wait queues and access rights (§3).
#[derive(Debug)]
pub struct PartitionCfg {
    pub id: PartitionId,
    pub cpu: CpuId,
    pub time_partition: TimePartitionId,
    pub initial_mode: OperatingMode,
    pub max_prio: u8,
    pub privileged: bool,
    pub restartable: bool,
    /// Up to four half-open memory ranges (§3).
    pub mem_ranges: &'static [MemRange],
    pub region_set: RegionSet,
    pub init_hook: Option<TaskId>,
    pub error_hook: Option<TaskId>,
    pub exception_hook: Option<TaskId>,
    pub tasks: &'static [TaskId],
    pub alarms: &'static [AlarmId],
    pub schedule_tables: &'static [ScheduleTableId],
    pub wait_queues: &'static [WaitQueueId],
    pub rpc_targets: &'static [RpcId],
    pub kldd_entries: &'static [KlddId],
    pub counter_accesses: &'static [CounterId],
    pub shm_accesses: &'static [ShmId],
    /// Named inter-partition event bit owners this partition may raise.
    pub ipev_targets: &'static [TaskId],
}

/// The kind of task, per its configured behavior (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Hook,
    Isr,
    Task,
    Invokable,
}

bitflags::bitflags! {
    /// Configured flag bits (§3): whether the task may block, whether it
    /// should start at its elevated priority, whether its IRQ should be
    /// unmasked at partition start.
    pub struct TaskFlags: u8 {
        const MAY_BLOCK       = 0b001;
        const ELEVATE_ON_ACT  = 0b010;
        const UNMASK_IRQ      = 0b100;
    }
}

/// Static configuration of one task (§3).
#[derive(Debug)]
pub struct TaskCfg {
    pub id: TaskId,
    pub partition: PartitionId,
    pub cpu: CpuId,
    pub kind: TaskKind,
    pub base_prio: u8,
    pub elevated_prio: u8,
    pub max_activations: u8,
    pub stack: MemRange,
    pub region_set: RegionSet,
    pub capacity: Duration,
    pub period: Duration,
    pub entry_point: usize,
    pub initial_arg: usize,
    pub flags: TaskFlags,
    pub irq_line: Option<u32>,
    /// Present only for `Hook` tasks that are RPC receivers.
    pub rpc: Option<RpcCfg>,
}

/// Bounded send/recv queue capacities for an RPC-receiving hook (§3, §4.8).
#[derive(Debug, Clone, Copy)]
pub struct RpcCfg {
    pub id: RpcId,
    pub send_capacity: u8,
    pub recv_capacity: u8,
    pub floor_prio: u8,
}

/// Hardware or software counter (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterKind {
    Software,
    Hardware,
}

#[derive(Debug)]
pub struct CounterCfg {
    pub id: CounterId,
    pub partition: PartitionId,
    pub cpu: CpuId,
    pub kind: CounterKind,
    pub max_allowed: u64,
    pub ticks_per_base: u32,
    pub min_cycle: u64,
    pub max_alarms: u16,
}

/// What an alarm does when it expires (§3).
#[derive(Debug, Clone, Copy)]
pub enum AlarmAction {
    Event { task: TaskId, bit: u32 },
    Task(TaskId),
    Hook(TaskId),
    Invoke(usize),
    Counter(CounterId),
    SchedTab(ScheduleTableId),
}

#[derive(Debug)]
pub struct AlarmCfg {
    pub id: AlarmId,
    pub counter: CounterId,
    pub cpu: CpuId,
    pub action: AlarmAction,
}

/// One opcode in a schedule table's action program (§3).
#[derive(Debug, Clone, Copy)]
pub enum SchedTabOp {
    Event { task: TaskId, bit: u32 },
    Task(TaskId),
    Hook(TaskId),
    Wait(u64),
    Shorten(u64),
    Lengthen(u64),
    Wrap(u16),
    Start,
}

bitflags::bitflags! {
    pub struct SchedTabFlags: u8 {
        const REPEATING     = 0b001;
        const SYNC_EXPLICIT = 0b010;
        const SYNC_IMPLICIT = 0b100;
    }
}

#[derive(Debug)]
pub struct ScheduleTableCfg {
    pub id: ScheduleTableId,
    pub counter: CounterId,
    pub cpu: CpuId,
    pub flags: SchedTabFlags,
    pub actions: &'static [SchedTabOp],
    pub duration: u64,
    pub precision: u64,
    pub next: Option<ScheduleTableId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueDiscipline {
    Fifo,
    Prio,
}

#[derive(Debug)]
pub struct WaitQueueCfg {
    pub id: WaitQueueId,
    pub partition: PartitionId,
    pub cpu: CpuId,
    pub discipline: QueueDiscipline,
    pub link: Option<WaitQueueId>,
}

/// One window of the cyclic time-partition schedule (§4.11).
bitflags::bitflags! {
    pub struct WindowFlags: u8 {
        const FIRST   = 0b001;
        const LAST    = 0b010;
        const RELEASE = 0b100;
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TimePartitionWindow {
    pub time_partition: TimePartitionId,
    pub flags: WindowFlags,
    pub duration: Duration,
}

#[derive(Debug)]
pub struct TimePartitionScheduleCfg {
    pub windows: &'static [TimePartitionWindow],
}

/// Escalation chosen for one HM error id (§4.13, §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HmAction {
    Ignore,
    PartRestart,
    PartShutdown,
    ModuleRestart,
    ModuleShutdown,
    Panic,
}

#[derive(Debug)]
pub struct HmTableCfg {
    /// Indexed by `HmErrorId`.
    pub actions: &'static [HmAction],
}

#[derive(Debug, Clone, Copy)]
pub struct KlddCfg {
    pub id: KlddId,
    pub entry: fn(usize, usize, usize) -> usize,
}

#[derive(Debug, Clone, Copy)]
pub struct ShmCfg {
    pub id: ShmId,
    pub base: usize,
    pub size: usize,
}

/// Per-(source, destination) IPI ring capacity (§4.9, §5). Sized by the
/// offline toolchain to the maximum observable outstanding action count for
/// that pair; overflow beyond this is a configuration error, not a runtime
/// one.
#[derive(Debug, Clone, Copy)]
pub struct IpiLinkCfg {
    pub capacity: u16,
}

/// The complete, immutable system configuration assembled by the offline
/// toolchain.
#[derive(Debug)]
pub struct SystemCfg {
    pub num_cpus: u8,
    pub partitions: &'static [PartitionCfg],
    pub tasks: &'static [TaskCfg],
    pub counters: &'static [CounterCfg],
    pub alarms: &'static [AlarmCfg],
    pub schedule_tables: &'static [ScheduleTableCfg],
    pub wait_queues: &'static [WaitQueueCfg],
    pub kldds: &'static [KlddCfg],
    pub shms: &'static [ShmCfg],
    /// Indexed by `CpuId`.
    pub tp_schedules: &'static [TimePartitionScheduleCfg],
    /// The Hook task serving each `RpcId`.
    pub rpc_receivers: &'static [TaskId],
    pub hm_table: HmTableCfg,
    /// `ipi_links[src][dst]`, `src != dst`.
    pub ipi_links: &'static [&'static [IpiLinkCfg]],
}

impl SystemCfg {
    pub fn task(&self, id: TaskId) -> Option<&'static TaskCfg> {
        self.tasks.get(id.index())
    }

    pub fn partition(&self, id: PartitionId) -> Option<&'static PartitionCfg> {
        self.partitions.get(id.index())
    }

    pub fn counter(&self, id: CounterId) -> Option<&'static CounterCfg> {
        self.counters.get(id.index())
    }

    pub fn alarm(&self, id: AlarmId) -> Option<&'static AlarmCfg> {
        self.alarms.get(id.index())
    }

    pub fn schedule_table(&self, id: ScheduleTableId) -> Option<&'static ScheduleTableCfg> {
        self.schedule_tables.get(id.index())
    }

    pub fn wait_queue(&self, id: WaitQueueId) -> Option<&'static WaitQueueCfg> {
        self.wait_queues.get(id.index())
    }

    pub fn rpc_receiver(&self, id: RpcId) -> Option<TaskId> {
        self.rpc_receivers.get(id.index()).copied()
    }

    pub fn rpc(&self, id: RpcId) -> Option<&'static RpcCfg> {
        self.rpc_receiver(id).and_then(|t| self.task(t)).and_then(|t| t.rpc.as_ref())
    }

    pub fn hm_action(&self, id: HmErrorId) -> HmAction {
        self.hm_table
            .actions
            .get(id.index())
            .copied()
            .unwrap_or(HmAction::Panic)
    }
}
