//! Partition manager (C12): operating-mode transitions are requested
//! synchronously but only take effect at the next scheduler entry into that
//! partition's time-partition window (§4.11, §4.12) — never mid-window,
//! which would let a partition's restart corrupt another partition's slice
//! of the cycle.
use core::cell::Cell;

use crate::{
    cfg::{OperatingMode, StartCondition},
    error::{ErrorKind, KResult},
    id::{PartitionId, TimePartitionId},
    kernel::Kernel,
    task::TaskState,
    time::Time,
};

/// Up to two transitions queued for the next window release(s) — the
/// two-step `NORMAL → IDLE → {COLD_START, WARM_START}` restart needs a
/// second slot since `IDLE` only becomes current once the first has been
/// applied at an actual window release (§4.12).
#[derive(Clone, Copy, Default)]
struct PendingModes {
    first: Option<(OperatingMode, StartCondition)>,
    second: Option<(OperatingMode, StartCondition)>,
}

/// Depth of the per-partition asynchronous task-error ring (§4.13). Sized to
/// hold a few errors between error-hook activations, not to be a durable
/// log.
const ERROR_RING_LEN: usize = 4;

pub struct PartitionRt {
    pub mode: Cell<OperatingMode>,
    pending: Cell<PendingModes>,
    pub start_condition: Cell<StartCondition>,
    /// Set once this partition first reaches `Normal`; a partition that has
    /// never been `Normal` cannot warm-start (§4.12's "warm-startable").
    pub ever_normal: Cell<bool>,
    /// Ring of recent asynchronous task errors (§4.13), oldest overwritten
    /// first; read by `hm_raise_task_error`'s error hook, not the HM table.
    error_ring: Cell<[Option<(crate::id::TaskId, ErrorKind)>; ERROR_RING_LEN]>,
    error_ring_next: Cell<u8>,
}

unsafe impl Sync for PartitionRt {}

impl PartitionRt {
    pub const INIT: Self = Self {
        mode: Cell::new(OperatingMode::Idle),
        pending: Cell::new(PendingModes { first: None, second: None }),
        start_condition: Cell::new(StartCondition::NormalStart),
        ever_normal: Cell::new(false),
        error_ring: Cell::new([None; ERROR_RING_LEN]),
        error_ring_next: Cell::new(0),
    };
}

impl Default for PartitionRt {
    fn default() -> Self {
        Self::INIT
    }
}

impl<B: crate::board::Board> Kernel<B> {
    #[inline]
    pub fn partition_rt(&self, id: PartitionId) -> Option<&PartitionRt> {
        self.partitions.get(id.index())
    }

    /// `part_self()` (§4.14): the calling task's owning partition.
    pub fn partition_self(&self, task: crate::id::TaskId) -> KResult<PartitionId> {
        Ok(self.cfg.task(task).ok_or(ErrorKind::Id)?.partition)
    }

    pub fn partition_get_operating_mode(&self, id: PartitionId) -> KResult<OperatingMode> {
        Ok(self.partition_rt(id).ok_or(ErrorKind::Id)?.mode.get())
    }

    pub fn partition_get_start_condition(&self, id: PartitionId) -> KResult<StartCondition> {
        Ok(self.partition_rt(id).ok_or(ErrorKind::Id)?.start_condition.get())
    }

    /// Append `(task, kind)` to `id`'s asynchronous task-error ring (§4.13),
    /// overwriting the oldest entry once full. Called by
    /// [`crate::hm::Kernel::hm_raise_task_error`] instead of HM-table
    /// escalation.
    pub(crate) fn partition_push_error(&self, id: PartitionId, task: crate::id::TaskId, kind: ErrorKind) {
        let Some(rt) = self.partition_rt(id) else { return };
        let mut ring = rt.error_ring.get();
        let idx = rt.error_ring_next.get() as usize % ERROR_RING_LEN;
        ring[idx] = Some((task, kind));
        rt.error_ring.set(ring);
        rt.error_ring_next.set(rt.error_ring_next.get().wrapping_add(1));
    }

    /// The most recently raised asynchronous task error still held in `id`'s
    /// ring, if any.
    pub fn partition_last_error(&self, id: PartitionId) -> Option<(crate::id::TaskId, ErrorKind)> {
        let rt = self.partition_rt(id)?;
        let next = rt.error_ring_next.get() as usize;
        let idx = (next + ERROR_RING_LEN - 1) % ERROR_RING_LEN;
        rt.error_ring.get()[idx]
    }

    /// `part_set_operating_mode(partition_id, mode)` (§4.14): request a mode
    /// transition, queued until this partition's window is next entered.
    /// `part_set_operating_mode_ex` additionally records the start
    /// condition driving the transition (an HM-directed restart vs. an
    /// application-requested one).
    pub fn partition_set_operating_mode(&self, _now: Time, id: PartitionId, mode: OperatingMode) -> KResult {
        self.partition_set_operating_mode_ex(id, mode, StartCondition::NormalStart)
    }

    /// Whether `target` is reachable from `current` in one window release
    /// (§4.12's legal-transition list). `IDLE → WARM_START` additionally
    /// requires the partition to have reached `NORMAL` at least once.
    fn direct_transition_legal(current: OperatingMode, target: OperatingMode, ever_normal: bool) -> bool {
        use OperatingMode::*;
        match (current, target) {
            (Idle, ColdStart) => true,
            (Idle, WarmStart) => ever_normal,
            (ColdStart, Normal) | (WarmStart, Normal) => true,
            (Normal, Idle) | (ColdStart, Idle) | (WarmStart, Idle) => true,
            _ => false,
        }
    }

    pub fn partition_set_operating_mode_ex(
        &self,
        id: PartitionId,
        mode: OperatingMode,
        condition: StartCondition,
    ) -> KResult {
        let cfg = self.cfg.partition(id).ok_or(ErrorKind::Id)?;
        if !cfg.restartable && matches!(mode, OperatingMode::ColdStart | OperatingMode::WarmStart) {
            return Err(ErrorKind::Access);
        }
        let rt = self.partition_rt(id).ok_or(ErrorKind::Id)?;
        let current = rt.mode.get();

        if Self::direct_transition_legal(current, mode, rt.ever_normal.get()) {
            rt.pending.set(PendingModes { first: Some((mode, condition)), second: None });
            return Ok(());
        }

        // NORMAL can't reach COLD_START/WARM_START in one step (§4.12); queue
        // the IDLE leg first and the requested restart target behind it, so
        // the second leg becomes legal once the first has actually applied.
        if current == OperatingMode::Normal && matches!(mode, OperatingMode::ColdStart | OperatingMode::WarmStart) {
            rt.pending.set(PendingModes {
                first: Some((OperatingMode::Idle, condition)),
                second: Some((mode, condition)),
            });
            return Ok(());
        }

        Err(ErrorKind::State)
    }

    /// Called from [`crate::sched::Kernel::tp_advance`] when a window
    /// flagged `RELEASE` begins: apply the next queued mode transition (one
    /// leg per release) for every partition scheduled in `tp`.
    pub(crate) fn partition_release_window(&self, tp: TimePartitionId) {
        for (idx, cfg) in self.cfg.partitions.iter().enumerate() {
            if cfg.time_partition != tp {
                continue;
            }
            let id = PartitionId::new(idx as u16);
            let rt = &self.partitions[idx];
            let pending = rt.pending.get();
            if let Some((mode, condition)) = pending.first {
                rt.start_condition.set(condition);
                self.partition_apply_mode(id, mode);
                rt.pending.set(PendingModes { first: pending.second, second: None });
            }
        }
    }

    /// Suspend every task, cancel every alarm and schedule table, and
    /// release every wait/RPC queue entry owned by `cfg`'s partition
    /// (§4.12's reset body, shared by the `IDLE`, `COLD_START` and
    /// `WARM_START` targets).
    fn partition_reset_objects(&self, cfg: &crate::cfg::PartitionCfg) {
        for &task in cfg.tasks {
            let task_cfg = self.cfg.task(task).expect("valid task id");
            let task_rt = self.task_rt(task).expect("valid task id");
            match task_rt.state.get() {
                TaskState::Running => {
                    self.per_cpu(task_cfg.cpu).running.set(crate::id::ID_NONE);
                }
                TaskState::WaitSend | TaskState::WaitRecv => {
                    // Released below via `rpc_drain_sendq` once we reach the
                    // receiver that owns this caller's queue entry.
                }
                s if s.is_waiting() => {
                    self.wq_unblock(task).ok();
                }
                _ => {}
            }
            task_rt.pending_activations.set(0);
            task_rt.state.set(TaskState::Suspended);
            self.deadline_cancel(task);
            if task_cfg.rpc.is_some() {
                self.rpc_drain_sendq(task);
            }
        }
        for &alarm in cfg.alarms {
            self.alarm_cancel(alarm).ok();
        }
        for &table in cfg.schedule_tables {
            self.schedtab_stop(table).ok();
        }
    }

    fn partition_apply_mode(&self, id: PartitionId, mode: OperatingMode) {
        let cfg = self.cfg.partition(id).expect("valid partition id");
        let rt = self.partition_rt(id).expect("valid partition id");
        rt.mode.set(mode);
        if mode == OperatingMode::Normal {
            rt.ever_normal.set(true);
        }

        if matches!(mode, OperatingMode::ColdStart | OperatingMode::WarmStart | OperatingMode::Idle) {
            self.partition_reset_objects(cfg);
        }

        if mode == OperatingMode::ColdStart {
            if let Some(init) = cfg.init_hook {
                let now = B::get_time();
                let _ = self.task_activate(now, init);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_kernel;

    #[test]
    fn mode_change_is_deferred_until_window_release() {
        let k = test_kernel();
        let p = PartitionId::new(0);
        // IDLE -> NORMAL isn't a legal one-step transition (§4.12); a fresh
        // partition must cold-start first.
        k.partition_set_operating_mode(0, p, OperatingMode::ColdStart).unwrap();
        assert_eq!(k.partition_get_operating_mode(p).unwrap(), OperatingMode::Idle);
        let tp = k.cfg.partition(p).unwrap().time_partition;
        k.partition_release_window(tp);
        assert_eq!(k.partition_get_operating_mode(p).unwrap(), OperatingMode::ColdStart);

        k.partition_set_operating_mode(0, p, OperatingMode::Normal).unwrap();
        k.partition_release_window(tp);
        assert_eq!(k.partition_get_operating_mode(p).unwrap(), OperatingMode::Normal);
    }

    #[test]
    fn illegal_transition_is_rejected() {
        let k = test_kernel();
        let p = PartitionId::new(0);
        // Fresh partition is IDLE; NORMAL is unreachable in one step.
        assert_eq!(
            k.partition_set_operating_mode(0, p, OperatingMode::Normal),
            Err(ErrorKind::State)
        );
    }

    #[test]
    fn restart_from_normal_is_staged_through_idle() {
        let k = test_kernel();
        let p = PartitionId::new(0);
        let tp = k.cfg.partition(p).unwrap().time_partition;
        k.partition_set_operating_mode(0, p, OperatingMode::ColdStart).unwrap();
        k.partition_release_window(tp);
        k.partition_set_operating_mode(0, p, OperatingMode::Normal).unwrap();
        k.partition_release_window(tp);
        assert_eq!(k.partition_get_operating_mode(p).unwrap(), OperatingMode::Normal);

        // A restart while NORMAL can't jump straight to COLD_START; it must
        // stage through IDLE across two window releases.
        k.partition_set_operating_mode(0, p, OperatingMode::ColdStart).unwrap();
        k.partition_release_window(tp);
        assert_eq!(k.partition_get_operating_mode(p).unwrap(), OperatingMode::Idle);
        k.partition_release_window(tp);
        assert_eq!(k.partition_get_operating_mode(p).unwrap(), OperatingMode::ColdStart);
    }

    #[test]
    fn transition_graph_matches_spec_legal_list() {
        use OperatingMode::*;
        assert!(Kernel::<crate::test_support::TestBoard>::direct_transition_legal(Idle, ColdStart, false));
        assert!(!Kernel::<crate::test_support::TestBoard>::direct_transition_legal(Idle, WarmStart, false));
        assert!(Kernel::<crate::test_support::TestBoard>::direct_transition_legal(Idle, WarmStart, true));
        assert!(Kernel::<crate::test_support::TestBoard>::direct_transition_legal(ColdStart, Normal, false));
        assert!(Kernel::<crate::test_support::TestBoard>::direct_transition_legal(WarmStart, Normal, false));
        assert!(Kernel::<crate::test_support::TestBoard>::direct_transition_legal(Normal, Idle, false));
        assert!(!Kernel::<crate::test_support::TestBoard>::direct_transition_legal(Normal, ColdStart, false));
        assert!(!Kernel::<crate::test_support::TestBoard>::direct_transition_legal(Idle, Normal, false));
    }
}
