//! Health monitor (C13): the single escalation point every protection,
//! platform and application error passes through (§4.13, §7). The board
//! gets first refusal via [`crate::board::Board::hm_exception`]; whatever it
//! doesn't handle is escalated per [`crate::cfg::HmTableCfg`].
use core::cell::Cell;

use crate::{
    board::{Board, HaltMode},
    cfg::{HmAction, OperatingMode, StartCondition},
    error::ErrorKind,
    id::{CpuId, HmErrorId, TaskId},
    kernel::Kernel,
    time::Time,
};

pub struct HmRt {
    pub last_error: Cell<Option<HmErrorId>>,
    /// Runtime overrides of [`crate::cfg::HmTableCfg::actions`], indexed the
    /// same way; `None` defers to the configured action. Sized by the
    /// integrator to match `cfg.hm_table.actions.len()`, same convention as
    /// every other runtime-state table.
    pub overrides: &'static [Cell<Option<HmAction>>],
}

unsafe impl Sync for HmRt {}

impl HmRt {
    pub const fn new(overrides: &'static [Cell<Option<HmAction>>]) -> Self {
        Self {
            last_error: Cell::new(None),
            overrides,
        }
    }
}

impl<B: Board> Kernel<B> {
    fn hm_action_effective(&self, id: HmErrorId) -> HmAction {
        self.hm
            .overrides
            .get(id.index())
            .and_then(Cell::get)
            .unwrap_or_else(|| self.cfg.hm_action(id))
    }

    /// `hm_change(hm_error_id, action)` (§4.14): override the configured
    /// escalation for one HM error id at runtime, e.g. to temporarily
    /// downgrade `PartRestart` to `Ignore` during a diagnostic session.
    pub fn hm_change(&self, id: HmErrorId, action: HmAction) -> crate::error::KResult {
        let cell = self.hm.overrides.get(id.index()).ok_or(ErrorKind::Id)?;
        cell.set(Some(action));
        Ok(())
    }

    /// `hm_inject(hm_error_id)` (§4.14): application-directed fault
    /// injection, routed through the same table as a real error.
    pub fn hm_inject(&self, now: Time, cpu: CpuId, id: HmErrorId, partition: Option<crate::id::PartitionId>) {
        self.hm_dispatch(now, cpu, id, partition);
    }

    /// `hm_log(message)` (§4.14): append a diagnostic line without
    /// triggering any escalation.
    pub fn hm_log(&self, msg: &str) {
        self.diag_log(format_args!("hm: {msg}"));
    }
}

impl<B: Board> Kernel<B> {
    /// `hm_inject(hm_error_id)` / the implicit dispatch behind every
    /// application-level error §4.13 describes: run the table's configured
    /// action for this error.
    pub fn hm_dispatch(&self, now: Time, cpu: CpuId, id: HmErrorId, partition: Option<crate::id::PartitionId>) {
        self.hm.last_error.set(Some(id));
        match self.hm_action_effective(id) {
            HmAction::Ignore => {}
            HmAction::PartRestart => {
                if let Some(part) = partition {
                    let _ = self.partition_set_operating_mode_ex(
                        part,
                        OperatingMode::WarmStart,
                        StartCondition::HmPartitionRestart,
                    );
                }
            }
            HmAction::PartShutdown => {
                if let Some(part) = partition {
                    let _ = self.partition_set_operating_mode_ex(
                        part,
                        OperatingMode::Idle,
                        StartCondition::HmPartitionRestart,
                    );
                }
            }
            HmAction::ModuleRestart => B::halt(HaltMode::HmReset),
            HmAction::ModuleShutdown => B::halt(HaltMode::HmShutdown),
            HmAction::Panic => B::halt(HaltMode::HmAssert),
        }
        let _ = (now, cpu);
    }

    /// Asynchronous task-error path (§4.13): a task's own misbehavior (a
    /// blown deadline, an activation overrun) is recorded in its
    /// partition's error ring and, if the partition defines one, handed to
    /// its error hook — never escalated through the HM table, which is
    /// reserved for the synchronous exception path.
    pub(crate) fn hm_raise_task_error(&self, task: TaskId, kind: ErrorKind) {
        let Some(cfg) = self.cfg.task(task) else { return };
        self.partition_push_error(cfg.partition, task, kind);
        if let Some(part_cfg) = self.cfg.partition(cfg.partition) {
            if let Some(hook) = part_cfg.error_hook {
                let now = B::get_time();
                let _ = self.task_activate(now, hook);
            }
        }
    }

    /// `board_hm_exception` escalation path (§6, §4.13): a synchronous CPU
    /// exception the board did not claim. A non-fatal exception in a
    /// partition that defines an exception hook is handed to that hook
    /// instead of the HM table; a fatal exception, or one with no hook,
    /// always escalates through [`Self::hm_dispatch`].
    pub fn hm_exception(
        &self,
        now: Time,
        cpu: CpuId,
        regs: &B::Regs,
        fatal: bool,
        kind: ErrorKind,
        vector: u32,
        fault_addr: usize,
        aux: usize,
        partition: Option<crate::id::PartitionId>,
    ) {
        if B::hm_exception(regs, fatal, kind.hm_id(), vector, fault_addr, aux) {
            return;
        }
        if !fatal {
            if let Some(hook) = partition.and_then(|p| self.cfg.partition(p)).and_then(|c| c.exception_hook) {
                let _ = self.task_activate(now, hook);
                return;
            }
        }
        self.hm_dispatch(now, cpu, kind.hm_id(), partition);
    }

    /// Minimal handling for `AlarmAction::Invoke`/`SchedTabOp`-triggered
    /// "invoke" entries (§4.4, §4.5): the data model carries only an opaque
    /// handle for these, so the core logs it through [`crate::diag`] rather
    /// than guessing a calling convention the offline toolchain hasn't
    /// defined yet.
    pub(crate) fn hm_invoke_entry(&self, entry: usize) {
        self.diag_log(format_args!("invoke entry {entry:#x}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_kernel;

    #[test]
    fn ignored_error_leaves_partition_mode_untouched() {
        let k = test_kernel();
        let p = crate::id::PartitionId::new(0);
        let before = k.partition_get_operating_mode(p).unwrap();
        k.hm_dispatch(0, 0, ErrorKind::NoFunc.hm_id(), Some(p));
        assert_eq!(k.partition_get_operating_mode(p).unwrap(), before);
    }

    #[test]
    fn task_error_is_recorded_and_activates_error_hook_without_hm_table() {
        let k = test_kernel();
        let task = TaskId::new(0);
        let hook = k.cfg.partition(crate::id::PartitionId::new(0)).unwrap().error_hook.unwrap();
        let before = k.partition_get_operating_mode(crate::id::PartitionId::new(0)).unwrap();

        k.hm_raise_task_error(task, ErrorKind::Limit);

        assert_eq!(
            k.partition_last_error(crate::id::PartitionId::new(0)),
            Some((task, ErrorKind::Limit))
        );
        assert_eq!(k.task_rt(hook).unwrap().state.get(), crate::task::TaskState::Ready);
        // No HM-table escalation: the partition's mode is untouched.
        assert_eq!(
            k.partition_get_operating_mode(crate::id::PartitionId::new(0)).unwrap(),
            before
        );
    }

    #[test]
    fn non_fatal_exception_claimed_by_exception_hook_skips_hm_table() {
        let k = test_kernel();
        let p = crate::id::PartitionId::new(0);
        let hook = k.cfg.partition(p).unwrap().exception_hook.unwrap();
        let before = k.partition_get_operating_mode(p).unwrap();

        k.hm_exception(0, 0, &Default::default(), false, ErrorKind::IllegalAddress, 0, 0, 0, Some(p));

        assert_eq!(k.task_rt(hook).unwrap().state.get(), crate::task::TaskState::Ready);
        assert_eq!(k.partition_get_operating_mode(p).unwrap(), before);
    }
}
