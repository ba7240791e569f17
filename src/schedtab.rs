//! Schedule-table engine (C5): a small program of time-stamped actions that
//! runs off a counter, with explicit/implicit synchronization adjustments
//! (§4.5). As with [`crate::counter`], the original hypervisor's
//! `schedtab.c` was not present in the retrieved sources — only
//! `schedtab.h`/`schedtab_state.h` survived — so the action-program
//! interpreter below follows the op list's own shape (§3's `SchedTabOp`)
//! rather than a line-for-line port.
use core::cell::Cell;

use crate::{
    cfg::SchedTabOp,
    error::{ErrorKind, KResult},
    id::{CpuId, ScheduleTableId},
    kernel::Kernel,
    list::Link,
};

/// Schedule-table runtime state (§3, §4.5).
///
#[doc = svgbobdoc::transform!(
/// ```svgbob
///  .---------.   arm()    .------.   tick    .---------.
/// | Stopped  | ---------> | Next | --------> | Running |
///  '---------'             '----'             '---------'
///       ^                     |
///       | stop()              | (SYNC_EXPLICIT)
///       |                     v
///       |               .---------.  sync()  .------------------------.
///       '-------------- | Waiting | <-------> | RunningSync/RunningAsync |
///                        '---------'           '------------------------'
/// ```
)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedTabState {
    Stopped,
    /// Armed by `start`/`start_abs`/chaining, waiting for the driving
    /// counter to reach the table's first expiry.
    Next,
    /// Running the action program but blocked before its first `Wait` step
    /// until an explicit-sync table receives its first `schedtab_sync` call.
    Waiting,
    /// Running with no synchronization in effect (implicit/none tables).
    Running,
    /// Running under explicit synchronization, with the last reported
    /// deviation within the table's `precision` bound.
    RunningSync,
    /// Running under explicit synchronization, with the last reported
    /// deviation outside the table's `precision` bound.
    RunningAsync,
}

pub struct ScheduleTableRt {
    pub state: Cell<SchedTabState>,
    pub action_idx: Cell<u16>,
    pub next_expiry: Cell<u64>,
    /// Accumulated `Shorten`/`Lengthen` deviation (§4.5) applied to the next
    /// `Wait` step, then reset.
    pub pending_deviation: Cell<i64>,
    /// The driving counter's value at this run's logical position zero, so
    /// `current_position = current_drive_value − sync_offset` (§3).
    pub sync_offset: Cell<u64>,
    pub link: Cell<Link>,
}

unsafe impl Sync for ScheduleTableRt {}

impl ScheduleTableRt {
    pub const INIT: Self = Self {
        state: Cell::new(SchedTabState::Stopped),
        action_idx: Cell::new(0),
        next_expiry: Cell::new(0),
        pending_deviation: Cell::new(0),
        sync_offset: Cell::new(0),
        link: Cell::new(Link::UNLINKED),
    };
}

impl Default for ScheduleTableRt {
    fn default() -> Self {
        Self::INIT
    }
}

impl<B: crate::board::Board> Kernel<B> {
    #[inline]
    pub fn schedtab_rt(&self, id: ScheduleTableId) -> Option<&ScheduleTableRt> {
        self.schedule_tables.get(id.index())
    }

    /// Record the table's logical position zero and queue its first alarm
    /// (§4.5: "records `sync_counter_offset`... transitions to NEXT or
    /// WAITING (sync) or RUNNING, and enqueues its alarm at the first `WAIT`
    /// expiry"). Explicit-sync tables start `Waiting` for their first
    /// `schedtab_sync` call; everything else starts `Next`, promoted to
    /// `Running`/`RunningSync` by [`Self::schedtab_step`]'s first tick.
    fn schedtab_arm(&self, id: ScheduleTableId, at: u64) -> KResult {
        let cfg = self.cfg.schedule_table(id).ok_or(ErrorKind::Id)?;
        let rt = self.schedtab_rt(id).ok_or(ErrorKind::Id)?;
        if rt.state.get() != SchedTabState::Stopped {
            return Err(ErrorKind::State);
        }
        rt.action_idx.set(0);
        rt.pending_deviation.set(0);
        rt.next_expiry.set(at);
        rt.sync_offset.set(at);
        rt.state.set(if cfg.flags.contains(crate::cfg::SchedTabFlags::SYNC_EXPLICIT) {
            SchedTabState::Waiting
        } else {
            SchedTabState::Next
        });
        self.counter_schedtab_insert(cfg.counter, id.0);
        Ok(())
    }

    /// `schedtab_start_rel(table_id, offset)` (§4.14).
    pub fn schedtab_start_rel(&self, id: ScheduleTableId, offset: u64) -> KResult {
        let cfg = self.cfg.schedule_table(id).ok_or(ErrorKind::Id)?;
        let now = self.counter_get(cfg.counter)?;
        self.schedtab_arm(id, now.wrapping_add(offset))
    }

    /// `schedtab_start_abs(table_id, start)` (§4.14).
    pub fn schedtab_start(&self, _cpu: CpuId, id: ScheduleTableId, start: u64) -> KResult {
        self.schedtab_arm(id, start)
    }

    /// `schedtab_stop(table_id)` (§4.14).
    pub fn schedtab_stop(&self, id: ScheduleTableId) -> KResult {
        let cfg = self.cfg.schedule_table(id).ok_or(ErrorKind::Id)?;
        let rt = self.schedtab_rt(id).ok_or(ErrorKind::Id)?;
        if rt.state.get() == SchedTabState::Stopped {
            return Err(ErrorKind::NoFunc);
        }
        self.counter_schedtab_remove(cfg.counter, id.0);
        rt.state.set(SchedTabState::Stopped);
        Ok(())
    }

    pub fn schedtab_get_state(&self, id: ScheduleTableId) -> KResult<SchedTabState> {
        Ok(self.schedtab_rt(id).ok_or(ErrorKind::Id)?.state.get())
    }

    /// `schedtab_sync(table_id, v)` (§4.5, §4.14): report the application's
    /// observed synchronization value `v`. The engine computes
    /// `deviation = v − current_position` — not the raw argument — and
    /// crossing the table's `precision` bound flips `RunningSync` to
    /// `RunningAsync` or back. Rejected for tables not configured
    /// `SYNC_EXPLICIT` (implicit/none tables never drift against an
    /// application-supplied value) or not yet running.
    pub fn schedtab_sync(&self, id: ScheduleTableId, v: i64) -> KResult {
        let cfg = self.cfg.schedule_table(id).ok_or(ErrorKind::Id)?;
        if !cfg.flags.contains(crate::cfg::SchedTabFlags::SYNC_EXPLICIT) {
            return Err(ErrorKind::Access);
        }
        let rt = self.schedtab_rt(id).ok_or(ErrorKind::Id)?;
        if !matches!(
            rt.state.get(),
            SchedTabState::Waiting | SchedTabState::RunningSync | SchedTabState::RunningAsync
        ) {
            return Err(ErrorKind::State);
        }

        let now = self.counter_get(cfg.counter)?;
        let current_position = now.wrapping_sub(rt.sync_offset.get()) as i64;
        let deviation = v - current_position;
        rt.pending_deviation.set(deviation);
        rt.state.set(if deviation.unsigned_abs() <= cfg.precision {
            SchedTabState::RunningSync
        } else {
            SchedTabState::RunningAsync
        });
        Ok(())
    }

    /// Run the action program from `rt.action_idx` until the next `Wait`
    /// step (which re-arms the table for a later tick) or the program ends.
    /// Called only from the counter's expiry walk, with the table already
    /// unlinked from that counter's queue.
    pub(crate) fn schedtab_step(&self, cpu: CpuId, id: ScheduleTableId, value: u64) {
        let cfg = self.cfg.schedule_table(id).expect("valid schedule table id");
        let rt = self.schedtab_rt(id).expect("valid schedule table id");

        if rt.state.get() == SchedTabState::Next {
            rt.state.set(if cfg.flags.contains(crate::cfg::SchedTabFlags::SYNC_IMPLICIT) {
                SchedTabState::RunningSync
            } else {
                SchedTabState::Running
            });
        }

        let mut idx = rt.action_idx.get() as usize;
        loop {
            if idx >= cfg.actions.len() {
                if cfg.flags.contains(crate::cfg::SchedTabFlags::REPEATING) {
                    idx = 0;
                    continue;
                }
                rt.state.set(SchedTabState::Stopped);
                if let Some(next) = cfg.next {
                    let _ = self.schedtab_start(cpu, next, value);
                }
                return;
            }

            match cfg.actions[idx] {
                SchedTabOp::Event { task, bit } => {
                    let _ = self.event_set(task, bit);
                    idx += 1;
                }
                SchedTabOp::Task(task) | SchedTabOp::Hook(task) => {
                    let now = B::get_time();
                    let _ = self.task_activate(now, task);
                    idx += 1;
                }
                SchedTabOp::Wait(ticks) => {
                    idx += 1;
                    let deviation = rt.pending_deviation.replace(0);
                    let expiry = (value as i64 + ticks as i64 + deviation).max(0) as u64;
                    rt.action_idx.set(idx as u16);
                    rt.next_expiry.set(expiry);
                    self.counter_schedtab_insert(cfg.counter, id.0);
                    return;
                }
                SchedTabOp::Shorten(ticks) => {
                    rt.pending_deviation.set(rt.pending_deviation.get() - ticks as i64);
                    idx += 1;
                }
                SchedTabOp::Lengthen(ticks) => {
                    rt.pending_deviation.set(rt.pending_deviation.get() + ticks as i64);
                    idx += 1;
                }
                SchedTabOp::Wrap(target) => {
                    // A chained `next` table takes over at the wrap point
                    // instead of looping within this one (§3, §4.5).
                    if let Some(next) = cfg.next {
                        rt.state.set(SchedTabState::Stopped);
                        let _ = self.schedtab_start(cpu, next, value);
                        return;
                    }
                    idx = target as usize;
                }
                SchedTabOp::Start => {
                    idx += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_kernel;

    #[test]
    fn start_stop_round_trip() {
        let k = test_kernel();
        let s = ScheduleTableId::new(0);
        k.schedtab_start_rel(s, 5).unwrap();
        // The fixture table is `SYNC_EXPLICIT`, so it starts `Waiting` for
        // its first `schedtab_sync` call rather than running immediately.
        assert_eq!(k.schedtab_get_state(s).unwrap(), SchedTabState::Waiting);
        k.schedtab_stop(s).unwrap();
        assert_eq!(k.schedtab_get_state(s).unwrap(), SchedTabState::Stopped);
    }

    #[test]
    fn double_start_is_rejected() {
        let k = test_kernel();
        let s = ScheduleTableId::new(0);
        k.schedtab_start_rel(s, 5).unwrap();
        assert_eq!(k.schedtab_start_rel(s, 5), Err(ErrorKind::State));
    }

    #[test]
    fn sync_computes_deviation_from_current_position_and_tracks_precision() {
        let k = test_kernel();
        let s = ScheduleTableId::new(0);
        k.schedtab_start_rel(s, 0).unwrap();
        // current_position = 0 at start; precision is 1 in the fixture.
        k.schedtab_sync(s, 0).unwrap();
        assert_eq!(k.schedtab_get_state(s).unwrap(), SchedTabState::RunningSync);
        k.schedtab_sync(s, 100).unwrap();
        assert_eq!(k.schedtab_get_state(s).unwrap(), SchedTabState::RunningAsync);
    }
}
