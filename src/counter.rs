//! Counter engine (C3): the tick source that drives alarms and schedule
//! tables, mirroring `counter.c`/`counter_state.h` in the original hypervisor
//! (their implementations were filtered out of the retrieved sources; only
//! the header-level data model survived, so the increment/expiry loop here
//! is derived from that model plus §4.3's invariants).
use core::cell::Cell;

use crate::{
    board::Board,
    cfg::CounterKind,
    error::{ErrorKind, KResult},
    id::{CounterId, CpuId},
    kernel::Kernel,
    list::{Accessor, Index, Link, ListHead},
    time::Time,
};

/// Per-counter runtime state (§3). Software counters are driven by
/// `counter_increment`; hardware counters instead mirror a free-running
/// register sampled once per [`crate::sched::PerCpu::tick`].
pub struct CounterRt {
    pub value: Cell<u64>,
    /// Alarms attached to this counter, ordered by absolute expiry value.
    pub alarm_head: Cell<ListHead>,
    /// Schedule tables attached to this counter, ordered the same way.
    pub schedtab_head: Cell<ListHead>,
}

unsafe impl Sync for CounterRt {}

impl CounterRt {
    pub const INIT: Self = Self {
        value: Cell::new(0),
        alarm_head: Cell::new(ListHead::EMPTY),
        schedtab_head: Cell::new(ListHead::EMPTY),
    };
}

impl Default for CounterRt {
    fn default() -> Self {
        Self::INIT
    }
}

impl<B: Board> Kernel<B> {
    #[inline]
    pub fn counter_rt(&self, id: CounterId) -> Option<&CounterRt> {
        self.counters.get(id.index())
    }

    fn counter_alarm_accessor<'a>(&'a self, id: CounterId) -> Accessor<'a, impl Fn(Index) -> &'a Cell<Link> + 'a> {
        let head = &self.counters[id.index()].alarm_head;
        Accessor::new(head, move |i| &self.alarms[i as usize].link)
    }

    fn counter_schedtab_accessor<'a>(&'a self, id: CounterId) -> Accessor<'a, impl Fn(Index) -> &'a Cell<Link> + 'a> {
        let head = &self.counters[id.index()].schedtab_head;
        Accessor::new(head, move |i| &self.schedule_tables[i as usize].link)
    }

    pub(crate) fn counter_alarm_insert(&self, counter: CounterId, alarm_idx: u16, expiry: u64) {
        let alarms = self.alarms;
        self.counter_alarm_accessor(counter)
            .insert_sorted(alarm_idx, |a, b| {
                alarms[a as usize].expiry.get() < alarms[b as usize].expiry.get()
            });
        let _ = expiry;
    }

    pub(crate) fn counter_alarm_remove(&self, counter: CounterId, alarm_idx: u16) {
        self.counter_alarm_accessor(counter).remove(alarm_idx);
    }

    pub(crate) fn counter_schedtab_insert(&self, counter: CounterId, idx: u16) {
        let tabs = self.schedule_tables;
        self.counter_schedtab_accessor(counter).insert_sorted(idx, |a, b| {
            tabs[a as usize].next_expiry.get() < tabs[b as usize].next_expiry.get()
        });
    }

    pub(crate) fn counter_schedtab_remove(&self, counter: CounterId, idx: u16) {
        self.counter_schedtab_accessor(counter).remove(idx);
    }

    /// `ctr_increment(counter_id, ticks)` (§4.14): advance a software
    /// counter, saturating at `max_allowed` and wrapping back to zero per
    /// the counter's configured modulus, then fire every alarm and
    /// schedule-table step whose expiry has been reached.
    pub fn counter_increment(&self, cpu: CpuId, id: CounterId, ticks: u64) -> KResult {
        let cfg = self.cfg.counter(id).ok_or(ErrorKind::Id)?;
        if cfg.kind != CounterKind::Software {
            return Err(ErrorKind::Access);
        }
        let rt = self.counter_rt(id).ok_or(ErrorKind::Id)?;
        let next = rt.value.get().wrapping_add(ticks) % (cfg.max_allowed + 1);
        rt.value.set(next);
        self.counter_fire_expired(cpu, id, next);
        Ok(())
    }

    pub fn counter_get(&self, id: CounterId) -> KResult<u64> {
        Ok(self.counter_rt(id).ok_or(ErrorKind::Id)?.value.get())
    }

    /// `ctr_elapsed(counter_id, since)` (§4.14): ticks elapsed since `since`,
    /// accounting for one wraparound.
    pub fn counter_elapsed(&self, id: CounterId, since: u64) -> KResult<u64> {
        let cfg = self.cfg.counter(id).ok_or(ErrorKind::Id)?;
        let now = self.counter_rt(id).ok_or(ErrorKind::Id)?.value.get();
        Ok(if now >= since {
            now - since
        } else {
            now + (cfg.max_allowed + 1 - since)
        })
    }

    /// Drive every counter-driven object whose expiry has been reached by
    /// `value`: fire the alarm's configured action (§4.4) or step the
    /// schedule table's action program (§4.5).
    fn counter_fire_expired(&self, cpu: CpuId, counter: CounterId, value: u64) {
        loop {
            let Some(idx) = self.counter_alarm_accessor(counter).first() else {
                break;
            };
            if self.alarms[idx as usize].expiry.get() > value {
                break;
            }
            self.counter_alarm_accessor(counter).remove(idx);
            self.alarm_fire(cpu, crate::id::AlarmId::new(idx));
        }
        loop {
            let Some(idx) = self.counter_schedtab_accessor(counter).first() else {
                break;
            };
            if self.schedule_tables[idx as usize].next_expiry.get() > value {
                break;
            }
            self.counter_schedtab_accessor(counter).remove(idx);
            self.schedtab_step(cpu, crate::id::ScheduleTableId::new(idx), value);
        }
    }

    /// Hardware counters free-run with the board clock; sample them once per
    /// timer tick instead of waiting for an explicit `ctr_increment` call.
    pub(crate) fn kernel_increment_free_counters(&self, cpu: CpuId, now: Time) {
        for (idx, cfg) in self.cfg.counters.iter().enumerate() {
            if cfg.kind == CounterKind::Hardware && cfg.cpu == cpu {
                let rt = &self.counters[idx];
                let ticks = (now / cfg.min_cycle.max(1)) % (cfg.max_allowed + 1);
                if ticks != rt.value.get() {
                    rt.value.set(ticks);
                    self.counter_fire_expired(cpu, CounterId::new(idx as u16), ticks);
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
    fn increment_wraps_at_max_allowed() {
        let k = test_kernel();
        let c = CounterId::new(0);
        let cfg = k.cfg.counter(c).unwrap();
        k.counter_increment(0, c, cfg.max_allowed).unwrap();
        assert_eq!(k.counter_get(c).unwrap(), cfg.max_allowed);
        k.counter_increment(0, c, 1).unwrap();
        assert_eq!(k.counter_get(c).unwrap(), 0);
    }

    #[test]
    fn elapsed_accounts_for_wraparound() {
        let k = test_kernel();
        let c = CounterId::new(0);
        let cfg = k.cfg.counter(c).unwrap();
        k.counter_increment(0, c, cfg.max_allowed).unwrap();
        k.counter_increment(0, c, 2).unwrap();
        assert_eq!(k.counter_elapsed(c, cfg.max_allowed).unwrap(), 2);
    }
}
