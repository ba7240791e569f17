//! Alarm engine (C4): a one-shot or cyclic trigger attached to a counter,
//! firing one configured action (§4.4).
use core::cell::Cell;

use crate::{
    cfg::AlarmAction,
    board::Board,
    error::{ErrorKind, KResult},
    id::{AlarmId, CpuId},
    kernel::Kernel,
    list::Link,
};

pub struct AlarmRt {
    pub active: Cell<bool>,
    pub expiry: Cell<u64>,
    /// `0` for a one-shot alarm; otherwise the counter value to re-arm for
    /// after firing.
    pub cycle: Cell<u64>,
    pub link: Cell<Link>,
}

unsafe impl Sync for AlarmRt {}

impl AlarmRt {
    pub const INIT: Self = Self {
        active: Cell::new(false),
        expiry: Cell::new(0),
        cycle: Cell::new(0),
        link: Cell::new(Link::UNLINKED),
    };
}

impl Default for AlarmRt {
    fn default() -> Self {
        Self::INIT
    }
}

impl<B: Board> Kernel<B> {
    #[inline]
    pub fn alarm_rt(&self, id: AlarmId) -> Option<&AlarmRt> {
        self.alarms.get(id.index())
    }

    fn arm(&self, id: AlarmId, expiry: u64, cycle: u64) -> KResult {
        let cfg = self.cfg.alarm(id).ok_or(ErrorKind::Id)?;
        let rt = self.alarm_rt(id).ok_or(ErrorKind::Id)?;
        if rt.active.get() {
            return Err(ErrorKind::State);
        }
        rt.expiry.set(expiry);
        rt.cycle.set(cycle);
        rt.active.set(true);
        self.counter_alarm_insert(cfg.counter, id.0, expiry);
        Ok(())
    }

    /// `alarm_set_rel(alarm_id, increment, cycle)` (§4.14).
    pub fn alarm_set_rel(&self, id: AlarmId, increment: u64, cycle: u64) -> KResult {
        let cfg = self.cfg.alarm(id).ok_or(ErrorKind::Id)?;
        let now = self.counter_get(cfg.counter)?;
        let counter_cfg = self.cfg.counter(cfg.counter).ok_or(ErrorKind::Id)?;
        let expiry = now.wrapping_add(increment) % (counter_cfg.max_allowed + 1);
        self.arm(id, expiry, cycle)
    }

    /// `alarm_set_abs(alarm_id, start, cycle)` (§4.14).
    pub fn alarm_set_abs(&self, id: AlarmId, start: u64, cycle: u64) -> KResult {
        self.arm(id, start, cycle)
    }

    /// `alarm_get(alarm_id)` (§4.14): ticks remaining until the next
    /// expiry, or an error if the alarm is not active.
    pub fn alarm_get(&self, id: AlarmId) -> KResult<u64> {
        let cfg = self.cfg.alarm(id).ok_or(ErrorKind::Id)?;
        let rt = self.alarm_rt(id).ok_or(ErrorKind::Id)?;
        if !rt.active.get() {
            return Err(ErrorKind::State);
        }
        let now = self.counter_get(cfg.counter)?;
        let counter_cfg = self.cfg.counter(cfg.counter).ok_or(ErrorKind::Id)?;
        let modulus = counter_cfg.max_allowed + 1;
        let expiry = rt.expiry.get();
        Ok(if expiry >= now { expiry - now } else { expiry + modulus - now })
    }

    /// `alarm_cancel(alarm_id)` (§4.14).
    pub fn alarm_cancel(&self, id: AlarmId) -> KResult {
        let cfg = self.cfg.alarm(id).ok_or(ErrorKind::Id)?;
        let rt = self.alarm_rt(id).ok_or(ErrorKind::Id)?;
        if !rt.active.get() {
            return Err(ErrorKind::NoFunc);
        }
        self.counter_alarm_remove(cfg.counter, id.0);
        rt.active.set(false);
        Ok(())
    }

    /// Fire an alarm's configured action and, if cyclic, re-arm it for the
    /// next period. Called only from [`crate::counter::Kernel::counter_increment`]'s
    /// expiry walk, which has already unlinked the alarm from its counter's
    /// queue.
    pub(crate) fn alarm_fire(&self, cpu: CpuId, id: AlarmId) {
        let cfg = self.cfg.alarm(id).expect("valid alarm id");
        let rt = self.alarm_rt(id).expect("valid alarm id");

        match cfg.action {
            AlarmAction::Event { task, bit } => {
                let _ = self.event_set(task, bit);
            }
            AlarmAction::Task(task) => {
                let now = B::get_time();
                let _ = self.task_activate(now, task);
            }
            AlarmAction::Hook(task) => {
                let now = B::get_time();
                let _ = self.task_activate(now, task);
            }
            AlarmAction::Invoke(entry) => {
                self.hm_invoke_entry(entry);
            }
            AlarmAction::Counter(counter) => {
                let _ = self.counter_increment(cpu, counter, 1);
            }
            AlarmAction::SchedTab(table) => {
                let _ = self.schedtab_start(cpu, table, 0);
            }
        }

        if rt.cycle.get() > 0 {
            let counter_cfg = self.cfg.counter(cfg.counter).expect("valid counter id");
            let next = rt.expiry.get().wrapping_add(rt.cycle.get()) % (counter_cfg.max_allowed + 1);
            rt.expiry.set(next);
            self.counter_alarm_insert(cfg.counter, id.0, next);
        } else {
            rt.active.set(false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_kernel;

    #[test]
    fn double_arm_is_rejected() {
        let k = test_kernel();
        let a = AlarmId::new(0);
        k.alarm_set_rel(a, 10, 0).unwrap();
        assert_eq!(k.alarm_set_rel(a, 10, 0), Err(ErrorKind::State));
    }

    #[test]
    fn one_shot_fires_and_deactivates() {
        let k = test_kernel();
        let a = AlarmId::new(0);
        let cfg = k.cfg.alarm(a).unwrap();
        k.alarm_set_rel(a, 5, 0).unwrap();
        k.counter_increment(0, cfg.counter, 5).unwrap();
        assert_eq!(k.alarm_get(a), Err(ErrorKind::State));
    }

    #[test]
    fn cyclic_rearms_after_firing() {
        let k = test_kernel();
        let a = AlarmId::new(0);
        let cfg = k.cfg.alarm(a).unwrap();
        k.alarm_set_rel(a, 5, 5).unwrap();
        k.counter_increment(0, cfg.counter, 5).unwrap();
        assert!(k.alarm_get(a).is_ok());
    }
}
