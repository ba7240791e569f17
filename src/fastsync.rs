//! Fast user/kernel priority sync (C16): a small block mapped read/write
//! into the calling task's partition so it can request a priority change
//! without trapping into the kernel for the common case, confirmed by a
//! cheap `fast_prio_sync` call (§4.14) instead of a full system call.
use core::cell::Cell;

use crate::{
    error::{ErrorKind, KResult},
    id::TaskId,
    kernel::Kernel,
};

/// One task's fast-sync block, mirroring `sys_fast_prio_sync`'s
/// `{taskid, user_prio, next_prio}` triple.
pub struct FastBlock {
    pub task: Cell<u16>,
    /// The priority the kernel last confirmed to user space.
    pub user_prio: Cell<u8>,
    /// The priority user space has requested; written directly by the task
    /// without a trap.
    pub next_prio: Cell<u8>,
}

unsafe impl Sync for FastBlock {}

impl FastBlock {
    pub const INIT: Self = Self {
        task: Cell::new(crate::id::ID_NONE),
        user_prio: Cell::new(0),
        next_prio: Cell::new(0),
    };
}

impl Default for FastBlock {
    fn default() -> Self {
        Self::INIT
    }
}

impl<B: crate::board::Board> Kernel<B> {
    fn fast_block(&self, task: TaskId) -> Option<&FastBlock> {
        let cfg = self.cfg.task(task)?;
        self.fast_blocks
            .get(cfg.partition.index())
            .filter(|b| b.task.get() == task.0)
    }

    /// `sys_fast_prio_sync()` (§4.14): adopt whatever priority user space
    /// last wrote to its fast-sync block, clamped to the closed interval
    /// `[task.base_prio, partition.max_prio]` (§4.16), then acknowledge it
    /// back.
    pub fn fast_prio_sync(&self, task: TaskId) -> KResult {
        let cfg = self.cfg.task(task).ok_or(ErrorKind::Id)?;
        let part = self.cfg.partition(cfg.partition).ok_or(ErrorKind::Id)?;
        let block = self.fast_block(task).ok_or(ErrorKind::State)?;

        let requested = block.next_prio.get().min(part.max_prio).max(cfg.base_prio);
        let rt = self.task_rt(task).ok_or(ErrorKind::Id)?;
        let current = rt.current_prio.get();
        if requested != current {
            if rt.state.get() == crate::task::TaskState::Ready {
                self.ready_queue_remove(cfg.cpu, task);
                rt.current_prio.set(requested);
                self.ready_queue_push(cfg.cpu, task);
            } else {
                rt.current_prio.set(requested);
            }
        }
        block.user_prio.set(requested);
        Ok(())
    }

    /// Bind a task to its partition's fast-sync block at activation, so the
    /// block's `taskid` always names whichever task is currently running in
    /// that slot.
    pub(crate) fn fast_sync_bind(&self, task: TaskId) {
        if let Some(cfg) = self.cfg.task(task) {
            if let Some(block) = self.fast_blocks.get(cfg.partition.index()) {
                block.task.set(task.0);
                block.user_prio.set(self.tasks[task.index()].current_prio.get());
                block.next_prio.set(self.tasks[task.index()].current_prio.get());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_kernel;

    #[test]
    fn sync_clamps_to_partition_ceiling() {
        let k = test_kernel();
        let t = TaskId::new(0);
        k.fast_sync_bind(t);
        let cfg = k.cfg.task(t).unwrap();
        let part = k.cfg.partition(cfg.partition).unwrap();
        let block = k.fast_block(t).unwrap();
        block.next_prio.set(part.max_prio.saturating_add(50));
        k.fast_prio_sync(t).unwrap();
        assert_eq!(k.tasks[t.index()].current_prio.get(), part.max_prio);
    }

    #[test]
    fn sync_clamps_to_task_base_floor() {
        let k = test_kernel();
        let t = TaskId::new(0);
        k.fast_sync_bind(t);
        let cfg = k.cfg.task(t).unwrap();
        let block = k.fast_block(t).unwrap();
        block.next_prio.set(cfg.base_prio.saturating_sub(1));
        k.fast_prio_sync(t).unwrap();
        assert_eq!(k.tasks[t.index()].current_prio.get(), cfg.base_prio);
    }
}
