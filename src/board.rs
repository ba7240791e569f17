//! External interfaces (§6): the contract between this crate and the
//! board-support / architecture layer, which the core consumes but never
//! implements.
//!
//! The contract covers the same three concerns a port layer always needs —
//! clock/threading, interrupt lines, timer — but gathered under the single
//! `Board` name, since here they're one external collaborator rather than
//! one trait per architecture concern.
use crate::{
    id::CpuId,
    mpu::RegionSet,
    time::Time,
};

/// Halt mode passed to [`Board::halt`], mirroring `board_halt(mode)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltMode {
    Halt,
    Reset,
    Shutdown,
    HmReset,
    HmShutdown,
    HmAssert,
}

/// Opaque register-frame handle. The architecture layer owns the actual
/// layout; the core only ever forwards it between itself and the board.
pub trait RegisterFrame: 'static {}

/// The interfaces the core requires from the board-support/architecture
/// layer (§6, "The core consumes the following interfaces from the board").
pub trait Board: 'static {
    type Regs: RegisterFrame;

    /// `board_get_time() -> u64`, monotonic nanoseconds.
    fn get_time() -> Time;

    /// `board_timer_resolution`, nanoseconds per timer tick, published at
    /// boot.
    fn timer_resolution_ns() -> u32;

    /// `board_putc(c) -> OK|NOFUNC`, non-blocking character output. Returns
    /// `false` if the output device isn't ready (caller should poll).
    fn putc(c: u8) -> bool;

    /// `board_mpu_init()`.
    fn mpu_init();

    /// `arch_mpu_part_switch(region_set)`.
    fn mpu_part_switch(regions: &RegionSet);

    /// `arch_mpu_task_switch(region_set)`.
    fn mpu_task_switch(regions: &RegionSet);

    /// `board_irq_enable(id)`.
    fn irq_enable(id: u32);

    /// `board_irq_disable(id)`.
    fn irq_disable(id: u32);

    /// `board_unhandled_irq_handler(id)`: called for a pending vector with no
    /// installed handler. Per the Redesign Flags resolution in §9, this
    /// raises an HM error rather than silently ignoring the vector; a
    /// genuinely spurious-interrupt vector (known to the platform, not merely
    /// unhandled) is instead counted and ignored locally by the interrupt
    /// dispatch path, not routed here.
    fn unhandled_irq_handler(id: u32);

    /// `board_ipi_broadcast(cpu_mask)` (SMP only). A no-op default suffices
    /// on single-core boards.
    fn ipi_broadcast(cpu_mask: u64) {
        let _ = cpu_mask;
    }

    /// `board_halt(mode)`.
    fn halt(mode: HaltMode) -> !;

    /// `board_hm_exception(...) -> handled?`: the board gets first refusal on
    /// an exception before the health monitor's own dispatch runs.
    fn hm_exception(
        regs: &Self::Regs,
        fatal: bool,
        hm_error_id: crate::id::HmErrorId,
        vector: u32,
        fault_addr: usize,
        aux: usize,
    ) -> bool {
        let _ = (regs, fatal, hm_error_id, vector, fault_addr, aux);
        false
    }

    /// `board_tp_switch(prev_tp, next_tp, flags)`: notification on
    /// time-partition switch.
    fn tp_switch(prev_tp: crate::id::TimePartitionId, next_tp: crate::id::TimePartitionId, flags: u32) {
        let _ = (prev_tp, next_tp, flags);
    }

    /// `board_cpu0_up()`.
    fn cpu0_up() {}

    /// `board_start_secondary_cpus()`.
    fn start_secondary_cpus() {}

    /// `board_secondary_cpu_up(cpu)`.
    fn secondary_cpu_up(cpu: CpuId) {
        let _ = cpu;
    }

    /// `board_startup_complete()`.
    fn startup_complete() {}

    /// `kernel_check_user_addr(addr, size) -> OK|ILLEGAL_ADDRESS`. The board
    /// validates the address is backed by real memory; the kernel separately
    /// checks it against the caller partition's configured memory ranges
    /// (§4.14).
    fn check_user_addr(addr: usize, size: usize) -> bool {
        let _ = (addr, size);
        true
    }
}
