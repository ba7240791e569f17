//! Kernel diagnostics (C17): a minimal `printf` over
//! [`crate::board::Board::putc`] and the assertion routine that backs
//! `kernel_assert` (§4.13's "the kernel dumps its own register frame and
//! halts" path). This is the only place the core does string formatting, so
//! it stays small and non-blocking rather than pulling in `core::fmt`'s
//! full write-adapter machinery beyond what `Arguments` already gives us.
use core::fmt::{self, Write};

use crate::{
    board::{Board, HaltMode},
    kernel::Kernel,
};

struct PutcWriter<B: Board>(core::marker::PhantomData<B>);

impl<B: Board> Write for PutcWriter<B> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for &byte in s.as_bytes() {
            // `putc` is non-blocking; a saturated output device just drops
            // bytes rather than spin the CPU with interrupts disabled.
            let mut attempts = 0;
            while !B::putc(byte) && attempts < 4 {
                attempts += 1;
            }
        }
        Ok(())
    }
}

impl<B: Board> Kernel<B> {
    /// `kernel_printf(...)` (§4.13, ambient diagnostics): best-effort,
    /// never blocks the caller indefinitely.
    pub fn diag_log(&self, args: fmt::Arguments<'_>) {
        let mut w = PutcWriter::<B>(core::marker::PhantomData);
        let _ = w.write_fmt(args);
        let _ = w.write_str("\n");
    }

    /// `kernel_assert(cond, msg)`: on failure, log the message and halt
    /// with [`HaltMode::HmAssert`] — there is no partition to escalate to
    /// when the kernel's own invariants have broken.
    #[track_caller]
    pub fn assert(&self, cond: bool, msg: &str) {
        if !cond {
            self.diag_log(format_args!("assertion failed: {msg}"));
            B::halt(HaltMode::HmAssert);
        }
    }
}
