//! The error taxonomy shared by every system call and by the health monitor.
//!
//! Unlike a general-purpose OS, the core never grows new error conditions at
//! the call site: every [`ErrorKind`] corresponds to one HM identifier and is
//! escalated the same way regardless of which system call produced it
//! (identifier errors are rejected synchronously, protection and platform
//! errors go through [`crate::hm`]).
use core::fmt;

/// Convenience alias for fallible kernel operations.
pub type KResult<T = ()> = Result<T, ErrorKind>;

/// The unified error taxonomy. Every variant carries an implicit HM
/// identifier of the same name (see [`ErrorKind::hm_id`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    // --- Identifier errors -------------------------------------------------
    /// An id was out of range or did not name a configured object.
    Id,
    /// The id names a real object, but the caller is not authorized to act on
    /// it (wrong partition, wrong privilege level).
    Access,
    /// The target's current state is incompatible with the requested
    /// operation.
    State,
    /// A bounded resource (activations, a queue slot, a ring slot) is
    /// exhausted.
    Limit,

    // --- Value errors --------------------------------------------------
    /// An argument fell outside its configured bounds.
    Value,
    /// A user-space pointer did not lie within the caller partition's
    /// memory ranges.
    IllegalAddress,
    /// Used both for "would block but timeout was zero" and for an expired
    /// timed wait.
    Timeout,
    /// The operation had no effect (idempotent no-op).
    NoFunc,

    // --- Protection errors ---------------------------------------------
    MpuErrorRead,
    MpuErrorWrite,
    MpuErrorCode,
    StackOverflow,
    IllegalInstruction,
    PrivilegedInstruction,
    UnalignedData,
    ArithmeticOverflow,
    FpuAccess,
    FpuError,
    Trap,

    // --- Platform errors -------------------------------------------------
    SyncBusError,
    AsyncBusError,
    CodeMemoryError,
    DataMemoryError,
    ICacheError,
    ContextError,
    ContextOverflow,
    ContextUnderflow,
    HardwareError,
    Nmi,

    // --- Application errors ----------------------------------------------
    TaskStateError,
    TaskActivationError,
    UnhandledIrq,
}

impl ErrorKind {
    /// Whether this error kind is reported synchronously to the caller of a
    /// system call (as opposed to only ever being raised through
    /// [`crate::hm`]).
    pub const fn is_syscall_error(self) -> bool {
        matches!(
            self,
            Self::Id
                | Self::Access
                | Self::State
                | Self::Limit
                | Self::Value
                | Self::IllegalAddress
                | Self::Timeout
                | Self::NoFunc
        )
    }

    /// Whether this error kind denotes a fatal CPU exception that, absent an
    /// exception hook, must escalate through the HM table rather than resume
    /// the faulting task.
    pub const fn is_protection_error(self) -> bool {
        matches!(
            self,
            Self::MpuErrorRead
                | Self::MpuErrorWrite
                | Self::MpuErrorCode
                | Self::StackOverflow
                | Self::IllegalInstruction
                | Self::PrivilegedInstruction
                | Self::UnalignedData
                | Self::ArithmeticOverflow
                | Self::FpuAccess
                | Self::FpuError
                | Self::Trap
        )
    }

    pub const fn is_platform_error(self) -> bool {
        matches!(
            self,
            Self::SyncBusError
                | Self::AsyncBusError
                | Self::CodeMemoryError
                | Self::DataMemoryError
                | Self::ICacheError
                | Self::ContextError
                | Self::ContextOverflow
                | Self::ContextUnderflow
                | Self::HardwareError
                | Self::Nmi
        )
    }
}

impl ErrorKind {
    /// The HM table index this error kind escalates through (§4.13). The
    /// offline toolchain sizes [`crate::cfg::HmTableCfg::actions`] to cover
    /// every variant; an index past the end falls back to
    /// [`crate::cfg::HmAction::Panic`] (see
    /// [`crate::cfg::SystemCfg::hm_action`]).
    pub const fn hm_id(self) -> crate::id::HmErrorId {
        crate::id::HmErrorId::new(self as u16)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// The up-to-three auxiliary `OUT` registers returned alongside a status
/// code by a system call, per §4.14.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutRegs(pub usize, pub usize, pub usize);

impl OutRegs {
    pub const NONE: Self = Self(0, 0, 0);

    pub const fn one(a: usize) -> Self {
        Self(a, 0, 0)
    }

    pub const fn two(a: usize, b: usize) -> Self {
        Self(a, b, 0)
    }
}
