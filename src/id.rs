//! Typed identifiers used as stable indices into the fixed-size configuration
//! and runtime tables (§9 design notes: "pervasive pointer graphs ... become
//! typed ids, not raw pointers").
use core::fmt;

macro_rules! def_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[repr(transparent)]
        pub struct $name(pub u16);

        impl $name {
            /// Construct an id from a raw index. Does not validate that the
            /// index names a configured object; use
            /// [`crate::cfg::SystemCfg`] lookups for that.
            #[inline]
            pub const fn new(raw: u16) -> Self {
                Self(raw)
            }

            #[inline]
            pub const fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }

        impl From<u16> for $name {
            #[inline]
            fn from(raw: u16) -> Self {
                Self(raw)
            }
        }
    };
}

def_id!(
    /// Global task id, stable across partitions.
    TaskId
);
def_id!(
    /// Partition id (8-bit per the data model; widened to `u16` for uniform
    /// storage).
    PartitionId
);
def_id!(
    /// Counter id (software or hardware-backed).
    CounterId
);
def_id!(
    /// Alarm id.
    AlarmId
);
def_id!(
    /// Schedule-table id.
    ScheduleTableId
);
def_id!(
    /// Wait-queue id.
    WaitQueueId
);
def_id!(
    /// RPC channel id. Identical numeric space as the receiver's hook task.
    RpcId
);
def_id!(
    /// KLDD (Kernel-Level Device Driver) slot id.
    KlddId
);
def_id!(
    /// Shared-memory window id.
    ShmId
);
def_id!(
    /// Time-partition id.
    TimePartitionId
);
def_id!(
    /// HM (health monitor) error id, the index into an HM table.
    HmErrorId
);

/// Processor id. Every configured object has exactly one owning `CpuId`,
/// fixed at configuration time (§5).
pub type CpuId = u8;

/// Sentinel used by optional id fields (hooks, RPC peers, chained schedule
/// tables) to mean "unused" without resorting to `Option<Id>` in `#[repr(C)]`
/// configuration tables produced by the offline toolchain.
pub const ID_NONE: u16 = u16::MAX;

pub(crate) trait IdExt: Sized {
    fn is_none(&self) -> bool;
}

macro_rules! impl_id_ext {
    ($($name:ident),* $(,)?) => {
        $(
            impl IdExt for $name {
                #[inline]
                fn is_none(&self) -> bool {
                    self.0 == ID_NONE
                }
            }
        )*
    };
}

impl_id_ext!(
    TaskId,
    PartitionId,
    CounterId,
    AlarmId,
    ScheduleTableId,
    WaitQueueId,
    RpcId,
    KlddId,
    ShmId,
    TimePartitionId,
    HmErrorId
);
