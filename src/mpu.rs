//! MPU programming interface (C15).
//!
//! The core owns *when* region sets are installed — on every partition
//! switch and every task switch, and nowhere else (§4.11: "the scheduler is
//! the single point where the MPU is programmed") — but not *how* a region
//! set is encoded; that is the architecture layer's business (§4.15: "the
//! core provides the data but does not prescribe register layout").
use core::ops::Range;

/// One of up to four disjoint half-open memory ranges a partition (or, for a
/// task-private stack, a task) may access.
pub type MemRange = Range<usize>;

/// An opaque, architecture-defined region-set descriptor. The core never
/// inspects its contents; it only threads the value between configuration
/// and [`crate::board::Board::mpu_part_switch`] /
/// [`crate::board::Board::mpu_task_switch`].
#[derive(Debug, Clone, Copy)]
pub struct RegionSet(pub u32);

impl RegionSet {
    /// Sentinel for "no task-private region set" (tasks that only rely on
    /// their partition's regions).
    pub const NONE: Self = Self(u32::MAX);
}

/// Checks that `range` lies entirely within one of a partition's configured
/// memory ranges. Used both by the syscall dispatcher's user-pointer
/// validation (§4.14 step 3) and by stack validation at task start (§4.15).
pub fn range_is_covered(ranges: &[MemRange], range: &MemRange) -> bool {
    if range.start > range.end {
        return false;
    }
    ranges
        .iter()
        .any(|r| range.start >= r.start && range.end <= r.end)
}

/// Stack validation at task activation time (§4.15): only the upper 32 bytes
/// of the configured stack need to lie inside a partition memory range. An
/// out-of-range stack is allowed to fault at first use rather than be
/// rejected here.
pub fn stack_top_is_plausible(ranges: &[MemRange], stack: &MemRange) -> bool {
    let top = stack.end.saturating_sub(32)..stack.end;
    range_is_covered(ranges, &top)
}

#[cfg(test)]
mod tests {
    use super::*;
    extern crate std;
    use std::vec;

    #[test]
    fn covered_within_single_range() {
        let ranges = vec![0x1000..0x2000, 0x4000..0x5000];
        assert!(range_is_covered(&ranges, &(0x1000..0x1800)));
        assert!(!range_is_covered(&ranges, &(0x1800..0x2100)));
    }

    #[test]
    fn stack_top_checks_only_last_32_bytes() {
        let ranges = vec![0x2000..0x3000];
        assert!(stack_top_is_plausible(&ranges, &(0x0..0x3000)));
        assert!(!stack_top_is_plausible(&ranges, &(0x0..0x2fff)));
    }
}
