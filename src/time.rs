//! Monotonic time types.
//!
//! The core measures everything in nanoseconds since boot, reported by
//! [`crate::board::Board::get_time`]. `Timeout` additionally encodes the
//! three-way "relative / non-blocking / infinite" convention from §5.
use core::ops;

/// Absolute monotonic time, in nanoseconds since boot.
pub type Time = u64;

/// A relative timeout, per §5:
///
/// - `timeout > 0`: a relative nanosecond deadline.
/// - `timeout == 0`: non-blocking; the call fails immediately with
///   [`crate::ErrorKind::Timeout`] if it would otherwise block.
/// - `timeout < 0`: block indefinitely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Timeout(i64);

impl Timeout {
    pub const INFINITE: Self = Self(-1);
    pub const NON_BLOCKING: Self = Self(0);

    #[inline]
    pub const fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    #[inline]
    pub const fn is_infinite(self) -> bool {
        self.0 < 0
    }

    #[inline]
    pub const fn is_non_blocking(self) -> bool {
        self.0 == 0
    }

    /// Resolve this timeout into an absolute expiry time given the current
    /// time, or `None` if it never expires.
    #[inline]
    pub const fn absolute(self, now: Time) -> Option<Time> {
        if self.is_infinite() {
            None
        } else {
            Some(now.wrapping_add(self.0 as u64))
        }
    }
}

impl From<i64> for Timeout {
    fn from(nanos: i64) -> Self {
        Self::from_nanos(nanos)
    }
}

/// A signed span of time, used for alarm cycles, schedule-table durations and
/// deviations. Backed by `i64` nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[repr(transparent)]
pub struct Duration(i64);

impl Duration {
    pub const ZERO: Self = Self(0);
    pub const MAX: Self = Self(i64::MAX);
    pub const MIN: Self = Self(i64::MIN);

    #[inline]
    pub const fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    #[inline]
    pub const fn as_nanos(self) -> i64 {
        self.0
    }
}

impl ops::Add for Duration {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl ops::Sub for Duration {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl ops::Neg for Duration {
    type Output = Self;
    fn neg(self) -> Self {
        Self(-self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_classification() {
        assert!(Timeout::INFINITE.is_infinite());
        assert!(Timeout::NON_BLOCKING.is_non_blocking());
        assert!(!Timeout::from_nanos(5).is_infinite());
    }

    #[test]
    fn timeout_absolute() {
        assert_eq!(Timeout::from_nanos(100).absolute(50), Some(150));
        assert_eq!(Timeout::INFINITE.absolute(50), None);
    }
}
