//! Wrapping counters with a reserved sentinel value.

/// An integer counter type that reserves one value as "unassigned".
pub trait SentinelCounter: Copy + Eq {
    /// The reserved value a counter must never produce.
    const SENTINEL: Self;

    /// Increments by one, wrapping on overflow.
    fn wrapping_succ(self) -> Self;
}

impl SentinelCounter for u32 {
    const SENTINEL: Self = Self::MAX;

    fn wrapping_succ(self) -> Self {
        self.wrapping_add(1)
    }
}

impl SentinelCounter for i32 {
    const SENTINEL: Self = -1;

    fn wrapping_succ(self) -> Self {
        self.wrapping_add(1)
    }
}

/// Returns the successor of `value`, stepping over the sentinel.
///
/// ```
/// use netarray::next_skipping_sentinel;
///
/// assert_eq!(next_skipping_sentinel(5u32), 6);
/// assert_eq!(next_skipping_sentinel(u32::MAX - 1), 0);
/// assert_eq!(next_skipping_sentinel(-2i32), 0);
/// ```
#[must_use]
pub fn next_skipping_sentinel<T: SentinelCounter>(value: T) -> T {
    let next = value.wrapping_succ();
    if next == T::SENTINEL {
        next.wrapping_succ()
    } else {
        next
    }
}
