use crate::time::Ticks;

/// Default multiplier applied to the measured worst-case kernel entry+exit time when deriving the minimum refill size.
///
/// Platforms with noisy timing measurements raise this to add slack; the default assumes the measured value is already
/// conservative.
pub const DEFAULT_WCET_SCALE: u64 = 1;

/// Refill slot capacity used by this crate's own tests and benches.
///
/// Real contexts pick their capacity per allocation size class; see
/// [SchedContext::max_refills_for_size_bits](crate::SchedContext::max_refills_for_size_bits).
pub const DEFAULT_CAP: usize = 16;

/// Platform timing constants, derived once from the worst-case kernel entry+exit time.
///
/// These travel inside a [KernelCtx](crate::KernelCtx) rather than living in a global: the engine has no global state,
/// and a host embedding more than one simulated platform (tests do) needs more than one set of timings.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct KernelTimings {
    wcet: Ticks,
    min_budget: Ticks,
}

impl KernelTimings {
    /// Build timings from the worst-case kernel entry+exit tick count and a scale factor.
    ///
    /// The minimum refill size is `2 * wcet * wcet_scale`: one kernel entry to start running on a refill, and one exit
    /// when it runs dry.  Anything smaller could be consumed entirely by kernel overhead.
    ///
    /// # Panics
    ///
    /// Panics if `wcet` or `wcet_scale` is zero.
    pub fn new(wcet: Ticks, wcet_scale: u64) -> KernelTimings {
        assert!(wcet > 0, "The kernel path cannot take zero time");
        assert!(wcet_scale > 0, "A zero scale would allow zero-sized refills");
        KernelTimings {
            wcet,
            min_budget: 2 * wcet * wcet_scale,
        }
    }

    /// [KernelTimings::new] with [DEFAULT_WCET_SCALE].
    pub fn with_default_scale(wcet: Ticks) -> KernelTimings {
        KernelTimings::new(wcet, DEFAULT_WCET_SCALE)
    }

    /// Worst-case kernel entry+exit, in ticks.
    pub fn wcet(&self) -> Ticks {
        self.wcet
    }

    /// The smallest refill any queue may hold.
    pub fn min_budget(&self) -> Ticks {
        self.min_budget
    }

    /// The smallest total budget a scheduling context may be given.
    ///
    /// Twice the minimum refill size, so a full budget can always be split into two standalone chunks.
    pub fn min_sc_budget(&self) -> Ticks {
        2 * self.min_budget
    }
}
