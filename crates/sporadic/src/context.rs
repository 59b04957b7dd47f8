use crate::config::KernelTimings;
use crate::time::{CoreClock, CoreId, Ticks};

/// Everything an operation needs from its surroundings: the per-core clock, the platform timings, and the core the
/// context under mutation is affine to.
///
/// Built fresh at each call site rather than threaded through as three separate parameters.  Holding only references,
/// it is free to construct.
pub struct KernelCtx<'a, C: CoreClock> {
    clock: &'a C,
    timings: &'a KernelTimings,
    core: CoreId,
}

impl<'a, C: CoreClock> KernelCtx<'a, C> {
    pub fn new(clock: &'a C, timings: &'a KernelTimings, core: CoreId) -> Self {
        KernelCtx {
            clock,
            timings,
            core,
        }
    }

    /// The current time on this context's core.
    pub fn now(&self) -> Ticks {
        self.clock.now(self.core)
    }

    pub fn wcet(&self) -> Ticks {
        self.timings.wcet()
    }

    pub fn min_budget(&self) -> Ticks {
        self.timings.min_budget()
    }

    pub fn min_sc_budget(&self) -> Ticks {
        self.timings.min_sc_budget()
    }

    pub fn timings(&self) -> &KernelTimings {
        self.timings
    }

    pub fn core(&self) -> CoreId {
        self.core
    }
}
