use crate::time::Ticks;

/// Rejections for scheduling-context parameters.
///
/// The replenishment operations themselves have no error paths; a precondition violation there is a kernel bug and
/// asserts.  This type exists for the layer that decodes untrusted invocations: it validates parameters against the
/// platform timings before letting them anywhere near a live context.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("A budget of {budget} ticks is below the minimum of {min} ticks")]
    BudgetTooSmall { budget: Ticks, min: Ticks },

    #[error("A budget of {budget} ticks does not fit in a period of {period} ticks")]
    BudgetExceedsPeriod { budget: Ticks, period: Ticks },

    #[error("A scheduling context needs at least one refill slot")]
    NoRefillSlots,

    #[error("{requested} refill slots requested but the slot array holds only {cap}")]
    TooManyRefillSlots { requested: usize, cap: usize },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
