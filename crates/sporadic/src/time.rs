/// Kernel time, measured in timer ticks.
///
/// All of the arithmetic in this crate is over ticks: budgets, periods, and refill eligibility times are tick counts,
/// and 64 bits of ticks does not wrap on any realistic timer frequency.
pub type Ticks = u64;

/// Identifies the processor a scheduling context is affine to.
pub type CoreId = usize;

/// A source of per-core wall-clock time.
///
/// The engine never caches time across operations: every operation reads the clock through this trait exactly when it
/// needs it, on the core the scheduling context is affine to.  The kernel proper backs this with its per-core timer
/// state; tests and hosts use [ManualClock].
pub trait CoreClock {
    /// The current tick count on the given core.
    fn now(&self, core: CoreId) -> Ticks;
}

/// A clock advanced by hand.
///
/// Hosts mirror their hardware timer into one of these; tests drive it directly.
///
/// Clocks cannot go backward by design.
#[derive(Debug)]
pub struct ManualClock {
    times: Vec<Ticks>,
}

impl ManualClock {
    /// Create a clock for `cores` processors, all at time zero.
    pub fn new(cores: usize) -> ManualClock {
        ManualClock {
            times: vec![0; cores],
        }
    }

    /// Advance one core's clock.
    pub fn advance(&mut self, core: CoreId, ticks: Ticks) {
        self.times[core] += ticks;
    }

    /// Set one core's clock to an absolute time.
    ///
    /// # Panics
    ///
    /// Panics if `time` is in the past for that core.
    pub fn set(&mut self, core: CoreId, time: Ticks) {
        assert!(
            time >= self.times[core],
            "Attempt to move a clock backward from {} to {}",
            self.times[core],
            time
        );
        self.times[core] = time;
    }
}

impl CoreClock for ManualClock {
    fn now(&self, core: CoreId) -> Ticks {
        self.times[core]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic() {
        let mut clock = ManualClock::new(2);
        clock.advance(0, 5);
        assert_eq!(clock.now(0), 5);
        assert_eq!(clock.now(1), 0);
        clock.set(0, 100);
        assert_eq!(clock.now(0), 100);
    }

    #[test]
    #[should_panic]
    fn backward_set_panics() {
        let mut clock = ManualClock::new(1);
        clock.set(0, 10);
        clock.set(0, 9);
    }
}
