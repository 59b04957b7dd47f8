//! Scheduling contexts and the sporadic-server replenishment policy.
//!
//! A scheduling context is a bandwidth reservation: a thread bound to one may execute for at most `budget` ticks
//! inside any sliding window of `period` ticks.  The reservation is tracked as a circular queue of refills, where a
//! refill `(time, amount)` says that `amount` ticks of execution become eligible at wall time `time`.  Time the thread
//! consumes is scheduled to become eligible again exactly one period after it first was, which is the entire trick:
//! replaying consumption one period later is what keeps every window of one period from seeing more than `budget`
//! ticks of execution.
//!
//! Between operations the queue obeys a strict discipline: it is never empty, adjacent refills are ordered and
//! disjoint, every refill is at least the platform minimum, the amounts sum to the budget, and the whole queue spans
//! at most one period.  Each mutating operation may bend these rules internally but must restore them before
//! returning.  Debug builds verify that at the boundary of every mutator; release builds compile the checks out.
//!
//! The operations have no error paths.  They are called from the kernel's dispatch and invocation paths where a bad
//! argument is a kernel bug, so preconditions are assertions; parameter validation for untrusted callers lives in
//! [SchedParams::validate], one layer up.

use crate::config::KernelTimings;
use crate::context::KernelCtx;
use crate::data_structures::{Refill, RefillRing};
use crate::error::{Error, Result};
use crate::time::{CoreClock, CoreId, Ticks};

/// The parameters of a bandwidth reservation, as handed in by the invocation layer.
///
/// [SchedParams::validate] is the untrusted-caller boundary.  The engine re-asserts the same conditions, so a caller
/// that skips validation gets a panic rather than a corrupted queue.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SchedParams {
    /// Execution allowed per window, in ticks.
    pub budget: Ticks,

    /// Window length, in ticks.
    pub period: Ticks,

    /// Usable refill slots, decided by the context's allocation size class.
    pub max_refills: usize,
}

impl SchedParams {
    pub fn new(budget: Ticks, period: Ticks, max_refills: usize) -> SchedParams {
        SchedParams {
            budget,
            period,
            max_refills,
        }
    }

    /// Check these parameters against the platform timings and a slot capacity.
    ///
    /// A valid budget is at least twice the minimum refill size, so that it can always be split into two standalone
    /// chunks, and no larger than the period.  A budget equal to the period is allowed; that configuration is
    /// round-robin and sidesteps the replenishment machinery entirely.
    pub fn validate(&self, timings: &KernelTimings, cap: usize) -> Result<()> {
        if self.max_refills == 0 {
            return Err(Error::NoRefillSlots);
        }
        if self.max_refills > cap {
            return Err(Error::TooManyRefillSlots {
                requested: self.max_refills,
                cap,
            });
        }
        if self.budget < timings.min_sc_budget() {
            return Err(Error::BudgetTooSmall {
                budget: self.budget,
                min: timings.min_sc_budget(),
            });
        }
        if self.budget > self.period {
            return Err(Error::BudgetExceedsPeriod {
                budget: self.budget,
                period: self.period,
            });
        }
        Ok(())
    }

    fn assert_valid(&self, timings: &KernelTimings, cap: usize) {
        if let Err(e) = self.validate(timings, cap) {
            panic!("Invalid scheduling parameters: {}", e);
        }
    }
}

/// A scheduling context: one thread's bandwidth reservation on one core.
///
/// `CAP` is the compile-time slot capacity for this context's size class; the usable slot count is fixed per
/// activation and may be anything in `1..=CAP`.  The slot array is inline, so a context is a single flat allocation
/// and the engine never allocates.
///
/// A context starts `inactive` and is activated at most once by [SchedContext::activate]; after that it only ever
/// moves between configurations via [SchedContext::reconfigure].  Destruction is the allocator's business, not ours.
#[derive(Clone, Debug)]
pub struct SchedContext<const CAP: usize> {
    period: Ticks,
    budget: Ticks,
    core: CoreId,
    refills: RefillRing<CAP>,
}

impl<const CAP: usize> SchedContext<CAP> {
    /// A context as the allocator hands it out: memory owned, no bandwidth configured.
    pub const fn inactive(core: CoreId) -> Self {
        SchedContext {
            period: 0,
            budget: 0,
            core,
            refills: RefillRing::unconfigured(),
        }
    }

    /// How many refill slots fit in a `2^size_bits`-byte allocation, after the context header.
    ///
    /// Saturates at `CAP`; returns 0 when the allocation cannot even hold the header plus one slot, in which case the
    /// size class is unusable for contexts.
    pub fn max_refills_for_size_bits(size_bits: u32) -> usize {
        let header = std::mem::size_of::<SchedContext<0>>();
        let refill = std::mem::size_of::<Refill>();
        let total = match 1usize.checked_shl(size_bits) {
            Some(t) => t,
            None => return CAP,
        };
        if total < header + refill {
            return 0;
        }
        ((total - header) / refill).min(CAP)
    }

    // ── Queries ──────────────────────────────────────────────────────────
    //
    // All pure; none of them touch the queue.

    /// Has this context been given a reservation yet?
    pub fn is_active(&self) -> bool {
        self.refills.is_configured()
    }

    /// Round-robin contexts use the whole period as budget and are scheduled by a different policy; the replenishment
    /// operations leave them alone.
    pub fn is_round_robin(&self) -> bool {
        self.budget == self.period
    }

    pub fn budget(&self) -> Ticks {
        self.budget
    }

    pub fn period(&self) -> Ticks {
        self.period
    }

    pub fn core(&self) -> CoreId {
        self.core
    }

    /// Usable refill slots for this activation.
    pub fn max_refills(&self) -> usize {
        self.refills.max_refills()
    }

    /// Refills currently queued.
    pub fn refill_count(&self) -> usize {
        self.refills.len()
    }

    pub fn refills_full(&self) -> bool {
        self.refills.is_full()
    }

    pub fn refills_empty(&self) -> bool {
        self.refills.is_empty()
    }

    /// When the front refill becomes eligible.  The dispatcher programs its timer off this.
    pub fn next_eligible(&self) -> Ticks {
        self.refills.head().time
    }

    /// Budget remaining on the front refill if `usage` ticks were charged against it.
    pub fn capacity(&self, usage: Ticks) -> Ticks {
        self.refills.head().amount.saturating_sub(usage)
    }

    /// Would charging `usage` ticks leave enough for a full kernel entry and exit?
    ///
    /// A thread dispatched without sufficient budget could be cut down inside the kernel, so the dispatcher checks
    /// this before switching to the thread.
    pub fn sufficient<C: CoreClock>(&self, ctx: &KernelCtx<C>, usage: Ticks) -> bool {
        self.capacity(usage) >= ctx.min_budget()
    }

    /// Is the front refill eligible to start?
    ///
    /// One wcet of slack is added so a thread can begin its kernel entry just before the refill's nominal start and
    /// still land inside it.
    pub fn ready<C: CoreClock>(&self, ctx: &KernelCtx<C>) -> bool {
        self.refills.head().time <= ctx.now() + ctx.wcet()
    }

    // ── Mutators ─────────────────────────────────────────────────────────

    /// Give an inactive context its first reservation.
    ///
    /// The entire budget becomes eligible immediately, as a single refill stamped with the current time.
    ///
    /// # Panics
    ///
    /// Panics if the context is already active or the parameters fail [SchedParams::validate].
    pub fn activate<C: CoreClock>(&mut self, ctx: &KernelCtx<C>, params: SchedParams) {
        assert!(
            !self.is_active(),
            "Attempt to activate a context that already has a reservation"
        );
        params.assert_valid(ctx.timings(), CAP);

        self.period = params.period;
        self.budget = params.budget;
        self.refills.reset(params.max_refills);
        self.refills.push_tail(Refill::new(ctx.now(), params.budget));

        klog_debug!(
            "activated context on core {}: budget {} over period {}, {} slots",
            self.core,
            self.budget,
            self.period,
            params.max_refills
        );
        self.debug_check_consistency(ctx.timings());
    }

    /// Replace a live context's reservation.
    ///
    /// The thread may be running right now, so the new bandwidth bound must hold during the switch, not only after
    /// it: no moment may exist at which more than the new budget could be consumed over any window of the new period.
    /// Everything except the refill the thread is currently drawing on is therefore dropped.  If that survivor covers
    /// more than the new budget the excess is forfeited; if it covers less, the missing amount is scheduled one new
    /// period out, where the sliding window first admits it.
    ///
    /// # Panics
    ///
    /// Panics if the context is inactive or the parameters fail [SchedParams::validate].
    pub fn reconfigure<C: CoreClock>(&mut self, ctx: &KernelCtx<C>, params: SchedParams) {
        assert!(
            self.is_active(),
            "Attempt to reconfigure a context with no reservation"
        );
        params.assert_valid(ctx.timings(), CAP);
        self.debug_check_consistency(ctx.timings());

        // Keep only the refill in use.  Moving it to slot 0 first is what makes a shrinking slot count safe.
        self.refills.collapse(params.max_refills);
        self.period = params.period;
        self.budget = params.budget;

        if self.ready(ctx) {
            // An eligible refill must not start later than it has to under the new configuration.
            self.refills.head_mut().time = ctx.now();
        }

        let head = *self.refills.head();
        if head.amount >= params.budget {
            self.refills.head_mut().amount = params.budget;
        } else {
            let unused = params.budget - head.amount;
            self.schedule_used(ctx, Refill::new(head.time + params.period - unused, unused));
        }

        klog_debug!(
            "reconfigured context on core {}: budget {} over period {}, {} slots",
            self.core,
            self.budget,
            self.period,
            params.max_refills
        );
        self.debug_check_consistency(ctx.timings());
    }

    /// Charge `usage` ticks of execution to this context.
    ///
    /// The dispatcher calls this for the context whose thread just ran.  The charged time is deducted from the front
    /// of the queue and scheduled to become eligible again one period after the front refill's start.
    ///
    /// If the thread ran past its eligibility window, or consumed more than the front refill held, that is a
    /// bandwidth overrun.  Overrun is a normal policy outcome, not an error: the queue collapses to a single
    /// full-budget refill far enough in the future that the sliding-window bound holds again.
    ///
    /// No-op for round-robin contexts; their budget is managed elsewhere.
    ///
    /// # Panics
    ///
    /// Panics if the context is inactive.  The caller must also guarantee this is the currently-running context on
    /// its core, which the engine cannot check.
    pub fn budget_check<C: CoreClock>(&mut self, ctx: &KernelCtx<C>, usage: Ticks) {
        assert!(
            self.is_active(),
            "Attempt to charge a context with no reservation"
        );
        if self.is_round_robin() {
            return;
        }
        self.debug_check_consistency(ctx.timings());

        if usage == 0 {
            return;
        }

        // Where the consumed time was drawn from; it replenishes one period after this.
        let last_entry = self.refills.head().time;

        if !self.ready(ctx) || self.refills.head().amount < usage {
            klog_trace!(
                "overrun on core {}: charged {} against a head of {}",
                self.core,
                usage,
                self.refills.head().amount
            );
            // The accounting is no longer exact, so be conservative: delay the whole budget until the window
            // constraint is certain to hold again.
            self.refills.clear();
            self.schedule_used(
                ctx,
                Refill::new(last_entry + self.period + usage, self.budget),
            );
            self.debug_check_consistency(ctx.timings());
            return;
        }

        let head_amount = self.refills.head().amount;
        let mut used = Refill::new(last_entry + self.period, usage);

        if usage == head_amount {
            self.refills.pop_head();
        } else {
            let remnant = head_amount - usage;
            if remnant >= ctx.min_budget() {
                // The remnant can stand alone; it stays eligible from the point consumption stopped.
                let head = self.refills.head_mut();
                head.amount = remnant;
                head.time += usage;
            } else {
                // Too small to stand alone.  Pop, and donate the remnant to whatever runs next.
                self.refills.pop_head();
                if self.refills.is_empty() {
                    used.time -= remnant;
                    used.amount += remnant;
                } else {
                    let head = self.refills.head_mut();
                    head.time -= remnant;
                    head.amount += remnant;
                }
            }
        }

        self.schedule_used(ctx, used);
        self.debug_check_consistency(ctx.timings());
    }

    /// Note that this context's thread just became runnable again.
    ///
    /// An eligible head refill is slid forward so the budget window starts counting from now rather than from
    /// whenever the thread blocked; without the slide, a thread could sleep through most of its refill and then
    /// execute the whole amount at the window's edge, squeezing more than one budget into one period.  Sliding can
    /// make the head overlap its successors, which are folded in until the queue is disjoint again.
    ///
    /// Returns true when the next timer interrupt must be reprogrammed.  No-op for round-robin contexts.
    ///
    /// # Panics
    ///
    /// Panics if the context is inactive.
    #[must_use]
    pub fn unblock_check<C: CoreClock>(&mut self, ctx: &KernelCtx<C>) -> bool {
        assert!(
            self.is_active(),
            "Attempt an unblock check on a context with no reservation"
        );
        if self.is_round_robin() {
            return false;
        }
        self.debug_check_consistency(ctx.timings());

        if !self.ready(ctx) {
            return false;
        }

        let eligible = ctx.now() + ctx.wcet();
        self.refills.head_mut().time = eligible;

        while self.refills.len() > 1 && self.refills.get(1).time <= self.refills.head().end() {
            let amount = self.refills.pop_head().amount;
            let head = self.refills.head_mut();
            head.amount += amount;
            head.time = eligible;
        }

        self.debug_check_consistency(ctx.timings());
        debug_assert!(self.ready(ctx) && self.sufficient(ctx, 0));
        true
    }

    /// Append the refill covering just-consumed time, preserving the queue discipline.
    ///
    /// The caller guarantees `new` starts no earlier than the current tail ends.  Four cases, tried in order:
    ///
    /// 1. Empty queue: push, done.  `new` must then be at least the minimum refill size on its own.
    /// 2. `new` is undersized but the tail can spare the difference: move ticks from the end of the tail to the front
    ///    of `new` until `new` reaches the minimum, then push both.  Preferred over merging whenever feasible because
    ///    two small refills make the thread dispatchable sooner than one large late one.
    /// 3. `new` is undersized with nothing to borrow, or the queue is full: fold `new` into the tail.  The merged
    ///    refill keeps ending where `new` ended, so the consumed time still replenishes no earlier than it should.
    /// 4. Otherwise: push.
    fn schedule_used<C: CoreClock>(&mut self, ctx: &KernelCtx<C>, new: Refill) {
        let min_budget = ctx.min_budget();

        if self.refills.is_empty() {
            debug_assert!(new.amount >= min_budget);
            self.refills.push_tail(new);
            return;
        }

        debug_assert!(new.time >= self.refills.tail().end());

        if new.amount < min_budget
            && !self.refills.is_full()
            && self.refills.tail().amount + new.amount >= 2 * min_budget
        {
            let remainder = min_budget - new.amount;
            self.refills.tail_mut().amount -= remainder;
            self.refills
                .push_tail(Refill::new(new.time - remainder, min_budget));
        } else if new.amount < min_budget || self.refills.is_full() {
            let tail = self.refills.tail_mut();
            tail.time = new.time - tail.amount;
            tail.amount += new.amount;
        } else {
            self.refills.push_tail(new);
        }
    }

    /// Verify the whole queue discipline.  Compiled to nothing in release builds.
    ///
    /// Lives here rather than in a test module so the checks run at every mutator boundary in any debug build, not
    /// only under this crate's own tests.
    #[cfg(debug_assertions)]
    fn debug_check_consistency(&self, timings: &KernelTimings) {
        assert!(
            self.refills.len() >= 1,
            "An active context always holds at least one refill"
        );
        assert!(self.refills.len() <= self.refills.max_refills());

        let mut sum: Ticks = 0;
        for r in self.refills.iter() {
            assert!(
                r.amount >= timings.min_budget(),
                "Refill of {} ticks is below the minimum of {}",
                r.amount,
                timings.min_budget()
            );
            sum += r.amount;
        }
        assert_eq!(sum, self.budget, "Refill amounts must sum to the budget");

        for i in 0..self.refills.len() - 1 {
            assert!(
                self.refills.get(i).end() <= self.refills.get(i + 1).time,
                "Refills must be ordered and disjoint"
            );
        }

        assert!(
            self.refills.tail().end() - self.refills.head().time <= self.period,
            "The queue must fit inside one period"
        );
    }

    #[cfg(not(debug_assertions))]
    #[inline(always)]
    fn debug_check_consistency(&self, _timings: &KernelTimings) {}
}
