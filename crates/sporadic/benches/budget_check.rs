use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use rand::prelude::*;

use sporadic::{
    CoreClock, KernelCtx, KernelTimings, ManualClock, SchedContext, SchedParams, Ticks,
    DEFAULT_CAP,
};

const BUDGET: Ticks = 10_000;
const PERIOD: Ticks = 100_000;

/// The dispatch loop's steady state: wait for the head refill, consume it exactly, reschedule.
pub fn charge_exact(c: &mut Criterion) {
    let mut group = c.benchmark_group("budget_check");
    group.throughput(Throughput::Elements(1));

    group.bench_function("charge_exact", |b| {
        let timings = KernelTimings::with_default_scale(5);
        let mut clock = ManualClock::new(1);
        let mut sc = SchedContext::<DEFAULT_CAP>::inactive(0);
        sc.activate(
            &KernelCtx::new(&clock, &timings, 0),
            SchedParams::new(BUDGET, PERIOD, DEFAULT_CAP),
        );

        b.iter(|| {
            let next = sc.next_eligible().max(clock.now(0));
            clock.set(0, next);
            let ctx = KernelCtx::new(&clock, &timings, 0);
            let usage = sc.capacity(0);
            sc.budget_check(&ctx, black_box(usage));
        });
    });

    group.finish();
}

/// Wake, partially consume a random amount, repeat.  Exercises the split and merge paths and keeps the queue churning
/// near its capacity.
pub fn charge_partial_random(c: &mut Criterion) {
    let mut group = c.benchmark_group("budget_check");
    group.throughput(Throughput::Elements(1));

    group.bench_function("charge_partial_random", |b| {
        let timings = KernelTimings::with_default_scale(5);
        let mut clock = ManualClock::new(1);
        let mut sc = SchedContext::<DEFAULT_CAP>::inactive(0);
        sc.activate(
            &KernelCtx::new(&clock, &timings, 0),
            SchedParams::new(BUDGET, PERIOD, DEFAULT_CAP),
        );

        let mut rng = StdRng::seed_from_u64(5);
        let usages: Vec<Ticks> = (0..1024).map(|_| rng.gen_range(1..BUDGET)).collect();
        let mut i = 0usize;

        b.iter(|| {
            let next = sc.next_eligible().max(clock.now(0));
            clock.set(0, next);
            let ctx = KernelCtx::new(&clock, &timings, 0);
            let _ = sc.unblock_check(&ctx);
            let usage = usages[i & 1023].min(sc.capacity(0));
            i += 1;
            sc.budget_check(&ctx, black_box(usage));
        });
    });

    group.finish();
}

criterion_group!(benches, charge_exact);
criterion_group!(benches2, charge_partial_random);
criterion_main!(benches, benches2);
