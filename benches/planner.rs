// Benchmark for look-ahead planning throughput
// Run with: cargo bench

use criterion::{criterion_group, criterion_main, Criterion};
use swerve::{MoveLimits, MoveQueue};

fn queue_moves(mq: &mut MoveQueue, limits: &MoveLimits, count: usize) {
    for i in 0..count {
        // Zig-zag junction caps so the planner alternates accel and decel.
        let vj = if i == 0 {
            0.
        } else if i % 4 == 0 {
            5.
        } else {
            60.
        };
        mq.add_move(2.0 + (i % 7) as f64, vj * vj, limits).unwrap();
    }
}

fn bench_plan_and_drain(c: &mut Criterion) {
    for &accel_order in &[2u32, 6] {
        let limits = MoveLimits {
            velocity: 100.,
            accel: 3000.,
            smoothed_accel: 1500.,
            jerk: 100_000.,
            min_jerk_limit_time: 0.02,
            accel_order,
            accel_comp: 0.,
        };
        c.bench_function(&format!("plan 100 moves, order {}", accel_order), |b| {
            b.iter(|| {
                let mut mq = MoveQueue::new();
                queue_moves(&mut mq, &limits, 100);
                let flushed = mq.plan(false).unwrap();
                assert_eq!(flushed, 100);
                let mut total = 0.;
                for _ in 0..flushed {
                    total += mq.next_move().unwrap().total_time();
                }
                assert!(total > 0.);
            });
        });
    }
}

criterion_group!(benches, bench_plan_and_drain);
criterion_main!(benches);
