//! Scheduler Benchmark Suite
//!
//! Establishes a baseline for the engine's per-turn cost.
//!
//! # Scenarios
//!
//! 1. **Contended counter**: N tasks fight over one mutex
//!    - Measures park/handoff overhead per turn
//!
//! 2. **Pipeline**: producer/consumer over a small buffered channel
//!    - Measures value-transfer and wake costs
//!
//! 3. **Replay**: the contended-counter trace replayed
//!    - Measures trace-validation overhead against record mode

use std::cell::Cell;
use std::rc::Rc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use interlace::{Scheduler, Trace};

fn build_contended_counter(sched: &Scheduler, tasks: u32) {
    let mutex = sched.mutex();
    let counter = Rc::new(Cell::new(0u64));
    for _ in 0..tasks {
        let mutex = mutex.clone();
        let counter = counter.clone();
        sched.spawn(move |ctx| async move {
            for _ in 0..8 {
                mutex.lock().await;
                counter.set(counter.get() + 1);
                mutex.unlock();
                ctx.yield_now().await;
            }
        });
    }
}

fn run_contended_counter(seed: u64, tasks: u32) -> u64 {
    let sched = Scheduler::new(seed);
    build_contended_counter(&sched, tasks);
    sched.wait().unwrap_done();
    sched.steps()
}

fn bench_contended_counter(c: &mut Criterion) {
    let mut group = c.benchmark_group("contended_counter");
    for tasks in [4u32, 16, 64] {
        group.bench_with_input(BenchmarkId::from_parameter(tasks), &tasks, |b, &tasks| {
            let mut seed = 0u64;
            b.iter(|| {
                seed = seed.wrapping_add(1);
                black_box(run_contended_counter(seed, tasks))
            });
        });
    }
    group.finish();
}

fn bench_pipeline(c: &mut Criterion) {
    c.bench_function("pipeline_64_values", |b| {
        let mut seed = 0u64;
        b.iter(|| {
            seed = seed.wrapping_add(1);
            let sched = Scheduler::new(seed);
            let chan = sched.channel::<u64>(4);
            {
                let chan = chan.clone();
                sched.spawn(move |_ctx| async move {
                    for v in 0..64 {
                        chan.send(v).await;
                    }
                    chan.close();
                });
            }
            {
                let chan = chan.clone();
                sched.spawn(move |_ctx| async move {
                    let mut sum = 0u64;
                    while let Some(v) = chan.recv().await {
                        sum += v;
                    }
                    black_box(sum);
                });
            }
            sched.wait().unwrap_done();
        });
    });
}

fn record_counter_trace() -> Trace {
    let sched = Scheduler::new(7);
    build_contended_counter(&sched, 16);
    sched.wait().unwrap_done();
    sched.trace()
}

fn bench_replay(c: &mut Criterion) {
    let trace = record_counter_trace();
    c.bench_function("replay_contended_counter_16", |b| {
        b.iter(|| {
            let sched = Scheduler::from_trace(trace.clone());
            build_contended_counter(&sched, 16);
            let verdict = sched.wait();
            assert!(verdict.is_done());
        });
    });
}

criterion_group!(
    benches,
    bench_contended_counter,
    bench_pipeline,
    bench_replay
);
criterion_main!(benches);
