//! Trace Record / Replay Round Trips
//!
//! Recording a run, then replaying its trace against the same program,
//! must reproduce the verdict with no mismatch - including through the
//! on-disk artifact format. A tampered or truncated trace must fail with
//! a diagnosable mismatch, never silently diverge.

use std::cell::Cell;
use std::rc::Rc;

use interlace::{read_trace, write_trace, Scheduler, Trace, Verdict};

/// The inverse-lock-order program: deadlocks under some seeds, completes
/// under others, which makes it ideal for replay checks.
fn build_abba(sched: &Scheduler) {
    let a = sched.mutex();
    let b = sched.mutex();
    {
        let (a, b) = (a.clone(), b.clone());
        sched.spawn(move |ctx| async move {
            a.lock().await;
            ctx.yield_now().await;
            b.lock().await;
            b.unlock();
            a.unlock();
        });
    }
    sched.spawn(move |ctx| async move {
        b.lock().await;
        ctx.yield_now().await;
        a.lock().await;
        a.unlock();
        b.unlock();
    });
}

/// Record a run of the ABBA program under `seed`.
fn record_abba(seed: u64) -> (Verdict, Trace) {
    let sched = Scheduler::new(seed);
    build_abba(&sched);
    let verdict = sched.wait();
    let trace = sched.trace();
    (verdict, trace)
}

/// Find a seed whose run deadlocks.
fn deadlocking_seed() -> u64 {
    (0..500)
        .find(|&seed| record_abba(seed).0.is_deadlock())
        .expect("some seed deadlocks")
}

#[test]
fn test_replay_reproduces_verdict() {
    for seed in 0..30 {
        let (verdict, trace) = record_abba(seed);

        let sched = Scheduler::from_trace(trace.clone());
        assert_eq!(sched.seed(), seed);
        build_abba(&sched);
        let replayed = sched.wait();

        assert_eq!(replayed, verdict, "seed {seed}");
        assert!(
            !matches!(replayed, Verdict::TraceMismatch(_)),
            "seed {seed}"
        );
    }
}

#[test]
fn test_replay_reproduces_deadlock_through_artifact_file() {
    let seed = deadlocking_seed();
    let (verdict, trace) = record_abba(seed);
    assert!(verdict.is_deadlock());

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(format!("seed_{seed}.trace"));
    write_trace(&path, &trace).unwrap();
    let loaded = read_trace(&path).unwrap();
    assert_eq!(loaded, trace);

    let sched = Scheduler::from_trace(loaded);
    build_abba(&sched);
    assert_eq!(sched.wait(), verdict);
}

#[test]
fn test_tampered_trace_is_a_mismatch() {
    let (_, mut trace) = record_abba(3);
    assert!(!trace.is_empty());
    // Claim the first pick was over a differently-sized ready set.
    trace.records[0].bound += 1;

    let sched = Scheduler::from_trace(trace);
    build_abba(&sched);
    let verdict = sched.wait();

    let Verdict::TraceMismatch(mismatch) = verdict else {
        panic!("expected mismatch, got {verdict}");
    };
    assert_eq!(mismatch.step, 0);
    assert!(mismatch.expected.is_some());
}

#[test]
fn test_truncated_trace_reports_exhaustion() {
    let (verdict, mut trace) = record_abba(3);
    assert!(verdict.is_done() || verdict.is_deadlock());
    let keep = trace.records.len() / 2;
    trace.records.truncate(keep);

    let sched = Scheduler::from_trace(trace);
    build_abba(&sched);
    let verdict = sched.wait();

    let Verdict::TraceMismatch(mismatch) = verdict else {
        panic!("expected mismatch, got {verdict}");
    };
    assert_eq!(mismatch.step, keep as u64);
    assert!(mismatch.expected.is_none());
}

#[test]
fn test_replay_with_timers_and_channels() {
    let build = |sched: &Scheduler| {
        let chan = sched.channel::<u32>(0);
        let hits = Rc::new(Cell::new(0u32));
        {
            let chan = chan.clone();
            sched.spawn(move |ctx| async move {
                ctx.sleep(std::time::Duration::from_millis(2)).await;
                chan.send(1).await;
            });
        }
        {
            let hits = hits.clone();
            sched.spawn(move |ctx| async move {
                let timer = ctx.after(std::time::Duration::from_millis(1));
                timer.recv().await.unwrap();
                hits.set(hits.get() + 1);
                chan.recv().await.unwrap();
            });
        }
    };

    let sched = Scheduler::new(17);
    build(&sched);
    let verdict = sched.wait();
    let trace = sched.trace();
    assert!(verdict.is_done());

    let replayer = Scheduler::from_trace(trace.clone());
    build(&replayer);
    assert_eq!(replayer.wait(), verdict);
    assert_eq!(replayer.trace(), trace);
}
