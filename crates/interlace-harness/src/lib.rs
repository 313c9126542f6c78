//! Interlace Harness - Seed Exploration and Replay Driver
//!
//! # Overview
//!
//! The engine proper runs exactly one seed; this crate is the outward
//! test-driver surface built on its contract: pick seeds, run the user's
//! build function under each, collect failing seeds, and write replayable
//! trace artifacts for them.
//!
//! # Usage
//!
//! ```rust
//! use interlace_harness::{explore, ExploreConfig};
//!
//! let config = ExploreConfig {
//!     runs: 25,
//!     ..ExploreConfig::default()
//! };
//! let report = explore(&config, |sched| {
//!     let chan = sched.channel::<u32>(1);
//!     let tx = chan.clone();
//!     sched.spawn(move |_ctx| async move { tx.send(7).await });
//!     sched.spawn(move |_ctx| async move {
//!         assert_eq!(chan.recv().await, Some(7));
//!     });
//! });
//! report.assert_ok();
//! ```
//!
//! # Environment Knobs
//!
//! [`ExploreConfig::from_env`] reads the conventional variables:
//!
//! | Variable         | Meaning                                    | Default |
//! |------------------|--------------------------------------------|---------|
//! | `RUNS`           | seeds to try per exploration               | 100     |
//! | `SEED`           | pin one seed (overrides random selection)  | unset   |
//! | `MAX_STEPS`      | scheduling-turn budget per run             | 10^7    |
//! | `MAX_LOGICAL_MS` | virtual-time budget per run, milliseconds  | 60000   |
//! | `TRACE`          | directory for failure trace artifacts      | unset   |

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::env;
use std::fmt;
use std::hash::{BuildHasher, Hasher};
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

use interlace::{write_trace, Scheduler, SchedulerConfig, Trace, Verdict};

/// Configuration for a seed exploration.
#[derive(Debug, Clone)]
pub struct ExploreConfig {
    /// Number of seeds to try when no seed is pinned.
    pub runs: usize,
    /// Pin a specific seed; exploration then runs exactly once.
    pub seed: Option<u64>,
    /// Scheduling-turn budget per run.
    pub max_steps: u64,
    /// Virtual-time budget per run.
    pub max_logical: Duration,
    /// Inject PRNG-driven spurious condvar wakeups.
    pub spurious: bool,
    /// When set, failing runs write their trace artifact into this
    /// directory as `seed_<seed>.trace`.
    pub trace_dir: Option<PathBuf>,
}

impl Default for ExploreConfig {
    fn default() -> Self {
        let engine = SchedulerConfig::default();
        Self {
            runs: 100,
            seed: None,
            max_steps: engine.max_steps,
            max_logical: engine.max_logical,
            spurious: false,
            trace_dir: None,
        }
    }
}

impl ExploreConfig {
    /// Build a configuration from the conventional environment variables
    /// (see the crate docs), falling back to defaults for anything unset
    /// or unparsable.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(runs) = parse_var::<usize>("RUNS") {
            config.runs = runs.max(1);
        }
        config.seed = parse_var::<u64>("SEED");
        if let Some(max_steps) = parse_var::<u64>("MAX_STEPS") {
            config.max_steps = max_steps;
        }
        if let Some(ms) = parse_var::<u64>("MAX_LOGICAL_MS") {
            config.max_logical = Duration::from_millis(ms);
        }
        if let Ok(value) = env::var("TRACE") {
            if is_truthy(&value) {
                config.trace_dir = Some(PathBuf::from(value));
            }
        }
        config
    }

    fn scheduler_for(&self, seed: u64) -> Scheduler {
        Scheduler::builder()
            .seed(seed)
            .max_steps(self.max_steps)
            .max_logical(self.max_logical)
            .spurious(self.spurious)
            .build()
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok()?.trim().parse().ok()
}

fn is_truthy(value: &str) -> bool {
    !matches!(value.trim(), "" | "0" | "false" | "no" | "off")
}

/// One failing seed.
#[derive(Debug, Clone)]
pub struct Failure {
    /// The seed that failed.
    pub seed: u64,
    /// How it failed.
    pub verdict: Verdict,
    /// The trace artifact written for it, when tracing was enabled.
    pub trace_path: Option<PathBuf>,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seed {}: {}", self.seed, self.verdict)?;
        if let Some(path) = &self.trace_path {
            write!(f, " (trace: {})", path.display())?;
        }
        Ok(())
    }
}

/// Outcome of an exploration: every seed that did not finish cleanly.
#[derive(Debug, Clone)]
pub struct ExploreReport {
    /// Seeds actually run.
    pub runs: usize,
    /// The failing seeds, in the order they were found.
    pub failures: Vec<Failure>,
}

impl ExploreReport {
    /// Returns `true` if every seed finished cleanly.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Panic with the failing seeds unless every run finished cleanly.
    ///
    /// This is the wiring point for test frameworks: a failing
    /// exploration fails the enclosing `#[test]`.
    pub fn assert_ok(&self) {
        if !self.is_success() {
            panic!("{self}");
        }
    }
}

impl fmt::Display for ExploreReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_success() {
            return write!(f, "{} runs, no failing seeds", self.runs);
        }
        writeln!(f, "{} of {} runs failed:", self.failures.len(), self.runs)?;
        for failure in &self.failures {
            writeln!(f, "  {failure}")?;
        }
        Ok(())
    }
}

/// Run `build` under `config.runs` seeds (or the pinned seed) and report
/// every seed whose verdict was not `Done`.
///
/// The build function is called once per seed with a fresh scheduler; it
/// spawns the scenario's tasks and returns. The harness drives each run
/// to its verdict.
pub fn explore<F>(config: &ExploreConfig, build: F) -> ExploreReport
where
    F: Fn(&Scheduler),
{
    let seeds: Vec<u64> = match config.seed {
        Some(seed) => vec![seed],
        None => {
            let mut state = entropy_seed();
            (0..config.runs.max(1)).map(|_| splitmix64(&mut state)).collect()
        }
    };
    run_seeds(config, &seeds, &build)
}

/// Run `build` under an explicit seed list and report every seed whose
/// verdict was not `Done`.
///
/// This is the named-seed entry point: re-checking seeds that failed in an
/// earlier exploration, or keeping a regression list of known-bad seeds in
/// a test. `config.runs` and `config.seed` are ignored; budgets and
/// `trace_dir` apply as in [`explore`].
pub fn explore_with_seeds<F>(config: &ExploreConfig, seeds: &[u64], build: F) -> ExploreReport
where
    F: Fn(&Scheduler),
{
    run_seeds(config, seeds, &build)
}

/// Drive one run per seed, collecting failures and their trace artifacts.
fn run_seeds<F>(config: &ExploreConfig, seeds: &[u64], build: &F) -> ExploreReport
where
    F: Fn(&Scheduler),
{
    let mut failures = Vec::new();
    for &seed in seeds {
        let sched = config.scheduler_for(seed);
        build(&sched);
        let verdict = sched.wait();
        debug!(seed, verdict = %verdict, "run complete");
        if verdict.is_done() {
            continue;
        }
        let trace_path = config.trace_dir.as_ref().and_then(|dir| {
            let path = dir.join(format!("seed_{seed}.trace"));
            if let Err(e) = std::fs::create_dir_all(dir) {
                warn!(dir = %dir.display(), error = %e, "cannot create trace directory");
                return None;
            }
            match write_trace(&path, &sched.trace()) {
                Ok(()) => Some(path),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "trace artifact not written");
                    None
                }
            }
        });
        failures.push(Failure {
            seed,
            verdict,
            trace_path,
        });
    }

    ExploreReport {
        runs: seeds.len(),
        failures,
    }
}

/// Re-run `build` under one specific seed and return its verdict.
pub fn replay<F>(seed: u64, config: &ExploreConfig, build: F) -> Verdict
where
    F: Fn(&Scheduler),
{
    let sched = config.scheduler_for(seed);
    build(&sched);
    sched.wait()
}

/// Re-run `build` against a recorded trace; any divergence surfaces as
/// `Verdict::TraceMismatch`.
pub fn replay_trace<F>(trace: Trace, build: F) -> Verdict
where
    F: Fn(&Scheduler),
{
    let sched = Scheduler::from_trace(trace);
    build(&sched);
    sched.wait()
}

/// SplitMix64 step: the seed stream for exploration.
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// A base seed for exploration. This is driver-side policy, not engine
/// state: the engine itself never reads entropy.
fn entropy_seed() -> u64 {
    let mut hasher = std::collections::hash_map::RandomState::new().build_hasher();
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    hasher.write_u32(nanos);
    hasher.write_u32(std::process::id());
    hasher.finish()
}
