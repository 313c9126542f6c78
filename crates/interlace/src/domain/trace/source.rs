//! Choice Source - Record and Replay Modes
//!
//! # Overview
//!
//! The scheduler never talks to the PRNG directly; it asks a `ChoiceStream`
//! for the next decision. In record mode the stream draws from the seeded
//! generator and appends a `ChoiceRecord`. In replay mode it consumes a
//! previously recorded trace and validates, per decision, that the runtime
//! situation (domain and candidate-set size) still matches what was
//! recorded. Any divergence is a `ReplayMismatch`, never a silent skew.

use std::fmt;

use crate::domain::rng::Xoshiro256StarStar;

use super::record::{ChoiceDomain, ChoiceRecord, Trace};

/// Replay diverged from the recorded run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayMismatch {
    /// Index of the offending choice.
    pub step: u64,
    /// The record the trace holds at this step; `None` if the trace ran out.
    pub expected: Option<ChoiceRecord>,
    /// The decision the engine was about to make.
    pub actual_domain: ChoiceDomain,
    /// Candidate-set size the engine observed.
    pub actual_bound: u64,
}

impl fmt::Display for ReplayMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.expected {
            Some(rec) => write!(
                f,
                "trace mismatch at step {}: trace has {} {}/{}, engine needs {} over {} candidates",
                self.step, rec.domain, rec.picked, rec.bound, self.actual_domain, self.actual_bound
            ),
            None => write!(
                f,
                "trace exhausted at step {}: engine needs {} over {} candidates",
                self.step, self.actual_domain, self.actual_bound
            ),
        }
    }
}

impl std::error::Error for ReplayMismatch {}

enum Mode {
    Record { rng: Xoshiro256StarStar },
    Replay { cursor: usize },
}

/// The scheduler's single gateway for nondeterminism.
pub struct ChoiceStream {
    mode: Mode,
    trace: Trace,
}

impl ChoiceStream {
    /// Record mode: draw choices from a generator seeded with `seed`.
    pub fn record(seed: u64) -> Self {
        Self {
            mode: Mode::Record {
                rng: Xoshiro256StarStar::new(seed),
            },
            trace: Trace::new(seed),
        }
    }

    /// Replay mode: consume `trace` in lieu of the generator.
    pub fn replay(trace: Trace) -> Self {
        Self {
            mode: Mode::Replay { cursor: 0 },
            trace,
        }
    }

    /// Returns `true` when this stream replays a recorded trace.
    pub fn is_replay(&self) -> bool {
        matches!(self.mode, Mode::Replay { .. })
    }

    /// Make the next decision in `domain` over `bound` candidates.
    ///
    /// In record mode the pick is appended to the trace; in replay mode the
    /// recorded pick is returned after validating domain and bound.
    pub fn pick(&mut self, domain: ChoiceDomain, bound: u64) -> Result<u64, ReplayMismatch> {
        debug_assert!(bound > 0, "choice over an empty candidate set");
        match &mut self.mode {
            Mode::Record { rng } => {
                let picked = rng.bounded(bound);
                let step = self.trace.records.len() as u64;
                self.trace.records.push(ChoiceRecord {
                    step,
                    domain,
                    bound,
                    picked,
                });
                Ok(picked)
            }
            Mode::Replay { cursor } => {
                let step = *cursor as u64;
                let Some(rec) = self.trace.records.get(*cursor).copied() else {
                    return Err(ReplayMismatch {
                        step,
                        expected: None,
                        actual_domain: domain,
                        actual_bound: bound,
                    });
                };
                if rec.domain != domain || rec.bound != bound || rec.picked >= bound {
                    return Err(ReplayMismatch {
                        step,
                        expected: Some(rec),
                        actual_domain: domain,
                        actual_bound: bound,
                    });
                }
                *cursor += 1;
                Ok(rec.picked)
            }
        }
    }

    /// The trace: everything recorded so far, or the trace being replayed.
    pub fn snapshot(&self) -> Trace {
        self.trace.clone()
    }

    /// Seed the trace was recorded under.
    pub fn seed(&self) -> u64 {
        self.trace.seed
    }
}
