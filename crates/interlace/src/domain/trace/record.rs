//! Choice Records - The Canonical Reproduction Artifact
//!
//! Every PRNG-driven decision the scheduler makes is captured as a
//! `ChoiceRecord`. The full sequence, together with the user program, is
//! sufficient to reconstruct a run exactly; the seed is a compact
//! equivalent when the engine is otherwise deterministic.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Current trace format version.
pub const TRACE_VERSION: u32 = 1;

/// The domain a choice was drawn from.
///
/// Tagging each record with its domain makes replay mismatches diagnosable:
/// a diverging replay reports what kind of decision it expected versus what
/// the engine was about to decide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChoiceDomain {
    /// Index picked from the current ready set.
    TurnPick,
    /// Waiter index picked from the condition-variable wait lists.
    WaiterPick,
    /// Coin flip deciding whether to inject a spurious wakeup this turn.
    SpuriousCoin,
}

impl fmt::Display for ChoiceDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChoiceDomain::TurnPick => "turn-pick",
            ChoiceDomain::WaiterPick => "waiter-pick",
            ChoiceDomain::SpuriousCoin => "spurious-coin",
        };
        f.write_str(s)
    }
}

/// One recorded decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceRecord {
    /// Position of this choice in the run's choice sequence.
    pub step: u64,
    /// What kind of decision this was.
    pub domain: ChoiceDomain,
    /// Size of the candidate set the choice was drawn from.
    pub bound: u64,
    /// The value picked, in `[0, bound)`.
    pub picked: u64,
}

impl fmt::Display for ChoiceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {} {}/{}",
            self.step, self.domain, self.picked, self.bound
        )
    }
}

/// A complete recorded run: format version, seed, and the choice sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trace {
    /// Trace format version (`TRACE_VERSION` at record time).
    pub version: u32,
    /// Seed the recorded run was driven by.
    pub seed: u64,
    /// The choices, in the order they were made.
    pub records: Vec<ChoiceRecord>,
}

impl Trace {
    /// Create an empty trace for the given seed.
    pub fn new(seed: u64) -> Self {
        Self {
            version: TRACE_VERSION,
            seed,
            records: Vec::new(),
        }
    }

    /// Number of recorded choices.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if no choices were recorded.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
