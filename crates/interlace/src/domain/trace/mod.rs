//! Trace Record and Replay
//!
//! A run's trace is the ordered record of every PRNG-driven choice: turn
//! picks, spurious-wakeup coins, waiter picks. Recording is always on (it
//! is a handful of words per turn); replay consumes the sequence in lieu of
//! the generator and fails loudly on any divergence.

mod record;
mod source;

pub use record::{ChoiceDomain, ChoiceRecord, Trace, TRACE_VERSION};
pub use source::{ChoiceStream, ReplayMismatch};
