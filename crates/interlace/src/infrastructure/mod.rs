//! Infrastructure Layer - External Technology Integrations
//!
//! Everything that touches the world outside the engine: today, the trace
//! artifact serialization. The domain layer stays pure; replay consumers
//! load artifacts here and hand the resulting [`Trace`](crate::Trace) back
//! into the domain.

pub mod trace_file;

pub use trace_file::{read_trace, write_trace, TraceFileError, TRACE_MAGIC};
