//! Trace Artifact Format
//!
//! # Layout
//!
//! A versioned, length-prefixed sequence of typed records:
//!
//! ```text
//! ┌───────────┬──────────┬──────────┬───────────┬───────────────────┐
//! │ magic     │ version  │ seed     │ count     │ records…          │
//! │ "ILTR"    │ u32 LE   │ u64 LE   │ u32 LE    │ (u32 LE len +     │
//! │ 4 bytes   │          │          │           │  JSON body) each  │
//! └───────────┴──────────┴──────────┴───────────┴───────────────────┘
//! ```
//!
//! Record bodies are serde_json so artifacts stay inspectable with
//! standard tooling; the binary framing keeps parsing unambiguous. The
//! format round-trips losslessly: recording a run, writing, reading, and
//! replaying yields the same verdict with no mismatch.

use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::domain::trace::{ChoiceRecord, Trace, TRACE_VERSION};

/// Leading magic bytes of a trace artifact.
pub const TRACE_MAGIC: [u8; 4] = *b"ILTR";

/// Per-record size cap; a frame claiming more is corrupt, not large.
const MAX_RECORD_LEN: u32 = 1 << 20;

/// Failure while reading or writing a trace artifact.
#[derive(Debug)]
pub enum TraceFileError {
    /// Underlying I/O failure.
    Io(io::Error),
    /// A record body failed to encode or decode.
    Codec {
        /// Index of the offending record.
        record: usize,
        /// Decoder/encoder diagnostic.
        detail: String,
    },
    /// The file does not start with [`TRACE_MAGIC`].
    BadMagic,
    /// The artifact was written by an unknown format version.
    UnsupportedVersion {
        /// Version tag found in the artifact.
        found: u32,
    },
    /// A length prefix is implausible or a frame is cut short.
    Malformed {
        /// Index of the offending record.
        record: usize,
    },
}

impl fmt::Display for TraceFileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceFileError::Io(e) => write!(f, "trace artifact I/O error: {e}"),
            TraceFileError::Codec { record, detail } => {
                write!(f, "trace record {record} failed to (de)serialize: {detail}")
            }
            TraceFileError::BadMagic => write!(f, "not a trace artifact (bad magic)"),
            TraceFileError::UnsupportedVersion { found } => {
                write!(
                    f,
                    "unsupported trace format version {found} (supported: {TRACE_VERSION})"
                )
            }
            TraceFileError::Malformed { record } => {
                write!(f, "trace record {record} is malformed or truncated")
            }
        }
    }
}

impl std::error::Error for TraceFileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TraceFileError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for TraceFileError {
    fn from(e: io::Error) -> Self {
        TraceFileError::Io(e)
    }
}

/// Write `trace` to `path`, replacing any existing file.
pub fn write_trace(path: impl AsRef<Path>, trace: &Trace) -> Result<(), TraceFileError> {
    let mut out = BufWriter::new(File::create(path)?);
    out.write_all(&TRACE_MAGIC)?;
    out.write_all(&trace.version.to_le_bytes())?;
    out.write_all(&trace.seed.to_le_bytes())?;
    let count =
        u32::try_from(trace.records.len()).map_err(|_| TraceFileError::Malformed { record: 0 })?;
    out.write_all(&count.to_le_bytes())?;
    for (i, record) in trace.records.iter().enumerate() {
        let body = serde_json::to_vec(record).map_err(|e| TraceFileError::Codec {
            record: i,
            detail: e.to_string(),
        })?;
        let len = u32::try_from(body.len()).map_err(|_| TraceFileError::Malformed { record: i })?;
        out.write_all(&len.to_le_bytes())?;
        out.write_all(&body)?;
    }
    out.flush()?;
    Ok(())
}

/// Read a trace artifact from `path`.
pub fn read_trace(path: impl AsRef<Path>) -> Result<Trace, TraceFileError> {
    let mut input = BufReader::new(File::open(path)?);

    let mut magic = [0u8; 4];
    input.read_exact(&mut magic)?;
    if magic != TRACE_MAGIC {
        return Err(TraceFileError::BadMagic);
    }

    let version = read_u32(&mut input)?;
    if version != TRACE_VERSION {
        return Err(TraceFileError::UnsupportedVersion { found: version });
    }

    let mut seed_bytes = [0u8; 8];
    input.read_exact(&mut seed_bytes)?;
    let seed = u64::from_le_bytes(seed_bytes);

    let count = read_u32(&mut input)? as usize;
    let mut records = Vec::with_capacity(count.min(1 << 16));
    for i in 0..count {
        let len = read_u32(&mut input)?;
        if len > MAX_RECORD_LEN {
            return Err(TraceFileError::Malformed { record: i });
        }
        let mut body = vec![0u8; len as usize];
        input
            .read_exact(&mut body)
            .map_err(|_| TraceFileError::Malformed { record: i })?;
        let record: ChoiceRecord =
            serde_json::from_slice(&body).map_err(|e| TraceFileError::Codec {
                record: i,
                detail: e.to_string(),
            })?;
        records.push(record);
    }

    Ok(Trace {
        version,
        seed,
        records,
    })
}

fn read_u32(input: &mut impl Read) -> Result<u32, TraceFileError> {
    let mut bytes = [0u8; 4];
    input.read_exact(&mut bytes)?;
    Ok(u32::from_le_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::trace::ChoiceDomain;

    fn sample_trace() -> Trace {
        let mut trace = Trace::new(0xFEED);
        for step in 0..20 {
            trace.records.push(ChoiceRecord {
                step,
                domain: if step % 3 == 0 {
                    ChoiceDomain::SpuriousCoin
                } else {
                    ChoiceDomain::TurnPick
                },
                bound: (step % 5) + 1,
                picked: step % ((step % 5) + 1),
            });
        }
        trace
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.trace");
        let trace = sample_trace();

        write_trace(&path, &trace).unwrap();
        let back = read_trace(&path).unwrap();
        assert_eq!(back, trace);
    }

    #[test]
    fn test_bad_magic_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bogus.trace");
        std::fs::write(&path, b"NOPE12345678").unwrap();
        assert!(matches!(read_trace(&path), Err(TraceFileError::BadMagic)));
    }

    #[test]
    fn test_unsupported_version_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("future.trace");
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&TRACE_MAGIC);
        bytes.extend_from_slice(&99u32.to_le_bytes());
        bytes.extend_from_slice(&0u64.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        std::fs::write(&path, bytes).unwrap();
        assert!(matches!(
            read_trace(&path),
            Err(TraceFileError::UnsupportedVersion { found: 99 })
        ));
    }

    #[test]
    fn test_truncated_record_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cut.trace");
        let trace = sample_trace();
        write_trace(&path, &trace).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 3]).unwrap();
        assert!(matches!(
            read_trace(&path),
            Err(TraceFileError::Malformed { .. })
        ));
    }
}
