//! Execution trace capture
//!
//! A [`TraceEngine`] turns every VM lifecycle event into a
//! [`trace_codec::TraceRecord`] and hands it to a [`TraceSink`]. The binary
//! sink writes the records back to back, so a trace file can be replayed by
//! scanning it from offset 0 with [`trace_codec::TraceReader`].

pub mod engine;
pub mod names;
pub mod sink;

pub use engine::TraceEngine;
pub use names::ContractNameCache;
pub use sink::{BinaryTraceSink, MemoryTraceSink, TraceSink};

use crate::error::TracerError;
use crate::Result;
use std::path::Path;
use trace_codec::TraceRecord;

/// Read every record of a binary trace file
pub fn read_trace_file(path: &Path) -> Result<Vec<TraceRecord>> {
    let bytes = std::fs::read(path).map_err(|err| TracerError::io(path, err))?;
    Ok(trace_codec::read_all(&bytes)?)
}
