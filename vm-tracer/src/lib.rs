//! VM Tracer - Coverage and execution-trace capture for contract VMs
//!
//! This crate wraps a running VM session with observers that turn its
//! lifecycle events into offline artifacts, without modifying the VM itself.
//!
//! # Overview
//!
//! Two instrumented engines are provided:
//!
//! * [`CoverageEngine`] builds per-script instruction hit maps and writes a
//!   coverage session log plus one content-addressed artifact per script
//! * [`TraceEngine`] streams every stack frame, log line, notification,
//!   result and fault to a [`TraceSink`] as binary trace records
//!
//! Both can replace the VM's witness check with a caller-supplied predicate.
//!
//! # Usage
//!
//! ```ignore
//! use vm_tracer::{CoverageConfig, CoverageEngine, Script};
//!
//! let mut engine = CoverageEngine::new(vm, &CoverageConfig::new("./coverage"))?;
//! engine.load_script(Script::new(vec![0x11, 0x40]))?;
//! let state = engine.execute()?;
//! println!("hit maps: {:?}", engine.hit_maps());
//! engine.dispose()?;
//! ```
//!
//! The VM is an external collaborator reached through [`VmSession`]; any VM
//! that reports its lifecycle events to subscribed [`ExecutionObserver`]s can
//! be instrumented.

pub mod config;
pub mod coverage;
pub mod error;
pub mod script;
pub mod snapshot;
pub mod storage;
pub mod syscall;
pub mod trace;
pub mod vm;

#[cfg(test)]
mod mock;

pub use config::{CoverageConfig, TraceConfig};
pub use coverage::{CoverageEngine, CoverageWriter, ExecutedScript, HitMap};
pub use error::TracerError;
pub use script::{script_hash, ContractState, NefFile, Script};
pub use snapshot::{DataSnapshot, MemorySnapshot};
pub use storage::{FileStorage, LocalFileStorage};
pub use syscall::{syscall_hash, InteropDescriptor, SyscallHandler, WitnessChecker};
pub use trace::{
    read_trace_file, BinaryTraceSink, ContractNameCache, MemoryTraceSink, TraceEngine, TraceSink,
};
pub use vm::{
    EngineView, ExecutionContext, ExecutionObserver, Instruction, LogEvent, NotifyEvent,
    ProtocolSettings, SessionId, SharedObserver, Subscription, VmSession,
};

pub use trace_codec::{StackItem, TraceRecord, UInt160, VmState};

/// Result type for tracer operations
pub type Result<T> = std::result::Result<T, TracerError>;
