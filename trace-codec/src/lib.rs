//! Trace Codec - Binary wire format for VM execution traces
//!
//! This crate defines the records an instrumented VM session emits and the
//! binary encoding a debugger replays them from.
//!
//! # Overview
//!
//! A trace is a flat stream of self-describing records. Each record is an
//! outer two-element container holding an `i32` discriminator and a payload
//! container whose field count is fixed per discriminator:
//!
//! * `Trace` - VM state plus a snapshot of every stack frame
//! * `Notify` / `Log` - events raised by a contract
//! * `Results` - final state, gas consumed and the result stack
//! * `Fault` - the uncaught exception text
//! * `Script` - raw bytecode of a script entering the call stack
//! * `Storage` - key/value storage of a contract at a trace step
//! * `ProtocolSettings` - network magic and address version
//!
//! # Usage
//!
//! ```
//! use trace_codec::{decode, encode, TraceRecord, UInt160};
//!
//! let record = TraceRecord::Log {
//!     script_hash: UInt160::ZERO,
//!     message: "hello".to_string(),
//! };
//!
//! let bytes = encode(&record).unwrap();
//! assert_eq!(decode(&bytes).unwrap(), record);
//! ```

pub mod codec;
pub mod error;
pub mod reader;
pub mod record;
pub mod types;

pub use codec::{decode, decode_from, encode, encode_into, MAX_ITEM_DEPTH};
pub use error::CodecError;
pub use reader::{read_all, TraceReader};
pub use record::{StackFrameRecord, StorageEntry, TraceRecord};
pub use types::{StackItem, UInt160, VmState};

/// Result type for codec operations
pub type Result<T> = std::result::Result<T, CodecError>;
