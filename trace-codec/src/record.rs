//! Trace record types

use crate::types::{StackItem, UInt160, VmState};
use serde::{Deserialize, Serialize};

/// Snapshot of a single VM call frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackFrameRecord {
    /// Hash of the script executing in this frame
    pub script_hash: UInt160,
    /// Offset of the current instruction within the script
    pub instruction_pointer: u32,
    /// Whether a try block is active in this frame
    pub has_catch: bool,
    pub evaluation_stack: Vec<StackItem>,
    pub local_variables: Vec<StackItem>,
    pub static_fields: Vec<StackItem>,
    pub arguments: Vec<StackItem>,
}

/// One key/value pair of contract storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageEntry {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

/// A single self-describing unit of an execution trace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TraceRecord {
    /// VM state and the full call stack, top frame first
    Trace {
        state: VmState,
        stack_frames: Vec<StackFrameRecord>,
    },
    /// Event raised by a contract
    Notify {
        script_hash: UInt160,
        event_name: String,
        state: Vec<StackItem>,
    },
    /// Log line written by a contract
    Log { script_hash: UInt160, message: String },
    /// Final outcome of a successful execution
    Results {
        state: VmState,
        gas_consumed: i64,
        result_stack: Vec<StackItem>,
    },
    /// Uncaught exception that faulted the VM
    Fault { exception: String },
    /// Bytecode of a script that entered the call stack
    Script { script_hash: UInt160, script: Vec<u8> },
    /// Storage of a contract on the call stack
    Storage {
        script_hash: UInt160,
        entries: Vec<StorageEntry>,
    },
    /// Network parameters the session ran under
    ProtocolSettings { network: u32, address_version: u8 },
}

impl TraceRecord {
    pub const TRACE: i32 = 0;
    pub const NOTIFY: i32 = 1;
    pub const LOG: i32 = 2;
    pub const RESULTS: i32 = 3;
    pub const FAULT: i32 = 4;
    pub const SCRIPT: i32 = 5;
    pub const STORAGE: i32 = 6;
    pub const PROTOCOL_SETTINGS: i32 = 7;

    /// Wire discriminator of this record
    pub fn discriminator(&self) -> i32 {
        match self {
            Self::Trace { .. } => Self::TRACE,
            Self::Notify { .. } => Self::NOTIFY,
            Self::Log { .. } => Self::LOG,
            Self::Results { .. } => Self::RESULTS,
            Self::Fault { .. } => Self::FAULT,
            Self::Script { .. } => Self::SCRIPT,
            Self::Storage { .. } => Self::STORAGE,
            Self::ProtocolSettings { .. } => Self::PROTOCOL_SETTINGS,
        }
    }

    /// Number of payload fields carried for a discriminator
    pub fn field_count(discriminator: i32) -> Option<u32> {
        match discriminator {
            Self::TRACE => Some(2),
            Self::NOTIFY => Some(3),
            Self::LOG => Some(2),
            Self::RESULTS => Some(3),
            Self::FAULT => Some(1),
            Self::SCRIPT => Some(2),
            Self::STORAGE => Some(2),
            Self::PROTOCOL_SETTINGS => Some(2),
            _ => None,
        }
    }

    /// Short name of the record kind, used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Trace { .. } => "trace",
            Self::Notify { .. } => "notify",
            Self::Log { .. } => "log",
            Self::Results { .. } => "results",
            Self::Fault { .. } => "fault",
            Self::Script { .. } => "script",
            Self::Storage { .. } => "storage",
            Self::ProtocolSettings { .. } => "protocol-settings",
        }
    }
}

/// Number of fields in a stack frame payload
pub(crate) const STACK_FRAME_FIELDS: u32 = 7;
