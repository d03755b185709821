//! Interfaces of the VM session being instrumented
//!
//! The VM is an external collaborator. It exposes its state through
//! [`EngineView`], accepts observers and syscall overrides through
//! [`VmSession`], and reports lifecycle events to every subscribed
//! [`ExecutionObserver`] synchronously, in line with instruction dispatch.

use crate::script::Script;
use crate::snapshot::DataSnapshot;
use crate::syscall::SyscallHandler;
use crate::Result;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use trace_codec::{StackFrameRecord, StackItem, UInt160, VmState};

/// Identity of one VM session, used to attribute events to their origin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub u64);

impl SessionId {
    /// Allocate a process-unique session id
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Handle returned by [`VmSession::subscribe`], used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription(pub u64);

/// Network parameters of the chain the VM session runs against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolSettings {
    /// Network magic
    pub network: u32,
    /// Version byte prepended to addresses
    pub address_version: u8,
}

impl Default for ProtocolSettings {
    fn default() -> Self {
        Self {
            network: 860_833_102,
            address_version: 53,
        }
    }
}

/// Snapshot of one VM call frame, taken at hook time
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub script: Script,
    /// Identity of the executing code: the contract hash for deployed
    /// contracts, the script hash otherwise
    pub script_hash: UInt160,
    pub instruction_pointer: usize,
    pub evaluation_stack: Vec<StackItem>,
    pub local_variables: Vec<StackItem>,
    pub static_fields: Vec<StackItem>,
    pub arguments: Vec<StackItem>,
    /// Whether a try block is active in this frame
    pub has_catch: bool,
}

impl ExecutionContext {
    pub fn to_record(&self) -> StackFrameRecord {
        StackFrameRecord {
            script_hash: self.script_hash,
            instruction_pointer: self.instruction_pointer as u32,
            has_catch: self.has_catch,
            evaluation_stack: self.evaluation_stack.clone(),
            local_variables: self.local_variables.clone(),
            static_fields: self.static_fields.clone(),
            arguments: self.arguments.clone(),
        }
    }
}

/// The instruction a pre/post execution hook refers to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub opcode: u8,
    pub operand: Vec<u8>,
    /// Encoded size, opcode included
    pub size: usize,
    /// Jump target when the instruction is a conditional branch
    pub branch_target: Option<usize>,
}

/// Log line raised by a contract through the runtime log syscall
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    /// Session that executed the syscall
    pub sender: SessionId,
    pub script_hash: UInt160,
    pub message: String,
}

/// Notification raised by a contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyEvent {
    pub sender: SessionId,
    pub script_hash: UInt160,
    pub event_name: String,
    pub state: Vec<StackItem>,
}

/// Read-only view of a VM session's state
pub trait EngineView {
    fn session_id(&self) -> SessionId;

    fn state(&self) -> VmState;

    fn gas_consumed(&self) -> i64;

    fn result_stack(&self) -> Vec<StackItem>;

    /// Message of the exception that faulted the VM, if any
    fn uncaught_exception(&self) -> Option<String>;

    /// Every frame on the call stack, top frame first
    fn invocation_stack(&self) -> Vec<ExecutionContext>;

    fn invocation_depth(&self) -> usize;

    fn current_script_hash(&self) -> Option<UInt160>;

    fn current_instruction_pointer(&self) -> Option<usize>;

    fn snapshot(&self) -> &dyn DataSnapshot;

    fn settings(&self) -> &ProtocolSettings;

    /// The VM's own witness check against the session's signers
    fn check_witness(&self, hash: &UInt160) -> bool;

    /// The top frame of the call stack
    fn current_context(&self) -> Option<ExecutionContext> {
        self.invocation_stack().into_iter().next()
    }
}

/// Receiver of VM lifecycle events
///
/// Hooks run synchronously on the thread driving the VM. A hook error stops
/// execution and is returned from [`VmSession::execute`] or
/// [`VmSession::load_script`].
pub trait ExecutionObserver: Send {
    /// A new frame was pushed; `context` is now the current context
    fn context_loaded(&mut self, _engine: &dyn EngineView, _context: &ExecutionContext) -> Result<()> {
        Ok(())
    }

    /// A frame was popped; the engine's current context is its caller, if any
    fn context_unloaded(
        &mut self,
        _engine: &dyn EngineView,
        _context: &ExecutionContext,
    ) -> Result<()> {
        Ok(())
    }

    /// Called before `instruction` executes at the current instruction pointer
    fn pre_execute_instruction(
        &mut self,
        _engine: &dyn EngineView,
        _instruction: &Instruction,
    ) -> Result<()> {
        Ok(())
    }

    /// Called after `instruction` executed; the current instruction pointer
    /// already refers to the next instruction
    fn post_execute_instruction(
        &mut self,
        _engine: &dyn EngineView,
        _instruction: &Instruction,
    ) -> Result<()> {
        Ok(())
    }

    /// The VM faulted; no post-execution hook follows
    fn fault(&mut self, _engine: &dyn EngineView, _exception: &str) -> Result<()> {
        Ok(())
    }

    fn log(&mut self, _engine: &dyn EngineView, _event: &LogEvent) -> Result<()> {
        Ok(())
    }

    fn notify(&mut self, _engine: &dyn EngineView, _event: &NotifyEvent) -> Result<()> {
        Ok(())
    }
}

/// Observer shared between an instrumented engine and the VM it watches
pub type SharedObserver = Arc<Mutex<dyn ExecutionObserver>>;

/// A VM session that can be instrumented
///
/// Implementations deliver lifecycle events only to their own subscribers,
/// and only for events originating from their own execution.
pub trait VmSession: EngineView {
    fn subscribe(&mut self, observer: SharedObserver) -> Subscription;

    /// Returns `false` if the subscription was not registered
    fn unsubscribe(&mut self, subscription: Subscription) -> bool;

    /// Replace the handler of the syscall identified by `hash`
    fn override_syscall(&mut self, hash: u32, handler: SyscallHandler);

    /// Drop an override installed with [`VmSession::override_syscall`]
    ///
    /// Returns `false` if no override was installed for `hash`.
    fn remove_syscall_override(&mut self, hash: u32) -> bool;

    /// Push `script` as a new frame, firing `context_loaded`
    fn load_script(&mut self, script: Script) -> Result<()>;

    /// Run until the VM halts or faults
    fn execute(&mut self) -> Result<VmState>;
}
