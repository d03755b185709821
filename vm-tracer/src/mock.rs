//! Minimal stack VM used to drive the instrumented engines in tests

use crate::script::{ContractState, Script};
use crate::snapshot::DataSnapshot;
use crate::syscall::{
    syscall_hash, witness_target, InteropDescriptor, SyscallHandler, CONTRACT_CALL,
    CRYPTO_CHECK_SIG, RUNTIME_CHECK_WITNESS, RUNTIME_LOG, RUNTIME_NOTIFY,
};
use crate::vm::{
    EngineView, ExecutionContext, ExecutionObserver, Instruction, LogEvent, NotifyEvent,
    ProtocolSettings, SessionId, SharedObserver, Subscription, VmSession,
};
use crate::Result;
use num_bigint::BigInt;
use std::collections::HashMap;
use std::sync::Arc;
use trace_codec::{StackItem, UInt160, VmState};

pub mod op {
    pub const PUSHT: u8 = 0x08;
    pub const PUSHF: u8 = 0x09;
    pub const PUSHDATA1: u8 = 0x0C;
    pub const PUSH0: u8 = 0x10;
    pub const PUSH1: u8 = 0x11;
    pub const PUSH2: u8 = 0x12;
    pub const PUSH15: u8 = 0x1F;
    pub const PUSH16: u8 = 0x20;
    pub const NOP: u8 = 0x21;
    pub const JMPIF: u8 = 0x24;
    pub const ABORT: u8 = 0x38;
    pub const TRY: u8 = 0x3B;
    pub const RET: u8 = 0x40;
    pub const SYSCALL: u8 = 0x41;
    pub const NEWARRAY0: u8 = 0xC2;
}

/// Route `tracing` output of a test through the test harness, filtered by
/// `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Outcome of one instruction: `Err` faults the VM with the message
type Step = std::result::Result<(), String>;

#[derive(Debug, Clone)]
struct Frame {
    script: Script,
    script_hash: UInt160,
    ip: usize,
    evaluation_stack: Vec<StackItem>,
    arguments: Vec<StackItem>,
    has_catch: bool,
}

impl Frame {
    fn context(&self) -> ExecutionContext {
        ExecutionContext {
            script: self.script.clone(),
            script_hash: self.script_hash,
            instruction_pointer: self.ip,
            evaluation_stack: self.evaluation_stack.clone(),
            local_variables: Vec::new(),
            static_fields: Vec::new(),
            arguments: self.arguments.clone(),
            has_catch: self.has_catch,
        }
    }
}

pub struct MockEngine {
    id: SessionId,
    snapshot: Arc<dyn DataSnapshot>,
    settings: ProtocolSettings,
    signers: Vec<UInt160>,
    frames: Vec<Frame>,
    state: VmState,
    gas_consumed: i64,
    result_stack: Vec<StackItem>,
    exception: Option<String>,
    observers: Vec<(Subscription, SharedObserver)>,
    next_subscription: u64,
    overrides: HashMap<u32, SyscallHandler>,
}

impl MockEngine {
    pub fn new(snapshot: impl DataSnapshot + 'static) -> Self {
        Self::with_snapshot(Arc::new(snapshot))
    }

    pub fn with_snapshot(snapshot: Arc<dyn DataSnapshot>) -> Self {
        Self {
            id: SessionId::next(),
            snapshot,
            settings: ProtocolSettings::default(),
            signers: Vec::new(),
            frames: Vec::new(),
            state: VmState::None,
            gas_consumed: 0,
            result_stack: Vec::new(),
            exception: None,
            observers: Vec::new(),
            next_subscription: 1,
            overrides: HashMap::new(),
        }
    }

    pub fn with_signers(mut self, signers: Vec<UInt160>) -> Self {
        self.signers = signers;
        self
    }

    pub fn with_settings(mut self, settings: ProtocolSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    fn fire(
        &self,
        mut hook: impl FnMut(&mut dyn ExecutionObserver, &dyn EngineView) -> Result<()>,
    ) -> Result<()> {
        let observers: Vec<SharedObserver> =
            self.observers.iter().map(|(_, observer)| Arc::clone(observer)).collect();
        for observer in observers {
            let mut guard = observer.lock();
            hook(&mut *guard, self)?;
        }
        Ok(())
    }

    fn push_frame(&mut self, script: Script, script_hash: UInt160, arguments: Vec<StackItem>) -> Result<()> {
        let frame = Frame {
            script,
            script_hash,
            ip: 0,
            evaluation_stack: Vec::new(),
            arguments,
            has_catch: false,
        };
        let context = frame.context();
        self.frames.push(frame);
        self.fire(|observer, engine| observer.context_loaded(engine, &context))
    }

    fn decode(frame: &Frame) -> std::result::Result<Instruction, String> {
        let bytes = frame.script.as_bytes();
        let Some(&opcode) = bytes.get(frame.ip) else {
            return Ok(Instruction {
                opcode: op::RET,
                operand: Vec::new(),
                size: 1,
                branch_target: None,
            });
        };
        let operand_len = match opcode {
            op::PUSHDATA1 => 1 + *bytes.get(frame.ip + 1).ok_or("truncated PUSHDATA1")? as usize,
            op::JMPIF => 1,
            op::TRY => 2,
            op::SYSCALL => 4,
            _ => 0,
        };
        let start = frame.ip + 1;
        let operand = bytes
            .get(start..start + operand_len)
            .ok_or_else(|| format!("truncated instruction at {}", frame.ip))?
            .to_vec();
        let branch_target = (opcode == op::JMPIF)
            .then(|| frame.ip as i64 + operand[0] as i8 as i64)
            .and_then(|target| usize::try_from(target).ok())
            .filter(|target| *target <= bytes.len());
        Ok(Instruction {
            opcode,
            size: 1 + operand_len,
            operand,
            branch_target,
        })
    }

    fn frame_mut(&mut self) -> std::result::Result<&mut Frame, String> {
        self.frames.last_mut().ok_or_else(|| "no current frame".to_string())
    }

    fn push(&mut self, item: StackItem) -> Step {
        self.frame_mut()?.evaluation_stack.push(item);
        Ok(())
    }

    fn pop(&mut self) -> std::result::Result<StackItem, String> {
        self.frame_mut()?
            .evaluation_stack
            .pop()
            .ok_or_else(|| "evaluation stack underflow".to_string())
    }

    fn step(&mut self) -> Result<()> {
        let Some(frame) = self.frames.last() else {
            self.state = VmState::Halt;
            return Ok(());
        };
        let instruction = match Self::decode(frame) {
            Ok(instruction) => instruction,
            Err(message) => return self.raise(message),
        };

        self.fire(|observer, engine| observer.pre_execute_instruction(engine, &instruction))?;
        self.gas_consumed += 1;
        if let Some(frame) = self.frames.last_mut() {
            frame.ip += instruction.size;
        }

        match self.execute_instruction(&instruction)? {
            Ok(()) => {
                self.fire(|observer, engine| observer.post_execute_instruction(engine, &instruction))
            }
            Err(message) => self.raise(message),
        }
    }

    fn raise(&mut self, message: String) -> Result<()> {
        self.state = VmState::Fault;
        self.exception = Some(message.clone());
        self.fire(|observer, engine| observer.fault(engine, &message))
    }

    fn execute_instruction(&mut self, instruction: &Instruction) -> Result<Step> {
        let step = match instruction.opcode {
            op::PUSHT => self.push(StackItem::Boolean(true)),
            op::PUSHF => self.push(StackItem::Boolean(false)),
            op::PUSHDATA1 => self.push(StackItem::ByteString(instruction.operand[1..].to_vec())),
            code @ op::PUSH0..=op::PUSH16 => self.push(StackItem::from(i64::from(code - op::PUSH0))),
            op::JMPIF => self.jump_if(instruction.branch_target),
            op::ABORT => Err("ABORT is executed.".to_string()),
            op::TRY => self.frame_mut().map(|frame| frame.has_catch = true),
            op::NEWARRAY0 => self.push(StackItem::Array(Vec::new())),
            op::RET => return self.ret(),
            op::SYSCALL => {
                let hash = u32::from_le_bytes([
                    instruction.operand[0],
                    instruction.operand[1],
                    instruction.operand[2],
                    instruction.operand[3],
                ]);
                return self.syscall(hash);
            }
            _ => Ok(()),
        };
        Ok(step)
    }

    fn jump_if(&mut self, target: Option<usize>) -> Step {
        if !truthy(&self.pop()?) {
            return Ok(());
        }
        let target = target.ok_or("jump target out of range")?;
        self.frame_mut()?.ip = target;
        Ok(())
    }

    fn ret(&mut self) -> Result<Step> {
        let Some(frame) = self.frames.pop() else {
            return Ok(Err("no frame to return from".to_string()));
        };
        match self.frames.last_mut() {
            Some(caller) => caller.evaluation_stack.extend(frame.evaluation_stack.iter().cloned()),
            None => {
                self.result_stack = frame.evaluation_stack.clone();
                self.state = VmState::Halt;
            }
        }
        let context = frame.context();
        self.fire(|observer, engine| observer.context_unloaded(engine, &context))?;
        Ok(Ok(()))
    }

    fn syscall(&mut self, hash: u32) -> Result<Step> {
        let descriptor = InteropDescriptor::lookup(hash);
        let parameters = descriptor.map_or(0, |d| d.parameters);
        let mut arguments = Vec::with_capacity(parameters);
        for _ in 0..parameters {
            match self.pop() {
                Ok(item) => arguments.push(item),
                Err(message) => return Ok(Err(message)),
            }
        }

        if let Some(handler) = self.overrides.get(&hash).cloned() {
            let step = handler(&*self, arguments).and_then(|result| match result {
                Some(item) => self.push(item),
                None => Ok(()),
            });
            return Ok(step);
        }

        let Some(descriptor) = descriptor else {
            return Ok(Err(format!("syscall {hash:#010x} not found")));
        };
        match descriptor.name {
            RUNTIME_LOG => self.runtime_log(&arguments),
            RUNTIME_NOTIFY => self.runtime_notify(arguments),
            RUNTIME_CHECK_WITNESS => Ok(witness_target(&arguments[0]).and_then(|target| {
                let witnessed = self.check_witness(&target);
                self.push(StackItem::Boolean(witnessed))
            })),
            CONTRACT_CALL => self.contract_call(arguments),
            CRYPTO_CHECK_SIG => {
                let valid = arguments[0].as_bytes().map_or(false, |sig| sig.len() == 64);
                Ok(self.push(StackItem::Boolean(valid)))
            }
            name => Ok(Err(format!("syscall {name} not supported"))),
        }
    }

    fn current_hash(&self) -> UInt160 {
        self.current_script_hash().unwrap_or(UInt160::ZERO)
    }

    fn runtime_log(&mut self, arguments: &[StackItem]) -> Result<Step> {
        let Some(message) = arguments[0].as_bytes().and_then(|b| String::from_utf8(b.to_vec()).ok()) else {
            return Ok(Err("log message must be UTF-8".to_string()));
        };
        let event = LogEvent {
            sender: self.id,
            script_hash: self.current_hash(),
            message,
        };
        self.fire(|observer, engine| observer.log(engine, &event))?;
        Ok(Ok(()))
    }

    fn runtime_notify(&mut self, arguments: Vec<StackItem>) -> Result<Step> {
        let mut arguments = arguments.into_iter();
        let name = arguments.next().and_then(|item| item.as_bytes().map(<[u8]>::to_vec));
        let Some(event_name) = name.and_then(|bytes| String::from_utf8(bytes).ok()) else {
            return Ok(Err("event name must be UTF-8".to_string()));
        };
        let state = match arguments.next() {
            Some(StackItem::Array(items)) => items,
            other => return Ok(Err(format!("notification state must be an array, got {other:?}"))),
        };
        let event = NotifyEvent {
            sender: self.id,
            script_hash: self.current_hash(),
            event_name,
            state,
        };
        self.fire(|observer, engine| observer.notify(engine, &event))?;
        Ok(Ok(()))
    }

    fn contract_call(&mut self, arguments: Vec<StackItem>) -> Result<Step> {
        let Some(hash) = arguments[0].as_bytes().and_then(UInt160::from_slice) else {
            return Ok(Err("invalid contract hash".to_string()));
        };
        let Some(contract) = self.snapshot.contract(&hash) else {
            return Ok(Err(format!("called contract {hash} does not exist")));
        };
        let call_arguments = match &arguments[3] {
            StackItem::Array(items) => items.clone(),
            _ => Vec::new(),
        };
        self.load_contract(&contract, call_arguments)?;
        Ok(Ok(()))
    }

    fn load_contract(&mut self, contract: &ContractState, arguments: Vec<StackItem>) -> Result<()> {
        self.push_frame(contract.script().clone(), contract.hash, arguments)
    }
}

fn truthy(item: &StackItem) -> bool {
    match item {
        StackItem::Null => false,
        StackItem::Boolean(value) => *value,
        StackItem::Integer(value) => *value != BigInt::from(0),
        StackItem::ByteString(bytes) | StackItem::Buffer(bytes) => bytes.iter().any(|b| *b != 0),
        _ => true,
    }
}

impl EngineView for MockEngine {
    fn session_id(&self) -> SessionId {
        self.id
    }

    fn state(&self) -> VmState {
        self.state
    }

    fn gas_consumed(&self) -> i64 {
        self.gas_consumed
    }

    fn result_stack(&self) -> Vec<StackItem> {
        self.result_stack.clone()
    }

    fn uncaught_exception(&self) -> Option<String> {
        self.exception.clone()
    }

    fn invocation_stack(&self) -> Vec<ExecutionContext> {
        self.frames.iter().rev().map(Frame::context).collect()
    }

    fn invocation_depth(&self) -> usize {
        self.frames.len()
    }

    fn current_script_hash(&self) -> Option<UInt160> {
        self.frames.last().map(|frame| frame.script_hash)
    }

    fn current_instruction_pointer(&self) -> Option<usize> {
        self.frames.last().map(|frame| frame.ip)
    }

    fn snapshot(&self) -> &dyn DataSnapshot {
        &*self.snapshot
    }

    fn settings(&self) -> &ProtocolSettings {
        &self.settings
    }

    fn check_witness(&self, hash: &UInt160) -> bool {
        self.signers.contains(hash)
    }
}

impl VmSession for MockEngine {
    fn subscribe(&mut self, observer: SharedObserver) -> Subscription {
        let subscription = Subscription(self.next_subscription);
        self.next_subscription += 1;
        self.observers.push((subscription, observer));
        subscription
    }

    fn unsubscribe(&mut self, subscription: Subscription) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(id, _)| *id != subscription);
        self.observers.len() != before
    }

    fn override_syscall(&mut self, hash: u32, handler: SyscallHandler) {
        self.overrides.insert(hash, handler);
    }

    fn remove_syscall_override(&mut self, hash: u32) -> bool {
        self.overrides.remove(&hash).is_some()
    }

    fn load_script(&mut self, script: Script) -> Result<()> {
        if matches!(self.state, VmState::Halt | VmState::Fault) {
            self.frames.clear();
            self.result_stack.clear();
            self.exception = None;
            self.state = VmState::None;
        }
        let hash = script.hash();
        self.push_frame(script, hash, Vec::new())
    }

    fn execute(&mut self) -> Result<VmState> {
        while self.state == VmState::None {
            self.step()?;
        }
        Ok(self.state)
    }
}

/// Assembles test scripts
#[derive(Debug, Default)]
pub struct ScriptBuilder {
    bytes: Vec<u8>,
}

impl ScriptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(mut self, opcode: u8) -> Self {
        self.bytes.push(opcode);
        self
    }

    pub fn push_data(mut self, data: &[u8]) -> Self {
        self.bytes.push(op::PUSHDATA1);
        self.bytes.push(data.len() as u8);
        self.bytes.extend_from_slice(data);
        self
    }

    pub fn jump_if(mut self, offset: i8) -> Self {
        self.bytes.push(op::JMPIF);
        self.bytes.push(offset as u8);
        self
    }

    pub fn try_block(mut self) -> Self {
        self.bytes.extend_from_slice(&[op::TRY, 0, 0]);
        self
    }

    pub fn syscall(mut self, name: &str) -> Self {
        self.bytes.push(op::SYSCALL);
        self.bytes.extend_from_slice(&syscall_hash(name).to_le_bytes());
        self
    }

    pub fn log(self, message: &str) -> Self {
        self.push_data(message.as_bytes()).syscall(RUNTIME_LOG)
    }

    /// Notify with an empty state array
    pub fn notify(self, event_name: &str) -> Self {
        self.emit(op::NEWARRAY0)
            .push_data(event_name.as_bytes())
            .syscall(RUNTIME_NOTIFY)
    }

    /// Call `main` on a deployed contract with no arguments
    pub fn call(self, contract: &UInt160) -> Self {
        self.emit(op::NEWARRAY0)
            .emit(op::PUSH15)
            .push_data(b"main")
            .push_data(contract.as_bytes())
            .syscall(CONTRACT_CALL)
    }

    pub fn build(self) -> Script {
        Script::new(self.bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::MemorySnapshot;

    #[test]
    fn test_runs_to_halt() {
        let mut vm = MockEngine::new(MemorySnapshot::new());
        vm.load_script(Script::new(vec![op::PUSH1, op::PUSH2, op::RET])).unwrap();

        assert_eq!(vm.execute().unwrap(), VmState::Halt);
        assert_eq!(vm.result_stack(), vec![StackItem::from(1), StackItem::from(2)]);
        assert_eq!(vm.gas_consumed(), 3);
        assert_eq!(vm.invocation_depth(), 0);
    }

    #[test]
    fn test_abort_faults() {
        let mut vm = MockEngine::new(MemorySnapshot::new());
        vm.load_script(Script::new(vec![op::ABORT])).unwrap();

        assert_eq!(vm.execute().unwrap(), VmState::Fault);
        assert_eq!(vm.uncaught_exception().as_deref(), Some("ABORT is executed."));
    }

    #[test]
    fn test_try_marks_frame() {
        let mut vm = MockEngine::new(MemorySnapshot::new());
        vm.load_script(ScriptBuilder::new().try_block().emit(op::PUSHF).build()).unwrap();
        assert!(!vm.current_context().unwrap().has_catch);

        vm.step().unwrap();
        assert!(vm.current_context().unwrap().has_catch);
        assert_eq!(vm.current_instruction_pointer(), Some(3));
    }

    #[test]
    fn test_unknown_syscall_faults() {
        let mut vm = MockEngine::new(MemorySnapshot::new());
        vm.load_script(ScriptBuilder::new().syscall("System.Unknown").build()).unwrap();
        assert_eq!(vm.execute().unwrap(), VmState::Fault);
    }
}
