//! Trace-instrumented VM session

use super::{ContractNameCache, TraceSink};
use crate::config::TraceConfig;
use crate::error::TracerError;
use crate::script::Script;
use crate::syscall::{override_check_witness, restore_check_witness, WitnessChecker};
use crate::vm::{
    EngineView, ExecutionContext, ExecutionObserver, Instruction, LogEvent, NotifyEvent,
    SessionId, SharedObserver, Subscription, VmSession,
};
use crate::Result;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use trace_codec::{UInt160, VmState};

/// Observer state of a trace session
struct TraceRecorder {
    session: SessionId,
    sink: Box<dyn TraceSink>,
    names: ContractNameCache,
    config: TraceConfig,
    started: bool,
    /// Scripts already announced with a `Script` record
    announced: HashSet<UInt160>,
}

impl TraceRecorder {
    fn announce(&mut self, context: &ExecutionContext) -> Result<()> {
        if self.announced.insert(context.script_hash) {
            self.sink.script(context.script_hash, &context.script)?;
        }
        Ok(())
    }

    fn start(&mut self, engine: &dyn EngineView) -> Result<()> {
        self.started = true;
        tracing::info!("Trace of {} started", self.session);
        self.sink.protocol_settings(engine.settings())?;
        for context in engine.invocation_stack().iter().rev() {
            self.announce(context)?;
        }
        self.emit_trace(engine)
    }

    /// The invocation ended; a later one on the same VM starts a fresh preamble
    fn finish(&mut self) {
        self.started = false;
        self.announced.clear();
    }

    /// Call stack snapshot plus the storage of every deployed contract on it
    fn emit_trace(&mut self, engine: &dyn EngineView) -> Result<()> {
        let stack = engine.invocation_stack();
        let frames = stack.iter().map(ExecutionContext::to_record).collect();
        self.sink.trace(engine.state(), frames)?;

        if !self.config.capture_storage {
            return Ok(());
        }
        let mut seen = HashSet::new();
        for context in &stack {
            if !seen.insert(context.script_hash) {
                continue;
            }
            if let Some(contract) = engine.snapshot().contract(&context.script_hash) {
                let entries = engine.snapshot().contract_storage(contract.id);
                self.sink.storages(contract.hash, entries)?;
            }
        }
        Ok(())
    }

    fn is_foreign(&self, sender: SessionId, kind: &str) -> bool {
        if sender == self.session {
            return false;
        }
        tracing::debug!("Ignoring {} from {} in trace of {}", kind, sender, self.session);
        true
    }
}

impl ExecutionObserver for TraceRecorder {
    fn context_loaded(&mut self, _engine: &dyn EngineView, context: &ExecutionContext) -> Result<()> {
        if self.started {
            self.announce(context)?;
        }
        Ok(())
    }

    fn pre_execute_instruction(
        &mut self,
        engine: &dyn EngineView,
        _instruction: &Instruction,
    ) -> Result<()> {
        if !self.started {
            self.start(engine)?;
        }
        Ok(())
    }

    fn post_execute_instruction(
        &mut self,
        engine: &dyn EngineView,
        _instruction: &Instruction,
    ) -> Result<()> {
        self.emit_trace(engine)?;
        if engine.state() == VmState::Halt {
            self.sink
                .results(engine.state(), engine.gas_consumed(), engine.result_stack())?;
            self.finish();
        }
        Ok(())
    }

    fn fault(&mut self, engine: &dyn EngineView, exception: &str) -> Result<()> {
        // Faults raised while decoding the first instruction precede any pre hook
        if !self.started {
            self.start(engine)?;
        }
        self.sink.fault(exception)?;
        self.emit_trace(engine)?;
        self.finish();
        Ok(())
    }

    fn log(&mut self, engine: &dyn EngineView, event: &LogEvent) -> Result<()> {
        if self.is_foreign(event.sender, "log") {
            return Ok(());
        }
        let name = self.names.resolve(engine.snapshot(), &event.script_hash);
        self.sink.log(event.script_hash, &name, &event.message)
    }

    fn notify(&mut self, engine: &dyn EngineView, event: &NotifyEvent) -> Result<()> {
        if self.is_foreign(event.sender, "notification") {
            return Ok(());
        }
        let name = self.names.resolve(engine.snapshot(), &event.script_hash);
        self.sink
            .notify(event.script_hash, &name, &event.event_name, event.state.clone())
    }
}

/// A VM session that streams its execution to a [`TraceSink`]
///
/// Dropping the engine disposes it.
pub struct TraceEngine<V: VmSession> {
    vm: V,
    recorder: Arc<Mutex<TraceRecorder>>,
    subscription: Option<Subscription>,
    /// Witness checks are routed through a caller predicate until dispose
    witness_override: bool,
}

impl<V: VmSession> TraceEngine<V> {
    /// Instrument `vm`, resolving contract names through the global cache
    pub fn new(vm: V, sink: impl TraceSink + 'static, config: TraceConfig) -> Self {
        Self::with_name_cache(vm, sink, config, ContractNameCache::global())
    }

    /// Instrument `vm` and answer its witness checks with `checker`
    pub fn with_witness_checker(
        mut vm: V,
        sink: impl TraceSink + 'static,
        config: TraceConfig,
        checker: WitnessChecker,
    ) -> Self {
        override_check_witness(&mut vm, checker);
        let mut engine = Self::new(vm, sink, config);
        engine.witness_override = true;
        engine
    }

    pub fn with_name_cache(
        mut vm: V,
        sink: impl TraceSink + 'static,
        config: TraceConfig,
        names: ContractNameCache,
    ) -> Self {
        let recorder = Arc::new(Mutex::new(TraceRecorder {
            session: vm.session_id(),
            sink: Box::new(sink),
            names,
            config,
            started: false,
            announced: HashSet::new(),
        }));
        let observer: SharedObserver = recorder.clone();
        let subscription = vm.subscribe(observer);

        Self {
            vm,
            recorder,
            subscription: Some(subscription),
            witness_override: false,
        }
    }

    pub fn load_script(&mut self, script: Script) -> Result<()> {
        self.ensure_open()?;
        self.vm.load_script(script)
    }

    /// Run the VM to completion
    pub fn execute(&mut self) -> Result<VmState> {
        self.ensure_open()?;
        let state = self.vm.execute()?;
        tracing::info!(
            "Trace of {} finished in state {}, gas consumed {}",
            self.vm.session_id(),
            state,
            self.vm.gas_consumed()
        );
        Ok(state)
    }

    pub fn vm(&self) -> &V {
        &self.vm
    }

    pub fn vm_mut(&mut self) -> &mut V {
        &mut self.vm
    }

    pub fn is_disposed(&self) -> bool {
        self.subscription.is_none()
    }

    /// Stop observing the VM, drop the witness override and flush the sink
    ///
    /// Safe to call more than once; only the first call has an effect.
    pub fn dispose(&mut self) -> Result<()> {
        let Some(subscription) = self.subscription.take() else {
            return Ok(());
        };
        self.vm.unsubscribe(subscription);
        if std::mem::take(&mut self.witness_override) {
            restore_check_witness(&mut self.vm);
        }
        self.recorder.lock().sink.flush()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(TracerError::SessionClosed);
        }
        Ok(())
    }
}

impl<V: VmSession> Drop for TraceEngine<V> {
    fn drop(&mut self) {
        if let Err(err) = self.dispose() {
            tracing::warn!("Failed to dispose trace engine: {}", err);
        }
    }
}
