//! Coverage-instrumented VM session

use super::{CoverageWriter, ExecutedScript};
use crate::config::CoverageConfig;
use crate::error::TracerError;
use crate::script::Script;
use crate::storage::{FileStorage, LocalFileStorage};
use crate::syscall::{override_check_witness, restore_check_witness, WitnessChecker};
use crate::vm::{
    EngineView, ExecutionContext, ExecutionObserver, Instruction, SharedObserver, Subscription,
    VmSession,
};
use crate::Result;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use trace_codec::{UInt160, VmState};

/// Instruction offset to number of times it was executed
pub type HitMap = HashMap<usize, u64>;

/// Branch instruction waiting for its outcome
#[derive(Debug, Clone, Copy)]
struct PendingBranch {
    script_hash: UInt160,
    instruction_pointer: usize,
    target: usize,
    depth: usize,
}

/// Observer state of a coverage session
#[derive(Debug)]
struct CoverageRecorder {
    writer: CoverageWriter,
    hit_maps: HashMap<UInt160, HitMap>,
    executed_scripts: HashMap<UInt160, ExecutedScript>,
    pending_branch: Option<PendingBranch>,
}

impl CoverageRecorder {
    fn new(writer: CoverageWriter) -> Self {
        Self {
            writer,
            hit_maps: HashMap::new(),
            executed_scripts: HashMap::new(),
            pending_branch: None,
        }
    }
}

fn resolve_script(engine: &dyn EngineView, context: &ExecutionContext) -> ExecutedScript {
    match engine.snapshot().contract(&context.script_hash) {
        Some(contract) => ExecutedScript::Contract(contract),
        None => ExecutedScript::Script {
            hash: context.script_hash,
            script: context.script.clone(),
        },
    }
}

impl ExecutionObserver for CoverageRecorder {
    fn context_loaded(&mut self, engine: &dyn EngineView, context: &ExecutionContext) -> Result<()> {
        let script = self
            .executed_scripts
            .entry(context.script_hash)
            .or_insert_with(|| resolve_script(engine, context));
        self.writer.record_context(Some(&*script))
    }

    fn context_unloaded(&mut self, engine: &dyn EngineView, _context: &ExecutionContext) -> Result<()> {
        match engine.current_script_hash() {
            None => self.writer.record_context(None),
            Some(hash) => {
                let script = self
                    .executed_scripts
                    .get(&hash)
                    .ok_or(TracerError::UnknownScriptState)?;
                self.writer.record_context(Some(script))
            }
        }
    }

    fn pre_execute_instruction(
        &mut self,
        engine: &dyn EngineView,
        instruction: &Instruction,
    ) -> Result<()> {
        let script_hash = engine
            .current_script_hash()
            .ok_or(TracerError::UnknownScriptState)?;
        let ip = engine
            .current_instruction_pointer()
            .ok_or(TracerError::UnknownScriptState)?;

        *self.hit_maps.entry(script_hash).or_default().entry(ip).or_insert(0) += 1;
        self.writer.record_address(ip)?;

        self.pending_branch = instruction.branch_target.map(|target| PendingBranch {
            script_hash,
            instruction_pointer: ip,
            target,
            depth: engine.invocation_depth(),
        });
        Ok(())
    }

    fn post_execute_instruction(
        &mut self,
        engine: &dyn EngineView,
        _instruction: &Instruction,
    ) -> Result<()> {
        let Some(branch) = self.pending_branch.take() else {
            return Ok(());
        };
        // a branch that returned from its frame has no outcome in this script
        if engine.invocation_depth() != branch.depth
            || engine.current_script_hash() != Some(branch.script_hash)
        {
            return Ok(());
        }
        let outcome = engine
            .current_instruction_pointer()
            .ok_or(TracerError::UnknownScriptState)?;
        self.writer
            .record_branch(branch.instruction_pointer, branch.target, outcome)
    }

    fn fault(&mut self, _engine: &dyn EngineView, exception: &str) -> Result<()> {
        self.pending_branch = None;
        tracing::debug!("Coverage session {} saw fault: {}", self.writer.session_id(), exception);
        Ok(())
    }
}

/// A VM session that records code coverage while it executes
///
/// Dropping the engine disposes it.
pub struct CoverageEngine<V: VmSession> {
    vm: V,
    recorder: Arc<Mutex<CoverageRecorder>>,
    subscription: Option<Subscription>,
    /// Witness checks are routed through a caller predicate until dispose
    witness_override: bool,
}

impl<V: VmSession> CoverageEngine<V> {
    /// Instrument `vm`, writing coverage to the local file system
    pub fn new(vm: V, config: &CoverageConfig) -> Result<Self> {
        Self::with_storage(vm, Arc::new(LocalFileStorage), config, None)
    }

    /// Instrument `vm` and answer its witness checks with `checker`
    pub fn with_witness_checker(
        vm: V,
        config: &CoverageConfig,
        checker: WitnessChecker,
    ) -> Result<Self> {
        Self::with_storage(vm, Arc::new(LocalFileStorage), config, Some(checker))
    }

    /// Instrument `vm` with an explicit file storage
    ///
    /// Without a `witness_checker` the VM's own witness logic stays in place.
    pub fn with_storage(
        mut vm: V,
        storage: Arc<dyn FileStorage>,
        config: &CoverageConfig,
        witness_checker: Option<WitnessChecker>,
    ) -> Result<Self> {
        let writer = CoverageWriter::open(storage, &config.output_dir)?;
        let witness_override = witness_checker.is_some();
        if let Some(checker) = witness_checker {
            override_check_witness(&mut vm, checker);
        }

        let recorder = Arc::new(Mutex::new(CoverageRecorder::new(writer)));
        let observer: SharedObserver = recorder.clone();
        let subscription = vm.subscribe(observer);

        Ok(Self {
            vm,
            recorder,
            subscription: Some(subscription),
            witness_override,
        })
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
            "Coverage run finished in state {}, {} scripts executed",
            state,
            self.recorder.lock().executed_scripts.len()
        );
        Ok(state)
    }

    pub fn vm(&self) -> &V {
        &self.vm
    }

    pub fn vm_mut(&mut self) -> &mut V {
        &mut self.vm
    }

    /// Hit maps of every script executed so far
    pub fn hit_maps(&self) -> HashMap<UInt160, HitMap> {
        self.recorder.lock().hit_maps.clone()
    }

    pub fn hit_count(&self, script_hash: &UInt160, instruction_pointer: usize) -> u64 {
        self.recorder
            .lock()
            .hit_maps
            .get(script_hash)
            .and_then(|hits| hits.get(&instruction_pointer))
            .copied()
            .unwrap_or(0)
    }

    /// Every script that entered the call stack, keyed by hash
    pub fn executed_scripts(&self) -> HashMap<UInt160, ExecutedScript> {
        self.recorder.lock().executed_scripts.clone()
    }

    pub fn session_log_path(&self) -> PathBuf {
        self.recorder.lock().writer.log_path().to_path_buf()
    }

    pub fn is_disposed(&self) -> bool {
        self.subscription.is_none()
    }

    /// Stop observing the VM, drop the witness override and close the
    /// coverage session
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
        self.recorder.lock().writer.close()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(TracerError::SessionClosed);
        }
        Ok(())
    }
}

impl<V: VmSession> Drop for CoverageEngine<V> {
    fn drop(&mut self) {
        if let Err(err) = self.dispose() {
            tracing::warn!("Failed to dispose coverage engine: {}", err);
        }
    }
}
