//! Destinations for trace records

use crate::error::TracerError;
use crate::script::Script;
use crate::storage::{FileStorage, FileStream};
use crate::vm::ProtocolSettings;
use crate::Result;
use parking_lot::Mutex;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use trace_codec::{StackFrameRecord, StackItem, StorageEntry, TraceRecord, UInt160, VmState};

/// Receiver of trace records
///
/// Implementors provide [`TraceSink::write`] and [`TraceSink::flush`]; the
/// per-record methods build the record and forward it.
pub trait TraceSink: Send {
    fn write(&mut self, record: TraceRecord) -> Result<()>;

    fn flush(&mut self) -> Result<()>;

    fn protocol_settings(&mut self, settings: &ProtocolSettings) -> Result<()> {
        self.write(TraceRecord::ProtocolSettings {
            network: settings.network,
            address_version: settings.address_version,
        })
    }

    fn script(&mut self, script_hash: UInt160, script: &Script) -> Result<()> {
        self.write(TraceRecord::Script {
            script_hash,
            script: script.as_bytes().to_vec(),
        })
    }

    /// Call stack snapshot, top frame first
    fn trace(&mut self, state: VmState, stack_frames: Vec<StackFrameRecord>) -> Result<()> {
        self.write(TraceRecord::Trace {
            state,
            stack_frames,
        })
    }

    fn storages(&mut self, script_hash: UInt160, entries: Vec<StorageEntry>) -> Result<()> {
        self.write(TraceRecord::Storage {
            script_hash,
            entries,
        })
    }

    /// `contract_name` is resolved by the engine; it is not part of the
    /// wire record
    fn log(&mut self, script_hash: UInt160, _contract_name: &str, message: &str) -> Result<()> {
        self.write(TraceRecord::Log {
            script_hash,
            message: message.to_string(),
        })
    }

    fn notify(
        &mut self,
        script_hash: UInt160,
        _contract_name: &str,
        event_name: &str,
        state: Vec<StackItem>,
    ) -> Result<()> {
        self.write(TraceRecord::Notify {
            script_hash,
            event_name: event_name.to_string(),
            state,
        })
    }

    fn results(&mut self, state: VmState, gas_consumed: i64, result_stack: Vec<StackItem>) -> Result<()> {
        self.write(TraceRecord::Results {
            state,
            gas_consumed,
            result_stack,
        })
    }

    fn fault(&mut self, exception: &str) -> Result<()> {
        self.write(TraceRecord::Fault {
            exception: exception.to_string(),
        })
    }
}

/// Sink writing the binary record stream to any writer
#[derive(Debug)]
pub struct BinaryTraceSink<W: Write + Send> {
    writer: W,
    records: u64,
}

impl<W: Write + Send> BinaryTraceSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, records: 0 }
    }

    /// Number of records written so far
    pub fn records_written(&self) -> u64 {
        self.records
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl BinaryTraceSink<FileStream> {
    /// Append records to the file at `path`
    pub fn open(storage: &dyn FileStorage, path: &Path) -> Result<Self> {
        let file = storage
            .open_append(path)
            .map_err(|err| TracerError::io(path, err))?;
        tracing::info!("Writing trace to {}", path.display());
        Ok(Self::new(file))
    }
}

impl<W: Write + Send> TraceSink for BinaryTraceSink<W> {
    fn write(&mut self, record: TraceRecord) -> Result<()> {
        let bytes = trace_codec::encode(&record)?;
        self.writer.write_all(&bytes).map_err(TracerError::Sink)?;
        self.records += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush().map_err(TracerError::Sink)
    }

    fn log(&mut self, script_hash: UInt160, contract_name: &str, message: &str) -> Result<()> {
        tracing::debug!("Log from {} ({})", contract_name, script_hash);
        self.write(TraceRecord::Log {
            script_hash,
            message: message.to_string(),
        })
    }
}

/// Sink keeping records in memory
///
/// Clones share the same record list.
#[derive(Debug, Clone, Default)]
pub struct MemoryTraceSink {
    records: Arc<Mutex<Vec<TraceRecord>>>,
    contract_names: Arc<Mutex<Vec<String>>>,
}

impl MemoryTraceSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<TraceRecord> {
        self.records.lock().clone()
    }

    /// Record kinds in emission order
    pub fn kinds(&self) -> Vec<&'static str> {
        self.records.lock().iter().map(TraceRecord::kind).collect()
    }

    /// Contract names handed over with log and notify records
    pub fn contract_names(&self) -> Vec<String> {
        self.contract_names.lock().clone()
    }
}

impl TraceSink for MemoryTraceSink {
    fn write(&mut self, record: TraceRecord) -> Result<()> {
        self.records.lock().push(record);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn log(&mut self, script_hash: UInt160, contract_name: &str, message: &str) -> Result<()> {
        self.contract_names.lock().push(contract_name.to_string());
        self.write(TraceRecord::Log {
            script_hash,
            message: message.to_string(),
        })
    }

    fn notify(
        &mut self,
        script_hash: UInt160,
        contract_name: &str,
        event_name: &str,
        state: Vec<StackItem>,
    ) -> Result<()> {
        self.contract_names.lock().push(contract_name.to_string());
        self.write(TraceRecord::Notify {
            script_hash,
            event_name: event_name.to_string(),
            state,
        })
    }
}
