use std::io;
use std::path::{Path, PathBuf};
use trace_codec::CodecError;

/// Errors raised by the instrumentation layer
///
/// VM faults are not errors here; they are recorded as `Fault` trace records.
#[derive(Debug, thiserror::Error)]
pub enum TracerError {
    /// An artifact directory or file could not be created or written
    #[error("i/o failure on {}: {source}", path.display())]
    IoFailure {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The coverage session or engine was used after it was closed
    #[error("session already closed")]
    SessionClosed,
    /// A lifecycle hook fired while the VM had no current script
    #[error("lifecycle hook fired without a current script")]
    UnknownScriptState,
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// The trace sink rejected a record
    #[error("trace sink failure: {0}")]
    Sink(#[source] io::Error),
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

impl TracerError {
    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        Self::IoFailure {
            path: path.to_path_buf(),
            source,
        }
    }
}
