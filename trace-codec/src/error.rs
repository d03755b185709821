use std::io;

/// Errors raised while encoding or decoding trace records
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The bytes do not describe a valid record
    #[error("malformed trace record: {0}")]
    MalformedRecord(String),
    /// The stream ended in the middle of a record
    #[error("trace stream ended before the record was complete")]
    TruncatedStream,
    /// The underlying reader or writer failed
    #[error("trace stream i/o error: {0}")]
    Io(io::Error),
}

impl CodecError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedRecord(reason.into())
    }
}

impl From<io::Error> for CodecError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof => Self::TruncatedStream,
            _ => Self::Io(err),
        }
    }
}
