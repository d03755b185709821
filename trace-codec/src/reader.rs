//! Streaming reader over a trace file

use crate::codec::decode_from;
use crate::record::TraceRecord;
use crate::Result;
use std::io::{self, Read};

/// Iterator over consecutive records of a trace stream
///
/// Reading stops cleanly when the stream ends on a record boundary. A record
/// cut short yields [`TruncatedStream`](crate::CodecError::TruncatedStream); after any error the
/// iterator is exhausted.
#[derive(Debug)]
pub struct TraceReader<R> {
    inner: R,
    done: bool,
}

impl<R: Read> TraceReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, done: false }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Read the first byte of the next record, or `None` at end of stream
    fn peek_byte(&mut self) -> io::Result<Option<u8>> {
        let mut byte = [0u8; 1];
        loop {
            match self.inner.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(byte[0])),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
    }

    fn read_record(&mut self) -> Result<Option<TraceRecord>> {
        let Some(first) = self.peek_byte()? else {
            return Ok(None);
        };
        let head = [first];
        let mut chained = head.as_slice().chain(&mut self.inner);
        decode_from(&mut chained).map(Some)
    }
}

impl<R: Read> Iterator for TraceReader<R> {
    type Item = Result<TraceRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

/// Decode every record of a complete in-memory trace
pub fn read_all(bytes: &[u8]) -> Result<Vec<TraceRecord>> {
    TraceReader::new(bytes).collect()
}
