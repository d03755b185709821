//! Binary encoding of trace records
//!
//! Layout of a record:
//!
//! ```text
//! u32 2                 outer container
//! i32 discriminator
//! u32 field_count       payload container
//! ...fields
//! ```
//!
//! Collections and byte strings are prefixed with a `u32` length. All
//! integers are little-endian.

use crate::error::CodecError;
use crate::record::{StackFrameRecord, StorageEntry, TraceRecord, STACK_FRAME_FIELDS};
use crate::types::{tag, StackItem, UInt160, VmState};
use crate::Result;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use num_bigint::BigInt;
use std::io::{self, Read, Write};

/// Deepest stack item nesting accepted when encoding or decoding
pub const MAX_ITEM_DEPTH: usize = 512;

/// Elements in the outer record container
const RECORD_CONTAINER_LEN: u32 = 2;

/// Upper bound on capacity reserved up front for a decoded collection
const MAX_PREALLOCATED: usize = 1024;

/// Encode a record into a fresh buffer
///
/// Fails with [`CodecError::MalformedRecord`] when a stack item is nested
/// deeper than [`MAX_ITEM_DEPTH`], so every encoded record decodes.
pub fn encode(record: &TraceRecord) -> Result<Vec<u8>> {
    let mut encoder = Encoder::default();
    encoder.record(record)?;
    Ok(encoder.buf)
}

/// Encode a record and write it to `writer`
///
/// Nothing is written when the record cannot be encoded.
pub fn encode_into<W: Write>(record: &TraceRecord, writer: &mut W) -> Result<()> {
    let bytes = encode(record)?;
    writer.write_all(&bytes).map_err(CodecError::Io)
}

/// Decode exactly one record from `bytes`
///
/// Trailing bytes after the record are rejected.
pub fn decode(bytes: &[u8]) -> Result<TraceRecord> {
    let mut cursor = io::Cursor::new(bytes);
    let record = decode_from(&mut cursor)?;
    let consumed = cursor.position() as usize;
    if consumed != bytes.len() {
        return Err(CodecError::malformed(format!(
            "{} trailing bytes after record",
            bytes.len() - consumed
        )));
    }
    Ok(record)
}

/// Decode the next record from a reader
pub fn decode_from<R: Read>(reader: &mut R) -> Result<TraceRecord> {
    Decoder::new(reader).record()
}

fn too_deep() -> CodecError {
    CodecError::malformed(format!("stack item nesting exceeds {MAX_ITEM_DEPTH}"))
}

#[derive(Default)]
struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    fn record(&mut self, record: &TraceRecord) -> Result<()> {
        let discriminator = record.discriminator();
        self.buf.write_u32::<LittleEndian>(RECORD_CONTAINER_LEN)?;
        self.buf.write_i32::<LittleEndian>(discriminator)?;
        // field_count is always defined for a discriminator we produced
        self.len(TraceRecord::field_count(discriminator).unwrap_or_default() as usize)?;

        match record {
            TraceRecord::Trace { state, stack_frames } => {
                self.buf.write_u8(*state as u8)?;
                self.len(stack_frames.len())?;
                for frame in stack_frames {
                    self.frame(frame)?;
                }
            }
            TraceRecord::Notify { script_hash, event_name, state } => {
                self.hash(script_hash);
                self.bytes(event_name.as_bytes())?;
                self.items(state, 0)?;
            }
            TraceRecord::Log { script_hash, message } => {
                self.hash(script_hash);
                self.bytes(message.as_bytes())?;
            }
            TraceRecord::Results { state, gas_consumed, result_stack } => {
                self.buf.write_u8(*state as u8)?;
                self.buf.write_i64::<LittleEndian>(*gas_consumed)?;
                self.items(result_stack, 0)?;
            }
            TraceRecord::Fault { exception } => self.bytes(exception.as_bytes())?,
            TraceRecord::Script { script_hash, script } => {
                self.hash(script_hash);
                self.bytes(script)?;
            }
            TraceRecord::Storage { script_hash, entries } => {
                self.hash(script_hash);
                self.len(entries.len())?;
                for entry in entries {
                    self.bytes(&entry.key)?;
                    self.bytes(&entry.value)?;
                }
            }
            TraceRecord::ProtocolSettings { network, address_version } => {
                self.buf.write_u32::<LittleEndian>(*network)?;
                self.buf.write_u8(*address_version)?;
            }
        }
        Ok(())
    }

    fn frame(&mut self, frame: &StackFrameRecord) -> Result<()> {
        self.len(STACK_FRAME_FIELDS as usize)?;
        self.hash(&frame.script_hash);
        self.buf.write_u32::<LittleEndian>(frame.instruction_pointer)?;
        self.buf.write_u8(frame.has_catch as u8)?;
        self.items(&frame.evaluation_stack, 0)?;
        self.items(&frame.local_variables, 0)?;
        self.items(&frame.static_fields, 0)?;
        self.items(&frame.arguments, 0)
    }

    fn items(&mut self, items: &[StackItem], depth: usize) -> Result<()> {
        self.len(items.len())?;
        for item in items {
            self.item(item, depth)?;
        }
        Ok(())
    }

    fn item(&mut self, item: &StackItem, depth: usize) -> Result<()> {
        if depth >= MAX_ITEM_DEPTH {
            return Err(too_deep());
        }

        self.buf.write_u8(item.type_tag())?;
        match item {
            StackItem::Null => {}
            StackItem::Pointer(position) => self.buf.write_u32::<LittleEndian>(*position)?,
            StackItem::Boolean(value) => self.buf.write_u8(*value as u8)?,
            StackItem::Integer(value) => self.bytes(&value.to_signed_bytes_le())?,
            StackItem::ByteString(bytes) | StackItem::Buffer(bytes) => self.bytes(bytes)?,
            StackItem::Array(items) | StackItem::Struct(items) => self.items(items, depth + 1)?,
            StackItem::Map(entries) => {
                self.len(entries.len())?;
                for (key, value) in entries {
                    self.item(key, depth + 1)?;
                    self.item(value, depth + 1)?;
                }
            }
            StackItem::InteropInterface(type_name) => self.bytes(type_name.as_bytes())?,
        }
        Ok(())
    }

    fn hash(&mut self, hash: &UInt160) {
        self.buf.extend_from_slice(hash.as_bytes());
    }

    fn bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.len(bytes.len())?;
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    /// Collection and byte string lengths are `u32` on the wire
    fn len(&mut self, len: usize) -> Result<()> {
        let len = u32::try_from(len)
            .map_err(|_| CodecError::malformed(format!("length {len} does not fit in u32")))?;
        self.buf.write_u32::<LittleEndian>(len)?;
        Ok(())
    }
}

struct Decoder<'r, R> {
    reader: &'r mut R,
}

impl<'r, R: Read> Decoder<'r, R> {
    fn new(reader: &'r mut R) -> Self {
        Self { reader }
    }

    fn record(&mut self) -> Result<TraceRecord> {
        let outer = self.reader.read_u32::<LittleEndian>()?;
        if outer != RECORD_CONTAINER_LEN {
            return Err(CodecError::malformed(format!(
                "record container holds {outer} elements, expected {RECORD_CONTAINER_LEN}"
            )));
        }

        let discriminator = self.reader.read_i32::<LittleEndian>()?;
        let expected = TraceRecord::field_count(discriminator).ok_or_else(|| {
            CodecError::malformed(format!("unknown record discriminator {discriminator}"))
        })?;
        self.container(expected, "record payload")?;

        let record = match discriminator {
            TraceRecord::TRACE => {
                let state = self.state()?;
                let count = self.len()?;
                let mut stack_frames = Vec::with_capacity(count.min(MAX_PREALLOCATED));
                for _ in 0..count {
                    stack_frames.push(self.frame()?);
                }
                TraceRecord::Trace { state, stack_frames }
            }
            TraceRecord::NOTIFY => TraceRecord::Notify {
                script_hash: self.hash()?,
                event_name: self.string()?,
                state: self.items(0)?,
            },
            TraceRecord::LOG => TraceRecord::Log {
                script_hash: self.hash()?,
                message: self.string()?,
            },
            TraceRecord::RESULTS => TraceRecord::Results {
                state: self.state()?,
                gas_consumed: self.reader.read_i64::<LittleEndian>()?,
                result_stack: self.items(0)?,
            },
            TraceRecord::FAULT => TraceRecord::Fault {
                exception: self.string()?,
            },
            TraceRecord::SCRIPT => TraceRecord::Script {
                script_hash: self.hash()?,
                script: self.bytes()?,
            },
            TraceRecord::STORAGE => {
                let script_hash = self.hash()?;
                let count = self.len()?;
                let mut entries = Vec::with_capacity(count.min(MAX_PREALLOCATED));
                for _ in 0..count {
                    entries.push(StorageEntry {
                        key: self.bytes()?,
                        value: self.bytes()?,
                    });
                }
                TraceRecord::Storage { script_hash, entries }
            }
            TraceRecord::PROTOCOL_SETTINGS => TraceRecord::ProtocolSettings {
                network: self.reader.read_u32::<LittleEndian>()?,
                address_version: self.reader.read_u8()?,
            },
            other => {
                return Err(CodecError::malformed(format!(
                    "unknown record discriminator {other}"
                )))
            }
        };

        Ok(record)
    }

    fn frame(&mut self) -> Result<StackFrameRecord> {
        self.container(STACK_FRAME_FIELDS, "stack frame")?;
        Ok(StackFrameRecord {
            script_hash: self.hash()?,
            instruction_pointer: self.reader.read_u32::<LittleEndian>()?,
            has_catch: self.bool()?,
            evaluation_stack: self.items(0)?,
            local_variables: self.items(0)?,
            static_fields: self.items(0)?,
            arguments: self.items(0)?,
        })
    }

    fn items(&mut self, depth: usize) -> Result<Vec<StackItem>> {
        let count = self.len()?;
        let mut items = Vec::with_capacity(count.min(MAX_PREALLOCATED));
        for _ in 0..count {
            items.push(self.item(depth)?);
        }
        Ok(items)
    }

    fn item(&mut self, depth: usize) -> Result<StackItem> {
        if depth >= MAX_ITEM_DEPTH {
            return Err(too_deep());
        }

        let item = match self.reader.read_u8()? {
            tag::ANY => StackItem::Null,
            tag::POINTER => StackItem::Pointer(self.reader.read_u32::<LittleEndian>()?),
            tag::BOOLEAN => StackItem::Boolean(self.bool()?),
            tag::INTEGER => StackItem::Integer(BigInt::from_signed_bytes_le(&self.bytes()?)),
            tag::BYTE_STRING => StackItem::ByteString(self.bytes()?),
            tag::BUFFER => StackItem::Buffer(self.bytes()?),
            tag::ARRAY => StackItem::Array(self.items(depth + 1)?),
            tag::STRUCT => StackItem::Struct(self.items(depth + 1)?),
            tag::MAP => {
                let count = self.len()?;
                let mut entries = Vec::with_capacity(count.min(MAX_PREALLOCATED));
                for _ in 0..count {
                    let key = self.item(depth + 1)?;
                    let value = self.item(depth + 1)?;
                    entries.push((key, value));
                }
                StackItem::Map(entries)
            }
            tag::INTEROP_INTERFACE => StackItem::InteropInterface(self.string()?),
            other => {
                return Err(CodecError::malformed(format!(
                    "unknown stack item type 0x{other:02x}"
                )))
            }
        };
        Ok(item)
    }

    fn container(&mut self, expected: u32, what: &str) -> Result<()> {
        let count = self.reader.read_u32::<LittleEndian>()?;
        if count != expected {
            return Err(CodecError::malformed(format!(
                "{what} holds {count} fields, expected {expected}"
            )));
        }
        Ok(())
    }

    fn state(&mut self) -> Result<VmState> {
        let raw = self.reader.read_u8()?;
        VmState::try_from(raw)
            .map_err(|value| CodecError::malformed(format!("invalid vm state {value}")))
    }

    fn bool(&mut self) -> Result<bool> {
        match self.reader.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(CodecError::malformed(format!("invalid boolean byte {other}"))),
        }
    }

    fn hash(&mut self) -> Result<UInt160> {
        let mut bytes = [0u8; UInt160::LEN];
        self.reader.read_exact(&mut bytes)?;
        Ok(UInt160(bytes))
    }

    fn string(&mut self) -> Result<String> {
        String::from_utf8(self.bytes()?)
            .map_err(|err| CodecError::malformed(format!("invalid utf-8 text: {err}")))
    }

    fn bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.len()?;
        let mut bytes = Vec::with_capacity(len.min(MAX_PREALLOCATED));
        let read = self.reader.by_ref().take(len as u64).read_to_end(&mut bytes)?;
        if read != len {
            return Err(CodecError::TruncatedStream);
        }
        Ok(bytes)
    }

    fn len(&mut self) -> Result<usize> {
        Ok(self.reader.read_u32::<LittleEndian>()? as usize)
    }
}
