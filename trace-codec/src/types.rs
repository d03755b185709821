//! Value types shared by trace records

use num_bigint::BigInt;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 160-bit script hash identifying a script or deployed contract
///
/// Bytes are stored little-endian; the textual form is the reversed
/// (big-endian) hex string prefixed with `0x`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct UInt160(pub [u8; 20]);

impl UInt160 {
    /// Number of bytes in a script hash
    pub const LEN: usize = 20;

    /// The all-zero hash
    pub const ZERO: Self = Self([0; 20]);

    /// Build a hash from a little-endian byte slice of exactly 20 bytes
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let array: [u8; 20] = bytes.try_into().ok()?;
        Some(Self(array))
    }

    /// Little-endian bytes of this hash
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0; 20]
    }
}

impl fmt::Display for UInt160 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut reversed = self.0;
        reversed.reverse();
        write!(f, "0x{}", hex::encode(reversed))
    }
}

impl fmt::Debug for UInt160 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl FromStr for UInt160 {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let mut bytes = [0u8; 20];
        hex::decode_to_slice(digits, &mut bytes)?;
        bytes.reverse();
        Ok(Self(bytes))
    }
}

/// Execution state of the VM
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum VmState {
    /// Running, or not yet started
    #[default]
    None = 0,
    /// Completed successfully
    Halt = 1,
    /// Stopped on an uncaught exception
    Fault = 2,
    /// Paused by a debugger
    Break = 4,
}

impl TryFrom<u8> for VmState {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Halt),
            2 => Ok(Self::Fault),
            4 => Ok(Self::Break),
            other => Err(other),
        }
    }
}

impl fmt::Display for VmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "NONE",
            Self::Halt => "HALT",
            Self::Fault => "FAULT",
            Self::Break => "BREAK",
        };
        f.write_str(name)
    }
}

/// A value living on the VM's evaluation stack, in a slot, or inside a
/// compound item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StackItem {
    Null,
    /// Position inside the script that created it
    Pointer(u32),
    Boolean(bool),
    Integer(BigInt),
    ByteString(Vec<u8>),
    Buffer(Vec<u8>),
    Array(Vec<StackItem>),
    Struct(Vec<StackItem>),
    /// Entries in insertion order
    Map(Vec<(StackItem, StackItem)>),
    /// Opaque host object, recorded by its type name
    InteropInterface(String),
}

impl StackItem {
    /// Wire tag, matching the VM's stack item type codes
    pub fn type_tag(&self) -> u8 {
        match self {
            Self::Null => tag::ANY,
            Self::Pointer(_) => tag::POINTER,
            Self::Boolean(_) => tag::BOOLEAN,
            Self::Integer(_) => tag::INTEGER,
            Self::ByteString(_) => tag::BYTE_STRING,
            Self::Buffer(_) => tag::BUFFER,
            Self::Array(_) => tag::ARRAY,
            Self::Struct(_) => tag::STRUCT,
            Self::Map(_) => tag::MAP,
            Self::InteropInterface(_) => tag::INTEROP_INTERFACE,
        }
    }

    /// Raw bytes of a byte string or buffer
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::ByteString(bytes) | Self::Buffer(bytes) => Some(bytes),
            _ => None,
        }
    }
}

impl From<bool> for StackItem {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<i64> for StackItem {
    fn from(value: i64) -> Self {
        Self::Integer(BigInt::from(value))
    }
}

impl From<&str> for StackItem {
    fn from(value: &str) -> Self {
        Self::ByteString(value.as_bytes().to_vec())
    }
}

impl From<Vec<u8>> for StackItem {
    fn from(value: Vec<u8>) -> Self {
        Self::ByteString(value)
    }
}

/// Stack item type codes
pub mod tag {
    pub const ANY: u8 = 0x00;
    pub const POINTER: u8 = 0x10;
    pub const BOOLEAN: u8 = 0x20;
    pub const INTEGER: u8 = 0x21;
    pub const BYTE_STRING: u8 = 0x28;
    pub const BUFFER: u8 = 0x30;
    pub const ARRAY: u8 = 0x40;
    pub const STRUCT: u8 = 0x41;
    pub const MAP: u8 = 0x48;
    pub const INTEROP_INTERFACE: u8 = 0x60;
}
