//! Scripts, deployed contracts and the NEF package format

use ripemd::Ripemd160;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use trace_codec::UInt160;

/// Hash identifying a script: RIPEMD-160 of the SHA-256 of its bytes
pub fn script_hash(bytes: &[u8]) -> UInt160 {
    let sha = Sha256::digest(bytes);
    let digest = Ripemd160::digest(sha);
    let mut hash = [0u8; UInt160::LEN];
    hash.copy_from_slice(&digest);
    UInt160(hash)
}

/// Immutable VM bytecode
///
/// Clones share the underlying buffer.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Script(Arc<[u8]>);

impl Script {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(Arc::from(bytes.into()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Content hash of this script
    pub fn hash(&self) -> UInt160 {
        script_hash(&self.0)
    }
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Script")
            .field("hash", &self.hash())
            .field("len", &self.len())
            .finish()
    }
}

impl From<Vec<u8>> for Script {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

impl From<&[u8]> for Script {
    fn from(bytes: &[u8]) -> Self {
        Self::new(bytes.to_vec())
    }
}

/// A contract deployed in the data snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractState {
    /// Storage id; storage keys of this contract are prefixed with it
    pub id: i32,
    pub hash: UInt160,
    /// Name from the contract manifest
    pub name: String,
    pub nef: NefFile,
}

impl ContractState {
    pub fn script(&self) -> &Script {
        &self.nef.script
    }
}

/// Packaged executable format of a deployed contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NefFile {
    /// Compiler name and version, at most 64 bytes
    pub compiler: String,
    /// Source code location
    pub source: String,
    pub script: Script,
    pub checksum: u32,
}

impl NefFile {
    /// `NEF3` in little-endian
    pub const MAGIC: u32 = 0x3346_454E;

    const COMPILER_LEN: usize = 64;

    /// Build a package and compute its checksum
    pub fn new(compiler: impl Into<String>, source: impl Into<String>, script: Script) -> Self {
        let mut nef = Self {
            compiler: compiler.into(),
            source: source.into(),
            script,
            checksum: 0,
        };
        nef.checksum = nef.compute_checksum();
        nef
    }

    /// First four bytes of the double SHA-256 of the package body
    pub fn compute_checksum(&self) -> u32 {
        let mut body = Vec::new();
        self.write_body(&mut body);
        let digest = Sha256::digest(Sha256::digest(&body));
        u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]])
    }

    /// Serialized package, as written to `.nef` files
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.script.len() + 96);
        self.write_body(&mut buf);
        buf.extend_from_slice(&self.checksum.to_le_bytes());
        buf
    }

    fn write_body(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&Self::MAGIC.to_le_bytes());

        let mut compiler = [0u8; Self::COMPILER_LEN];
        let name = self.compiler.as_bytes();
        let len = name.len().min(Self::COMPILER_LEN);
        compiler[..len].copy_from_slice(&name[..len]);
        buf.extend_from_slice(&compiler);

        write_var_bytes(buf, self.source.as_bytes());
        // reserved
        buf.push(0);
        // method tokens
        write_var_int(buf, 0);
        // reserved
        buf.extend_from_slice(&0u16.to_le_bytes());
        write_var_bytes(buf, self.script.as_bytes());
    }
}

fn write_var_int(buf: &mut Vec<u8>, value: u64) {
    if value < 0xFD {
        buf.push(value as u8);
    } else if value <= 0xFFFF {
        buf.push(0xFD);
        buf.extend_from_slice(&(value as u16).to_le_bytes());
    } else if value <= 0xFFFF_FFFF {
        buf.push(0xFE);
        buf.extend_from_slice(&(value as u32).to_le_bytes());
    } else {
        buf.push(0xFF);
        buf.extend_from_slice(&value.to_le_bytes());
    }
}

fn write_var_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    write_var_int(buf, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_hash_is_deterministic() {
        let a = Script::new(vec![0x11, 0x22, 0x40]);
        let b = Script::from(&[0x11, 0x22, 0x40][..]);
        assert_eq!(a.hash(), b.hash());
        assert_ne!(a.hash(), Script::new(vec![0x40]).hash());
        assert!(!a.hash().is_zero());
    }

    #[test]
    fn test_script_hash_of_empty_input() {
        // RIPEMD-160(SHA-256("")), little-endian
        let expected = "b472a266d0bd89c13706a4132ccfb16f7c3b9fcb";
        assert_eq!(hex::encode(script_hash(&[]).as_bytes()), expected);
    }

    #[test]
    fn test_nef_layout() {
        let script = Script::new(vec![0x11, 0x40]);
        let nef = NefFile::new("test-compiler 1.0", "", script);
        let bytes = nef.to_bytes();

        assert_eq!(&bytes[0..4], b"NEF3");
        assert_eq!(&bytes[4..21], b"test-compiler 1.0");
        assert!(bytes[21..68].iter().all(|b| *b == 0));
        // source length, reserved, token count, reserved u16
        assert_eq!(&bytes[68..73], &[0, 0, 0, 0, 0]);
        assert_eq!(&bytes[73..76], &[2, 0x11, 0x40]);
        assert_eq!(bytes.len(), 80);
        assert_eq!(&bytes[76..80], &nef.checksum.to_le_bytes());
        assert_eq!(nef.checksum, nef.compute_checksum());
    }

    #[test]
    fn test_var_int_widths() {
        let mut buf = Vec::new();
        write_var_int(&mut buf, 0xFC);
        write_var_int(&mut buf, 0xFD);
        write_var_int(&mut buf, 0x1_0000);
        assert_eq!(buf, vec![0xFC, 0xFD, 0xFD, 0x00, 0xFE, 0x00, 0x00, 0x01, 0x00]);
    }
}
