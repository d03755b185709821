//! Syscall identities and overrides
//!
//! Syscalls are identified by the first four bytes of the SHA-256 of their
//! ASCII name, read as a little-endian `u32`. The table of known syscalls is
//! built once, on first use.

use crate::script::script_hash;
use crate::vm::{EngineView, VmSession};
use once_cell::sync::Lazy;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use trace_codec::{StackItem, UInt160};

pub const RUNTIME_LOG: &str = "System.Runtime.Log";
pub const RUNTIME_NOTIFY: &str = "System.Runtime.Notify";
pub const RUNTIME_CHECK_WITNESS: &str = "System.Runtime.CheckWitness";
pub const CONTRACT_CALL: &str = "System.Contract.Call";
pub const CRYPTO_CHECK_SIG: &str = "System.Crypto.CheckSig";

/// Replacement implementation of a syscall
///
/// Receives the popped arguments, first argument first, and returns the item
/// to push, if any. An `Err` faults the VM with the given message.
pub type SyscallHandler =
    Arc<dyn Fn(&dyn EngineView, Vec<StackItem>) -> Result<Option<StackItem>, String> + Send + Sync>;

/// Predicate deciding whether a script hash has witnessed the transaction
pub type WitnessChecker = Arc<dyn Fn(&UInt160) -> bool + Send + Sync>;

/// A known syscall
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteropDescriptor {
    pub name: &'static str,
    pub hash: u32,
    /// Number of stack items the syscall pops
    pub parameters: usize,
}

impl InteropDescriptor {
    fn new(name: &'static str, parameters: usize) -> Self {
        Self {
            name,
            hash: syscall_hash(name),
            parameters,
        }
    }

    /// Look up a known syscall by hash
    pub fn lookup(hash: u32) -> Option<&'static InteropDescriptor> {
        INTEROP_SERVICES.get(&hash)
    }

    /// Look up a known syscall by name
    pub fn by_name(name: &str) -> Option<&'static InteropDescriptor> {
        Self::lookup(syscall_hash(name))
    }
}

static INTEROP_SERVICES: Lazy<HashMap<u32, InteropDescriptor>> = Lazy::new(|| {
    [
        InteropDescriptor::new(RUNTIME_LOG, 1),
        InteropDescriptor::new(RUNTIME_NOTIFY, 2),
        InteropDescriptor::new(RUNTIME_CHECK_WITNESS, 1),
        InteropDescriptor::new(CONTRACT_CALL, 4),
        InteropDescriptor::new(CRYPTO_CHECK_SIG, 1),
    ]
    .into_iter()
    .map(|descriptor| (descriptor.hash, descriptor))
    .collect()
});

/// Stable identifier of a syscall name
pub fn syscall_hash(name: &str) -> u32 {
    let digest = Sha256::digest(name.as_bytes());
    u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]])
}

/// Verification script of a single-signature account
pub fn signature_redeem_script(public_key: &[u8]) -> Vec<u8> {
    let mut script = Vec::with_capacity(public_key.len() + 7);
    // PUSHDATA1
    script.push(0x0C);
    script.push(public_key.len() as u8);
    script.extend_from_slice(public_key);
    // SYSCALL
    script.push(0x41);
    script.extend_from_slice(&syscall_hash(CRYPTO_CHECK_SIG).to_le_bytes());
    script
}

/// Script hash a witness check argument refers to
///
/// Accepts a 20-byte script hash or a 33-byte compressed public key.
pub fn witness_target(argument: &StackItem) -> Result<UInt160, String> {
    let bytes = argument
        .as_bytes()
        .ok_or_else(|| format!("witness argument must be bytes, got {argument:?}"))?;
    match bytes.len() {
        UInt160::LEN => UInt160::from_slice(bytes).ok_or_else(|| "invalid script hash".to_string()),
        33 => Ok(script_hash(&signature_redeem_script(bytes))),
        len => Err(format!("invalid witness argument length {len}")),
    }
}

/// Route the VM's witness check through `checker`
pub fn override_check_witness<V: VmSession + ?Sized>(vm: &mut V, checker: WitnessChecker) {
    let handler: SyscallHandler = Arc::new(move |_engine: &dyn EngineView, arguments: Vec<StackItem>| {
        let argument = arguments
            .first()
            .ok_or_else(|| "missing witness argument".to_string())?;
        let target = witness_target(argument)?;
        Ok(Some(StackItem::Boolean(checker(&target))))
    });
    vm.override_syscall(syscall_hash(RUNTIME_CHECK_WITNESS), handler);
    tracing::debug!("witness checks routed through caller predicate");
}

/// Undo [`override_check_witness`], returning witness checks to the VM
pub fn restore_check_witness<V: VmSession + ?Sized>(vm: &mut V) -> bool {
    let removed = vm.remove_syscall_override(syscall_hash(RUNTIME_CHECK_WITNESS));
    if removed {
        tracing::debug!("witness checks returned to the VM");
    }
    removed
}
