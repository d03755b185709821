//! Code coverage collection
//!
//! A [`CoverageEngine`] counts instruction hits per script in memory and
//! streams every visited script, address and branch to a [`CoverageWriter`]
//! session log. Each distinct script is also persisted once per output
//! directory, under a file name derived from its hash.

pub mod engine;
pub mod writer;

pub use engine::{CoverageEngine, HitMap};
pub use writer::CoverageWriter;

use crate::script::{ContractState, Script};
use trace_codec::UInt160;

/// Extension of raw script artifacts
pub const SCRIPT_EXTENSION: &str = "neo-script";

/// Extension of deployed contract artifacts
pub const NEF_EXTENSION: &str = "nef";

/// Extension of session logs
pub const SESSION_EXTENSION: &str = "neo-coverage";

/// A script that entered the call stack during a coverage session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutedScript {
    /// Bytecode loaded directly, not deployed
    Script { hash: UInt160, script: Script },
    /// A deployed contract
    Contract(ContractState),
}

impl ExecutedScript {
    pub fn hash(&self) -> UInt160 {
        match self {
            Self::Script { hash, .. } => *hash,
            Self::Contract(contract) => contract.hash,
        }
    }

    pub fn script(&self) -> &Script {
        match self {
            Self::Script { script, .. } => script,
            Self::Contract(contract) => contract.script(),
        }
    }

    /// Content-addressed artifact file name
    pub fn artifact_file_name(&self) -> String {
        let extension = match self {
            Self::Script { .. } => SCRIPT_EXTENSION,
            Self::Contract(_) => NEF_EXTENSION,
        };
        format!("{}.{}", self.hash(), extension)
    }

    /// Bytes persisted for this script: raw bytecode, or the NEF package of a
    /// deployed contract
    pub fn artifact_bytes(&self) -> Vec<u8> {
        match self {
            Self::Script { script, .. } => script.as_bytes().to_vec(),
            Self::Contract(contract) => contract.nef.to_bytes(),
        }
    }
}
