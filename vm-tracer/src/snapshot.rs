//! Read-only view of contract state

use crate::script::ContractState;
use std::collections::{BTreeMap, HashMap};
use trace_codec::{StorageEntry, UInt160};

/// Key/value view of chain state at one point in time
pub trait DataSnapshot: Send + Sync {
    /// Deployed contract with the given hash
    fn contract(&self, hash: &UInt160) -> Option<ContractState>;

    /// Storage entries of contract `contract_id` whose key starts with
    /// `prefix`, in key order
    fn find(&self, contract_id: i32, prefix: &[u8]) -> Vec<StorageEntry>;

    /// All storage of a contract
    fn contract_storage(&self, contract_id: i32) -> Vec<StorageEntry> {
        self.find(contract_id, &[])
    }
}

/// In-memory snapshot
#[derive(Debug, Clone, Default)]
pub struct MemorySnapshot {
    contracts: HashMap<UInt160, ContractState>,
    storage: BTreeMap<(i32, Vec<u8>), Vec<u8>>,
}

impl MemorySnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deploy(&mut self, contract: ContractState) {
        self.contracts.insert(contract.hash, contract);
    }

    pub fn put(&mut self, contract_id: i32, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.storage.insert((contract_id, key.into()), value.into());
    }
}

impl DataSnapshot for MemorySnapshot {
    fn contract(&self, hash: &UInt160) -> Option<ContractState> {
        self.contracts.get(hash).cloned()
    }

    fn find(&self, contract_id: i32, prefix: &[u8]) -> Vec<StorageEntry> {
        self.storage
            .range((contract_id, prefix.to_vec())..)
            .take_while(|((id, key), _)| *id == contract_id && key.starts_with(prefix))
            .map(|((_, key), value)| StorageEntry {
                key: key.clone(),
                value: value.clone(),
            })
            .collect()
    }
}
