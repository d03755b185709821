//! Contract name lookup shared across trace sessions

use crate::snapshot::DataSnapshot;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::sync::Arc;
use trace_codec::UInt160;

static GLOBAL: Lazy<ContractNameCache> = Lazy::new(ContractNameCache::new);

/// Script hash to contract name, filled at most once per hash
///
/// Hashes that are not deployed contracts resolve to an empty name. Clones
/// share the same entries.
#[derive(Debug, Clone, Default)]
pub struct ContractNameCache {
    names: Arc<DashMap<UInt160, String>>,
}

impl ContractNameCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide cache used by engines that are not given their own
    pub fn global() -> Self {
        GLOBAL.clone()
    }

    /// Name of the contract with `script_hash`, looked up in `snapshot` the
    /// first time the hash is seen
    pub fn resolve(&self, snapshot: &dyn DataSnapshot, script_hash: &UInt160) -> String {
        if let Some(name) = self.names.get(script_hash) {
            return name.clone();
        }
        self.names
            .entry(*script_hash)
            .or_insert_with(|| {
                let name = snapshot
                    .contract(script_hash)
                    .map(|contract| contract.name)
                    .unwrap_or_default();
                tracing::debug!("Cached contract name {:?} for {}", name, script_hash);
                name
            })
            .clone()
    }

    pub fn get(&self, script_hash: &UInt160) -> Option<String> {
        self.names.get(script_hash).map(|name| name.clone())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
