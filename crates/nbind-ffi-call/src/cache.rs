use std::sync::Arc;

use nbind_typing::{Contract, MethodDecl, OnceMap};

use crate::SymbolSource;
use crate::dispatch::{BoundContract, MethodBinding};
use crate::invoke::InvokePath;

/// Identity of a symbol source: its id plus its fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct SourceKey {
    pub(crate) id: Arc<str>,
    pub(crate) fingerprint: u64,
}

impl SourceKey {
    pub(crate) fn of(source: &dyn SymbolSource) -> Self {
        Self {
            id: Arc::from(source.id()),
            fingerprint: source.fingerprint(),
        }
    }
}

/// Identity of a bound contract: the same declaration bound against the same
/// symbol source yields the same [`BoundContract`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct ContractKey {
    pub(crate) contract: Contract,
    pub(crate) source: SourceKey,
}

/// A method binding depends on the full method declaration, never on its
/// name alone.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct MethodKey {
    pub(crate) contract: Arc<str>,
    pub(crate) source: SourceKey,
    pub(crate) method: MethodDecl,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct PathKey {
    pub(crate) method: MethodKey,
    pub(crate) argc: usize,
}

/// Process-lifetime binding caches. Entries are created on first use and
/// never evicted; concurrent first uses of a key all observe one entry.
#[derive(Default)]
pub(crate) struct BindingCache {
    pub(crate) contracts: OnceMap<ContractKey, Arc<BoundContract>>,
    pub(crate) methods: OnceMap<MethodKey, Arc<MethodBinding>>,
    pub(crate) paths: Arc<OnceMap<PathKey, InvokePath>>,
}

/// Entry counts of every engine cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub contracts: usize,
    pub methods: usize,
    pub paths: usize,
    pub struct_layouts: usize,
}

impl BindingCache {
    pub(crate) fn stats(&self, struct_layouts: usize) -> CacheStats {
        CacheStats {
            contracts: self.contracts.len(),
            methods: self.methods.len(),
            paths: self.paths.len(),
            struct_layouts,
        }
    }
}
