use std::ffi::c_void;
use std::hash::BuildHasher;
use std::ptr::NonNull;

use rustc_hash::{FxBuildHasher, FxHashMap};

/// Somewhere native entry points can be looked up by name.
///
/// `id` and `fingerprint` together identify the source for caching: two
/// sources agreeing on both are treated as the same set of symbols.
pub trait SymbolSource: Send + Sync {
    fn id(&self) -> &str;

    fn resolve(&self, symbol: &str) -> Option<NonNull<c_void>>;

    /// Distinguishes sources that share an id but resolve names differently.
    fn fingerprint(&self) -> u64 {
        0
    }
}

/// A fixed set of in-process entry points, keyed by name.
///
/// The fingerprint covers every entry, so tables that share an id but map a
/// name to different addresses never share bindings.
///
/// ```
/// use nbind_ffi_call::{SymbolSource, SymbolTable};
///
/// extern "C" fn answer() -> i32 {
///     42
/// }
///
/// let table = SymbolTable::new("local").with("answer", answer as *const _);
/// assert!(table.resolve("answer").is_some());
/// assert!(table.resolve("question").is_none());
/// ```
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    id: String,
    symbols: FxHashMap<String, usize>,
    fingerprint: u64,
}

impl SymbolTable {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            symbols: FxHashMap::default(),
            fingerprint: 0,
        }
    }

    pub fn with(mut self, name: impl Into<String>, address: *const c_void) -> Self {
        self.insert(name, address);
        self
    }

    /// Null addresses are ignored.
    pub fn insert(&mut self, name: impl Into<String>, address: *const c_void) {
        if address.is_null() {
            return;
        }
        let name = name.into();
        let entry = entry_hash(&name, address as usize);
        if let Some(previous) = self.symbols.insert(name.clone(), address as usize) {
            self.fingerprint ^= entry_hash(&name, previous);
        }
        self.fingerprint ^= entry;
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

impl SymbolSource for SymbolTable {
    fn id(&self) -> &str {
        &self.id
    }

    fn resolve(&self, symbol: &str) -> Option<NonNull<c_void>> {
        self.symbols
            .get(symbol)
            .and_then(|&address| NonNull::new(address as *mut c_void))
    }

    fn fingerprint(&self) -> u64 {
        self.fingerprint
    }
}

// Entries combine with xor, so the fingerprint ignores insertion order.
fn entry_hash(name: &str, address: usize) -> u64 {
    FxBuildHasher.hash_one((name, address))
}
