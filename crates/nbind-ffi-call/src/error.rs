use nbind_typing::{MarshalError, RegistryError, UnsupportedType};

use crate::arena::ArenaError;

/// Failure to turn a contract into a bound contract. Nothing is cached for a
/// contract whose binding fails.
#[derive(Debug, thiserror::Error)]
pub enum BindError {
    #[error("contract `{contract}` declares no methods")]
    EmptyContract { contract: String },
    #[error("contract `{contract}`: symbol `{symbol}` not found in `{source_id}`")]
    SymbolNotFound {
        contract: String,
        symbol: String,
        source_id: String,
    },
    #[error("`{contract}.{method}`: {source}")]
    UnsupportedType {
        contract: String,
        method: String,
        #[source]
        source: UnsupportedType,
    },
    #[error("contract `{contract}` declares `{method}` more than once")]
    DuplicateMethod { contract: String, method: String },
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// The reason an individual invocation failed.
#[derive(Debug, thiserror::Error)]
pub enum CallFailure {
    #[error("no method named `{0}`")]
    UnknownMethod(String),
    #[error("expected {expected} arguments, got {found}")]
    Arity { expected: usize, found: usize },
    #[error("argument {index}: expected {expected}, found {found}")]
    ArgumentType {
        index: usize,
        expected: String,
        found: String,
    },
    #[error(transparent)]
    Marshal(#[from] MarshalError),
    #[error(transparent)]
    Arena(#[from] ArenaError),
    #[error("native function returned a null `{structure}` pointer")]
    NullStructReturn { structure: String },
}

#[derive(Debug, thiserror::Error)]
#[error("invocation of `{method}` failed: {cause}")]
pub struct InvocationError {
    pub method: String,
    #[source]
    pub cause: CallFailure,
}

impl InvocationError {
    pub fn new(method: impl Into<String>, cause: CallFailure) -> Self {
        Self {
            method: method.into(),
            cause,
        }
    }

    pub fn marshal(method: impl Into<String>, err: MarshalError) -> Self {
        Self::new(method, CallFailure::Marshal(err))
    }
}

#[derive(Debug, thiserror::Error)]
#[error("failed to load library `{path}`: {source}")]
pub struct LibraryError {
    pub path: String,
    #[source]
    pub source: libloading::Error,
}
