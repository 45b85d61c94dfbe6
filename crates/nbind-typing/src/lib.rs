//! Semantic types, native layouts and struct marshaling.
//!
//! This crate holds everything about native memory shape that can be done
//! without touching raw pointers: the layout registry, struct layouts that
//! read and write host values against byte buffers, declarative signature
//! files, and typed struct declarations. Calling native code lives in
//! `nbind-ffi-call`.
#![cfg_attr(not(test), deny(clippy::unwrap_used))]

mod contract;
mod error;
mod layout;
pub mod native;
mod once_map;
mod registry;
mod signature;
mod struct_layout;
mod types;
mod value;

pub use contract::{Contract, MethodDecl};
pub use error::{MarshalError, RegistryError, UnsupportedType};
pub use layout::{ADDRESS_SIZE, NativeLayout};
pub use native::{NativeArg, NativeField, NativeReturn, NativeStruct};
pub use once_map::OnceMap;
pub use registry::TypeRegistry;
pub use signature::{ParseError, SignatureFile};
pub use struct_layout::{FieldLayout, StructLayout};
pub use types::{FieldDecl, SemanticType, StructType};
pub use value::{StructValue, Value};
