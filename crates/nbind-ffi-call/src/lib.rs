//! Declarative native bindings.
//!
//! A [`Contract`](typing::Contract) names native functions and their semantic
//! signatures. [`Engine::bind`] resolves each function in a [`SymbolSource`],
//! lays out every struct it mentions and prepares a libffi call interface,
//! caching all of it for the life of the engine. The resulting
//! [`BoundContract`] dispatches calls by name, marshaling struct arguments
//! through a per-call [`Arena`] and writing native changes back in place.
//!
//! Calling native code is inherently unchecked: a contract that misdescribes a
//! function is undefined behavior, exactly as a wrong `extern` block would be.
#![cfg_attr(not(test), deny(clippy::unwrap_used))]

mod arena;
mod cache;
mod config;
mod dispatch;
mod error;
mod invoke;
mod library;
pub mod marshal;
mod symbols;
mod typed;

pub use nbind_typing as typing;

pub use arena::{Arena, ArenaError, Block};
pub use cache::CacheStats;
pub use config::{EngineConfig, MAX_SPECIALIZED_ARITY};
pub use dispatch::{BoundContract, Engine, MethodBinding};
pub use error::{BindError, CallFailure, InvocationError, LibraryError};
pub use invoke::CallSignature;
pub use library::Library;
pub use symbols::{SymbolSource, SymbolTable};
