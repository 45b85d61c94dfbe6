//! Binding contracts to native symbols and dispatching calls through them.

use std::ffi::c_void;
use std::fmt;
use std::ptr::NonNull;
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use libffi::middle::Arg;
use nbind_typing::{
    Contract, MethodDecl, NativeLayout, NativeStruct, OnceMap, RegistryError, SemanticType,
    SignatureFile, StructLayout, StructType, TypeRegistry, UnsupportedType, Value,
};
use rustc_hash::FxHashMap;

use crate::arena::Arena;
use crate::cache::{BindingCache, CacheStats, ContractKey, MethodKey, PathKey, SourceKey};
use crate::invoke::{self, ArgSlot, CallSignature, InvokePath, NativeFn};
use crate::{BindError, CallFailure, EngineConfig, InvocationError, SymbolSource, marshal};

static GLOBAL_ENGINE: OnceLock<Engine> = OnceLock::new();

/// Owns the layout registry and the binding caches.
///
/// Cloning is cheap and clones share every cache. [`Engine::global`] is the
/// process-wide instance; independent engines are useful for isolation in
/// tests and for embedding with a different configuration.
#[derive(Clone)]
pub struct Engine {
    types: Arc<TypeRegistry>,
    cache: Arc<BindingCache>,
    config: EngineConfig,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_registry(Arc::new(TypeRegistry::new()), config)
    }

    pub fn with_registry(types: Arc<TypeRegistry>, config: EngineConfig) -> Self {
        Self {
            types,
            cache: Arc::new(BindingCache::default()),
            config,
        }
    }

    /// The process-wide engine, configured from the environment on first use.
    pub fn global() -> &'static Engine {
        GLOBAL_ENGINE.get_or_init(|| Engine::new(EngineConfig::from_env()))
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn register_struct(&self, decl: StructType) -> Result<(), RegistryError> {
        self.types.register(decl)?;
        Ok(())
    }

    /// Registers a typed struct and everything it embeds.
    pub fn declare<T: NativeStruct>(&self) -> Result<(), RegistryError> {
        T::declare(&self.types)
    }

    /// Registers the struct declarations of a signature file and binds its
    /// contract against `source`.
    pub fn bind_file(
        &self,
        file: &SignatureFile,
        source: &dyn SymbolSource,
    ) -> Result<Arc<BoundContract>, BindError> {
        file.register_into(&self.types)?;
        self.bind(&file.contract, source)
    }

    /// Binds `contract` against `source`.
    ///
    /// Every method is resolved and every signature laid out here, so nothing
    /// about a bound contract can fail for lack of a symbol or a layout later.
    /// Binding an equal declaration against the same source again returns
    /// the cached instance. Nothing is cached when any method fails to bind.
    pub fn bind(
        &self,
        contract: &Contract,
        source: &dyn SymbolSource,
    ) -> Result<Arc<BoundContract>, BindError> {
        if contract.is_empty() {
            return Err(BindError::EmptyContract {
                contract: contract.name().to_string(),
            });
        }
        let key = ContractKey {
            contract: contract.clone(),
            source: SourceKey::of(source),
        };
        self.cache
            .contracts
            .get_or_try_insert_with(key.clone(), || self.build_contract(key, contract, source))
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats(self.types.cached_layouts())
    }

    fn build_contract(
        &self,
        key: ContractKey,
        contract: &Contract,
        source: &dyn SymbolSource,
    ) -> Result<Arc<BoundContract>, BindError> {
        let mut resolved: Vec<(MethodKey, Arc<MethodBinding>)> =
            Vec::with_capacity(contract.methods().len());
        for method in contract.methods() {
            if resolved.iter().any(|(known, _)| known.method.name == method.name) {
                return Err(BindError::DuplicateMethod {
                    contract: contract.name().to_string(),
                    method: method.name.to_string(),
                });
            }
            let method_key = MethodKey {
                contract: contract.name_arc().clone(),
                source: key.source.clone(),
                method: method.clone(),
            };
            let binding = match self.cache.methods.get(&method_key) {
                Some(binding) => binding,
                None => self.bind_method(contract.name(), method, source)?,
            };
            resolved.push((method_key, binding));
        }

        // Only a contract whose every method bound publishes its bindings.
        let mut index: FxHashMap<Arc<str>, usize> = FxHashMap::default();
        let mut table = Vec::with_capacity(resolved.len());
        for (method_key, binding) in resolved {
            let binding = self
                .cache
                .methods
                .get_or_insert_with(method_key.clone(), || binding);
            let handler = if binding.is_direct() {
                direct_handler(
                    binding.clone(),
                    method_key,
                    self.cache.paths.clone(),
                    self.config.fast_path_max_arity,
                )
            } else {
                marshaled_handler(binding.clone())
            };
            index.insert(binding.name.clone(), table.len());
            table.push(DispatchEntry { binding, handler });
        }

        tracing::debug!(
            contract = contract.name(),
            source = %key.source.id,
            methods = table.len(),
            "bound contract"
        );
        Ok(Arc::new(BoundContract {
            key,
            index,
            table,
            trace_calls: self.config.trace_calls,
        }))
    }

    fn bind_method(
        &self,
        contract: &str,
        method: &MethodDecl,
        source: &dyn SymbolSource,
    ) -> Result<Arc<MethodBinding>, BindError> {
        let address = source
            .resolve(&method.name)
            .ok_or_else(|| BindError::SymbolNotFound {
                contract: contract.to_string(),
                symbol: method.name.to_string(),
                source_id: source.id().to_string(),
            })?;
        let unsupported = |source: UnsupportedType| BindError::UnsupportedType {
            contract: contract.to_string(),
            method: method.name.to_string(),
            source,
        };

        let mut params = Vec::with_capacity(method.arity());
        let mut struct_params = Vec::new();
        for (index, ty) in method.params.iter().enumerate() {
            match ty {
                SemanticType::Struct(name) => {
                    let layout = self.types.struct_layout_of(name).map_err(unsupported)?;
                    if !layout.is_mutable() {
                        return Err(unsupported(UnsupportedType::new(
                            &**name,
                            "immutable structs cannot be passed by reference",
                        )));
                    }
                    struct_params.push(StructParam { index, layout });
                    params.push(NativeLayout::Address);
                }
                other => params.push(self.types.layout_of(other).map_err(unsupported)?),
            }
        }

        let (ret, struct_return) = match &method.ret {
            SemanticType::Void => (None, None),
            SemanticType::Struct(name) => {
                let layout = self.types.struct_layout_of(name).map_err(unsupported)?;
                (Some(NativeLayout::Address), Some(layout))
            }
            other => (Some(self.types.layout_of(other).map_err(unsupported)?), None),
        };

        let signature = CallSignature { params, ret };
        let native = Arc::new(NativeFn::new(address, &signature));
        let binding = MethodBinding {
            contract: contract.into(),
            name: method.name.clone(),
            address,
            signature,
            struct_params,
            struct_return,
            native,
        };
        tracing::debug!(
            contract,
            method = %method.name,
            direct = binding.is_direct(),
            "bound native method"
        );
        Ok(Arc::new(binding))
    }
}

struct StructParam {
    index: usize,
    layout: Arc<StructLayout>,
}

/// A method resolved to a native entry point, with its signature fully laid
/// out.
pub struct MethodBinding {
    contract: Arc<str>,
    name: Arc<str>,
    address: NonNull<c_void>,
    signature: CallSignature,
    struct_params: Vec<StructParam>,
    struct_return: Option<Arc<StructLayout>>,
    native: Arc<NativeFn>,
}

// SAFETY: the address is only handed to libffi; the binding is immutable.
unsafe impl Send for MethodBinding {}
unsafe impl Sync for MethodBinding {}

impl MethodBinding {
    pub fn contract(&self) -> &str {
        &self.contract
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> NonNull<c_void> {
        self.address
    }

    pub fn signature(&self) -> &CallSignature {
        &self.signature
    }

    /// Indices of the parameters passed as struct pointers.
    pub fn struct_params(&self) -> impl Iterator<Item = usize> + '_ {
        self.struct_params.iter().map(|p| p.index)
    }

    pub fn struct_return(&self) -> Option<&StructLayout> {
        self.struct_return.as_deref()
    }

    /// No struct parameters and no struct return: eligible for the cached
    /// arity-specialized path.
    pub fn is_direct(&self) -> bool {
        self.struct_params.is_empty() && self.struct_return.is_none()
    }
}

impl fmt::Debug for MethodBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodBinding")
            .field("contract", &self.contract)
            .field("name", &self.name)
            .field("address", &self.address)
            .field("signature", &self.signature)
            .finish_non_exhaustive()
    }
}

type Handler = Box<dyn Fn(&mut [Value]) -> Result<Value, CallFailure> + Send + Sync>;

struct DispatchEntry {
    binding: Arc<MethodBinding>,
    handler: Handler,
}

fn direct_handler(
    binding: Arc<MethodBinding>,
    key: MethodKey,
    paths: Arc<OnceMap<PathKey, InvokePath>>,
    max_arity: usize,
) -> Handler {
    let arity = binding.signature.arity();
    let path: OnceLock<InvokePath> = OnceLock::new();
    Box::new(move |args: &mut [Value]| {
        if args.len() != arity {
            return Err(CallFailure::Arity {
                expected: arity,
                found: args.len(),
            });
        }
        let path = path.get_or_init(|| {
            let path_key = PathKey {
                method: key.clone(),
                argc: arity,
            };
            paths.get_or_insert_with(path_key, || {
                tracing::trace!(method = %key.method.name, arity, "specializing call path");
                invoke::specialize(binding.native.clone(), arity, max_arity)
            })
        });
        path(&*args)
    })
}

fn marshaled_handler(binding: Arc<MethodBinding>) -> Handler {
    Box::new(move |args: &mut [Value]| Arena::scope(|arena| call_marshaled(&binding, args, arena)))
}

/// Struct arguments are copied into `arena` before the call and read back
/// into the caller's instances after it; a struct return is materialized from
/// the returned pointer. The arena outlives every native access.
fn call_marshaled(
    binding: &MethodBinding,
    args: &mut [Value],
    arena: &mut Arena,
) -> Result<Value, CallFailure> {
    let params = binding.signature.params.as_slice();
    if args.len() != params.len() {
        return Err(CallFailure::Arity {
            expected: params.len(),
            found: args.len(),
        });
    }

    let mut slots = Vec::with_capacity(params.len());
    let mut pending = Vec::with_capacity(binding.struct_params.len());
    let mut struct_params = binding.struct_params.iter().peekable();
    for (index, (layout, value)) in params.iter().zip(args.iter()).enumerate() {
        let Some(param) = struct_params.next_if(|p| p.index == index) else {
            slots.push(ArgSlot::encode(index, layout, value)?);
            continue;
        };
        let instance = value
            .as_struct()
            .filter(|s| s.type_name() == param.layout.name())
            .ok_or_else(|| CallFailure::ArgumentType {
                index,
                expected: param.layout.name().to_string(),
                found: value_label(value),
            })?;
        let block = marshal::allocate(&param.layout, instance, arena)?;
        slots.push(ArgSlot::Address(block.address()));
        pending.push((param, block));
    }

    let ffi_args: Vec<Arg> = slots.iter().map(ArgSlot::arg).collect();
    // SAFETY: slots were encoded against the bound signature and every struct
    // address points into `arena`, which is live until after read-back.
    let returned = unsafe { binding.native.call(&ffi_args) };

    for (param, block) in pending {
        if let Some(instance) = args[param.index].as_struct_mut() {
            marshal::read_block(&param.layout, instance, arena, block)?;
        }
    }

    match &binding.struct_return {
        Some(layout) => {
            let address = returned.as_address().unwrap_or_default();
            // SAFETY: the native function returns a pointer to a `layout`
            // instance, as declared by the contract.
            let value = unsafe { marshal::read_from_address(layout, address)? };
            Ok(Value::Struct(value))
        }
        None => Ok(returned),
    }
}

fn value_label(value: &Value) -> String {
    match value {
        Value::Struct(s) => s.type_name().to_string(),
        other => other.kind().to_string(),
    }
}

/// A contract whose methods are resolved to native entry points.
///
/// Shared across threads; every invocation is independent.
pub struct BoundContract {
    key: ContractKey,
    index: FxHashMap<Arc<str>, usize>,
    table: Vec<DispatchEntry>,
    trace_calls: bool,
}

impl BoundContract {
    pub fn name(&self) -> &str {
        self.key.contract.name()
    }

    pub fn source_id(&self) -> &str {
        &self.key.source.id
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Method names in declaration order.
    pub fn methods(&self) -> impl Iterator<Item = &str> + '_ {
        self.table.iter().map(|entry| entry.binding.name())
    }

    pub fn method(&self, name: &str) -> Option<&MethodBinding> {
        self.index.get(name).map(|&i| &*self.table[i].binding)
    }

    /// Calls `method` with `args`.
    ///
    /// Struct arguments are updated in place with whatever the native side
    /// wrote to them. Primitive arguments are left untouched.
    pub fn invoke(&self, method: &str, args: &mut [Value]) -> Result<Value, InvocationError> {
        let Some(&slot) = self.index.get(method) else {
            return Err(InvocationError::new(
                method,
                CallFailure::UnknownMethod(method.to_string()),
            ));
        };
        let entry = &self.table[slot];
        let started = self.trace_calls.then(Instant::now);
        let result = (entry.handler)(args).map_err(|cause| InvocationError::new(method, cause));
        if let Some(started) = started {
            tracing::debug!(
                contract = self.name(),
                method,
                elapsed_us = started.elapsed().as_micros() as u64,
                ok = result.is_ok(),
                "native call"
            );
        }
        result
    }

    /// One line per method: `name(params) -> ret` at the native level.
    pub fn describe(&self) -> String {
        let mut out = format!("{self}");
        for entry in &self.table {
            let signature = entry.binding.signature();
            let params: Vec<&str> = signature.params.iter().map(NativeLayout::name).collect();
            let ret = signature.ret.as_ref().map_or("void", NativeLayout::name);
            out.push_str(&format!(
                "\n  {}({}) -> {}",
                entry.binding.name(),
                params.join(", "),
                ret
            ));
        }
        out
    }
}

/// Bound contracts compare by identity.
impl PartialEq for BoundContract {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
    }
}

impl Eq for BoundContract {}

impl fmt::Debug for BoundContract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundContract")
            .field("name", &self.name())
            .field("source", &self.source_id())
            .field("methods", &self.methods().collect::<Vec<_>>())
            .finish()
    }
}

impl fmt::Display for BoundContract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} @ {} ({} methods)",
            self.name(),
            self.source_id(),
            self.table.len()
        )
    }
}
