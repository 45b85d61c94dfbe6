//! Layout registry: structured type declarations and their derived layouts.

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::once_map::OnceMap;
use crate::{NativeLayout, RegistryError, SemanticType, StructLayout, StructType, UnsupportedType};

/// Maps semantic types to native layouts.
///
/// Struct layouts are derived on first request and cached for the life of the
/// registry. Keys come from the program's own declarations, so the cache is
/// bounded and never evicted.
#[derive(Default)]
pub struct TypeRegistry {
    decls: RwLock<FxHashMap<Arc<str>, Arc<StructType>>>,
    layouts: OnceMap<Arc<str>, Arc<StructLayout>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a structured type. Registering an identical declaration again
    /// is a no-op.
    pub fn register(&self, decl: StructType) -> Result<Arc<StructType>, RegistryError> {
        let mut decls = self.decls.write();
        if let Some(existing) = decls.get(decl.name()) {
            if **existing == decl {
                return Ok(existing.clone());
            }
            return Err(RegistryError::Conflict {
                name: decl.name().to_string(),
            });
        }
        let decl = Arc::new(decl);
        decls.insert(decl.name_arc().clone(), decl.clone());
        Ok(decl)
    }

    pub fn declaration(&self, name: &str) -> Option<Arc<StructType>> {
        self.decls.read().get(name).cloned()
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.decls.read().contains_key(name)
    }

    /// Native layout for `ty`. Deterministic: the same type always yields an
    /// equal layout, and structured layouts are shared.
    pub fn layout_of(&self, ty: &SemanticType) -> Result<NativeLayout, UnsupportedType> {
        self.layout_in(ty, &mut Vec::new())
    }

    pub fn struct_layout_of(&self, name: &str) -> Result<Arc<StructLayout>, UnsupportedType> {
        self.struct_layout_in(name, &mut Vec::new())
    }

    pub fn cached_layouts(&self) -> usize {
        self.layouts.len()
    }

    fn layout_in(
        &self,
        ty: &SemanticType,
        visiting: &mut Vec<Arc<str>>,
    ) -> Result<NativeLayout, UnsupportedType> {
        match ty {
            SemanticType::Struct(name) => Ok(NativeLayout::Struct(
                self.struct_layout_in(name, visiting)?,
            )),
            SemanticType::Void => Err(UnsupportedType::new(
                "void",
                "void has no native layout outside a return position",
            )),
            primitive => NativeLayout::primitive(primitive)
                .ok_or_else(|| UnsupportedType::new(primitive.name(), "not a primitive type")),
        }
    }

    fn struct_layout_in(
        &self,
        name: &str,
        visiting: &mut Vec<Arc<str>>,
    ) -> Result<Arc<StructLayout>, UnsupportedType> {
        let decl = self
            .declaration(name)
            .ok_or_else(|| UnsupportedType::new(name, "not a registered struct type"))?;
        if let Some(layout) = self.layouts.get(decl.name_arc()) {
            tracing::trace!(structure = name, "struct layout cache hit");
            return Ok(layout);
        }
        if visiting.iter().any(|seen| &**seen == name) {
            let path: Vec<&str> = visiting.iter().map(|seen| &**seen).collect();
            return Err(UnsupportedType::new(
                name,
                format!("contains itself by value via {}", path.join(" -> ")),
            ));
        }
        visiting.push(decl.name_arc().clone());
        let derived = self.derive(&decl, visiting);
        visiting.pop();
        let layout = derived?;
        Ok(self
            .layouts
            .get_or_insert_with(decl.name_arc().clone(), || layout))
    }

    fn derive(
        &self,
        decl: &StructType,
        visiting: &mut Vec<Arc<str>>,
    ) -> Result<Arc<StructLayout>, UnsupportedType> {
        if decl.fields().is_empty() {
            return Err(UnsupportedType::new(decl.name(), "struct declares no fields"));
        }
        let mut fields = Vec::with_capacity(decl.fields().len());
        for (index, field) in decl.fields().iter().enumerate() {
            if decl.fields()[..index].iter().any(|prior| prior.name == field.name) {
                return Err(UnsupportedType::new(
                    decl.name(),
                    format!("field `{}` is declared twice", field.name),
                ));
            }
            let layout = self.layout_in(&field.ty, visiting).map_err(|err| {
                UnsupportedType::new(
                    decl.name(),
                    format!("field `{}`: {err}", field.name),
                )
            })?;
            fields.push((field.name.clone(), layout));
        }
        let layout = StructLayout::compute(decl.name_arc().clone(), fields, decl.is_mutable());
        tracing::debug!(
            structure = decl.name(),
            size = layout.size(),
            align = layout.align(),
            "derived struct layout"
        );
        Ok(Arc::new(layout))
    }
}
