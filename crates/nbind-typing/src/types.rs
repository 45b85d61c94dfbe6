use std::fmt;
use std::sync::Arc;

/// Portable description of a field, parameter or return type.
///
/// `Struct` names a structured type registered in a [`crate::TypeRegistry`].
/// Used as a field type it is embedded by value; used as a parameter or
/// return type it is passed through a pointer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SemanticType {
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
    Bool,
    WChar,
    Address,
    /// Only meaningful as a return type.
    Void,
    Struct(Arc<str>),
}

impl SemanticType {
    pub fn structure(name: impl Into<Arc<str>>) -> Self {
        SemanticType::Struct(name.into())
    }

    pub fn is_struct(&self) -> bool {
        matches!(self, SemanticType::Struct(_))
    }

    pub fn struct_name(&self) -> Option<&str> {
        match self {
            SemanticType::Struct(name) => Some(name),
            _ => None,
        }
    }

    /// Parse a type keyword as written in signature files.
    ///
    /// Any identifier that is not a primitive keyword is taken to be a
    /// structured type name; resolution happens later against a registry.
    pub fn parse(text: &str) -> Option<Self> {
        let ty = match text {
            "byte" | "i8" => SemanticType::Byte,
            "short" | "i16" => SemanticType::Short,
            "int" | "i32" => SemanticType::Int,
            "long" | "i64" => SemanticType::Long,
            "float" | "f32" => SemanticType::Float,
            "double" | "f64" => SemanticType::Double,
            "bool" => SemanticType::Bool,
            "wchar" | "char16" => SemanticType::WChar,
            "ptr" | "address" | "usize" => SemanticType::Address,
            "void" => SemanticType::Void,
            other if is_identifier(other) => SemanticType::structure(other),
            _ => return None,
        };
        Some(ty)
    }

    pub fn name(&self) -> &str {
        match self {
            SemanticType::Byte => "byte",
            SemanticType::Short => "short",
            SemanticType::Int => "int",
            SemanticType::Long => "long",
            SemanticType::Float => "float",
            SemanticType::Double => "double",
            SemanticType::Bool => "bool",
            SemanticType::WChar => "wchar",
            SemanticType::Address => "address",
            SemanticType::Void => "void",
            SemanticType::Struct(name) => name,
        }
    }
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub(crate) fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDecl {
    pub name: Arc<str>,
    pub ty: SemanticType,
}

/// Declaration of a structured type: ordered, named fields.
///
/// Field order is declaration order and determines the native memory shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructType {
    name: Arc<str>,
    fields: Vec<FieldDecl>,
    mutable: bool,
}

impl StructType {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            mutable: true,
        }
    }

    pub fn field(mut self, name: impl Into<Arc<str>>, ty: SemanticType) -> Self {
        self.fields.push(FieldDecl {
            name: name.into(),
            ty,
        });
        self
    }

    /// Marks the declaration as read-only: instances can be written to native
    /// memory but never updated from it.
    pub fn immutable(mut self) -> Self {
        self.mutable = false;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn name_arc(&self) -> &Arc<str> {
        &self.name
    }

    pub fn fields(&self) -> &[FieldDecl] {
        &self.fields
    }

    pub fn is_mutable(&self) -> bool {
        self.mutable
    }
}

impl fmt::Display for StructType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "struct {} {{ ", self.name)?;
        for (index, field) in self.fields.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", field.name, field.ty)?;
        }
        f.write_str(" }")
    }
}
