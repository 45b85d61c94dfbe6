/// A semantic type that has no native layout.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported type `{ty}`: {reason}")]
pub struct UnsupportedType {
    pub ty: String,
    pub reason: String,
}

impl UnsupportedType {
    pub fn new(ty: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            ty: ty.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("struct `{name}` is already registered with a different declaration")]
    Conflict { name: String },
}

/// Failure while copying a value to or from native memory.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MarshalError {
    #[error("expected an instance of `{expected}`, found `{found}`")]
    TypeMismatch { expected: String, found: String },
    #[error("`{structure}` declares {expected} fields, instance has {found}")]
    FieldCount {
        structure: String,
        expected: usize,
        found: usize,
    },
    #[error("`{structure}` field {index} is `{expected}`, instance has `{found}`")]
    FieldName {
        structure: String,
        index: usize,
        expected: String,
        found: String,
    },
    #[error("`{structure}` has no field `{field}`")]
    MissingField { structure: String, field: String },
    #[error("expected a {expected} value, found {found}")]
    ValueMismatch {
        expected: &'static str,
        found: &'static str,
    },
    #[error("field `{structure}.{field}`: {source}")]
    Field {
        structure: String,
        field: String,
        source: Box<MarshalError>,
    },
    #[error("{len} bytes at offset {offset} exceed a {available}-byte buffer")]
    OutOfBounds {
        offset: usize,
        len: usize,
        available: usize,
    },
    #[error("`{structure}` is immutable and cannot be updated from native memory")]
    Immutable { structure: String },
}
