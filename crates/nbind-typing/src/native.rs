//! Typed Rust structs that marshal as native structures.
//!
//! [`native_struct!`](crate::native_struct) declares a `#[repr(C)]` Rust struct
//! together with its [`StructType`] and conversions to and from
//! [`StructValue`], so typed code never builds declarations by hand.

use crate::{
    MarshalError, RegistryError, SemanticType, StructType, StructValue, TypeRegistry, Value,
};

/// A Rust type usable as a field of a native struct.
pub trait NativeField: Sized {
    fn semantic_type() -> SemanticType;

    fn to_value(&self) -> Value;

    fn from_value(value: &Value) -> Result<Self, MarshalError>;

    /// Updates `self` from a value read back from native memory.
    fn update_from(&mut self, value: &Value) -> Result<(), MarshalError> {
        *self = Self::from_value(value)?;
        Ok(())
    }

    /// Registers any struct declarations this type depends on.
    fn declare_dependencies(registry: &TypeRegistry) -> Result<(), RegistryError> {
        let _ = registry;
        Ok(())
    }
}

macro_rules! primitive_field {
    ($($ty:ty => $variant:ident, $semantic:ident;)*) => {
        $(impl NativeField for $ty {
            fn semantic_type() -> SemanticType {
                SemanticType::$semantic
            }

            fn to_value(&self) -> Value {
                Value::$variant(*self)
            }

            fn from_value(value: &Value) -> Result<Self, MarshalError> {
                match value {
                    Value::$variant(v) => Ok(*v),
                    other => Err(MarshalError::ValueMismatch {
                        expected: Value::$variant(Default::default()).kind(),
                        found: other.kind(),
                    }),
                }
            }
        })*
    };
}

primitive_field! {
    i8 => Byte, Byte;
    i16 => Short, Short;
    i32 => Int, Int;
    i64 => Long, Long;
    f32 => Float, Float;
    f64 => Double, Double;
    bool => Bool, Bool;
    u16 => WChar, WChar;
    usize => Address, Address;
}

/// A Rust struct with a native structure declaration.
pub trait NativeStruct: Sized {
    const NAME: &'static str;

    fn struct_type() -> StructType;

    fn to_struct_value(&self) -> StructValue;

    fn from_struct_value(value: &StructValue) -> Result<Self, MarshalError>;

    /// Updates every field in place from `value`.
    fn update_from_struct(&mut self, value: &StructValue) -> Result<(), MarshalError>;

    /// Registers this declaration and every nested one it embeds.
    fn declare(registry: &TypeRegistry) -> Result<(), RegistryError>;
}

impl<T: NativeStruct> NativeField for T {
    fn semantic_type() -> SemanticType {
        SemanticType::structure(T::NAME)
    }

    fn to_value(&self) -> Value {
        Value::Struct(self.to_struct_value())
    }

    fn from_value(value: &Value) -> Result<Self, MarshalError> {
        match value {
            Value::Struct(s) => T::from_struct_value(s),
            other => Err(MarshalError::ValueMismatch {
                expected: "struct",
                found: other.kind(),
            }),
        }
    }

    fn update_from(&mut self, value: &Value) -> Result<(), MarshalError> {
        match value {
            Value::Struct(s) => self.update_from_struct(s),
            other => Err(MarshalError::ValueMismatch {
                expected: "struct",
                found: other.kind(),
            }),
        }
    }

    fn declare_dependencies(registry: &TypeRegistry) -> Result<(), RegistryError> {
        <T as NativeStruct>::declare(registry)
    }
}

/// A Rust type usable as a parameter of a typed native method.
///
/// Primitives pass by value. `&mut T` for a [`NativeStruct`] passes a pointer
/// and takes back whatever the native side wrote; `&T` passes a pointer and
/// discards the written copy.
pub trait NativeArg {
    fn semantic_type() -> SemanticType;

    fn to_arg(&self) -> Value;

    /// Receives the argument slot after the call returns.
    fn write_back(&mut self, value: Value) -> Result<(), MarshalError> {
        let _ = value;
        Ok(())
    }

    fn declare_dependencies(registry: &TypeRegistry) -> Result<(), RegistryError> {
        let _ = registry;
        Ok(())
    }
}

/// A Rust type usable as the return type of a typed native method.
pub trait NativeReturn: Sized {
    fn semantic_type() -> SemanticType;

    fn from_return(value: Value) -> Result<Self, MarshalError>;

    fn declare_dependencies(registry: &TypeRegistry) -> Result<(), RegistryError> {
        let _ = registry;
        Ok(())
    }
}

macro_rules! primitive_arg {
    ($($ty:ty),*) => {
        $(impl NativeArg for $ty {
            fn semantic_type() -> SemanticType {
                <$ty as NativeField>::semantic_type()
            }

            fn to_arg(&self) -> Value {
                NativeField::to_value(self)
            }
        }

        impl NativeReturn for $ty {
            fn semantic_type() -> SemanticType {
                <$ty as NativeField>::semantic_type()
            }

            fn from_return(value: Value) -> Result<Self, MarshalError> {
                <$ty as NativeField>::from_value(&value)
            }
        })*
    };
}

primitive_arg!(i8, i16, i32, i64, f32, f64, bool, u16, usize);

impl NativeReturn for () {
    fn semantic_type() -> SemanticType {
        SemanticType::Void
    }

    fn from_return(value: Value) -> Result<Self, MarshalError> {
        match value {
            Value::Void => Ok(()),
            other => Err(MarshalError::ValueMismatch {
                expected: "void",
                found: other.kind(),
            }),
        }
    }
}

impl<T: NativeStruct> NativeArg for &mut T {
    fn semantic_type() -> SemanticType {
        SemanticType::structure(T::NAME)
    }

    fn to_arg(&self) -> Value {
        Value::Struct(self.to_struct_value())
    }

    fn write_back(&mut self, value: Value) -> Result<(), MarshalError> {
        NativeField::update_from(&mut **self, &value)
    }

    fn declare_dependencies(registry: &TypeRegistry) -> Result<(), RegistryError> {
        T::declare(registry)
    }
}

impl<T: NativeStruct> NativeArg for &T {
    fn semantic_type() -> SemanticType {
        SemanticType::structure(T::NAME)
    }

    fn to_arg(&self) -> Value {
        Value::Struct(self.to_struct_value())
    }

    fn declare_dependencies(registry: &TypeRegistry) -> Result<(), RegistryError> {
        T::declare(registry)
    }
}

impl<T: NativeStruct> NativeReturn for T {
    fn semantic_type() -> SemanticType {
        SemanticType::structure(T::NAME)
    }

    fn from_return(value: Value) -> Result<Self, MarshalError> {
        <T as NativeField>::from_value(&value)
    }

    fn declare_dependencies(registry: &TypeRegistry) -> Result<(), RegistryError> {
        T::declare(registry)
    }
}

#[doc(hidden)]
pub fn expect_type(value: &StructValue, name: &str) -> Result<(), MarshalError> {
    if value.type_name() != name {
        return Err(MarshalError::TypeMismatch {
            expected: name.to_string(),
            found: value.type_name().to_string(),
        });
    }
    Ok(())
}

#[doc(hidden)]
pub fn field<'a>(value: &'a StructValue, name: &str) -> Result<&'a Value, MarshalError> {
    value.get(name).ok_or_else(|| MarshalError::MissingField {
        structure: value.type_name().to_string(),
        field: name.to_string(),
    })
}

/// Declares a `#[repr(C)]` struct that implements [`NativeStruct`].
///
/// ```
/// nbind_typing::native_struct! {
///     #[derive(Debug, Default, Clone, PartialEq)]
///     pub struct Point {
///         pub x: i32,
///         pub y: i32,
///     }
/// }
///
/// use nbind_typing::NativeStruct;
/// assert_eq!(Point::struct_type().fields().len(), 2);
/// ```
#[macro_export]
macro_rules! native_struct {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $($(#[$fmeta:meta])* $fvis:vis $field:ident : $fty:ty),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(C)]
        $vis struct $name {
            $($(#[$fmeta])* $fvis $field: $fty),*
        }

        impl $crate::NativeStruct for $name {
            const NAME: &'static str = stringify!($name);

            fn struct_type() -> $crate::StructType {
                $crate::StructType::new(stringify!($name))
                    $(.field(stringify!($field), <$fty as $crate::NativeField>::semantic_type()))*
            }

            fn to_struct_value(&self) -> $crate::StructValue {
                $crate::StructValue::new(
                    stringify!($name),
                    vec![$((
                        ::std::sync::Arc::from(stringify!($field)),
                        $crate::NativeField::to_value(&self.$field),
                    )),*],
                )
            }

            fn from_struct_value(
                value: &$crate::StructValue,
            ) -> ::std::result::Result<Self, $crate::MarshalError> {
                $crate::native::expect_type(value, stringify!($name))?;
                Ok(Self {
                    $($field: <$fty as $crate::NativeField>::from_value(
                        $crate::native::field(value, stringify!($field))?,
                    )?),*
                })
            }

            fn update_from_struct(
                &mut self,
                value: &$crate::StructValue,
            ) -> ::std::result::Result<(), $crate::MarshalError> {
                $crate::native::expect_type(value, stringify!($name))?;
                $($crate::NativeField::update_from(
                    &mut self.$field,
                    $crate::native::field(value, stringify!($field))?,
                )?;)*
                Ok(())
            }

            fn declare(
                registry: &$crate::TypeRegistry,
            ) -> ::std::result::Result<(), $crate::RegistryError> {
                $(<$fty as $crate::NativeField>::declare_dependencies(registry)?;)*
                registry.register(<Self as $crate::NativeStruct>::struct_type())?;
                Ok(())
            }
        }
    };
}
