//! Native layouts for primitive and structured values.
//!
//! Every layout knows its size and alignment and can move one value between a
//! host [`Value`] and a byte buffer at a given offset, in host byte order.

use std::mem::{align_of, size_of};
use std::sync::Arc;

use crate::{MarshalError, SemanticType, StructLayout, Value};

pub const ADDRESS_SIZE: usize = size_of::<usize>();

/// Concrete ABI shape of a semantic type.
///
/// Booleans use the one-byte C `_Bool` representation and wide characters are
/// UTF-16 code units.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeLayout {
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
    Bool,
    WChar,
    Address,
    Struct(Arc<StructLayout>),
}

impl NativeLayout {
    /// Layout of a non-structured semantic type; `None` for `Void` and
    /// structured types.
    pub fn primitive(ty: &SemanticType) -> Option<Self> {
        let layout = match ty {
            SemanticType::Byte => NativeLayout::Byte,
            SemanticType::Short => NativeLayout::Short,
            SemanticType::Int => NativeLayout::Int,
            SemanticType::Long => NativeLayout::Long,
            SemanticType::Float => NativeLayout::Float,
            SemanticType::Double => NativeLayout::Double,
            SemanticType::Bool => NativeLayout::Bool,
            SemanticType::WChar => NativeLayout::WChar,
            SemanticType::Address => NativeLayout::Address,
            SemanticType::Void | SemanticType::Struct(_) => return None,
        };
        Some(layout)
    }

    pub fn size(&self) -> usize {
        match self {
            NativeLayout::Byte | NativeLayout::Bool => 1,
            NativeLayout::Short | NativeLayout::WChar => 2,
            NativeLayout::Int | NativeLayout::Float => 4,
            NativeLayout::Long | NativeLayout::Double => 8,
            NativeLayout::Address => ADDRESS_SIZE,
            NativeLayout::Struct(layout) => layout.size(),
        }
    }

    pub fn align(&self) -> usize {
        match self {
            NativeLayout::Byte | NativeLayout::Bool => 1,
            NativeLayout::Short | NativeLayout::WChar => 2,
            NativeLayout::Int | NativeLayout::Float => 4,
            NativeLayout::Long => align_of::<i64>(),
            NativeLayout::Double => align_of::<f64>(),
            NativeLayout::Address => align_of::<usize>(),
            NativeLayout::Struct(layout) => layout.align(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            NativeLayout::Byte => "byte",
            NativeLayout::Short => "short",
            NativeLayout::Int => "int",
            NativeLayout::Long => "long",
            NativeLayout::Float => "float",
            NativeLayout::Double => "double",
            NativeLayout::Bool => "bool",
            NativeLayout::WChar => "wchar",
            NativeLayout::Address => "address",
            NativeLayout::Struct(_) => "struct",
        }
    }

    pub fn is_struct(&self) -> bool {
        matches!(self, NativeLayout::Struct(_))
    }

    /// Whether `value` has the tag this layout encodes.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (NativeLayout::Struct(layout), Value::Struct(s)) => s.type_name() == layout.name(),
            (layout, value) => layout.name() == value.kind() && !layout.is_struct(),
        }
    }

    /// The zero value of this layout, as read from zero-filled memory.
    pub fn zero_value(&self) -> Value {
        match self {
            NativeLayout::Byte => Value::Byte(0),
            NativeLayout::Short => Value::Short(0),
            NativeLayout::Int => Value::Int(0),
            NativeLayout::Long => Value::Long(0),
            NativeLayout::Float => Value::Float(0.0),
            NativeLayout::Double => Value::Double(0.0),
            NativeLayout::Bool => Value::Bool(false),
            NativeLayout::WChar => Value::WChar(0),
            NativeLayout::Address => Value::Address(0),
            NativeLayout::Struct(layout) => Value::Struct(layout.zeroed()),
        }
    }

    pub fn write(&self, buf: &mut [u8], offset: usize, value: &Value) -> Result<(), MarshalError> {
        match (self, value) {
            (NativeLayout::Byte, Value::Byte(v)) => put(buf, offset, &v.to_ne_bytes()),
            (NativeLayout::Short, Value::Short(v)) => put(buf, offset, &v.to_ne_bytes()),
            (NativeLayout::Int, Value::Int(v)) => put(buf, offset, &v.to_ne_bytes()),
            (NativeLayout::Long, Value::Long(v)) => put(buf, offset, &v.to_ne_bytes()),
            (NativeLayout::Float, Value::Float(v)) => put(buf, offset, &v.to_ne_bytes()),
            (NativeLayout::Double, Value::Double(v)) => put(buf, offset, &v.to_ne_bytes()),
            (NativeLayout::Bool, Value::Bool(v)) => put(buf, offset, &[u8::from(*v)]),
            (NativeLayout::WChar, Value::WChar(v)) => put(buf, offset, &v.to_ne_bytes()),
            (NativeLayout::Address, Value::Address(v)) => put(buf, offset, &v.to_ne_bytes()),
            (NativeLayout::Struct(layout), Value::Struct(s)) => layout.write_at(s, buf, offset),
            (layout, value) => Err(MarshalError::ValueMismatch {
                expected: layout.name(),
                found: value.kind(),
            }),
        }
    }

    pub fn read(&self, buf: &[u8], offset: usize) -> Result<Value, MarshalError> {
        let value = match self {
            NativeLayout::Byte => Value::Byte(i8::from_ne_bytes(take(buf, offset)?)),
            NativeLayout::Short => Value::Short(i16::from_ne_bytes(take(buf, offset)?)),
            NativeLayout::Int => Value::Int(i32::from_ne_bytes(take(buf, offset)?)),
            NativeLayout::Long => Value::Long(i64::from_ne_bytes(take(buf, offset)?)),
            NativeLayout::Float => Value::Float(f32::from_ne_bytes(take(buf, offset)?)),
            NativeLayout::Double => Value::Double(f64::from_ne_bytes(take(buf, offset)?)),
            NativeLayout::Bool => {
                let [byte] = take::<1>(buf, offset)?;
                Value::Bool(byte != 0)
            }
            NativeLayout::WChar => Value::WChar(u16::from_ne_bytes(take(buf, offset)?)),
            NativeLayout::Address => {
                Value::Address(usize::from_ne_bytes(take::<ADDRESS_SIZE>(buf, offset)?))
            }
            NativeLayout::Struct(layout) => {
                let mut fresh = layout.zeroed();
                layout.read_into_at(&mut fresh, buf, offset)?;
                Value::Struct(fresh)
            }
        };
        Ok(value)
    }

    /// Reads the value at `offset` into `target`, updating structured values
    /// field by field instead of replacing them.
    pub fn read_into(
        &self,
        buf: &[u8],
        offset: usize,
        target: &mut Value,
    ) -> Result<(), MarshalError> {
        if !self.accepts(target) {
            return Err(MarshalError::ValueMismatch {
                expected: self.name(),
                found: target.kind(),
            });
        }
        match (self, target) {
            (NativeLayout::Struct(layout), Value::Struct(s)) => layout.read_into_at(s, buf, offset),
            (layout, target) => {
                *target = layout.read(buf, offset)?;
                Ok(())
            }
        }
    }
}

fn put(buf: &mut [u8], offset: usize, bytes: &[u8]) -> Result<(), MarshalError> {
    let available = buf.len();
    let slot = offset
        .checked_add(bytes.len())
        .and_then(|end| buf.get_mut(offset..end))
        .ok_or(MarshalError::OutOfBounds {
            offset,
            len: bytes.len(),
            available,
        })?;
    slot.copy_from_slice(bytes);
    Ok(())
}

fn take<const N: usize>(buf: &[u8], offset: usize) -> Result<[u8; N], MarshalError> {
    offset
        .checked_add(N)
        .and_then(|end| buf.get(offset..end))
        .and_then(|slot| <[u8; N]>::try_from(slot).ok())
        .ok_or(MarshalError::OutOfBounds {
            offset,
            len: N,
            available: buf.len(),
        })
}
