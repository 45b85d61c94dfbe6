use std::sync::Arc;

use crate::{MarshalError, NativeLayout, StructValue};

#[derive(Debug, Clone, PartialEq)]
pub struct FieldLayout {
    name: Arc<str>,
    layout: NativeLayout,
    offset: usize,
}

impl FieldLayout {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn layout(&self) -> &NativeLayout {
        &self.layout
    }

    pub fn offset(&self) -> usize {
        self.offset
    }
}

/// Byte-level shape of a structured type, computed with C layout rules.
///
/// Each field sits at the next multiple of its own alignment; the total size
/// is rounded up to the largest field alignment so arrays of the struct stay
/// aligned.
#[derive(Debug, Clone, PartialEq)]
pub struct StructLayout {
    name: Arc<str>,
    fields: Vec<FieldLayout>,
    size: usize,
    align: usize,
    mutable: bool,
}

impl StructLayout {
    pub(crate) fn compute(
        name: Arc<str>,
        fields: Vec<(Arc<str>, NativeLayout)>,
        mutable: bool,
    ) -> Self {
        let mut offset = 0usize;
        let mut align = 1usize;
        let fields = fields
            .into_iter()
            .map(|(name, layout)| {
                let field_align = layout.align();
                offset = offset.next_multiple_of(field_align);
                let field = FieldLayout {
                    name,
                    offset,
                    layout,
                };
                offset += field.layout.size();
                align = align.max(field_align);
                field
            })
            .collect();
        Self {
            name,
            fields,
            size: offset.next_multiple_of(align),
            align,
            mutable,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn align(&self) -> usize {
        self.align
    }

    pub fn is_mutable(&self) -> bool {
        self.mutable
    }

    pub fn fields(&self) -> &[FieldLayout] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldLayout> {
        self.fields.iter().find(|field| field.name() == name)
    }

    pub fn offset_of(&self, name: &str) -> Option<usize> {
        self.field(name).map(FieldLayout::offset)
    }

    /// A fresh instance with every field zero-valued.
    pub fn zeroed(&self) -> StructValue {
        StructValue::new(
            self.name.clone(),
            self.fields
                .iter()
                .map(|field| (field.name.clone(), field.layout.zero_value()))
                .collect(),
        )
    }

    /// Writes every field of `value` into `buf` at its cached offset.
    pub fn write_to(&self, value: &StructValue, buf: &mut [u8]) -> Result<(), MarshalError> {
        self.check_extent(buf.len(), 0)?;
        self.write_at(value, buf, 0)
    }

    /// Reads every field back from `buf`, mutating `target` in place.
    pub fn read_into(&self, target: &mut StructValue, buf: &[u8]) -> Result<(), MarshalError> {
        if !self.mutable {
            return Err(MarshalError::Immutable {
                structure: self.name.to_string(),
            });
        }
        self.check_extent(buf.len(), 0)?;
        self.read_into_at(target, buf, 0)
    }

    /// Materializes a new instance from `buf`.
    pub fn read_new(&self, buf: &[u8]) -> Result<StructValue, MarshalError> {
        self.check_extent(buf.len(), 0)?;
        let mut fresh = self.zeroed();
        self.read_into_at(&mut fresh, buf, 0)?;
        Ok(fresh)
    }

    pub(crate) fn write_at(
        &self,
        value: &StructValue,
        buf: &mut [u8],
        base: usize,
    ) -> Result<(), MarshalError> {
        self.check_shape(value)?;
        for (field, (_, slot)) in self.fields.iter().zip(value.slots()) {
            field
                .layout
                .write(buf, base + field.offset, slot)
                .map_err(|err| self.field_error(field, err))?;
        }
        Ok(())
    }

    pub(crate) fn read_into_at(
        &self,
        target: &mut StructValue,
        buf: &[u8],
        base: usize,
    ) -> Result<(), MarshalError> {
        self.check_shape(target)?;
        for (field, (_, slot)) in self.fields.iter().zip(target.slots_mut()) {
            field
                .layout
                .read_into(buf, base + field.offset, slot)
                .map_err(|err| self.field_error(field, err))?;
        }
        Ok(())
    }

    fn check_extent(&self, available: usize, offset: usize) -> Result<(), MarshalError> {
        if offset + self.size > available {
            return Err(MarshalError::OutOfBounds {
                offset,
                len: self.size,
                available,
            });
        }
        Ok(())
    }

    // Every declared field must be present, in order; a missing field is an
    // invariant violation rather than something to skip.
    fn check_shape(&self, value: &StructValue) -> Result<(), MarshalError> {
        if value.type_name() != &*self.name {
            return Err(MarshalError::TypeMismatch {
                expected: self.name.to_string(),
                found: value.type_name().to_string(),
            });
        }
        if value.len() != self.fields.len() {
            return Err(MarshalError::FieldCount {
                structure: self.name.to_string(),
                expected: self.fields.len(),
                found: value.len(),
            });
        }
        for (index, (field, (name, _))) in self.fields.iter().zip(value.slots()).enumerate() {
            if field.name != *name {
                return Err(MarshalError::FieldName {
                    structure: self.name.to_string(),
                    index,
                    expected: field.name.to_string(),
                    found: name.to_string(),
                });
            }
        }
        Ok(())
    }

    fn field_error(&self, field: &FieldLayout, err: MarshalError) -> MarshalError {
        MarshalError::Field {
            structure: self.name.to_string(),
            field: field.name.to_string(),
            source: Box::new(err),
        }
    }
}
