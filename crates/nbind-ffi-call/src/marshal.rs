//! Moving struct instances between host values and native memory.
//!
//! Arena-backed functions are safe: the arena owns the memory and checks block
//! ownership. The address-based functions read or write memory the caller
//! vouches for.

use std::ptr::NonNull;

use nbind_typing::{StructLayout, StructValue};

use crate::arena::{Arena, Block};
use crate::CallFailure;

/// Allocates a zeroed block sized for `layout` and writes `value` into it.
pub fn allocate(
    layout: &StructLayout,
    value: &StructValue,
    arena: &mut Arena,
) -> Result<Block, CallFailure> {
    let block = arena.allocate(layout.size(), layout.align())?;
    write_block(layout, value, arena, block)?;
    Ok(block)
}

pub fn write_block(
    layout: &StructLayout,
    value: &StructValue,
    arena: &mut Arena,
    block: Block,
) -> Result<(), CallFailure> {
    layout.write_to(value, arena.bytes_mut(block)?)?;
    Ok(())
}

/// Updates `value` in place from the block, field by field.
pub fn read_block(
    layout: &StructLayout,
    value: &mut StructValue,
    arena: &Arena,
    block: Block,
) -> Result<(), CallFailure> {
    layout.read_into(value, arena.bytes(block)?)?;
    Ok(())
}

/// Writes `value` to native memory at `address`.
///
/// # Safety
///
/// `address` must be valid for writes of `layout.size()` bytes.
pub unsafe fn write_to_address(
    layout: &StructLayout,
    value: &StructValue,
    address: NonNull<u8>,
) -> Result<(), CallFailure> {
    // SAFETY: guaranteed by the caller.
    let buf = unsafe { std::slice::from_raw_parts_mut(address.as_ptr(), layout.size()) };
    layout.write_to(value, buf)?;
    Ok(())
}

/// Updates `value` in place from native memory at `address`.
///
/// # Safety
///
/// `address` must be valid for reads of `layout.size()` bytes.
pub unsafe fn read_into_address(
    layout: &StructLayout,
    value: &mut StructValue,
    address: NonNull<u8>,
) -> Result<(), CallFailure> {
    // SAFETY: guaranteed by the caller.
    let buf = unsafe { std::slice::from_raw_parts(address.as_ptr(), layout.size()) };
    layout.read_into(value, buf)?;
    Ok(())
}

/// Materializes a fresh instance from a native pointer, typically one
/// returned by a native function. A null pointer is an error.
///
/// # Safety
///
/// A non-null `address` must be valid for reads of `layout.size()` bytes.
pub unsafe fn read_from_address(
    layout: &StructLayout,
    address: usize,
) -> Result<StructValue, CallFailure> {
    let Some(ptr) = NonNull::new(address as *mut u8) else {
        return Err(CallFailure::NullStructReturn {
            structure: layout.name().to_string(),
        });
    };
    // SAFETY: guaranteed by the caller.
    let buf = unsafe { std::slice::from_raw_parts(ptr.as_ptr(), layout.size()) };
    Ok(layout.read_new(buf)?)
}
