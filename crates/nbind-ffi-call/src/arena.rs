//! Per-call native memory scope.
//!
//! Every block allocated from an [`Arena`] is freed when the arena is dropped,
//! on every exit path of the code that owns it. Arenas hold raw pointers and
//! are therefore neither `Send` nor `Sync`: one call, one thread, one arena.

use std::alloc::{self, Layout};
use std::ptr::NonNull;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArenaError {
    #[error("invalid allocation request: {size} bytes aligned to {align}")]
    InvalidLayout { size: usize, align: usize },
    #[error("block {index} does not belong to this arena")]
    ForeignBlock { index: usize },
}

/// Handle to a zero-initialized block inside an [`Arena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    index: usize,
    address: usize,
    len: usize,
}

impl Block {
    /// Native address of the first byte, valid until the arena is dropped.
    pub fn address(&self) -> usize {
        self.address
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
thread_local! {
    pub(crate) static LIVE_BLOCKS: std::cell::Cell<usize> = const { std::cell::Cell::new(0) };
}

struct Allocation {
    ptr: NonNull<u8>,
    layout: Layout,
}

#[derive(Default)]
pub struct Arena {
    allocations: Vec<Allocation>,
}

impl Arena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` with a fresh arena and releases it when `f` returns, whether
    /// it returns normally, early, or with an error value.
    pub fn scope<R>(f: impl FnOnce(&mut Arena) -> R) -> R {
        let mut arena = Arena::new();
        f(&mut arena)
    }

    pub fn allocate(&mut self, size: usize, align: usize) -> Result<Block, ArenaError> {
        // Zero-sized requests still get a distinct, dereferenceable byte.
        let layout = Layout::from_size_align(size.max(1), align)
            .map_err(|_| ArenaError::InvalidLayout { size, align })?;
        // SAFETY: `layout` has a non-zero size.
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let Some(ptr) = NonNull::new(raw) else {
            alloc::handle_alloc_error(layout);
        };
        let block = Block {
            index: self.allocations.len(),
            address: ptr.as_ptr() as usize,
            len: size,
        };
        self.allocations.push(Allocation { ptr, layout });
        #[cfg(test)]
        LIVE_BLOCKS.with(|live| live.set(live.get() + 1));
        Ok(block)
    }

    pub fn bytes(&self, block: Block) -> Result<&[u8], ArenaError> {
        let allocation = self.owned(block)?;
        // SAFETY: the allocation is live for as long as `self`, holds at least
        // `block.len` initialized bytes, and no mutable borrow can coexist with
        // this shared borrow of the arena.
        Ok(unsafe { std::slice::from_raw_parts(allocation.ptr.as_ptr(), block.len) })
    }

    pub fn bytes_mut(&mut self, block: Block) -> Result<&mut [u8], ArenaError> {
        let allocation = self.owned(block)?;
        // SAFETY: as in `bytes`, and the exclusive borrow of the arena rules
        // out any other slice into the same allocation.
        Ok(unsafe { std::slice::from_raw_parts_mut(allocation.ptr.as_ptr(), block.len) })
    }

    /// Number of live blocks.
    pub fn len(&self) -> usize {
        self.allocations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.allocations.is_empty()
    }

    pub fn allocated_bytes(&self) -> usize {
        self.allocations.iter().map(|a| a.layout.size()).sum()
    }

    fn owned(&self, block: Block) -> Result<&Allocation, ArenaError> {
        self.allocations
            .get(block.index)
            .filter(|a| a.ptr.as_ptr() as usize == block.address && block.len <= a.layout.size())
            .ok_or(ArenaError::ForeignBlock { index: block.index })
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        if !self.allocations.is_empty() {
            tracing::trace!(blocks = self.allocations.len(), "releasing arena");
        }
        for allocation in self.allocations.drain(..) {
            // SAFETY: each allocation came from `alloc_zeroed` with exactly
            // this layout and is freed once.
            unsafe { alloc::dealloc(allocation.ptr.as_ptr(), allocation.layout) };
            #[cfg(test)]
            LIVE_BLOCKS.with(|live| live.set(live.get() - 1));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_are_zeroed_and_aligned() {
        let mut arena = Arena::new();
        let block = arena.allocate(24, 8).unwrap();
        assert_eq!(block.address() % 8, 0);
        assert!(arena.bytes(block).unwrap().iter().all(|b| *b == 0));
        assert_eq!(block.len(), 24);
    }

    #[test]
    fn writes_are_visible_through_the_address() {
        let mut arena = Arena::new();
        let block = arena.allocate(4, 4).unwrap();
        arena
            .bytes_mut(block)
            .unwrap()
            .copy_from_slice(&42i32.to_ne_bytes());
        let raw = block.address() as *const i32;
        assert_eq!(unsafe { raw.read() }, 42);
    }

    #[test]
    fn scope_releases_every_block() {
        let before = LIVE_BLOCKS.with(|live| live.get());
        let (count, bytes) = Arena::scope(|arena| {
            arena.allocate(8, 8).unwrap();
            arena.allocate(3, 1).unwrap();
            (arena.len(), arena.allocated_bytes())
        });
        assert_eq!(count, 2);
        assert_eq!(bytes, 11);
        assert_eq!(LIVE_BLOCKS.with(|live| live.get()), before);
    }

    #[test]
    fn foreign_blocks_are_rejected() {
        let mut first = Arena::new();
        let mut second = Arena::new();
        let block = first.allocate(8, 8).unwrap();
        second.allocate(8, 8).unwrap();
        assert_eq!(
            second.bytes(block),
            Err(ArenaError::ForeignBlock { index: 0 })
        );
    }

    #[test]
    fn invalid_alignment_is_an_error() {
        let mut arena = Arena::new();
        assert_eq!(
            arena.allocate(8, 3),
            Err(ArenaError::InvalidLayout { size: 8, align: 3 })
        );
        assert!(arena.is_empty());
    }
}
