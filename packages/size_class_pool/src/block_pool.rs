use std::alloc::Layout;
use std::collections::VecDeque;
use std::ptr::NonNull;

use crate::{BlockTag, MemorySource, SizeClass};

/// One fixed-capacity pool of equal-size blocks carved out of one raw memory extent.
///
/// Blocks are identified by their index `0..capacity`. Vacant block indexes are kept in a FIFO
/// queue: the block released first is the block reserved first. Every block index is at any time
/// either in the queue or reserved, never both and never neither.
///
/// The pool does not free its extent. The extent belongs to the memory source it came from and
/// is returned to it when the whole chain is torn down.
///
/// # Out of band access
///
/// The pool never creates references to the memory of its blocks. Owners of a reserved block
/// access it exclusively via the pointer returned from [`block_ptr()`][Self::block_ptr].
#[derive(Debug)]
pub(crate) struct BlockPool {
    /// Start of the raw memory extent holding `capacity` blocks of `class.block_size()` bytes.
    extent: NonNull<u8>,

    /// The layout the extent was allocated with, required to return it to the memory source.
    extent_layout: Layout,

    class: SizeClass,

    /// Vacant block indexes, oldest release at the front.
    free_list: VecDeque<usize>,

    /// Per-block classification. `Some` if and only if the block is reserved.
    tags: Vec<Option<BlockTag>>,

    /// Number of reserved blocks.
    active_count: usize,
}

impl BlockPool {
    /// Creates a pool over an extent already sized for `class`, with every block vacant
    /// and queued in ascending index order.
    ///
    /// # Panics
    ///
    /// Panics if the extent layout is too small to hold a full pool of `class`.
    #[must_use]
    pub(crate) fn new(extent: NonNull<u8>, extent_layout: Layout, class: SizeClass) -> Self {
        assert!(
            class
                .pool_size()
                .is_some_and(|size| size <= extent_layout.size()),
            "extent of {} bytes is too small for {} blocks of {} bytes",
            extent_layout.size(),
            class.block_capacity(),
            class.block_size()
        );

        let capacity = class.block_capacity().get();

        Self {
            extent,
            extent_layout,
            class,
            free_list: (0..capacity).collect(),
            tags: vec![None; capacity],
            active_count: 0,
        }
    }

    /// Reserves the oldest vacant block, recording `tag` for it.
    ///
    /// Returns `None` without any side effects if every block is reserved.
    #[must_use]
    pub(crate) fn try_allocate(&mut self, tag: BlockTag) -> Option<usize> {
        if self.is_full() {
            return None;
        }

        let index = self.free_list.pop_front()?;

        let slot = self
            .tags
            .get_mut(index)
            .expect("free list only ever contains indexes within the pool capacity");

        assert!(
            slot.is_none(),
            "block {index} was in the free list while reserved in pool of capacity {}",
            self.capacity()
        );

        *slot = Some(tag);

        // Cannot overflow because the count is bounded by the capacity.
        self.active_count = self.active_count.wrapping_add(1);

        self.debug_check_counts();

        Some(index)
    }

    /// Returns a reserved block to the back of the free list.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds or the block is not currently reserved. Either one
    /// means the ownership of a block was lost track of, which cannot be recovered from.
    pub(crate) fn release(&mut self, index: usize) {
        let capacity = self.capacity();

        let slot = self.tags.get_mut(index).unwrap_or_else(|| {
            panic!("cannot release block {index} of a pool with capacity {capacity}")
        });

        assert!(
            slot.take().is_some(),
            "block {index} released while not reserved in pool of capacity {capacity}"
        );

        self.free_list.push_back(index);

        // Cannot underflow because the block we just released was counted as reserved.
        self.active_count = self.active_count.wrapping_sub(1);

        self.debug_check_counts();
    }

    /// Returns the address of the block at `index`, as computed by the memory source the extent
    /// came from.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    #[must_use]
    pub(crate) fn block_ptr<M: MemorySource>(&self, source: &M, index: usize) -> NonNull<u8> {
        assert!(
            index < self.capacity(),
            "block {index} index out of bounds in pool of capacity {}",
            self.capacity()
        );

        // Cannot overflow because the product is below the pool size, which fits in usize.
        let byte_offset = index.wrapping_mul(self.class.block_size().get());

        // SAFETY: The extent came from this memory source and the offset is within the pool,
        // which the constructor verified fits into the extent.
        unsafe { source.offset(self.extent, byte_offset) }
    }

    #[must_use]
    pub(crate) fn extent(&self) -> NonNull<u8> {
        self.extent
    }

    #[must_use]
    pub(crate) fn extent_layout(&self) -> Layout {
        self.extent_layout
    }

    /// Number of blocks in the pool.
    #[must_use]
    pub(crate) fn capacity(&self) -> usize {
        self.class.block_capacity().get()
    }

    /// Number of reserved blocks.
    #[must_use]
    #[cfg_attr(test, mutants::skip)] // Can be mutated to infinitely growing memory use.
    pub(crate) fn active_count(&self) -> usize {
        self.active_count
    }

    #[must_use]
    pub(crate) fn is_full(&self) -> bool {
        self.active_count == self.capacity()
    }

    /// The tag recorded for the block at `index`, or `None` if the block is vacant or out of
    /// bounds.
    #[cfg(test)]
    #[must_use]
    pub(crate) fn tag(&self, index: usize) -> Option<BlockTag> {
        self.tags.get(index).copied().flatten()
    }

    /// Vacant block indexes in the order they will be reserved.
    #[cfg(test)]
    pub(crate) fn free_indexes(&self) -> impl Iterator<Item = usize> + '_ {
        self.free_list.iter().copied()
    }

    /// Verifies that every block is accounted for exactly once.
    #[cfg(test)]
    pub(crate) fn integrity_check(&self) {
        assert_eq!(
            self.active_count.wrapping_add(self.free_list.len()),
            self.capacity()
        );

        let reserved = self.tags.iter().filter(|tag| tag.is_some()).count();
        assert_eq!(reserved, self.active_count);

        let mut seen = vec![false; self.capacity()];

        for &index in &self.free_list {
            let was_seen = seen.get_mut(index).expect("free index within capacity");
            assert!(!*was_seen, "block {index} appears twice in the free list");
            *was_seen = true;

            assert!(
                self.tag(index).is_none(),
                "block {index} is both vacant and reserved"
            );
        }
    }

    #[cfg_attr(test, mutants::skip)] // Only active in debug builds, no observable effect.
    fn debug_check_counts(&self) {
        debug_assert_eq!(
            self.active_count.wrapping_add(self.free_list.len()),
            self.capacity(),
            "reserved and vacant blocks must add up to the pool capacity"
        );
    }
}

// SAFETY: The pool exclusively owns its extent and the memory behind it is only accessed via
// pointers handed to the owners of reserved blocks. No thread-bound state is involved.
unsafe impl Send for BlockPool {}
