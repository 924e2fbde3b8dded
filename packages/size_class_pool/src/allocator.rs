use std::sync::Arc;

use crate::{
    Allocation, BlockTag, Chain, ChainLayout, DebugSnapshot, MemorySource, PoolAllocatorBuilder,
    Result, SystemMemory,
};

/// A memory allocator that serves variable-size requests from pools of fixed-size blocks,
/// segregated by size class.
///
/// Every request is routed to the smallest size class of the [`ChainLayout`] whose block size
/// fits it. Within that class, the block comes from the earliest-created pool that has a vacant
/// block; only if every pool of the class is full does the class grow by one pool, whose extent
/// comes from the [`MemorySource`]. Pools are never released while the allocator is in use.
///
/// Blocks are handed out as [`Allocation`] handles and return to their pool automatically when
/// the last clone of the handle is dropped.
///
/// # Resource usage
///
/// Memory is reserved a whole pool at a time and is only returned to the memory source once the
/// allocator and every allocation drawn from it have been dropped.
///
/// # Example
///
/// ```rust
/// use size_class_pool::{BlockTag, PoolAllocator};
///
/// let allocator = PoolAllocator::new();
///
/// let first = allocator.allocate(1024, BlockTag::Other).unwrap();
/// let second = allocator.allocate(1024, BlockTag::Other).unwrap();
///
/// assert_eq!(first.block_size(), 1024);
/// assert_ne!(first.ptr(), second.ptr());
///
/// println!("{}", allocator.debug_snapshot(true));
/// ```
///
/// # Thread safety
///
/// The allocator is thread-safe ([`Send`] + [`Sync`]) as long as its memory source is. Every size
/// class has its own lock, so concurrent requests only contend when they target the same class.
#[derive(Debug)]
pub struct PoolAllocator<M: MemorySource = SystemMemory> {
    chain: Arc<Chain<M>>,
}

impl PoolAllocator<SystemMemory> {
    /// Creates an allocator with the reference size class chain, backed by the global
    /// Rust allocator.
    ///
    /// For custom configuration, use [`PoolAllocator::builder()`].
    ///
    /// # Example
    ///
    /// ```rust
    /// use size_class_pool::PoolAllocator;
    ///
    /// let allocator = PoolAllocator::new();
    ///
    /// assert_eq!(allocator.chain().class_count(), 14);
    /// assert!(allocator.is_empty());
    /// ```
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Creates a builder for configuring and constructing a [`PoolAllocator`].
    ///
    /// # Example
    ///
    /// ```rust
    /// use size_class_pool::{ChainLayout, PoolAllocator, SizeClass};
    ///
    /// let chain = ChainLayout::from_table([SizeClass::from_parts(64, 128)]).unwrap();
    ///
    /// let allocator = PoolAllocator::builder()
    ///     .chain(chain)
    ///     .extent_alignment(64)
    ///     .build();
    ///
    /// assert_eq!(allocator.extent_alignment(), 64);
    /// ```
    pub fn builder() -> PoolAllocatorBuilder<SystemMemory> {
        PoolAllocatorBuilder::new()
    }
}

impl<M: MemorySource> PoolAllocator<M> {
    pub(crate) fn from_chain(chain: Chain<M>) -> Self {
        Self {
            chain: Arc::new(chain),
        }
    }

    /// Allocates a block able to hold `size` bytes, recording `tag` for diagnostics.
    ///
    /// The block comes from the smallest size class whose block size is at least `size`. A
    /// zero-sized request is served by the smallest size class.
    ///
    /// # Errors
    ///
    /// * [`Error::RequestTooLarge`][crate::Error::RequestTooLarge] if `size` exceeds the
    ///   block size of the largest size class. No memory is reserved in this case.
    /// * [`Error::OutOfMemory`][crate::Error::OutOfMemory] if the size class had to grow
    ///   and the memory source could not provide the extent for a new pool.
    /// * [`Error::PoolLimitReached`][crate::Error::PoolLimitReached] if the size class had to
    ///   grow but already has the maximum number of pools.
    ///
    /// A failed request leaves the allocator unchanged and fully usable.
    ///
    /// # Example
    ///
    /// ```rust
    /// use size_class_pool::{BlockTag, Error, PoolAllocator};
    ///
    /// let allocator = PoolAllocator::new();
    ///
    /// let allocation = allocator.allocate(300, BlockTag::Object).unwrap();
    /// assert_eq!(allocation.block_size(), 512);
    ///
    /// let too_large = allocator.allocate(64 * 1024 * 1024, BlockTag::Object);
    /// assert!(matches!(too_large, Err(Error::RequestTooLarge { .. })));
    /// ```
    pub fn allocate(&self, size: usize, tag: BlockTag) -> Result<Allocation<M>> {
        let reserved = self.chain.allocate(size, tag)?;
        let coordinates = reserved.coordinates();

        let block_size = self
            .chain
            .layout()
            .get(coordinates.class_index())
            .expect("reserved blocks always belong to a size class of the layout")
            .block_size()
            .get();

        Ok(Allocation::new(
            coordinates,
            reserved.ptr(),
            block_size,
            size,
            tag,
            Arc::clone(&self.chain),
        ))
    }

    /// Returns a read-only view of the occupancy of every size class.
    ///
    /// If `only_non_empty` is `true`, size classes that have not created any pools yet are
    /// skipped. The view is evaluated lazily, can be iterated repeatedly and never changes the
    /// state of the allocator.
    ///
    /// # Example
    ///
    /// ```rust
    /// use size_class_pool::{BlockTag, PoolAllocator};
    ///
    /// let allocator = PoolAllocator::new();
    /// let _allocation = allocator.allocate(1024, BlockTag::Other).unwrap();
    ///
    /// for occupancy in &allocator.debug_snapshot(true) {
    ///     assert_eq!(occupancy.block_size(), 1024);
    ///     assert_eq!(occupancy.pool_count(), 1);
    /// }
    /// ```
    pub fn debug_snapshot(&self, only_non_empty: bool) -> DebugSnapshot<'_, M> {
        DebugSnapshot::new(&self.chain, only_non_empty)
    }

    /// The size classes the allocator routes requests through.
    #[must_use]
    pub fn chain(&self) -> &ChainLayout {
        self.chain.layout()
    }

    /// Returns the index of the size class that would serve a request of `size` bytes, or `None`
    /// if the request is too large for every size class.
    #[must_use]
    pub fn classify(&self, size: usize) -> Option<usize> {
        self.chain.layout().classify(size)
    }

    /// The alignment of every pool extent requested from the memory source.
    #[must_use]
    pub fn extent_alignment(&self) -> usize {
        self.chain.extent_alignment()
    }

    /// The memory source pool extents are requested from.
    #[must_use]
    pub fn memory_source(&self) -> &M {
        self.chain.memory_source()
    }

    /// The number of live allocations across all size classes.
    ///
    /// Clones of an [`Allocation`] count once.
    #[must_use]
    #[cfg_attr(test, mutants::skip)] // Can be mutated to infinitely growing memory use.
    pub fn len(&self) -> usize {
        self.chain.active_blocks()
    }

    /// Whether there are no live allocations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The number of bytes reserved from the memory source for pool extents.
    ///
    /// This only grows over the lifetime of the allocator.
    #[must_use]
    pub fn reserved_bytes(&self) -> usize {
        self.chain.reserved_bytes()
    }
}

impl Default for PoolAllocator<SystemMemory> {
    fn default() -> Self {
        Self::new()
    }
}
