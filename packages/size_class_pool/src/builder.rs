use std::cell::Cell;
use std::marker::PhantomData;
use std::num::NonZero;

use crate::{Chain, ChainLayout, MemorySource, PoolAllocator, SystemMemory};

/// Alignment of pool extents unless configured otherwise.
const DEFAULT_EXTENT_ALIGNMENT: usize = 256;

/// Builder for creating an instance of [`PoolAllocator`].
///
/// All settings are optional. By default the allocator uses the reference
/// [`ChainLayout`], 256-byte aligned extents from [`SystemMemory`] and no limit on the number of
/// pools per size class.
///
/// # Examples
///
/// ```
/// use size_class_pool::{ChainLayout, GeometricChain, PoolAllocator, SizeClass};
///
/// let chain = ChainLayout::geometric(
///     GeometricChain::new(SizeClass::from_parts(32, 1024)).max_block_size(4096),
/// )
/// .unwrap();
///
/// let allocator = PoolAllocator::builder()
///     .chain(chain)
///     .extent_alignment(4096)
///     .max_pools_per_class(16)
///     .build();
///
/// assert_eq!(allocator.chain().largest().block_size().get(), 4096);
/// ```
///
/// # Thread safety
///
/// The builder is thread-mobile ([`Send`]) and can be safely transferred between threads,
/// allowing allocator configuration to happen on different threads than where the allocator is
/// used. However, it is not thread-safe ([`Sync`]) as it contains mutable configuration state.
#[derive(Debug)]
#[must_use]
pub struct PoolAllocatorBuilder<M: MemorySource> {
    chain: ChainLayout,
    extent_alignment: usize,
    max_pools_per_class: Option<NonZero<usize>>,
    memory_source: M,

    // Prevents Sync while allowing Send - builders are thread-mobile but not thread-safe
    _not_sync: PhantomData<Cell<()>>,
}

impl PoolAllocatorBuilder<SystemMemory> {
    pub(crate) fn new() -> Self {
        Self {
            chain: ChainLayout::default(),
            extent_alignment: DEFAULT_EXTENT_ALIGNMENT,
            max_pools_per_class: None,
            memory_source: SystemMemory,
            _not_sync: PhantomData,
        }
    }
}

impl<M: MemorySource> PoolAllocatorBuilder<M> {
    /// Sets the size classes the allocator routes requests through.
    pub fn chain(mut self, chain: ChainLayout) -> Self {
        self.chain = chain;
        self
    }

    /// Sets the alignment of every pool extent requested from the memory source.
    ///
    /// The first block of every pool has this alignment. Other blocks are aligned to the largest
    /// power of two dividing both this value and the block size.
    ///
    /// # Panics
    ///
    /// Panics if the alignment is not a power of two.
    pub fn extent_alignment(mut self, alignment: usize) -> Self {
        assert!(
            alignment.is_power_of_two(),
            "PoolAllocator extent alignment must be a power of two, got {alignment}"
        );
        self.extent_alignment = alignment;
        self
    }

    /// Limits how many pools each size class may create. Requests that would need another pool
    /// beyond the limit fail with [`Error::PoolLimitReached`][crate::Error::PoolLimitReached].
    ///
    /// # Panics
    ///
    /// Panics if the limit is zero.
    pub fn max_pools_per_class(mut self, limit: usize) -> Self {
        self.max_pools_per_class = Some(
            NonZero::new(limit).expect("PoolAllocator pool limit per size class must be non-zero"),
        );
        self
    }

    /// Sets the memory source that provides pool extents.
    ///
    /// The allocator takes ownership of the memory source for its entire lifetime.
    pub fn memory_source<N: MemorySource>(self, memory_source: N) -> PoolAllocatorBuilder<N> {
        PoolAllocatorBuilder {
            chain: self.chain,
            extent_alignment: self.extent_alignment,
            max_pools_per_class: self.max_pools_per_class,
            memory_source,
            _not_sync: PhantomData,
        }
    }

    /// Builds the allocator with the specified configuration.
    ///
    /// No memory is requested from the memory source until the first allocation.
    #[must_use]
    pub fn build(self) -> PoolAllocator<M> {
        PoolAllocator::from_chain(Chain::new(
            self.chain,
            self.memory_source,
            self.extent_alignment,
            self.max_pools_per_class,
        ))
    }
}
