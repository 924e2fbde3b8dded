use std::num::NonZero;

use parking_lot::Mutex;
use tracing::trace;

use crate::{
    BlockCoordinates, BlockTag, ChainLayout, ClassOccupancy, Error, GrowthPolicy, MemorySource,
    ReservedBlock, Result, SizeClassBucket,
};

/// The runtime state behind a [`PoolAllocator`][crate::PoolAllocator]: one bucket per size class
/// plus the memory source all pool extents come from.
///
/// Each bucket has its own lock. Reserving a block (including any pool growth) and releasing a
/// block both hold the lock of the bucket involved for the whole operation, so two threads never
/// observe or mutate the same free list at the same time and a bucket never grows twice for one
/// exhaustion. Requests for different size classes never contend.
///
/// The chain is shared between the allocator and every live allocation, and is only dropped once
/// all of them are gone. Dropping it returns every pool extent to the memory source.
#[derive(Debug)]
pub(crate) struct Chain<M: MemorySource> {
    layout: ChainLayout,

    /// One per size class, in the same order as the layout.
    buckets: Vec<Mutex<SizeClassBucket>>,

    growth: GrowthPolicy,

    memory_source: M,
}

impl<M: MemorySource> Chain<M> {
    #[must_use]
    pub(crate) fn new(
        layout: ChainLayout,
        memory_source: M,
        extent_alignment: usize,
        max_pools_per_class: Option<NonZero<usize>>,
    ) -> Self {
        let buckets = layout
            .iter()
            .enumerate()
            .map(|(class_index, class)| Mutex::new(SizeClassBucket::new(class_index, *class)))
            .collect();

        Self {
            layout,
            buckets,
            growth: GrowthPolicy {
                extent_alignment,
                max_pools: max_pools_per_class,
            },
            memory_source,
        }
    }

    /// Reserves a block from the smallest size class able to hold `size` bytes.
    pub(crate) fn allocate(&self, size: usize, tag: BlockTag) -> Result<ReservedBlock> {
        let class_index = self
            .layout
            .classify(size)
            .ok_or_else(|| Error::RequestTooLarge {
                requested: size,
                largest: self.layout.largest().block_size().get(),
            })?;

        let reserved = self
            .bucket(class_index)
            .lock()
            .allocate(&self.memory_source, self.growth, tag)?;

        trace!(
            size,
            class_index,
            pool_index = reserved.coordinates().pool_index(),
            block_index = reserved.coordinates().block_index(),
            "reserved block"
        );

        Ok(reserved)
    }

    /// Returns a reserved block to its pool.
    ///
    /// # Panics
    ///
    /// Panics if the coordinates do not identify a reserved block of this chain.
    pub(crate) fn release(&self, coordinates: BlockCoordinates) {
        self.bucket(coordinates.class_index())
            .lock()
            .release(coordinates.pool_index(), coordinates.block_index());

        trace!(
            class_index = coordinates.class_index(),
            pool_index = coordinates.pool_index(),
            block_index = coordinates.block_index(),
            "released block"
        );
    }

    /// Describes the current state of one size class, or `None` if there is no such class.
    #[must_use]
    pub(crate) fn occupancy(&self, class_index: usize) -> Option<ClassOccupancy> {
        let bucket = self.buckets.get(class_index)?.lock();

        Some(ClassOccupancy::new(
            class_index,
            bucket.class(),
            bucket.pool_count(),
            bucket.active_blocks(),
        ))
    }

    #[must_use]
    pub(crate) fn layout(&self) -> &ChainLayout {
        &self.layout
    }

    #[must_use]
    pub(crate) fn memory_source(&self) -> &M {
        &self.memory_source
    }

    #[must_use]
    pub(crate) fn extent_alignment(&self) -> usize {
        self.growth.extent_alignment
    }

    /// Number of reserved blocks across all size classes.
    #[must_use]
    pub(crate) fn active_blocks(&self) -> usize {
        self.buckets
            .iter()
            .map(|bucket| bucket.lock().active_blocks())
            .sum()
    }

    /// Number of bytes held in pool extents across all size classes.
    #[must_use]
    pub(crate) fn reserved_bytes(&self) -> usize {
        self.buckets
            .iter()
            .map(|bucket| {
                bucket
                    .lock()
                    .pools()
                    .map(|pool| pool.extent_layout().size())
                    .sum::<usize>()
            })
            .sum()
    }

    fn bucket(&self, class_index: usize) -> &Mutex<SizeClassBucket> {
        self.buckets
            .get(class_index)
            .expect("class indexes always come from the layout the buckets were built from")
    }
}

impl<M: MemorySource> Drop for Chain<M> {
    fn drop(&mut self) {
        for bucket in &mut self.buckets {
            for pool in bucket.get_mut().pools() {
                // SAFETY: Every extent came from our memory source with the recorded layout and
                // is freed exactly once. The chain is only dropped when no allocation is alive,
                // so nothing can access the memory afterwards.
                unsafe {
                    self.memory_source
                        .free(pool.extent(), pool.extent_layout());
                }
            }
        }
    }
}
