use std::alloc::Layout;
use std::num::NonZero;
use std::ptr::NonNull;

use tracing::{debug, warn};

use crate::{BlockCoordinates, BlockPool, BlockTag, Error, MemorySource, Result, SizeClass};

/// All the pools of one size class.
///
/// The bucket starts without any pools and creates its first one on the first reservation it
/// serves. Pools are only ever appended, so a pool index stays valid for the lifetime of the
/// bucket.
#[derive(Debug)]
pub(crate) struct SizeClassBucket {
    class_index: usize,
    class: SizeClass,

    /// In creation order. Lower indexes are preferred when reserving.
    pools: Vec<BlockPool>,
}

/// The result of reserving a block from a [`SizeClassBucket`].
#[derive(Debug)]
pub(crate) struct ReservedBlock {
    coordinates: BlockCoordinates,
    ptr: NonNull<u8>,
}

impl ReservedBlock {
    #[must_use]
    pub(crate) fn coordinates(&self) -> BlockCoordinates {
        self.coordinates
    }

    #[must_use]
    pub(crate) fn ptr(&self) -> NonNull<u8> {
        self.ptr
    }
}

/// Growth parameters shared by all buckets of a chain.
#[derive(Clone, Copy, Debug)]
pub(crate) struct GrowthPolicy {
    pub(crate) extent_alignment: usize,
    pub(crate) max_pools: Option<NonZero<usize>>,
}

impl SizeClassBucket {
    #[must_use]
    pub(crate) fn new(class_index: usize, class: SizeClass) -> Self {
        Self {
            class_index,
            class,
            pools: Vec::new(),
        }
    }

    /// Reserves a block from the first pool with a vacant block, creating a new pool if all
    /// existing pools are full.
    ///
    /// The caller is responsible for only routing requests here that fit in the block size.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`] if the memory source cannot provide an extent for a new
    /// pool and [`Error::PoolLimitReached`] if the bucket may not create another pool. In both
    /// cases the existing pools are unchanged.
    pub(crate) fn allocate<M: MemorySource>(
        &mut self,
        source: &M,
        growth: GrowthPolicy,
        tag: BlockTag,
    ) -> Result<ReservedBlock> {
        let existing = self
            .pools
            .iter_mut()
            .enumerate()
            .find_map(|(pool_index, pool)| {
                pool.try_allocate(tag)
                    .map(|block_index| (pool_index, block_index))
            });

        let (pool_index, block_index) = match existing {
            Some(found) => found,
            None => {
                let pool_index = self.grow(source, growth)?;

                let block_index = self
                    .pools
                    .get_mut(pool_index)
                    .and_then(|pool| pool.try_allocate(tag))
                    .expect("a freshly created pool always has a vacant block");

                (pool_index, block_index)
            }
        };

        let ptr = self.pool(pool_index).block_ptr(source, block_index);

        Ok(ReservedBlock {
            coordinates: BlockCoordinates::from_parts(self.class_index, pool_index, block_index),
            ptr,
        })
    }

    /// Returns a reserved block to its pool.
    ///
    /// # Panics
    ///
    /// Panics if the pool does not exist or the block is not reserved.
    pub(crate) fn release(&mut self, pool_index: usize, block_index: usize) {
        let pool_count = self.pools.len();

        self.pools
            .get_mut(pool_index)
            .unwrap_or_else(|| {
                panic!(
                    "cannot release block of pool {pool_index} in size class with {pool_count} pools"
                )
            })
            .release(block_index);
    }

    /// Appends a new empty pool and returns its index.
    fn grow<M: MemorySource>(&mut self, source: &M, growth: GrowthPolicy) -> Result<usize> {
        let block_size = self.class.block_size().get();

        if let Some(limit) = growth
            .max_pools
            .filter(|limit| self.pools.len() >= limit.get())
        {
            warn!(
                class_index = self.class_index,
                block_size,
                limit = limit.get(),
                "size class is full and may not grow"
            );

            return Err(Error::PoolLimitReached {
                block_size,
                limit: limit.get(),
            });
        }

        let size = self
            .class
            .pool_size()
            .expect("chain layout guarantees that every pool size fits in usize");
        let alignment = growth.extent_alignment;

        let Some((extent, layout)) = Layout::from_size_align(size, alignment)
            .ok()
            .and_then(|layout| source.allocate(layout).map(|extent| (extent, layout)))
        else {
            warn!(
                class_index = self.class_index,
                size, alignment, "memory source failed to provide a pool extent"
            );

            return Err(Error::OutOfMemory { size, alignment });
        };

        self.pools.push(BlockPool::new(extent, layout, self.class));

        debug!(
            class_index = self.class_index,
            block_size,
            block_capacity = self.class.block_capacity().get(),
            pool_count = self.pools.len(),
            "size class grew a new pool"
        );

        // Cannot underflow because we just pushed a pool.
        Ok(self.pools.len().wrapping_sub(1))
    }

    fn pool(&self, pool_index: usize) -> &BlockPool {
        self.pools
            .get(pool_index)
            .expect("pool indexes handed out by the bucket are always valid")
    }

    #[must_use]
    pub(crate) fn class(&self) -> SizeClass {
        self.class
    }

    #[must_use]
    pub(crate) fn pool_count(&self) -> usize {
        self.pools.len()
    }

    /// Number of reserved blocks across all pools of the bucket.
    #[must_use]
    pub(crate) fn active_blocks(&self) -> usize {
        self.pools.iter().map(BlockPool::active_count).sum()
    }

    pub(crate) fn pools(&self) -> impl Iterator<Item = &BlockPool> {
        self.pools.iter()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::SystemMemory;

    const UNLIMITED: GrowthPolicy = GrowthPolicy {
        extent_alignment: 64,
        max_pools: None,
    };

    /// Refuses every extent request after a number of successful ones.
    #[derive(Debug)]
    struct LimitedMemory {
        remaining: AtomicUsize,
    }

    impl MemorySource for LimitedMemory {
        fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
            self.remaining
                .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |remaining| {
                    remaining.checked_sub(1)
                })
                .ok()?;

            SystemMemory.allocate(layout)
        }

        unsafe fn offset(&self, extent: NonNull<u8>, byte_offset: usize) -> NonNull<u8> {
            // SAFETY: Forwarding the caller's guarantees.
            unsafe { SystemMemory.offset(extent, byte_offset) }
        }

        unsafe fn free(&self, extent: NonNull<u8>, layout: Layout) {
            // SAFETY: Forwarding the caller's guarantees.
            unsafe { SystemMemory.free(extent, layout) };
        }
    }

    fn free_all(bucket: &SizeClassBucket) {
        for pool in bucket.pools() {
            // SAFETY: Every extent came from SystemMemory with the recorded layout.
            unsafe { SystemMemory.free(pool.extent(), pool.extent_layout()) };
        }
    }

    #[test]
    fn first_allocation_creates_first_pool() {
        let mut bucket = SizeClassBucket::new(3, SizeClass::from_parts(32, 4));
        assert_eq!(bucket.pool_count(), 0);

        let reserved = bucket
            .allocate(&SystemMemory, UNLIMITED, BlockTag::Other)
            .unwrap();

        assert_eq!(bucket.pool_count(), 1);
        assert_eq!(reserved.coordinates(), BlockCoordinates::from_parts(3, 0, 0));
        assert_eq!(reserved.ptr().as_ptr().addr() % 64, 0);
        assert_eq!(bucket.active_blocks(), 1);

        free_all(&bucket);
    }

    #[test]
    fn grows_only_when_all_pools_are_full() {
        let mut bucket = SizeClassBucket::new(0, SizeClass::from_parts(32, 2));

        let first = bucket
            .allocate(&SystemMemory, UNLIMITED, BlockTag::Other)
            .unwrap();
        let second = bucket
            .allocate(&SystemMemory, UNLIMITED, BlockTag::Other)
            .unwrap();
        assert_eq!(bucket.pool_count(), 1);

        let third = bucket
            .allocate(&SystemMemory, UNLIMITED, BlockTag::Other)
            .unwrap();
        assert_eq!(bucket.pool_count(), 2);
        assert_eq!(third.coordinates().pool_index(), 1);
        assert_eq!(third.coordinates().block_index(), 0);

        // Earlier pools are preferred once they have room again.
        bucket.release(0, first.coordinates().block_index());

        let fourth = bucket
            .allocate(&SystemMemory, UNLIMITED, BlockTag::Other)
            .unwrap();
        assert_eq!(fourth.coordinates().pool_index(), 0);
        assert_eq!(fourth.ptr(), first.ptr());
        assert_eq!(bucket.pool_count(), 2);
        assert_ne!(second.ptr(), fourth.ptr());

        free_all(&bucket);
    }

    #[test]
    fn out_of_memory_leaves_bucket_usable() {
        let memory = LimitedMemory {
            remaining: AtomicUsize::new(1),
        };

        let mut bucket = SizeClassBucket::new(0, SizeClass::from_parts(16, 1));

        let first = bucket
            .allocate(&memory, UNLIMITED, BlockTag::Other)
            .unwrap();

        let result = bucket.allocate(&memory, UNLIMITED, BlockTag::Other);
        assert!(matches!(
            result,
            Err(Error::OutOfMemory {
                size: 16,
                alignment: 64
            })
        ));
        assert_eq!(bucket.pool_count(), 1);

        bucket.release(0, first.coordinates().block_index());

        let again = bucket
            .allocate(&memory, UNLIMITED, BlockTag::Other)
            .unwrap();
        assert_eq!(again.ptr(), first.ptr());

        free_all(&bucket);
    }

    #[test]
    fn pool_limit_is_enforced() {
        let mut bucket = SizeClassBucket::new(0, SizeClass::from_parts(16, 1));
        let limited = GrowthPolicy {
            extent_alignment: 16,
            max_pools: NonZero::new(2),
        };

        _ = bucket
            .allocate(&SystemMemory, limited, BlockTag::Other)
            .unwrap();
        _ = bucket
            .allocate(&SystemMemory, limited, BlockTag::Other)
            .unwrap();

        let result = bucket.allocate(&SystemMemory, limited, BlockTag::Other);
        assert!(matches!(
            result,
            Err(Error::PoolLimitReached {
                block_size: 16,
                limit: 2
            })
        ));
        assert_eq!(bucket.pool_count(), 2);

        free_all(&bucket);
    }

    #[test]
    #[should_panic]
    fn release_into_missing_pool_panics() {
        let mut bucket = SizeClassBucket::new(0, SizeClass::from_parts(16, 1));
        bucket.release(0, 0);
    }
}
