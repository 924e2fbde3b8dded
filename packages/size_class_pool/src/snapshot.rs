use std::fmt;

use crate::{Chain, MemorySource, SizeClass};

/// Occupancy of one size class at the moment it was inspected.
///
/// Obtained by iterating a [`DebugSnapshot`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ClassOccupancy {
    class_index: usize,
    class: SizeClass,
    pool_count: usize,
    active_blocks: usize,
}

impl ClassOccupancy {
    pub(crate) fn new(
        class_index: usize,
        class: SizeClass,
        pool_count: usize,
        active_blocks: usize,
    ) -> Self {
        Self {
            class_index,
            class,
            pool_count,
            active_blocks,
        }
    }

    /// Position of the size class in the chain, smallest first.
    #[must_use]
    pub fn class_index(&self) -> usize {
        self.class_index
    }

    /// Size of each block of the class in bytes.
    #[must_use]
    pub fn block_size(&self) -> usize {
        self.class.block_size().get()
    }

    /// Number of blocks in each pool of the class.
    #[must_use]
    pub fn block_capacity(&self) -> usize {
        self.class.block_capacity().get()
    }

    /// Number of pools the class has created so far.
    #[must_use]
    pub fn pool_count(&self) -> usize {
        self.pool_count
    }

    /// Number of blocks of the class currently held by allocations.
    #[must_use]
    pub fn active_blocks(&self) -> usize {
        self.active_blocks
    }
}

/// A read-only view of the occupancy of every size class of a
/// [`PoolAllocator`][crate::PoolAllocator].
///
/// The view is lazy: each size class is inspected when the iterator reaches it, never ahead of
/// time. It can be iterated any number of times and never modifies the allocator.
///
/// The [`Display`][fmt::Display] implementation renders a human-readable summary whose exact
/// text is not part of the API contract.
///
/// # Example
///
/// ```rust
/// use size_class_pool::{BlockTag, ChainLayout, PoolAllocator, SizeClass};
///
/// let chain = ChainLayout::from_table([
///     SizeClass::from_parts(64, 4),
///     SizeClass::from_parts(256, 4),
/// ])
/// .unwrap();
/// let allocator = PoolAllocator::builder().chain(chain).build();
///
/// let _allocation = allocator.allocate(200, BlockTag::Object).unwrap();
///
/// let all = allocator.debug_snapshot(false);
/// assert_eq!(all.iter().count(), 2);
///
/// let non_empty = allocator.debug_snapshot(true);
/// let classes: Vec<_> = non_empty.iter().collect();
/// assert_eq!(classes.len(), 1);
/// assert_eq!(classes[0].block_size(), 256);
/// assert_eq!(classes[0].pool_count(), 1);
/// assert_eq!(classes[0].active_blocks(), 1);
///
/// println!("{all}");
/// ```
pub struct DebugSnapshot<'a, M: MemorySource> {
    chain: &'a Chain<M>,
    only_non_empty: bool,
}

impl<'a, M: MemorySource> DebugSnapshot<'a, M> {
    pub(crate) fn new(chain: &'a Chain<M>, only_non_empty: bool) -> Self {
        Self {
            chain,
            only_non_empty,
        }
    }

    /// Iterates over the size classes from smallest to largest, skipping classes without any
    /// pools if the snapshot was requested with `only_non_empty`.
    pub fn iter(&self) -> impl Iterator<Item = ClassOccupancy> + use<'a, M> {
        let chain = self.chain;
        let only_non_empty = self.only_non_empty;

        (0..chain.layout().class_count())
            .filter_map(move |class_index| chain.occupancy(class_index))
            .filter(move |occupancy| !only_non_empty || occupancy.pool_count() > 0)
    }
}

impl<M: MemorySource> Clone for DebugSnapshot<'_, M> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M: MemorySource> Copy for DebugSnapshot<'_, M> {}

impl<M: MemorySource> fmt::Debug for DebugSnapshot<'_, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebugSnapshot")
            .field("only_non_empty", &self.only_non_empty)
            .field("classes", &self.iter().collect::<Vec<_>>())
            .finish()
    }
}

impl<M: MemorySource> fmt::Display for DebugSnapshot<'_, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Memory Allocator Info:")?;

        for occupancy in self.iter() {
            let pool_size = occupancy
                .block_size()
                .saturating_mul(occupancy.block_capacity());

            #[expect(
                clippy::cast_precision_loss,
                reason = "an approximate size is good enough for a human-readable summary"
            )]
            let pool_mib = pool_size as f64 / 1024.0 / 1024.0;

            writeln!(
                f,
                "#{}  {}x{}={}({pool_mib:.4}mb)",
                occupancy.class_index().saturating_add(1),
                occupancy.block_size(),
                occupancy.block_capacity(),
                pool_size
            )?;
            writeln!(
                f,
                "Pool Count:{} Active Blocks:{}",
                occupancy.pool_count(),
                occupancy.active_blocks()
            )?;
        }

        Ok(())
    }
}

impl<'a, M: MemorySource> IntoIterator for &DebugSnapshot<'a, M> {
    type Item = ClassOccupancy;
    type IntoIter = Box<dyn Iterator<Item = ClassOccupancy> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}
