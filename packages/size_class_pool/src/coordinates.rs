/// Locates one block within the allocator: which size class, which pool of that class and which
/// block of that pool.
///
/// Pools are never removed from a size class, so coordinates stay valid for as long as the
/// allocation they describe is alive.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct BlockCoordinates {
    class_index: usize,
    pool_index: usize,
    block_index: usize,
}

impl BlockCoordinates {
    #[must_use]
    pub(crate) fn from_parts(class_index: usize, pool_index: usize, block_index: usize) -> Self {
        Self {
            class_index,
            pool_index,
            block_index,
        }
    }

    /// Index of the size class in the chain.
    #[must_use]
    pub(crate) fn class_index(&self) -> usize {
        self.class_index
    }

    /// Index of the pool within its size class, in creation order.
    #[must_use]
    pub(crate) fn pool_index(&self) -> usize {
        self.pool_index
    }

    /// Index of the block within its pool.
    #[must_use]
    pub(crate) fn block_index(&self) -> usize {
        self.block_index
    }
}
