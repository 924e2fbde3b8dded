use std::num::NonZero;

/// Describes one tier of the allocator: the size of each block and how many blocks one pool of
/// this tier holds.
///
/// A pool of this class occupies [`pool_size()`][Self::pool_size] bytes of raw memory.
///
/// # Example
///
/// ```rust
/// use size_class_pool::SizeClass;
///
/// let class = SizeClass::from_parts(256, 8192);
///
/// assert_eq!(class.block_size().get(), 256);
/// assert_eq!(class.block_capacity().get(), 8192);
/// assert_eq!(class.pool_size(), Some(2 * 1024 * 1024));
/// ```
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct SizeClass {
    block_size: NonZero<usize>,
    block_capacity: NonZero<usize>,
}

impl SizeClass {
    /// Creates a size class with the given block size in bytes and number of blocks per pool.
    #[must_use]
    pub const fn new(block_size: NonZero<usize>, block_capacity: NonZero<usize>) -> Self {
        Self {
            block_size,
            block_capacity,
        }
    }

    /// Creates a size class from plain integers.
    ///
    /// # Panics
    ///
    /// Panics if either the block size or the block capacity is zero.
    #[must_use]
    pub fn from_parts(block_size: usize, block_capacity: usize) -> Self {
        let block_size =
            NonZero::new(block_size).expect("SizeClass must have a non-zero block size");
        let block_capacity =
            NonZero::new(block_capacity).expect("SizeClass must have a non-zero block capacity");

        Self::new(block_size, block_capacity)
    }

    /// The size of each block in bytes. This is the largest request the class can serve.
    #[must_use]
    #[inline]
    pub const fn block_size(&self) -> NonZero<usize> {
        self.block_size
    }

    /// The number of blocks in each pool of this class.
    #[must_use]
    #[inline]
    pub const fn block_capacity(&self) -> NonZero<usize> {
        self.block_capacity
    }

    /// The number of raw bytes one pool of this class occupies, or `None` if that does not fit
    /// in `usize`.
    #[must_use]
    #[inline]
    pub const fn pool_size(&self) -> Option<usize> {
        self.block_size.get().checked_mul(self.block_capacity.get())
    }

    /// Whether a request of `size` bytes fits into one block of this class.
    #[must_use]
    #[inline]
    pub const fn fits(&self, size: usize) -> bool {
        size <= self.block_size.get()
    }
}
