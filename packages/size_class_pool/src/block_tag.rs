/// Caller-supplied classification of what an allocation holds.
///
/// The tag is recorded per block for diagnostics only. It has no effect on where a request is
/// served from or when its block is released.
///
/// # Example
///
/// ```rust
/// use size_class_pool::{BlockTag, PoolAllocator};
///
/// let allocator = PoolAllocator::new();
/// let allocation = allocator.allocate(100, BlockTag::Array).unwrap();
///
/// assert_eq!(allocation.tag(), BlockTag::Array);
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum BlockTag {
    /// The block holds an array of values.
    Array,

    /// The block holds a single object.
    Object,

    /// The block holds anything else. This is the default.
    #[default]
    Other,
}
