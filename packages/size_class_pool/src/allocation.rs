use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;

use crate::{BlockCoordinates, BlockTag, Chain, MemorySource, SystemMemory};

/// A live allocation: one block reserved from a [`PoolAllocator`][crate::PoolAllocator].
///
/// The handle is the only way to reach the memory of the block and dropping it is the only way to
/// give the block back. Handles can be cloned; all clones refer to the same block and the block
/// returns to its pool when the last clone is dropped, never earlier.
///
/// A handle keeps the pools of its allocator alive, so it remains valid even if the allocator
/// itself is dropped first.
///
/// # Accessing the memory
///
/// The block is [`block_size()`][Self::block_size] bytes long, which is at least the
/// [`requested_size()`][Self::requested_size]. The allocator never reads or writes it and does
/// not initialize it. Synchronizing access between clones of the handle is up to the caller.
///
/// # Example
///
/// ```rust
/// use size_class_pool::{BlockTag, PoolAllocator};
///
/// let allocator = PoolAllocator::new();
///
/// let allocation = allocator.allocate(100, BlockTag::Array).unwrap();
/// assert_eq!(allocation.requested_size(), 100);
/// assert_eq!(allocation.block_size(), 256);
///
/// let ptr = allocation.ptr();
///
/// // SAFETY: The block is at least 100 bytes long and no other code accesses it.
/// unsafe {
///     ptr.write_bytes(0xAB, 100);
///     assert_eq!(ptr.add(99).read(), 0xAB);
/// }
///
/// let shared = allocation.clone();
/// drop(allocation);
///
/// // The clone still holds the block.
/// assert_eq!(allocator.len(), 1);
///
/// drop(shared);
/// assert_eq!(allocator.len(), 0);
/// ```
///
/// # Thread safety
///
/// The handle is thread-safe ([`Send`] + [`Sync`]) and the block may be released from any
/// thread. The memory behind [`ptr()`][Self::ptr] carries no synchronization of its own.
pub struct Allocation<M: MemorySource = SystemMemory> {
    inner: Arc<AllocationInner<M>>,
}

/// The state shared by all clones of one [`Allocation`]. Dropping it releases the block.
struct AllocationInner<M: MemorySource> {
    coordinates: BlockCoordinates,

    ptr: NonNull<u8>,

    block_size: usize,

    requested_size: usize,

    tag: BlockTag,

    /// Keeps the pool holding our block alive and lets us release the block into it.
    chain: Arc<Chain<M>>,
}

impl<M: MemorySource> Allocation<M> {
    pub(crate) fn new(
        coordinates: BlockCoordinates,
        ptr: NonNull<u8>,
        block_size: usize,
        requested_size: usize,
        tag: BlockTag,
        chain: Arc<Chain<M>>,
    ) -> Self {
        Self {
            inner: Arc::new(AllocationInner {
                coordinates,
                ptr,
                block_size,
                requested_size,
                tag,
                chain,
            }),
        }
    }

    /// Returns a pointer to the start of the block.
    ///
    /// The pointer is valid for reads and writes of [`block_size()`][Self::block_size] bytes for
    /// as long as any clone of this handle exists.
    #[must_use]
    #[inline]
    pub fn ptr(&self) -> NonNull<u8> {
        self.inner.ptr
    }

    /// The size of the block in bytes, which is the block size of the size class serving it.
    #[must_use]
    #[inline]
    pub fn block_size(&self) -> usize {
        self.inner.block_size
    }

    /// The size the caller asked for when allocating.
    #[must_use]
    #[inline]
    pub fn requested_size(&self) -> usize {
        self.inner.requested_size
    }

    /// The classification the caller supplied when allocating.
    #[must_use]
    #[inline]
    pub fn tag(&self) -> BlockTag {
        self.inner.tag
    }

    /// Position of the size class serving the allocation in the chain, smallest first.
    #[must_use]
    pub fn class_index(&self) -> usize {
        self.inner.coordinates.class_index()
    }

    /// Position of the pool holding the block within its size class, in creation order.
    #[must_use]
    pub fn pool_index(&self) -> usize {
        self.inner.coordinates.pool_index()
    }

    /// Position of the block within its pool.
    #[must_use]
    pub fn block_index(&self) -> usize {
        self.inner.coordinates.block_index()
    }
}

impl<M: MemorySource> Clone for Allocation<M> {
    /// Creates another handle to the same block.
    ///
    /// The block is released only when every clone has been dropped.
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M: MemorySource> Drop for AllocationInner<M> {
    fn drop(&mut self) {
        // Arc guarantees this runs once, when the last handle to the block goes away.
        self.chain.release(self.coordinates);
    }
}

impl<M: MemorySource> fmt::Debug for Allocation<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Allocation")
            .field("ptr", &self.inner.ptr)
            .field("block_size", &self.inner.block_size)
            .field("requested_size", &self.inner.requested_size)
            .field("tag", &self.inner.tag)
            .field("coordinates", &self.inner.coordinates)
            .finish_non_exhaustive()
    }
}

// SAFETY: The only field that is not thread-safe by itself is the block pointer. The block is
// exclusively reserved for this allocation and the allocator never touches its memory, so moving
// the pointer to another thread is sound. Releasing the block synchronizes via the bucket lock.
unsafe impl<M: MemorySource> Send for AllocationInner<M> {}

// SAFETY: Shared access only hands out copies of the pointer and plain metadata. Any access to
// the memory behind the pointer requires unsafe code whose synchronization is up to the caller.
unsafe impl<M: MemorySource> Sync for AllocationInner<M> {}
