use std::alloc::{Layout, alloc, dealloc};
use std::fmt::Debug;
use std::ptr::NonNull;

/// Provides the raw memory extents that pools carve into blocks.
///
/// The allocator requests one extent per pool, computes block addresses inside it via
/// [`offset()`][Self::offset] and hands every extent back via [`free()`][Self::free] when the
/// allocator and all of its allocations are gone. Individual pools are never freed earlier.
///
/// Implementations must be thread-safe because allocations may be released from any thread.
pub trait MemorySource: Debug + Send + Sync + 'static {
    /// Allocates an extent of at least `layout.size()` bytes aligned to `layout.align()`.
    ///
    /// Returns `None` if the memory could not be provided. The allocator reports this to the
    /// caller as [`Error::OutOfMemory`][crate::Error::OutOfMemory] and does not retry.
    ///
    /// The allocator never requests a zero-sized layout.
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>>;

    /// Returns the address `byte_offset` bytes past the start of `extent`.
    ///
    /// This is pure pointer arithmetic with no bounds checking.
    ///
    /// # Safety
    ///
    /// The caller must ensure that `extent` was returned by [`allocate()`][Self::allocate]
    /// and that `byte_offset` stays within the size of that extent.
    unsafe fn offset(&self, extent: NonNull<u8>, byte_offset: usize) -> NonNull<u8>;

    /// Releases an extent previously returned by [`allocate()`][Self::allocate].
    ///
    /// # Safety
    ///
    /// The caller must ensure that `extent` was returned by [`allocate()`][Self::allocate]
    /// with the same `layout` and that it has not already been freed. No pointers into the
    /// extent may be used after this call.
    unsafe fn free(&self, extent: NonNull<u8>, layout: Layout);
}

/// A [`MemorySource`] backed by the global Rust allocator.
///
/// This is the memory source used by [`PoolAllocator::new()`][crate::PoolAllocator::new].
///
/// # Example
///
/// ```rust
/// use std::alloc::Layout;
///
/// use size_class_pool::{MemorySource, SystemMemory};
///
/// let memory = SystemMemory;
/// let layout = Layout::from_size_align(1024, 256).unwrap();
///
/// let extent = memory.allocate(layout).unwrap();
/// assert_eq!(extent.as_ptr() as usize % 256, 0);
///
/// // SAFETY: The extent came from this source with the same layout and is not used afterwards.
/// unsafe { memory.free(extent, layout) };
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SystemMemory;

impl MemorySource for SystemMemory {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        assert!(
            layout.size() > 0,
            "SystemMemory cannot allocate a zero-sized extent"
        );

        // SAFETY: The layout has a non-zero size, as asserted above.
        NonNull::new(unsafe { alloc(layout) })
    }

    unsafe fn offset(&self, extent: NonNull<u8>, byte_offset: usize) -> NonNull<u8> {
        // SAFETY: Forwarding the bounds requirement to the caller.
        unsafe { extent.byte_add(byte_offset) }
    }

    unsafe fn free(&self, extent: NonNull<u8>, layout: Layout) {
        // SAFETY: Forwarding the requirement that the extent came from us with this layout.
        unsafe { dealloc(extent.as_ptr(), layout) };
    }
}
