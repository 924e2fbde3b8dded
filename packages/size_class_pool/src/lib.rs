//! This package provides [`PoolAllocator`], a memory allocator that serves variable-size requests
//! out of a chain of fixed-block pools segregated by size class.
//!
//! Each size class describes a block size and how many blocks one pool of that class holds. A
//! request is served by the smallest class whose block size fits it. Classes grow by adding whole
//! pools on demand and never shrink while the allocator is alive.
//!
//! # Features
//!
//! - **Size-class routing**: Requests land in the smallest block size that fits.
//! - **Two chain policies**: An explicit ascending table or a derived geometric progression,
//!   both producing the same runtime structure (see [`ChainLayout`]).
//! - **Self-releasing handles**: An [`Allocation`] returns its block to the pool when the last
//!   clone of it is dropped. There is no explicit "free" call.
//! - **FIFO reuse**: The block released first is the block handed out first.
//! - **Thread-safe**: Each size class is guarded by its own lock, so classes never contend.
//! - **Pluggable raw memory**: Pool extents come from a [`MemorySource`], [`SystemMemory`]
//!   by default.
//! - **Introspection**: [`PoolAllocator::debug_snapshot()`] reports per-class occupancy
//!   without mutating anything.
//!
//! # Example
//!
//! ```rust
//! use size_class_pool::{BlockTag, ChainLayout, PoolAllocator, SizeClass};
//!
//! let chain = ChainLayout::from_table([
//!     SizeClass::from_parts(64, 16),
//!     SizeClass::from_parts(1024, 8),
//! ])
//! .unwrap();
//!
//! let allocator = PoolAllocator::builder().chain(chain).build();
//!
//! let first = allocator.allocate(1000, BlockTag::Array).unwrap();
//! let second = allocator.allocate(1000, BlockTag::Other).unwrap();
//!
//! // Both land in the 1024-byte class, in distinct blocks of the same pool.
//! assert_eq!(first.block_size(), 1024);
//! assert_eq!(first.pool_index(), second.pool_index());
//! assert_ne!(first.block_index(), second.block_index());
//! assert_eq!(allocator.len(), 2);
//!
//! // Dropping the handles returns the blocks to their pool.
//! drop(first);
//! drop(second);
//! assert!(allocator.is_empty());
//! ```
//!
//! Requests larger than the largest class are rejected rather than silently failing:
//!
//! ```rust
//! use size_class_pool::{BlockTag, ChainLayout, Error, PoolAllocator, SizeClass};
//!
//! let chain = ChainLayout::from_table([SizeClass::from_parts(128, 4)]).unwrap();
//! let allocator = PoolAllocator::builder().chain(chain).build();
//!
//! let result = allocator.allocate(129, BlockTag::Other);
//! assert!(matches!(result, Err(Error::RequestTooLarge { .. })));
//! ```

mod allocation;
mod allocator;
mod block_pool;
mod block_tag;
mod bucket;
mod builder;
mod chain;
mod chain_layout;
mod coordinates;
mod error;
mod memory_source;
mod size_class;
mod snapshot;

pub use allocation::Allocation;
pub use allocator::PoolAllocator;
pub(crate) use block_pool::*;
pub use block_tag::*;
pub(crate) use bucket::*;
pub use builder::*;
pub(crate) use chain::*;
pub use chain_layout::*;
pub(crate) use coordinates::*;
pub use error::Error;
pub(crate) use error::Result;
pub use memory_source::*;
pub use size_class::*;
pub use snapshot::*;
