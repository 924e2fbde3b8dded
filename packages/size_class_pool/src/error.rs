use thiserror::Error;

/// Errors that can occur when configuring a size class chain or allocating from it.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The requested size exceeds the block size of every configured size class.
    #[error("requested {requested} bytes but the largest size class holds {largest} bytes")]
    RequestTooLarge {
        /// The number of bytes the caller asked for.
        requested: usize,

        /// The block size of the largest configured size class.
        largest: usize,
    },

    /// The memory source could not provide a new pool extent.
    ///
    /// Only the request that needed the new pool fails. Existing pools remain valid and usable.
    #[error("memory source failed to provide an extent of {size} bytes aligned to {alignment}")]
    OutOfMemory {
        /// The size of the extent that was requested.
        size: usize,

        /// The alignment of the extent that was requested.
        alignment: usize,
    },

    /// All pools of the size class are full and the class may not grow any further.
    #[error("size class with {block_size} byte blocks is full and limited to {limit} pools")]
    PoolLimitReached {
        /// The block size of the size class that is full.
        block_size: usize,

        /// The configured maximum number of pools per size class.
        limit: usize,
    },

    /// The caller provided a size class table that cannot form a valid chain.
    #[error("invalid size class chain: {problem}")]
    InvalidChain {
        /// A human-readable description of the problem.
        problem: String,
    },
}

/// A specialized `Result` type for allocator operations, returning the crate's
/// [`Error`] type as the error value.
pub(crate) type Result<T> = std::result::Result<T, Error>;
