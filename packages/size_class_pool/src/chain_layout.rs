use std::num::NonZero;
use std::slice;

use new_zealand::nz;

use crate::{Error, Result, SizeClass};

/// Block size of the smallest class in the reference chain.
const REFERENCE_SMALLEST_BLOCK_SIZE: NonZero<usize> = nz!(256);

/// Blocks per pool of the smallest class in the reference chain.
const REFERENCE_SMALLEST_CAPACITY: NonZero<usize> = nz!(8192);

/// The ordered sequence of size classes an allocator routes requests through.
///
/// Size classes are strictly ascending by block size, with no duplicates, and there is always at
/// least one class. The layout is built once and never changes afterwards.
///
/// Two construction policies are available and produce the same kind of layout:
///
/// * [`from_table()`][Self::from_table] takes an explicit ascending table of size classes.
/// * [`geometric()`][Self::geometric] derives each class from the previous one according to a
///   [`GeometricChain`] description.
///
/// The [`Default`] layout is the reference geometric chain: 14 classes starting at 256-byte
/// blocks with 8192 blocks per pool, doubling the block size and keeping two thirds of the
/// blocks each step, up to 2 MiB blocks.
///
/// # Example
///
/// ```rust
/// use size_class_pool::{ChainLayout, SizeClass};
///
/// let layout = ChainLayout::from_table([
///     SizeClass::from_parts(32, 64),
///     SizeClass::from_parts(128, 32),
///     SizeClass::from_parts(512, 8),
/// ])
/// .unwrap();
///
/// assert_eq!(layout.classify(1), Some(0));
/// assert_eq!(layout.classify(33), Some(1));
/// assert_eq!(layout.classify(512), Some(2));
/// assert_eq!(layout.classify(513), None);
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChainLayout {
    classes: Vec<SizeClass>,
}

impl ChainLayout {
    /// Creates a layout from an explicit table of size classes, smallest first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidChain`] if the table is empty, if the block sizes are not strictly
    /// ascending or if the byte size of a pool of any class does not fit in `usize`.
    pub fn from_table(classes: impl IntoIterator<Item = SizeClass>) -> Result<Self> {
        let classes = classes.into_iter().collect::<Vec<_>>();

        if classes.is_empty() {
            return Err(Error::InvalidChain {
                problem: "the table must contain at least one size class".to_string(),
            });
        }

        for pair in classes.windows(2) {
            let [smaller, larger] = pair else {
                unreachable!("windows(2) always yields pairs");
            };

            if larger.block_size() <= smaller.block_size() {
                return Err(Error::InvalidChain {
                    problem: format!(
                        "block sizes must be strictly ascending but {} is followed by {}",
                        smaller.block_size(),
                        larger.block_size()
                    ),
                });
            }
        }

        if let Some(class) = classes.iter().find(|class| class.pool_size().is_none()) {
            return Err(Error::InvalidChain {
                problem: format!(
                    "a pool of {} blocks of {} bytes does not fit in the address space",
                    class.block_capacity(),
                    class.block_size()
                ),
            });
        }

        Ok(Self { classes })
    }

    /// Creates a layout by deriving each size class from the previous one.
    ///
    /// Derivation stops at the first derived class that would violate one of the bounds of the
    /// [`GeometricChain`], or whose block size or pool size would overflow `usize`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidChain`] if the byte size of a pool of the smallest class does not
    /// fit in `usize`.
    ///
    /// # Example
    ///
    /// ```rust
    /// use size_class_pool::{ChainLayout, GeometricChain, SizeClass};
    ///
    /// let layout = ChainLayout::geometric(
    ///     GeometricChain::new(SizeClass::from_parts(64, 100))
    ///         .capacity_divisor(2)
    ///         .min_capacity(10),
    /// )
    /// .unwrap();
    ///
    /// // Capacities 100, 50, 25, 13; the next derived capacity (7) is below the bound.
    /// let sizes: Vec<usize> = layout.iter().map(|c| c.block_size().get()).collect();
    /// assert_eq!(sizes, [64, 128, 256, 512]);
    /// ```
    pub fn geometric(chain: GeometricChain) -> Result<Self> {
        let mut classes = vec![chain.smallest];
        let mut previous = chain.smallest;

        while let Some(next) = chain.derive_next(previous) {
            classes.push(next);
            previous = next;
        }

        Self::from_table(classes)
    }

    /// Returns the index of the smallest size class able to hold `size` bytes, or `None` if
    /// `size` exceeds the block size of every class.
    #[must_use]
    pub fn classify(&self, size: usize) -> Option<usize> {
        // Block sizes are ascending, so the classes that cannot fit the request form a prefix.
        let index = self.classes.partition_point(|class| !class.fits(size));

        (index < self.classes.len()).then_some(index)
    }

    /// Returns the size class at `index`, if there is one.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&SizeClass> {
        self.classes.get(index)
    }

    /// The number of size classes in the layout. Always at least one.
    #[must_use]
    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    /// The largest size class, which bounds the size of any request the layout can serve.
    #[must_use]
    pub fn largest(&self) -> &SizeClass {
        self.classes
            .last()
            .expect("a chain layout always contains at least one size class")
    }

    /// Iterates over the size classes from smallest to largest.
    pub fn iter(&self) -> slice::Iter<'_, SizeClass> {
        self.classes.iter()
    }
}

impl Default for ChainLayout {
    fn default() -> Self {
        Self::geometric(GeometricChain::default())
            .expect("the reference chain always fits in the address space")
    }
}

impl<'a> IntoIterator for &'a ChainLayout {
    type Item = &'a SizeClass;
    type IntoIter = slice::Iter<'a, SizeClass>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Describes how [`ChainLayout::geometric()`] derives each size class from the previous one.
///
/// Starting from the smallest size class, the next class multiplies the block size by
/// `size_multiplier` and shrinks the capacity by `capacity / capacity_divisor`. A derived class
/// is only kept while its capacity stays above `min_capacity` and, if set, its block size does
/// not exceed `max_block_size`.
///
/// The [`Default`] description is the reference chain: smallest class of 8192 blocks of 256
/// bytes, a size multiplier of 2, a capacity divisor of 3 and a minimum capacity of 32.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[must_use]
pub struct GeometricChain {
    smallest: SizeClass,
    size_multiplier: usize,
    capacity_divisor: NonZero<usize>,
    min_capacity: usize,
    max_block_size: Option<usize>,
}

impl GeometricChain {
    /// Starts a description from the given smallest size class, with the reference derivation
    /// parameters.
    pub fn new(smallest: SizeClass) -> Self {
        Self {
            smallest,
            size_multiplier: 2,
            capacity_divisor: nz!(3),
            min_capacity: 32,
            max_block_size: None,
        }
    }

    /// Sets the factor by which the block size grows from one class to the next.
    ///
    /// # Panics
    ///
    /// Panics if the multiplier is less than 2, as the block sizes would not be ascending.
    pub fn size_multiplier(mut self, multiplier: usize) -> Self {
        assert!(
            multiplier >= 2,
            "GeometricChain size multiplier must be at least 2, got {multiplier}"
        );
        self.size_multiplier = multiplier;
        self
    }

    /// Sets the divisor governing capacity shrinkage: each derived class keeps
    /// `capacity - capacity / divisor` blocks of the previous class's capacity.
    ///
    /// # Panics
    ///
    /// Panics if the divisor is zero.
    pub fn capacity_divisor(mut self, divisor: usize) -> Self {
        self.capacity_divisor =
            NonZero::new(divisor).expect("GeometricChain capacity divisor must be non-zero");
        self
    }

    /// Sets the exclusive lower bound on derived capacities. Derivation stops at the first
    /// class whose capacity would not exceed this value.
    pub fn min_capacity(mut self, min_capacity: usize) -> Self {
        self.min_capacity = min_capacity;
        self
    }

    /// Sets the inclusive upper bound on derived block sizes. Derivation stops at the first
    /// class whose block size would exceed this value.
    pub fn max_block_size(mut self, max_block_size: usize) -> Self {
        self.max_block_size = Some(max_block_size);
        self
    }

    fn derive_next(&self, previous: SizeClass) -> Option<SizeClass> {
        let block_size = previous
            .block_size()
            .get()
            .checked_mul(self.size_multiplier)?;

        if self.max_block_size.is_some_and(|max| block_size > max) {
            return None;
        }

        let previous_capacity = previous.block_capacity().get();

        // Cannot underflow because the quotient of a non-zero divisor never exceeds the dividend.
        let block_capacity = previous_capacity.wrapping_sub(previous_capacity / self.capacity_divisor);

        if block_capacity <= self.min_capacity {
            return None;
        }

        let next = SizeClass::new(NonZero::new(block_size)?, NonZero::new(block_capacity)?);

        next.pool_size().map(|_| next)
    }
}

impl Default for GeometricChain {
    fn default() -> Self {
        Self::new(SizeClass::new(
            REFERENCE_SMALLEST_BLOCK_SIZE,
            REFERENCE_SMALLEST_CAPACITY,
        ))
    }
}
