//! Error types for persistent collections.
//!
//! Only recoverable, caller-facing failures are represented here. Broken
//! internal invariants are programming errors and panic instead.

/// Represents errors returned by fallible collection operations.
///
/// # Examples
///
/// ```rust
/// use strata::CollectionError;
/// use strata::persistent::RrbVector;
///
/// let vector: RrbVector<i32> = (0..3).collect();
/// assert_eq!(
///     vector.replace(3, 10),
///     Err(CollectionError::IndexOutOfBounds { index: 3, length: 3 })
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionError {
    /// An index was outside the range accepted by the operation.
    IndexOutOfBounds {
        /// The rejected index.
        index: usize,
        /// The length of the collection at the time of the call.
        length: usize,
    },
    /// The operation needs at least one element.
    EmptyCollection {
        /// The name of the operation that was called.
        operation: &'static str,
    },
    /// A transient was used after `persistent()` had been called on it.
    TransientFinalized {
        /// The name of the transient type.
        collection: &'static str,
    },
}

impl std::fmt::Display for CollectionError {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IndexOutOfBounds { index, length } => write!(
                formatter,
                "index {index} is out of bounds for collection of length {length}"
            ),
            Self::EmptyCollection { operation } => {
                write!(formatter, "{operation} called on an empty collection")
            }
            Self::TransientFinalized { collection } => write!(
                formatter,
                "{collection} used after persistent() was called"
            ),
        }
    }
}

impl std::error::Error for CollectionError {}
