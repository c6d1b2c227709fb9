//! # strata
//!
//! Persistent (immutable) collections with structural sharing for Rust.
//!
//! ## Overview
//!
//! Every edit on a strata collection returns a new version and leaves the
//! old one untouched. Versions share all nodes that the edit did not touch,
//! so keeping many versions around costs little more than keeping one.
//!
//! - **`PersistentHashMap`**: Hash Array Mapped Trie with a transient builder
//! - **`PersistentTreeMap`**: Red-black sorted map ordered by a comparator
//! - **`RrbVector`**: Relaxed Radix Balanced vector with O(log n) split and
//!   join, a focus buffer for local edits, and a transient builder
//! - **`PersistentTreeSet`** and **`InsertionOrderedMap`**: adapters over the
//!   engines above
//!
//! ## Feature Flags
//!
//! - `arc`: Share nodes through `Arc` instead of `Rc` so that persistent
//!   collections are `Send + Sync`
//! - `serde`: `Serialize`/`Deserialize` for `RrbVector` and `PersistentTreeMap`
//! - `fxhash`, `ahash`: Faster default hashers for `PersistentHashMap`
//! - `full`: Enable all optional integrations
//!
//! ## Example
//!
//! ```rust
//! use strata::prelude::*;
//!
//! let vector: RrbVector<i32> = (0..100).collect();
//! let (left, right) = vector.split_at(40).unwrap();
//! assert_eq!(left.len(), 40);
//! assert_eq!(right.get(0), Some(&40));
//!
//! let map = PersistentTreeMap::new().insert(5, "e").insert(1, "a");
//! assert_eq!(map.first_key(), Ok(&1));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
// Note: Disabling redundant_closure_for_method_calls due to clippy 0.1.92 panic bug
#![allow(clippy::redundant_closure_for_method_calls)]

/// Prelude module for convenient imports.
///
/// Re-exports the collection types and [`CollectionError`].
///
/// # Usage
///
/// ```rust
/// use strata::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::CollectionError;
    pub use crate::persistent::*;
}

pub mod error;
pub mod persistent;

pub use error::CollectionError;
