//! Persistent (immutable) data structures.
//!
//! This module provides immutable collections that use structural sharing:
//! every edit returns a new version that reuses all untouched nodes of the
//! old one, and no node reachable from a published version is ever mutated.
//!
//! - [`PersistentHashMap`]: Persistent hash map (HAMT) with a
//!   [`TransientHashMap`] builder
//! - [`PersistentTreeMap`]: Persistent sorted map (Red-Black Tree)
//! - [`RrbVector`]: Persistent vector (Relaxed Radix Balanced Tree) with a
//!   [`TransientRrbVector`] builder
//! - [`PersistentTreeSet`]: Sorted set over [`PersistentTreeMap`]
//! - [`InsertionOrderedMap`]: Hash map that iterates in first-insertion order
//!
//! # Structural Sharing
//!
//! Edits copy only the path from the root to the changed position. When an
//! edit would not change anything (inserting a value equal to the stored
//! one, removing an absent key) the result shares the original root.
//!
//! # Examples
//!
//! ## `PersistentHashMap`
//!
//! ```rust
//! use strata::persistent::PersistentHashMap;
//!
//! let map = PersistentHashMap::new()
//!     .insert("a".to_string(), 1)
//!     .insert("b".to_string(), 2)
//!     .remove("a");
//! assert_eq!(map.len(), 1);
//! assert_eq!(map.get("a"), None);
//! assert_eq!(map.get_key_value("b"), Some((&"b".to_string(), &2)));
//! ```
//!
//! ## `PersistentTreeMap`
//!
//! ```rust
//! use strata::persistent::PersistentTreeMap;
//!
//! let map = PersistentTreeMap::new()
//!     .insert(5, "e")
//!     .insert(1, "a")
//!     .insert(3, "c");
//! let keys: Vec<i32> = map.keys().copied().collect();
//! assert_eq!(keys, vec![1, 3, 5]);
//! ```
//!
//! ## `RrbVector`
//!
//! ```rust
//! use strata::persistent::RrbVector;
//!
//! let vector: RrbVector<i32> = (0..100).collect();
//! let (left, right) = vector.split_at(40).unwrap();
//! assert!(left.iter().copied().eq(0..40));
//! assert!(right.iter().copied().eq(40..100));
//! assert_eq!(left.join(&right), vector);
//! ```

// =============================================================================
// Reference Counter Type Alias
// =============================================================================

/// Reference-counted smart pointer type.
///
/// When the `arc` feature is enabled, this is `std::sync::Arc`,
/// which is thread-safe but has slightly higher overhead.
///
/// When the `arc` feature is disabled (default), this is `std::rc::Rc`,
/// which is faster but not thread-safe.
#[cfg(feature = "arc")]
pub(crate) type ReferenceCounter<T> = std::sync::Arc<T>;

#[cfg(not(feature = "arc"))]
pub(crate) type ReferenceCounter<T> = std::rc::Rc<T>;

mod array;
mod edit;
mod hashmap;
mod ordered_map;
mod rrb;
mod treemap;
mod treeset;

pub use hashmap::PersistentHashMap;
pub use hashmap::PersistentHashMapIntoIterator;
pub use hashmap::PersistentHashMapIterator;
pub use hashmap::TransientHashMap;
pub use ordered_map::InsertionOrderedMap;
pub use rrb::RrbCursor;
pub use rrb::RrbIntoIterator;
pub use rrb::RrbIterator;
pub use rrb::RrbVector;
pub use rrb::TransientRrbVector;
pub use treemap::Comparator;
pub use treemap::NaturalOrder;
pub use treemap::PersistentTreeMap;
pub use treemap::PersistentTreeMapIntoIterator;
pub use treemap::PersistentTreeMapIterator;
pub use treemap::PersistentTreeMapRangeIterator;
pub use treeset::PersistentTreeSet;
pub use treeset::PersistentTreeSetIterator;

// =============================================================================
// Tests
// =============================================================================
