//! Persistent (immutable) sorted set.
//!
//! [`PersistentTreeSet`] stores its elements as the keys of a
//! [`PersistentTreeMap`] with unit values and inherits its ordering,
//! slicing and structural sharing.
//!
//! # Examples
//!
//! ```rust
//! use strata::persistent::PersistentTreeSet;
//!
//! let set: PersistentTreeSet<i32> = [5, 1, 3].into_iter().collect();
//! assert_eq!(set.iter().copied().collect::<Vec<_>>(), vec![1, 3, 5]);
//! assert_eq!(set.first(), Ok(&1));
//!
//! let head = set.head_set(&3);
//! assert_eq!(head.iter().copied().collect::<Vec<_>>(), vec![1]);
//! ```

use std::fmt;
use std::hash::{Hash, Hasher};
use std::iter::FromIterator;

use super::treemap::{Comparator, NaturalOrder, PersistentTreeMap, PersistentTreeMapIterator};
use crate::CollectionError;

/// A persistent sorted set backed by [`PersistentTreeMap`].
pub struct PersistentTreeSet<T, C = NaturalOrder> {
    map: PersistentTreeMap<T, (), C>,
}

impl<T, C: Clone> Clone for PersistentTreeSet<T, C> {
    fn clone(&self) -> Self {
        Self {
            map: self.map.clone(),
        }
    }
}

impl<T> PersistentTreeSet<T> {
    /// Creates a new empty set ordered by `Ord`.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            map: PersistentTreeMap::new(),
        }
    }
}

impl<T, C> PersistentTreeSet<T, C> {
    /// Creates a new empty set ordered by `comparator`.
    #[inline]
    #[must_use]
    pub const fn with_comparator(comparator: C) -> Self {
        Self {
            map: PersistentTreeMap::with_comparator(comparator),
        }
    }

    /// Returns the number of elements.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns `true` if the set contains no elements.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Returns the smallest element.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::EmptyCollection`] if the set is empty.
    pub fn first(&self) -> Result<&T, CollectionError> {
        self.map.first_key()
    }

    /// Returns the largest element.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::EmptyCollection`] if the set is empty.
    pub fn last(&self) -> Result<&T, CollectionError> {
        self.map.last_key()
    }

    /// Returns an iterator over the elements in ascending order.
    #[must_use]
    pub fn iter(&self) -> PersistentTreeSetIterator<'_, T> {
        PersistentTreeSetIterator {
            inner: self.map.iter(),
        }
    }

    /// Returns `true` if both sets share the same tree.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.map.ptr_eq(&other.map)
    }
}

impl<T, C: Comparator<T>> PersistentTreeSet<T, C> {
    /// Returns `true` if the set contains `element`.
    #[must_use]
    pub fn contains(&self, element: &T) -> bool {
        self.map.contains_key(element)
    }
}

impl<T: Clone, C: Comparator<T> + Clone> PersistentTreeSet<T, C> {
    /// Adds an element; adding a present element returns a set sharing
    /// this set's tree.
    #[must_use]
    pub fn insert(&self, element: T) -> Self {
        Self {
            map: self.map.insert(element, ()),
        }
    }

    /// Removes an element.
    #[must_use]
    pub fn remove(&self, element: &T) -> Self {
        Self {
            map: self.map.remove(element),
        }
    }

    /// Returns the elements in `[from, to)`.
    #[must_use]
    pub fn sub_set(&self, from: &T, to: &T) -> Self {
        Self {
            map: self.map.sub_map(from, to),
        }
    }

    /// Returns the elements greater than or equal to `from`.
    #[must_use]
    pub fn tail_set(&self, from: &T) -> Self {
        Self {
            map: self.map.tail_map(from),
        }
    }

    /// Returns the elements strictly less than `to`.
    #[must_use]
    pub fn head_set(&self, to: &T) -> Self {
        Self {
            map: self.map.head_map(to),
        }
    }
}

/// An iterator over the elements of a [`PersistentTreeSet`].
pub struct PersistentTreeSetIterator<'a, T> {
    inner: PersistentTreeMapIterator<'a, T, ()>,
}

impl<'a, T> Iterator for PersistentTreeSetIterator<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(element, ())| element)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<T> DoubleEndedIterator for PersistentTreeSetIterator<'_, T> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back().map(|(element, ())| element)
    }
}

impl<T> ExactSizeIterator for PersistentTreeSetIterator<'_, T> {}

impl<T, C: Default> Default for PersistentTreeSet<T, C> {
    fn default() -> Self {
        Self {
            map: PersistentTreeMap::default(),
        }
    }
}

impl<T: Clone + Ord> FromIterator<T> for PersistentTreeSet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            map: iter.into_iter().map(|element| (element, ())).collect(),
        }
    }
}

impl<'a, T, C> IntoIterator for &'a PersistentTreeSet<T, C> {
    type Item = &'a T;
    type IntoIter = PersistentTreeSetIterator<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T: PartialEq, C> PartialEq for PersistentTreeSet<T, C> {
    fn eq(&self, other: &Self) -> bool {
        self.map == other.map
    }
}

impl<T: Eq, C> Eq for PersistentTreeSet<T, C> {}

impl<T: Hash, C> Hash for PersistentTreeSet<T, C> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.map.hash(state);
    }
}

impl<T: fmt::Debug, C> fmt::Debug for PersistentTreeSet<T, C> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_set().entries(self.iter()).finish()
    }
}
