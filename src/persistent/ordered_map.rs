//! Persistent map that iterates in first-insertion order.
//!
//! [`InsertionOrderedMap`] decorates a [`PersistentHashMap`] with an ordering
//! index: every key is stamped with a sequence number when it is first
//! inserted, and a [`PersistentTreeMap`] from sequence numbers to keys
//! replays that order during iteration.
//!
//! # Examples
//!
//! ```rust
//! use strata::persistent::InsertionOrderedMap;
//!
//! let map = InsertionOrderedMap::new()
//!     .insert("zebra", 1)
//!     .insert("apple", 2)
//!     .insert("mango", 3)
//!     .insert("zebra", 10);
//!
//! let keys: Vec<&str> = map.keys().copied().collect();
//! assert_eq!(keys, vec!["zebra", "apple", "mango"]);
//! assert_eq!(map.get("zebra"), Some(&10));
//! ```

use std::borrow::Borrow;
use std::fmt;
use std::hash::Hash;

use super::hashmap::PersistentHashMap;
use super::treemap::PersistentTreeMap;

/// A persistent hash map that remembers first-insertion order.
///
/// Re-inserting an existing key updates its value in place; removing a key
/// and inserting it again moves it to the end.
pub struct InsertionOrderedMap<K, V> {
    entries: PersistentHashMap<K, (u64, V)>,
    order: PersistentTreeMap<u64, K>,
    next_sequence: u64,
}

impl<K, V> Clone for InsertionOrderedMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
            order: self.order.clone(),
            next_sequence: self.next_sequence,
        }
    }
}

impl<K, V> InsertionOrderedMap<K, V> {
    /// Creates a new empty map.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: PersistentHashMap::new(),
            order: PersistentTreeMap::new(),
            next_sequence: 0,
        }
    }

    /// Returns the number of entries.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns `true` if the map contains no entries.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Returns `true` if both maps share their storage.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.entries.ptr_eq(&other.entries) && self.order.ptr_eq(&other.order)
    }
}

impl<K: Clone + Hash + Eq, V: Clone> InsertionOrderedMap<K, V> {
    /// Returns a reference to the value corresponding to the key.
    #[must_use]
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.get(key).map(|(_, value)| value)
    }

    /// Returns `true` if the map contains the key.
    #[must_use]
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.contains_key(key)
    }

    /// Removes a key; an absent key returns a map sharing this one's storage.
    #[must_use]
    pub fn remove<Q>(&self, key: &Q) -> Self
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let Some((sequence, _)) = self.entries.get(key) else {
            return self.clone();
        };
        Self {
            entries: self.entries.remove(key),
            order: self.order.remove(sequence),
            next_sequence: self.next_sequence,
        }
    }

    /// Returns an iterator over entries in first-insertion order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (&K, &V)> {
        self.order.values().filter_map(|key| {
            self.entries
                .get_key_value(key)
                .map(|(stored, (_, value))| (stored, value))
        })
    }

    /// Returns an iterator over keys in first-insertion order.
    pub fn keys(&self) -> impl DoubleEndedIterator<Item = &K> {
        self.iter().map(|(key, _)| key)
    }

    /// Returns an iterator over values in first-insertion order of their keys.
    pub fn values(&self) -> impl DoubleEndedIterator<Item = &V> {
        self.iter().map(|(_, value)| value)
    }

    /// Returns the earliest inserted entry.
    #[must_use]
    pub fn first(&self) -> Option<(&K, &V)> {
        self.iter().next()
    }

    /// Returns the latest inserted entry.
    #[must_use]
    pub fn last(&self) -> Option<(&K, &V)> {
        self.iter().next_back()
    }
}

impl<K: Clone + Hash + Eq, V: Clone + PartialEq> InsertionOrderedMap<K, V> {
    /// Inserts a key-value pair.
    ///
    /// A new key goes to the end of the order; an existing key keeps its
    /// position. Inserting an equal value returns a map sharing this one's
    /// storage.
    #[must_use]
    pub fn insert(&self, key: K, value: V) -> Self {
        if let Some((sequence, existing)) = self.entries.get(&key) {
            if *existing == value {
                return self.clone();
            }
            return Self {
                entries: self.entries.insert(key, (*sequence, value)),
                order: self.order.clone(),
                next_sequence: self.next_sequence,
            };
        }
        Self {
            entries: self.entries.insert(key.clone(), (self.next_sequence, value)),
            order: self.order.insert(self.next_sequence, key),
            next_sequence: self.next_sequence + 1,
        }
    }
}

impl<K, V> Default for InsertionOrderedMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Clone + Hash + Eq, V: Clone + PartialEq> FromIterator<(K, V)> for InsertionOrderedMap<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::new(), |map, (key, value)| map.insert(key, value))
    }
}

impl<K: Clone + Hash + Eq, V: Clone + PartialEq> PartialEq for InsertionOrderedMap<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().eq(other.iter())
    }
}

impl<K: Clone + Hash + Eq, V: Clone + Eq> Eq for InsertionOrderedMap<K, V> {}

impl<K, V> fmt::Debug for InsertionOrderedMap<K, V>
where
    K: Clone + Hash + Eq + fmt::Debug,
    V: Clone + fmt::Debug,
{
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_map().entries(self.iter()).finish()
    }
}
