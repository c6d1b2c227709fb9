//! Persistent (immutable) hash map based on HAMT.
//!
//! This module provides [`PersistentHashMap`], an immutable hash map
//! that uses structural sharing for efficient operations, and
//! [`TransientHashMap`], a single-owner builder that batches edits in place.
//!
//! # Overview
//!
//! `PersistentHashMap` is a Hash Array Mapped Trie (HAMT). Each level of the
//! trie consumes 5 bits of the key's 64-bit hash, so a lookup touches at most
//! 13 branch levels before reaching an entry or a collision bucket.
//!
//! - O(log32 N) get
//! - O(log32 N) insert
//! - O(log32 N) remove
//! - O(1) len and `is_empty`
//!
//! All operations return new maps without modifying the original,
//! and structural sharing ensures memory efficiency.
//!
//! # Examples
//!
//! ```rust
//! use strata::persistent::PersistentHashMap;
//!
//! let map = PersistentHashMap::new()
//!     .insert("one".to_string(), 1)
//!     .insert("two".to_string(), 2)
//!     .insert("three".to_string(), 3);
//!
//! assert_eq!(map.get("one"), Some(&1));
//! assert_eq!(map.get("two"), Some(&2));
//! assert_eq!(map.get("three"), Some(&3));
//!
//! // Structural sharing: the original map is preserved
//! let updated = map.insert("one".to_string(), 100);
//! assert_eq!(map.get("one"), Some(&1));
//! assert_eq!(updated.get("one"), Some(&100));
//! ```
//!
//! # Internal Structure
//!
//! - `Bitmap` nodes hold up to 15 compressed slots indexed by a 32-bit bitmap
//! - `Array` nodes hold 32 direct slots once a bitmap node would reach 16
//!   slots, and are packed back into bitmap nodes at 8 slots or fewer
//! - `Collision` nodes hold entries whose full hashes are equal
//! - Nodes carry an [`EditToken`] so a transient only mutates nodes it created
//!
//! # Iteration Order
//!
//! Iteration follows the trie's bucket order. It is stable for a given map
//! value but otherwise unspecified: it is neither insertion order nor sorted
//! order and may change when the hasher changes.
//!
//! # Null Key
//!
//! Besides hashed keys the map has one side slot that is not addressed by any
//! key, mirroring maps that accept a null key. It is managed through
//! [`PersistentHashMap::insert_null`], [`PersistentHashMap::get_null`] and
//! [`PersistentHashMap::remove_null`], is counted by `len()`, and is reported
//! by [`PersistentHashMap::entries`] but not by [`PersistentHashMap::iter`].

use std::borrow::Borrow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::iter::FromIterator;
use std::marker::PhantomData;

use arrayvec::ArrayVec;

use super::ReferenceCounter;
use super::edit::EditToken;
use crate::CollectionError;

// =============================================================================
// Constants
// =============================================================================

/// Branching factor (2^5 = 32)
const BRANCHING_FACTOR: usize = 32;

/// Bits per level in the trie
const BITS_PER_LEVEL: usize = 5;

/// Bit mask for extracting index within a node
const MASK: u64 = (BRANCHING_FACTOR - 1) as u64;

/// A bitmap node that would reach this many slots becomes an array node.
const ARRAY_NODE_THRESHOLD: usize = 16;

/// An array node with this many slots or fewer is packed into a bitmap node.
const PACK_THRESHOLD: usize = 8;

/// Iterator stack capacity: 13 branch levels plus a collision bucket.
const MAX_STACK_DEPTH: usize = 16;

// =============================================================================
// Hash computation
// =============================================================================

#[cfg(feature = "fxhash")]
type KeyHasher = rustc_hash::FxHasher;

#[cfg(all(feature = "ahash", not(feature = "fxhash")))]
type KeyHasher = ahash::AHasher;

#[cfg(not(any(feature = "fxhash", feature = "ahash")))]
type KeyHasher = std::collections::hash_map::DefaultHasher;

/// Computes the hash of a key with the configured hasher.
fn compute_hash<K: Hash + ?Sized>(key: &K) -> u64 {
    let mut hasher = KeyHasher::default();
    key.hash(&mut hasher);
    hasher.finish()
}

/// Extracts the index at a given depth from a hash.
#[inline]
const fn hash_index(hash: u64, depth: usize) -> usize {
    ((hash >> (depth * BITS_PER_LEVEL)) & MASK) as usize
}

/// Position of `bit` within the compressed slots of `bitmap`.
#[inline]
const fn bit_position(bitmap: u32, bit: u32) -> usize {
    (bitmap & (bit - 1)).count_ones() as usize
}

// =============================================================================
// Node Definition
// =============================================================================

type Link<K, V> = ReferenceCounter<Node<K, V>>;

/// A slot of a branch node.
#[derive(Clone)]
enum Slot<K, V> {
    /// A key-value entry stored inline with its full hash
    Entry { hash: u64, key: K, value: V },
    /// A sub-node one level deeper
    Node(Link<K, V>),
}

/// Internal node structure for the HAMT.
#[derive(Clone)]
enum Node<K, V> {
    /// Bitmap-indexed branch node
    Bitmap {
        edit: EditToken,
        /// One set bit per occupied slot
        bitmap: u32,
        slots: Vec<Slot<K, V>>,
    },
    /// Uncompressed branch node
    Array {
        edit: EditToken,
        /// Number of occupied children
        count: usize,
        children: [Option<Slot<K, V>>; BRANCHING_FACTOR],
    },
    /// Bucket for keys sharing one full hash
    Collision {
        edit: EditToken,
        hash: u64,
        entries: Vec<(K, V)>,
    },
}

/// Outcome of removing a key below a slot.
enum SlotRemoval<K, V> {
    /// The slot itself held the entry and must be dropped by the parent.
    Vacate,
    /// The entry was removed from a sub-node that stays in place.
    Removed((K, V)),
}

impl<K, V> Node<K, V> {
    const fn empty(edit: EditToken) -> Self {
        Self::Bitmap {
            edit,
            bitmap: 0,
            slots: Vec::new(),
        }
    }

    const fn edit(&self) -> EditToken {
        match self {
            Self::Bitmap { edit, .. } | Self::Array { edit, .. } | Self::Collision { edit, .. } => {
                *edit
            }
        }
    }

    const fn set_edit(&mut self, token: EditToken) {
        match self {
            Self::Bitmap { edit, .. } | Self::Array { edit, .. } | Self::Collision { edit, .. } => {
                *edit = token;
            }
        }
    }

    const fn is_empty(&self) -> bool {
        matches!(self, Self::Bitmap { bitmap: 0, .. })
    }

    /// Looks up `key`, descending iteratively from this node at depth 0.
    fn find<Q>(&self, hash: u64, key: &Q) -> Option<(&K, &V)>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        let mut node = self;
        let mut depth = 0;
        loop {
            let slot = match node {
                Self::Bitmap { bitmap, slots, .. } => {
                    let bit = 1u32 << hash_index(hash, depth);
                    if bitmap & bit == 0 {
                        return None;
                    }
                    &slots[bit_position(*bitmap, bit)]
                }
                Self::Array { children, .. } => children[hash_index(hash, depth)].as_ref()?,
                Self::Collision {
                    hash: collision_hash,
                    entries,
                    ..
                } => {
                    if *collision_hash != hash {
                        return None;
                    }
                    return entries
                        .iter()
                        .find(|entry| entry.0.borrow() == key)
                        .map(|(entry_key, value)| (entry_key, value));
                }
            };
            match slot {
                Slot::Entry {
                    hash: entry_hash,
                    key: entry_key,
                    value,
                } => {
                    return (*entry_hash == hash && entry_key.borrow() == key)
                        .then_some((entry_key, value));
                }
                Slot::Node(child) => {
                    node = child;
                    depth += 1;
                }
            }
        }
    }
}

impl<K: Clone + Eq, V: Clone> Node<K, V> {
    /// Returns a node behind `link` that may be mutated by the batch `edit`.
    ///
    /// The node is mutated in place only when it carries `edit` and `link`
    /// is its sole owner. Otherwise it is replaced by a copy stamped with
    /// `edit`, leaving every other holder of the original untouched.
    fn editable(link: &mut Link<K, V>, edit: EditToken) -> &mut Self {
        if !(edit.owns(link.edit()) && ReferenceCounter::get_mut(link).is_some()) {
            let mut copy = (**link).clone();
            copy.set_edit(edit);
            *link = ReferenceCounter::new(copy);
        }
        ReferenceCounter::make_mut(link)
    }

    /// Builds the node holding two entries whose paths agree up to `depth`.
    fn pair(edit: EditToken, depth: usize, first: (u64, K, V), second: (u64, K, V)) -> Self {
        if first.0 == second.0 {
            return Self::Collision {
                edit,
                hash: first.0,
                entries: vec![(first.1, first.2), (second.1, second.2)],
            };
        }
        let first_index = hash_index(first.0, depth);
        let second_index = hash_index(second.0, depth);
        if first_index == second_index {
            return Self::Bitmap {
                edit,
                bitmap: 1 << first_index,
                slots: vec![Slot::Node(ReferenceCounter::new(Self::pair(
                    edit,
                    depth + 1,
                    first,
                    second,
                )))],
            };
        }
        let first_slot = Slot::Entry {
            hash: first.0,
            key: first.1,
            value: first.2,
        };
        let second_slot = Slot::Entry {
            hash: second.0,
            key: second.1,
            value: second.2,
        };
        let slots = if first_index < second_index {
            vec![first_slot, second_slot]
        } else {
            vec![second_slot, first_slot]
        };
        Self::Bitmap {
            edit,
            bitmap: (1 << first_index) | (1 << second_index),
            slots,
        }
    }

    /// Places a collision bucket and an entry with a different hash under
    /// a new branch at `depth`.
    fn nest_collision(
        edit: EditToken,
        depth: usize,
        collision_hash: u64,
        collision: Self,
        entry: (u64, K, V),
    ) -> Self {
        let collision_index = hash_index(collision_hash, depth);
        let entry_index = hash_index(entry.0, depth);
        if collision_index == entry_index {
            return Self::Bitmap {
                edit,
                bitmap: 1 << collision_index,
                slots: vec![Slot::Node(ReferenceCounter::new(Self::nest_collision(
                    edit,
                    depth + 1,
                    collision_hash,
                    collision,
                    entry,
                )))],
            };
        }
        let collision_slot = Slot::Node(ReferenceCounter::new(collision));
        let entry_slot = Slot::Entry {
            hash: entry.0,
            key: entry.1,
            value: entry.2,
        };
        let slots = if collision_index < entry_index {
            vec![collision_slot, entry_slot]
        } else {
            vec![entry_slot, collision_slot]
        };
        Self::Bitmap {
            edit,
            bitmap: (1 << collision_index) | (1 << entry_index),
            slots,
        }
    }

    /// Inserts into this (already editable) node.
    ///
    /// Returns the previous value bound to `key`, if any.
    fn insert(&mut self, edit: EditToken, hash: u64, depth: usize, key: K, value: V) -> Option<V> {
        match self {
            Self::Bitmap { bitmap, slots, .. } => {
                let bit = 1u32 << hash_index(hash, depth);
                let position = bit_position(*bitmap, bit);
                if *bitmap & bit != 0 {
                    return Self::insert_into_slot(&mut slots[position], edit, hash, depth, key, value);
                }
                let entry = Slot::Entry { hash, key, value };
                if slots.len() + 1 < ARRAY_NODE_THRESHOLD {
                    slots.insert(position, entry);
                    *bitmap |= bit;
                    return None;
                }
                let count = slots.len() + 1;
                let mut children: [Option<Slot<K, V>>; BRANCHING_FACTOR] =
                    std::array::from_fn(|_| None);
                let mut remaining = *bitmap;
                for slot in slots.drain(..) {
                    children[remaining.trailing_zeros() as usize] = Some(slot);
                    remaining &= remaining - 1;
                }
                children[hash_index(hash, depth)] = Some(entry);
                *self = Self::Array {
                    edit,
                    count,
                    children,
                };
                None
            }
            Self::Array {
                count, children, ..
            } => match &mut children[hash_index(hash, depth)] {
                Some(slot) => Self::insert_into_slot(slot, edit, hash, depth, key, value),
                vacant @ None => {
                    *vacant = Some(Slot::Entry { hash, key, value });
                    *count += 1;
                    None
                }
            },
            Self::Collision {
                hash: collision_hash,
                entries,
                ..
            } => {
                if *collision_hash == hash {
                    if let Some(entry) = entries.iter_mut().find(|entry| entry.0 == key) {
                        return Some(std::mem::replace(&mut entry.1, value));
                    }
                    entries.push((key, value));
                    return None;
                }
                let collision_hash = *collision_hash;
                let collision = std::mem::replace(self, Self::empty(edit));
                *self = Self::nest_collision(edit, depth, collision_hash, collision, (hash, key, value));
                None
            }
        }
    }

    fn insert_into_slot(
        slot: &mut Slot<K, V>,
        edit: EditToken,
        hash: u64,
        depth: usize,
        key: K,
        value: V,
    ) -> Option<V> {
        if let Slot::Node(child) = slot {
            return Self::editable(child, edit).insert(edit, hash, depth + 1, key, value);
        }
        if let Slot::Entry {
            hash: existing_hash,
            key: existing_key,
            value: existing_value,
        } = slot
            && *existing_hash == hash
            && *existing_key == key
        {
            return Some(std::mem::replace(existing_value, value));
        }
        let previous = std::mem::replace(slot, Slot::Node(ReferenceCounter::new(Self::empty(edit))));
        if let (
            Slot::Entry {
                hash: existing_hash,
                key: existing_key,
                value: existing_value,
            },
            Slot::Node(link),
        ) = (previous, slot)
        {
            *ReferenceCounter::make_mut(link) = Self::pair(
                edit,
                depth + 1,
                (existing_hash, existing_key, existing_value),
                (hash, key, value),
            );
        }
        None
    }

    /// Removes `key` from this (already editable) node.
    ///
    /// Callers only descend into nodes known to contain the key, so no node
    /// is copied for a missing key.
    fn remove<Q>(&mut self, edit: EditToken, hash: u64, depth: usize, key: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        match self {
            Self::Bitmap { bitmap, slots, .. } => {
                let bit = 1u32 << hash_index(hash, depth);
                if *bitmap & bit == 0 {
                    return None;
                }
                let position = bit_position(*bitmap, bit);
                match Self::remove_from_slot(&mut slots[position], edit, hash, depth, key)? {
                    SlotRemoval::Removed(entry) => Some(entry),
                    SlotRemoval::Vacate => {
                        *bitmap &= !bit;
                        Some(Self::into_entry(slots.remove(position)))
                    }
                }
            }
            Self::Array {
                count, children, ..
            } => {
                let index = hash_index(hash, depth);
                let slot = children[index].as_mut()?;
                match Self::remove_from_slot(slot, edit, hash, depth, key)? {
                    SlotRemoval::Removed(entry) => Some(entry),
                    SlotRemoval::Vacate => {
                        let removed = children[index].take().map(Self::into_entry);
                        *count -= 1;
                        if *count <= PACK_THRESHOLD {
                            let mut bitmap = 0u32;
                            let mut slots = Vec::with_capacity(*count);
                            for (index, child) in children.iter_mut().enumerate() {
                                if let Some(slot) = child.take() {
                                    bitmap |= 1 << index;
                                    slots.push(slot);
                                }
                            }
                            *self = Self::Bitmap {
                                edit,
                                bitmap,
                                slots,
                            };
                        }
                        removed
                    }
                }
            }
            Self::Collision {
                hash: collision_hash,
                entries,
                ..
            } => {
                if *collision_hash != hash {
                    return None;
                }
                let position = entries.iter().position(|entry| entry.0.borrow() == key)?;
                Some(entries.remove(position))
            }
        }
    }

    fn remove_from_slot<Q>(
        slot: &mut Slot<K, V>,
        edit: EditToken,
        hash: u64,
        depth: usize,
        key: &Q,
    ) -> Option<SlotRemoval<K, V>>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        match slot {
            Slot::Entry {
                hash: entry_hash,
                key: entry_key,
                ..
            } => (*entry_hash == hash && (*entry_key).borrow() == key).then_some(SlotRemoval::Vacate),
            Slot::Node(child) => {
                let node = Self::editable(child, edit);
                let removed = node.remove(edit, hash, depth + 1, key)?;
                if let Some(single) = node.take_single_entry() {
                    *slot = single;
                }
                Some(SlotRemoval::Removed(removed))
            }
        }
    }

    /// Pulls the last entry out of a sub-node that shrank to one entry.
    fn take_single_entry(&mut self) -> Option<Slot<K, V>> {
        match self {
            Self::Bitmap { slots, .. }
                if slots.len() == 1 && matches!(slots[0], Slot::Entry { .. }) =>
            {
                slots.pop()
            }
            Self::Collision { hash, entries, .. } if entries.len() == 1 => {
                let hash = *hash;
                entries
                    .pop()
                    .map(|(key, value)| Slot::Entry { hash, key, value })
            }
            _ => None,
        }
    }

    fn into_entry(slot: Slot<K, V>) -> (K, V) {
        match slot {
            Slot::Entry { key, value, .. } => (key, value),
            Slot::Node(_) => unreachable!("invariant violation: vacated slot holds a sub-node"),
        }
    }
}

/// Inserts into the trie rooted at `root`, creating the root if needed.
fn insert_into_root<K: Clone + Eq, V: Clone>(
    root: &mut Option<Link<K, V>>,
    edit: EditToken,
    hash: u64,
    key: K,
    value: V,
) -> Option<V> {
    match root {
        Some(link) => Node::editable(link, edit).insert(edit, hash, 0, key, value),
        None => {
            let mut node = Node::empty(edit);
            let previous = node.insert(edit, hash, 0, key, value);
            *root = Some(ReferenceCounter::new(node));
            previous
        }
    }
}

/// Removes a key known to be present from the trie rooted at `root`.
fn remove_from_root<K, V, Q>(
    root: &mut Option<Link<K, V>>,
    edit: EditToken,
    hash: u64,
    key: &Q,
) -> Option<(K, V)>
where
    K: Clone + Eq + Borrow<Q>,
    V: Clone,
    Q: Eq + ?Sized,
{
    let link = root.as_mut()?;
    let node = Node::editable(link, edit);
    let removed = node.remove(edit, hash, 0, key);
    if node.is_empty() {
        *root = None;
    }
    removed
}

// =============================================================================
// PersistentHashMap Definition
// =============================================================================

/// A persistent (immutable) hash map based on HAMT.
///
/// # Time Complexity
///
/// | Operation      | Complexity        |
/// |----------------|-------------------|
/// | `new`          | O(1)              |
/// | `get`          | O(log32 N)        |
/// | `insert`       | O(log32 N)        |
/// | `remove`       | O(log32 N)        |
/// | `contains_key` | O(log32 N)        |
/// | `len`          | O(1)              |
/// | `transient`    | O(1)              |
///
/// # Examples
///
/// ```rust
/// use strata::persistent::PersistentHashMap;
///
/// let map = PersistentHashMap::new()
///     .insert("a", 1)
///     .insert("b", 2)
///     .remove("a");
///
/// assert_eq!(map.len(), 1);
/// assert_eq!(map.get_key_value("a"), None);
/// assert_eq!(map.get_key_value("b"), Some((&"b", &2)));
/// ```
pub struct PersistentHashMap<K, V> {
    root: Option<Link<K, V>>,
    length: usize,
    null_value: Option<ReferenceCounter<V>>,
}

impl<K, V> Clone for PersistentHashMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            root: self.root.clone(),
            length: self.length,
            null_value: self.null_value.clone(),
        }
    }
}

impl<K, V> PersistentHashMap<K, V> {
    /// Creates a new empty map.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use strata::persistent::PersistentHashMap;
    ///
    /// let map: PersistentHashMap<String, i32> = PersistentHashMap::new();
    /// assert!(map.is_empty());
    /// ```
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            root: None,
            length: 0,
            null_value: None,
        }
    }

    /// Returns the number of entries in the map, including the null slot.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.length
    }

    /// Returns `true` if the map contains no entries.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Returns `true` if the null slot holds a value.
    #[inline]
    #[must_use]
    pub const fn has_null(&self) -> bool {
        self.null_value.is_some()
    }

    /// Returns the value in the null slot.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use strata::persistent::PersistentHashMap;
    ///
    /// let map: PersistentHashMap<&str, i32> = PersistentHashMap::new().insert_null(7);
    /// assert_eq!(map.get_null(), Some(&7));
    /// assert_eq!(map.len(), 1);
    /// ```
    #[must_use]
    pub fn get_null(&self) -> Option<&V> {
        self.null_value.as_deref()
    }

    /// Returns `true` if both maps share the same root and null slot.
    ///
    /// This is an identity check: it is `true` for clones and for the result
    /// of an `insert` that did not change the map.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        let roots = match (&self.root, &other.root) {
            (Some(left), Some(right)) => ReferenceCounter::ptr_eq(left, right),
            (None, None) => true,
            _ => false,
        };
        let nulls = match (&self.null_value, &other.null_value) {
            (Some(left), Some(right)) => ReferenceCounter::ptr_eq(left, right),
            (None, None) => true,
            _ => false,
        };
        roots && nulls
    }

    /// Returns an iterator over hashed key-value pairs in bucket order.
    ///
    /// The null slot is not included; see [`PersistentHashMap::entries`].
    ///
    /// # Examples
    ///
    /// ```rust
    /// use strata::persistent::PersistentHashMap;
    ///
    /// let map = PersistentHashMap::new().insert("a", 1).insert("b", 2);
    /// let sum: i32 = map.iter().map(|(_, value)| value).sum();
    /// assert_eq!(sum, 3);
    /// ```
    #[must_use]
    pub fn iter(&self) -> PersistentHashMapIterator<'_, K, V> {
        let mut stack = ArrayVec::new();
        if let Some(root) = &self.root {
            push_frame(&mut stack, root);
        }
        PersistentHashMapIterator {
            stack,
            remaining: self.length - usize::from(self.has_null()),
        }
    }

    /// Returns an iterator over every entry, the null slot first.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use strata::persistent::PersistentHashMap;
    ///
    /// let map = PersistentHashMap::new().insert("a", 1).insert_null(0);
    /// let entries: Vec<_> = map.entries().collect();
    /// assert_eq!(entries, vec![(None, &0), (Some(&"a"), &1)]);
    /// ```
    pub fn entries(&self) -> impl Iterator<Item = (Option<&K>, &V)> {
        self.null_value
            .as_deref()
            .map(|value| (None, value))
            .into_iter()
            .chain(self.iter().map(|(key, value)| (Some(key), value)))
    }

    /// Returns an iterator over hashed keys.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.iter().map(|(key, _)| key)
    }

    /// Returns an iterator over the values of hashed keys.
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.iter().map(|(_, value)| value)
    }
}

impl<K: Clone + Hash + Eq, V: Clone> PersistentHashMap<K, V> {
    /// Creates a map containing a single key-value pair.
    #[inline]
    #[must_use]
    pub fn singleton(key: K, value: V) -> Self {
        let mut root = None;
        insert_into_root(&mut root, EditToken::PERSISTENT, compute_hash(&key), key, value);
        Self {
            root,
            length: 1,
            null_value: None,
        }
    }

    /// Returns a reference to the value corresponding to the key.
    ///
    /// # Complexity
    ///
    /// O(log32 N)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use strata::persistent::PersistentHashMap;
    ///
    /// let map = PersistentHashMap::new().insert("hello".to_string(), 42);
    ///
    /// // Can use &str to look up String keys
    /// assert_eq!(map.get("hello"), Some(&42));
    /// assert_eq!(map.get("world"), None);
    /// ```
    #[must_use]
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get_key_value(key).map(|(_, value)| value)
    }

    /// Returns the stored entry for `key`.
    #[must_use]
    pub fn get_key_value<Q>(&self, key: &Q) -> Option<(&K, &V)>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.root.as_ref()?.find(compute_hash(key), key)
    }

    /// Returns `true` if the map contains a value for the specified key.
    #[must_use]
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get_key_value(key).is_some()
    }

    /// Removes a key from the map.
    ///
    /// Removing an absent key returns a map that shares this map's root.
    ///
    /// # Complexity
    ///
    /// O(log32 N)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use strata::persistent::PersistentHashMap;
    ///
    /// let map = PersistentHashMap::new().insert("a", 1);
    /// assert!(map.remove("b").ptr_eq(&map));
    /// assert!(map.remove("a").is_empty());
    /// ```
    #[must_use]
    pub fn remove<Q>(&self, key: &Q) -> Self
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = compute_hash(key);
        if self.root.as_ref().and_then(|root| root.find(hash, key)).is_none() {
            return self.clone();
        }
        let mut root = self.root.clone();
        remove_from_root(&mut root, EditToken::PERSISTENT, hash, key);
        Self {
            root,
            length: self.length - 1,
            null_value: self.null_value.clone(),
        }
    }

    /// Empties the null slot.
    #[must_use]
    pub fn remove_null(&self) -> Self {
        if self.null_value.is_none() {
            return self.clone();
        }
        Self {
            root: self.root.clone(),
            length: self.length - 1,
            null_value: None,
        }
    }

    /// Returns a transient builder sharing this map's nodes.
    ///
    /// # Complexity
    ///
    /// O(1)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use strata::persistent::PersistentHashMap;
    ///
    /// let base = PersistentHashMap::new().insert(1, "one");
    /// let mut transient = base.transient();
    /// transient.insert(2, "two")?;
    /// let extended = transient.persistent()?;
    ///
    /// assert_eq!(base.len(), 1);
    /// assert_eq!(extended.len(), 2);
    /// # Ok::<(), strata::CollectionError>(())
    /// ```
    #[must_use]
    pub fn transient(&self) -> TransientHashMap<K, V> {
        TransientHashMap {
            root: self.root.clone(),
            length: self.length,
            null_value: self.null_value.clone(),
            edit: Some(EditToken::fresh()),
            _marker: PhantomData,
        }
    }
}

impl<K: Clone + Hash + Eq, V: Clone + PartialEq> PersistentHashMap<K, V> {
    /// Inserts a key-value pair into the map.
    ///
    /// If `key` is already bound to a value equal to `value`, the returned
    /// map shares this map's root and nothing is allocated.
    ///
    /// # Complexity
    ///
    /// O(log32 N)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use strata::persistent::PersistentHashMap;
    ///
    /// let map1 = PersistentHashMap::new().insert("key", 1);
    /// let map2 = map1.insert("key", 2);
    ///
    /// assert_eq!(map1.get("key"), Some(&1));
    /// assert_eq!(map2.get("key"), Some(&2));
    /// assert!(map2.insert("key", 2).ptr_eq(&map2));
    /// ```
    #[must_use]
    pub fn insert(&self, key: K, value: V) -> Self {
        let hash = compute_hash(&key);
        if let Some(root) = &self.root
            && let Some((_, existing)) = root.find(hash, &key)
            && *existing == value
        {
            return self.clone();
        }
        let mut root = self.root.clone();
        let previous = insert_into_root(&mut root, EditToken::PERSISTENT, hash, key, value);
        Self {
            root,
            length: self.length + usize::from(previous.is_none()),
            null_value: self.null_value.clone(),
        }
    }

    /// Stores `value` in the null slot.
    #[must_use]
    pub fn insert_null(&self, value: V) -> Self {
        if self.null_value.as_deref() == Some(&value) {
            return self.clone();
        }
        Self {
            root: self.root.clone(),
            length: self.length + usize::from(self.null_value.is_none()),
            null_value: Some(ReferenceCounter::new(value)),
        }
    }

    /// Updates or removes a value for a key using an updater function.
    ///
    /// The updater receives `Some(&V)` if the key exists. Returning `Some`
    /// binds the key, returning `None` removes it.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use strata::persistent::PersistentHashMap;
    ///
    /// let map = PersistentHashMap::new().insert("count".to_string(), 10);
    /// let updated = map.update_with("count", |value| value.map(|value| value + 1));
    /// assert_eq!(updated.get("count"), Some(&11));
    ///
    /// let removed = map.update_with("count", |_| None);
    /// assert_eq!(removed.get("count"), None);
    /// ```
    #[must_use]
    pub fn update_with<Q, F>(&self, key: &Q, updater: F) -> Self
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
        F: FnOnce(Option<&V>) -> Option<V>,
    {
        let current = self.get_key_value(key);
        match (current, updater(current.map(|(_, value)| value))) {
            (Some((existing_key, _)), Some(value)) => self.insert(existing_key.clone(), value),
            (Some(_), None) => self.remove(key),
            (None, Some(value)) => self.insert(key.to_owned(), value),
            (None, None) => self.clone(),
        }
    }

    /// Merges two maps, with entries from `other` taking precedence.
    ///
    /// # Complexity
    ///
    /// O(m log32 (n + m)) where m is the size of `other`
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        if self.is_empty() {
            return other.clone();
        }
        let mut transient = self.transient();
        transient.absorb(other.iter().map(|(key, value)| (key.clone(), value.clone())));
        if let Some(value) = &other.null_value {
            transient.put_null(ReferenceCounter::clone(value));
        }
        transient.finish()
    }
}

// =============================================================================
// TransientHashMap Definition
// =============================================================================

/// A mutable, single-owner builder for [`PersistentHashMap`].
///
/// Edits are applied in place to nodes this transient created and copied
/// once from nodes it shares with persistent maps. After
/// [`TransientHashMap::persistent`] is called, every further call fails with
/// [`CollectionError::TransientFinalized`].
///
/// A transient is neither `Send` nor `Sync`.
///
/// # Examples
///
/// ```rust
/// use strata::CollectionError;
/// use strata::persistent::TransientHashMap;
///
/// let mut transient = TransientHashMap::new();
/// for index in 0..100 {
///     transient.insert(index, index * 2)?;
/// }
/// let map = transient.persistent()?;
/// assert_eq!(map.len(), 100);
/// assert!(matches!(
///     transient.insert(100, 200),
///     Err(CollectionError::TransientFinalized { .. })
/// ));
/// # Ok::<(), CollectionError>(())
/// ```
pub struct TransientHashMap<K, V> {
    root: Option<Link<K, V>>,
    length: usize,
    null_value: Option<ReferenceCounter<V>>,
    /// `None` once the transient has been finalized
    edit: Option<EditToken>,
    _marker: PhantomData<std::rc::Rc<()>>,
}

static_assertions::assert_not_impl_any!(TransientHashMap<i32, i32>: Send, Sync);

impl<K, V> TransientHashMap<K, V> {
    const NAME: &'static str = "TransientHashMap";

    /// Creates an empty transient map.
    #[must_use]
    pub fn new() -> Self {
        Self {
            root: None,
            length: 0,
            null_value: None,
            edit: Some(EditToken::fresh()),
            _marker: PhantomData,
        }
    }

    fn token(&self) -> Result<EditToken, CollectionError> {
        self.edit.ok_or(CollectionError::TransientFinalized {
            collection: Self::NAME,
        })
    }

    /// Returns the number of entries, including the null slot.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::TransientFinalized`] after finalization.
    pub fn len(&self) -> Result<usize, CollectionError> {
        self.token().map(|_| self.length)
    }

    /// Returns `true` if the transient holds no entries.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::TransientFinalized`] after finalization.
    pub fn is_empty(&self) -> Result<bool, CollectionError> {
        self.len().map(|length| length == 0)
    }

    /// Returns the value in the null slot.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::TransientFinalized`] after finalization.
    pub fn get_null(&self) -> Result<Option<&V>, CollectionError> {
        self.token().map(|_| self.null_value.as_deref())
    }

    /// Stores `value` in the null slot and returns the previous one.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::TransientFinalized`] after finalization.
    pub fn insert_null(&mut self, value: V) -> Result<Option<V>, CollectionError>
    where
        V: Clone,
    {
        self.token()?;
        Ok(self
            .put_null(ReferenceCounter::new(value))
            .map(|previous| ReferenceCounter::try_unwrap(previous).unwrap_or_else(|shared| (*shared).clone())))
    }

    /// Empties the null slot and returns its value.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::TransientFinalized`] after finalization.
    pub fn remove_null(&mut self) -> Result<Option<V>, CollectionError>
    where
        V: Clone,
    {
        self.token()?;
        let previous = self.null_value.take();
        if previous.is_some() {
            self.length -= 1;
        }
        Ok(previous.map(|previous| {
            ReferenceCounter::try_unwrap(previous).unwrap_or_else(|shared| (*shared).clone())
        }))
    }

    fn put_null(&mut self, value: ReferenceCounter<V>) -> Option<ReferenceCounter<V>> {
        let previous = self.null_value.replace(value);
        if previous.is_none() {
            self.length += 1;
        }
        previous
    }

    /// Converts this transient into a persistent map.
    ///
    /// The transient's edit token is retired, so nodes it created are never
    /// mutated again.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::TransientFinalized`] if called twice.
    pub fn persistent(&mut self) -> Result<PersistentHashMap<K, V>, CollectionError> {
        self.token()?;
        Ok(self.finish())
    }

    fn finish(&mut self) -> PersistentHashMap<K, V> {
        self.edit = None;
        PersistentHashMap {
            root: self.root.take(),
            length: std::mem::take(&mut self.length),
            null_value: self.null_value.take(),
        }
    }
}

impl<K: Clone + Hash + Eq, V: Clone> TransientHashMap<K, V> {
    /// Returns a reference to the value corresponding to the key.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::TransientFinalized`] after finalization.
    pub fn get<Q>(&self, key: &Q) -> Result<Option<&V>, CollectionError>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.token()?;
        Ok(self
            .root
            .as_ref()
            .and_then(|root| root.find(compute_hash(key), key))
            .map(|(_, value)| value))
    }

    /// Returns `true` if the transient holds a value for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::TransientFinalized`] after finalization.
    pub fn contains_key<Q>(&self, key: &Q) -> Result<bool, CollectionError>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get(key).map(|value| value.is_some())
    }

    /// Binds `key` to `value` in place and returns the previous value.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::TransientFinalized`] after finalization.
    pub fn insert(&mut self, key: K, value: V) -> Result<Option<V>, CollectionError> {
        let edit = self.token()?;
        Ok(self.put(edit, key, value))
    }

    /// Removes `key` in place and returns its value.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::TransientFinalized`] after finalization.
    pub fn remove<Q>(&mut self, key: &Q) -> Result<Option<V>, CollectionError>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let edit = self.token()?;
        let hash = compute_hash(key);
        if self.root.as_ref().and_then(|root| root.find(hash, key)).is_none() {
            return Ok(None);
        }
        let removed = remove_from_root(&mut self.root, edit, hash, key);
        if removed.is_some() {
            self.length -= 1;
        }
        Ok(removed.map(|(_, value)| value))
    }

    /// Inserts every pair of `entries`; later pairs win on equal keys.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::TransientFinalized`] after finalization.
    pub fn insert_bulk<I>(&mut self, entries: I) -> Result<(), CollectionError>
    where
        I: IntoIterator<Item = (K, V)>,
    {
        self.token()?;
        self.absorb(entries);
        Ok(())
    }

    fn absorb<I: IntoIterator<Item = (K, V)>>(&mut self, entries: I) {
        if let Some(edit) = self.edit {
            for (key, value) in entries {
                self.put(edit, key, value);
            }
        }
    }

    fn put(&mut self, edit: EditToken, key: K, value: V) -> Option<V> {
        let previous = insert_into_root(&mut self.root, edit, compute_hash(&key), key, value);
        if previous.is_none() {
            self.length += 1;
        }
        previous
    }
}

impl<K, V> Default for TransientHashMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Iterator Implementation
// =============================================================================

enum Frame<'a, K, V> {
    Slots(std::slice::Iter<'a, Slot<K, V>>),
    Array(std::slice::Iter<'a, Option<Slot<K, V>>>),
    Collision(std::slice::Iter<'a, (K, V)>),
}

fn push_frame<'a, K, V>(stack: &mut ArrayVec<Frame<'a, K, V>, MAX_STACK_DEPTH>, node: &'a Node<K, V>) {
    stack.push(match node {
        Node::Bitmap { slots, .. } => Frame::Slots(slots.iter()),
        Node::Array { children, .. } => Frame::Array(children.iter()),
        Node::Collision { entries, .. } => Frame::Collision(entries.iter()),
    });
}

/// An iterator over key-value pairs of a [`PersistentHashMap`].
///
/// Walks the trie depth first with a fixed-capacity stack.
pub struct PersistentHashMapIterator<'a, K, V> {
    stack: ArrayVec<Frame<'a, K, V>, MAX_STACK_DEPTH>,
    remaining: usize,
}

impl<'a, K, V> Iterator for PersistentHashMapIterator<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let slot = match self.stack.last_mut()? {
                Frame::Slots(slots) => slots.next(),
                Frame::Array(children) => children.find_map(Option::as_ref),
                Frame::Collision(entries) => {
                    if let Some((key, value)) = entries.next() {
                        self.remaining -= 1;
                        return Some((key, value));
                    }
                    None
                }
            };
            match slot {
                None => {
                    self.stack.pop();
                }
                Some(Slot::Entry { key, value, .. }) => {
                    self.remaining -= 1;
                    return Some((key, value));
                }
                Some(Slot::Node(child)) => push_frame(&mut self.stack, child),
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for PersistentHashMapIterator<'_, K, V> {
    fn len(&self) -> usize {
        self.remaining
    }
}

impl<K, V> std::iter::FusedIterator for PersistentHashMapIterator<'_, K, V> {}

/// An owning iterator over the hashed entries of a [`PersistentHashMap`].
pub struct PersistentHashMapIntoIterator<K, V> {
    entries: std::vec::IntoIter<(K, V)>,
}

impl<K, V> Iterator for PersistentHashMapIntoIterator<K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        self.entries.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.entries.size_hint()
    }
}

impl<K, V> ExactSizeIterator for PersistentHashMapIntoIterator<K, V> {}

// =============================================================================
// Standard Trait Implementations
// =============================================================================

impl<K, V> Default for PersistentHashMap<K, V> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Clone + Hash + Eq, V: Clone> FromIterator<(K, V)> for PersistentHashMap<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut transient = TransientHashMap::new();
        transient.absorb(iter);
        transient.finish()
    }
}

impl<K: Clone, V: Clone> IntoIterator for PersistentHashMap<K, V> {
    type Item = (K, V);
    type IntoIter = PersistentHashMapIntoIterator<K, V>;

    fn into_iter(self) -> Self::IntoIter {
        let entries: Vec<(K, V)> = self
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        PersistentHashMapIntoIterator {
            entries: entries.into_iter(),
        }
    }
}

impl<'a, K, V> IntoIterator for &'a PersistentHashMap<K, V> {
    type Item = (&'a K, &'a V);
    type IntoIter = PersistentHashMapIterator<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<K: Clone + Hash + Eq, V: Clone + PartialEq> PartialEq for PersistentHashMap<K, V> {
    fn eq(&self, other: &Self) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        self.length == other.length
            && self.get_null() == other.get_null()
            && self
                .iter()
                .all(|(key, value)| other.get(key) == Some(value))
    }
}

impl<K: Clone + Hash + Eq, V: Clone + Eq> Eq for PersistentHashMap<K, V> {}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for PersistentHashMap<K, V> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_map().entries(self.entries()).finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    /// Key whose hash depends only on `bucket`, to force collisions.
    #[derive(Clone, Debug, PartialEq, Eq)]
    struct CollidingKey {
        bucket: u8,
        id: u32,
    }

    impl Hash for CollidingKey {
        fn hash<H: Hasher>(&self, state: &mut H) {
            self.bucket.hash(state);
        }
    }

    fn key(bucket: u8, id: u32) -> CollidingKey {
        CollidingKey { bucket, id }
    }

    fn root_kind<K, V>(map: &PersistentHashMap<K, V>) -> &'static str {
        match map.root.as_deref() {
            None => "none",
            Some(Node::Bitmap { .. }) => "bitmap",
            Some(Node::Array { .. }) => "array",
            Some(Node::Collision { .. }) => "collision",
        }
    }

    /// Walks the trie and checks bitmap/slot agreement and array counts.
    fn check_node<K, V>(node: &Node<K, V>, depth: usize) -> usize {
        match node {
            Node::Bitmap { bitmap, slots, .. } => {
                assert_eq!(bitmap.count_ones() as usize, slots.len());
                assert!(slots.len() < ARRAY_NODE_THRESHOLD);
                slots.iter().map(|slot| check_slot(slot, depth)).sum()
            }
            Node::Array {
                count, children, ..
            } => {
                assert_eq!(*count, children.iter().flatten().count());
                assert!(*count > PACK_THRESHOLD);
                children.iter().flatten().map(|slot| check_slot(slot, depth)).sum()
            }
            Node::Collision { entries, .. } => {
                assert!(entries.len() >= 2);
                entries.len()
            }
        }
    }

    fn check_slot<K, V>(slot: &Slot<K, V>, depth: usize) -> usize {
        match slot {
            Slot::Entry { .. } => 1,
            Slot::Node(child) => {
                let count = check_node(child, depth + 1);
                assert!(count >= 2, "sub-node with a single entry at depth {depth}");
                count
            }
        }
    }

    fn check<K, V>(map: &PersistentHashMap<K, V>) {
        let hashed = map.root.as_deref().map_or(0, |root| check_node(root, 0));
        assert_eq!(hashed + usize::from(map.has_null()), map.len());
    }

    #[rstest]
    fn test_new_creates_empty() {
        let map: PersistentHashMap<String, i32> = PersistentHashMap::new();
        assert!(map.is_empty());
        assert_eq!(map.iter().count(), 0);
        assert_eq!(root_kind(&map), "none");
    }

    #[rstest]
    fn test_insert_two_then_remove_one() {
        let map = PersistentHashMap::new()
            .insert("a", 1)
            .insert("b", 2)
            .remove("a");

        assert_eq!(map.len(), 1);
        assert_eq!(map.get_key_value("a"), None);
        assert_eq!(map.get_key_value("b"), Some((&"b", &2)));
        check(&map);
    }

    #[rstest]
    fn test_insert_overwrite_keeps_length() {
        let map1 = PersistentHashMap::new().insert("key".to_string(), 1);
        let map2 = map1.insert("key".to_string(), 2);

        assert_eq!(map1.get("key"), Some(&1));
        assert_eq!(map2.get("key"), Some(&2));
        assert_eq!(map2.len(), 1);
    }

    #[rstest]
    fn test_insert_same_value_returns_same_instance() {
        let map: PersistentHashMap<i32, i32> = (0..100).map(|index| (index, index)).collect();
        let same = map.insert(42, 42);
        assert!(same.ptr_eq(&map));

        let changed = map.insert(42, 43);
        assert!(!changed.ptr_eq(&map));
    }

    #[rstest]
    fn test_remove_absent_returns_same_instance() {
        let map: PersistentHashMap<i32, i32> = (0..10).map(|index| (index, index)).collect();
        assert!(map.remove(&99).ptr_eq(&map));
    }

    #[rstest]
    fn test_untouched_subtrees_are_shared() {
        let map: PersistentHashMap<i32, i32> = (0..2000).map(|index| (index, index)).collect();
        let updated = map.insert(5000, 0);

        let (Some(Node::Array { children: before, .. }), Some(Node::Array { children: after, .. })) =
            (map.root.as_deref(), updated.root.as_deref())
        else {
            panic!("expected array roots for 2000 entries");
        };
        let touched = hash_index(compute_hash(&5000), 0);
        for (index, (old, new)) in before.iter().zip(after.iter()).enumerate() {
            if index == touched {
                continue;
            }
            if let (Some(Slot::Node(old)), Some(Slot::Node(new))) = (old, new) {
                assert!(ReferenceCounter::ptr_eq(old, new));
            }
        }
    }

    #[rstest]
    fn test_bitmap_promotes_to_array_and_packs_back() {
        // Sixteen distinct first-level indices force promotion.
        let keys: Vec<u64> = (0u64..10_000)
            .scan(0u32, |seen, candidate| {
                let bit = 1u32 << hash_index(compute_hash(&candidate), 0);
                if *seen & bit == 0 {
                    *seen |= bit;
                    Some(Some(candidate))
                } else {
                    Some(None)
                }
            })
            .flatten()
            .take(16)
            .collect();
        assert_eq!(keys.len(), 16);

        let mut map = PersistentHashMap::new();
        for (position, key) in keys.iter().enumerate() {
            map = map.insert(*key, position);
            let expected = if position + 1 < ARRAY_NODE_THRESHOLD { "bitmap" } else { "array" };
            assert_eq!(root_kind(&map), expected);
            check(&map);
        }

        for (removed, key) in keys.iter().enumerate() {
            map = map.remove(key);
            check(&map);
            let remaining = keys.len() - removed - 1;
            if remaining <= PACK_THRESHOLD && remaining > 0 {
                assert_eq!(root_kind(&map), "bitmap");
            }
        }
        assert!(map.is_empty());
        assert_eq!(root_kind(&map), "none");
    }

    #[rstest]
    fn test_collision_bucket() {
        let map = PersistentHashMap::new()
            .insert(key(1, 1), "first")
            .insert(key(1, 2), "second")
            .insert(key(1, 3), "third")
            .insert(key(2, 1), "other bucket");
        check(&map);

        assert_eq!(map.len(), 4);
        assert_eq!(map.get(&key(1, 2)), Some(&"second"));
        assert_eq!(map.get(&key(1, 4)), None);

        let overwritten = map.insert(key(1, 3), "THIRD");
        assert_eq!(overwritten.len(), 4);
        assert_eq!(overwritten.get(&key(1, 3)), Some(&"THIRD"));

        let shrunk = map.remove(&key(1, 1)).remove(&key(1, 2));
        check(&shrunk);
        assert_eq!(shrunk.len(), 2);
        assert_eq!(shrunk.get(&key(1, 3)), Some(&"third"));
        assert_eq!(shrunk.get(&key(2, 1)), Some(&"other bucket"));
    }

    #[rstest]
    fn test_collision_bucket_nested_under_new_entry() {
        // The bucket sits one level below the root; a key with a different
        // hash that lands on the same root slot must push it further down.
        type MixedKey = Result<CollidingKey, u32>;
        let bucket_hash = compute_hash(&MixedKey::Ok(key(7, 0)));
        let sibling = (0u32..1_000_000).find(|candidate| {
            let hash = compute_hash(&MixedKey::Err(*candidate));
            hash != bucket_hash && hash_index(hash, 0) == hash_index(bucket_hash, 0)
        });
        let Some(sibling) = sibling else {
            panic!("no sibling sharing the root slot");
        };

        let map: PersistentHashMap<MixedKey, i32> = PersistentHashMap::new()
            .insert(Ok(key(7, 1)), 1)
            .insert(Ok(key(7, 2)), 2)
            .insert(Err(sibling), 3);
        check(&map);
        assert_eq!(map.len(), 3);
        assert_eq!(map.get(&Ok(key(7, 1))), Some(&1));
        assert_eq!(map.get(&Ok(key(7, 2))), Some(&2));
        assert_eq!(map.get(&Err(sibling)), Some(&3));

        let removed = map.remove(&Err(sibling));
        check(&removed);
        assert_eq!(removed.len(), 2);
        assert_eq!(removed.get(&Ok(key(7, 2))), Some(&2));
    }

    #[rstest]
    fn test_null_slot() {
        let map: PersistentHashMap<&str, i32> = PersistentHashMap::new().insert("a", 1);
        let with_null = map.insert_null(0);

        assert_eq!(with_null.len(), 2);
        assert!(with_null.has_null());
        assert_eq!(with_null.get_null(), Some(&0));
        assert_eq!(with_null.iter().len(), 1);
        assert_eq!(with_null.entries().count(), 2);
        assert!(with_null.insert_null(0).ptr_eq(&with_null));

        let without = with_null.remove_null();
        assert_eq!(without.len(), 1);
        assert_eq!(without.get_null(), None);
        assert_eq!(without, map);
    }

    #[rstest]
    fn test_iter_len_matches_count() {
        let map: PersistentHashMap<u32, u32> = (0..5000).map(|index| (index, index)).collect();
        let iterator = map.iter();
        assert_eq!(iterator.len(), 5000);
        let mut keys: Vec<u32> = iterator.map(|(key, _)| *key).collect();
        keys.sort_unstable();
        assert_eq!(keys, (0..5000).collect::<Vec<_>>());
        check(&map);
    }

    #[rstest]
    fn test_merge_prefers_other() {
        let left = PersistentHashMap::new().insert("a", 1).insert("b", 2);
        let right = PersistentHashMap::new().insert("b", 20).insert("c", 3).insert_null(9);
        let merged = left.merge(&right);

        assert_eq!(merged.len(), 4);
        assert_eq!(merged.get("a"), Some(&1));
        assert_eq!(merged.get("b"), Some(&20));
        assert_eq!(merged.get("c"), Some(&3));
        assert_eq!(merged.get_null(), Some(&9));
        assert_eq!(left.len(), 2);
    }

    #[rstest]
    fn test_transient_leaves_source_untouched() {
        let base: PersistentHashMap<i32, i32> = (0..500).map(|index| (index, index)).collect();
        let mut transient = base.transient();
        for index in 0..500 {
            transient.insert(index, -index).ok();
        }
        for index in 500..700 {
            transient.insert(index, index).ok();
        }
        for index in 0..100 {
            transient.remove(&index).ok();
        }
        let result = transient.persistent().ok();
        let Some(result) = result else {
            panic!("first persistent() must succeed");
        };

        assert_eq!(base.len(), 500);
        assert!((0..500).all(|index| base.get(&index) == Some(&index)));
        assert_eq!(result.len(), 600);
        assert_eq!(result.get(&0), None);
        assert_eq!(result.get(&100), Some(&-100));
        assert_eq!(result.get(&650), Some(&650));
        check(&result);
    }

    #[rstest]
    fn test_transient_mutates_own_nodes_in_place() {
        let mut transient = TransientHashMap::new();
        transient.insert(1, 1).ok();
        let first_root = transient.root.as_ref().map(ReferenceCounter::as_ptr);
        transient.insert(2, 2).ok();
        let second_root = transient.root.as_ref().map(ReferenceCounter::as_ptr);
        assert_eq!(first_root, second_root);
    }

    #[rstest]
    fn test_transient_use_after_persistent_fails() {
        let mut transient: TransientHashMap<i32, i32> = TransientHashMap::new();
        assert_eq!(transient.insert(1, 1), Ok(None));
        assert_eq!(transient.insert(1, 2), Ok(Some(1)));
        assert!(transient.persistent().is_ok());

        let finalized = CollectionError::TransientFinalized {
            collection: "TransientHashMap",
        };
        assert_eq!(transient.insert(2, 2), Err(finalized.clone()));
        assert_eq!(transient.remove(&1), Err(finalized.clone()));
        assert_eq!(transient.get(&1), Err(finalized.clone()));
        assert_eq!(transient.len(), Err(finalized.clone()));
        assert_eq!(transient.insert_null(0), Err(finalized.clone()));
        assert!(transient.persistent().is_err());
    }

    #[rstest]
    fn test_transient_null_slot() {
        let mut transient: TransientHashMap<i32, i32> = TransientHashMap::new();
        assert_eq!(transient.insert_null(1), Ok(None));
        assert_eq!(transient.insert_null(2), Ok(Some(1)));
        assert_eq!(transient.len(), Ok(1));
        assert_eq!(transient.remove_null(), Ok(Some(2)));
        assert_eq!(transient.is_empty(), Ok(true));
    }

    #[rstest]
    fn test_debug_lists_null_first() {
        let map = PersistentHashMap::new().insert(1, "one").insert_null("zero");
        assert_eq!(format!("{map:?}"), r#"{None: "zero", Some(1): "one"}"#);
    }
}
