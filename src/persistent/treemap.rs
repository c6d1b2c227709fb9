//! Persistent (immutable) sorted map based on a red-black tree.
//!
//! This module provides [`PersistentTreeMap`], an immutable map that keeps its
//! entries ordered by a [`Comparator`] and shares every untouched subtree
//! between versions.
//!
//! # Overview
//!
//! Every edit copies the path from the root to the affected node and reuses
//! the rest of the tree. Insertion rebalances with the four classic
//! red-red rotations; deletion splices the children of the removed node and
//! repairs black height on the way back up.
//!
//! - O(log N) get, insert, remove
//! - O(log N) `min`, `max`, `first_key`, `last_key`
//! - O(1) `sub_map` / `tail_map` when the range covers or misses the whole map
//!
//! # Examples
//!
//! ```rust
//! use strata::persistent::PersistentTreeMap;
//!
//! let map = PersistentTreeMap::new()
//!     .insert(5, "e")
//!     .insert(1, "a")
//!     .insert(3, "c");
//!
//! // Entries are always in sorted order
//! let keys: Vec<&i32> = map.keys().collect();
//! assert_eq!(keys, vec![&1, &3, &5]);
//!
//! // Structural sharing: the original map is preserved
//! let updated = map.insert(1, "A");
//! assert_eq!(map.get(&1), Some(&"a"));
//! assert_eq!(updated.get(&1), Some(&"A"));
//! ```
//!
//! # Custom Ordering
//!
//! ```rust
//! use strata::persistent::PersistentTreeMap;
//!
//! let descending = PersistentTreeMap::with_comparator(|left: &i32, right: &i32| right.cmp(left))
//!     .insert(1, ())
//!     .insert(3, ())
//!     .insert(2, ());
//! let keys: Vec<i32> = descending.keys().copied().collect();
//! assert_eq!(keys, vec![3, 2, 1]);
//! ```

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::iter::FromIterator;
use std::ops::{Bound, RangeBounds};

use smallvec::SmallVec;

use super::ReferenceCounter;
use crate::CollectionError;

/// Inline capacity of iterator stacks; a red-black tree of height 48 holds
/// more than 2^24 entries.
const STACK_CAPACITY: usize = 48;

// =============================================================================
// Comparator
// =============================================================================

/// A total order over keys of type `K`.
///
/// Any `Fn(&K, &K) -> Ordering` is a comparator.
pub trait Comparator<K: ?Sized> {
    /// Compares two keys.
    fn compare(&self, left: &K, right: &K) -> Ordering;
}

/// Orders keys by their [`Ord`] implementation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct NaturalOrder;

impl<K: Ord + ?Sized> Comparator<K> for NaturalOrder {
    #[inline]
    fn compare(&self, left: &K, right: &K) -> Ordering {
        left.cmp(right)
    }
}

impl<K: ?Sized, F> Comparator<K> for F
where
    F: Fn(&K, &K) -> Ordering,
{
    #[inline]
    fn compare(&self, left: &K, right: &K) -> Ordering {
        self(left, right)
    }
}

// =============================================================================
// Color Definition
// =============================================================================

/// The color of a Red-Black Tree node.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Color {
    Red,
    Black,
}

// =============================================================================
// Node Definition
// =============================================================================

type Tree<K, V> = Option<ReferenceCounter<Node<K, V>>>;

/// Internal node structure for the Red-Black Tree.
#[derive(Clone)]
struct Node<K, V> {
    key: K,
    value: V,
    color: Color,
    left: Tree<K, V>,
    right: Tree<K, V>,
}

impl<K: Clone, V: Clone> Node<K, V> {
    fn entry(&self) -> (K, V) {
        (self.key.clone(), self.value.clone())
    }
}

fn node<K, V>(color: Color, left: Tree<K, V>, (key, value): (K, V), right: Tree<K, V>) -> Tree<K, V> {
    Some(ReferenceCounter::new(Node {
        key,
        value,
        color,
        left,
        right,
    }))
}

/// Returns the root of `tree` if it is red.
fn red<K, V>(tree: &Tree<K, V>) -> Option<&Node<K, V>> {
    tree.as_deref().filter(|node| node.color == Color::Red)
}

/// Returns the root of `tree` if it is a black node (not a leaf).
fn black<K, V>(tree: &Tree<K, V>) -> Option<&Node<K, V>> {
    tree.as_deref().filter(|node| node.color == Color::Black)
}

fn blacken<K: Clone, V: Clone>(mut tree: Tree<K, V>) -> Tree<K, V> {
    if let Some(link) = &mut tree
        && link.color == Color::Red
    {
        ReferenceCounter::make_mut(link).color = Color::Black;
    }
    tree
}

/// Recolors a black node red; deletion only asks this of black nodes.
fn redden<K: Clone, V: Clone>(tree: &Tree<K, V>) -> Tree<K, V> {
    match black(tree) {
        Some(current) => node(
            Color::Red,
            current.left.clone(),
            current.entry(),
            current.right.clone(),
        ),
        None => panic!("invariant violation: expected a black node to redden"),
    }
}

// =============================================================================
// Balancing
// =============================================================================

/// Builds a black node over `left`, `entry`, `right`, resolving a red-red
/// violation on either side by rotating it into a red node with two black
/// children.
fn balance<K: Clone, V: Clone>(left: Tree<K, V>, entry: (K, V), right: Tree<K, V>) -> Tree<K, V> {
    if let (Some(outer_left), Some(outer_right)) = (red(&left), red(&right)) {
        return node(
            Color::Red,
            node(
                Color::Black,
                outer_left.left.clone(),
                outer_left.entry(),
                outer_left.right.clone(),
            ),
            entry,
            node(
                Color::Black,
                outer_right.left.clone(),
                outer_right.entry(),
                outer_right.right.clone(),
            ),
        );
    }
    if let Some(child) = red(&left) {
        if let Some(grandchild) = red(&child.left) {
            return node(
                Color::Red,
                node(
                    Color::Black,
                    grandchild.left.clone(),
                    grandchild.entry(),
                    grandchild.right.clone(),
                ),
                child.entry(),
                node(Color::Black, child.right.clone(), entry, right),
            );
        }
        if let Some(grandchild) = red(&child.right) {
            return node(
                Color::Red,
                node(
                    Color::Black,
                    child.left.clone(),
                    child.entry(),
                    grandchild.left.clone(),
                ),
                grandchild.entry(),
                node(Color::Black, grandchild.right.clone(), entry, right),
            );
        }
    }
    if let Some(child) = red(&right) {
        if let Some(grandchild) = red(&child.right) {
            return node(
                Color::Red,
                node(Color::Black, left, entry, child.left.clone()),
                child.entry(),
                node(
                    Color::Black,
                    grandchild.left.clone(),
                    grandchild.entry(),
                    grandchild.right.clone(),
                ),
            );
        }
        if let Some(grandchild) = red(&child.left) {
            return node(
                Color::Red,
                node(Color::Black, left, entry, grandchild.left.clone()),
                grandchild.entry(),
                node(
                    Color::Black,
                    grandchild.right.clone(),
                    child.entry(),
                    child.right.clone(),
                ),
            );
        }
    }
    node(Color::Black, left, entry, right)
}

fn add<K: Clone, V: Clone, C: Comparator<K>>(
    tree: &Tree<K, V>,
    key: K,
    value: V,
    comparator: &C,
) -> (Tree<K, V>, bool) {
    let Some(current) = tree.as_deref() else {
        return (node(Color::Red, None, (key, value), None), true);
    };
    match comparator.compare(&key, &current.key) {
        Ordering::Less => add_left(current, key, value, comparator),
        Ordering::Greater => add_right(current, key, value, comparator),
        Ordering::Equal => (
            node(
                current.color,
                current.left.clone(),
                (current.key.clone(), value),
                current.right.clone(),
            ),
            false,
        ),
    }
}

fn add_left<K: Clone, V: Clone, C: Comparator<K>>(
    current: &Node<K, V>,
    key: K,
    value: V,
    comparator: &C,
) -> (Tree<K, V>, bool) {
    let (left, added) = add(&current.left, key, value, comparator);
    let tree = match current.color {
        Color::Black => balance(left, current.entry(), current.right.clone()),
        Color::Red => node(Color::Red, left, current.entry(), current.right.clone()),
    };
    (tree, added)
}

fn add_right<K: Clone, V: Clone, C: Comparator<K>>(
    current: &Node<K, V>,
    key: K,
    value: V,
    comparator: &C,
) -> (Tree<K, V>, bool) {
    let (right, added) = add(&current.right, key, value, comparator);
    let tree = match current.color {
        Color::Black => balance(current.left.clone(), current.entry(), right),
        Color::Red => node(Color::Red, current.left.clone(), current.entry(), right),
    };
    (tree, added)
}

/// Restores balance after the left subtree lost one unit of black height.
fn balance_left_del<K: Clone, V: Clone>(
    left: Tree<K, V>,
    entry: (K, V),
    right: Tree<K, V>,
) -> Tree<K, V> {
    if let Some(child) = red(&left) {
        return node(
            Color::Red,
            node(
                Color::Black,
                child.left.clone(),
                child.entry(),
                child.right.clone(),
            ),
            entry,
            right,
        );
    }
    if let Some(sibling) = black(&right) {
        return balance(
            left,
            entry,
            node(
                Color::Red,
                sibling.left.clone(),
                sibling.entry(),
                sibling.right.clone(),
            ),
        );
    }
    if let Some(sibling) = red(&right)
        && let Some(nephew) = black(&sibling.left)
    {
        return node(
            Color::Red,
            node(Color::Black, left, entry, nephew.left.clone()),
            nephew.entry(),
            balance(
                nephew.right.clone(),
                sibling.entry(),
                redden(&sibling.right),
            ),
        );
    }
    panic!("invariant violation: unbalanced left deletion")
}

/// Restores balance after the right subtree lost one unit of black height.
fn balance_right_del<K: Clone, V: Clone>(
    left: Tree<K, V>,
    entry: (K, V),
    right: Tree<K, V>,
) -> Tree<K, V> {
    if let Some(child) = red(&right) {
        return node(
            Color::Red,
            left,
            entry,
            node(
                Color::Black,
                child.left.clone(),
                child.entry(),
                child.right.clone(),
            ),
        );
    }
    if let Some(sibling) = black(&left) {
        return balance(
            node(
                Color::Red,
                sibling.left.clone(),
                sibling.entry(),
                sibling.right.clone(),
            ),
            entry,
            right,
        );
    }
    if let Some(sibling) = red(&left)
        && let Some(nephew) = black(&sibling.right)
    {
        return node(
            Color::Red,
            balance(
                redden(&sibling.left),
                sibling.entry(),
                nephew.left.clone(),
            ),
            nephew.entry(),
            node(Color::Black, nephew.right.clone(), entry, right),
        );
    }
    panic!("invariant violation: unbalanced right deletion")
}

/// Joins two subtrees of equal black height whose keys are ordered.
fn append<K: Clone, V: Clone>(left: &Tree<K, V>, right: &Tree<K, V>) -> Tree<K, V> {
    let (Some(outer_left), Some(outer_right)) = (left.as_deref(), right.as_deref()) else {
        return left.clone().or_else(|| right.clone());
    };
    match (outer_left.color, outer_right.color) {
        (Color::Red, Color::Red) => {
            let middle = append(&outer_left.right, &outer_right.left);
            if let Some(inner) = red(&middle) {
                return node(
                    Color::Red,
                    node(
                        Color::Red,
                        outer_left.left.clone(),
                        outer_left.entry(),
                        inner.left.clone(),
                    ),
                    inner.entry(),
                    node(
                        Color::Red,
                        inner.right.clone(),
                        outer_right.entry(),
                        outer_right.right.clone(),
                    ),
                );
            }
            node(
                Color::Red,
                outer_left.left.clone(),
                outer_left.entry(),
                node(
                    Color::Red,
                    middle,
                    outer_right.entry(),
                    outer_right.right.clone(),
                ),
            )
        }
        (Color::Black, Color::Black) => {
            let middle = append(&outer_left.right, &outer_right.left);
            if let Some(inner) = red(&middle) {
                return node(
                    Color::Red,
                    node(
                        Color::Black,
                        outer_left.left.clone(),
                        outer_left.entry(),
                        inner.left.clone(),
                    ),
                    inner.entry(),
                    node(
                        Color::Black,
                        inner.right.clone(),
                        outer_right.entry(),
                        outer_right.right.clone(),
                    ),
                );
            }
            balance_left_del(
                outer_left.left.clone(),
                outer_left.entry(),
                node(
                    Color::Black,
                    middle,
                    outer_right.entry(),
                    outer_right.right.clone(),
                ),
            )
        }
        (Color::Black, Color::Red) => node(
            Color::Red,
            append(left, &outer_right.left),
            outer_right.entry(),
            outer_right.right.clone(),
        ),
        (Color::Red, Color::Black) => node(
            Color::Red,
            outer_left.left.clone(),
            outer_left.entry(),
            append(&outer_left.right, right),
        ),
    }
}

fn delete<K: Clone, V: Clone, C: Comparator<K>>(
    tree: &Tree<K, V>,
    key: &K,
    comparator: &C,
) -> Tree<K, V> {
    let current = tree.as_deref()?;
    match comparator.compare(key, &current.key) {
        Ordering::Less => {
            let left = delete(&current.left, key, comparator);
            if black(&current.left).is_some() {
                balance_left_del(left, current.entry(), current.right.clone())
            } else {
                node(Color::Red, left, current.entry(), current.right.clone())
            }
        }
        Ordering::Greater => {
            let right = delete(&current.right, key, comparator);
            if black(&current.right).is_some() {
                balance_right_del(current.left.clone(), current.entry(), right)
            } else {
                node(Color::Red, current.left.clone(), current.entry(), right)
            }
        }
        Ordering::Equal => append(&current.left, &current.right),
    }
}

/// Builds a valid red-black tree from entries in ascending order.
///
/// The tree is perfectly balanced; nodes on the deepest level are red.
fn build_sorted<K, V, I>(entries: &mut I, length: usize, depth: usize, red_depth: usize) -> Tree<K, V>
where
    I: Iterator<Item = (K, V)>,
{
    if length == 0 {
        return None;
    }
    let left_length = length / 2;
    let left = build_sorted(entries, left_length, depth + 1, red_depth);
    let entry = entries.next()?;
    let right = build_sorted(entries, length - left_length - 1, depth + 1, red_depth);
    let color = if depth == red_depth && depth > 0 {
        Color::Red
    } else {
        Color::Black
    };
    node(color, left, entry, right)
}

// =============================================================================
// PersistentTreeMap Definition
// =============================================================================

/// A persistent (immutable) sorted map based on a red-black tree.
///
/// # Time Complexity
///
/// | Operation      | Complexity |
/// |----------------|------------|
/// | `new`          | O(1)       |
/// | `get`          | O(log N)   |
/// | `insert`       | O(log N)   |
/// | `remove`       | O(log N)   |
/// | `first_key`    | O(log N)   |
/// | `sub_map`      | O(log N + K), O(1) when the range covers or misses the map |
/// | `len`          | O(1)       |
///
/// # Examples
///
/// ```rust
/// use strata::persistent::PersistentTreeMap;
///
/// let map: PersistentTreeMap<i32, &str> =
///     [(3, "three"), (1, "one"), (2, "two")].into_iter().collect();
///
/// assert_eq!(map.first_key(), Ok(&1));
/// assert_eq!(map.last_key(), Ok(&3));
///
/// let tail = map.tail_map(&2);
/// assert_eq!(tail.keys().copied().collect::<Vec<_>>(), vec![2, 3]);
/// ```
pub struct PersistentTreeMap<K, V, C = NaturalOrder> {
    root: Tree<K, V>,
    length: usize,
    comparator: C,
}

impl<K, V, C: Clone> Clone for PersistentTreeMap<K, V, C> {
    fn clone(&self) -> Self {
        Self {
            root: self.root.clone(),
            length: self.length,
            comparator: self.comparator.clone(),
        }
    }
}

impl<K, V> PersistentTreeMap<K, V> {
    /// Creates a new empty map ordered by `Ord`.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self::with_comparator(NaturalOrder)
    }
}

impl<K, V, C> PersistentTreeMap<K, V, C> {
    /// Creates a new empty map ordered by `comparator`.
    #[inline]
    #[must_use]
    pub const fn with_comparator(comparator: C) -> Self {
        Self {
            root: None,
            length: 0,
            comparator,
        }
    }

    /// Returns the comparator this map orders its keys by.
    #[inline]
    pub const fn comparator(&self) -> &C {
        &self.comparator
    }

    /// Returns the number of entries in the map.
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

    /// Returns `true` if both maps share the same root.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (&self.root, &other.root) {
            (Some(left), Some(right)) => ReferenceCounter::ptr_eq(left, right),
            (None, None) => true,
            _ => false,
        }
    }

    /// Returns the entry with the smallest key.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use strata::persistent::PersistentTreeMap;
    ///
    /// let map = PersistentTreeMap::new().insert(2, "b").insert(1, "a");
    /// assert_eq!(map.min(), Some((&1, &"a")));
    /// ```
    #[must_use]
    pub fn min(&self) -> Option<(&K, &V)> {
        let mut current = self.root.as_deref()?;
        while let Some(left) = current.left.as_deref() {
            current = left;
        }
        Some((&current.key, &current.value))
    }

    /// Returns the entry with the largest key.
    #[must_use]
    pub fn max(&self) -> Option<(&K, &V)> {
        let mut current = self.root.as_deref()?;
        while let Some(right) = current.right.as_deref() {
            current = right;
        }
        Some((&current.key, &current.value))
    }

    /// Returns the smallest key.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::EmptyCollection`] if the map is empty.
    pub fn first_key(&self) -> Result<&K, CollectionError> {
        self.min()
            .map(|(key, _)| key)
            .ok_or(CollectionError::EmptyCollection {
                operation: "first_key",
            })
    }

    /// Returns the largest key.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::EmptyCollection`] if the map is empty.
    pub fn last_key(&self) -> Result<&K, CollectionError> {
        self.max()
            .map(|(key, _)| key)
            .ok_or(CollectionError::EmptyCollection {
                operation: "last_key",
            })
    }

    /// Returns an iterator over entries in ascending key order.
    ///
    /// The iterator is double ended and keeps one root-to-leaf path per end.
    #[must_use]
    pub fn iter(&self) -> PersistentTreeMapIterator<'_, K, V> {
        let mut front = SmallVec::new();
        let mut back = SmallVec::new();
        push_left_spine(&mut front, self.root.as_deref());
        push_right_spine(&mut back, self.root.as_deref());
        PersistentTreeMapIterator {
            front,
            back,
            remaining: self.length,
        }
    }

    /// Returns an iterator over keys in ascending order.
    pub fn keys(&self) -> impl DoubleEndedIterator<Item = &K> + ExactSizeIterator {
        self.iter().map(|(key, _)| key)
    }

    /// Returns an iterator over values in ascending key order.
    pub fn values(&self) -> impl DoubleEndedIterator<Item = &V> + ExactSizeIterator {
        self.iter().map(|(_, value)| value)
    }
}

impl<K, V, C: Comparator<K>> PersistentTreeMap<K, V, C> {
    fn find(&self, key: &K) -> Option<&Node<K, V>> {
        let mut current = self.root.as_deref();
        while let Some(node) = current {
            match self.comparator.compare(key, &node.key) {
                Ordering::Less => current = node.left.as_deref(),
                Ordering::Greater => current = node.right.as_deref(),
                Ordering::Equal => return Some(node),
            }
        }
        None
    }

    /// Returns a reference to the value corresponding to the key.
    ///
    /// # Complexity
    ///
    /// O(log N)
    #[must_use]
    pub fn get(&self, key: &K) -> Option<&V> {
        self.find(key).map(|node| &node.value)
    }

    /// Returns the stored entry for `key`.
    #[must_use]
    pub fn get_key_value(&self, key: &K) -> Option<(&K, &V)> {
        self.find(key).map(|node| (&node.key, &node.value))
    }

    /// Returns `true` if the map contains a value for the specified key.
    #[must_use]
    pub fn contains_key(&self, key: &K) -> bool {
        self.find(key).is_some()
    }

    /// Returns an iterator over the entries whose keys fall in `range`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use strata::persistent::PersistentTreeMap;
    ///
    /// let map: PersistentTreeMap<i32, i32> = (0..10).map(|key| (key, key * key)).collect();
    /// let squares: Vec<i32> = map.range(3..6).map(|(_, value)| *value).collect();
    /// assert_eq!(squares, vec![9, 16, 25]);
    ///
    /// let reversed: Vec<i32> = map.range(..=2).rev().map(|(key, _)| *key).collect();
    /// assert_eq!(reversed, vec![2, 1, 0]);
    /// ```
    pub fn range<R: RangeBounds<K>>(&self, range: R) -> PersistentTreeMapRangeIterator<'_, K, V, C> {
        let mut front = SmallVec::new();
        let mut back = SmallVec::new();
        seek_lower(&mut front, self.root.as_deref(), range.start_bound(), &self.comparator);
        seek_upper(&mut back, self.root.as_deref(), range.end_bound(), &self.comparator);
        let bounds = match (front.last().copied(), back.last().copied()) {
            (Some(low), Some(high)) if self.comparator.compare(&low.key, &high.key) != Ordering::Greater => {
                Some((&low.key, &high.key))
            }
            _ => None,
        };
        PersistentTreeMapRangeIterator {
            front,
            back,
            low: bounds.map(|(low, _)| low),
            high: bounds.map(|(_, high)| high),
            front_last: None,
            back_last: None,
            comparator: &self.comparator,
        }
    }
}

impl<K: Clone, V: Clone, C: Comparator<K> + Clone> PersistentTreeMap<K, V, C> {
    /// Creates a map containing a single key-value pair.
    #[must_use]
    pub fn singleton_with_comparator(key: K, value: V, comparator: C) -> Self {
        Self {
            root: node(Color::Black, None, (key, value), None),
            length: 1,
            comparator,
        }
    }

    /// Removes a key from the map.
    ///
    /// Removing an absent key returns a map that shares this map's root.
    ///
    /// # Complexity
    ///
    /// O(log N)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use strata::persistent::PersistentTreeMap;
    ///
    /// let map = PersistentTreeMap::new().insert(1, "a").insert(2, "b");
    /// let removed = map.remove(&1);
    /// assert_eq!(removed.len(), 1);
    /// assert_eq!(map.len(), 2);
    /// assert!(removed.remove(&1).ptr_eq(&removed));
    /// ```
    #[must_use]
    pub fn remove(&self, key: &K) -> Self {
        if !self.contains_key(key) {
            return self.clone();
        }
        Self {
            root: blacken(delete(&self.root, key, &self.comparator)),
            length: self.length - 1,
            comparator: self.comparator.clone(),
        }
    }

    fn empty_like(&self) -> Self {
        Self::with_comparator(self.comparator.clone())
    }

    fn from_sorted_entries(entries: Vec<(K, V)>, comparator: C) -> Self {
        let length = entries.len();
        let red_depth = length.checked_ilog2().map_or(0, |depth| depth as usize);
        let mut entries = entries.into_iter();
        Self {
            root: blacken(build_sorted(&mut entries, length, 0, red_depth)),
            length,
            comparator,
        }
    }

    fn slice(&self, from: Bound<&K>, to: Bound<&K>) -> Self {
        let entries: Vec<(K, V)> = self
            .range((from, to))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        if entries.len() == self.length {
            return self.clone();
        }
        Self::from_sorted_entries(entries, self.comparator.clone())
    }

    /// Returns the entries with keys in `[from, to)`.
    ///
    /// When the range covers every key the result shares this map's root,
    /// and when it covers none the result is empty; both cases take O(log N).
    /// The result keeps this map's comparator.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use strata::persistent::PersistentTreeMap;
    ///
    /// let map: PersistentTreeMap<i32, ()> = (1..=5).map(|key| (key, ())).collect();
    /// let middle = map.sub_map(&2, &4);
    /// assert_eq!(middle.keys().copied().collect::<Vec<_>>(), vec![2, 3]);
    ///
    /// assert!(map.sub_map(&0, &10).ptr_eq(&map));
    /// assert!(map.sub_map(&6, &10).is_empty());
    /// ```
    #[must_use]
    pub fn sub_map(&self, from: &K, to: &K) -> Self {
        if self.comparator.compare(from, to) != Ordering::Less {
            return self.empty_like();
        }
        let (Some((first, _)), Some((last, _))) = (self.min(), self.max()) else {
            return self.clone();
        };
        if self.comparator.compare(from, first) != Ordering::Greater
            && self.comparator.compare(to, last) == Ordering::Greater
        {
            return self.clone();
        }
        if self.comparator.compare(to, first) != Ordering::Greater
            || self.comparator.compare(from, last) == Ordering::Greater
        {
            return self.empty_like();
        }
        self.slice(Bound::Included(from), Bound::Excluded(to))
    }

    /// Returns the entries with keys greater than or equal to `from`.
    #[must_use]
    pub fn tail_map(&self, from: &K) -> Self {
        let (Some((first, _)), Some((last, _))) = (self.min(), self.max()) else {
            return self.clone();
        };
        if self.comparator.compare(from, first) != Ordering::Greater {
            return self.clone();
        }
        if self.comparator.compare(from, last) == Ordering::Greater {
            return self.empty_like();
        }
        self.slice(Bound::Included(from), Bound::Unbounded)
    }

    /// Returns the entries with keys strictly less than `to`.
    #[must_use]
    pub fn head_map(&self, to: &K) -> Self {
        let (Some((first, _)), Some((last, _))) = (self.min(), self.max()) else {
            return self.clone();
        };
        if self.comparator.compare(to, last) == Ordering::Greater {
            return self.clone();
        }
        if self.comparator.compare(to, first) != Ordering::Greater {
            return self.empty_like();
        }
        self.slice(Bound::Unbounded, Bound::Excluded(to))
    }

    /// Checks ordering, the red rule and black height; returns the black
    /// height.
    #[cfg(test)]
    pub(crate) fn check_invariants(&self) -> usize {
        fn walk<K, V>(tree: &Tree<K, V>, parent_red: bool) -> (usize, usize) {
            let Some(current) = tree.as_deref() else {
                return (1, 0);
            };
            let is_red = current.color == Color::Red;
            assert!(!(parent_red && is_red), "red node with a red child");
            let (left_height, left_count) = walk(&current.left, is_red);
            let (right_height, right_count) = walk(&current.right, is_red);
            assert_eq!(left_height, right_height, "unequal black height");
            (left_height + usize::from(!is_red), left_count + right_count + 1)
        }

        assert!(red(&self.root).is_none(), "red root");
        let (height, count) = walk(&self.root, false);
        assert_eq!(count, self.length);
        let keys: Vec<&K> = self.keys().collect();
        for pair in keys.windows(2) {
            assert_eq!(self.comparator.compare(pair[0], pair[1]), Ordering::Less);
        }
        height
    }
}

impl<K: Clone, V: Clone + PartialEq, C: Comparator<K> + Clone> PersistentTreeMap<K, V, C> {
    /// Inserts a key-value pair into the map.
    ///
    /// If `key` is already bound to a value equal to `value`, the returned
    /// map shares this map's root. An existing key keeps its stored instance.
    ///
    /// # Complexity
    ///
    /// O(log N)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use strata::persistent::PersistentTreeMap;
    ///
    /// let map1 = PersistentTreeMap::new().insert(1, "one");
    /// let map2 = map1.insert(2, "two");
    /// assert_eq!(map1.len(), 1);
    /// assert_eq!(map2.len(), 2);
    /// assert!(map2.insert(2, "two").ptr_eq(&map2));
    /// ```
    #[must_use]
    pub fn insert(&self, key: K, value: V) -> Self {
        if let Some(existing) = self.find(&key)
            && existing.value == value
        {
            return self.clone();
        }
        let (root, added) = add(&self.root, key, value, &self.comparator);
        Self {
            root: blacken(root),
            length: self.length + usize::from(added),
            comparator: self.comparator.clone(),
        }
    }

    /// Merges two maps, with entries from `other` taking precedence.
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        other.iter().fold(self.clone(), |accumulator, (key, value)| {
            accumulator.insert(key.clone(), value.clone())
        })
    }
}

impl<K: Clone + Ord, V: Clone> PersistentTreeMap<K, V> {
    /// Creates a map containing a single key-value pair.
    #[inline]
    #[must_use]
    pub fn singleton(key: K, value: V) -> Self {
        Self::singleton_with_comparator(key, value, NaturalOrder)
    }
}

// =============================================================================
// Iterator Implementation
// =============================================================================

type Stack<'a, K, V> = SmallVec<[&'a Node<K, V>; STACK_CAPACITY]>;

fn push_left_spine<'a, K, V>(stack: &mut Stack<'a, K, V>, mut current: Option<&'a Node<K, V>>) {
    while let Some(node) = current {
        stack.push(node);
        current = node.left.as_deref();
    }
}

fn push_right_spine<'a, K, V>(stack: &mut Stack<'a, K, V>, mut current: Option<&'a Node<K, V>>) {
    while let Some(node) = current {
        stack.push(node);
        current = node.right.as_deref();
    }
}

fn advance_front<'a, K, V>(stack: &mut Stack<'a, K, V>) -> Option<&'a Node<K, V>> {
    let node = stack.pop()?;
    push_left_spine(stack, node.right.as_deref());
    Some(node)
}

fn advance_back<'a, K, V>(stack: &mut Stack<'a, K, V>) -> Option<&'a Node<K, V>> {
    let node = stack.pop()?;
    push_right_spine(stack, node.left.as_deref());
    Some(node)
}

/// Positions `stack` on the smallest key inside `bound`.
fn seek_lower<'a, K, V, C: Comparator<K>>(
    stack: &mut Stack<'a, K, V>,
    mut current: Option<&'a Node<K, V>>,
    bound: Bound<&K>,
    comparator: &C,
) {
    while let Some(node) = current {
        let inside = match bound {
            Bound::Included(key) => comparator.compare(&node.key, key) != Ordering::Less,
            Bound::Excluded(key) => comparator.compare(&node.key, key) == Ordering::Greater,
            Bound::Unbounded => true,
        };
        if inside {
            stack.push(node);
            current = node.left.as_deref();
        } else {
            current = node.right.as_deref();
        }
    }
}

/// Positions `stack` on the largest key inside `bound`.
fn seek_upper<'a, K, V, C: Comparator<K>>(
    stack: &mut Stack<'a, K, V>,
    mut current: Option<&'a Node<K, V>>,
    bound: Bound<&K>,
    comparator: &C,
) {
    while let Some(node) = current {
        let inside = match bound {
            Bound::Included(key) => comparator.compare(&node.key, key) != Ordering::Greater,
            Bound::Excluded(key) => comparator.compare(&node.key, key) == Ordering::Less,
            Bound::Unbounded => true,
        };
        if inside {
            stack.push(node);
            current = node.right.as_deref();
        } else {
            current = node.left.as_deref();
        }
    }
}

/// An iterator over entries of a [`PersistentTreeMap`] in key order.
pub struct PersistentTreeMapIterator<'a, K, V> {
    front: Stack<'a, K, V>,
    back: Stack<'a, K, V>,
    remaining: usize,
}

impl<'a, K, V> Iterator for PersistentTreeMapIterator<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let node = advance_front(&mut self.front)?;
        self.remaining -= 1;
        Some((&node.key, &node.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> DoubleEndedIterator for PersistentTreeMapIterator<'_, K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let node = advance_back(&mut self.back)?;
        self.remaining -= 1;
        Some((&node.key, &node.value))
    }
}

impl<K, V> ExactSizeIterator for PersistentTreeMapIterator<'_, K, V> {
    fn len(&self) -> usize {
        self.remaining
    }
}

impl<K, V> std::iter::FusedIterator for PersistentTreeMapIterator<'_, K, V> {}

/// An iterator over a key range of a [`PersistentTreeMap`].
pub struct PersistentTreeMapRangeIterator<'a, K, V, C> {
    front: Stack<'a, K, V>,
    back: Stack<'a, K, V>,
    /// Smallest key in range, `None` once exhausted
    low: Option<&'a K>,
    /// Largest key in range, `None` once exhausted
    high: Option<&'a K>,
    front_last: Option<&'a K>,
    back_last: Option<&'a K>,
    comparator: &'a C,
}

impl<K, V, C> PersistentTreeMapRangeIterator<'_, K, V, C> {
    fn exhaust(&mut self) {
        self.low = None;
        self.high = None;
    }
}

impl<'a, K, V, C: Comparator<K>> Iterator for PersistentTreeMapRangeIterator<'a, K, V, C> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let high = self.high?;
        let node = advance_front(&mut self.front)?;
        let past_high = self.comparator.compare(&node.key, high) == Ordering::Greater;
        let met_back = self
            .back_last
            .is_some_and(|back| self.comparator.compare(&node.key, back) != Ordering::Less);
        if past_high || met_back {
            self.exhaust();
            return None;
        }
        self.front_last = Some(&node.key);
        Some((&node.key, &node.value))
    }
}

impl<K, V, C: Comparator<K>> DoubleEndedIterator for PersistentTreeMapRangeIterator<'_, K, V, C> {
    fn next_back(&mut self) -> Option<Self::Item> {
        let low = self.low?;
        let node = advance_back(&mut self.back)?;
        let past_low = self.comparator.compare(&node.key, low) == Ordering::Less;
        let met_front = self
            .front_last
            .is_some_and(|front| self.comparator.compare(&node.key, front) != Ordering::Greater);
        if past_low || met_front {
            self.exhaust();
            return None;
        }
        self.back_last = Some(&node.key);
        Some((&node.key, &node.value))
    }
}

impl<K, V, C: Comparator<K>> std::iter::FusedIterator for PersistentTreeMapRangeIterator<'_, K, V, C> {}

/// An owning iterator over entries of a [`PersistentTreeMap`].
pub struct PersistentTreeMapIntoIterator<K, V> {
    entries: std::vec::IntoIter<(K, V)>,
}

impl<K, V> Iterator for PersistentTreeMapIntoIterator<K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        self.entries.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.entries.size_hint()
    }
}

impl<K, V> DoubleEndedIterator for PersistentTreeMapIntoIterator<K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.entries.next_back()
    }
}

impl<K, V> ExactSizeIterator for PersistentTreeMapIntoIterator<K, V> {}

// =============================================================================
// Standard Trait Implementations
// =============================================================================

impl<K, V, C: Default> Default for PersistentTreeMap<K, V, C> {
    #[inline]
    fn default() -> Self {
        Self::with_comparator(C::default())
    }
}

impl<K: Clone + Ord, V: Clone> FromIterator<(K, V)> for PersistentTreeMap<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::new(), |map, (key, value)| {
                let (root, added) = add(&map.root, key, value, &map.comparator);
                Self {
                    root: blacken(root),
                    length: map.length + usize::from(added),
                    comparator: NaturalOrder,
                }
            })
    }
}

impl<K: Clone, V: Clone, C> IntoIterator for PersistentTreeMap<K, V, C> {
    type Item = (K, V);
    type IntoIter = PersistentTreeMapIntoIterator<K, V>;

    fn into_iter(self) -> Self::IntoIter {
        let entries: Vec<(K, V)> = self
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        PersistentTreeMapIntoIterator {
            entries: entries.into_iter(),
        }
    }
}

impl<'a, K, V, C> IntoIterator for &'a PersistentTreeMap<K, V, C> {
    type Item = (&'a K, &'a V);
    type IntoIter = PersistentTreeMapIterator<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<K: PartialEq, V: PartialEq, C> PartialEq for PersistentTreeMap<K, V, C> {
    fn eq(&self, other: &Self) -> bool {
        self.length == other.length && self.iter().eq(other.iter())
    }
}

impl<K: Eq, V: Eq, C> Eq for PersistentTreeMap<K, V, C> {}

impl<K: Hash, V: Hash, C> Hash for PersistentTreeMap<K, V, C> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.length.hash(state);
        for (key, value) in self {
            key.hash(state);
            value.hash(state);
        }
    }
}

impl<K: fmt::Debug, V: fmt::Debug, C> fmt::Debug for PersistentTreeMap<K, V, C> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_map().entries(self.iter()).finish()
    }
}

impl<K: fmt::Display, V: fmt::Display, C> fmt::Display for PersistentTreeMap<K, V, C> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{{")?;
        for (index, (key, value)) in self.iter().enumerate() {
            if index > 0 {
                write!(formatter, ", ")?;
            }
            write!(formatter, "{key}: {value}")?;
        }
        write!(formatter, "}}")
    }
}

// =============================================================================
// Serde Support
// =============================================================================

#[cfg(feature = "serde")]
impl<K, V, C> serde::Serialize for PersistentTreeMap<K, V, C>
where
    K: serde::Serialize,
    V: serde::Serialize,
{
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (key, value) in self {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

#[cfg(feature = "serde")]
struct PersistentTreeMapVisitor<K, V> {
    marker: std::marker::PhantomData<(K, V)>,
}

#[cfg(feature = "serde")]
impl<'de, K, V> serde::de::Visitor<'de> for PersistentTreeMapVisitor<K, V>
where
    K: serde::Deserialize<'de> + Clone + Ord,
    V: serde::Deserialize<'de> + Clone,
{
    type Value = PersistentTreeMap<K, V>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a map")
    }

    fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
    where
        A: serde::de::MapAccess<'de>,
    {
        let mut map = PersistentTreeMap::new();
        while let Some((key, value)) = access.next_entry()? {
            let (root, added) = add(&map.root, key, value, &NaturalOrder);
            map = PersistentTreeMap {
                root: blacken(root),
                length: map.length + usize::from(added),
                comparator: NaturalOrder,
            };
        }
        Ok(map)
    }
}

#[cfg(feature = "serde")]
impl<'de, K, V> serde::Deserialize<'de> for PersistentTreeMap<K, V>
where
    K: serde::Deserialize<'de> + Clone + Ord,
    V: serde::Deserialize<'de> + Clone,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_map(PersistentTreeMapVisitor {
            marker: std::marker::PhantomData,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
