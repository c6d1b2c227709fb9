//! Persistent (immutable) vector based on a Relaxed Radix Balanced tree.
//!
//! This module provides [`RrbVector`], an immutable sequence that supports
//! logarithmic random insertion, splitting and concatenation in addition to
//! the usual indexed access, and [`TransientRrbVector`], its single-owner
//! builder.
//!
//! # Overview
//!
//! The tree mixes strict nodes, which stay fully packed while the vector
//! only grows at the end and are indexed by bit shifting, with relaxed
//! nodes, which accept children of any size and carry a cumulative size
//! table. A small focus buffer sits on top of the tree and collects the
//! most recent appends or inserts; it is pushed into the tree only when an
//! edit moves elsewhere.
//!
//! - O(log N) `get`, `replace`, `insert`, `split_at`, `join`, `remove`
//! - amortized O(1) `push_back` through the focus
//! - O(1) `len` and `is_empty`
//!
//! # Examples
//!
//! ```rust
//! use strata::persistent::RrbVector;
//!
//! let vector: RrbVector<i32> = (0..100).collect();
//! let (left, right) = vector.split_at(40).unwrap();
//! assert_eq!(left.len(), 40);
//! assert_eq!(right.get(0), Some(&40));
//!
//! let joined = left.join(&right);
//! assert_eq!(joined, vector);
//!
//! let inserted = vector.insert(10, -1).unwrap();
//! assert_eq!(inserted.get(10), Some(&-1));
//! assert_eq!(inserted.get(11), Some(&10));
//! assert_eq!(vector.get(10), Some(&10));
//! ```

mod iter;
mod node;
mod transient;

use std::fmt;
use std::hash::{Hash, Hasher};
use std::iter::FromIterator;
use std::ops::Index;

pub use iter::{RrbCursor, RrbIntoIterator, RrbIterator};
pub use transient::TransientRrbVector;

use node::{Link, Node};
use transient::Builder;

use super::ReferenceCounter;
use super::array;
use crate::CollectionError;

// =============================================================================
// Constants
// =============================================================================

/// log2 of the strict node width
pub(crate) const NODE_LENGTH_POW_2: usize = 5;

/// Width of a strict node and capacity of the focus buffer
pub(crate) const STRICT_NODE_LENGTH: usize = 1 << NODE_LENGTH_POW_2;

/// Smallest leaf that is kept apart when pushed next to another leaf
pub(crate) const MIN_NODE_LENGTH: usize = (STRICT_NODE_LENGTH + 1) * 2 / 3;

/// Largest leaf and widest relaxed node
pub(crate) const MAX_NODE_LENGTH: usize = (STRICT_NODE_LENGTH + 1) * 4 / 3;

// =============================================================================
// RrbVector Definition
// =============================================================================

/// A persistent (immutable) vector based on a Relaxed Radix Balanced tree.
///
/// # Time Complexity
///
/// | Operation   | Complexity                                  |
/// |-------------|---------------------------------------------|
/// | `get`       | O(log N), O(1) inside the focus             |
/// | `push_back` | amortized O(1)                              |
/// | `insert`    | O(log N)                                    |
/// | `replace`   | O(log N)                                    |
/// | `split_at`  | O(log N)                                    |
/// | `join`      | O(log N), O(M) when one side is shorter than 32 |
/// | `remove`    | O(log N)                                    |
///
/// # Examples
///
/// ```rust
/// use strata::persistent::RrbVector;
///
/// let vector = RrbVector::new().push_back(1).push_back(2).push_back(3);
/// assert_eq!(vector.len(), 3);
/// assert_eq!(vector[1], 2);
/// ```
pub struct RrbVector<T> {
    /// Every element outside the focus.
    root: Link<T>,
    focus: ReferenceCounter<[T]>,
    /// Index of the first focus element, in the vector and in the tree.
    focus_start: usize,
    length: usize,
}

impl<T> Clone for RrbVector<T> {
    fn clone(&self) -> Self {
        Self {
            root: self.root.clone(),
            focus: self.focus.clone(),
            focus_start: self.focus_start,
            length: self.length,
        }
    }
}

impl<T> RrbVector<T> {
    /// Creates a new empty vector.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use strata::persistent::RrbVector;
    ///
    /// let vector: RrbVector<i32> = RrbVector::new();
    /// assert!(vector.is_empty());
    /// ```
    #[must_use]
    pub fn new() -> Self {
        Self {
            root: Node::empty(),
            focus: ReferenceCounter::from(Vec::new()),
            focus_start: 0,
            length: 0,
        }
    }

    /// Wraps a tree with an empty focus at its end.
    fn from_root(root: Link<T>, length: usize) -> Self {
        Self {
            root,
            focus: ReferenceCounter::from(Vec::new()),
            focus_start: length,
            length,
        }
    }

    /// Returns the number of elements in the vector.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.length
    }

    /// Returns `true` if the vector contains no elements.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.length == 0
    }

    fn focus_end(&self) -> usize {
        self.focus_start + self.focus.len()
    }

    /// Maps a vector index outside the focus to its tree index.
    fn tree_index(&self, index: usize) -> usize {
        if index < self.focus_start {
            index
        } else {
            index - self.focus.len()
        }
    }

    /// Returns a reference to the element at `index`.
    ///
    /// # Complexity
    ///
    /// O(1) inside the focus, O(log N) otherwise
    ///
    /// # Examples
    ///
    /// ```rust
    /// use strata::persistent::RrbVector;
    ///
    /// let vector: RrbVector<i32> = (0..10).collect();
    /// assert_eq!(vector.get(3), Some(&3));
    /// assert_eq!(vector.get(10), None);
    /// ```
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&T> {
        if index >= self.length {
            return None;
        }
        if (self.focus_start..self.focus_end()).contains(&index) {
            return self.focus.get(index - self.focus_start);
        }
        self.root.get(self.tree_index(index))
    }

    /// Returns the first element.
    #[inline]
    #[must_use]
    pub fn first(&self) -> Option<&T> {
        self.get(0)
    }

    /// Returns the last element.
    #[inline]
    #[must_use]
    pub fn last(&self) -> Option<&T> {
        self.length.checked_sub(1).and_then(|index| self.get(index))
    }

    /// Returns the run of stored elements containing `index` together with
    /// the vector index of its first element.
    pub(crate) fn chunk_at(&self, index: usize) -> (&[T], usize) {
        debug_assert!(index < self.length);
        if (self.focus_start..self.focus_end()).contains(&index) {
            return (&self.focus[..], self.focus_start);
        }
        let (values, start) = self.root.leaf_at(self.tree_index(index));
        if index < self.focus_start {
            let end = (start + values.len()).min(self.focus_start);
            (&values[..end - start], start)
        } else {
            let begin = start.max(self.focus_start);
            (&values[begin - start..], begin + self.focus.len())
        }
    }

    /// Returns a double-ended iterator over the elements.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use strata::persistent::RrbVector;
    ///
    /// let vector: RrbVector<i32> = (1..=4).collect();
    /// let doubled: Vec<i32> = vector.iter().map(|value| value * 2).collect();
    /// assert_eq!(doubled, vec![2, 4, 6, 8]);
    /// assert_eq!(vector.iter().rev().next(), Some(&4));
    /// ```
    #[must_use]
    pub fn iter(&self) -> RrbIterator<'_, T> {
        RrbIterator::new(self)
    }

    /// Returns a bidirectional cursor positioned before the first element.
    #[must_use]
    pub fn cursor(&self) -> RrbCursor<'_, T> {
        RrbCursor::new(self, 0)
    }

    /// Returns a bidirectional cursor positioned before `index`.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::IndexOutOfBounds`] if `index > len()`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use strata::persistent::RrbVector;
    ///
    /// let vector: RrbVector<char> = "abc".chars().collect();
    /// let mut cursor = vector.cursor_at(3).unwrap();
    /// assert_eq!(cursor.previous(), Some(&'c'));
    /// assert_eq!(cursor.previous(), Some(&'b'));
    /// assert_eq!(cursor.next(), Some(&'b'));
    /// ```
    pub fn cursor_at(&self, index: usize) -> Result<RrbCursor<'_, T>, CollectionError> {
        if index > self.length {
            return Err(self.out_of_bounds(index));
        }
        Ok(RrbCursor::new(self, index))
    }

    const fn out_of_bounds(&self, index: usize) -> CollectionError {
        CollectionError::IndexOutOfBounds {
            index,
            length: self.length,
        }
    }
}

impl<T: Clone> RrbVector<T> {
    /// Creates a vector containing a single element.
    #[must_use]
    pub fn singleton(element: T) -> Self {
        Self {
            root: Node::empty(),
            focus: ReferenceCounter::from(vec![element]),
            focus_start: 0,
            length: 1,
        }
    }

    /// Returns the tree with the focus pushed into it.
    fn flushed_root(&self) -> Link<T> {
        node::push_focus(&self.root, self.focus_start, &self.focus)
    }

    /// Appends an element to the end of the vector.
    ///
    /// While the focus sits at the end and has room, only the focus is
    /// copied. Otherwise the focus is pushed into the tree and a new one
    /// starts with `element`.
    ///
    /// # Complexity
    ///
    /// Amortized O(1)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use strata::persistent::RrbVector;
    ///
    /// let vector = RrbVector::new().push_back(1);
    /// let extended = vector.push_back(2);
    /// assert_eq!(vector.len(), 1);
    /// assert_eq!(extended.last(), Some(&2));
    /// ```
    #[must_use]
    pub fn push_back(&self, element: T) -> Self {
        if self.focus_end() == self.length && self.focus.len() < STRICT_NODE_LENGTH {
            return Self {
                root: self.root.clone(),
                focus: array::insert_at(&self.focus, self.focus.len(), element).into(),
                focus_start: self.focus_start,
                length: self.length + 1,
            };
        }
        Self {
            root: self.flushed_root(),
            focus: ReferenceCounter::from(vec![element]),
            focus_start: self.length,
            length: self.length + 1,
        }
    }

    /// Inserts an element before `index`.
    ///
    /// Inserting at `len()` appends. Anywhere else the current focus is
    /// pushed into the tree and `element` becomes a new one-element focus.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::IndexOutOfBounds`] if `index > len()`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use strata::persistent::RrbVector;
    ///
    /// let vector: RrbVector<i32> = (0..5).collect();
    /// let inserted = vector.insert(0, -1).unwrap();
    /// assert_eq!(inserted.iter().copied().collect::<Vec<_>>(), vec![-1, 0, 1, 2, 3, 4]);
    /// assert!(vector.insert(6, 0).is_err());
    /// ```
    pub fn insert(&self, index: usize, element: T) -> Result<Self, CollectionError> {
        if index > self.length {
            return Err(self.out_of_bounds(index));
        }
        if index == self.length {
            return Ok(self.push_back(element));
        }
        Ok(Self {
            root: self.flushed_root(),
            focus: ReferenceCounter::from(vec![element]),
            focus_start: index,
            length: self.length + 1,
        })
    }

    /// Returns a vector with the element at `index` replaced.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::IndexOutOfBounds`] if `index >= len()`.
    pub fn replace(&self, index: usize, element: T) -> Result<Self, CollectionError> {
        if index >= self.length {
            return Err(self.out_of_bounds(index));
        }
        if (self.focus_start..self.focus_end()).contains(&index) {
            return Ok(Self {
                root: self.root.clone(),
                focus: array::replace_at(&self.focus, index - self.focus_start, element).into(),
                focus_start: self.focus_start,
                length: self.length,
            });
        }
        Ok(Self {
            root: node::replace(&self.root, self.tree_index(index), element),
            focus: self.focus.clone(),
            focus_start: self.focus_start,
            length: self.length,
        })
    }

    /// Splits the vector into the first `index` elements and the rest.
    ///
    /// If the cut falls inside the focus, each half keeps its part of the
    /// focus and the tree is cut at the focus boundary.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::IndexOutOfBounds`] unless
    /// `1 <= index <= len()`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use strata::persistent::RrbVector;
    ///
    /// let vector: RrbVector<i32> = (0..100).collect();
    /// let (left, right) = vector.split_at(40).unwrap();
    /// assert!(left.iter().copied().eq(0..40));
    /// assert!(right.iter().copied().eq(40..100));
    /// assert!(vector.split_at(0).is_err());
    /// ```
    pub fn split_at(&self, index: usize) -> Result<(Self, Self), CollectionError> {
        if index == 0 || index > self.length {
            return Err(self.out_of_bounds(index));
        }
        if (self.focus_start..=self.focus_end()).contains(&index) {
            let (tree_left, tree_right) = node::split_root(&self.root, self.focus_start);
            let (focus_left, focus_right) =
                array::split_at(&self.focus, index - self.focus_start);
            let left = Self {
                root: tree_left,
                focus: focus_left.into(),
                focus_start: self.focus_start,
                length: index,
            };
            let right = Self {
                root: tree_right,
                focus: focus_right.into(),
                focus_start: 0,
                length: self.length - index,
            };
            return Ok((left, right));
        }
        let (tree_left, tree_right) = node::split_root(&self.flushed_root(), index);
        Ok((
            Self::from_root(tree_left, index),
            Self::from_root(tree_right, self.length - index),
        ))
    }

    /// Concatenates two vectors.
    ///
    /// When either side holds fewer than 32 elements, its elements are
    /// replayed one by one onto the other side, which costs O(M) for the
    /// short side. Otherwise both trees are joined in O(log N).
    ///
    /// # Examples
    ///
    /// ```rust
    /// use strata::persistent::RrbVector;
    ///
    /// let left: RrbVector<i32> = (0..500).collect();
    /// let right: RrbVector<i32> = (500..1000).collect();
    /// let joined = left.join(&right);
    /// assert_eq!(joined.len(), 1000);
    /// assert!(joined.iter().copied().eq(0..1000));
    /// ```
    #[must_use]
    pub fn join(&self, other: &Self) -> Self {
        if other.is_empty() {
            return self.clone();
        }
        if self.is_empty() {
            return other.clone();
        }
        if other.length < STRICT_NODE_LENGTH {
            let mut builder = Builder::from_vector(self);
            for element in other {
                builder.push_back(element.clone());
            }
            return builder.finish();
        }
        if self.length < STRICT_NODE_LENGTH {
            let mut builder = Builder::from_vector(other);
            for (index, element) in self.iter().enumerate() {
                builder.insert(index, element.clone());
            }
            return builder.finish();
        }
        let root = node::join_roots(&self.flushed_root(), &other.flushed_root());
        Self::from_root(root, self.length + other.length)
    }

    /// Returns a vector without the element at `index`.
    ///
    /// The vector is split around the element and the two remaining parts
    /// are joined again.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::IndexOutOfBounds`] if `index >= len()`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use strata::persistent::RrbVector;
    ///
    /// let vector: RrbVector<i32> = (0..5).collect();
    /// let removed = vector.remove(2).unwrap();
    /// assert_eq!(removed.iter().copied().collect::<Vec<_>>(), vec![0, 1, 3, 4]);
    /// ```
    pub fn remove(&self, index: usize) -> Result<Self, CollectionError> {
        if index >= self.length {
            return Err(self.out_of_bounds(index));
        }
        if index == 0 {
            return self.split_at(1).map(|(_, rest)| rest);
        }
        let (left, right) = self.split_at(index)?;
        let (_, rest) = right.split_at(1)?;
        Ok(left.join(&rest))
    }

    /// Returns a transient copy for batch edits.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use strata::persistent::RrbVector;
    ///
    /// let vector: RrbVector<i32> = (0..3).collect();
    /// let mut transient = vector.transient();
    /// transient.push_back(3).unwrap();
    /// transient.insert(0, -1).unwrap();
    /// let updated = transient.persistent().unwrap();
    /// assert_eq!(updated.iter().copied().collect::<Vec<_>>(), vec![-1, 0, 1, 2, 3]);
    /// assert_eq!(vector.len(), 3);
    /// ```
    #[must_use]
    pub fn transient(&self) -> TransientRrbVector<T> {
        TransientRrbVector::from_builder(Builder::from_vector(self))
    }

    /// Checks the tree shape and the focus bounds.
    #[cfg(test)]
    pub(crate) fn check_invariants(&self) {
        let tree_size = node::check_node(&self.root, true);
        assert_eq!(tree_size + self.focus.len(), self.length, "length mismatch");
        assert!(self.focus.len() <= STRICT_NODE_LENGTH, "oversized focus");
        assert!(self.focus_start <= tree_size, "focus outside the tree");
        let height = self.root.height();
        assert!(
            height <= node::height_bound(tree_size),
            "tree of {tree_size} elements is {height} levels tall"
        );
    }
}

// =============================================================================
// Standard Trait Implementations
// =============================================================================

impl<T> Default for RrbVector<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> FromIterator<T> for RrbVector<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut builder = Builder::new();
        for element in iter {
            builder.push_back(element);
        }
        builder.finish()
    }
}

impl<T: Clone> IntoIterator for RrbVector<T> {
    type Item = T;
    type IntoIter = RrbIntoIterator<T>;

    fn into_iter(self) -> Self::IntoIter {
        RrbIntoIterator::new(self)
    }
}

impl<'a, T> IntoIterator for &'a RrbVector<T> {
    type Item = &'a T;
    type IntoIter = RrbIterator<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T> Index<usize> for RrbVector<T> {
    type Output = T;

    fn index(&self, index: usize) -> &Self::Output {
        match self.get(index) {
            Some(element) => element,
            None => panic!(
                "index {index} is out of bounds for RrbVector of length {}",
                self.length
            ),
        }
    }
}

impl<T: PartialEq> PartialEq for RrbVector<T> {
    fn eq(&self, other: &Self) -> bool {
        self.length == other.length && self.iter().eq(other.iter())
    }
}

impl<T: Eq> Eq for RrbVector<T> {}

impl<T: Hash> Hash for RrbVector<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.length.hash(state);
        for element in self {
            element.hash(state);
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for RrbVector<T> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_list().entries(self.iter()).finish()
    }
}

impl<T: fmt::Display> fmt::Display for RrbVector<T> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "[")?;
        for (index, element) in self.iter().enumerate() {
            if index > 0 {
                write!(formatter, ", ")?;
            }
            write!(formatter, "{element}")?;
        }
        write!(formatter, "]")
    }
}

// =============================================================================
// Serde Support
// =============================================================================

#[cfg(feature = "serde")]
impl<T: serde::Serialize> serde::Serialize for RrbVector<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeSeq;
        let mut sequence = serializer.serialize_seq(Some(self.len()))?;
        for element in self {
            sequence.serialize_element(element)?;
        }
        sequence.end()
    }
}

#[cfg(feature = "serde")]
struct RrbVectorVisitor<T> {
    marker: std::marker::PhantomData<T>,
}

#[cfg(feature = "serde")]
impl<T> RrbVectorVisitor<T> {
    const fn new() -> Self {
        Self {
            marker: std::marker::PhantomData,
        }
    }
}

#[cfg(feature = "serde")]
impl<'de, T> serde::de::Visitor<'de> for RrbVectorVisitor<T>
where
    T: serde::Deserialize<'de> + Clone,
{
    type Value = RrbVector<T>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a sequence")
    }

    fn visit_seq<A>(self, mut access: A) -> Result<Self::Value, A::Error>
    where
        A: serde::de::SeqAccess<'de>,
    {
        let mut builder = Builder::new();
        while let Some(element) = access.next_element()? {
            builder.push_back(element);
        }
        Ok(builder.finish())
    }
}

#[cfg(feature = "serde")]
impl<'de, T> serde::Deserialize<'de> for RrbVector<T>
where
    T: serde::Deserialize<'de> + Clone,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_seq(RrbVectorVisitor::new())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    fn contents(vector: &RrbVector<i32>) -> Vec<i32> {
        vector.iter().copied().collect()
    }

    #[rstest]
    fn test_constants() {
        assert_eq!(STRICT_NODE_LENGTH, 32);
        assert_eq!(MIN_NODE_LENGTH, 22);
        assert_eq!(MAX_NODE_LENGTH, 44);
    }

    #[rstest]
    fn test_split_forty_then_join() {
        let vector: RrbVector<i32> = (0..100).collect();
        let (left, right) = vector.split_at(40).unwrap();
        left.check_invariants();
        right.check_invariants();
        assert_eq!(contents(&left), (0..40).collect::<Vec<_>>());
        assert_eq!(contents(&right), (40..100).collect::<Vec<_>>());
        let joined = left.join(&right);
        joined.check_invariants();
        assert_eq!(contents(&joined), (0..100).collect::<Vec<_>>());
    }

    #[rstest]
    fn test_push_back_grows_focus_until_full() {
        let vector: RrbVector<i32> = (0..31).fold(RrbVector::new(), |vector, value| {
            vector.push_back(value)
        });
        assert_eq!(vector.focus.len(), 31);
        let full = vector.push_back(31);
        assert_eq!(full.focus.len(), 32);
        assert!(ReferenceCounter::ptr_eq(&full.root, &vector.root));
        let flushed = full.push_back(32);
        assert_eq!(flushed.focus.len(), 1);
        assert_eq!(flushed.focus_start, 32);
        flushed.check_invariants();
    }

    #[rstest]
    fn test_insert_starts_one_element_focus() {
        let vector: RrbVector<i32> = (0..200).collect();
        let inserted = vector.insert(70, -1).unwrap();
        assert_eq!(inserted.focus.len(), 1);
        assert_eq!(inserted.focus_start, 70);
        let again = inserted.insert(71, -2).unwrap();
        assert_eq!(again.focus.len(), 1);
        again.check_invariants();
        assert_eq!(&contents(&again)[68..74], &[68, 69, -1, -2, 70, 71]);
    }

    #[rstest]
    #[case(0)]
    #[case(1)]
    #[case(31)]
    #[case(32)]
    #[case(1000)]
    fn test_split_at_rejects_out_of_range(#[case] length: usize) {
        let vector: RrbVector<usize> = (0..length).collect();
        assert_eq!(
            vector.split_at(0),
            Err(CollectionError::IndexOutOfBounds { index: 0, length })
        );
        assert!(vector.split_at(length + 1).is_err());
        if length > 0 {
            let (left, right) = vector.split_at(length).unwrap();
            assert_eq!(left.len(), length);
            assert!(right.is_empty());
        }
    }

    #[rstest]
    fn test_split_inside_focus_keeps_focus_parts() {
        let vector: RrbVector<i32> = (0..100).collect();
        let (left, right) = vector.split_at(98).unwrap();
        assert_eq!(left.focus.len(), 2);
        assert_eq!(right.focus.len(), 2);
        assert_eq!(contents(&right), vec![98, 99]);
        left.check_invariants();
        right.check_invariants();
    }

    #[rstest]
    fn test_join_with_short_side_replays_elements() {
        // Joining a side shorter than one node width costs O(short side)
        // instead of O(log N).
        let long: RrbVector<i32> = (0..1000).collect();
        let short: RrbVector<i32> = (1000..1010).collect();
        let appended = long.join(&short);
        appended.check_invariants();
        assert!(appended.iter().copied().eq(0..1010));
        let prepended = short.join(&long);
        prepended.check_invariants();
        assert!(prepended.iter().copied().eq((1000..1010).chain(0..1000)));
    }

    #[rstest]
    fn test_remove_every_position_of_small_vector() {
        let vector: RrbVector<i32> = (0..70).collect();
        for index in 0..70 {
            let removed = vector.remove(index).unwrap();
            removed.check_invariants();
            let expected: Vec<i32> = (0..70).filter(|&value| value != index as i32).collect();
            assert_eq!(contents(&removed), expected);
        }
        assert!(vector.remove(70).is_err());
    }

    #[rstest]
    fn test_replace_inside_and_outside_focus() {
        let vector: RrbVector<i32> = (0..100).collect();
        let in_focus = vector.replace(99, -1).unwrap();
        let in_tree = vector.replace(5, -5).unwrap();
        assert_eq!(in_focus.get(99), Some(&-1));
        assert_eq!(in_tree.get(5), Some(&-5));
        assert_eq!(vector.get(5), Some(&5));
        assert_eq!(vector.get(99), Some(&99));
    }

    #[rstest]
    fn test_chunks_around_inner_focus() {
        let vector: RrbVector<i32> = (0..64).collect();
        let inserted = vector.insert(10, -1).unwrap();
        assert_eq!(inserted.chunk_at(3), (&[0, 1, 2, 3, 4, 5, 6, 7, 8, 9][..], 0));
        assert_eq!(inserted.chunk_at(10), (&[-1][..], 10));
        let (chunk, start) = inserted.chunk_at(11);
        assert_eq!(start, 11);
        assert_eq!(chunk[0], 10);
    }

    #[rstest]
    #[should_panic(expected = "out of bounds")]
    fn test_index_out_of_bounds_panics() {
        let vector: RrbVector<i32> = (0..3).collect();
        let _ = vector[3];
    }

    #[rstest]
    fn test_display_and_debug() {
        let vector: RrbVector<i32> = (1..=3).collect();
        assert_eq!(format!("{vector}"), "[1, 2, 3]");
        assert_eq!(format!("{vector:?}"), "[1, 2, 3]");
    }

    #[derive(Debug, Clone)]
    enum Edit {
        Push(i32),
        Insert(usize, i32),
        Replace(usize, i32),
        Remove(usize),
        SplitJoin(usize),
    }

    fn edit() -> impl Strategy<Value = Edit> {
        prop_oneof![
            any::<i32>().prop_map(Edit::Push),
            (any::<usize>(), any::<i32>()).prop_map(|(index, value)| Edit::Insert(index, value)),
            (any::<usize>(), any::<i32>()).prop_map(|(index, value)| Edit::Replace(index, value)),
            any::<usize>().prop_map(Edit::Remove),
            any::<usize>().prop_map(Edit::SplitJoin),
        ]
    }

    proptest! {
        #[test]
        fn prop_edits_match_vec_model(
            initial in 0_usize..2000,
            edits in prop::collection::vec(edit(), 1..60)
        ) {
            let mut vector: RrbVector<i32> = (0..initial as i32).collect();
            let mut model: Vec<i32> = (0..initial as i32).collect();
            for edit in edits {
                match edit {
                    Edit::Push(value) => {
                        vector = vector.push_back(value);
                        model.push(value);
                    }
                    Edit::Insert(seed, value) => {
                        let index = seed % (model.len() + 1);
                        vector = vector.insert(index, value).unwrap();
                        model.insert(index, value);
                    }
                    Edit::Replace(seed, value) if !model.is_empty() => {
                        let index = seed % model.len();
                        vector = vector.replace(index, value).unwrap();
                        model[index] = value;
                    }
                    Edit::Remove(seed) if !model.is_empty() => {
                        let index = seed % model.len();
                        vector = vector.remove(index).unwrap();
                        model.remove(index);
                    }
                    Edit::SplitJoin(seed) if !model.is_empty() => {
                        let index = seed % model.len() + 1;
                        let (left, right) = vector.split_at(index).unwrap();
                        vector = left.join(&right);
                    }
                    _ => {}
                }
                vector.check_invariants();
            }
            prop_assert_eq!(vector.len(), model.len());
            prop_assert_eq!(contents(&vector), model);
        }

        #[test]
        fn prop_split_join_round_trip(length in 1_usize..3000, seed in any::<usize>()) {
            let vector: RrbVector<usize> = (0..length).collect();
            let index = seed % length + 1;
            let (left, right) = vector.split_at(index).unwrap();
            left.check_invariants();
            right.check_invariants();
            prop_assert!(left.iter().copied().eq(0..index));
            prop_assert!(right.iter().copied().eq(index..length));
            let joined = left.join(&right);
            joined.check_invariants();
            prop_assert_eq!(joined, vector);
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(8))]

        #[test]
        fn prop_long_reshaping_keeps_height_logarithmic(
            length in 10_000_i32..12_000,
            steps in prop::collection::vec((0_u8..3, any::<usize>()), 2000..2500)
        ) {
            let mut vector: RrbVector<i32> = (0..length).collect();
            let mut model: Vec<i32> = (0..length).collect();
            for (kind, seed) in steps {
                let index = seed % model.len();
                match kind {
                    0 => {
                        vector = vector.remove(index).unwrap();
                        model.remove(index);
                    }
                    1 => {
                        let (left, right) = vector.split_at(index + 1).unwrap();
                        vector = left.join(&right);
                    }
                    _ => {
                        let (left, right) = vector.split_at(index + 1).unwrap();
                        vector = right.join(&left);
                        model.rotate_left(index + 1);
                    }
                }
                vector.check_invariants();
            }
            prop_assert_eq!(contents(&vector), model);
        }
    }
}
