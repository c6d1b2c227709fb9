//! Single-owner builder for [`RrbVector`].
//!
//! The transient keeps its focus in a growable `Vec`, so appends and inserts
//! next to the previous edit happen in place. Tree nodes stay shared with
//! the vectors they came from and are only ever path-copied.

use std::marker::PhantomData;

use super::node::{self, Link, Node};
use super::{RrbVector, STRICT_NODE_LENGTH};
use crate::CollectionError;

/// Mutable state behind [`TransientRrbVector`], also used internally to
/// build vectors in bulk.
pub(super) struct Builder<T> {
    root: Link<T>,
    focus: Vec<T>,
    focus_start: usize,
    length: usize,
}

impl<T> Builder<T> {
    fn focus_end(&self) -> usize {
        self.focus_start + self.focus.len()
    }

    fn get(&self, index: usize) -> Option<&T> {
        if index >= self.length {
            return None;
        }
        if (self.focus_start..self.focus_end()).contains(&index) {
            return self.focus.get(index - self.focus_start);
        }
        let tree_index = if index < self.focus_start {
            index
        } else {
            index - self.focus.len()
        };
        self.root.get(tree_index)
    }
}

impl<T: Clone> Builder<T> {
    pub(super) fn new() -> Self {
        Self {
            root: Node::empty(),
            focus: Vec::with_capacity(STRICT_NODE_LENGTH),
            focus_start: 0,
            length: 0,
        }
    }

    pub(super) fn from_vector(vector: &RrbVector<T>) -> Self {
        Self {
            root: vector.root.clone(),
            focus: vector.focus.to_vec(),
            focus_start: vector.focus_start,
            length: vector.length,
        }
    }

    pub(super) fn finish(self) -> RrbVector<T> {
        RrbVector {
            root: self.root,
            focus: self.focus.into(),
            focus_start: self.focus_start,
            length: self.length,
        }
    }

    /// Pushes the focus into the tree and leaves it empty.
    fn flush(&mut self) {
        self.root = node::push_focus(&self.root, self.focus_start, &self.focus);
        self.focus.clear();
    }

    pub(super) fn push_back(&mut self, element: T) {
        if self.focus_end() != self.length || self.focus.len() >= STRICT_NODE_LENGTH {
            self.flush();
            self.focus_start = self.length;
        }
        self.focus.push(element);
        self.length += 1;
    }

    /// Inserts before `index`; the caller guarantees `index <= length`.
    pub(super) fn insert(&mut self, index: usize, element: T) {
        debug_assert!(index <= self.length);
        if index == self.length {
            self.push_back(element);
            return;
        }
        let inside = (self.focus_start..=self.focus_end()).contains(&index);
        if inside && self.focus.len() < STRICT_NODE_LENGTH {
            self.focus.insert(index - self.focus_start, element);
        } else {
            self.flush();
            self.focus_start = index;
            self.focus.push(element);
        }
        self.length += 1;
    }

    /// Replaces the element at `index`; the caller guarantees
    /// `index < length`.
    fn replace(&mut self, index: usize, element: T) -> T {
        debug_assert!(index < self.length);
        if (self.focus_start..self.focus_end()).contains(&index) {
            return std::mem::replace(&mut self.focus[index - self.focus_start], element);
        }
        let tree_index = if index < self.focus_start {
            index
        } else {
            index - self.focus.len()
        };
        let previous = self.root.get(tree_index).cloned();
        self.root = node::replace(&self.root, tree_index, element);
        match previous {
            Some(previous) => previous,
            None => unreachable!("bounds were checked by the caller"),
        }
    }
}

// =============================================================================
// TransientRrbVector Definition
// =============================================================================

/// A mutable, single-owner builder for [`RrbVector`].
///
/// Edits next to the previous one extend the focus in place. Calling
/// [`persistent`](Self::persistent) finalizes the transient; every later
/// call fails with [`CollectionError::TransientFinalized`].
///
/// A transient is neither `Send` nor `Sync`.
///
/// # Examples
///
/// ```rust
/// use strata::persistent::TransientRrbVector;
///
/// let mut transient = TransientRrbVector::new();
/// transient.push_back_all(0..100).unwrap();
/// transient.insert(50, -1).unwrap();
/// transient.insert(51, -2).unwrap();
/// let vector = transient.persistent().unwrap();
///
/// assert_eq!(vector.len(), 102);
/// assert_eq!(vector.get(51), Some(&-2));
/// assert!(transient.push_back(0).is_err());
/// ```
pub struct TransientRrbVector<T> {
    builder: Option<Builder<T>>,
    _marker: PhantomData<std::rc::Rc<()>>,
}

static_assertions::assert_not_impl_any!(TransientRrbVector<i32>: Send, Sync);

impl<T> TransientRrbVector<T> {
    const NAME: &'static str = "TransientRrbVector";

    pub(super) const fn from_builder(builder: Builder<T>) -> Self {
        Self {
            builder: Some(builder),
            _marker: PhantomData,
        }
    }

    fn builder(&self) -> Result<&Builder<T>, CollectionError> {
        self.builder
            .as_ref()
            .ok_or(CollectionError::TransientFinalized {
                collection: Self::NAME,
            })
    }

    fn builder_mut(&mut self) -> Result<&mut Builder<T>, CollectionError> {
        self.builder
            .as_mut()
            .ok_or(CollectionError::TransientFinalized {
                collection: Self::NAME,
            })
    }

    /// Returns the number of elements.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::TransientFinalized`] after `persistent()`.
    pub fn len(&self) -> Result<usize, CollectionError> {
        self.builder().map(|builder| builder.length)
    }

    /// Returns `true` if the transient holds no elements.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::TransientFinalized`] after `persistent()`.
    pub fn is_empty(&self) -> Result<bool, CollectionError> {
        self.builder().map(|builder| builder.length == 0)
    }

    /// Returns a reference to the element at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::TransientFinalized`] after `persistent()`.
    pub fn get(&self, index: usize) -> Result<Option<&T>, CollectionError> {
        self.builder().map(|builder| builder.get(index))
    }
}

impl<T: Clone> TransientRrbVector<T> {
    /// Creates an empty transient.
    #[must_use]
    pub fn new() -> Self {
        Self::from_builder(Builder::new())
    }

    /// Appends an element.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::TransientFinalized`] after `persistent()`.
    pub fn push_back(&mut self, element: T) -> Result<(), CollectionError> {
        self.builder_mut()?.push_back(element);
        Ok(())
    }

    /// Appends every element of `elements`.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::TransientFinalized`] after `persistent()`;
    /// nothing is consumed in that case.
    pub fn push_back_all<I>(&mut self, elements: I) -> Result<(), CollectionError>
    where
        I: IntoIterator<Item = T>,
    {
        let builder = self.builder_mut()?;
        for element in elements {
            builder.push_back(element);
        }
        Ok(())
    }

    /// Inserts an element before `index`.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::TransientFinalized`] after `persistent()`
    /// and [`CollectionError::IndexOutOfBounds`] if `index > len()`.
    pub fn insert(&mut self, index: usize, element: T) -> Result<(), CollectionError> {
        let builder = self.builder_mut()?;
        if index > builder.length {
            return Err(CollectionError::IndexOutOfBounds {
                index,
                length: builder.length,
            });
        }
        builder.insert(index, element);
        Ok(())
    }

    /// Replaces the element at `index` and returns the previous one.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::TransientFinalized`] after `persistent()`
    /// and [`CollectionError::IndexOutOfBounds`] if `index >= len()`.
    pub fn replace(&mut self, index: usize, element: T) -> Result<T, CollectionError> {
        let builder = self.builder_mut()?;
        if index >= builder.length {
            return Err(CollectionError::IndexOutOfBounds {
                index,
                length: builder.length,
            });
        }
        Ok(builder.replace(index, element))
    }

    /// Finalizes the transient and returns the persistent vector.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::TransientFinalized`] if called twice.
    pub fn persistent(&mut self) -> Result<RrbVector<T>, CollectionError> {
        self.builder
            .take()
            .map(Builder::finish)
            .ok_or(CollectionError::TransientFinalized {
                collection: Self::NAME,
            })
    }
}

impl<T: Clone> Default for TransientRrbVector<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn test_inserts_next_to_each_other_share_the_focus() {
        let vector: RrbVector<i32> = (0..200).collect();
        let mut transient = vector.transient();
        for (offset, value) in (0_usize..10).zip(0_i32..) {
            transient.insert(100 + offset, -value).unwrap();
        }
        let builder = transient.builder().unwrap();
        assert_eq!(builder.focus_start, 100);
        assert_eq!(builder.focus.len(), 10);
        let result = transient.persistent().unwrap();
        result.check_invariants();
        assert_eq!(result.get(105), Some(&-5));
        assert_eq!(result.get(110), Some(&100));
        assert_eq!(vector.get(105), Some(&105));
    }

    #[rstest]
    fn test_focus_is_flushed_when_full() {
        let mut transient = TransientRrbVector::new();
        transient.push_back_all(0..STRICT_NODE_LENGTH).unwrap();
        assert_eq!(transient.builder().unwrap().focus.len(), STRICT_NODE_LENGTH);
        transient.push_back(STRICT_NODE_LENGTH).unwrap();
        let builder = transient.builder().unwrap();
        assert_eq!(builder.focus.len(), 1);
        assert_eq!(builder.root.size(), STRICT_NODE_LENGTH);
    }

    #[rstest]
    fn test_replace_returns_previous() {
        let vector: RrbVector<i32> = (0..100).collect();
        let mut transient = vector.transient();
        assert_eq!(transient.replace(3, -3), Ok(3));
        assert_eq!(transient.replace(99, -99), Ok(99));
        assert_eq!(
            transient.replace(100, 0),
            Err(CollectionError::IndexOutOfBounds {
                index: 100,
                length: 100
            })
        );
        let result = transient.persistent().unwrap();
        assert_eq!(result.get(3), Some(&-3));
        assert_eq!(vector.get(3), Some(&3));
    }

    #[rstest]
    fn test_every_call_fails_after_persistent() {
        let mut transient: TransientRrbVector<i32> = TransientRrbVector::new();
        transient.push_back(1).unwrap();
        transient.persistent().unwrap();
        let finalized = CollectionError::TransientFinalized {
            collection: "TransientRrbVector",
        };
        assert_eq!(transient.len(), Err(finalized.clone()));
        assert_eq!(transient.is_empty(), Err(finalized.clone()));
        assert_eq!(transient.get(0), Err(finalized.clone()));
        assert_eq!(transient.push_back(2), Err(finalized.clone()));
        assert_eq!(transient.insert(0, 2), Err(finalized.clone()));
        assert_eq!(transient.replace(0, 2), Err(finalized.clone()));
        assert_eq!(transient.push_back_all([1, 2]), Err(finalized.clone()));
        assert!(transient.persistent().is_err());
    }
}
