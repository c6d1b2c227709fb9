//! Iterators over [`RrbVector`].
//!
//! Both the borrowed iterator and the cursor read the vector one stored
//! run at a time (a leaf slice or the focus), so a step costs O(1) except
//! when crossing into the next run.

use super::RrbVector;

type Chunk<'a, T> = (&'a [T], usize);

/// Returns the element at `index`, refreshing `chunk` if it does not cover
/// that index.
fn element<'a, T>(vector: &'a RrbVector<T>, chunk: &mut Chunk<'a, T>, index: usize) -> &'a T {
    let (values, start) = *chunk;
    if index < start || index >= start + values.len() {
        *chunk = vector.chunk_at(index);
    }
    let (values, start) = *chunk;
    &values[index - start]
}

// =============================================================================
// RrbIterator
// =============================================================================

/// A double-ended iterator over the elements of an [`RrbVector`].
///
/// # Examples
///
/// ```rust
/// use strata::persistent::RrbVector;
///
/// let vector: RrbVector<i32> = (0..5).collect();
/// let mut iterator = vector.iter();
/// assert_eq!(iterator.next(), Some(&0));
/// assert_eq!(iterator.next_back(), Some(&4));
/// assert_eq!(iterator.len(), 3);
/// ```
pub struct RrbIterator<'a, T> {
    vector: &'a RrbVector<T>,
    front: usize,
    back: usize,
    front_chunk: Chunk<'a, T>,
    back_chunk: Chunk<'a, T>,
}

impl<'a, T> RrbIterator<'a, T> {
    pub(super) fn new(vector: &'a RrbVector<T>) -> Self {
        Self {
            vector,
            front: 0,
            back: vector.len(),
            front_chunk: (<&[T]>::default(), 0),
            back_chunk: (<&[T]>::default(), 0),
        }
    }
}

impl<'a, T> Iterator for RrbIterator<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        if self.front >= self.back {
            return None;
        }
        let item = element(self.vector, &mut self.front_chunk, self.front);
        self.front += 1;
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.back - self.front;
        (remaining, Some(remaining))
    }
}

impl<T> DoubleEndedIterator for RrbIterator<'_, T> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.front >= self.back {
            return None;
        }
        self.back -= 1;
        Some(element(self.vector, &mut self.back_chunk, self.back))
    }
}

impl<T> ExactSizeIterator for RrbIterator<'_, T> {
    fn len(&self) -> usize {
        self.back - self.front
    }
}

impl<T> std::iter::FusedIterator for RrbIterator<'_, T> {}

// =============================================================================
// RrbCursor
// =============================================================================

/// A bidirectional positional iterator over an [`RrbVector`].
///
/// The cursor sits between two elements: [`next`](Iterator::next) returns
/// the element after it and moves forward, [`previous`](Self::previous)
/// returns the element before it and moves back.
///
/// # Examples
///
/// ```rust
/// use strata::persistent::RrbVector;
///
/// let vector: RrbVector<i32> = (10..13).collect();
/// let mut cursor = vector.cursor();
/// assert!(!cursor.has_previous());
/// assert_eq!(cursor.next(), Some(&10));
/// assert_eq!(cursor.next(), Some(&11));
/// assert_eq!(cursor.next_index(), 2);
/// assert_eq!(cursor.previous(), Some(&11));
/// assert_eq!(cursor.previous_index(), Some(0));
/// ```
pub struct RrbCursor<'a, T> {
    vector: &'a RrbVector<T>,
    position: usize,
    chunk: Chunk<'a, T>,
}

impl<'a, T> RrbCursor<'a, T> {
    pub(super) fn new(vector: &'a RrbVector<T>, position: usize) -> Self {
        Self {
            vector,
            position,
            chunk: (<&[T]>::default(), 0),
        }
    }

    /// Returns `true` if an element follows the cursor.
    #[must_use]
    pub fn has_next(&self) -> bool {
        self.position < self.vector.len()
    }

    /// Returns `true` if an element precedes the cursor.
    #[must_use]
    pub const fn has_previous(&self) -> bool {
        self.position > 0
    }

    /// Index of the element that [`next`](Iterator::next) would return.
    #[must_use]
    pub const fn next_index(&self) -> usize {
        self.position
    }

    /// Index of the element that [`previous`](Self::previous) would return.
    #[must_use]
    pub const fn previous_index(&self) -> Option<usize> {
        self.position.checked_sub(1)
    }

    /// Returns the element before the cursor and moves the cursor back.
    pub fn previous(&mut self) -> Option<&'a T> {
        if self.position == 0 {
            return None;
        }
        self.position -= 1;
        Some(element(self.vector, &mut self.chunk, self.position))
    }
}

impl<'a, T> Iterator for RrbCursor<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.has_next() {
            return None;
        }
        let item = element(self.vector, &mut self.chunk, self.position);
        self.position += 1;
        Some(item)
    }
}

// =============================================================================
// RrbIntoIterator
// =============================================================================

/// An owning iterator over the elements of an [`RrbVector`].
///
/// Each end clones one stored run at a time out of the vector, so the
/// elements are never copied into a single buffer up front.
pub struct RrbIntoIterator<T> {
    vector: RrbVector<T>,
    /// First index not yet taken by the front run.
    front: usize,
    /// One past the last index not yet taken by the back run.
    back: usize,
    front_run: std::vec::IntoIter<T>,
    back_run: std::vec::IntoIter<T>,
}

impl<T> RrbIntoIterator<T> {
    pub(super) fn new(vector: RrbVector<T>) -> Self {
        let back = vector.len();
        Self {
            vector,
            front: 0,
            back,
            front_run: Vec::new().into_iter(),
            back_run: Vec::new().into_iter(),
        }
    }
}

impl<T: Clone> Iterator for RrbIntoIterator<T> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(element) = self.front_run.next() {
                return Some(element);
            }
            if self.front >= self.back {
                return self.back_run.next();
            }
            let (values, start) = self.vector.chunk_at(self.front);
            let end = (start + values.len()).min(self.back);
            self.front_run = values[self.front - start..end - start].to_vec().into_iter();
            self.front = end;
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.front_run.len() + (self.back - self.front) + self.back_run.len();
        (remaining, Some(remaining))
    }
}

impl<T: Clone> DoubleEndedIterator for RrbIntoIterator<T> {
    fn next_back(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(element) = self.back_run.next_back() {
                return Some(element);
            }
            if self.front >= self.back {
                return self.front_run.next_back();
            }
            let (values, start) = self.vector.chunk_at(self.back - 1);
            let begin = start.max(self.front);
            self.back_run = values[begin - start..self.back - start].to_vec().into_iter();
            self.back = begin;
        }
    }
}

impl<T: Clone> ExactSizeIterator for RrbIntoIterator<T> {}

impl<T: Clone> std::iter::FusedIterator for RrbIntoIterator<T> {}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn fragmented() -> RrbVector<i32> {
        let vector: RrbVector<i32> = (0..300).collect();
        let vector = vector.insert(150, -1).unwrap();
        let (left, right) = vector.split_at(77).unwrap();
        left.join(&right).insert(200, -2).unwrap()
    }

    #[rstest]
    fn test_iter_matches_get() {
        let vector = fragmented();
        let by_index: Vec<i32> = (0..vector.len()).map(|index| vector[index]).collect();
        let iterated: Vec<i32> = vector.iter().copied().collect();
        assert_eq!(iterated, by_index);
    }

    #[rstest]
    fn test_reverse_iteration() {
        let vector = fragmented();
        let mut forward: Vec<i32> = vector.iter().copied().collect();
        forward.reverse();
        let backward: Vec<i32> = vector.iter().rev().copied().collect();
        assert_eq!(backward, forward);
    }

    #[rstest]
    fn test_ends_meet() {
        let vector: RrbVector<i32> = (0..3).collect();
        let mut iterator = vector.iter();
        assert_eq!(iterator.next_back(), Some(&2));
        assert_eq!(iterator.next(), Some(&0));
        assert_eq!(iterator.next(), Some(&1));
        assert_eq!(iterator.next(), None);
        assert_eq!(iterator.next_back(), None);
    }

    #[rstest]
    fn test_cursor_walks_both_ways() {
        let vector = fragmented();
        let mut cursor = vector.cursor();
        let forward: Vec<i32> = cursor.by_ref().copied().collect();
        assert!(!cursor.has_next());
        assert_eq!(cursor.next_index(), vector.len());
        let mut backward = Vec::new();
        while let Some(value) = cursor.previous() {
            backward.push(*value);
        }
        backward.reverse();
        assert_eq!(backward, forward);
        assert_eq!(cursor.previous_index(), None);
    }

    #[rstest]
    fn test_cursor_at_bounds() {
        let vector: RrbVector<i32> = (0..3).collect();
        assert!(vector.cursor_at(3).is_ok());
        assert!(vector.cursor_at(4).is_err());
    }

    #[rstest]
    fn test_into_iter_meets_in_the_middle() {
        let vector = fragmented();
        let expected: Vec<i32> = vector.iter().copied().collect();
        let mut iterator = vector.into_iter();
        assert_eq!(iterator.len(), expected.len());
        let mut front = Vec::new();
        let mut back = Vec::new();
        while let Some(value) = iterator.next() {
            front.push(value);
            if let Some(value) = iterator.next_back() {
                back.push(value);
            }
        }
        assert_eq!(iterator.len(), 0);
        back.reverse();
        front.extend(back);
        assert_eq!(front, expected);
    }

    #[rstest]
    fn test_into_iter_owned() {
        let vector: RrbVector<String> = ["a", "b"].into_iter().map(String::from).collect();
        let owned: Vec<String> = vector.into_iter().rev().collect();
        assert_eq!(owned, vec!["b".to_string(), "a".to_string()]);
    }
}
