//! Copy-on-write slice surgery shared by the tree engines.
//!
//! Every helper reads its input and returns a freshly allocated vector.
//! Index preconditions are the caller's responsibility.

/// Returns a copy of `slice` with `item` inserted before `index`.
pub(crate) fn insert_at<T: Clone>(slice: &[T], index: usize, item: T) -> Vec<T> {
    debug_assert!(index <= slice.len());
    let mut result = Vec::with_capacity(slice.len() + 1);
    result.extend_from_slice(&slice[..index]);
    result.push(item);
    result.extend_from_slice(&slice[index..]);
    result
}

/// Returns a copy of `slice` with `items` inserted before `index`.
pub(crate) fn insert_slice_at<T: Clone>(slice: &[T], index: usize, items: &[T]) -> Vec<T> {
    splice(slice, index, 0, items)
}

/// Returns a copy of `slice` with the element at `index` replaced.
pub(crate) fn replace_at<T: Clone>(slice: &[T], index: usize, item: T) -> Vec<T> {
    debug_assert!(index < slice.len());
    let mut result = slice.to_vec();
    result[index] = item;
    result
}

/// Copies `slice` into two vectors split before `index`.
pub(crate) fn split_at<T: Clone>(slice: &[T], index: usize) -> (Vec<T>, Vec<T>) {
    debug_assert!(index <= slice.len());
    (slice[..index].to_vec(), slice[index..].to_vec())
}

/// Concatenates two slices into one vector.
pub(crate) fn concat<T: Clone>(left: &[T], right: &[T]) -> Vec<T> {
    let mut result = Vec::with_capacity(left.len() + right.len());
    result.extend_from_slice(left);
    result.extend_from_slice(right);
    result
}

/// Replaces `delete_count` elements starting at `index` with `items`.
pub(crate) fn splice<T: Clone>(
    slice: &[T],
    index: usize,
    delete_count: usize,
    items: &[T],
) -> Vec<T> {
    debug_assert!(index + delete_count <= slice.len());
    let mut result = Vec::with_capacity(slice.len() - delete_count + items.len());
    result.extend_from_slice(&slice[..index]);
    result.extend_from_slice(items);
    result.extend_from_slice(&slice[index + delete_count..]);
    result
}
