//! Tree nodes of the relaxed radix balanced vector.
//!
//! A tree is built from three node kinds:
//!
//! - `Leaf`: between 1 and [`MAX_NODE_LENGTH`] elements (only an empty
//!   tree's root leaf holds none)
//! - `Strict`: up to [`STRICT_NODE_LENGTH`] children where every child but
//!   the last is completely full, so a child is found by bit shifting
//! - `Relaxed`: up to [`MAX_NODE_LENGTH`] children of any size, located
//!   through a cumulative size table
//!
//! All leaves sit at the same depth. Every function here reads its input
//! nodes and returns new ones; nothing is mutated after construction.

use super::{MAX_NODE_LENGTH, MIN_NODE_LENGTH, NODE_LENGTH_POW_2, STRICT_NODE_LENGTH};
use crate::persistent::ReferenceCounter;
use crate::persistent::array;

pub(super) type Link<T> = ReferenceCounter<Node<T>>;

pub(super) enum Node<T> {
    Leaf(Vec<T>),
    Strict {
        /// Bits addressing a position inside one child.
        shift: usize,
        size: usize,
        children: Vec<Link<T>>,
    },
    Relaxed {
        /// `cumulative_sizes[i]` is the number of elements in `children[..=i]`.
        cumulative_sizes: Vec<usize>,
        children: Vec<Link<T>>,
    },
}

/// The result of pushing elements into a subtree: either one replacement
/// node or two siblings of the original height.
pub(super) enum Pushed<T> {
    One(Link<T>),
    Two(Link<T>, Link<T>),
}

/// Finds the child of a relaxed node that holds `index`.
///
/// The first guess assumes evenly sized children and is corrected by
/// walking the table, which takes a step or two on balanced nodes.
pub(super) fn sub_node_index(cumulative_sizes: &[usize], index: usize) -> usize {
    let count = cumulative_sizes.len();
    let total = cumulative_sizes[count - 1];
    debug_assert!(index < total);
    let average = (total / count).max(1);
    let mut guess = (index / average).min(count - 1);
    while cumulative_sizes[guess] <= index {
        guess += 1;
    }
    while guess > 0 && cumulative_sizes[guess - 1] > index {
        guess -= 1;
    }
    guess
}

impl<T> Node<T> {
    /// Creates the root of an empty tree.
    pub(super) fn empty() -> Link<T> {
        ReferenceCounter::new(Self::Leaf(Vec::new()))
    }

    pub(super) fn size(&self) -> usize {
        match self {
            Self::Leaf(values) => values.len(),
            Self::Strict { size, .. } => *size,
            Self::Relaxed {
                cumulative_sizes, ..
            } => cumulative_sizes.last().copied().unwrap_or(0),
        }
    }

    /// Distance to the leaves; a leaf has height 0.
    pub(super) fn height(&self) -> usize {
        match self {
            Self::Leaf(_) => 0,
            Self::Strict { shift, .. } => shift / NODE_LENGTH_POW_2,
            Self::Relaxed { children, .. } => children[0].height() + 1,
        }
    }

    pub(super) fn children(&self) -> &[Link<T>] {
        match self {
            Self::Strict { children, .. } | Self::Relaxed { children, .. } => children,
            Self::Leaf(_) => unreachable!("leaf nodes have no children"),
        }
    }

    fn values(&self) -> &[T] {
        match self {
            Self::Leaf(values) => values,
            _ => unreachable!("branch nodes hold no values"),
        }
    }

    const fn is_branch(&self) -> bool {
        !matches!(self, Self::Leaf(_))
    }

    /// Builds a branch over `children`, choosing the strict layout whenever
    /// the children allow bit-shift addressing.
    pub(super) fn branch(children: Vec<Link<T>>) -> Self {
        debug_assert!(!children.is_empty());
        let shift = (children[0].height() + 1) * NODE_LENGTH_POW_2;
        let child_capacity = u32::try_from(shift)
            .ok()
            .and_then(|bits| 1_usize.checked_shl(bits))
            .unwrap_or(usize::MAX);
        let last = children.len() - 1;
        let strict = children.len() <= STRICT_NODE_LENGTH
            && children.iter().enumerate().all(|(position, child)| {
                let packed = if position == last {
                    child.size() <= child_capacity
                } else {
                    child.size() == child_capacity
                };
                packed && !matches!(**child, Self::Relaxed { .. })
            });
        if strict {
            let size = children.iter().map(|child| child.size()).sum();
            Self::Strict {
                shift,
                size,
                children,
            }
        } else {
            let cumulative_sizes = children
                .iter()
                .scan(0, |total, child| {
                    *total += child.size();
                    Some(*total)
                })
                .collect();
            Self::Relaxed {
                cumulative_sizes,
                children,
            }
        }
    }

    /// Returns the child holding `index` and the index inside that child.
    ///
    /// `index == size()` addresses the end of the last child.
    fn locate(&self, index: usize) -> (usize, usize) {
        let children = self.children();
        let last = children.len() - 1;
        if index >= self.size() {
            return (last, index - (self.size() - children[last].size()));
        }
        match self {
            Self::Strict { shift, .. } => (index >> shift, index & ((1 << shift) - 1)),
            Self::Relaxed {
                cumulative_sizes, ..
            } => {
                let child = sub_node_index(cumulative_sizes, index);
                let before = if child == 0 {
                    0
                } else {
                    cumulative_sizes[child - 1]
                };
                (child, index - before)
            }
            Self::Leaf(_) => unreachable!("leaf nodes have no children"),
        }
    }

    pub(super) fn get(&self, mut index: usize) -> Option<&T> {
        let mut current = self;
        loop {
            match current {
                Self::Leaf(values) => return values.get(index),
                Self::Strict {
                    shift, children, ..
                } => {
                    current = children.get(index >> shift)?;
                    index &= (1 << shift) - 1;
                }
                Self::Relaxed {
                    cumulative_sizes,
                    children,
                } => {
                    if index >= cumulative_sizes[cumulative_sizes.len() - 1] {
                        return None;
                    }
                    let child = sub_node_index(cumulative_sizes, index);
                    if child > 0 {
                        index -= cumulative_sizes[child - 1];
                    }
                    current = &children[child];
                }
            }
        }
    }

    /// Returns the leaf holding `index` together with the tree index of the
    /// leaf's first element.
    pub(super) fn leaf_at(&self, index: usize) -> (&[T], usize) {
        let mut current = self;
        let mut offset = index;
        loop {
            if let Self::Leaf(values) = current {
                return (values, index - offset);
            }
            let (child, inner) = current.locate(offset);
            current = &current.children()[child];
            offset = inner;
        }
    }
}

// =============================================================================
// Focus push
// =============================================================================

fn leaf<T>(values: Vec<T>) -> Link<T> {
    ReferenceCounter::new(Node::Leaf(values))
}

fn branch<T>(children: Vec<Link<T>>) -> Link<T> {
    ReferenceCounter::new(Node::branch(children))
}

/// Wraps `link` in single-child strict nodes until it reaches `height`.
fn chain<T>(mut link: Link<T>, height: usize) -> Link<T> {
    for level in (link.height() + 1)..=height {
        link = ReferenceCounter::new(Node::Strict {
            shift: level * NODE_LENGTH_POW_2,
            size: link.size(),
            children: vec![link],
        });
    }
    link
}

/// Inserts `items` before tree index `index` and returns the new root.
pub(super) fn push_focus<T: Clone>(root: &Link<T>, index: usize, items: &[T]) -> Link<T> {
    if items.is_empty() {
        return root.clone();
    }
    match push(root, index, items) {
        Pushed::One(node) => node,
        Pushed::Two(left, right) => branch(vec![left, right]),
    }
}

fn push<T: Clone>(node: &Link<T>, index: usize, items: &[T]) -> Pushed<T> {
    match &**node {
        Node::Leaf(values) => push_leaf(node, values, index, items),
        Node::Strict { size, .. }
            if index == *size
                && items.len() == STRICT_NODE_LENGTH
                && size % STRICT_NODE_LENGTH == 0 =>
        {
            push_full_leaf(node, leaf(items.to_vec()))
        }
        _ => push_branch(node, index, items),
    }
}

fn push_leaf<T: Clone>(node: &Link<T>, values: &[T], index: usize, items: &[T]) -> Pushed<T> {
    if values.len() + items.len() <= MAX_NODE_LENGTH {
        return Pushed::One(leaf(array::insert_slice_at(values, index, items)));
    }
    if items.len() >= MIN_NODE_LENGTH && values.len() >= MIN_NODE_LENGTH {
        if index == values.len() {
            return Pushed::Two(node.clone(), leaf(items.to_vec()));
        }
        if index == 0 {
            return Pushed::Two(leaf(items.to_vec()), node.clone());
        }
    }
    let merged = array::insert_slice_at(values, index, items);
    let (left, right) = array::split_at(&merged, merged.len() / 2);
    Pushed::Two(leaf(left), leaf(right))
}

/// Appends a full leaf to a strict subtree whose size is a multiple of the
/// node width, keeping it strict.
fn push_full_leaf<T>(node: &Link<T>, new_leaf: Link<T>) -> Pushed<T> {
    let Node::Strict {
        shift,
        size,
        children,
    } = &**node
    else {
        unreachable!("aligned pushes only reach strict nodes")
    };
    let height = shift / NODE_LENGTH_POW_2;
    let child_capacity = 1_usize << shift;
    if *size == child_capacity * STRICT_NODE_LENGTH {
        return Pushed::Two(node.clone(), chain(new_leaf, height));
    }
    let mut children = children.clone();
    let last = children.len() - 1;
    if height == 1 || children[last].size() == child_capacity {
        children.push(chain(new_leaf, height - 1));
    } else {
        match push_full_leaf(&children[last], new_leaf) {
            Pushed::One(child) => children[last] = child,
            Pushed::Two(..) => unreachable!("a partial strict child cannot overflow"),
        }
    }
    Pushed::One(ReferenceCounter::new(Node::Strict {
        shift: *shift,
        size: size + STRICT_NODE_LENGTH,
        children,
    }))
}

fn push_branch<T: Clone>(node: &Link<T>, index: usize, items: &[T]) -> Pushed<T> {
    let (position, inner) = node.locate(index);
    let children = node.children();
    let mut children = match push(&children[position], inner, items) {
        Pushed::One(child) => array::replace_at(children, position, child),
        Pushed::Two(left, right) => array::splice(children, position, 1, &[left, right]),
    };
    if children.len() <= MAX_NODE_LENGTH {
        return Pushed::One(branch(children));
    }
    let right = children.split_off(children.len() / 2);
    Pushed::Two(branch(children), branch(right))
}

// =============================================================================
// Replace
// =============================================================================

/// Returns a copy of the path to `index` with the element replaced.
pub(super) fn replace<T: Clone>(node: &Link<T>, index: usize, value: T) -> Link<T> {
    match &**node {
        Node::Leaf(values) => leaf(array::replace_at(values, index, value)),
        Node::Strict {
            shift,
            size,
            children,
        } => {
            let (position, inner) = node.locate(index);
            let child = replace(&children[position], inner, value);
            ReferenceCounter::new(Node::Strict {
                shift: *shift,
                size: *size,
                children: array::replace_at(children, position, child),
            })
        }
        Node::Relaxed {
            cumulative_sizes,
            children,
        } => {
            let (position, inner) = node.locate(index);
            let child = replace(&children[position], inner, value);
            ReferenceCounter::new(Node::Relaxed {
                cumulative_sizes: cumulative_sizes.clone(),
                children: array::replace_at(children, position, child),
            })
        }
    }
}

// =============================================================================
// Rebalance
// =============================================================================

/// Merges undersized nodes of one level into their neighbours.
///
/// Every returned node holds at least [`MIN_NODE_LENGTH`] slots unless a
/// single node is returned. Nodes that are already large enough are kept
/// as they are, so their subtrees stay shared.
fn rebalance<T: Clone>(nodes: Vec<Link<T>>) -> Vec<Link<T>> {
    if nodes.len() < 2 {
        return nodes;
    }
    if nodes[0].is_branch() {
        redistribute(nodes, Node::children, branch)
    } else {
        redistribute(nodes, Node::values, leaf)
    }
}

fn redistribute<T, S: Clone>(
    nodes: Vec<Link<T>>,
    slots: impl Fn(&Node<T>) -> &[S],
    build: impl Fn(Vec<S>) -> Link<T>,
) -> Vec<Link<T>> {
    let emit = |balanced: &mut Vec<Link<T>>, mut run: Vec<S>| {
        if run.len() > MAX_NODE_LENGTH {
            let tail = run.split_off(run.len() / 2);
            balanced.push(build(run));
            balanced.push(build(tail));
        } else {
            balanced.push(build(run));
        }
    };
    let mut balanced = Vec::with_capacity(nodes.len());
    let mut pending: Vec<S> = Vec::new();
    for node in nodes {
        let own = slots(&*node);
        if pending.is_empty() && own.len() >= MIN_NODE_LENGTH {
            balanced.push(node);
            continue;
        }
        pending.extend_from_slice(own);
        if pending.len() >= MIN_NODE_LENGTH {
            emit(&mut balanced, std::mem::take(&mut pending));
        }
    }
    if !pending.is_empty() {
        match balanced.pop() {
            Some(last) => {
                let mut run = slots(&*last).to_vec();
                run.extend(pending);
                emit(&mut balanced, run);
            }
            None => balanced.push(build(pending)),
        }
    }
    balanced
}

// =============================================================================
// Join
// =============================================================================

/// Concatenates two subtrees.
///
/// Returns one or two nodes of height `max(left.height(), right.height())`,
/// or a single lower node when the joined content fits below that height.
/// Only the nodes along the seam are rebuilt: the inner edges of both
/// trees are taken apart level by level and their children rebalanced.
fn concat<T: Clone>(left: &Link<T>, right: &Link<T>) -> Vec<Link<T>> {
    let height = left.height().max(right.height());
    if height == 0 {
        return rebalance(vec![left.clone(), right.clone()]);
    }
    let (mut left_rest, left_edge) = if left.height() == height {
        let children = left.children();
        let last = children.len() - 1;
        (children[..last].to_vec(), children[last].clone())
    } else {
        (Vec::new(), left.clone())
    };
    let (right_edge, mut right_rest) = if right.height() == height {
        let children = right.children();
        (children[0].clone(), children[1..].to_vec())
    } else {
        (right.clone(), Vec::new())
    };

    // A lower result is folded into a sibling; without siblings it is
    // handed up unchanged.
    let mut middle = concat(&left_edge, &right_edge);
    while let [single] = middle.as_slice()
        && single.height() + 1 < height
    {
        let single = single.clone();
        if let Some(neighbour) = left_rest.pop() {
            middle = concat(&neighbour, &single);
        } else if right_rest.is_empty() {
            return middle;
        } else {
            let neighbour = right_rest.remove(0);
            middle = concat(&single, &neighbour);
        }
    }

    left_rest.extend(middle);
    left_rest.extend(right_rest);
    let mut balanced = rebalance(left_rest);
    if balanced.len() == 1 {
        return balanced;
    }
    if balanced.len() <= MAX_NODE_LENGTH {
        return vec![branch(balanced)];
    }
    let right = balanced.split_off(balanced.len() / 2);
    vec![branch(balanced), branch(right)]
}

/// Removes single-child branches above the real root.
fn collapse<T>(mut root: Link<T>) -> Link<T> {
    while root.is_branch() && root.children().len() == 1 {
        root = root.children()[0].clone();
    }
    root
}

/// Joins two trees into one root.
///
/// The seam is rebalanced, so every node off the outer edges keeps at
/// least [`MIN_NODE_LENGTH`] slots and the height stays logarithmic.
pub(super) fn join_roots<T: Clone>(left: &Link<T>, right: &Link<T>) -> Link<T> {
    if left.size() == 0 {
        return right.clone();
    }
    if right.size() == 0 {
        return left.clone();
    }
    let mut nodes = concat(left, right);
    if nodes.len() == 1 {
        collapse(nodes.swap_remove(0))
    } else {
        branch(nodes)
    }
}

// =============================================================================
// Split
// =============================================================================

fn piece<T>(children: &[Link<T>]) -> Link<T> {
    collapse(branch(children.to_vec()))
}

fn join_all<T: Clone>(pieces: impl IntoIterator<Item = Link<T>>) -> Link<T> {
    pieces
        .into_iter()
        .reduce(|joined, next| join_roots(&joined, &next))
        .unwrap_or_else(Node::empty)
}

/// Splits a tree before `index`; both results are valid roots.
///
/// The path to `index` is cut out. The siblings left of the path become
/// one piece per level, as do the siblings right of it, and each side is
/// rebuilt by joining its pieces, which rebalances the new edges.
pub(super) fn split_root<T: Clone>(root: &Link<T>, index: usize) -> (Link<T>, Link<T>) {
    if index == 0 {
        return (Node::empty(), root.clone());
    }
    if index >= root.size() {
        return (root.clone(), Node::empty());
    }
    let mut left_pieces = Vec::new();
    let mut right_pieces = Vec::new();
    let mut node = root.clone();
    let mut offset = index;
    loop {
        if let Node::Leaf(values) = &*node {
            let (left, right) = array::split_at(values, offset);
            left_pieces.push(leaf(left));
            right_pieces.push(leaf(right));
            break;
        }
        let (position, inner) = node.locate(offset);
        let children = node.children();
        if position > 0 {
            left_pieces.push(piece(&children[..position]));
        }
        if inner == 0 {
            right_pieces.push(piece(&children[position..]));
            break;
        }
        if position + 1 < children.len() {
            right_pieces.push(piece(&children[position + 1..]));
        }
        let next = children[position].clone();
        node = next;
        offset = inner;
    }
    (
        join_all(left_pieces),
        join_all(right_pieces.into_iter().rev()),
    )
}

// =============================================================================
// Diagnostics
// =============================================================================

/// Checks node shape below `node` and returns the number of elements.
#[cfg(test)]
pub(super) fn check_node<T>(node: &Node<T>, is_root: bool) -> usize {
    match node {
        Node::Leaf(values) => {
            assert!(values.len() <= MAX_NODE_LENGTH, "oversized leaf");
            assert!(is_root || !values.is_empty(), "empty inner leaf");
            values.len()
        }
        Node::Strict {
            shift,
            size,
            children,
        } => {
            assert!(!children.is_empty() && children.len() <= STRICT_NODE_LENGTH);
            let height = shift / NODE_LENGTH_POW_2;
            let last = children.len() - 1;
            let mut total = 0;
            for (position, child) in children.iter().enumerate() {
                assert!(!matches!(**child, Node::Relaxed { .. }), "relaxed child of strict node");
                assert_eq!(child.height() + 1, height, "uneven leaf depth");
                let child_size = check_node(child, false);
                if position < last {
                    assert_eq!(child_size, 1 << shift, "strict child not full");
                } else {
                    assert!(child_size <= 1 << shift, "strict last child too large");
                }
                total += child_size;
            }
            assert_eq!(total, *size);
            total
        }
        Node::Relaxed {
            cumulative_sizes,
            children,
        } => {
            assert!(!children.is_empty() && children.len() <= MAX_NODE_LENGTH);
            assert_eq!(cumulative_sizes.len(), children.len());
            let height = children[0].height();
            let mut total = 0;
            for (child, cumulative) in children.iter().zip(cumulative_sizes) {
                assert_eq!(child.height(), height, "uneven leaf depth");
                total += check_node(child, false);
                assert_eq!(total, *cumulative, "stale cumulative size");
            }
            total
        }
    }
}

/// Tallest height a tree of `size` elements may reach:
/// `ceil(log_22(size)) + 2`.
#[cfg(test)]
pub(super) fn height_bound(size: usize) -> usize {
    let mut bound = 2;
    let mut capacity = 1;
    while capacity < size {
        capacity *= MIN_NODE_LENGTH;
        bound += 1;
    }
    bound
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    fn build(length: usize) -> Link<usize> {
        let values: Vec<usize> = (0..length).collect();
        values.chunks(STRICT_NODE_LENGTH).fold(Node::empty(), |root, chunk| {
            let size = root.size();
            push_focus(&root, size, chunk)
        })
    }

    fn collect(root: &Link<usize>) -> Vec<usize> {
        (0..root.size()).filter_map(|index| root.get(index).copied()).collect()
    }

    #[rstest]
    fn test_aligned_appends_stay_strict() {
        let root = build(32 * 32 * 3);
        assert!(matches!(*root, Node::Strict { shift: 10, .. }));
        assert_eq!(check_node(&root, true), 32 * 32 * 3);
        assert_eq!(root.get(32 * 32 + 5), Some(&(32 * 32 + 5)));
    }

    #[rstest]
    fn test_unaligned_push_relaxes_root() {
        let root = build(32 * 4);
        let pushed = push_focus(&root, 40, &[1000, 1001]);
        assert!(matches!(*pushed, Node::Relaxed { .. }));
        check_node(&pushed, true);
        let values = collect(&pushed);
        assert_eq!(&values[38..44], &[38, 39, 1000, 1001, 40, 41]);
        assert_eq!(collect(&root), (0..128).collect::<Vec<_>>());
    }

    #[rstest]
    fn test_leaf_overflow_splits_at_midpoint() {
        let root = push_focus(&Node::empty(), 0, &[0; 40]);
        let pushed = push_focus(&root, 20, &[1; 10]);
        let Node::Relaxed { children, .. } = &*pushed else {
            panic!("an overflowing leaf gets a relaxed parent");
        };
        assert_eq!(children[0].size(), 25);
        assert_eq!(children[1].size(), 25);
    }

    #[rstest]
    fn test_large_focus_at_leaf_edge_stays_separate() {
        let root = push_focus(&Node::empty(), 0, &[0; 40]);
        let pushed = push_focus(&root, 40, &[1; 30]);
        let children = pushed.children();
        assert!(ReferenceCounter::ptr_eq(&children[0], &root));
        assert_eq!(children[1].size(), 30);
    }

    #[rstest]
    #[case(1)]
    #[case(31)]
    #[case(32)]
    #[case(33)]
    #[case(1000)]
    #[case(32 * 32 * 2 + 7)]
    fn test_split_then_join(#[case] index: usize) {
        let root = build(32 * 32 * 2 + 50);
        let (left, right) = split_root(&root, index);
        assert_eq!(check_node(&left, true), index);
        check_node(&right, true);
        let joined = join_roots(&left, &right);
        check_node(&joined, true);
        assert_eq!(collect(&joined), collect(&root));
    }

    #[rstest]
    fn test_join_unequal_heights() {
        let tall = build(32 * 32 * 3);
        let short = build(100);
        for (left, right) in [(&tall, &short), (&short, &tall)] {
            let joined = join_roots(left, right);
            check_node(&joined, true);
            let mut expected = collect(left);
            expected.extend(collect(right));
            assert_eq!(collect(&joined), expected);
        }
    }

    #[rstest]
    fn test_replace_copies_only_the_path() {
        let root = build(32 * 32 * 2);
        let replaced = replace(&root, 5, 999);
        assert_eq!(replaced.get(5), Some(&999));
        assert_eq!(root.get(5), Some(&5));
        assert!(ReferenceCounter::ptr_eq(&root.children()[1], &replaced.children()[1]));
    }

    #[rstest]
    fn test_leaf_at_reports_leaf_start() {
        let root = build(100);
        let (values, start) = root.leaf_at(70);
        assert_eq!(start, 64);
        assert_eq!(values[70 - start], 70);
    }

    fn slot_counts(root: &Link<usize>) -> Vec<usize> {
        root.children().iter().map(|child| child.children().len()).collect()
    }

    #[rstest]
    fn test_rebalance_merges_small_nodes_and_shares_large_ones() {
        let values: Vec<usize> = (0..100).collect();
        let leaves: Vec<Link<usize>> = [30, 3, 5, 40, 2, 20]
            .iter()
            .scan(0, |start, &length| {
                let chunk = leaf(values[*start..*start + length].to_vec());
                *start += length;
                Some(chunk)
            })
            .collect();
        let balanced = rebalance(leaves.clone());
        assert!(ReferenceCounter::ptr_eq(&balanced[0], &leaves[0]));
        assert!(balanced.iter().all(|node| node.size() >= MIN_NODE_LENGTH));
        assert!(balanced.iter().all(|node| node.size() <= MAX_NODE_LENGTH));
        let flattened: Vec<usize> = balanced
            .iter()
            .flat_map(|node| node.values().iter().copied())
            .collect();
        assert_eq!(flattened, values);
    }

    #[rstest]
    fn test_rebalance_keeps_a_lone_small_node() {
        let balanced = rebalance(vec![leaf(vec![1, 2]), leaf(vec![3])]);
        assert_eq!(balanced.len(), 1);
        assert_eq!(balanced[0].values(), &[1, 2, 3]);
    }

    #[rstest]
    fn test_join_rebalances_small_seam_nodes() {
        let root = build(32 * 32 * 4);
        let (left, _) = split_root(&root, 32 * 32 * 2 + 1);
        let (_, right) = split_root(&root, 32 * 32 * 2 - 1);
        let joined = join_roots(&left, &right);
        check_node(&joined, true);
        let counts = slot_counts(&joined);
        assert!(counts[..counts.len() - 1].iter().all(|&count| count >= MIN_NODE_LENGTH));
        let expected: Vec<usize> = (0..=32 * 32 * 2)
            .chain(32 * 32 * 2 - 1..32 * 32 * 4)
            .collect();
        assert_eq!(collect(&joined), expected);
    }

    #[rstest]
    #[case(1)]
    #[case(2)]
    #[case(32 * 32 * 3 - 1)]
    fn test_split_near_the_ends_drops_height(#[case] index: usize) {
        let root = build(32 * 32 * 3);
        let (left, right) = split_root(&root, index);
        assert!(left.height() <= height_bound(left.size()));
        assert!(right.height() <= height_bound(right.size()));
        if index < 32 {
            assert!(matches!(*left, Node::Leaf(_)));
        } else {
            assert!(matches!(*right, Node::Leaf(_)));
        }
    }

    #[rstest]
    fn test_repeated_removal_keeps_height_logarithmic() {
        let mut root = build(20_000);
        let mut seed: u64 = 12_345;
        for _ in 0..3000 {
            seed = seed
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            let index = usize::try_from(seed >> 33).unwrap() % root.size();
            let (left, rest) = split_root(&root, index);
            let (_, right) = split_root(&rest, 1);
            root = join_roots(&left, &right);
            assert!(root.height() <= height_bound(root.size()));
        }
        assert_eq!(check_node(&root, true), 17_000);
    }

    #[rstest]
    #[case(0, 5)]
    #[case(5, 0)]
    fn test_join_with_empty_side(#[case] left_length: usize, #[case] right_length: usize) {
        let (left, right) = (build(left_length), build(right_length));
        let joined = join_roots(&left, &right);
        assert_eq!(joined.size(), 5);
    }

    fn cumulative_table() -> impl Strategy<Value = Vec<usize>> {
        prop::collection::vec(1_usize..=MAX_NODE_LENGTH * 4, 1..=MAX_NODE_LENGTH).prop_map(|sizes| {
            sizes
                .into_iter()
                .scan(0, |total, size| {
                    *total += size;
                    Some(*total)
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_sub_node_index_matches_binary_search(
            table in cumulative_table(),
            seed in any::<usize>()
        ) {
            let total = table[table.len() - 1];
            let index = seed % total;
            let expected = table.partition_point(|&size| size <= index);
            prop_assert_eq!(sub_node_index(&table, index), expected);
        }

        #[test]
        fn prop_sub_node_index_on_every_boundary(table in cumulative_table()) {
            for &boundary in &table[..table.len() - 1] {
                for index in [boundary - 1, boundary] {
                    let expected = table.partition_point(|&size| size <= index);
                    prop_assert_eq!(sub_node_index(&table, index), expected);
                }
            }
        }
    }
}
