//! Integration tests for thread-safe persistent collections.
//!
//! With the `arc` feature enabled, nodes are shared through `Arc` and every
//! persistent collection can be read and derived from on several threads.

#![cfg(feature = "arc")]
#![allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]

use rstest::rstest;
use std::sync::Arc;
use std::thread;
use strata::persistent::{
    InsertionOrderedMap, PersistentHashMap, PersistentTreeMap, PersistentTreeSet, RrbVector,
};

static_assertions::assert_impl_all!(PersistentHashMap<String, i32>: Send, Sync);
static_assertions::assert_impl_all!(PersistentTreeMap<String, i32>: Send, Sync);
static_assertions::assert_impl_all!(RrbVector<String>: Send, Sync);
static_assertions::assert_impl_all!(PersistentTreeSet<String>: Send, Sync);
static_assertions::assert_impl_all!(InsertionOrderedMap<String, i32>: Send, Sync);

// =============================================================================
// RrbVector
// =============================================================================

#[rstest]
fn test_vector_cross_thread_structural_sharing() {
    let original: Arc<RrbVector<i32>> = Arc::new((0..1_000).collect());

    let handles: Vec<_> = (0..4)
        .map(|index| {
            let vector = Arc::clone(&original);
            thread::spawn(move || {
                let modified = vector.replace(index * 100, -1).unwrap();
                let (left, right) = modified.split_at(500).unwrap();
                let joined = right.join(&left);
                assert_eq!(joined.len(), 1_000);
                assert_eq!(vector.get(index * 100), Some(&((index * 100) as i32)));
                modified
            })
        })
        .collect();

    for (index, handle) in handles.into_iter().enumerate() {
        let modified = handle.join().expect("Thread panicked");
        assert_eq!(modified.get(index * 100), Some(&-1));
    }
    assert!(original.iter().copied().eq(0..1_000));
}

// =============================================================================
// PersistentHashMap
// =============================================================================

#[rstest]
fn test_hashmap_cross_thread_reads_and_writes() {
    let original: Arc<PersistentHashMap<i32, i32>> =
        Arc::new((0..500).map(|key| (key, key)).collect());

    let handles: Vec<_> = (0..4)
        .map(|index| {
            let map = Arc::clone(&original);
            thread::spawn(move || {
                let extended = map.insert(1_000 + index, index);
                assert_eq!(extended.len(), 501);
                assert_eq!(map.len(), 500);
                extended
            })
        })
        .collect();

    for (index, handle) in handles.into_iter().enumerate() {
        let extended = handle.join().expect("Thread panicked");
        assert_eq!(extended.get(&(1_000 + index as i32)), Some(&(index as i32)));
    }
    assert_eq!(original.len(), 500);
}

// =============================================================================
// PersistentTreeMap and adapters
// =============================================================================

#[rstest]
fn test_tree_map_sent_between_threads() {
    let map: PersistentTreeMap<i32, String> =
        (0..100).map(|key| (key, key.to_string())).collect();

    let handle = thread::spawn(move || map.sub_map(&10, &20));
    let slice = handle.join().expect("Thread panicked");
    assert_eq!(slice.len(), 10);
    assert_eq!(slice.first_key(), Ok(&10));
}

#[rstest]
fn test_adapters_shared_between_threads() {
    let set: Arc<PersistentTreeSet<i32>> = Arc::new((0..10).collect());
    let ordered: Arc<InsertionOrderedMap<i32, i32>> =
        Arc::new([(3, 0), (1, 0), (2, 0)].into_iter().collect());

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let set = Arc::clone(&set);
            let ordered = Arc::clone(&ordered);
            thread::spawn(move || {
                assert!(set.contains(&5));
                ordered.keys().copied().collect::<Vec<_>>()
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().expect("Thread panicked"), vec![3, 1, 2]);
    }
}
