#![cfg(feature = "serde")]

//! Integration tests for serde support.
//!
//! `RrbVector` serializes as a sequence and `PersistentTreeMap` as a map;
//! both are rebuilt through their ordinary construction paths on the way
//! back in.

use rstest::rstest;
use strata::persistent::{PersistentTreeMap, RrbVector};

// =============================================================================
// RrbVector
// =============================================================================

#[rstest]
fn test_vector_serializes_as_json_array() {
    let vector: RrbVector<i32> = (1..=3).collect();
    assert_eq!(serde_json::to_string(&vector).unwrap(), "[1,2,3]");
}

#[rstest]
#[case(0)]
#[case(31)]
#[case(1_057)]
fn test_vector_json_roundtrip(#[case] length: i32) {
    let vector: RrbVector<i32> = (0..length).collect();
    let json = serde_json::to_string(&vector).unwrap();
    let restored: RrbVector<i32> = serde_json::from_str(&json).unwrap();
    assert_eq!(restored, vector);
}

#[rstest]
fn test_fragmented_vector_roundtrip() {
    let vector: RrbVector<String> = (0..500).map(|value| value.to_string()).collect();
    let vector = vector.insert(250, "inserted".to_string()).unwrap();
    let (left, right) = vector.split_at(123).unwrap();
    let vector = right.join(&left);

    let json = serde_json::to_string(&vector).unwrap();
    let restored: RrbVector<String> = serde_json::from_str(&json).unwrap();
    assert_eq!(restored, vector);
}

#[rstest]
fn test_nested_vectors() {
    let inner_first: RrbVector<i32> = (1..=3).collect();
    let inner_second: RrbVector<i32> = (4..=6).collect();
    let outer: RrbVector<RrbVector<i32>> = [inner_first, inner_second].into_iter().collect();

    let json = serde_json::to_string(&outer).unwrap();
    assert_eq!(json, "[[1,2,3],[4,5,6]]");
    let restored: RrbVector<RrbVector<i32>> = serde_json::from_str(&json).unwrap();
    assert_eq!(restored, outer);
}

#[rstest]
fn test_vector_rejects_non_sequence() {
    let result: Result<RrbVector<i32>, _> = serde_json::from_str(r#"{"a": 1}"#);
    assert!(result.is_err());
}

// =============================================================================
// PersistentTreeMap
// =============================================================================

#[rstest]
fn test_tree_map_serializes_in_key_order() {
    let map = PersistentTreeMap::new()
        .insert("b".to_string(), 2)
        .insert("a".to_string(), 1)
        .insert("c".to_string(), 3);
    assert_eq!(
        serde_json::to_string(&map).unwrap(),
        r#"{"a":1,"b":2,"c":3}"#
    );
}

#[rstest]
fn test_tree_map_json_roundtrip() {
    let map: PersistentTreeMap<i32, String> =
        (0..200).map(|key| (key, format!("value{key}"))).collect();
    let json = serde_json::to_string(&map).unwrap();
    let restored: PersistentTreeMap<i32, String> = serde_json::from_str(&json).unwrap();

    assert_eq!(restored, map);
    assert_eq!(restored.first_key(), Ok(&0));
    assert_eq!(restored.last_key(), Ok(&199));
}

#[rstest]
fn test_tree_map_duplicate_keys_keep_last() {
    let map: PersistentTreeMap<String, i32> =
        serde_json::from_str(r#"{"k":1,"k":2,"j":0}"#).unwrap();
    assert_eq!(map.len(), 2);
    assert_eq!(map.get(&"k".to_string()), Some(&2));
}

#[rstest]
fn test_tree_map_of_vectors() {
    let map = PersistentTreeMap::new()
        .insert(1, (0..3).collect::<RrbVector<i32>>())
        .insert(2, RrbVector::new());

    let json = serde_json::to_string(&map).unwrap();
    assert_eq!(json, r#"{"1":[0,1,2],"2":[]}"#);
    let restored: PersistentTreeMap<i32, RrbVector<i32>> = serde_json::from_str(&json).unwrap();
    assert_eq!(restored, map);
}
