//! Query listeners driven end to end through the harness.

use canopy_core::{ChildKey, Index, Node, Path};
use canopy_sync::{ChangeType, QuerySpec, RangeBound, RangedFilter};
use canopy_testkit::fixtures::ViewHarness;
use canopy_testkit::generators;
use proptest::prelude::*;
use serde_json::json;

fn node(value: serde_json::Value) -> Node {
    Node::from_json(&value)
}

#[test]
fn test_limit_to_last_keeps_tail_window() {
    let mut view = ViewHarness::with_query(QuerySpec::with_index(Index::Key).limit_to_last(2));
    view.tagged_server_overwrite("", json!({"a": 1, "b": 2, "c": 3}))
        .unwrap();
    assert_eq!(view.event_snap(), &node(json!({"b": 2, "c": 3})));
}

#[test]
fn test_limit_window_slides_on_new_tail_child() {
    let mut view = ViewHarness::with_query(QuerySpec::with_index(Index::Key).limit_to_last(2));
    view.tagged_server_overwrite("", json!({"a": 1, "b": 2, "c": 3}))
        .unwrap();
    let changes = view.tagged_server_overwrite("d", json!(4)).unwrap();
    assert_eq!(view.event_snap(), &node(json!({"c": 3, "d": 4})));
    let kinds: Vec<ChangeType> = changes.iter().map(|c| c.kind).collect();
    assert_eq!(
        kinds,
        vec![ChangeType::ChildRemoved, ChangeType::ChildAdded, ChangeType::Value]
    );
}

#[test]
fn test_limit_window_refills_from_unfiltered_server_cache() {
    let mut view = ViewHarness::with_query(QuerySpec::with_index(Index::Key).limit_to_first(2));
    // An untagged root load keeps the server cache complete and unfiltered,
    // so evictions can refill from it.
    view.server_overwrite("", json!({"a": 1, "b": 2, "c": 3}))
        .unwrap();
    assert_eq!(view.event_snap(), &node(json!({"a": 1, "b": 2})));
    view.server_overwrite("a", json!(null)).unwrap();
    assert_eq!(view.event_snap(), &node(json!({"b": 2, "c": 3})));
}

#[test]
fn test_value_index_emits_children_in_index_order() {
    let mut view = ViewHarness::with_query(QuerySpec::with_index(Index::Value));
    let changes = view.server_overwrite("", json!({"a": 2, "b": 1})).unwrap();
    let added: Vec<&str> = changes
        .iter()
        .filter(|change| change.kind == ChangeType::ChildAdded)
        .filter_map(|change| change.child_key.as_ref().map(|key| key.as_str()))
        .collect();
    // "b" holds the smaller value, so it comes first under the value index.
    assert_eq!(added, vec!["b", "a"]);
}

#[test]
fn test_range_query_keeps_bounded_children() {
    let query = QuerySpec::with_index(Index::Value)
        .start_at(RangeBound::value(Node::leaf(2i64)))
        .end_at(RangeBound::value(Node::leaf(3i64)));
    let mut view = ViewHarness::with_query(query);
    view.server_overwrite("", json!({"a": 1, "b": 2, "c": 3, "d": 4}))
        .unwrap();
    assert_eq!(view.event_snap(), &node(json!({"b": 2, "c": 3})));
}

#[test]
fn test_user_write_outside_range_is_invisible() {
    let query = QuerySpec::with_index(Index::Value)
        .start_at(RangeBound::value(Node::leaf(2i64)))
        .end_at(RangeBound::value(Node::leaf(3i64)));
    let mut view = ViewHarness::with_query(query);
    view.server_overwrite("", json!({"b": 2})).unwrap();
    let (_, changes) = view.user_set("z", json!(99)).unwrap();
    assert_eq!(view.event_snap(), &node(json!({"b": 2})));
    assert!(changes.is_empty());
}

#[test]
fn test_user_write_inside_range_is_visible() {
    let query = QuerySpec::with_index(Index::Value)
        .start_at(RangeBound::value(Node::leaf(2i64)))
        .end_at(RangeBound::value(Node::leaf(3i64)));
    let mut view = ViewHarness::with_query(query);
    view.server_overwrite("", json!({"b": 2})).unwrap();
    view.user_set("z", json!(3)).unwrap();
    assert_eq!(view.event_snap(), &node(json!({"b": 2, "z": 3})));
}

#[test]
fn test_ack_then_matching_server_echo_is_quiet() {
    let mut view = ViewHarness::new();
    view.server_overwrite("", json!({"a": 1})).unwrap();
    let (write_id, _) = view.user_set("a", json!(2)).unwrap();
    // The server echoes the write before acking, as a live session would.
    let echo_changes = view.server_overwrite("a", json!(2)).unwrap();
    assert!(echo_changes.is_empty());
    let ack_changes = view.ack(write_id).unwrap();
    assert!(ack_changes.is_empty());
    assert_eq!(view.event_snap(), &node(json!({"a": 2})));
}

#[test]
fn test_user_update_then_revert_restores_view() {
    let mut view = ViewHarness::new();
    view.server_overwrite("", json!({"a": 1, "b": 2})).unwrap();
    let (write_id, _) = view
        .user_update("", &[("a", json!(10)), ("c", json!(30))])
        .unwrap();
    assert_eq!(view.event_snap(), &node(json!({"a": 10, "b": 2, "c": 30})));
    view.revert(write_id).unwrap();
    assert_eq!(view.event_snap(), &node(json!({"a": 1, "b": 2})));
}

proptest! {
    #[test]
    fn prop_filtered_view_is_subset_of_server_data(
        snapshot in generators::flat_children(8),
        query in generators::value_query(),
    ) {
        let mut view = ViewHarness::with_query(query.clone());
        view.server_overwrite("", snapshot.to_json()).unwrap();
        let event = view.event_snap().clone();
        let ranged = RangedFilter::new(query.index.clone(), query.start.clone(), query.end.clone());
        let children = event.children_in_index_order(&Index::Key);
        if let Some((count, _)) = query.limit {
            prop_assert!(children.len() <= count);
        }
        for named in children {
            prop_assert_eq!(&snapshot.immediate_child(&named.name), &named.node);
            prop_assert!(ranged.matches(&named));
        }
    }

    #[test]
    fn prop_user_write_visible_until_reverted(
        snapshot in generators::flat_children(6),
        value in -1000i64..1000,
    ) {
        let mut view = ViewHarness::new();
        view.server_overwrite("", snapshot.to_json()).unwrap();
        let (write_id, _) = view.user_set("k", json!(value)).unwrap();
        prop_assert_eq!(
            view.event_snap().immediate_child(&ChildKey::new("k")),
            Node::leaf(value)
        );
        view.revert(write_id).unwrap();
        prop_assert_eq!(view.event_snap(), &snapshot);
    }

    #[test]
    fn prop_event_cache_is_writes_over_server_cache(
        snapshot in generators::flat_children(6),
        value in -1000i64..1000,
    ) {
        let mut view = ViewHarness::new();
        view.server_overwrite("", snapshot.to_json()).unwrap();
        view.user_set("k", json!(value)).unwrap();
        let derived = view
            .write_tree()
            .child_writes(Path::root())
            .calc_complete_event_cache(view.view_cache().complete_server_snap())
            .unwrap();
        prop_assert_eq!(view.event_snap(), &derived);
    }

    #[test]
    fn prop_ack_after_echo_preserves_view(
        snapshot in generators::flat_children(6),
        value in -1000i64..1000,
    ) {
        let mut view = ViewHarness::new();
        view.server_overwrite("", snapshot.to_json()).unwrap();
        let (write_id, _) = view.user_set("k", json!(value)).unwrap();
        view.server_overwrite("k", json!(value)).unwrap();
        let before = view.event_snap().clone();
        view.ack(write_id).unwrap();
        prop_assert_eq!(view.event_snap(), &before);
    }
}
