//! Proptest generators for property-based testing.

use proptest::prelude::*;

use canopy_core::{ChildKey, Node, Path, Scalar};
use canopy_sync::{QuerySpec, RangeBound};

/// Generate a plausible child name.
pub fn child_key() -> impl Strategy<Value = ChildKey> {
    prop_oneof![
        "[a-z]{1,6}".prop_map(ChildKey::new),
        (0u32..100).prop_map(|n| ChildKey::new(n.to_string())),
    ]
}

/// Generate a path of up to `depth` segments.
pub fn path(depth: usize) -> impl Strategy<Value = Path> {
    prop::collection::vec(child_key(), 0..=depth).prop_map(Path::from_segments)
}

/// Generate a scalar value.
pub fn scalar() -> impl Strategy<Value = Scalar> {
    prop_oneof![
        any::<bool>().prop_map(Scalar::from),
        (-1000i64..1000).prop_map(Scalar::from),
        "[a-z]{0,8}".prop_map(|s| Scalar::from(s.as_str())),
    ]
}

/// Generate a leaf node.
pub fn leaf() -> impl Strategy<Value = Node> {
    scalar().prop_map(Node::leaf)
}

/// Generate a snapshot node up to two levels deep.
pub fn node() -> impl Strategy<Value = Node> {
    let inner = prop_oneof![Just(Node::Empty), leaf()];
    prop_oneof![
        leaf(),
        prop::collection::btree_map(child_key(), inner, 0..6).prop_map(|children| Node::children_from(children)),
    ]
}

/// Generate a flat children node with integer leaves, handy for value
/// queries.
pub fn flat_children(size: usize) -> impl Strategy<Value = Node> {
    prop::collection::btree_map(child_key(), (-1000i64..1000).prop_map(Node::leaf), 1..=size)
        .prop_map(|children| Node::children_from(children))
}

/// Generate a value-indexed query spec with optional bounds and limit.
pub fn value_query() -> impl Strategy<Value = QuerySpec> {
    let bound = (-1000i64..1000).prop_map(|v| RangeBound::value(Node::leaf(v)));
    (
        prop::option::of(bound.clone()),
        prop::option::of(bound),
        prop::option::of(1usize..5),
        any::<bool>(),
    )
        .prop_map(|(start, end, limit, anchor_last)| {
            let mut query = QuerySpec::with_index(canopy_core::Index::Value);
            if let Some(start) = start {
                query = query.start_at(start);
            }
            if let Some(end) = end {
                query = query.end_at(end);
            }
            if let Some(count) = limit {
                query = if anchor_last {
                    query.limit_to_last(count)
                } else {
                    query.limit_to_first(count)
                };
            }
            query
        })
}
