//! Paths and child keys.
//!
//! A [`Path`] addresses a location in the snapshot tree as an ordered
//! sequence of [`ChildKey`] segments. Paths share their backing storage, so
//! popping the front segment is O(1) and does not copy.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// The pseudo-key addressing a node's priority.
pub const PRIORITY_KEY: &str = ".priority";

/// A single path segment / child name.
///
/// Keys order the way the store orders siblings: keys that look like 32-bit
/// integers sort numerically and before all other keys; everything else is
/// lexicographic. Ties between numerically equal keys (`"1"` vs `"01"`) go to
/// the shorter spelling.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChildKey(String);

impl ChildKey {
    /// Create a key from a child name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The `.priority` pseudo-key.
    pub fn priority() -> Self {
        Self(PRIORITY_KEY.to_string())
    }

    /// The raw child name.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the `.priority` pseudo-key.
    pub fn is_priority(&self) -> bool {
        self.0 == PRIORITY_KEY
    }
}

/// Parse a key as a 32-bit-range integer, the way the store's key ordering
/// does: an optional minus sign followed by at most ten digits, in i32 range.
fn parse_int_key(s: &str) -> Option<i64> {
    let digits = s.strip_prefix('-').unwrap_or(s);
    if digits.is_empty() || digits.len() > 10 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let value: i64 = s.parse().ok()?;
    if (i32::MIN as i64..=i32::MAX as i64).contains(&value) {
        Some(value)
    } else {
        None
    }
}

impl Ord for ChildKey {
    fn cmp(&self, other: &Self) -> Ordering {
        if self.0 == other.0 {
            return Ordering::Equal;
        }
        match (parse_int_key(&self.0), parse_int_key(&other.0)) {
            (Some(a), Some(b)) => a.cmp(&b).then_with(|| self.0.len().cmp(&other.0.len())),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for ChildKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for ChildKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl fmt::Display for ChildKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChildKey {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for ChildKey {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

/// An immutable path into the snapshot tree.
///
/// The empty path denotes the root. Segments are shared between derived
/// paths: [`Path::pop_front`] and [`Path::parent`] reuse the backing
/// allocation.
#[derive(Clone)]
pub struct Path {
    pieces: Arc<[ChildKey]>,
    start: usize,
    end: usize,
}

impl Path {
    /// The root (empty) path.
    pub fn root() -> Self {
        Self {
            pieces: Arc::from(Vec::new()),
            start: 0,
            end: 0,
        }
    }

    /// Parse a `/`-separated path string. Empty segments are skipped, so
    /// `"/a//b/"` and `"a/b"` are the same path.
    pub fn parse(path: &str) -> Self {
        let pieces: Vec<ChildKey> = path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(ChildKey::new)
            .collect();
        Self::from_segments(pieces)
    }

    /// Build a path from owned segments.
    pub fn from_segments(segments: Vec<ChildKey>) -> Self {
        let end = segments.len();
        Self {
            pieces: Arc::from(segments),
            start: 0,
            end,
        }
    }

    /// The segments of this path, front to back.
    pub fn segments(&self) -> &[ChildKey] {
        &self.pieces[self.start..self.end]
    }

    /// Whether this is the root path.
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// The first segment, if any.
    pub fn front(&self) -> Option<&ChildKey> {
        self.segments().first()
    }

    /// The last segment, if any.
    pub fn back(&self) -> Option<&ChildKey> {
        self.segments().last()
    }

    /// This path without its first segment. Popping the root returns the
    /// root.
    pub fn pop_front(&self) -> Self {
        let start = (self.start + 1).min(self.end);
        Self {
            pieces: Arc::clone(&self.pieces),
            start,
            end: self.end,
        }
    }

    /// This path without its last segment, or `None` at the root.
    pub fn parent(&self) -> Option<Self> {
        if self.is_empty() {
            None
        } else {
            Some(Self {
                pieces: Arc::clone(&self.pieces),
                start: self.start,
                end: self.end - 1,
            })
        }
    }

    /// This path extended by one segment.
    pub fn child(&self, key: impl Into<ChildKey>) -> Self {
        let mut pieces: Vec<ChildKey> = self.segments().to_vec();
        pieces.push(key.into());
        Self::from_segments(pieces)
    }

    /// This path extended by another path.
    pub fn child_path(&self, other: &Path) -> Self {
        let mut pieces: Vec<ChildKey> = self.segments().to_vec();
        pieces.extend(other.segments().iter().cloned());
        Self::from_segments(pieces)
    }

    /// Whether this path is a prefix of (or equal to) `other`.
    pub fn contains(&self, other: &Path) -> bool {
        other.len() >= self.len() && self.segments() == &other.segments()[..self.len()]
    }

    /// The remainder of `inner` relative to this path, or `None` if this
    /// path is not a prefix of `inner`.
    pub fn relative(&self, inner: &Path) -> Option<Path> {
        if self.contains(inner) {
            let mut stripped = inner.clone();
            for _ in 0..self.len() {
                stripped = stripped.pop_front();
            }
            Some(stripped)
        } else {
            None
        }
    }

    /// Iterate the segments front to back.
    pub fn iter(&self) -> impl Iterator<Item = &ChildKey> {
        self.segments().iter()
    }
}

impl PartialEq for Path {
    fn eq(&self, other: &Self) -> bool {
        self.segments() == other.segments()
    }
}

impl Eq for Path {}

impl std::hash::Hash for Path {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.segments().hash(state);
    }
}

impl Ord for Path {
    fn cmp(&self, other: &Self) -> Ordering {
        self.segments().iter().cmp(other.segments().iter())
    }
}

impl PartialOrd for Path {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("/");
        }
        for segment in self.segments() {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Path({self})")
    }
}

impl From<&str> for Path {
    fn from(path: &str) -> Self {
        Self::parse(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_skips_empty_segments() {
        assert_eq!(Path::parse("/a//b/"), Path::parse("a/b"));
        assert!(Path::parse("").is_empty());
        assert!(Path::parse("///").is_empty());
    }

    #[test]
    fn test_pop_front_shares_backing() {
        let path = Path::parse("a/b/c");
        let popped = path.pop_front();
        assert_eq!(popped, Path::parse("b/c"));
        assert_eq!(popped.pop_front().pop_front().pop_front(), Path::root());
    }

    #[test]
    fn test_parent_and_back() {
        let path = Path::parse("a/b/c");
        assert_eq!(path.back().unwrap().as_str(), "c");
        assert_eq!(path.parent().unwrap(), Path::parse("a/b"));
        assert_eq!(Path::root().parent(), None);
    }

    #[test]
    fn test_contains_and_relative() {
        let outer = Path::parse("a/b");
        let inner = Path::parse("a/b/c/d");
        assert!(outer.contains(&inner));
        assert!(!inner.contains(&outer));
        assert_eq!(outer.relative(&inner).unwrap(), Path::parse("c/d"));
        assert_eq!(inner.relative(&outer), None);
        assert!(Path::root().contains(&inner));
    }

    #[test]
    fn test_key_ordering_numeric_before_lexicographic() {
        let mut keys: Vec<ChildKey> = ["b", "10", "a", "2", "01", "1"]
            .iter()
            .map(|s| ChildKey::new(*s))
            .collect();
        keys.sort();
        let names: Vec<&str> = keys.iter().map(|k| k.as_str()).collect();
        assert_eq!(names, vec!["1", "01", "2", "10", "a", "b"]);
    }

    #[test]
    fn test_key_ordering_out_of_int_range_is_lexicographic() {
        // Too large for i32, falls back to string comparison.
        let big = ChildKey::new("99999999999");
        let small = ChildKey::new("5");
        assert!(small < big);
        assert!(ChildKey::new("3000000000") > ChildKey::new("5"));
    }

    #[test]
    fn test_priority_key() {
        assert!(ChildKey::priority().is_priority());
        assert!(!ChildKey::new("a").is_priority());
    }

    #[test]
    fn test_display() {
        assert_eq!(Path::parse("a/b").to_string(), "/a/b");
        assert_eq!(Path::root().to_string(), "/");
    }

    proptest::proptest! {
        #[test]
        fn prop_relative_inverts_child_path(
            base in proptest::collection::vec("[a-z0-9]{1,4}", 0..4),
            rest in proptest::collection::vec("[a-z0-9]{1,4}", 0..4),
        ) {
            let base = Path::from_segments(base.into_iter().map(ChildKey::new).collect());
            let rest = Path::from_segments(rest.into_iter().map(ChildKey::new).collect());
            let joined = base.child_path(&rest);
            proptest::prop_assert!(base.contains(&joined));
            proptest::prop_assert_eq!(base.relative(&joined), Some(rest));
        }

        #[test]
        fn prop_key_ordering_is_total(
            a in "[a-z0-9]{1,6}",
            b in "[a-z0-9]{1,6}",
        ) {
            let (a, b) = (ChildKey::new(a), ChildKey::new(b));
            proptest::prop_assert_eq!(a.cmp(&b), b.cmp(&a).reverse());
            proptest::prop_assert_eq!(a.cmp(&b) == Ordering::Equal, a == b);
        }
    }
}
