//! Insertion-ordered node sets.
//!
//! Graph identification works over node-name sets whose iteration order is
//! topologically meaningful. Set algebra here preserves the order of the
//! left-hand operand; a plain `HashSet` would silently re-sort and break the
//! truncated-factorization ordering downstream.

use serde::{Deserialize, Serialize};

/// An ordered, duplicate-free set of node names.
///
/// `union`, `difference` and `intersection` keep the insertion order of
/// `self` (union appends the right-hand remainder in its own order).
/// Equality is set equality: order does not participate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderedSet {
    items: Vec<String>,
}

impl OrderedSet {
    /// Empty set.
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Single-element set.
    pub fn singleton(name: impl Into<String>) -> Self {
        Self { items: vec![name.into()] }
    }

    /// Insert at the end; returns `false` if the element was already present.
    pub fn insert(&mut self, name: impl Into<String>) -> bool {
        let name = name.into();
        if self.items.iter().any(|x| *x == name) {
            false
        } else {
            self.items.push(name);
            true
        }
    }

    /// Membership test.
    pub fn contains(&self, name: &str) -> bool {
        self.items.iter().any(|x| x == name)
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterate in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.items.iter()
    }

    /// Elements as a slice, in insertion order.
    pub fn as_slice(&self) -> &[String] {
        &self.items
    }

    /// `self ∪ other`, keeping `self`'s order first.
    pub fn union(&self, other: &OrderedSet) -> OrderedSet {
        let mut out = self.clone();
        for name in other.iter() {
            out.insert(name.clone());
        }
        out
    }

    /// `self − other`, in `self`'s order.
    pub fn difference(&self, other: &OrderedSet) -> OrderedSet {
        OrderedSet {
            items: self.items.iter().filter(|x| !other.contains(x)).cloned().collect(),
        }
    }

    /// `self ∩ other`, in `self`'s order.
    pub fn intersection(&self, other: &OrderedSet) -> OrderedSet {
        OrderedSet {
            items: self.items.iter().filter(|x| other.contains(x)).cloned().collect(),
        }
    }

    /// Whether every element of `self` is in `other`.
    pub fn is_subset(&self, other: &OrderedSet) -> bool {
        self.items.iter().all(|x| other.contains(x))
    }
}

impl PartialEq for OrderedSet {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.is_subset(other)
    }
}

impl Eq for OrderedSet {}

impl<S: Into<String>> FromIterator<S> for OrderedSet {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        let mut set = OrderedSet::new();
        for item in iter {
            set.insert(item);
        }
        set
    }
}

impl<'a> IntoIterator for &'a OrderedSet {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl std::fmt::Display for OrderedSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{{}}}", self.items.join(","))
    }
}
