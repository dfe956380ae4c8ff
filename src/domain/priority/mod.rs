// Priority set - Ordered, duplicate-free collection of codec/format names

use std::collections::HashSet;

/// Ordered unique set of names. The first entry is the most preferred one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrioritySet {
    items: Vec<String>,
}

impl PrioritySet {
    /// Create a priority set, keeping the first occurrence of each name
    pub fn new<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let items = items
            .into_iter()
            .map(Into::into)
            .filter(|item: &String| seen.insert(item.clone()))
            .collect();
        Self { items }
    }

    /// Check membership
    pub fn member(&self, item: &str) -> bool {
        self.items.iter().any(|i| i == item)
    }

    /// Names present in both sets, in the order of `self`
    pub fn intersect(&self, other: &PrioritySet) -> PrioritySet {
        Self {
            items: self
                .items
                .iter()
                .filter(|i| other.member(i))
                .cloned()
                .collect(),
        }
    }

    /// Most preferred name
    pub fn first(&self) -> Option<&str> {
        self.items.first().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for PrioritySet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter)
    }
}
