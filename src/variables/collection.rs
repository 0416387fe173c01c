//! Ordered multi-valued collections (ARGS, REQUEST_HEADERS, TX, ...).

use crate::parser::Selection;

/// Insertion-ordered key/value pairs with case-insensitive keys.
///
/// A key may appear more than once (`a=1&a=2`); [`Collection::set`]
/// collapses it to a single value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Collection {
    entries: Vec<(String, String)>,
}

impl Collection {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value, keeping earlier values for the same key.
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.push((key.into(), value.into()));
    }

    /// Replace every value of `key` with `value`.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        self.remove(&key);
        self.entries.push((key, value.into()));
    }

    /// Remove every value of `key`; returns whether anything was removed.
    pub fn remove(&mut self, key: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(k, _)| !k.eq_ignore_ascii_case(key));
        self.entries.len() != before
    }

    /// Add `delta` to the integer value of `key`.
    ///
    /// A missing or non-numeric value counts as zero.
    pub fn add_numeric(&mut self, key: &str, delta: i64) -> i64 {
        let current = self
            .get(key)
            .and_then(|v| v.trim().parse::<i64>().ok())
            .unwrap_or(0);
        let next = current.saturating_add(delta);
        self.set(key, next.to_string());
        next
    }

    /// First value of `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Whether `key` is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// All pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Pairs whose key is picked by `selection` (all pairs for `None`).
    pub fn select<'a>(
        &'a self,
        selection: Option<&'a Selection>,
    ) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        self.iter()
            .filter(move |(k, _)| selection.map_or(true, |s| s.matches(k)))
    }

    /// Number of values.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the collection is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of key and value lengths.
    pub fn combined_size(&self) -> usize {
        self.entries.iter().map(|(k, v)| k.len() + v.len()).sum()
    }

    /// Move every pair of `other` into this collection.
    pub fn extend(&mut self, other: Collection) {
        self.entries.extend(other.entries);
    }
}

impl FromIterator<(String, String)> for Collection {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_single_variable;

    #[test]
    fn test_multi_values_keep_order() {
        let mut c = Collection::new();
        c.add("a", "1");
        c.add("b", "2");
        c.add("A", "3");
        assert_eq!(c.len(), 3);
        assert_eq!(c.get("a"), Some("1"));
        let keys: Vec<_> = c.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "b", "A"]);
    }

    #[test]
    fn test_set_collapses_case_insensitively() {
        let mut c = Collection::new();
        c.add("Score", "1");
        c.add("score", "2");
        c.set("SCORE", "9");
        assert_eq!(c.len(), 1);
        assert_eq!(c.get("score"), Some("9"));
    }

    #[test]
    fn test_add_numeric() {
        let mut c = Collection::new();
        assert_eq!(c.add_numeric("score", 5), 5);
        assert_eq!(c.add_numeric("score", -2), 3);
        c.set("word", "abc");
        assert_eq!(c.add_numeric("word", 1), 1);
        c.set("big", i64::MAX.to_string());
        assert_eq!(c.add_numeric("big", 1), i64::MAX);
    }

    #[test]
    fn test_select() {
        let mut c = Collection::new();
        c.add("user_id", "1");
        c.add("username", "bob");
        c.add("page", "2");

        let spec = parse_single_variable("ARGS:user*").unwrap();
        let picked: Vec<_> = c.select(spec.selection.as_ref()).collect();
        assert_eq!(picked, vec![("user_id", "1"), ("username", "bob")]);

        let spec = parse_single_variable("ARGS:/^PAGE$/").unwrap();
        assert_eq!(c.select(spec.selection.as_ref()).count(), 1);
        assert_eq!(c.select(None).count(), 3);
    }
}
