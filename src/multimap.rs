//! Insertion-ordered multi-valued maps.
//!
//! Query parameters, matrix parameters, headers, cookies and form fields all
//! allow repeated keys, and their wire order must follow the order in which
//! values were bound. [`MultiMap`] keeps the first-insertion order of keys and
//! the insertion order of values under each key.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MultiMap {
    entries: IndexMap<String, Vec<String>>,
}

impl MultiMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a value under `key`, keeping any existing values.
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.entry(key.into()).or_default().push(value.into());
    }

    /// Replaces every value under `key` with a single value.
    pub fn put_single(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), vec![value.into()]);
    }

    /// Copies every key of `other` into `self`, replacing existing keys.
    pub fn put_all(&mut self, other: &Self) {
        for (key, values) in &other.entries {
            match self.find_key(key) {
                Some(existing) => {
                    self.entries.insert(existing, values.clone());
                }
                None => {
                    self.entries.insert(key.clone(), values.clone());
                }
            }
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    #[must_use]
    pub fn get_first(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(|values| values.first()).map(String::as_str)
    }

    /// Case-insensitive lookup, for header names.
    #[must_use]
    pub fn get_ignore_case(&self, key: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, values)| values.as_slice())
    }

    #[must_use]
    pub fn get_first_ignore_case(&self, key: &str) -> Option<&str> {
        self.get_ignore_case(key)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    #[must_use]
    pub fn contains_key_ignore_case(&self, key: &str) -> bool {
        self.entries.keys().any(|k| k.eq_ignore_ascii_case(key))
    }

    pub fn remove(&mut self, key: &str) -> Option<Vec<String>> {
        self.entries.shift_remove(key)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Iterates keys with their values, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(key, values)| (key.as_str(), values.as_slice()))
    }

    /// Flattens into `(key, value)` pairs, one per value.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().flat_map(|(key, values)| {
            values
                .iter()
                .map(move |value| (key.as_str(), value.as_str()))
        })
    }

    fn find_key(&self, key: &str) -> Option<String> {
        self.entries
            .keys()
            .find(|k| k.eq_ignore_ascii_case(key))
            .cloned()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MultiMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (key, value) in iter {
            map.add(key, value);
        }
        map
    }
}
