// SPDX-License-Identifier: MIT OR Apache-2.0

//! Insertion-ordered key/value pairs for the mapped diagnostic context.
//!
//! Mapped contexts are short (a handful of keys per scope), so entries live in a
//! `Vec` and lookups are linear.  Overwriting a key keeps its original position,
//! which is what callers observe when they iterate pending entries.

use std::fmt::{Display, Formatter};

/// An insertion-ordered string map with last-write-wins semantics.
///
/// ```
/// use logscope::MappedEntries;
///
/// let mut entries = MappedEntries::new();
/// entries.insert("request", "1");
/// entries.insert("user", "alice");
/// entries.insert("request", "2");
///
/// let keys: Vec<&str> = entries.keys().collect();
/// assert_eq!(keys, ["request", "user"]);
/// assert_eq!(entries.get("request"), Some("2"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct MappedEntries {
    entries: Vec<(String, String)>,
}

impl MappedEntries {
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Sets `key` to `value`.
    ///
    /// A new key is appended.  An existing key keeps its slot and only the value
    /// changes.  Returns the value that was replaced, if any.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Removes `key`, keeping the relative order of the remaining entries.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (&str, &str)> + ExactSizeIterator {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl DoubleEndedIterator<Item = &str> + ExactSizeIterator {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Returns a copy with every key rewritten to `prefix + key`.
    ///
    /// The prefix is prepended verbatim; no separator is inserted.
    ///
    /// ```
    /// use logscope::MappedEntries;
    ///
    /// let person: MappedEntries = [("name", "John"), ("dob", "20010821")].into_iter().collect();
    /// let prefixed = person.with_prefix("employee.");
    /// assert_eq!(prefixed.get("employee.name"), Some("John"));
    /// assert_eq!(prefixed.get("name"), None);
    /// ```
    pub fn with_prefix(&self, prefix: &str) -> MappedEntries {
        self.iter()
            .map(|(k, v)| (format!("{prefix}{k}"), v.to_owned()))
            .collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MappedEntries {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut entries = MappedEntries::new();
        entries.extend(iter);
        entries
    }
}

impl<K: Into<String>, V: Into<String>> Extend<(K, V)> for MappedEntries {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (k, v) in iter {
            self.insert(k, v);
        }
    }
}

impl IntoIterator for MappedEntries {
    type Item = (String, String);
    type IntoIter = std::vec::IntoIter<(String, String)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a MappedEntries {
    type Item = (&'a str, &'a str);
    type IntoIter = std::iter::Map<
        std::slice::Iter<'a, (String, String)>,
        fn(&'a (String, String)) -> (&'a str, &'a str),
    >;

    fn into_iter(self) -> Self::IntoIter {
        fn as_pair(entry: &(String, String)) -> (&str, &str) {
            (entry.0.as_str(), entry.1.as_str())
        }
        self.entries
            .iter()
            .map(as_pair as fn(&'a (String, String)) -> (&'a str, &'a str))
    }
}

/// Renders as `{k1=v1, k2=v2}`.
impl Display for MappedEntries {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("{")?;
        for (i, (k, v)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{k}={v}")?;
        }
        f.write_str("}")
    }
}
