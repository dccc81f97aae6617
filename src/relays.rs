//! Relay list normalization.

use serde::Serialize;

/// Insertion-ordered, deduplicated set of relay addresses.
///
/// Entries are never empty and never end in `/`. Addresses are otherwise
/// opaque: no scheme or host validation happens here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RelaySet(Vec<String>);

impl RelaySet {
    /// Merge caller-supplied relays with the configured defaults.
    ///
    /// Caller entries come first so they win first-seen deduplication.
    ///
    /// ```
    /// use nostrcast::RelaySet;
    ///
    /// let set = RelaySet::sanitize(
    ///     ["wss://a/", "wss://a", "wss://b"],
    ///     ["wss://b", "wss://c"],
    /// );
    /// assert_eq!(set.as_slice(), ["wss://a", "wss://b", "wss://c"]);
    /// ```
    pub fn sanitize<C, D>(caller: C, defaults: D) -> Self
    where
        C: IntoIterator,
        C::Item: AsRef<str>,
        D: IntoIterator,
        D::Item: AsRef<str>,
    {
        let mut set = RelaySet::default();
        for relay in caller.into_iter() {
            set.insert(relay.as_ref());
        }
        for relay in defaults.into_iter() {
            set.insert(relay.as_ref());
        }
        set
    }

    /// Normalize and add `relay`. Returns `false` when it was empty or
    /// already present.
    pub fn insert(&mut self, relay: &str) -> bool {
        let relay = normalize(relay);
        if relay.is_empty() || self.contains(relay) {
            return false;
        }
        self.0.push(relay.to_string());
        true
    }

    /// Remove `relay` (after normalization). Returns `true` if it was present.
    pub fn remove(&mut self, relay: &str) -> bool {
        let relay = normalize(relay);
        let before = self.0.len();
        self.0.retain(|r| r != relay);
        self.0.len() != before
    }

    pub fn contains(&self, relay: &str) -> bool {
        let relay = normalize(relay);
        self.0.iter().any(|r| r == relay)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

impl<S: AsRef<str>> FromIterator<S> for RelaySet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        RelaySet::sanitize(iter, std::iter::empty::<&str>())
    }
}

impl<'a> IntoIterator for &'a RelaySet {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Trim whitespace and strip trailing slashes.
pub fn normalize(relay: &str) -> &str {
    relay.trim().trim_end_matches('/')
}
