use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Packages downloaded in earlier sessions and the hash they had at the time.
///
/// Persisted as a flat JSON object: `{ "tamods-dll": "<etag>", ... }`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompletedSet {
    entries: BTreeMap<String, String>,
}

impl CompletedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finished download. Returns `false` if the same hash was
    /// already recorded for this id.
    pub fn record(&mut self, id: impl Into<String>, hash: impl Into<String>) -> bool {
        let id = id.into();
        let hash = hash.into();
        if self.entries.get(&id) == Some(&hash) {
            return false;
        }
        self.entries.insert(id, hash);
        true
    }

    pub fn remove(&mut self, id: &str) -> Option<String> {
        self.entries.remove(id)
    }

    pub fn hash_of(&self, id: &str) -> Option<&str> {
        self.entries.get(id).map(String::as_str)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for CompletedSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_is_idempotent() {
        let mut set = CompletedSet::new();
        assert!(set.record("A", "hash1"));
        assert!(!set.record("A", "hash1"));
        assert_eq!(set.len(), 1);
        assert_eq!(set.hash_of("A"), Some("hash1"));
    }

    #[test]
    fn record_overwrites_new_hash() {
        let mut set: CompletedSet = [("A", "old")].into_iter().collect();
        assert!(set.record("A", "new"));
        assert_eq!(set.len(), 1);
        assert_eq!(set.hash_of("A"), Some("new"));
    }

    #[test]
    fn serializes_as_flat_object() {
        let set: CompletedSet = [("tamods-dll", "abc"), ("community-maps", "def")]
            .into_iter()
            .collect();
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, r#"{"community-maps":"def","tamods-dll":"abc"}"#);

        let back: CompletedSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, set);
    }
}
