//! Record store: the timestamped key/value directory
//!
//! Each actor owns two independent instances: the *originated* directory
//! of entries this node announces (never expired locally) and the
//! *learned* directory of entries received from remote publishers
//! (subject to the expiration sweep).

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// One timestamped value in a directory
#[derive(Debug, Clone)]
pub struct Entry {
    /// The advertised value
    pub value: String,
    /// When the entry was last written or refreshed
    pub updated_at: Instant,
}

/// Mapping from key to [`Entry`], last write wins
///
/// Mutated only by the single actor task; none of these operations block.
#[derive(Debug, Default)]
pub struct Directory {
    entries: HashMap<String, Entry>,
}

impl Directory {
    /// Create an empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert `key`, refreshing its timestamp
    ///
    /// A later put of the same key overwrites both value and timestamp.
    pub fn put(&mut self, key: &str, value: &str) {
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                updated_at: Instant::now(),
            },
        );
    }

    /// Look up a value; absent keys are simply `None`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(|e| e.value.as_str())
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the directory holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of the mapping with timestamps stripped
    ///
    /// This is the serialization form: what VALUES responses carry and
    /// what `publish_to_all` iterates.
    pub fn snapshot(&self) -> HashMap<String, String> {
        self.entries
            .iter()
            .map(|(k, e)| (k.clone(), e.value.clone()))
            .collect()
    }

    /// Remove entries older than `max_age`
    ///
    /// Keys are collected during a read-only pass and deleted afterwards,
    /// so the map is never mutated mid-iteration.
    pub fn expire(&mut self, max_age: Duration) {
        let now = Instant::now();
        let stale: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, e)| now.duration_since(e.updated_at) > max_age)
            .map(|(k, _)| k.clone())
            .collect();

        for key in stale {
            tracing::debug!("expiring '{}'", key);
            self.entries.remove(&key);
        }
    }
}

/// Merge `from` into `into`, last write wins on key collision
///
/// Merging the same source twice leaves the destination unchanged after
/// the first merge.
pub fn merge(into: &mut HashMap<String, String>, from: HashMap<String, String>) {
    for (key, value) in from {
        into.insert(key, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_and_get() {
        let mut dir = Directory::new();
        dir.put("nodeA", "tcp://10.0.0.1:9200");

        assert_eq!(dir.get("nodeA"), Some("tcp://10.0.0.1:9200"));
        assert_eq!(dir.get("nodeB"), None);
        assert_eq!(dir.len(), 1);
    }

    #[test]
    fn test_last_write_wins() {
        let mut dir = Directory::new();
        dir.put("nodeA", "tcp://10.0.0.1:9200");
        dir.put("nodeA", "tcp://10.0.0.2:9200");

        assert_eq!(dir.get("nodeA"), Some("tcp://10.0.0.2:9200"));
        assert_eq!(dir.len(), 1);
    }

    #[test]
    fn test_expire_removes_only_stale_entries() {
        let mut dir = Directory::new();
        dir.put("old", "1");
        std::thread::sleep(Duration::from_millis(30));
        dir.put("fresh", "2");

        dir.expire(Duration::from_millis(15));
        assert_eq!(dir.get("old"), None);
        assert_eq!(dir.get("fresh"), Some("2"));
    }

    #[test]
    fn test_republish_refreshes_timestamp() {
        let mut dir = Directory::new();
        dir.put("nodeA", "1");
        std::thread::sleep(Duration::from_millis(30));
        dir.put("nodeA", "1");

        dir.expire(Duration::from_millis(15));
        assert_eq!(dir.get("nodeA"), Some("1"));
    }

    #[test]
    fn test_snapshot_strips_timestamps() {
        let mut dir = Directory::new();
        dir.put("a", "1");
        dir.put("b", "2");

        let snap = dir.snapshot();
        assert_eq!(snap.len(), 2);
        assert_eq!(snap.get("a").map(String::as_str), Some("1"));
    }

    #[test]
    fn test_merge_union_of_disjoint_sets() {
        let mut into = HashMap::from([("a".to_string(), "1".to_string())]);
        merge(&mut into, HashMap::from([("b".to_string(), "2".to_string())]));

        assert_eq!(into.len(), 2);
        assert_eq!(into.get("a").map(String::as_str), Some("1"));
        assert_eq!(into.get("b").map(String::as_str), Some("2"));
    }

    #[test]
    fn test_merge_last_write_wins() {
        let mut into = HashMap::from([("a".to_string(), "1".to_string())]);
        merge(&mut into, HashMap::from([("a".to_string(), "9".to_string())]));

        assert_eq!(into.get("a").map(String::as_str), Some("9"));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let source = HashMap::from([
            ("a".to_string(), "1".to_string()),
            ("b".to_string(), "2".to_string()),
        ]);
        let mut once = HashMap::from([("c".to_string(), "3".to_string())]);
        merge(&mut once, source.clone());
        let mut twice = once.clone();
        merge(&mut twice, source);

        assert_eq!(once, twice);
    }
}
