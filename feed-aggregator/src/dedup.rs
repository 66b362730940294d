use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{HashSet, VecDeque};

/// Content hashes seen across runs. Bounded by [`DedupStore::truncate`],
/// which evicts the oldest insertions first.
#[derive(Debug, Clone, Default)]
pub struct DedupStore {
    order: VecDeque<String>,
    members: HashSet<String>,
}

impl DedupStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.members.contains(hash)
    }

    /// Returns `true` when the hash was not present. Check and insert happen
    /// together so two callers can never both claim the same hash.
    pub fn insert(&mut self, hash: &str) -> bool {
        if self.members.contains(hash) {
            return false;
        }
        self.members.insert(hash.to_string());
        self.order.push_back(hash.to_string());
        true
    }

    /// Keeps only the `keep` most recently inserted hashes.
    pub fn truncate(&mut self, keep: usize) {
        while self.order.len() > keep {
            if let Some(oldest) = self.order.pop_front() {
                self.members.remove(&oldest);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }
}

impl FromIterator<String> for DedupStore {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        let mut store = DedupStore::new();
        for hash in iter {
            store.insert(&hash);
        }
        store
    }
}

impl Serialize for DedupStore {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.order.iter())
    }
}

impl<'de> Deserialize<'de> for DedupStore {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let hashes = Vec::<String>::deserialize(deserializer)?;
        Ok(hashes.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_insert_of_same_hash_loses() {
        let mut store = DedupStore::new();
        assert!(store.insert("aaaa"));
        assert!(!store.insert("aaaa"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn evicts_in_insertion_order() {
        let mut store = DedupStore::new();
        store.insert("a");
        store.insert("b");
        store.insert("c");
        store.truncate(2);
        assert!(!store.contains("a"));
        assert_eq!(store.iter().collect::<Vec<_>>(), vec!["b", "c"]);
    }

    #[test]
    fn serializes_as_plain_list() {
        let store: DedupStore = vec!["x".to_string(), "y".to_string(), "x".to_string()]
            .into_iter()
            .collect();
        assert_eq!(serde_json::to_string(&store).unwrap(), r#"["x","y"]"#);

        let back: DedupStore = serde_json::from_str(r#"["x","y"]"#).unwrap();
        assert!(back.contains("y"));
    }
}
