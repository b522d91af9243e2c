use serde::ser::{Serialize, SerializeSeq, Serializer};
use std::collections::HashSet;

/// Ordered, deduplicating collection of absolute image URLs. Insertion order
/// is first-discovery order across carousel iterations; a URL is never
/// recorded twice.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageSet {
    order: Vec<String>,
    seen: HashSet<String>,
}

impl ImageSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a URL, returning true if it was not already present.
    pub fn insert(&mut self, url: impl Into<String>) -> bool {
        let url = url.into();
        if self.seen.contains(&url) {
            return false;
        }
        self.seen.insert(url.clone());
        self.order.push(url);
        true
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

    pub fn into_vec(self) -> Vec<String> {
        self.order
    }
}

impl FromIterator<String> for ImageSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        let mut set = Self::new();
        for url in iter {
            set.insert(url);
        }
        set
    }
}

impl Serialize for ImageSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.order.len()))?;
        for url in &self.order {
            seq.serialize_element(url)?;
        }
        seq.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_deduplicates() {
        let mut set = ImageSet::new();
        assert!(set.insert("https://cdn.example/a.jpg"));
        assert!(set.insert("https://cdn.example/b.jpg"));
        assert!(!set.insert("https://cdn.example/a.jpg"));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_preserves_first_discovery_order() {
        let mut set = ImageSet::new();
        set.insert("https://cdn.example/z.jpg");
        set.insert("https://cdn.example/a.jpg");
        set.insert("https://cdn.example/z.jpg");
        let urls: Vec<_> = set.iter().collect();
        assert_eq!(urls, vec!["https://cdn.example/z.jpg", "https://cdn.example/a.jpg"]);
    }

    #[test]
    fn test_serializes_as_ordered_sequence() {
        let set: ImageSet = ["https://cdn.example/2.jpg", "https://cdn.example/1.jpg"]
            .into_iter()
            .map(String::from)
            .collect();
        let value = serde_json::to_value(&set).unwrap();
        assert_eq!(
            value,
            serde_json::json!(["https://cdn.example/2.jpg", "https://cdn.example/1.jpg"])
        );
    }

    #[test]
    fn test_from_iterator_collapses_duplicates() {
        let set: ImageSet = ["a", "b", "a", "c"].into_iter().map(String::from).collect();
        assert_eq!(set.len(), 3);
    }
}
