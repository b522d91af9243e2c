use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod image_set;
pub mod outcome;
pub mod record;

// Re-exports for convenience
pub use image_set::*;
pub use outcome::*;
pub use record::*;

/// Label→value pairs preserved in the source page's own language, kept
/// verbatim for audit alongside the normalized schema.
pub type RawFieldDictionary = BTreeMap<String, String>;

/// One listing to process, with its synthetic per-run label (`car1`, `car2`,
/// …) assigned in processing order. Labels are stable only within a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListingReference {
    pub url: String,
    pub label: String,
}

impl ListingReference {
    pub fn new(url: impl Into<String>, index: usize) -> Self {
        Self {
            url: url.into(),
            label: label_for(index),
        }
    }
}

/// Synthetic sequence label for the zero-based processing index.
pub fn label_for(index: usize) -> String {
    format!("car{}", index + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_are_one_based() {
        assert_eq!(label_for(0), "car1");
        assert_eq!(label_for(9), "car10");
    }

    #[test]
    fn test_reference_carries_label() {
        let reference = ListingReference::new("https://example.com/ad/1", 2);
        assert_eq!(reference.label, "car3");
        assert_eq!(reference.url, "https://example.com/ad/1");
    }
}
