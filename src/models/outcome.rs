use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use super::image_set::ImageSet;
use super::record::NormalizedRecord;
use super::RawFieldDictionary;

/// Fully extracted listing: normalized record flattened next to the url,
/// plus the verbatim source-language dictionary and the image sequence.
#[derive(Debug, Clone, Serialize)]
pub struct ListingDetails {
    pub url: String,
    #[serde(flatten)]
    pub record: NormalizedRecord,
    pub fields_raw: RawFieldDictionary,
    pub images: ImageSet,
}

/// Exactly one of the two shapes per label: a populated record or an error
/// marker for the item that failed.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ExtractionOutcome {
    Success(Box<ListingDetails>),
    Failure { url: String, error: String },
}

impl ExtractionOutcome {
    pub fn success(details: ListingDetails) -> Self {
        Self::Success(Box::new(details))
    }

    pub fn failure(url: impl Into<String>, error: impl Into<String>) -> Self {
        Self::Failure {
            url: url.into(),
            error: error.into(),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure { .. })
    }
}

/// Per-card outcome of the multi-card image harvest.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum HarvestOutcome {
    Images(ImageSet),
    Failure { url: String, error: String },
}

/// Label-keyed result accumulation for one run. Labels are unique and the
/// serialization order is the processing order, so this keeps its own
/// insertion-ordered entries instead of a sorted map.
#[derive(Debug, Clone, Default)]
pub struct ResultMap<T> {
    entries: Vec<(String, T)>,
}

impl<T> ResultMap<T> {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn insert(&mut self, label: impl Into<String>, value: T) {
        let label = label.into();
        debug_assert!(
            !self.entries.iter().any(|(existing, _)| *existing == label),
            "duplicate label {label}"
        );
        self.entries.push((label, value));
    }

    pub fn get(&self, label: &str) -> Option<&T> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == label)
            .map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.entries.iter().map(|(label, value)| (label.as_str(), value))
    }
}

impl<T: Serialize> Serialize for ResultMap<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (label, value) in &self.entries {
            map.serialize_entry(label, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_details() -> ListingDetails {
        let mut images = ImageSet::new();
        images.insert("https://cdn.example/1.jpg");
        let mut fields_raw = RawFieldDictionary::new();
        fields_raw.insert("Marca".to_string(), "Seat".to_string());
        ListingDetails {
            url: "https://example.com/ad/1".to_string(),
            record: NormalizedRecord {
                make: "Seat".to_string(),
                ..Default::default()
            },
            fields_raw,
            images,
        }
    }

    #[test]
    fn test_success_outcome_flattens_record() {
        let value = serde_json::to_value(ExtractionOutcome::success(sample_details())).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object["url"], "https://example.com/ad/1");
        assert_eq!(object["make"], "Seat");
        assert_eq!(object["fields_raw"]["Marca"], "Seat");
        assert_eq!(object["images"][0], "https://cdn.example/1.jpg");
        assert!(!object.contains_key("record"));
        assert!(!object.contains_key("error"));
    }

    #[test]
    fn test_failure_outcome_has_only_url_and_error() {
        let outcome = ExtractionOutcome::failure("https://example.com/ad/2", "navigation timed out");
        let value = serde_json::to_value(&outcome).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object.len(), 2);
        assert_eq!(object["url"], "https://example.com/ad/2");
        assert_eq!(object["error"], "navigation timed out");
    }

    #[test]
    fn test_result_map_preserves_processing_order() {
        let mut results: ResultMap<u32> = ResultMap::new();
        for index in 0..12 {
            results.insert(format!("car{}", index + 1), index);
        }
        // car10 must sort after car9 in the artifact, which a BTreeMap
        // would not give us.
        let json = serde_json::to_string(&results).unwrap();
        let pos_nine = json.find("car9").unwrap();
        let pos_ten = json.find("car10").unwrap();
        assert!(pos_nine < pos_ten);
        assert_eq!(results.len(), 12);
    }

    #[test]
    fn test_result_map_get() {
        let mut results: ResultMap<&str> = ResultMap::new();
        results.insert("car1", "ok");
        assert_eq!(results.get("car1"), Some(&"ok"));
        assert_eq!(results.get("car2"), None);
    }

    #[test]
    fn test_harvest_outcome_shapes() {
        let mut images = ImageSet::new();
        images.insert("https://cdn.example/a.jpg");
        let ok = serde_json::to_value(HarvestOutcome::Images(images)).unwrap();
        assert!(ok.is_array());

        let failed = serde_json::to_value(HarvestOutcome::Failure {
            url: "https://example.com/search".to_string(),
            error: "card vanished".to_string(),
        })
        .unwrap();
        assert!(failed.is_object());
    }
}
