//! Upload-Metadata header codec.
//!
//! Wire format: comma-separated entries, each `"<key> <base64(utf8(value))>"`.
//!
//! Parsing is lenient per entry: an entry without a value half, or whose
//! value is not valid base64, is dropped on its own and the rest of the
//! header is still accepted. This never fails the whole parse.

use base64::{Engine as _, engine::general_purpose};
use serde::{Deserialize, Serialize};

/// Ordered client-declared attributes of an upload (filename, contentType, ...).
///
/// Insertion order is preserved so the header re-serializes in the order it
/// was received. A repeated key keeps its first position and its last value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UploadMetadata {
    entries: Vec<(String, String)>,
}

impl UploadMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an Upload-Metadata header value.
    pub fn parse_header(header: &str) -> Self {
        let mut metadata = Self::new();
        if header.trim().is_empty() {
            return metadata;
        }

        for pair in header.split(',') {
            let Some((key, encoded)) = pair.trim().split_once(' ') else {
                continue;
            };
            let Ok(decoded) = general_purpose::STANDARD.decode(encoded.trim()) else {
                continue;
            };
            metadata.insert(key, String::from_utf8_lossy(&decoded).into_owned());
        }

        metadata
    }

    /// Serialize back into the header format used at creation.
    pub fn to_header(&self) -> String {
        self.entries
            .iter()
            .map(|(key, value)| format!("{key} {}", general_purpose::STANDARD.encode(value)))
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn parses_well_formed_header() {
        // "report.pdf" / "application/pdf"
        let metadata = UploadMetadata::parse_header(
            "filename cmVwb3J0LnBkZg==,contentType YXBwbGljYXRpb24vcGRm",
        );

        assert_eq!(metadata.len(), 2);
        assert_eq!(metadata.get("filename"), Some("report.pdf"));
        assert_eq!(metadata.get("contentType"), Some("application/pdf"));
    }

    #[test]
    fn header_round_trips_in_insertion_order() {
        let header = "filename cmVwb3J0LnBkZg==,contentType YXBwbGljYXRpb24vcGRm";
        let metadata = UploadMetadata::parse_header(header);

        assert_eq!(metadata.to_header(), header);
    }

    #[rstest]
    #[case::missing_value("filename,contentType YXBwbGljYXRpb24vcGRm")]
    #[case::invalid_base64("filename !!!not-base64!!!,contentType YXBwbGljYXRpb24vcGRm")]
    #[case::empty_entry(",contentType YXBwbGljYXRpb24vcGRm,")]
    fn malformed_entries_are_dropped_individually(#[case] header: &str) {
        let metadata = UploadMetadata::parse_header(header);

        assert_eq!(metadata.len(), 1);
        assert_eq!(metadata.get("filename"), None);
        assert_eq!(metadata.get("contentType"), Some("application/pdf"));
    }

    #[rstest]
    #[case::empty("")]
    #[case::whitespace("   ")]
    fn blank_header_is_empty(#[case] header: &str) {
        assert!(UploadMetadata::parse_header(header).is_empty());
    }

    #[test]
    fn repeated_key_keeps_position_and_last_value() {
        // "a" / "b" / "c"
        let metadata = UploadMetadata::parse_header("k YQ==,other Yg==,k Yw==");

        let entries: Vec<_> = metadata.iter().collect();
        assert_eq!(entries, vec![("k", "c"), ("other", "b")]);
    }

    #[test]
    fn empty_metadata_serializes_to_empty_header() {
        assert_eq!(UploadMetadata::new().to_header(), "");
    }

    #[test]
    fn non_ascii_values_are_utf8_encoded() {
        let mut metadata = UploadMetadata::new();
        metadata.insert("filename", "資料.pdf");

        let parsed = UploadMetadata::parse_header(&metadata.to_header());
        assert_eq!(parsed.get("filename"), Some("資料.pdf"));
    }
}
