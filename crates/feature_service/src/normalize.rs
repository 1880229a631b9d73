//! Attribute repair for schema drift between feature service deployments.
//!
//! Each canonical key has a fixed, ordered list of alternate spellings. When
//! the canonical key is missing or blank, the first alternate holding a
//! non-blank value is copied under the canonical key. Alternates are left in
//! place.

use scene::{Attributes, keys, value_as_string};

const RECORDING_ID_ALIASES: &[&str] = &[
    "RecordingId",
    "recordingId",
    "recording_id",
    "RECORDINGID",
    "RecordingID",
    "recording",
    "rec_id",
];

const ITEM_ID_ALIASES: &[&str] = &[
    "GUID",
    "Guid",
    "frame_guid",
    "frameguid",
    "ImageId",
    "image_id",
    "item_id",
    "itemid",
];

const SCALE_ALIASES: &[&str] = &["Scale", "SCALE", "level"];

const SECTION_ALIASES: &[&str] = &["Section", "SECTION", "camera_section"];

const TIMESTAMP_ALIASES: &[&str] = &[
    "Timestamp",
    "TimeStamp",
    "TIMESTAMP",
    "time_stamp",
    "datetime",
    "recorded_at",
];

const ALIAS_TABLE: &[(&str, &[&str])] = &[
    (keys::RECORDING_ID, RECORDING_ID_ALIASES),
    (keys::ITEM_ID, ITEM_ID_ALIASES),
    (keys::SCALE, SCALE_ALIASES),
    (keys::SECTION, SECTION_ALIASES),
    (keys::TIMESTAMP, TIMESTAMP_ALIASES),
];

/// Fills missing canonical keys from their aliases.
///
/// Returns the number of keys repaired.
pub fn normalize_attributes(attrs: &mut Attributes) -> usize {
    let mut repaired = 0;
    for (canonical, aliases) in ALIAS_TABLE {
        if attrs.get(*canonical).and_then(value_as_string).is_some() {
            continue;
        }
        let found = aliases.iter().find_map(|alias| {
            let value = attrs.get(*alias)?;
            value_as_string(value).map(|_| value.clone())
        });
        if let Some(value) = found {
            attrs.insert(canonical.to_string(), value);
            repaired += 1;
        }
    }
    repaired
}

#[cfg(test)]
mod tests {
    use super::normalize_attributes;
    use scene::Attributes;
    use serde_json::json;

    fn attrs(v: serde_json::Value) -> Attributes {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn adopts_first_non_blank_alias() {
        let mut a = attrs(json!({
            "RecordingId": "",
            "recording_id": 42,
            "GUID": "abc-123",
        }));
        assert_eq!(normalize_attributes(&mut a), 2);
        assert_eq!(a["recordingid"], json!(42));
        assert_eq!(a["guid"], json!("abc-123"));
        assert_eq!(a["GUID"], json!("abc-123"));
    }

    #[test]
    fn leaves_present_canonical_values_alone() {
        let mut a = attrs(json!({
            "recordingid": "7",
            "RecordingId": "8",
            "guid": "g",
        }));
        assert_eq!(normalize_attributes(&mut a), 0);
        assert_eq!(a["recordingid"], json!("7"));
    }

    #[test]
    fn blank_canonical_value_is_replaced() {
        let mut a = attrs(json!({
            "recordingid": null,
            "rec_id": "9",
            "Timestamp": "2023-05-01T10:00:00Z",
        }));
        assert_eq!(normalize_attributes(&mut a), 2);
        assert_eq!(a["recordingid"], json!("9"));
        assert_eq!(a["timestamp"], json!("2023-05-01T10:00:00Z"));
    }

    #[test]
    fn nothing_to_repair_without_aliases() {
        let mut a = attrs(json!({ "speed": 12 }));
        assert_eq!(normalize_attributes(&mut a), 0);
        assert!(!a.contains_key("recordingid"));
    }
}
