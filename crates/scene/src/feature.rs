use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, NaiveDateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Canonical attribute keys. Responses that spell these differently are
/// repaired during fetch normalization.
pub mod keys {
    pub const RECORDING_ID: &str = "recordingid";
    pub const ITEM_ID: &str = "guid";
    pub const SCALE: &str = "scale";
    pub const SECTION: &str = "section";
    pub const TIMESTAMP: &str = "timestamp";
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FeatureId(pub String);

impl FeatureId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for FeatureId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Point location, longitude first.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    pub lon: f64,
    pub lat: f64,
}

impl Geometry {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }
}

pub type Attributes = BTreeMap<String, Value>;

/// Object detected in a feature's imagery. Produced by the detection
/// collaborator, carried here so rendering can show it next to the feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub label: String,
    pub confidence: f32,
    /// Pixel box in the source image: `[x_min, y_min, x_max, y_max]`.
    pub bbox: [f32; 4],
}

/// A geo-located 360° capture point returned by the feature service.
///
/// Identity, location and attributes are fixed once the fetcher hands the
/// feature out. The selection flag and detection list are the only mutable
/// parts and use interior mutability so features can be shared via `Arc`
/// between query results and the selection.
#[derive(Debug)]
pub struct Feature {
    pub id: FeatureId,
    pub geometry: Geometry,
    pub attributes: Attributes,
    selected: AtomicBool,
    detections: Mutex<Vec<DetectionResult>>,
}

pub type SharedFeature = Arc<Feature>;

impl Feature {
    pub fn new(id: FeatureId, geometry: Geometry, attributes: Attributes) -> Self {
        Self {
            id,
            geometry,
            attributes,
            selected: AtomicBool::new(false),
            detections: Mutex::new(Vec::new()),
        }
    }

    pub fn shared(self) -> SharedFeature {
        Arc::new(self)
    }

    /// Attribute rendered as text. Empty strings and nulls count as absent.
    pub fn attr_str(&self, key: &str) -> Option<String> {
        self.attributes.get(key).and_then(value_as_string)
    }

    pub fn recording_id(&self) -> Option<String> {
        self.attr_str(keys::RECORDING_ID)
    }

    pub fn item_id(&self) -> Option<String> {
        self.attr_str(keys::ITEM_ID)
    }

    pub fn scale(&self) -> Option<String> {
        self.attr_str(keys::SCALE)
    }

    pub fn section(&self) -> Option<String> {
        self.attr_str(keys::SECTION)
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.attr_str(keys::TIMESTAMP)
            .and_then(|s| parse_timestamp(&s))
    }

    pub fn is_selected(&self) -> bool {
        self.selected.load(Ordering::Acquire)
    }

    pub(crate) fn set_selected(&self, selected: bool) {
        self.selected.store(selected, Ordering::Release);
    }

    pub fn push_detections(&self, results: impl IntoIterator<Item = DetectionResult>) {
        self.detections.lock().extend(results);
    }

    pub fn detections(&self) -> Vec<DetectionResult> {
        self.detections.lock().clone()
    }

    pub fn detection_count(&self) -> usize {
        self.detections.lock().len()
    }
}

pub fn value_as_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Accepts RFC 3339 as well as the zone-less forms databases tend to emit,
/// which are taken as UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn feature_with(attrs: Value) -> Feature {
        let attributes: Attributes = serde_json::from_value(attrs).unwrap();
        Feature::new(FeatureId::new("f"), Geometry::new(4.9, 52.3), attributes)
    }

    #[test]
    fn attr_str_skips_blank_and_null_values() {
        let f = feature_with(json!({
            "recordingid": 17,
            "guid": "  ",
            "scale": null,
            "section": "2",
        }));
        assert_eq!(f.recording_id().as_deref(), Some("17"));
        assert_eq!(f.item_id(), None);
        assert_eq!(f.scale(), None);
        assert_eq!(f.section().as_deref(), Some("2"));
    }

    #[test]
    fn timestamps_parse_with_and_without_zone() {
        let zoned = parse_timestamp("2023-05-01T10:00:00+02:00").unwrap();
        let naive = parse_timestamp("2023-05-01 08:00:00.250").unwrap();
        assert_eq!(zoned.timestamp(), naive.timestamp());
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn detections_are_appended_in_order() {
        let f = feature_with(json!({}));
        f.push_detections([DetectionResult {
            label: "sign".into(),
            confidence: 0.9,
            bbox: [0.0, 0.0, 10.0, 10.0],
        }]);
        f.push_detections([DetectionResult {
            label: "pole".into(),
            confidence: 0.4,
            bbox: [5.0, 5.0, 8.0, 30.0],
        }]);
        let labels: Vec<String> = f.detections().into_iter().map(|d| d.label).collect();
        assert_eq!(labels, vec!["sign", "pole"]);
        assert_eq!(f.detection_count(), 2);
    }
}
