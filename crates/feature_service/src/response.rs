//! GeoJSON feature collection decoding.

use serde::Deserialize;
use serde_json::{Map, Value};

use scene::{Attributes, Feature, FeatureId, Geometry, SharedFeature, keys, value_as_string};

use crate::error::FetchError;
use crate::normalize::normalize_attributes;

#[derive(Debug, Deserialize)]
struct RawCollection {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    features: Vec<RawFeature>,
    #[serde(rename = "totalFeatures", default)]
    total_features: Option<Value>,
    #[serde(rename = "numberReturned", default)]
    number_returned: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawFeature {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    geometry: Option<RawGeometry>,
    #[serde(default)]
    properties: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct RawGeometry {
    #[serde(default)]
    coordinates: Value,
}

/// Parsed and normalized query result.
#[derive(Debug, Clone, Default)]
pub struct FeatureCollection {
    pub features: Vec<SharedFeature>,
    /// Server-side match count, when the server reports a number.
    pub total_features: Option<u64>,
    pub number_returned: Option<u64>,
}

impl FeatureCollection {
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// Decodes a GeoJSON `FeatureCollection` body.
///
/// Features without a usable position are dropped. Features without an `id`
/// get `"{recordingid}/{guid}"` when both are known after normalization,
/// otherwise `"feature-{index}"`.
pub fn parse_collection(body: &[u8]) -> Result<FeatureCollection, FetchError> {
    let raw: RawCollection = serde_json::from_slice(body)
        .map_err(|e| FetchError::decode_with("response is not a feature collection", e))?;

    if let Some(kind) = raw.kind.as_deref() {
        if kind != "FeatureCollection" {
            return Err(FetchError::Decode {
                message: format!("unexpected GeoJSON type {kind:?}"),
                source: None,
            });
        }
    }

    let mut features = Vec::with_capacity(raw.features.len());
    for (index, f) in raw.features.into_iter().enumerate() {
        let Some((lon, lat)) = f.geometry.as_ref().and_then(|g| first_position(&g.coordinates))
        else {
            tracing::debug!(index, "dropping feature without a point position");
            continue;
        };

        let mut attributes: Attributes = f.properties.unwrap_or_default().into_iter().collect();
        normalize_attributes(&mut attributes);

        let id = f
            .id
            .as_ref()
            .and_then(value_as_string)
            .or_else(|| composite_id(&attributes))
            .unwrap_or_else(|| format!("feature-{index}"));

        features.push(
            Feature::new(FeatureId::new(id), Geometry::new(lon, lat), attributes).shared(),
        );
    }

    Ok(FeatureCollection {
        features,
        total_features: raw.total_features.as_ref().and_then(Value::as_u64),
        number_returned: raw.number_returned,
    })
}

fn composite_id(attributes: &Attributes) -> Option<String> {
    let rec = attributes.get(keys::RECORDING_ID).and_then(value_as_string)?;
    let item = attributes.get(keys::ITEM_ID).and_then(value_as_string)?;
    Some(format!("{rec}/{item}"))
}

/// First `[x, y, ...]` position of any GeoJSON geometry, descending into
/// nested coordinate arrays.
fn first_position(coords: &Value) -> Option<(f64, f64)> {
    let arr = coords.as_array()?;
    match arr.first()? {
        Value::Array(_) => first_position(&arr[0]),
        first => {
            let x = first.as_f64()?;
            let y = arr.get(1)?.as_f64()?;
            Some((x, y))
        }
    }
}
