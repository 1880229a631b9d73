//! Spatial query encoding for WFS-style feature services.
//!
//! Servers disagree on how a bounding box should be spelled: some honour the
//! plain `bbox` parameter, some only filter through CQL on a particular
//! geometry column, and some read geographic coordinates latitude first. The
//! encoder produces one primary request plus an ordered, lazily built list of
//! alternates that the fetcher walks until one returns features.

use foundation::{BoundingBox, SpatialRef};

use crate::error::FetchError;

pub const DEFAULT_VERSION: &str = "1.1.0";
pub const DEFAULT_OUTPUT_FORMAT: &str = "application/json";
pub const DEFAULT_GEOMETRY_PROPERTY: &str = "geom";
pub const DEFAULT_RECORDING_ID_ATTRIBUTE: &str = scene::keys::RECORDING_ID;

/// What the caller wants to find.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryParams {
    pub type_name: String,
    pub srs: SpatialRef,
    pub bbox: Option<BoundingBox>,
    pub recording_ids: Vec<String>,
    /// Geometry column override. Switches the primary encoding from the
    /// plain `bbox` parameter to an OGC filter on this property.
    pub geometry_property: Option<String>,
    /// Raw CQL. Takes precedence over every other filter input.
    pub filter: Option<String>,
    pub max_features: Option<u32>,
}

impl QueryParams {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            srs: SpatialRef::WGS84,
            bbox: None,
            recording_ids: Vec::new(),
            geometry_property: None,
            filter: None,
            max_features: None,
        }
    }

    pub fn with_srs(mut self, srs: SpatialRef) -> Self {
        self.srs = srs;
        self
    }

    pub fn with_bbox(mut self, bbox: BoundingBox) -> Self {
        self.bbox = Some(bbox);
        self
    }

    pub fn with_recording_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.recording_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_geometry_property(mut self, property: impl Into<String>) -> Self {
        self.geometry_property = Some(property.into());
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn with_max_features(mut self, max: u32) -> Self {
        self.max_features = Some(max);
        self
    }

    fn explicit_filter(&self) -> Option<&str> {
        self.filter.as_deref().map(str::trim).filter(|f| !f.is_empty())
    }

    fn ids(&self) -> Vec<&str> {
        self.recording_ids
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

/// How a `QuerySpec` expresses its filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterEncoding {
    /// Plain `bbox=minx,miny,maxx,maxy,EPSG:n` parameter.
    BboxParam,
    /// OGC XML `BBOX` filter on a named geometry property.
    OgcFilter { geometry_property: String },
    /// CQL `BBOX(...)` predicate.
    Cql {
        geometry_property: String,
        swapped_axes: bool,
    },
    /// CQL id list, optionally ANDed with a `BBOX(...)` predicate.
    RecordingIds {
        geometry_property: Option<String>,
        swapped_axes: bool,
    },
    /// Caller-supplied CQL passed through untouched.
    Explicit,
}

/// One fully encoded GET request, as ordered query-string pairs.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySpec {
    pub encoding: FilterEncoding,
    pub params: Vec<(String, String)>,
}

impl QuerySpec {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// An alternate encoding tried after the primary came back empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackStep {
    /// CQL bbox on `geometry_property`.
    Cql { geometry_property: String },
    /// CQL bbox on `geometry_property` with latitude and longitude exchanged.
    /// Skipped for projected spatial references.
    SwappedAxes { geometry_property: String },
}

impl FallbackStep {
    pub fn cql(geometry_property: impl Into<String>) -> Self {
        FallbackStep::Cql {
            geometry_property: geometry_property.into(),
        }
    }

    pub fn swapped_axes(geometry_property: impl Into<String>) -> Self {
        FallbackStep::SwappedAxes {
            geometry_property: geometry_property.into(),
        }
    }
}

/// Ordered alternates. The default order was worked out against GeoServer
/// and is not universal; deployments may reorder or drop steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackPolicy {
    pub steps: Vec<FallbackStep>,
}

impl FallbackPolicy {
    pub fn none() -> Self {
        Self { steps: Vec::new() }
    }
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        Self {
            steps: vec![
                FallbackStep::cql("geom"),
                FallbackStep::cql("the_geom"),
                FallbackStep::swapped_axes("geom"),
            ],
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueryEncoder {
    pub version: String,
    pub output_format: String,
    pub recording_id_attribute: String,
    pub policy: FallbackPolicy,
}

impl Default for QueryEncoder {
    fn default() -> Self {
        Self {
            version: DEFAULT_VERSION.to_string(),
            output_format: DEFAULT_OUTPUT_FORMAT.to_string(),
            recording_id_attribute: DEFAULT_RECORDING_ID_ATTRIBUTE.to_string(),
            policy: FallbackPolicy::default(),
        }
    }
}

impl QueryEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(mut self, policy: FallbackPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_recording_id_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.recording_id_attribute = attribute.into();
        self
    }

    /// Builds the first request to try.
    ///
    /// Precedence: explicit filter, then recording ids (with the bbox ANDed
    /// in when present), then the bbox alone.
    pub fn build_primary(&self, params: &QueryParams) -> Result<QuerySpec, FetchError> {
        if let Some(filter) = params.explicit_filter() {
            return Ok(self.spec(
                params,
                FilterEncoding::Explicit,
                vec![("cql_filter", filter.to_string())],
            ));
        }

        let bbox = validated_bbox(params)?;
        let ids = params.ids();

        if !ids.is_empty() {
            let property = bbox.map(|_| {
                params
                    .geometry_property
                    .clone()
                    .unwrap_or_else(|| DEFAULT_GEOMETRY_PROPERTY.to_string())
            });
            return Ok(self.ids_spec(params, &ids, bbox, property, false));
        }

        let Some(bbox) = bbox else {
            return Err(FetchError::invalid_query(
                "query needs a bounding box, recording ids or a filter",
            ));
        };

        Ok(match &params.geometry_property {
            Some(property) => self.spec(
                params,
                FilterEncoding::OgcFilter {
                    geometry_property: property.clone(),
                },
                vec![("filter", ogc_bbox_filter(property, &bbox))],
            ),
            None => self.spec(
                params,
                FilterEncoding::BboxParam,
                vec![("bbox", bbox_param(&bbox))],
            ),
        })
    }

    /// Alternates to the primary, materialised one at a time.
    ///
    /// Empty for explicit filters, for id-only queries, and for parameters
    /// the primary would reject.
    pub fn build_fallbacks<'a>(&'a self, params: &'a QueryParams) -> Fallbacks<'a> {
        let primary = self.build_primary(params).ok();
        let usable = matches!(
            primary.as_ref().map(|p| &p.encoding),
            Some(
                FilterEncoding::BboxParam
                    | FilterEncoding::OgcFilter { .. }
                    | FilterEncoding::RecordingIds {
                        geometry_property: Some(_),
                        ..
                    }
            )
        );
        let steps: &[FallbackStep] = if usable { &self.policy.steps } else { &[] };
        Fallbacks {
            encoder: self,
            params,
            steps: steps.iter(),
            sent: primary.into_iter().map(|p| p.params).collect(),
        }
    }

    fn encode_step(&self, params: &QueryParams, step: &FallbackStep) -> Option<QuerySpec> {
        let bbox = params.bbox?;
        let (property, swapped) = match step {
            FallbackStep::Cql { geometry_property } => (geometry_property.clone(), false),
            FallbackStep::SwappedAxes { geometry_property } => {
                if !bbox.srs.is_geographic() {
                    return None;
                }
                (geometry_property.clone(), true)
            }
        };

        let ids = params.ids();
        if !ids.is_empty() {
            return Some(self.ids_spec(params, &ids, Some(bbox), Some(property), swapped));
        }

        let cql = cql_bbox(&property, &bbox, swapped);
        Some(self.spec(
            params,
            FilterEncoding::Cql {
                geometry_property: property,
                swapped_axes: swapped,
            },
            vec![("cql_filter", cql)],
        ))
    }

    fn ids_spec(
        &self,
        params: &QueryParams,
        ids: &[&str],
        bbox: Option<BoundingBox>,
        property: Option<String>,
        swapped: bool,
    ) -> QuerySpec {
        let mut cql = ids_predicate(&self.recording_id_attribute, ids);
        if let (Some(bbox), Some(property)) = (bbox, property.as_deref()) {
            cql = format!("({cql}) AND {}", cql_bbox(property, &bbox, swapped));
        }
        self.spec(
            params,
            FilterEncoding::RecordingIds {
                geometry_property: property,
                swapped_axes: swapped,
            },
            vec![("cql_filter", cql)],
        )
    }

    fn spec(
        &self,
        params: &QueryParams,
        encoding: FilterEncoding,
        filter: Vec<(&'static str, String)>,
    ) -> QuerySpec {
        let mut out: Vec<(String, String)> = vec![
            ("service".into(), "WFS".into()),
            ("request".into(), "GetFeature".into()),
            ("version".into(), self.version.clone()),
            ("typeName".into(), params.type_name.clone()),
            ("outputFormat".into(), self.output_format.clone()),
            ("srsName".into(), params.srs.urn()),
        ];
        out.extend(filter.into_iter().map(|(k, v)| (k.to_string(), v)));
        if let Some(max) = params.max_features {
            out.push(("maxFeatures".into(), max.to_string()));
        }
        QuerySpec {
            encoding,
            params: out,
        }
    }
}

/// Lazy, single-pass sequence of fallback specs. Steps that do not apply
/// to the query, or that would send a request already sent (the primary
/// included), are skipped.
#[derive(Debug)]
pub struct Fallbacks<'a> {
    encoder: &'a QueryEncoder,
    params: &'a QueryParams,
    steps: std::slice::Iter<'a, FallbackStep>,
    sent: Vec<Vec<(String, String)>>,
}

impl Iterator for Fallbacks<'_> {
    type Item = QuerySpec;

    fn next(&mut self) -> Option<QuerySpec> {
        loop {
            let step = self.steps.next()?;
            let Some(spec) = self.encoder.encode_step(self.params, step) else {
                continue;
            };
            // Swapping a box symmetric about the diagonal changes nothing.
            if self.sent.contains(&spec.params) {
                continue;
            }
            self.sent.push(spec.params.clone());
            return Some(spec);
        }
    }
}

fn validated_bbox(params: &QueryParams) -> Result<Option<BoundingBox>, FetchError> {
    match params.bbox {
        Some(b) if !b.is_valid() => Err(FetchError::invalid_query(format!(
            "bounding box is empty or inverted: {:?}",
            b.coords()
        ))),
        Some(b) if b.srs != params.srs => Err(FetchError::invalid_query(format!(
            "bounding box is in {} but the query asks for {}",
            b.srs.urn(),
            params.srs.urn()
        ))),
        other => Ok(other),
    }
}

fn bbox_param(b: &BoundingBox) -> String {
    format!(
        "{},{},{},{},{}",
        b.min_x,
        b.min_y,
        b.max_x,
        b.max_y,
        b.srs.urn()
    )
}

fn cql_bbox(property: &str, b: &BoundingBox, swapped: bool) -> String {
    let b = if swapped { b.swapped_axes() } else { *b };
    format!(
        "BBOX({property},{},{},{},{},'{}')",
        b.min_x,
        b.min_y,
        b.max_x,
        b.max_y,
        b.srs.urn()
    )
}

fn ogc_bbox_filter(property: &str, b: &BoundingBox) -> String {
    format!(
        concat!(
            r#"<Filter xmlns="http://www.opengis.net/ogc" xmlns:gml="http://www.opengis.net/gml">"#,
            "<BBOX><PropertyName>{}</PropertyName>",
            r#"<gml:Envelope srsName="{}">"#,
            "<gml:lowerCorner>{} {}</gml:lowerCorner>",
            "<gml:upperCorner>{} {}</gml:upperCorner>",
            "</gml:Envelope></BBOX></Filter>"
        ),
        xml_escape(property),
        b.srs.urn(),
        b.min_x,
        b.min_y,
        b.max_x,
        b.max_y
    )
}

/// `attr IN ('a','b')`, with embedded quotes doubled.
fn ids_predicate(attribute: &str, ids: &[&str]) -> String {
    let quoted: Vec<String> = ids
        .iter()
        .map(|id| format!("'{}'", id.replace('\'', "''")))
        .collect();
    format!("{attribute} IN ({})", quoted.join(","))
}

fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn unit_box() -> BoundingBox {
        BoundingBox::new(-1.0, -1.0, 1.0, 1.0)
    }

    fn params() -> QueryParams {
        QueryParams::new("horus:frames").with_bbox(unit_box())
    }

    fn filters(specs: impl Iterator<Item = QuerySpec>) -> Vec<String> {
        specs
            .map(|s| s.param("cql_filter").unwrap_or_default().to_string())
            .collect()
    }

    #[test]
    fn primary_uses_bbox_parameter() {
        let spec = QueryEncoder::new().build_primary(&params()).unwrap();
        assert_eq!(spec.encoding, FilterEncoding::BboxParam);
        assert_eq!(spec.param("bbox"), Some("-1,-1,1,1,EPSG:4326"));
        assert_eq!(spec.param("service"), Some("WFS"));
        assert_eq!(spec.param("request"), Some("GetFeature"));
        assert_eq!(spec.param("typeName"), Some("horus:frames"));
        assert_eq!(spec.param("srsName"), Some("EPSG:4326"));
        assert_eq!(spec.param("maxFeatures"), None);
    }

    #[test]
    fn primary_never_drops_a_coordinate() {
        let boxes = [
            BoundingBox::new(4.4719, 51.9225, 4.4801, 51.9301),
            BoundingBox::new(-180.0, -90.0, 180.0, 90.0),
            BoundingBox::new(0.1, 0.2, 0.30000000000000004, 1e-7 + 0.2),
            BoundingBox::with_srs(92000.5, 437000.25, 93000.0, 438000.0, SpatialRef(28992)),
        ];
        let encoder = QueryEncoder::new();
        for b in boxes {
            for p in [
                QueryParams::new("t").with_srs(b.srs).with_bbox(b),
                QueryParams::new("t")
                    .with_srs(b.srs)
                    .with_bbox(b)
                    .with_geometry_property("shape"),
            ] {
                let spec = encoder.build_primary(&p).unwrap();
                let text = spec.param("bbox").or(spec.param("filter")).unwrap();
                for c in b.coords() {
                    assert!(text.contains(&c.to_string()), "{c} missing from {text}");
                }
            }
        }
    }

    #[test]
    fn geometry_override_switches_to_ogc_filter() {
        let p = params().with_geometry_property("shape");
        let spec = QueryEncoder::new().build_primary(&p).unwrap();
        assert_eq!(
            spec.encoding,
            FilterEncoding::OgcFilter {
                geometry_property: "shape".into()
            }
        );
        let filter = spec.param("filter").unwrap();
        assert!(filter.contains("<PropertyName>shape</PropertyName>"));
        assert!(filter.contains("<gml:lowerCorner>-1 -1</gml:lowerCorner>"));
        assert!(spec.param("bbox").is_none());
    }

    #[test]
    fn explicit_filter_wins_over_everything() {
        let p = params()
            .with_geometry_property("shape")
            .with_recording_ids(["r1"])
            .with_filter("speed > 10");
        let encoder = QueryEncoder::new();
        let spec = encoder.build_primary(&p).unwrap();
        assert_eq!(spec.encoding, FilterEncoding::Explicit);
        assert_eq!(spec.param("cql_filter"), Some("speed > 10"));
        assert!(spec.param("bbox").is_none());
        assert!(spec.param("filter").is_none());
        assert_eq!(encoder.build_fallbacks(&p).count(), 0);
    }

    #[test]
    fn missing_filter_input_is_rejected() {
        let err = QueryEncoder::new()
            .build_primary(&QueryParams::new("t"))
            .unwrap_err();
        assert!(matches!(err, FetchError::InvalidQuery(_)));

        let inverted = QueryParams::new("t").with_bbox(BoundingBox::new(1.0, 1.0, -1.0, -1.0));
        let err = QueryEncoder::new().build_primary(&inverted).unwrap_err();
        assert!(matches!(err, FetchError::InvalidQuery(_)));
        assert_eq!(QueryEncoder::new().build_fallbacks(&inverted).count(), 0);
    }

    #[test]
    fn default_fallbacks_follow_policy_order() {
        let p = params();
        let encoder = QueryEncoder::new();
        assert_eq!(
            filters(encoder.build_fallbacks(&p)),
            vec![
                "BBOX(geom,-1,-1,1,1,'EPSG:4326')",
                "BBOX(the_geom,-1,-1,1,1,'EPSG:4326')",
            ]
        );
    }

    #[test]
    fn fallbacks_never_repeat_a_request() {
        let p = params();
        let encoder = QueryEncoder::new();
        let primary = encoder.build_primary(&p).unwrap();
        let mut seen = vec![primary.params];
        for spec in encoder.build_fallbacks(&p) {
            assert!(!seen.contains(&spec.params), "repeated {:?}", spec.param("cql_filter"));
            seen.push(spec.params);
        }
        assert_eq!(seen.len(), 3);

        // An asymmetric box keeps the swapped step.
        let p = QueryParams::new("t").with_bbox(BoundingBox::new(4.0, 52.0, 5.0, 53.0));
        assert_eq!(encoder.build_fallbacks(&p).count(), 3);
    }

    #[test]
    fn bbox_in_another_srs_is_rejected() {
        let b = BoundingBox::with_srs(92000.0, 437000.0, 93000.0, 438000.0, SpatialRef(28992));
        let p = QueryParams::new("t").with_bbox(b);
        let err = QueryEncoder::new().build_primary(&p).unwrap_err();
        assert!(matches!(err, FetchError::InvalidQuery(_)));
        assert_eq!(QueryEncoder::new().build_fallbacks(&p).count(), 0);
    }

    #[test]
    fn swapped_fallback_exchanges_lat_and_lon() {
        let p = QueryParams::new("t").with_bbox(BoundingBox::new(4.0, 52.0, 5.0, 53.0));
        let last = QueryEncoder::new().build_fallbacks(&p).last().unwrap();
        assert_eq!(
            last.encoding,
            FilterEncoding::Cql {
                geometry_property: "geom".into(),
                swapped_axes: true
            }
        );
        assert_eq!(
            last.param("cql_filter"),
            Some("BBOX(geom,52,4,53,5,'EPSG:4326')")
        );
    }

    #[test]
    fn projected_srs_skips_swapped_fallback() {
        let b = BoundingBox::with_srs(0.0, 0.0, 10.0, 10.0, SpatialRef(28992));
        let p = QueryParams::new("t")
            .with_srs(SpatialRef(28992))
            .with_bbox(b);
        let encodings: Vec<FilterEncoding> = QueryEncoder::new()
            .build_fallbacks(&p)
            .map(|s| s.encoding)
            .collect();
        assert_eq!(encodings.len(), 2);
        assert!(encodings.iter().all(|e| matches!(
            e,
            FilterEncoding::Cql {
                swapped_axes: false,
                ..
            }
        )));
    }

    #[test]
    fn custom_policy_reorders_steps() {
        let encoder = QueryEncoder::new().with_policy(FallbackPolicy {
            steps: vec![FallbackStep::cql("the_geom"), FallbackStep::cql("wkb_geometry")],
        });
        assert_eq!(
            filters(encoder.build_fallbacks(&params())),
            vec![
                "BBOX(the_geom,-1,-1,1,1,'EPSG:4326')",
                "BBOX(wkb_geometry,-1,-1,1,1,'EPSG:4326')",
            ]
        );
        let none = QueryEncoder::new().with_policy(FallbackPolicy::none());
        assert_eq!(none.build_fallbacks(&params()).count(), 0);
    }

    #[test]
    fn recording_ids_are_quoted_and_escaped() {
        let p = QueryParams::new("t").with_recording_ids(["12", "O'Brien", "  "]);
        let spec = QueryEncoder::new().build_primary(&p).unwrap();
        assert_eq!(
            spec.param("cql_filter"),
            Some("recordingid IN ('12','O''Brien')")
        );
        assert_eq!(QueryEncoder::new().build_fallbacks(&p).count(), 0);
    }

    #[test]
    fn recording_id_attribute_is_configurable() {
        let p = QueryParams::new("t").with_recording_ids(["12"]);
        let spec = QueryEncoder::new()
            .with_recording_id_attribute("rec_id")
            .build_primary(&p)
            .unwrap();
        assert_eq!(spec.param("cql_filter"), Some("rec_id IN ('12')"));
    }

    #[test]
    fn recording_ids_with_bbox_are_anded_and_fall_back() {
        let p = params().with_recording_ids(["7"]);
        let encoder = QueryEncoder::new();
        let primary = encoder.build_primary(&p).unwrap();
        assert_eq!(
            primary.param("cql_filter"),
            Some("(recordingid IN ('7')) AND BBOX(geom,-1,-1,1,1,'EPSG:4326')")
        );

        // Both `geom` steps would repeat the primary for this box.
        assert_eq!(
            filters(encoder.build_fallbacks(&p)),
            vec!["(recordingid IN ('7')) AND BBOX(the_geom,-1,-1,1,1,'EPSG:4326')"]
        );
    }

    #[test]
    fn max_features_is_forwarded() {
        let spec = QueryEncoder::new()
            .build_primary(&params().with_max_features(250))
            .unwrap();
        assert_eq!(spec.param("maxFeatures"), Some("250"));
    }
}
