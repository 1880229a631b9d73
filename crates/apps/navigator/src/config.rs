//! Environment and command-line configuration.

use std::env;
use std::time::Duration;

use clap::Parser;
use feature_service::{QueryParams, RetryPolicy};
use foundation::{BoundingBox, SpatialRef};
use streaming::{EvictionPolicy, DEFAULT_MAX_ENTRIES};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidValue { key: String, value: String },
    InvalidBbox(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidValue { key, value } => {
                write!(f, "invalid value for {key}: {value:?}")
            }
            ConfigError::InvalidBbox(raw) => {
                write!(f, "invalid bbox {raw:?}, expected minx,miny,maxx,maxy")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Upper bound for `HTTP_TIMEOUT_SECS`.
const MAX_HTTP_TIMEOUT_SECS: f64 = 3600.0;

#[derive(Parser, Debug)]
#[command(author, version, about = "Discover 360° captures and walk through their imagery")]
pub struct Args {
    /// Bounding box: minx,miny,maxx,maxy in the configured SRS
    #[arg(long)]
    pub bbox: Option<String>,

    /// Recording id to restrict the query to (repeatable)
    #[arg(long = "recording")]
    pub recordings: Vec<String>,

    /// CQL filter sent as-is; overrides --bbox and --recording
    #[arg(long)]
    pub filter: Option<String>,

    /// Navigation steps to walk after selecting
    #[arg(long, default_value_t = 3)]
    pub steps: u32,

    /// Feature service endpoint (default: FEATURE_SERVICE_URL)
    #[arg(long)]
    pub feature_service_url: Option<String>,

    /// Imagery server base URL (default: IMAGERY_URL)
    #[arg(long)]
    pub imagery_url: Option<String>,

    /// Keep at most one feature selected
    #[arg(long)]
    pub single: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NavigatorConfig {
    pub feature_service_url: String,
    pub type_name: String,
    pub srs: SpatialRef,
    pub geometry_property: Option<String>,
    pub max_features: u32,
    pub imagery_url: String,
    pub cache_max_entries: usize,
    pub cache_policy: EvictionPolicy,
    pub image_width: u32,
    pub image_height: u32,
    pub image_mode: Option<String>,
    pub http_timeout: Duration,
    pub http_attempts: u32,
    pub multi_select: bool,
}

impl NavigatorConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&|key| env::var(key).ok())
    }

    /// Reads every setting through `lookup`; unset or empty keys take their
    /// defaults, unparsable numbers too.
    pub fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let srs = match env_var_string(lookup, "FEATURE_SRS") {
            Some(raw) => SpatialRef::parse(&raw).ok_or_else(|| ConfigError::InvalidValue {
                key: "FEATURE_SRS".into(),
                value: raw,
            })?,
            None => SpatialRef::WGS84,
        };
        let cache_policy = match env_var_string(lookup, "IMAGERY_CACHE_POLICY") {
            Some(raw) => EvictionPolicy::parse(&raw).ok_or_else(|| ConfigError::InvalidValue {
                key: "IMAGERY_CACHE_POLICY".into(),
                value: raw,
            })?,
            None => EvictionPolicy::Fifo,
        };

        Ok(Self {
            feature_service_url: env_var_string(lookup, "FEATURE_SERVICE_URL")
                .unwrap_or_else(|| "http://localhost:8080/geoserver/wfs".to_string()),
            type_name: env_var_string(lookup, "FEATURE_TYPE_NAME")
                .unwrap_or_else(|| "horus:frames".to_string()),
            srs,
            geometry_property: env_var_string(lookup, "FEATURE_GEOMETRY_PROPERTY"),
            max_features: env_var_u32(lookup, "FEATURE_MAX_FEATURES", 500),
            imagery_url: env_var_string(lookup, "IMAGERY_URL")
                .unwrap_or_else(|| "http://localhost:5050/web/".to_string()),
            cache_max_entries: env_var_usize(
                lookup,
                "IMAGERY_CACHE_MAX_ENTRIES",
                DEFAULT_MAX_ENTRIES,
            ),
            cache_policy,
            image_width: env_var_u32(lookup, "IMAGERY_WIDTH", 600),
            image_height: env_var_u32(lookup, "IMAGERY_HEIGHT", 600),
            image_mode: env_var_string(lookup, "IMAGERY_MODE"),
            http_timeout: http_timeout(env_var_f64(lookup, "HTTP_TIMEOUT_SECS", 20.0)),
            http_attempts: env_var_u32(lookup, "HTTP_ATTEMPTS", 1).max(1),
            multi_select: env_var_bool(lookup, "MULTI_SELECT", true),
        })
    }

    /// Command-line values win over the environment.
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(url) = &args.feature_service_url {
            self.feature_service_url = url.clone();
        }
        if let Some(url) = &args.imagery_url {
            self.imagery_url = url.clone();
        }
        if args.single {
            self.multi_select = false;
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.http_attempts,
            ..RetryPolicy::default()
        }
    }

    /// Feature query for `args`, in the configured SRS.
    pub fn query_params(&self, args: &Args) -> Result<QueryParams, ConfigError> {
        let mut params = QueryParams::new(self.type_name.clone())
            .with_srs(self.srs)
            .with_max_features(self.max_features)
            .with_recording_ids(args.recordings.iter().cloned());

        if let Some(raw) = &args.bbox {
            let b = BoundingBox::parse(raw).ok_or_else(|| ConfigError::InvalidBbox(raw.clone()))?;
            params = params.with_bbox(BoundingBox::with_srs(
                b.min_x, b.min_y, b.max_x, b.max_y, self.srs,
            ));
        }
        if let Some(property) = &self.geometry_property {
            params = params.with_geometry_property(property.clone());
        }
        if let Some(filter) = &args.filter {
            params = params.with_filter(filter.clone());
        }
        Ok(params)
    }
}

fn env_var_string(lookup: &dyn Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_var_u32(lookup: &dyn Fn(&str) -> Option<String>, key: &str, default: u32) -> u32 {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_var_usize(lookup: &dyn Fn(&str) -> Option<String>, key: &str, default: usize) -> usize {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_var_f64(lookup: &dyn Fn(&str) -> Option<String>, key: &str, default: f64) -> f64 {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .filter(|v: &f64| v.is_finite())
        .unwrap_or(default)
}

/// Seconds clamped to `[0.1, MAX_HTTP_TIMEOUT_SECS]`.
fn http_timeout(secs: f64) -> Duration {
    Duration::from_secs_f64(secs.clamp(0.1, MAX_HTTP_TIMEOUT_SECS))
}

fn env_var_bool(lookup: &dyn Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    match lookup(key).map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        Some("1" | "true" | "yes" | "on") => true,
        Some("0" | "false" | "no" | "off") => false,
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::{Args, ConfigError, NavigatorConfig};
    use clap::Parser;
    use foundation::SpatialRef;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::time::Duration;
    use streaming::EvictionPolicy;

    fn config(vars: &[(&str, &str)]) -> Result<NavigatorConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        NavigatorConfig::from_lookup(&|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.type_name, "horus:frames");
        assert_eq!(cfg.srs, SpatialRef::WGS84);
        assert_eq!(cfg.cache_max_entries, 50);
        assert_eq!(cfg.cache_policy, EvictionPolicy::Fifo);
        assert_eq!((cfg.image_width, cfg.image_height), (600, 600));
        assert_eq!(cfg.http_timeout, Duration::from_secs(20));
        assert_eq!(cfg.http_attempts, 1);
        assert!(cfg.multi_select);
        assert_eq!(cfg.geometry_property, None);
    }

    #[test]
    fn environment_overrides_defaults() {
        let cfg = config(&[
            ("FEATURE_SRS", "EPSG:28992"),
            ("IMAGERY_CACHE_MAX_ENTRIES", "8"),
            ("IMAGERY_CACHE_POLICY", "LRU"),
            ("HTTP_ATTEMPTS", "3"),
            ("MULTI_SELECT", "false"),
            ("FEATURE_GEOMETRY_PROPERTY", " the_geom "),
        ])
        .unwrap();
        assert_eq!(cfg.srs, SpatialRef(28992));
        assert_eq!(cfg.cache_max_entries, 8);
        assert_eq!(cfg.cache_policy, EvictionPolicy::Lru);
        assert_eq!(cfg.retry_policy().attempts, 3);
        assert!(!cfg.multi_select);
        assert_eq!(cfg.geometry_property.as_deref(), Some("the_geom"));
    }

    #[test]
    fn timeout_is_clamped_to_a_sane_range() {
        let huge = config(&[("HTTP_TIMEOUT_SECS", "1e300")]).unwrap();
        assert_eq!(huge.http_timeout, Duration::from_secs(3600));

        let tiny = config(&[("HTTP_TIMEOUT_SECS", "-5")]).unwrap();
        assert_eq!(tiny.http_timeout.as_millis(), 100);

        let inf = config(&[("HTTP_TIMEOUT_SECS", "inf")]).unwrap();
        assert_eq!(inf.http_timeout, Duration::from_secs(20));
    }

    #[test]
    fn unknown_policy_is_rejected() {
        let err = config(&[("IMAGERY_CACHE_POLICY", "random")]).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidValue {
                key: "IMAGERY_CACHE_POLICY".into(),
                value: "random".into()
            }
        );
    }

    #[test]
    fn cli_builds_query_in_configured_srs() {
        let cfg = config(&[("FEATURE_SRS", "3857")]).unwrap();
        let args = Args::try_parse_from([
            "navigator",
            "--bbox",
            "10,20,30,40",
            "--recording",
            "a",
            "--recording",
            "b",
        ])
        .unwrap();

        let params = cfg.query_params(&args).unwrap();
        let bbox = params.bbox.unwrap();
        assert_eq!(bbox.coords(), [10.0, 20.0, 30.0, 40.0]);
        assert_eq!(bbox.srs, SpatialRef::WEB_MERCATOR);
        assert_eq!(params.recording_ids, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(params.max_features, Some(500));
        assert_eq!(args.steps, 3);
    }

    #[test]
    fn malformed_bbox_is_a_config_error() {
        let cfg = config(&[]).unwrap();
        let args = Args::try_parse_from(["navigator", "--bbox", "1,2,3"]).unwrap();
        assert!(matches!(cfg.query_params(&args), Err(ConfigError::InvalidBbox(_))));
    }

    #[test]
    fn cli_overrides_win() {
        let mut cfg = config(&[("FEATURE_SERVICE_URL", "http://env/wfs")]).unwrap();
        let args = Args::try_parse_from([
            "navigator",
            "--feature-service-url",
            "http://cli/wfs",
            "--single",
        ])
        .unwrap();
        cfg.apply_args(&args);
        assert_eq!(cfg.feature_service_url, "http://cli/wfs");
        assert!(!cfg.multi_select);
    }
}
